// Decoding a captured status exchange through the public client API.

use std::sync::{Arc, Mutex};

use denon_avr_net::{decode_token, AvrClient, AvrConfig, StateUpdate};

// Typical answer to the status-request burst, as one capture.
const STATUS_REPLY: &[u8] = b"PWON\rMV45\rMVMAX 80\rCVFL 50\rCVFR 50\rCVEND\rMUOFF\rSICD\rZMON\r\
MSSTEREO\rSVDVD\rZ2ON\rZ2MUON\rZ2TUNER\rZ230\rZ2CSST\rZ2CVFL 48\rZ2HPFON\rZ2QUICK2\r\
Z3OFF\rZ3MUOFF\rZ3PHONO\rZ355\rZ3QUICK 1\r";

fn client() -> AvrClient {
    AvrClient::new(AvrConfig::new("127.0.0.1", 23)).unwrap()
}

#[test]
fn status_reply_fills_every_key() {
    let client = client();
    client.ingest(STATUS_REPLY).unwrap();

    let expected = [
        ("power", "ON"),
        ("zone1", "ON"),
        ("zone1_vol", "45"),
        ("zone1_vol_max", "80"),
        ("zone1_ch_vol_FL", "50"),
        ("zone1_ch_vol_FR", "50"),
        ("zone1_mute", "OFF"),
        ("zone1_source", "CD"),
        ("video_select", "DVD"),
        ("zone2", "ON"),
        ("zone2_mute", "ON"),
        ("zone2_source", "TUNER"),
        ("zone2_vol", "30"),
        ("zone2_ch_set_source", "ST"),
        ("zone2_ch_vol_FL", "48"),
        ("zone2_hpf", "ON"),
        ("zone2_quick", "2"),
        ("zone3", "OFF"),
        ("zone3_mute", "OFF"),
        ("zone3_source", "PHONO"),
        ("zone3_vol", "55"),
        ("zone3_quick", "1"),
        ("raw_command", "Z3QUICK 1"),
    ];
    for (key, value) in expected {
        assert_eq!(client.get_state(key), value, "key {key}");
    }
    assert_eq!(client.states().len(), expected.len());
}

#[test]
fn listeners_see_updates_in_arrival_order() {
    let client = client();
    let updates = Arc::new(Mutex::new(Vec::new()));
    let raw = Arc::new(Mutex::new(Vec::new()));

    let sink = updates.clone();
    client.add_state_listener(move |key, value| {
        sink.lock().unwrap().push(StateUpdate::new(key, value));
        Ok(())
    });
    let sink = raw.clone();
    client.add_raw_listener(move |token| {
        sink.lock().unwrap().push(token.to_string());
        Ok(())
    });

    client.ingest(b"MV4").unwrap();
    client.ingest(b"5\rMV45\r\rCVEND\r").unwrap();

    assert_eq!(
        *updates.lock().unwrap(),
        vec![
            StateUpdate::new("zone1_vol", "45"),
            StateUpdate::new("zone1_vol", "45"),
        ]
    );
    assert_eq!(*raw.lock().unwrap(), vec!["MV45", "MV45", "", "CVEND"]);
    assert_eq!(client.get_state("raw_command"), "CVEND");
}

#[test]
fn removed_listener_is_not_called() {
    let client = client();
    let calls = Arc::new(Mutex::new(0));
    let counter = calls.clone();
    let id = client.add_state_listener(move |_, _| {
        *counter.lock().unwrap() += 1;
        Ok(())
    });

    client.ingest(b"PWON\r").unwrap();
    assert!(client.remove_listener(id));
    client.ingest(b"PWSTANDBY\r").unwrap();

    assert_eq!(*calls.lock().unwrap(), 1);
    assert_eq!(client.get_state("power"), "STANDBY");
}

#[test]
fn decode_token_is_usable_standalone() {
    assert_eq!(
        decode_token("Z2CSCVFL 50"),
        Some(StateUpdate::new("zone2_ch_set_ch_vol_FL", "50"))
    );
    assert_eq!(decode_token("NSE1Now Playing"), None);
}
