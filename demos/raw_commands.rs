//! Example: Send commands to a receiver and echo everything it says back.

use std::time::Duration;

use denon_avr_net::{AvrClient, AvrConfig, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = AvrConfig::builder()
        .host("192.168.0.50")
        .port(23)
        .request_status_on_connect(false)
        .build();

    let client = AvrClient::new(config)?;

    client.add_raw_listener(|token| {
        println!("<< {token}");
        Ok(())
    });

    // Queued now, flushed in order once connected
    client.send_wire(&Command::ZonePower { zone: 2, on: true });
    client.send_wire(&Command::SelectSource {
        zone: 2,
        source: "TUNER".to_string(),
    });
    client.send_wire(&Command::SetVolume { zone: 2, level: 35 });
    println!("Queued {} command(s)", client.pending_commands());

    client.start()?;
    tokio::time::sleep(Duration::from_secs(2)).await;

    for line in ["Z2?", "Z2MU?", "MV?"] {
        println!(">> {line}");
        client.send_command(line);
    }
    tokio::time::sleep(Duration::from_secs(2)).await;

    client.stop().await;
    Ok(())
}
