// MIT License - Copyright (c) 2026 Peter Wright
// MQTT bridge

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info, warn};

use denon_avr_net::{
    AvrClient, AvrConfig, AvrEvent, Device, Light, MediaPlayer, MediaPlayerCommands, Source,
    Switch,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "denon2mqtt")]
#[command(about = "Bridge between a Denon AV receiver and MQTT")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    avr: AvrToml,
    mqtt: MqttToml,
    /// Sources shared by every media player that does not list its own
    #[serde(default)]
    sources: Vec<SourceToml>,
    #[serde(default)]
    switches: Vec<SwitchToml>,
    #[serde(default)]
    lights: Vec<LightToml>,
    #[serde(default)]
    media_players: Vec<MediaPlayerToml>,
}

#[derive(Debug, Deserialize)]
struct AvrToml {
    host: String,
    #[serde(default = "default_avr_port")]
    port: u16,
    #[serde(default = "default_reconnect_delay")]
    reconnect_delay_ms: u64,
    #[serde(default = "default_connect_timeout")]
    connect_timeout_ms: u64,
    #[serde(default = "default_true")]
    request_status_on_connect: bool,
}

fn default_avr_port() -> u16 {
    23
}
fn default_reconnect_delay() -> u64 {
    5000
}
fn default_connect_timeout() -> u64 {
    10000
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct MqttToml {
    url: String,
    #[serde(default = "default_client_id")]
    client_id: String,
    #[serde(default = "default_subscribe_topic")]
    subscribe_topic: String,
    #[serde(default = "default_publish_topic")]
    publish_topic: String,
    #[serde(default = "default_snapshot_interval")]
    snapshot_interval_secs: u64,
}

fn default_client_id() -> String {
    "denon-bridge".to_string()
}
fn default_subscribe_topic() -> String {
    "denon/cmd".to_string()
}
fn default_publish_topic() -> String {
    "denon".to_string()
}
fn default_snapshot_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
struct SourceToml {
    name: String,
    source: String,
}

/// Either `on_command` + `off_command`, or `source` (+ optional `zone`).
#[derive(Debug, Deserialize)]
struct SwitchToml {
    name: String,
    #[serde(default)]
    on_command: Option<String>,
    #[serde(default)]
    off_command: Option<String>,
    #[serde(default)]
    zone: Option<u8>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    icon: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LightToml {
    name: String,
    on_command: String,
    off_command: String,
    level_prefix: String,
    #[serde(default)]
    min: u32,
    #[serde(default = "default_level_max")]
    max: u32,
    #[serde(default)]
    icon: Option<String>,
}

/// `zone` fills in the standard commands; any explicit command overrides it.
#[derive(Debug, Deserialize)]
struct MediaPlayerToml {
    name: String,
    #[serde(default)]
    zone: Option<u8>,
    #[serde(default)]
    on_command: Option<String>,
    #[serde(default)]
    off_command: Option<String>,
    #[serde(default)]
    mute_on_command: Option<String>,
    #[serde(default)]
    mute_off_command: Option<String>,
    #[serde(default)]
    vol_up_command: Option<String>,
    #[serde(default)]
    vol_down_command: Option<String>,
    #[serde(default)]
    vol_prefix: Option<String>,
    #[serde(default)]
    source_prefix: Option<String>,
    #[serde(default)]
    min: u32,
    #[serde(default = "default_level_max")]
    max: u32,
    #[serde(default)]
    sources: Vec<SourceToml>,
    #[serde(default)]
    icon: Option<String>,
}

fn default_level_max() -> u32 {
    99
}

fn build_avr_config(toml: &AvrToml) -> Result<AvrConfig> {
    let config = AvrConfig::builder()
        .host(&toml.host)
        .port(toml.port)
        .reconnect_delay_ms(toml.reconnect_delay_ms)
        .connect_timeout_ms(toml.connect_timeout_ms)
        .request_status_on_connect(toml.request_status_on_connect)
        .build();
    config.validate()?;
    Ok(config)
}

fn build_devices(config: &Config) -> Result<Vec<Device>> {
    let mut devices = Vec::new();

    for toml in &config.switches {
        let switch = match (&toml.on_command, &toml.off_command, &toml.source) {
            (Some(on), Some(off), None) => Switch::raw(&toml.name, on, off),
            (None, None, Some(source)) => Switch::source(&toml.name, toml.zone.unwrap_or(1), source),
            _ => anyhow::bail!(
                "Switch {}: set either on_command and off_command, or source",
                toml.name
            ),
        };
        let switch = match &toml.icon {
            Some(icon) => switch.with_icon(icon),
            None => switch,
        };
        devices.push(Device::Switch(switch));
    }

    for toml in &config.lights {
        let light = Light::new(
            &toml.name,
            &toml.on_command,
            &toml.off_command,
            &toml.level_prefix,
            toml.min,
            toml.max,
        );
        let light = match &toml.icon {
            Some(icon) => light.with_icon(icon),
            None => light,
        };
        devices.push(Device::Light(light));
    }

    for toml in &config.media_players {
        let commands = media_player_commands(toml)?;
        let sources = if toml.sources.is_empty() {
            &config.sources
        } else {
            &toml.sources
        };
        let player = MediaPlayer::new(&toml.name, commands)
            .with_range(toml.min, toml.max)
            .with_sources(
                sources
                    .iter()
                    .map(|s| Source::new(&s.name, &s.source))
                    .collect(),
            );
        let player = match &toml.icon {
            Some(icon) => player.with_icon(icon),
            None => player,
        };
        devices.push(Device::MediaPlayer(player));
    }

    let mut names: Vec<&str> = devices.iter().map(Device::name).collect();
    names.sort_unstable();
    if let Some(pair) = names.windows(2).find(|pair| pair[0] == pair[1]) {
        anyhow::bail!("Duplicate device name: {}", pair[0]);
    }

    Ok(devices)
}

fn media_player_commands(toml: &MediaPlayerToml) -> Result<MediaPlayerCommands> {
    let base = toml.zone.map(MediaPlayerCommands::for_zone);
    let pick = |explicit: &Option<String>, standard: Option<&String>, field: &str| {
        explicit
            .clone()
            .or_else(|| standard.cloned())
            .with_context(|| format!("Media player {}: missing {field} (or zone)", toml.name))
    };
    Ok(MediaPlayerCommands {
        on: pick(&toml.on_command, base.as_ref().map(|b| &b.on), "on_command")?,
        off: pick(&toml.off_command, base.as_ref().map(|b| &b.off), "off_command")?,
        mute_on: pick(
            &toml.mute_on_command,
            base.as_ref().map(|b| &b.mute_on),
            "mute_on_command",
        )?,
        mute_off: pick(
            &toml.mute_off_command,
            base.as_ref().map(|b| &b.mute_off),
            "mute_off_command",
        )?,
        volume_up: pick(
            &toml.vol_up_command,
            base.as_ref().map(|b| &b.volume_up),
            "vol_up_command",
        )?,
        volume_down: pick(
            &toml.vol_down_command,
            base.as_ref().map(|b| &b.volume_down),
            "vol_down_command",
        )?,
        volume_prefix: pick(
            &toml.vol_prefix,
            base.as_ref().map(|b| &b.volume_prefix),
            "vol_prefix",
        )?,
        source_prefix: pick(
            &toml.source_prefix,
            base.as_ref().map(|b| &b.source_prefix),
            "source_prefix",
        )?,
    })
}

fn load_config(path: &str) -> Result<Config> {
    let text = std::fs::read_to_string(path).context("Failed to read config file")?;
    toml::from_str(&text).context("Failed to parse config file")
}

// ---------------------------------------------------------------------------
// MQTT JSON types
// ---------------------------------------------------------------------------

// Published messages: all share the {now, op, ...} flat structure

#[derive(Serialize)]
struct MqttSnapshot {
    now: u64,
    op: String,
    state: MqttSnapshotState,
}

#[derive(Serialize)]
struct MqttSnapshotState {
    connected: bool,
    values: BTreeMap<String, String>,
    devices: Vec<MqttDeviceState>,
}

#[derive(Debug, Serialize)]
struct MqttDeviceState {
    name: String,
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    power: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    brightness: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    volume: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    muted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "sourceList")]
    source_list: Option<Vec<String>>,
}

// State update: {now, op, key, value}
#[derive(Serialize)]
struct MqttStateEvent {
    now: u64,
    op: String,
    key: String,
    value: String,
}

// Device change: {now, op, device}
#[derive(Serialize)]
struct MqttDeviceEvent {
    now: u64,
    op: String,
    device: MqttDeviceState,
}

// CMD_ACK response
#[derive(Serialize)]
struct MqttCmdAck {
    now: u64,
    op: String,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    src: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

// Simple event with just {now, op}
#[derive(Serialize)]
struct MqttSimpleEvent {
    now: u64,
    op: String,
}

// Inbound command (subscribed)
#[derive(Debug, Deserialize)]
struct MqttCommand {
    op: String,
    #[serde(default)]
    #[allow(dead_code)]
    op_id: Option<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    device: Option<String>,
    #[serde(default)]
    mute: Option<bool>,
    #[serde(default)]
    level: Option<f32>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    brightness: Option<u8>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

fn device_state(device: &Device) -> MqttDeviceState {
    let mut state = MqttDeviceState {
        name: device.name().to_string(),
        kind: device.kind().to_string(),
        power: device.power().map(|p| p.as_str().to_string()),
        icon: None,
        brightness: None,
        volume: None,
        muted: None,
        source: None,
        source_list: None,
    };
    match device {
        Device::Switch(switch) => state.icon = switch.icon.clone(),
        Device::Light(light) => {
            state.icon = light.icon.clone();
            state.brightness = light.brightness();
        }
        Device::MediaPlayer(player) => {
            state.icon = player.icon.clone();
            state.volume = player.volume();
            state.muted = player.is_muted();
            state.source = player.source().map(str::to_string);
            state.source_list = Some(
                player
                    .source_list()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            );
        }
    }
    state
}

async fn publish_json(client: &AsyncClient, topic: &str, payload: &impl Serialize, retain: bool) {
    match serde_json::to_string(payload) {
        Ok(json) => {
            if let Err(e) = client.publish(topic, QoS::AtLeastOnce, retain, json).await {
                error!("Failed to publish to {topic}: {e}");
            }
        }
        Err(e) => error!("Failed to serialize MQTT payload: {e}"),
    }
}

async fn publish_cmd_ack(
    client: &AsyncClient,
    topic: &str,
    success: bool,
    src: Option<serde_json::Value>,
    data: Option<serde_json::Value>,
) {
    let msg = MqttCmdAck {
        now: now_epoch_ms(),
        op: "CMD_ACK".to_string(),
        success,
        src,
        data,
    };
    publish_json(client, topic, &msg, false).await;
}

async fn publish_simple_event(client: &AsyncClient, topic: &str, op: &str) {
    let msg = MqttSimpleEvent {
        now: now_epoch_ms(),
        op: op.to_string(),
    };
    publish_json(client, topic, &msg, false).await;
}

async fn publish_device(client: &AsyncClient, topic: &str, device: &Device) {
    let msg = MqttDeviceEvent {
        now: now_epoch_ms(),
        op: "DEVICE".to_string(),
        device: device_state(device),
    };
    publish_json(client, topic, &msg, false).await;
}

async fn build_snapshot(avr: &AvrClient, devices: &Mutex<Vec<Device>>) -> MqttSnapshot {
    let devices = devices.lock().await;
    MqttSnapshot {
        now: now_epoch_ms(),
        op: "SNAPSHOT".to_string(),
        state: MqttSnapshotState {
            connected: avr.is_connected(),
            values: avr.states().into_iter().collect(),
            devices: devices.iter().map(device_state).collect(),
        },
    }
}

async fn publish_snapshot(
    client: &AsyncClient,
    topic: &str,
    avr: &AvrClient,
    devices: &Mutex<Vec<Device>>,
) {
    let snapshot = build_snapshot(avr, devices).await;
    publish_json(client, topic, &snapshot, true).await;
}

// ---------------------------------------------------------------------------
// Receiver event → MQTT
// ---------------------------------------------------------------------------

async fn handle_avr_event(
    event: AvrEvent,
    client: &AsyncClient,
    topic: &str,
    devices: &Mutex<Vec<Device>>,
) {
    match event {
        AvrEvent::Connected => {
            info!("Receiver connected");
            publish_simple_event(client, topic, "CONNECTED").await;
        }

        AvrEvent::Disconnected => {
            warn!("Receiver disconnected");
            publish_simple_event(client, topic, "DISCONNECTED").await;
        }

        AvrEvent::StateChanged { key, value } => {
            let mut devices = devices.lock().await;
            for device in devices.iter_mut() {
                if device.apply_state(&key, &value) {
                    info!("{} {}: state changed", device.kind(), device.name());
                    publish_device(client, topic, device).await;
                }
            }
            let msg = MqttStateEvent {
                now: now_epoch_ms(),
                op: "STATE".to_string(),
                key,
                value,
            };
            publish_json(client, topic, &msg, false).await;
        }

        AvrEvent::RawToken(token) => {
            let mut devices = devices.lock().await;
            for device in devices.iter_mut() {
                if device.apply_raw(&token) {
                    info!("{} {}: state changed", device.kind(), device.name());
                    publish_device(client, topic, device).await;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MQTT command handler
// ---------------------------------------------------------------------------

/// Wire commands for a device-level MQTT command, or the reason it was refused.
fn device_commands(
    devices: &mut [Device],
    cmd: &MqttCommand,
) -> std::result::Result<Vec<String>, String> {
    let op = cmd.op.as_str();
    let name = cmd
        .device
        .as_deref()
        .ok_or_else(|| format!("{op}: missing device"))?;
    let device = devices
        .iter_mut()
        .find(|d| d.name() == name)
        .ok_or_else(|| format!("{op}: unknown device {name}"))?;

    match (op, device) {
        ("TURN_ON", device) => Ok(device.turn_on_commands()),
        ("TURN_OFF", device) => Ok(vec![device.turn_off_command()]),
        ("MUTE", Device::MediaPlayer(player)) => {
            let mute = cmd.mute.ok_or_else(|| format!("{op}: missing mute"))?;
            Ok(vec![player.mute_command(mute)])
        }
        ("VOLUME_UP", Device::MediaPlayer(player)) => Ok(vec![player.volume_up_command()]),
        ("VOLUME_DOWN", Device::MediaPlayer(player)) => Ok(vec![player.volume_down_command()]),
        ("SET_VOLUME", Device::MediaPlayer(player)) => {
            let level = cmd.level.ok_or_else(|| format!("{op}: missing level"))?;
            Ok(vec![player.set_volume_command(level)])
        }
        ("SELECT_SOURCE", Device::MediaPlayer(player)) => {
            let source = cmd
                .source
                .as_deref()
                .ok_or_else(|| format!("{op}: missing source"))?;
            Ok(vec![player.select_source_command(source)])
        }
        ("SET_BRIGHTNESS", Device::Light(light)) => {
            let brightness = cmd
                .brightness
                .ok_or_else(|| format!("{op}: missing brightness"))?;
            Ok(light.turn_on_commands(Some(brightness)))
        }
        (op, device) => Err(format!(
            "{op}: not supported by {} {}",
            device.kind(),
            device.name()
        )),
    }
}

async fn handle_command(
    payload_str: &str,
    cmd: MqttCommand,
    client: &AsyncClient,
    topic: &str,
    avr: &AvrClient,
    devices: &Mutex<Vec<Device>>,
) {
    // Parse the raw payload as a JSON value for the CMD_ACK src field
    let src_json = serde_json::from_str::<serde_json::Value>(payload_str).ok();

    match cmd.op.as_str() {
        "SNAPSHOT" => {
            debug!("Command: SNAPSHOT");
            let snapshot = build_snapshot(avr, devices).await;
            let snapshot_value = serde_json::to_value(&snapshot).ok();
            publish_json(client, topic, &snapshot, true).await;
            publish_cmd_ack(client, topic, true, src_json, snapshot_value).await;
        }

        "PING" => {
            info!("Command: PING");
            publish_cmd_ack(client, topic, true, src_json, None).await;
        }

        "RAW_COMMAND" => match cmd.command.as_deref() {
            Some(command) if !command.is_empty() => {
                info!("Command: RAW_COMMAND {command}");
                avr.send_command(command);
                publish_cmd_ack(client, topic, true, src_json, None).await;
            }
            _ => {
                warn!("RAW_COMMAND: missing command");
                publish_cmd_ack(client, topic, false, src_json, None).await;
            }
        },

        "TURN_ON" | "TURN_OFF" | "MUTE" | "VOLUME_UP" | "VOLUME_DOWN" | "SET_VOLUME"
        | "SELECT_SOURCE" | "SET_BRIGHTNESS" => {
            let result = {
                let mut devices = devices.lock().await;
                device_commands(&mut devices, &cmd)
            };
            match result {
                Ok(commands) => {
                    info!("Command: {} -> {:?}", cmd.op, commands);
                    for command in &commands {
                        avr.send_command(command);
                    }
                    publish_cmd_ack(client, topic, true, src_json, None).await;
                }
                Err(reason) => {
                    warn!("{reason}");
                    publish_cmd_ack(client, topic, false, src_json, None).await;
                }
            }
        }

        other => {
            warn!("Unknown command: {other}");
            publish_cmd_ack(client, topic, false, src_json, None).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=denon_avr_net=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();

    let mut config = load_config(&cli.config)?;
    let mut avr_config = build_avr_config(&config.avr)?;
    let mut device_list = build_devices(&config)?;
    let (mut mqtt_host, mut mqtt_port) = parse_mqtt_url(&config.mqtt.url)?;

    let mut sighup = signal(SignalKind::hangup())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        let publish_topic = config.mqtt.publish_topic.clone();
        let subscribe_topic = config.mqtt.subscribe_topic.clone();
        let snapshot_interval_secs = config.mqtt.snapshot_interval_secs.max(1);

        info!(
            "Connecting to receiver at {} with {} device(s)",
            avr_config.address(),
            device_list.len()
        );
        let avr = AvrClient::new(avr_config.clone())?;
        let devices = Arc::new(Mutex::new(device_list));

        // Set up MQTT
        let mut mqtt_opts = MqttOptions::new(&config.mqtt.client_id, &mqtt_host, mqtt_port);
        mqtt_opts.set_keep_alive(Duration::from_secs(30));
        let (client, mut eventloop) = AsyncClient::new(mqtt_opts, 256);

        // Subscribe before starting so the first connect is not missed
        let event_rx = avr.subscribe();
        avr.start()?;

        publish_snapshot(&client, &publish_topic, &avr, &devices).await;

        // Task 1: Receiver event listener
        let devices_events = Arc::clone(&devices);
        let client_events = client.clone();
        let topic_events = publish_topic.clone();
        let event_handle = tokio::spawn(async move {
            let mut rx = event_rx;
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        handle_avr_event(event, &client_events, &topic_events, &devices_events)
                            .await;
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!("Event receiver lagged, missed {n} events");
                    }
                    Err(RecvError::Closed) => {
                        info!("Event channel closed");
                        break;
                    }
                }
            }
        });

        // Task 2: MQTT event loop (receives messages, handles commands)
        let avr_cmds = avr.clone();
        let devices_cmds = Arc::clone(&devices);
        let client_cmds = client.clone();
        let topic_cmds = publish_topic.clone();
        let sub_topic = subscribe_topic.clone();
        let mqtt_handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        // rumqttc does not resubscribe on its own
                        info!("MQTT: connected, subscribing to {sub_topic}");
                        if let Err(e) = client_cmds.subscribe(&sub_topic, QoS::AtLeastOnce).await
                        {
                            error!("Failed to subscribe to {sub_topic}: {e}");
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(msg))) => {
                        if msg.topic == sub_topic {
                            let payload = String::from_utf8_lossy(&msg.payload);
                            match serde_json::from_str::<MqttCommand>(&payload) {
                                Ok(cmd) => {
                                    if cmd.op == "SNAPSHOT" {
                                        debug!("MQTT command received: {payload}");
                                    } else {
                                        info!("MQTT command received: {payload}");
                                    }
                                    handle_command(
                                        &payload,
                                        cmd,
                                        &client_cmds,
                                        &topic_cmds,
                                        &avr_cmds,
                                        &devices_cmds,
                                    )
                                    .await;
                                }
                                Err(e) => {
                                    warn!("Failed to parse MQTT command: {e}");
                                }
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!("MQTT event loop error: {e}");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        // Task 3: Snapshot timer
        let avr_snap = avr.clone();
        let devices_snap = Arc::clone(&devices);
        let client_snap = client.clone();
        let topic_snap = publish_topic.clone();
        let snap_handle = tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(snapshot_interval_secs));
            // Skip the first immediate tick (we already published an initial snapshot)
            ticker.tick().await;
            loop {
                ticker.tick().await;
                publish_snapshot(&client_snap, &topic_snap, &avr_snap, &devices_snap).await;
            }
        });

        // Wait for a signal
        info!("MQTT bridge running. Send SIGHUP to restart, SIGINT/SIGTERM to stop.");
        let restart = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, shutting down...");
                false
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                false
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP, reloading config and restarting connections...");
                true
            }
        };

        // Abort tasks
        event_handle.abort();
        mqtt_handle.abort();
        snap_handle.abort();

        avr.stop().await;
        if let Err(e) = client.disconnect().await {
            debug!("MQTT disconnect: {e}");
        }

        if !restart {
            break;
        }

        // Reload config from disk; keep previous config on failure.
        // Device state is rebuilt either way and refilled by the status burst.
        info!("Reloading config from {}", cli.config);
        let reloaded = load_config(&cli.config).and_then(|new_config| {
            let new_avr = build_avr_config(&new_config.avr)?;
            let new_devices = build_devices(&new_config)?;
            let (new_host, new_port) = parse_mqtt_url(&new_config.mqtt.url)?;
            Ok((new_config, new_avr, new_devices, new_host, new_port))
        });
        match reloaded {
            Ok((new_config, new_avr, new_devices, new_host, new_port)) => {
                config = new_config;
                avr_config = new_avr;
                device_list = new_devices;
                mqtt_host = new_host;
                mqtt_port = new_port;
                info!("Config reloaded successfully");
            }
            Err(e) => {
                warn!("Failed to reload config, keeping previous: {e:#}");
                device_list = build_devices(&config)?;
            }
        }

        info!("Reconnecting...");
    }

    info!("Shutdown complete");
    Ok(())
}

/// Parse an MQTT URL like "mqtt://host:port" into (host, port).
fn parse_mqtt_url(url: &str) -> Result<(String, u16)> {
    let stripped = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    let (host, port_str) = stripped
        .rsplit_once(':')
        .context("MQTT URL must be in format mqtt://host:port")?;

    let port: u16 = port_str.parse().context("Invalid MQTT port number")?;

    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        [avr]
        host = "10.0.0.20"

        [mqtt]
        url = "mqtt://localhost:1883"

        [[sources]]
        name = "CD"
        source = "CD"

        [[sources]]
        name = "Tuner"
        source = "TUNER"

        [[switches]]
        name = "Zone 2 Tuner"
        zone = 2
        source = "TUNER"

        [[switches]]
        name = "Trigger"
        on_command = "TR1 ON"
        off_command = "TR1 OFF"

        [[lights]]
        name = "Display"
        on_command = "DIM BRI"
        off_command = "DIM OFF"
        level_prefix = "DIM "
        max = 3

        [[media_players]]
        name = "Main"
        zone = 1

        [[media_players]]
        name = "Zone 3"
        zone = 3
        max = 60
        sources = [{ name = "Phono", source = "PHONO" }]
    "#;

    fn config() -> Config {
        toml::from_str(CONFIG).unwrap()
    }

    fn command(json: &str) -> MqttCommand {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = config();
        let avr = build_avr_config(&config.avr).unwrap();
        assert_eq!(avr.address(), "10.0.0.20:23");
        assert_eq!(avr.reconnect_delay_ms, 5000);
        assert!(avr.request_status_on_connect);
        assert_eq!(config.mqtt.publish_topic, "denon");
        assert_eq!(config.mqtt.subscribe_topic, "denon/cmd");
    }

    #[test]
    fn test_build_devices() {
        let devices = build_devices(&config()).unwrap();
        let kinds: Vec<_> = devices.iter().map(|d| (d.kind(), d.name())).collect();
        assert_eq!(
            kinds,
            vec![
                ("switch", "Zone 2 Tuner"),
                ("switch", "Trigger"),
                ("light", "Display"),
                ("media_player", "Main"),
                ("media_player", "Zone 3"),
            ]
        );
        match &devices[3] {
            Device::MediaPlayer(p) => assert_eq!(p.source_list(), vec!["CD", "Tuner"]),
            other => panic!("unexpected device: {other:?}"),
        }
        match &devices[4] {
            Device::MediaPlayer(p) => assert_eq!(p.source_list(), vec!["Phono"]),
            other => panic!("unexpected device: {other:?}"),
        }
    }

    #[test]
    fn test_build_devices_rejects_incomplete_switch() {
        let mut config = config();
        config.switches[1].off_command = None;
        assert!(build_devices(&config).is_err());
    }

    #[test]
    fn test_build_devices_rejects_duplicate_names() {
        let mut config = config();
        config.lights[0].name = "Main".to_string();
        assert!(build_devices(&config).is_err());
    }

    #[test]
    fn test_media_player_without_zone_needs_commands() {
        let toml: MediaPlayerToml = toml::from_str(
            r#"
            name = "Custom"
            on_command = "ZMON"
            "#,
        )
        .unwrap();
        assert!(media_player_commands(&toml).is_err());
    }

    #[test]
    fn test_device_commands() {
        let mut devices = build_devices(&config()).unwrap();

        let on = device_commands(&mut devices, &command(r#"{"op":"TURN_ON","device":"Zone 2 Tuner"}"#));
        assert_eq!(on, Ok(vec!["Z2TUNER".to_string()]));

        let vol = device_commands(
            &mut devices,
            &command(r#"{"op":"SET_VOLUME","device":"Zone 3","level":0.5}"#),
        );
        assert_eq!(vol, Ok(vec!["Z330".to_string()]));

        let source = device_commands(
            &mut devices,
            &command(r#"{"op":"SELECT_SOURCE","device":"Main","source":"Tuner"}"#),
        );
        assert_eq!(source, Ok(vec!["SITUNER".to_string()]));

        let dim = device_commands(
            &mut devices,
            &command(r#"{"op":"SET_BRIGHTNESS","device":"Display","brightness":255}"#),
        );
        assert_eq!(dim, Ok(vec!["DIM BRI".to_string(), "DIM 3".to_string()]));
    }

    #[test]
    fn test_device_commands_refused() {
        let mut devices = build_devices(&config()).unwrap();
        assert!(device_commands(&mut devices, &command(r#"{"op":"TURN_ON"}"#)).is_err());
        assert!(
            device_commands(&mut devices, &command(r#"{"op":"TURN_ON","device":"Nope"}"#))
                .is_err()
        );
        assert!(
            device_commands(&mut devices, &command(r#"{"op":"MUTE","device":"Trigger"}"#))
                .is_err()
        );
        assert!(
            device_commands(&mut devices, &command(r#"{"op":"MUTE","device":"Main"}"#)).is_err()
        );
    }

    #[test]
    fn test_device_state_json() {
        let mut devices = build_devices(&config()).unwrap();
        devices[3].apply_raw("MV50");
        devices[3].apply_raw("MUON");
        let json = serde_json::to_value(device_state(&devices[3])).unwrap();
        assert_eq!(json["kind"], "media_player");
        assert_eq!(json["muted"], true);
        assert_eq!(json["sourceList"], serde_json::json!(["CD", "Tuner"]));
        assert!(json.get("power").is_none());
    }

    #[test]
    fn test_parse_mqtt_url() {
        assert_eq!(
            parse_mqtt_url("mqtt://broker:1883").unwrap(),
            ("broker".to_string(), 1883)
        );
        assert_eq!(
            parse_mqtt_url("tcp://10.0.0.1:8883").unwrap(),
            ("10.0.0.1".to_string(), 8883)
        );
        assert!(parse_mqtt_url("broker").is_err());
    }
}
