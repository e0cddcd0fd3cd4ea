// MIT License - Copyright (c) 2026 Peter Wright
// Token framing and status decoding

use tracing::warn;

use crate::constants::{key, prefix, zone_code, CR};
use crate::error::{AvrError, Result};

/// A decoded state change: `key` now holds `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateUpdate {
    pub key: String,
    pub value: String,
}

impl StateUpdate {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Splits the inbound byte stream into `\r`-terminated tokens.
///
/// A token cut in half by the socket is held back until its terminator
/// arrives in a later read. Empty tokens (`\r\r`) are produced as-is.
#[derive(Debug)]
pub struct TokenFramer {
    carry: Vec<u8>,
    max_token_len: usize,
}

impl TokenFramer {
    pub fn new(max_token_len: usize) -> Self {
        Self {
            carry: Vec::new(),
            max_token_len,
        }
    }

    /// Feed one chunk; returns every token it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut tokens = Vec::new();
        for &byte in chunk {
            if byte == CR {
                tokens.push(std::mem::take(&mut self.carry));
            } else {
                self.carry.push(byte);
            }
        }

        if self.carry.len() > self.max_token_len {
            warn!(
                "Discarding {} bytes of unterminated data (limit {})",
                self.carry.len(),
                self.max_token_len
            );
            self.carry.clear();
        }

        tokens
    }

    /// Bytes waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    /// Drop any partial token, e.g. when a new connection starts.
    pub fn reset(&mut self) {
        self.carry.clear();
    }
}

/// Decode a framed token's bytes as text.
pub fn token_text(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| AvrError::Decode {
        details: format!("{} ({:?})", e, e.as_bytes()),
    })
}

/// Decode one token into a state update.
///
/// Returns `None` for empty tokens, unknown prefixes and list markers such
/// as `CVEND`. `MVMAX` is tested before `MV`, otherwise a max-volume report
/// would read as volume `MAX..`.
pub fn decode_token(token: &str) -> Option<StateUpdate> {
    if token.is_empty() {
        return None;
    }

    if let Some(rest) = token.strip_prefix(prefix::POWER) {
        Some(StateUpdate::new(key::POWER, rest))
    } else if token.starts_with(prefix::CHANNEL_VOLUME) {
        decode_zone_state(key::ZONE1, token)
    } else if let Some(rest) = token.strip_prefix(prefix::SOURCE) {
        decode_zone_state(key::ZONE1, rest)
    } else if let Some(rest) = token.strip_prefix(prefix::ZONE2) {
        decode_zone_state(key::ZONE2, rest)
    } else if let Some(rest) = token.strip_prefix(prefix::ZONE3) {
        decode_zone_state(key::ZONE3, rest)
    } else if let Some(rest) = token.strip_prefix(prefix::MAX_VOLUME) {
        Some(StateUpdate::new(key::ZONE1_VOL_MAX, rest.trim_start_matches(' ')))
    } else if let Some(rest) = token.strip_prefix(prefix::MASTER_VOLUME) {
        Some(StateUpdate::new(key::ZONE1_VOL, rest))
    } else if let Some(rest) = token.strip_prefix(prefix::MUTE) {
        Some(StateUpdate::new(key::ZONE1_MUTE, rest))
    } else if let Some(rest) = token.strip_prefix(prefix::MAIN_ZONE) {
        Some(StateUpdate::new(key::ZONE1, rest))
    } else if let Some(rest) = token.strip_prefix(prefix::VIDEO_SELECT) {
        Some(StateUpdate::new(key::VIDEO_SELECT, rest))
    } else {
        None
    }
}

/// Zone sub-grammar. `zone` is the key being built (`zone2`,
/// `zone2_ch_set`, ...), `state` what follows the zone prefix.
pub fn decode_zone_state(zone: &str, state: &str) -> Option<StateUpdate> {
    if state == zone_code::ON || state == zone_code::OFF {
        return Some(StateUpdate::new(zone, state));
    }

    if state == zone_code::MUTE_ON || state == zone_code::MUTE_OFF {
        return Some(StateUpdate::new(
            format!("{zone}{}", key::MUTE_SUFFIX),
            &state[2..],
        ));
    }

    if state.starts_with(zone_code::QUICK) {
        let slot = state.chars().last().map(String::from).unwrap_or_default();
        return Some(StateUpdate::new(format!("{zone}{}", key::QUICK_SUFFIX), slot));
    }

    if let Some(rest) = state.strip_prefix(zone_code::CHANNEL_SETTING) {
        return decode_zone_state(&format!("{zone}{}", key::CHANNEL_SET_SUFFIX), rest);
    }

    if let Some(rest) = state.strip_prefix(zone_code::CHANNEL_VOLUME) {
        if state == zone_code::CHANNEL_VOLUME_END {
            return None;
        }
        let (channel, level) = rest.trim_start_matches(' ').split_once(' ')?;
        return Some(StateUpdate::new(
            format!("{zone}{}{channel}", key::CHANNEL_VOLUME_SUFFIX),
            level,
        ));
    }

    if let Some(rest) = state.strip_prefix(zone_code::HPF) {
        return Some(StateUpdate::new(format!("{zone}{}", key::HPF_SUFFIX), rest));
    }

    if !state.is_empty() && state.bytes().all(|b| b.is_ascii_digit()) {
        return Some(StateUpdate::new(format!("{zone}{}", key::VOLUME_SUFFIX), state));
    }

    Some(StateUpdate::new(format!("{zone}{}", key::SOURCE_SUFFIX), state))
}

/// Commands that can be sent to the receiver.
///
/// Zone 1 is the main zone; 2 and 3 are the auxiliary outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `PWON` / `PWSTANDBY`: whole-unit power
    Power { on: bool },
    /// `ZMON` / `Z2OFF`: power of one zone
    ZonePower { zone: u8, on: bool },
    /// `MUON` / `Z2MUOFF`
    Mute { zone: u8, on: bool },
    /// `MVUP` / `Z2UP`
    VolumeUp { zone: u8 },
    /// `MVDOWN` / `Z2DOWN`
    VolumeDown { zone: u8 },
    /// `MV45` / `Z245`: absolute volume, two digits
    SetVolume { zone: u8, level: u8 },
    /// `SICD` / `Z2TUNER`: select an input source code
    SelectSource { zone: u8, source: String },
    /// `MSQUICK1` / `Z2QUICK1`
    QuickSelect { zone: u8, slot: u8 },
    /// `SVDVD`: video input
    VideoSelect { source: String },
    /// `SI?` / `Z2?`: ask a zone for its state
    QueryZone { zone: u8 },
    /// Anything else, sent without interpretation
    Raw(String),
}

impl Command {
    /// The command text without terminator.
    pub fn to_wire_string(&self) -> String {
        match self {
            Self::Power { on } => format!("PW{}", if *on { "ON" } else { "STANDBY" }),
            Self::ZonePower { zone, on } => {
                format!("{}{}", zone_prefix(*zone), if *on { "ON" } else { "OFF" })
            }
            Self::Mute { zone, on } => format!(
                "{}MU{}",
                sub_zone_prefix(*zone),
                if *on { "ON" } else { "OFF" }
            ),
            Self::VolumeUp { zone } => format!("{}UP", volume_prefix(*zone)),
            Self::VolumeDown { zone } => format!("{}DOWN", volume_prefix(*zone)),
            Self::SetVolume { zone, level } => format!("{}{:02}", volume_prefix(*zone), level),
            Self::SelectSource { zone, source } => format!("{}{}", source_prefix(*zone), source),
            Self::QuickSelect { zone, slot } if *zone <= 1 => format!("MSQUICK{slot}"),
            Self::QuickSelect { zone, slot } => format!("Z{zone}QUICK{slot}"),
            Self::VideoSelect { source } => format!("SV{source}"),
            Self::QueryZone { zone } => format!("{}?", source_prefix(*zone)),
            Self::Raw(text) => text.clone(),
        }
    }

    /// The command as transmitted, `\r` included.
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        terminate(&self.to_wire_string())
    }
}

/// Append the terminator unless the text already ends with one.
pub fn terminate(command: &str) -> Vec<u8> {
    let mut bytes = command.as_bytes().to_vec();
    if bytes.last() != Some(&CR) {
        bytes.push(CR);
    }
    bytes
}

/// Prefix that selects a source on a zone: `SI` for the main zone, `Z<n>`
/// otherwise.
pub fn source_prefix(zone: u8) -> String {
    if zone <= 1 {
        prefix::SOURCE.to_string()
    } else {
        format!("Z{zone}")
    }
}

fn zone_prefix(zone: u8) -> String {
    if zone <= 1 {
        prefix::MAIN_ZONE.to_string()
    } else {
        format!("Z{zone}")
    }
}

fn sub_zone_prefix(zone: u8) -> String {
    if zone <= 1 {
        String::new()
    } else {
        format!("Z{zone}")
    }
}

fn volume_prefix(zone: u8) -> String {
    if zone <= 1 {
        prefix::MASTER_VOLUME.to_string()
    } else {
        format!("Z{zone}")
    }
}
