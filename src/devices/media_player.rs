// MIT License - Copyright (c) 2026 Peter Wright
// Zone modelled as a media player: power, mute, volume and source

use bitflags::bitflags;
use tracing::debug;

use crate::devices::{parse_level, PowerState};

bitflags! {
    /// Operations a media player accepts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MediaPlayerFeatures: u32 {
        const SELECT_SOURCE = 0x0001;
        const TURN_ON       = 0x0002;
        const TURN_OFF      = 0x0004;
        const VOLUME_MUTE   = 0x0008;
        const VOLUME_SET    = 0x0010;
        const VOLUME_STEP   = 0x0020;
    }
}

/// Wire commands for one zone, e.g. `ZMON` / `ZMOFF` / `MUON` / `MV` / `SI`
/// for the main zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPlayerCommands {
    pub on: String,
    pub off: String,
    pub mute_on: String,
    pub mute_off: String,
    pub volume_up: String,
    pub volume_down: String,
    pub volume_prefix: String,
    pub source_prefix: String,
}

impl MediaPlayerCommands {
    /// Standard command set for zone 1, 2 or 3.
    pub fn for_zone(zone: u8) -> Self {
        if zone <= 1 {
            return Self {
                on: "ZMON".into(),
                off: "ZMOFF".into(),
                mute_on: "MUON".into(),
                mute_off: "MUOFF".into(),
                volume_up: "MVUP".into(),
                volume_down: "MVDOWN".into(),
                volume_prefix: "MV".into(),
                source_prefix: "SI".into(),
            };
        }
        let prefix = format!("Z{zone}");
        Self {
            on: format!("{prefix}ON"),
            off: format!("{prefix}OFF"),
            mute_on: format!("{prefix}MUON"),
            mute_off: format!("{prefix}MUOFF"),
            volume_up: format!("{prefix}UP"),
            volume_down: format!("{prefix}DOWN"),
            volume_prefix: prefix.clone(),
            source_prefix: prefix,
        }
    }
}

/// Selectable input: display name and the receiver's code for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    pub code: String,
}

impl Source {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MediaPlayer {
    pub name: String,
    pub commands: MediaPlayerCommands,
    pub min: u32,
    pub max: u32,
    pub icon: Option<String>,
    sources: Vec<Source>,
    state: Option<PowerState>,
    volume: Option<f32>,
    muted: Option<bool>,
    source: Option<String>,
}

impl MediaPlayer {
    /// A player with the receiver's usual 0-99 volume range and no sources.
    pub fn new(name: impl Into<String>, commands: MediaPlayerCommands) -> Self {
        Self {
            name: name.into(),
            commands,
            min: 0,
            max: 99,
            icon: None,
            sources: Vec::new(),
            state: None,
            volume: None,
            muted: None,
            source: None,
        }
    }

    pub fn with_range(mut self, min: u32, max: u32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_sources(mut self, sources: Vec<Source>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn state(&self) -> Option<PowerState> {
        self.state
    }

    /// Volume as a fraction of the configured range.
    pub fn volume(&self) -> Option<f32> {
        self.volume
    }

    pub fn is_muted(&self) -> Option<bool> {
        self.muted
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn source_list(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn supported_features(&self) -> MediaPlayerFeatures {
        MediaPlayerFeatures::all()
    }

    /// Update from a raw token. Returns true if anything changed.
    ///
    /// A numeric suffix after the volume prefix is a volume report. Anything
    /// else after the source prefix is looked up as a source code, so zones
    /// that share one prefix for both still see source changes.
    pub fn apply_raw(&mut self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        if token == self.commands.on {
            debug!("{}: Power on", self.name);
            return replace(&mut self.state, PowerState::On);
        }
        if token == self.commands.off {
            debug!("{}: Power off", self.name);
            return replace(&mut self.state, PowerState::Off);
        }
        if token == self.commands.mute_on {
            return replace(&mut self.muted, true);
        }
        if token == self.commands.mute_off {
            return replace(&mut self.muted, false);
        }

        if let Some(level) = token
            .strip_prefix(self.commands.volume_prefix.as_str())
            .and_then(parse_volume_level)
        {
            let volume = self.volume_for_level(level);
            debug!("{}: Volume {}", self.name, volume);
            return replace(&mut self.volume, volume);
        }

        if let Some(code) = token.strip_prefix(self.commands.source_prefix.as_str())
            && let Some(source) = self.sources.iter().find(|s| s.code == code)
        {
            if self.source.as_deref() == Some(source.name.as_str()) {
                return false;
            }
            debug!("{}: Source {}", self.name, source.name);
            self.source = Some(source.name.clone());
            return true;
        }
        false
    }

    pub fn turn_on_command(&self) -> String {
        self.commands.on.clone()
    }

    pub fn turn_off_command(&self) -> String {
        self.commands.off.clone()
    }

    pub fn mute_command(&self, mute: bool) -> String {
        if mute {
            self.commands.mute_on.clone()
        } else {
            self.commands.mute_off.clone()
        }
    }

    pub fn volume_up_command(&self) -> String {
        self.commands.volume_up.clone()
    }

    pub fn volume_down_command(&self) -> String {
        self.commands.volume_down.clone()
    }

    /// Absolute volume; `level` is clamped to 0.0-1.0 and mapped onto the range.
    pub fn set_volume_command(&self, level: f32) -> String {
        format!(
            "{}{:02}",
            self.commands.volume_prefix,
            self.level_for_volume(level)
        )
    }

    /// Source by display name. An unknown name becomes a source query.
    pub fn select_source_command(&self, name: &str) -> String {
        let code = self
            .sources
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.code.as_str())
            .unwrap_or("?");
        format!("{}{}", self.commands.source_prefix, code)
    }

    fn span(&self) -> u32 {
        self.max.saturating_sub(self.min).max(1)
    }

    fn volume_for_level(&self, level: f32) -> f32 {
        let min = self.min as f32;
        let span = self.span() as f32;
        (level.clamp(min, min + span) - min) / span
    }

    fn level_for_volume(&self, volume: f32) -> u32 {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        (volume * self.max.saturating_sub(self.min) as f32).round() as u32 + self.min
    }
}

/// Volume level from a report: two digits are whole steps, three digits
/// carry a trailing half step (`455` is 45.5).
fn parse_volume_level(text: &str) -> Option<f32> {
    let level = parse_level(text)?;
    if text.len() == 3 {
        Some(level as f32 / 10.0)
    } else {
        Some(level as f32)
    }
}

fn replace<T: PartialEq>(slot: &mut Option<T>, value: T) -> bool {
    let changed = slot.as_ref() != Some(&value);
    *slot = Some(value);
    changed
}
