// MIT License - Copyright (c) 2026 Peter Wright
// On/off switch bound to a command pair or to a zone's source

use crate::constants::key;
use crate::devices::PowerState;
use crate::protocol::source_prefix;

/// What drives a switch's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchMode {
    /// On when the receiver echoes `on_command`, off on `off_command`.
    Raw,
    /// On while `zone<n>_source` equals `source`.
    Source { zone: u8, source: String },
}

#[derive(Debug, Clone)]
pub struct Switch {
    pub name: String,
    pub on_command: String,
    pub off_command: String,
    pub icon: Option<String>,
    pub mode: SwitchMode,
    state: Option<PowerState>,
}

impl Switch {
    /// A switch whose state follows two literal tokens.
    pub fn raw(
        name: impl Into<String>,
        on_command: impl Into<String>,
        off_command: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            on_command: on_command.into(),
            off_command: off_command.into(),
            icon: None,
            mode: SwitchMode::Raw,
            state: None,
        }
    }

    /// A switch that selects `source` on `zone` and reads as on while that
    /// source is active. Turning it off just queries the zone.
    pub fn source(name: impl Into<String>, zone: u8, source: impl Into<String>) -> Self {
        let source = source.into();
        let prefix = source_prefix(zone);
        Self {
            name: name.into(),
            on_command: format!("{prefix}{source}"),
            off_command: format!("{prefix}?"),
            icon: None,
            mode: SwitchMode::Source { zone, source },
            state: None,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn state(&self) -> Option<PowerState> {
        self.state
    }

    pub fn is_on(&self) -> bool {
        self.state == Some(PowerState::On)
    }

    pub fn apply_raw(&mut self, token: &str) -> bool {
        if self.mode != SwitchMode::Raw || token.is_empty() {
            return false;
        }
        if token == self.on_command {
            self.set(PowerState::On)
        } else if token == self.off_command {
            self.set(PowerState::Off)
        } else {
            false
        }
    }

    pub fn apply_state(&mut self, state_key: &str, value: &str) -> bool {
        let SwitchMode::Source { zone, source } = &self.mode else {
            return false;
        };
        if state_key != key::zone_source(*zone) {
            return false;
        }
        let state = if value == source.as_str() {
            PowerState::On
        } else {
            PowerState::Off
        };
        self.set(state)
    }

    pub fn turn_on_command(&self) -> String {
        self.on_command.clone()
    }

    pub fn turn_off_command(&self) -> String {
        self.off_command.clone()
    }

    fn set(&mut self, state: PowerState) -> bool {
        let changed = self.state != Some(state);
        self.state = Some(state);
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_switch() {
        let mut switch = Switch::raw("Zone 2", "Z2ON", "Z2OFF");
        assert_eq!(switch.state(), None);
        assert!(switch.apply_raw("Z2ON"));
        assert!(switch.is_on());
        assert!(!switch.apply_raw("Z2ON"));
        assert!(!switch.apply_raw("Z2MUON"));
        assert!(!switch.apply_raw(""));
        assert!(switch.apply_raw("Z2OFF"));
        assert_eq!(switch.state(), Some(PowerState::Off));
    }

    #[test]
    fn test_source_switch_commands() {
        let main = Switch::source("CD", 1, "CD");
        assert_eq!(main.turn_on_command(), "SICD");
        assert_eq!(main.turn_off_command(), "SI?");

        let zone2 = Switch::source("Zone 2 Tuner", 2, "TUNER");
        assert_eq!(zone2.turn_on_command(), "Z2TUNER");
        assert_eq!(zone2.turn_off_command(), "Z2?");
    }

    #[test]
    fn test_source_switch_follows_zone_source() {
        let mut switch = Switch::source("Zone 2 Tuner", 2, "TUNER");
        assert!(!switch.apply_state("zone1_source", "TUNER"));
        assert!(switch.apply_state("zone2_source", "TUNER"));
        assert!(switch.is_on());
        assert!(switch.apply_state("zone2_source", "CD"));
        assert!(!switch.is_on());
        // Raw tokens do not drive a source switch
        assert!(!switch.apply_raw("Z2TUNER"));
    }
}
