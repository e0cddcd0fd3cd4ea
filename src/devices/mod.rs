// MIT License - Copyright (c) 2026 Peter Wright
// Device models driven by receiver traffic

pub mod light;
pub mod media_player;
pub mod switch;

pub use light::Light;
pub use media_player::{MediaPlayer, MediaPlayerCommands, MediaPlayerFeatures, Source};
pub use switch::{Switch, SwitchMode};

/// On/off state as last reported by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }
}

/// Any configured device, so callers can route traffic without caring
/// which kind it is.
#[derive(Debug, Clone)]
pub enum Device {
    Switch(Switch),
    Light(Light),
    MediaPlayer(MediaPlayer),
}

impl Device {
    pub fn name(&self) -> &str {
        match self {
            Self::Switch(d) => &d.name,
            Self::Light(d) => &d.name,
            Self::MediaPlayer(d) => &d.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Switch(_) => "switch",
            Self::Light(_) => "light",
            Self::MediaPlayer(_) => "media_player",
        }
    }

    pub fn power(&self) -> Option<PowerState> {
        match self {
            Self::Switch(d) => d.state(),
            Self::Light(d) => d.state(),
            Self::MediaPlayer(d) => d.state(),
        }
    }

    /// Feed a raw token. Returns true if the device state changed.
    pub fn apply_raw(&mut self, token: &str) -> bool {
        match self {
            Self::Switch(d) => d.apply_raw(token),
            Self::Light(d) => d.apply_raw(token),
            Self::MediaPlayer(d) => d.apply_raw(token),
        }
    }

    /// Feed a decoded state update. Returns true if the device state changed.
    pub fn apply_state(&mut self, key: &str, value: &str) -> bool {
        match self {
            Self::Switch(d) => d.apply_state(key, value),
            Self::Light(_) | Self::MediaPlayer(_) => false,
        }
    }

    pub fn turn_on_commands(&mut self) -> Vec<String> {
        match self {
            Self::Switch(d) => vec![d.turn_on_command()],
            Self::Light(d) => d.turn_on_commands(None),
            Self::MediaPlayer(d) => vec![d.turn_on_command()],
        }
    }

    pub fn turn_off_command(&self) -> String {
        match self {
            Self::Switch(d) => d.turn_off_command(),
            Self::Light(d) => d.turn_off_command(),
            Self::MediaPlayer(d) => d.turn_off_command(),
        }
    }
}

/// Digits only, at least one.
pub(crate) fn parse_level(text: &str) -> Option<u32> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("45"), Some(45));
        assert_eq!(parse_level("045"), Some(45));
        assert_eq!(parse_level(""), None);
        assert_eq!(parse_level("4A"), None);
        assert_eq!(parse_level("-1"), None);
    }

    #[test]
    fn test_device_routing() {
        let mut device = Device::Switch(Switch::raw("Zone 2", "Z2ON", "Z2OFF"));
        assert_eq!(device.kind(), "switch");
        assert!(device.apply_raw("Z2ON"));
        assert_eq!(device.power(), Some(PowerState::On));
        assert_eq!(device.turn_off_command(), "Z2OFF");
        assert!(!device.apply_state("zone2", "OFF"));
    }

    #[test]
    fn test_light_turn_on_sets_full_brightness() {
        let mut device = Device::Light(Light::new("Display", "DIM BRI", "DIM OFF", "DIM ", 0, 3));
        assert_eq!(device.turn_on_commands(), vec!["DIM BRI", "DIM 3"]);
        assert_eq!(device.turn_on_commands(), vec!["DIM BRI"]);
    }
}
