// MIT License - Copyright (c) 2026 Peter Wright
// Dimmable output driven by a level command

use crate::devices::{parse_level, PowerState};

const FULL_BRIGHTNESS: u8 = 255;

/// A light-like output: on/off commands plus a numeric level between
/// `min` and `max` on the wire, shown as brightness 0-255.
#[derive(Debug, Clone)]
pub struct Light {
    pub name: String,
    pub on_command: String,
    pub off_command: String,
    pub level_prefix: String,
    pub min: u32,
    pub max: u32,
    pub icon: Option<String>,
    state: Option<PowerState>,
    brightness: Option<u8>,
}

impl Light {
    pub fn new(
        name: impl Into<String>,
        on_command: impl Into<String>,
        off_command: impl Into<String>,
        level_prefix: impl Into<String>,
        min: u32,
        max: u32,
    ) -> Self {
        Self {
            name: name.into(),
            on_command: on_command.into(),
            off_command: off_command.into(),
            level_prefix: level_prefix.into(),
            min,
            max,
            icon: None,
            state: None,
            brightness: None,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn state(&self) -> Option<PowerState> {
        self.state
    }

    pub fn brightness(&self) -> Option<u8> {
        self.brightness
    }

    pub fn apply_raw(&mut self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        if token == self.on_command {
            return self.set_state(PowerState::On);
        }
        if token == self.off_command {
            return self.set_state(PowerState::Off);
        }
        if let Some(level) = token
            .strip_prefix(self.level_prefix.as_str())
            .and_then(parse_level)
        {
            let brightness = Some(self.brightness_for_level(level));
            let changed = self.brightness != brightness;
            self.brightness = brightness;
            return changed;
        }
        false
    }

    /// On command, followed by a level command when `brightness` differs
    /// from the last known one. No brightness means full brightness.
    pub fn turn_on_commands(&mut self, brightness: Option<u8>) -> Vec<String> {
        let brightness = brightness.unwrap_or(FULL_BRIGHTNESS);
        let mut commands = vec![self.on_command.clone()];
        if self.brightness != Some(brightness) {
            self.brightness = Some(brightness);
            commands.push(format!(
                "{}{}",
                self.level_prefix,
                self.level_for_brightness(brightness)
            ));
        }
        commands
    }

    pub fn turn_off_command(&self) -> String {
        self.off_command.clone()
    }

    pub fn brightness_for_level(&self, level: u32) -> u8 {
        let span = self.max.saturating_sub(self.min).max(1);
        let offset = level.clamp(self.min, self.min + span) - self.min;
        (offset * 255 / span) as u8
    }

    pub fn level_for_brightness(&self, brightness: u8) -> u32 {
        let span = self.max.saturating_sub(self.min);
        u32::from(brightness) * span / 255 + self.min
    }

    fn set_state(&mut self, state: PowerState) -> bool {
        let changed = self.state != Some(state);
        self.state = Some(state);
        changed
    }
}
