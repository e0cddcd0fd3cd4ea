// MIT License - Copyright (c) 2026 Peter Wright
// Protocol constants

/// Record separator for inbound tokens and terminator for outbound commands.
pub const CR: u8 = b'\r';

/// Default control port of the receiver's telnet interface.
pub const DEFAULT_PORT: u16 = 23;

/// Fixed delay between connection attempts.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5000;

/// Size of the socket read buffer.
pub const READ_BUFFER_SIZE: usize = 4096;

/// Top-level token prefixes, in dispatch order.
pub mod prefix {
    pub const POWER: &str = "PW";
    pub const CHANNEL_VOLUME: &str = "CV";
    pub const SOURCE: &str = "SI";
    pub const ZONE2: &str = "Z2";
    pub const ZONE3: &str = "Z3";
    /// Must be tried before [`MASTER_VOLUME`].
    pub const MAX_VOLUME: &str = "MVMAX";
    pub const MASTER_VOLUME: &str = "MV";
    pub const MUTE: &str = "MU";
    pub const MAIN_ZONE: &str = "ZM";
    pub const VIDEO_SELECT: &str = "SV";
}

/// Sub-state codes understood inside a zone token.
pub mod zone_code {
    pub const ON: &str = "ON";
    pub const OFF: &str = "OFF";
    pub const MUTE_ON: &str = "MUON";
    pub const MUTE_OFF: &str = "MUOFF";
    pub const QUICK: &str = "QUICK";
    pub const CHANNEL_SETTING: &str = "CS";
    pub const CHANNEL_VOLUME: &str = "CV";
    /// End-of-list marker after a channel volume dump.
    pub const CHANNEL_VOLUME_END: &str = "CVEND";
    pub const HPF: &str = "HPF";
}

/// State keys produced by the decoder.
pub mod key {
    pub const POWER: &str = "power";
    pub const ZONE1: &str = "zone1";
    pub const ZONE2: &str = "zone2";
    pub const ZONE3: &str = "zone3";
    pub const ZONE1_VOL: &str = "zone1_vol";
    pub const ZONE1_VOL_MAX: &str = "zone1_vol_max";
    pub const ZONE1_MUTE: &str = "zone1_mute";
    pub const VIDEO_SELECT: &str = "video_select";
    /// Last non-empty token received, verbatim.
    pub const RAW_COMMAND: &str = "raw_command";

    pub const MUTE_SUFFIX: &str = "_mute";
    pub const QUICK_SUFFIX: &str = "_quick";
    pub const CHANNEL_SET_SUFFIX: &str = "_ch_set";
    pub const CHANNEL_VOLUME_SUFFIX: &str = "_ch_vol_";
    pub const HPF_SUFFIX: &str = "_hpf";
    pub const VOLUME_SUFFIX: &str = "_vol";
    pub const SOURCE_SUFFIX: &str = "_source";

    /// Zone key for a zone number (1-3).
    pub fn zone(zone: u8) -> String {
        format!("zone{zone}")
    }

    /// `zone<n>_source`, the key a source switch watches.
    pub fn zone_source(zone: u8) -> String {
        format!("zone{zone}{SOURCE_SUFFIX}")
    }
}

/// Queries sent after every successful connect, in order.
///
/// Answers arrive as ordinary status tokens; nothing correlates them with
/// the query that triggered them.
pub const STATUS_REQUESTS: &[&str] = &[
    // Main zone
    "PW?",
    "MV?",
    "CV?",
    "MU?",
    "SI?",
    "ZM?",
    "MS?",
    "SLP?",
    "SV?",
    // Zone 2
    "Z2?",
    "Z2MU?",
    "Z2CS?",
    "Z2CV?",
    "Z2HPF?",
    "Z2QUICK ?",
    // Zone 3
    "Z3?",
    "Z3MU?",
    "Z3CS?",
    "Z3CV?",
    "Z3HPF?",
    "Z3QUICK ?",
    // Tone, equalizer and level
    "PSTONE CTRL ?",
    "PSBAS ?",
    "PSTRE ?",
    "PSLFE ?",
    "PSDYNEQ ?",
    "PSDYNVOL ?",
    "PSMULTEQ: ?",
    "PSREFLEV ?",
];
