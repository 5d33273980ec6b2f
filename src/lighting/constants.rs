/// Root of every console address.
pub const EOS_PREFIX: &str = "/eos";

/// Cue list targeted when none is configured.
pub const DEFAULT_CUE_LIST: u32 = 1;

/// Delay (ms) between a dropped console connection and the next attempt.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 500;
