/// Delay (ms) between a dropped mixer connection and the next attempt.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 500;

/// Deadline (ms) for a mixer request before it resolves empty.
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 500;

/// Timeout (ms) allowed for the WS write task to shut down gracefully.
pub const WRITE_TASK_SHUTDOWN_MS: u64 = 500;

/// Mixer events buffered per subscriber before a slow one starts lagging.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;
