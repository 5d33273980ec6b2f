use tokio::time::Instant;

/// The show's live position.
///
/// Effective position is `accumulated + (now - anchor)` while running and
/// exactly `accumulated` while held. Running means the anchor is set.
#[derive(Debug, Clone, Default)]
pub struct LiveClock {
    accumulated_ms: u64,
    anchor: Option<Instant>,
}

impl LiveClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn position_ms(&self, now: Instant) -> u64 {
        let elapsed = self
            .anchor
            .map(|anchor| now.saturating_duration_since(anchor).as_millis() as u64)
            .unwrap_or(0);
        self.accumulated_ms + elapsed
    }

    /// Starts the clock. Returns false when it was already running.
    pub fn go(&mut self, now: Instant) -> bool {
        if self.anchor.is_some() {
            return false;
        }
        self.anchor = Some(now);
        true
    }

    /// Folds elapsed time into the accumulated position and stops. Returns
    /// false when it was already held.
    pub fn hold(&mut self, now: Instant) -> bool {
        if self.anchor.is_none() {
            return false;
        }
        self.accumulated_ms = self.position_ms(now);
        self.anchor = None;
        true
    }

    /// Sets the position outright, keeping the running state.
    pub fn set_position(&mut self, position_ms: u64, now: Instant) {
        self.accumulated_ms = position_ms;
        if self.anchor.is_some() {
            self.anchor = Some(now);
        }
    }

    pub fn reset(&mut self) {
        self.accumulated_ms = 0;
        self.anchor = None;
    }
}
