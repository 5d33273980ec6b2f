use std::{sync::Arc, time::Duration};

use tokio::time::Instant;
use tracing::debug;

/// Invoked with the media name and the offset the callback was scheduled at.
pub type TimeCallback = Arc<dyn Fn(&str, u64) + Send + Sync>;

struct TimedCallback {
    offset_ms: u64,
    fired: bool,
    callback: TimeCallback,
}

/// Elapsed-time bookkeeping for one media source.
///
/// Position is `now - anchor` while a playback session is active. Each
/// callback fires at most once per session, in ascending offset order.
#[derive(Default)]
pub struct Timeline {
    callbacks: Vec<TimedCallback>,
    anchor: Option<Instant>,
    session: u64,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a callback. Equal offsets keep registration order.
    pub fn add(&mut self, offset_ms: u64, callback: TimeCallback) {
        let at = self.callbacks.partition_point(|c| c.offset_ms <= offset_ms);
        self.callbacks.insert(
            at,
            TimedCallback {
                offset_ms,
                fired: false,
                callback,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Begins a new playback session anchored at `now`. Returns its number.
    pub fn start(&mut self, now: Instant) -> u64 {
        self.anchor = Some(now);
        self.session += 1;
        for c in &mut self.callbacks {
            c.fired = false;
        }
        self.session
    }

    pub fn stop(&mut self) {
        self.anchor = None;
    }

    pub fn is_active(&self) -> bool {
        self.anchor.is_some()
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// Moves the anchor so the position at `now` equals the reported cursor.
    /// Without a cursor the wall-clock estimate stands.
    pub fn reanchor(&mut self, now: Instant, cursor_ms: Option<u64>) {
        if self.anchor.is_none() {
            return;
        }
        let Some(cursor_ms) = cursor_ms else {
            return;
        };
        match now.checked_sub(Duration::from_millis(cursor_ms)) {
            Some(anchor) => self.anchor = Some(anchor),
            None => debug!(
                "Reported cursor {}ms predates the local clock, keeping wall-clock estimate",
                cursor_ms
            ),
        }
    }

    pub fn position_ms(&self, now: Instant) -> Option<u64> {
        self.anchor
            .map(|anchor| now.saturating_duration_since(anchor).as_millis() as u64)
    }

    /// Marks every unfired callback at or before the current position as
    /// fired and returns them in offset order.
    pub fn take_due(&mut self, now: Instant) -> Vec<(u64, TimeCallback)> {
        let Some(position) = self.position_ms(now) else {
            return Vec::new();
        };

        self.callbacks
            .iter_mut()
            .take_while(|c| c.offset_ms <= position)
            .filter(|c| !c.fired)
            .map(|c| {
                c.fired = true;
                (c.offset_ms, c.callback.clone())
            })
            .collect()
    }
}
