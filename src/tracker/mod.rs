//! Timed callbacks against media playing on the mixer.
//!
//! The mixer only reports position when asked, so every active source is
//! polled and its local clock re-anchored to whatever cursor comes back.
//! Start and stop come from mixer events.

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    common::{task::PeriodicTask, types::CueNumber},
    engine::MediaCue,
    gateway::MixerClient,
    protocol::{
        MEDIA_ACTION_TRIGGERED, MEDIA_PLAYBACK_ENDED, MEDIA_PLAYBACK_STARTED, MediaAction,
        MixerEvent,
    },
};

pub mod timeline;

pub use timeline::{TimeCallback, Timeline};

/// Poll period (ms) for active media.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Where authoritative playback positions come from.
#[async_trait]
pub trait MediaCursorSource: Send + Sync + 'static {
    /// Current cursor of `media` in milliseconds, if known.
    async fn media_cursor(&self, media: &str) -> Option<u64>;
}

#[async_trait]
impl MediaCursorSource for MixerClient {
    async fn media_cursor(&self, media: &str) -> Option<u64> {
        self.media_status(media).await.and_then(|s| s.cursor_ms)
    }
}

#[derive(Default)]
struct TrackedMedia {
    timeline: Timeline,
    poller: Option<PeriodicTask>,
}

struct TrackersInner {
    source: Arc<dyn MediaCursorSource>,
    poll_interval: Duration,
    media: Mutex<HashMap<String, TrackedMedia>>,
}

/// Registry of media timelines, one per media name.
#[derive(Clone)]
pub struct MediaTrackers {
    inner: Arc<TrackersInner>,
}

impl MediaTrackers {
    pub fn new(source: Arc<dyn MediaCursorSource>, poll_interval: Duration) -> Self {
        Self {
            inner: Arc::new(TrackersInner {
                source,
                poll_interval,
                media: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Calls `callback` once per playback session of `media`, as soon as
    /// its position reaches `offset_ms`.
    pub fn on_time<F>(&self, media: &str, offset_ms: u64, callback: F)
    where
        F: Fn(&str, u64) + Send + Sync + 'static,
    {
        self.inner
            .media
            .lock()
            .entry(media.to_owned())
            .or_default()
            .timeline
            .add(offset_ms, Arc::new(callback));
        debug!("Tracking {} at {}ms", media, offset_ms);
    }

    /// Arms every media cue of a show. `fire` receives the cue number when
    /// its media reaches the cue's offset. Returns how many were armed.
    pub fn arm_cues<F>(&self, media: &HashMap<String, Vec<MediaCue>>, fire: F) -> usize
    where
        F: Fn(&CueNumber) + Clone + Send + Sync + 'static,
    {
        let mut armed = 0;
        for (name, cues) in media {
            for cue in cues {
                let fire = fire.clone();
                let number = cue.cue.clone();
                self.on_time(name, cue.at_ms, move |_, _| fire(&number));
                armed += 1;
            }
        }
        armed
    }

    pub fn is_tracking(&self, media: &str) -> bool {
        self.inner.media.lock().contains_key(media)
    }

    pub fn is_active(&self, media: &str) -> bool {
        self.inner
            .media
            .lock()
            .get(media)
            .is_some_and(|m| m.timeline.is_active())
    }

    pub fn position_ms(&self, media: &str) -> Option<u64> {
        let now = Instant::now();
        self.inner.media.lock().get(media)?.timeline.position_ms(now)
    }

    /// Starts a new playback session: rewinds the clock, re-arms every
    /// callback and (re)starts polling.
    pub fn start(&self, media: &str) {
        let mut all = self.inner.media.lock();
        let Some(tracked) = all.get_mut(media) else {
            return;
        };

        let session = tracked.timeline.start(Instant::now());
        let weak = Arc::downgrade(&self.inner);
        let name = media.to_owned();
        tracked.poller = Some(PeriodicTask::spawn(self.inner.poll_interval, move || {
            poll(weak.clone(), name.clone(), session)
        }));
        info!("Media {} started (session {})", media, session);
    }

    /// Stops polling and idles the clock until the next start.
    pub fn stop(&self, media: &str) {
        let mut all = self.inner.media.lock();
        let Some(tracked) = all.get_mut(media) else {
            return;
        };
        if tracked.timeline.is_active() {
            info!("Media {} stopped", media);
        }
        tracked.timeline.stop();
        tracked.poller = None;
    }

    pub fn handle_event(&self, event: &MixerEvent) {
        let Some(media) = event.input_name() else {
            return;
        };

        match event.event_type.as_str() {
            MEDIA_PLAYBACK_STARTED => self.start(media),
            MEDIA_PLAYBACK_ENDED => self.stop(media),
            MEDIA_ACTION_TRIGGERED => {
                if matches!(
                    event.media_action(),
                    Some(MediaAction::Stop | MediaAction::Pause)
                ) {
                    self.stop(media);
                }
            }
            _ => {}
        }
    }

    /// Follows a mixer event stream until it closes.
    pub fn attach(&self, mut events: broadcast::Receiver<MixerEvent>) -> JoinHandle<()> {
        let trackers = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => trackers.handle_event(&event),
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Media tracker missed {} mixer events", missed);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

async fn poll(inner: Weak<TrackersInner>, media: String, session: u64) {
    let Some(source) = inner.upgrade().map(|i| i.source.clone()) else {
        return;
    };
    let cursor = source.media_cursor(&media).await;

    let Some(inner) = inner.upgrade() else {
        return;
    };
    let now = Instant::now();
    let due = {
        let mut all = inner.media.lock();
        let Some(tracked) = all.get_mut(&media) else {
            return;
        };
        let timeline = &mut tracked.timeline;
        if timeline.session() != session || !timeline.is_active() {
            debug!("Discarding stale poll for {}", media);
            return;
        }
        timeline.reanchor(now, cursor);
        timeline.take_due(now)
    };

    for (offset_ms, callback) in due {
        debug!("{} reached {}ms", media, offset_ms);
        callback(&media, offset_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct FakeSource {
        cursor: Mutex<Option<u64>>,
        delay: Mutex<Duration>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl MediaCursorSource for FakeSource {
        async fn media_cursor(&self, _media: &str) -> Option<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            *self.cursor.lock()
        }
    }

    fn recorder(trackers: &MediaTrackers, media: &str, offsets: &[u64]) -> Arc<Mutex<Vec<u64>>> {
        let fired = Arc::new(Mutex::new(Vec::new()));
        for &offset in offsets {
            let fired = fired.clone();
            trackers.on_time(media, offset, move |_, at| fired.lock().push(at));
        }
        fired
    }

    fn event(event_type: &str, data: serde_json::Value) -> MixerEvent {
        MixerEvent {
            event_type: event_type.into(),
            event_data: data,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_on_wall_clock_without_cursor() {
        let source = Arc::new(FakeSource::default());
        let trackers = MediaTrackers::new(source, Duration::from_millis(100));
        let fired = recorder(&trackers, "Intro", &[250, 120]);

        trackers.start("Intro");
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(fired.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*fired.lock(), vec![120]);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*fired.lock(), vec![120, 250]);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(*fired.lock(), vec![120, 250]);
    }

    #[tokio::test(start_paused = true)]
    async fn cursor_reanchors_the_clock() {
        let source = Arc::new(FakeSource::default());
        *source.cursor.lock() = Some(5_000);
        let trackers = MediaTrackers::new(source, Duration::from_millis(100));
        let fired = recorder(&trackers, "Intro", &[1_000, 9_000]);

        trackers.start("Intro");
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(*fired.lock(), vec![1_000]);
        let position = trackers.position_ms("Intro").unwrap();
        assert!((5_000..5_100).contains(&position));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_rearms_and_stop_idles() {
        let source = Arc::new(FakeSource::default());
        let trackers = MediaTrackers::new(source.clone(), Duration::from_millis(100));
        let fired = recorder(&trackers, "Intro", &[50]);

        trackers.start("Intro");
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(*fired.lock(), vec![50]);

        trackers.stop("Intro");
        assert!(!trackers.is_active("Intro"));
        let calls = source.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), calls);

        trackers.start("Intro");
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(*fired.lock(), vec![50, 50]);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_poll_results_are_dropped() {
        let source = Arc::new(FakeSource::default());
        *source.delay.lock() = Duration::from_millis(80);
        *source.cursor.lock() = Some(60_000);
        let trackers = MediaTrackers::new(source.clone(), Duration::from_millis(100));
        let fired = recorder(&trackers, "Intro", &[30_000]);

        trackers.start("Intro");
        // first poll is in flight at 100..180ms
        tokio::time::sleep(Duration::from_millis(120)).await;
        trackers.stop("Intro");
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(fired.lock().is_empty());
        assert!(!trackers.is_active("Intro"));
    }

    #[tokio::test(start_paused = true)]
    async fn events_drive_sessions() {
        let source = Arc::new(FakeSource::default());
        let trackers = MediaTrackers::new(source, Duration::from_millis(100));
        let fired = recorder(&trackers, "Intro", &[100]);

        trackers.handle_event(&event(MEDIA_PLAYBACK_STARTED, json!({"inputName": "Other"})));
        assert!(!trackers.is_tracking("Other"));

        trackers.handle_event(&event(MEDIA_PLAYBACK_STARTED, json!({"inputName": "Intro"})));
        assert!(trackers.is_active("Intro"));

        trackers.handle_event(&event(
            MEDIA_ACTION_TRIGGERED,
            json!({"inputName": "Intro", "mediaAction": "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_NEXT"}),
        ));
        assert!(trackers.is_active("Intro"));

        trackers.handle_event(&event(
            MEDIA_ACTION_TRIGGERED,
            json!({"inputName": "Intro", "mediaAction": "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_PAUSE"}),
        ));
        assert!(!trackers.is_active("Intro"));

        trackers.handle_event(&event(MEDIA_PLAYBACK_STARTED, json!({"inputName": "Intro"})));
        trackers.handle_event(&event(MEDIA_PLAYBACK_ENDED, json!({"inputName": "Intro"})));
        assert!(!trackers.is_active("Intro"));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(fired.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn armed_show_cues_fire_with_their_media() {
        let source = Arc::new(FakeSource::default());
        let trackers = MediaTrackers::new(source, Duration::from_millis(100));
        let media = HashMap::from([
            (
                "Intro".to_string(),
                vec![
                    MediaCue { at_ms: 300, cue: CueNumber::from(2) },
                    MediaCue { at_ms: 100, cue: CueNumber::from(1) },
                ],
            ),
            (
                "Outro".to_string(),
                vec![MediaCue { at_ms: 100, cue: CueNumber::from(9) }],
            ),
        ]);

        let fired = Arc::new(Mutex::new(Vec::new()));
        let armed = trackers.arm_cues(&media, {
            let fired = fired.clone();
            move |cue: &CueNumber| fired.lock().push(cue.to_string())
        });
        assert_eq!(armed, 3);
        assert!(trackers.is_tracking("Intro"));
        assert!(trackers.is_tracking("Outro"));

        trackers.start("Intro");
        tokio::time::sleep(Duration::from_millis(450)).await;
        assert_eq!(*fired.lock(), vec!["1", "2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn attach_follows_broadcast() {
        let source = Arc::new(FakeSource::default());
        let trackers = MediaTrackers::new(source, Duration::from_millis(100));
        let fired = recorder(&trackers, "Intro", &[100]);

        let (tx, rx) = broadcast::channel(8);
        let handle = trackers.attach(rx);
        tx.send(event(MEDIA_PLAYBACK_STARTED, json!({"inputName": "Intro"})))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(*fired.lock(), vec![100]);

        drop(tx);
        handle.await.unwrap();
    }
}
