//! The live cue-stack engine: one authoritative show clock and a cursor
//! that walks the active scene's cue stack as the clock passes each entry.
//!
//! The engine is a single task. Commands arrive over a channel and the
//! advancement tick runs in the same loop, so clock and cursor have exactly
//! one writer.

use std::{collections::HashMap, time::Duration};

use serde::Serialize;
use serde_json::Value;
use tokio::{
    sync::{broadcast, oneshot},
    task::JoinHandle,
    time::{Instant, Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    common::errors::{ControlError, ControlResult},
    configs::EngineConfig,
};

pub mod clock;
pub mod stack;

pub use clock::LiveClock;
pub use stack::{CueEntry, CueKind, CueStack, MediaCue, ShowFile};

/// Advancement tick period (ms).
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 50;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Broadcast to every control surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Clock { position_ms: u64, running: bool },
    Cursor { scene: Option<String>, cursor: usize },
    Scene { scene: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineSnapshot {
    pub position_ms: u64,
    pub running: bool,
    pub cursor: usize,
    pub scene: Option<String>,
    pub cue_count: usize,
}

type Reply<T> = oneshot::Sender<ControlResult<T>>;

enum EngineCommand {
    Go(Reply<EngineSnapshot>),
    Hold(Reply<EngineSnapshot>),
    Seek(u64, Reply<EngineSnapshot>),
    Sync(u64, Reply<EngineSnapshot>),
    SwitchScene(String, Reply<EngineSnapshot>),
    LoadScene(String, CueStack, Reply<()>),
    Snapshot(Reply<EngineSnapshot>),
}

/// Cloneable front door to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    commands: flume::Sender<EngineCommand>,
    events: broadcast::Sender<EngineEvent>,
    cancel_token: CancellationToken,
}

impl EngineHandle {
    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> EngineCommand) -> ControlResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send_async(make(tx))
            .await
            .map_err(|_| ControlError::connection("live engine stopped"))?;
        rx.await
            .map_err(|_| ControlError::connection("live engine stopped"))?
    }

    pub async fn go(&self) -> ControlResult<EngineSnapshot> {
        self.call(EngineCommand::Go).await
    }

    pub async fn hold(&self) -> ControlResult<EngineSnapshot> {
        self.call(EngineCommand::Hold).await
    }

    /// Jumps to `position_ms` and recomputes the cursor from scratch.
    pub async fn seek(&self, position_ms: u64) -> ControlResult<EngineSnapshot> {
        self.call(|tx| EngineCommand::Seek(position_ms, tx)).await
    }

    /// Corrects the displayed position without touching the cursor.
    pub async fn sync(&self, position_ms: u64) -> ControlResult<EngineSnapshot> {
        self.call(|tx| EngineCommand::Sync(position_ms, tx)).await
    }

    pub async fn switch_scene(&self, scene: &str) -> ControlResult<EngineSnapshot> {
        let scene = scene.to_owned();
        self.call(|tx| EngineCommand::SwitchScene(scene, tx)).await
    }

    /// Stores a scene's cue stack. Replacing the active scene's stack takes
    /// effect on the next switch.
    pub async fn load_scene(&self, scene: &str, entries: Vec<CueEntry>) -> ControlResult<()> {
        let scene = scene.to_owned();
        let stack = CueStack::new(entries);
        self.call(|tx| EngineCommand::LoadScene(scene, stack, tx)).await
    }

    /// Validates a JSON cue stack and stores it. Nothing changes when it is
    /// malformed.
    pub async fn load_scene_json(&self, scene: &str, entries: Value) -> ControlResult<()> {
        let scene = scene.to_owned();
        let stack = CueStack::from_json(entries)?;
        self.call(|tx| EngineCommand::LoadScene(scene, stack, tx)).await
    }

    /// Loads every scene of a cue file and switches to its active scene.
    pub async fn load_show(&self, show: ShowFile) -> ControlResult<usize> {
        let mut stacks = Vec::with_capacity(show.scenes.len());
        for (scene, entries) in show.scenes {
            let stack = CueStack::from_json(entries).map_err(|e| match e {
                ControlError::Validation(reason) => {
                    ControlError::validation(format!("scene {scene}: {reason}"))
                }
                other => other,
            })?;
            stacks.push((scene, stack));
        }

        let count = stacks.len();
        for (scene, stack) in stacks {
            self.call(|tx| EngineCommand::LoadScene(scene, stack, tx))
                .await?;
        }
        if let Some(active) = show.active {
            self.switch_scene(&active).await?;
        }
        Ok(count)
    }

    pub async fn snapshot(&self) -> ControlResult<EngineSnapshot> {
        self.call(EngineCommand::Snapshot).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

pub struct LiveEngine {
    clock: LiveClock,
    cursor: usize,
    scenes: HashMap<String, CueStack>,
    active_scene: Option<String>,
    active: CueStack,
    ticker: Interval,
    tick_interval: Duration,
    events: broadcast::Sender<EngineEvent>,
}

impl LiveEngine {
    pub fn spawn(config: &EngineConfig) -> (EngineHandle, JoinHandle<()>) {
        let (commands, rx) = flume::unbounded();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let cancel_token = CancellationToken::new();

        let tick_interval = config.tick_interval();
        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let engine = LiveEngine {
            clock: LiveClock::new(),
            cursor: 0,
            scenes: HashMap::new(),
            active_scene: None,
            active: CueStack::default(),
            ticker,
            tick_interval,
            events: events.clone(),
        };

        let handle = EngineHandle {
            commands,
            events,
            cancel_token: cancel_token.clone(),
        };
        let task = tokio::spawn(engine.run(rx, cancel_token));
        (handle, task)
    }

    async fn run(mut self, commands: flume::Receiver<EngineCommand>, cancel: CancellationToken) {
        debug!("Live engine running, tick {:?}", self.tick_interval);
        loop {
            let running = self.clock.is_running();
            tokio::select! {
                _ = cancel.cancelled() => break,
                command = commands.recv_async() => match command {
                    Ok(command) => self.apply(command),
                    Err(_) => break,
                },
                _ = self.ticker.tick(), if running => self.tick(Instant::now()),
            }
        }
        debug!("Live engine stopped");
    }

    fn apply(&mut self, command: EngineCommand) {
        let now = Instant::now();
        match command {
            EngineCommand::Go(reply) => {
                self.go(now);
                let _ = reply.send(Ok(self.snapshot(now)));
            }
            EngineCommand::Hold(reply) => {
                self.hold(now);
                let _ = reply.send(Ok(self.snapshot(now)));
            }
            EngineCommand::Seek(position_ms, reply) => {
                self.seek(position_ms, now);
                let _ = reply.send(Ok(self.snapshot(now)));
            }
            EngineCommand::Sync(position_ms, reply) => {
                self.clock.set_position(position_ms, now);
                debug!("Synced to {}ms", position_ms);
                self.publish_clock(now);
                let _ = reply.send(Ok(self.snapshot(now)));
            }
            EngineCommand::SwitchScene(scene, reply) => {
                let result = self.switch_scene(scene, now).map(|_| self.snapshot(now));
                let _ = reply.send(result);
            }
            EngineCommand::LoadScene(scene, stack, reply) => {
                info!("Loaded scene {} ({} cues)", scene, stack.len());
                self.scenes.insert(scene, stack);
                let _ = reply.send(Ok(()));
            }
            EngineCommand::Snapshot(reply) => {
                let _ = reply.send(Ok(self.snapshot(now)));
            }
        }
    }

    fn go(&mut self, now: Instant) {
        if self.clock.go(now) {
            self.ticker.reset();
            info!("GO at {}ms", self.clock.position_ms(now));
        }
        self.publish_clock(now);
    }

    fn hold(&mut self, now: Instant) {
        if self.clock.hold(now) {
            info!("HOLD at {}ms", self.clock.position_ms(now));
        }
        self.publish_clock(now);
    }

    fn seek(&mut self, position_ms: u64, now: Instant) {
        self.clock.set_position(position_ms, now);
        self.cursor = self.active.cursor_for(position_ms);
        info!("SEEK to {}ms, cursor {}", position_ms, self.cursor);
        self.publish_cursor();
        self.publish_clock(now);
    }

    fn switch_scene(&mut self, scene: String, now: Instant) -> ControlResult<()> {
        let Some(stack) = self.scenes.get(&scene) else {
            warn!("Unknown scene {}", scene);
            return Err(ControlError::validation(format!("unknown scene {scene}")));
        };

        self.active = stack.clone();
        self.active_scene = Some(scene.clone());
        self.clock.reset();
        self.cursor = 0;
        info!("Switched to scene {} ({} cues)", scene, self.active.len());

        let _ = self.events.send(EngineEvent::Scene { scene });
        self.publish_cursor();
        self.publish_clock(now);
        Ok(())
    }

    fn tick(&mut self, now: Instant) {
        let position = self.clock.position_ms(now);
        let cursor = self.active.advance(self.cursor, position);
        if cursor == self.cursor {
            return;
        }

        self.cursor = cursor;
        debug!("Cursor {} at {}ms", cursor, position);
        self.publish_cursor();

        let passed = cursor.checked_sub(1).and_then(|i| self.active.get(i));
        if passed.is_some_and(|entry| entry.kind == CueKind::Hold) {
            info!("Hold cue reached");
            self.hold(now);
        }
    }

    fn snapshot(&self, now: Instant) -> EngineSnapshot {
        EngineSnapshot {
            position_ms: self.clock.position_ms(now),
            running: self.clock.is_running(),
            cursor: self.cursor,
            scene: self.active_scene.clone(),
            cue_count: self.active.len(),
        }
    }

    fn publish_clock(&self, now: Instant) {
        let _ = self.events.send(EngineEvent::Clock {
            position_ms: self.clock.position_ms(now),
            running: self.clock.is_running(),
        });
    }

    fn publish_cursor(&self) {
        let _ = self.events.send(EngineEvent::Cursor {
            scene: self.active_scene.clone(),
            cursor: self.cursor,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> EngineHandle {
        LiveEngine::spawn(&EngineConfig::default()).0
    }

    fn entries(cues: &[(u64, CueKind)]) -> Vec<CueEntry> {
        cues.iter()
            .map(|&(p, kind)| CueEntry::new(p, kind, json!({ "at": p })))
            .collect()
    }

    async fn load_and_switch(engine: &EngineHandle, cues: &[(u64, CueKind)]) {
        engine.load_scene("act", entries(cues)).await.unwrap();
        engine.switch_scene("act").await.unwrap();
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test(start_paused = true)]
    async fn go_and_hold_fold_elapsed_time() {
        let engine = engine();
        let snap = engine.go().await.unwrap();
        assert!(snap.running);

        tokio::time::sleep(ms(1_000)).await;
        let snap = engine.hold().await.unwrap();
        assert!(!snap.running);
        assert_eq!(snap.position_ms, 1_000);

        tokio::time::sleep(ms(5_000)).await;
        assert_eq!(engine.snapshot().await.unwrap().position_ms, 1_000);

        engine.go().await.unwrap();
        tokio::time::sleep(ms(500)).await;
        assert_eq!(engine.snapshot().await.unwrap().position_ms, 1_500);
    }

    #[tokio::test(start_paused = true)]
    async fn cursor_follows_the_clock() {
        let engine = engine();
        load_and_switch(
            &engine,
            &[
                (100, CueKind::Normal),
                (200, CueKind::Normal),
                (1_000, CueKind::Normal),
            ],
        )
        .await;
        let mut events = engine.subscribe();

        engine.go().await.unwrap();
        tokio::time::sleep(ms(260)).await;
        assert_eq!(engine.snapshot().await.unwrap().cursor, 2);

        let mut cursors = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let EngineEvent::Cursor { cursor, scene } = event {
                assert_eq!(scene.as_deref(), Some("act"));
                cursors.push(cursor);
            }
        }
        assert_eq!(cursors, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn hold_cue_stops_the_clock() {
        let engine = engine();
        load_and_switch(
            &engine,
            &[
                (100, CueKind::Normal),
                (300, CueKind::Hold),
                (500, CueKind::Normal),
            ],
        )
        .await;

        engine.go().await.unwrap();
        tokio::time::sleep(ms(1_000)).await;

        let snap = engine.snapshot().await.unwrap();
        assert!(!snap.running);
        assert_eq!(snap.cursor, 2);
        assert_eq!(snap.position_ms, 300);

        engine.go().await.unwrap();
        tokio::time::sleep(ms(260)).await;
        assert_eq!(engine.snapshot().await.unwrap().cursor, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn seek_recomputes_cursor_from_scratch() {
        let engine = engine();
        load_and_switch(
            &engine,
            &[
                (0, CueKind::Normal),
                (100, CueKind::Hold),
                (100, CueKind::Normal),
                (900, CueKind::Normal),
            ],
        )
        .await;

        assert_eq!(engine.seek(10_000).await.unwrap().cursor, 4);
        assert_eq!(engine.seek(100).await.unwrap().cursor, 3);
        assert_eq!(engine.seek(99).await.unwrap().cursor, 1);
        let snap = engine.seek(100).await.unwrap();
        assert_eq!(snap.cursor, 3);
        assert_eq!(snap.position_ms, 100);
        assert!(!snap.running);
    }

    #[tokio::test(start_paused = true)]
    async fn sync_keeps_cursor() {
        let engine = engine();
        load_and_switch(
            &engine,
            &[
                (100, CueKind::Normal),
                (200, CueKind::Normal),
            ],
        )
        .await;

        engine.seek(250).await.unwrap();
        let snap = engine.sync(0).await.unwrap();
        assert_eq!(snap.cursor, 2);
        assert_eq!(snap.position_ms, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn switch_scene_resets_everything() {
        let engine = engine();
        engine.load_scene("a", entries(&[(100, CueKind::Normal)])).await.unwrap();
        engine.load_scene("b", entries(&[(50, CueKind::Normal), (60, CueKind::Normal)])).await.unwrap();
        engine.switch_scene("a").await.unwrap();
        engine.go().await.unwrap();
        tokio::time::sleep(ms(200)).await;
        assert_eq!(engine.snapshot().await.unwrap().cursor, 1);

        let mut events = engine.subscribe();
        let snap = engine.switch_scene("b").await.unwrap();
        assert_eq!(
            snap,
            EngineSnapshot {
                position_ms: 0,
                running: false,
                cursor: 0,
                scene: Some("b".into()),
                cue_count: 2,
            }
        );
        assert_eq!(events.try_recv().unwrap(), EngineEvent::Scene { scene: "b".into() });
        assert_eq!(
            events.try_recv().unwrap(),
            EngineEvent::Cursor { scene: Some("b".into()), cursor: 0 }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            EngineEvent::Clock { position_ms: 0, running: false }
        );
    }

    #[tokio::test]
    async fn rejects_unknown_scene_and_bad_stacks() {
        let engine = engine();
        assert!(matches!(
            engine.switch_scene("nowhere").await,
            Err(ControlError::Validation(_))
        ));

        engine.load_scene_json("a", json!([{"position_ms": 5}])).await.unwrap();
        assert!(engine.load_scene_json("a", json!([{"type": "HOLD"}])).await.is_err());

        let snap = engine.switch_scene("a").await.unwrap();
        assert_eq!(snap.cue_count, 1);
    }

    #[tokio::test]
    async fn load_show_switches_to_active_scene() {
        let engine = engine();
        let show = ShowFile::parse(
            r#"{"scenes": {
                    "Act 1": [{"position": "0:02"}, {"position_ms": 500, "type": "HOLD"}],
                    "Act 2": []
                },
                "active": "Act 1"}"#,
        )
        .unwrap();
        assert_eq!(engine.load_show(show).await.unwrap(), 2);

        let snap = engine.snapshot().await.unwrap();
        assert_eq!(snap.scene.as_deref(), Some("Act 1"));
        assert_eq!(snap.cue_count, 2);
    }

    #[tokio::test]
    async fn stopped_engine_reports_connection_error() {
        let (engine, task) = LiveEngine::spawn(&EngineConfig::default());
        engine.shutdown();
        task.await.unwrap();
        assert!(matches!(engine.go().await, Err(ControlError::Connection(_))));
        assert!(matches!(engine.snapshot().await, Err(ControlError::Connection(_))));
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = EngineEvent::Cursor {
            scene: Some("act".into()),
            cursor: 3,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "cursor", "scene": "act", "cursor": 3})
        );
    }
}
