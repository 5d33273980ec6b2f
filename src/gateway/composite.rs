use std::future::Future;

use futures::future::join_all;
use tracing::{info, warn};

use crate::{
    common::task::BackgroundTask,
    gateway::MixerClient,
    protocol::{MediaState, MediaStatus},
};

/// Wraps a seek target into `[0, duration)` when the duration is known.
pub fn looped_target(target_ms: u64, duration_ms: Option<u64>) -> u64 {
    match duration_ms {
        Some(duration) if duration > 0 => target_ms % duration,
        _ => target_ms,
    }
}

/// Multi-step operations over the current program scene.
///
/// Each one fetches the scene's items, asks every item for its media
/// status, then issues the per-item requests together and waits for all of
/// them. Items that are not media sources simply drop out. The return value
/// is how many items were acted on.
impl MixerClient {
    /// Runs a composite without waiting for it.
    pub fn in_background<T, F, Fut>(&self, op: F) -> BackgroundTask<T>
    where
        T: Send + 'static,
        F: FnOnce(MixerClient) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        BackgroundTask::spawn(op(self.clone()))
    }

    async fn media_items(&self) -> Vec<(String, MediaStatus)> {
        let Some(items) = self.scene_items().await else {
            warn!("Could not list items of the current scene");
            return Vec::new();
        };

        let statuses = join_all(items.iter().map(|item| self.media_status(item))).await;
        items
            .into_iter()
            .zip(statuses)
            .filter_map(|(item, status)| status.map(|s| (item, s)))
            .collect()
    }

    pub async fn pause_all(&self) -> usize {
        let targets: Vec<String> = self
            .media_items()
            .await
            .into_iter()
            .filter(|(_, status)| status.state == MediaState::Playing)
            .map(|(item, _)| item)
            .collect();

        if targets.is_empty() {
            info!("No playing media in the current scene");
            return 0;
        }

        join_all(targets.iter().map(|item| self.pause(item))).await;
        info!("Paused {} media inputs", targets.len());
        targets.len()
    }

    /// Resumes paused, stopped and ended media.
    pub async fn play_all(&self) -> usize {
        let targets: Vec<String> = self
            .media_items()
            .await
            .into_iter()
            .filter(|(_, status)| status.state.is_resumable())
            .map(|(item, _)| item)
            .collect();

        if targets.is_empty() {
            info!("No paused or stopped media in the current scene");
            return 0;
        }

        join_all(targets.iter().map(|item| self.play(item))).await;
        info!("Resumed {} media inputs", targets.len());
        targets.len()
    }

    /// Seeks one media input. With `looped`, the target wraps by the
    /// input's duration.
    pub async fn seek(&self, input_name: &str, target_ms: u64, looped: bool) -> bool {
        let mut target = target_ms;
        if looped {
            match self.media_status(input_name).await {
                Some(status) => target = looped_target(target_ms, status.duration_ms),
                None => warn!("No duration for {}, seeking without looping", input_name),
            }
        }

        if target != target_ms {
            info!("Looped seek on {}: {}ms -> {}ms", input_name, target_ms, target);
        }
        self.set_media_cursor(input_name, target).await
    }

    /// Seeks every media input that reports a duration.
    pub async fn seek_all(&self, target_ms: u64, looped: bool) -> usize {
        let targets: Vec<(String, u64)> = self
            .media_items()
            .await
            .into_iter()
            .filter_map(|(item, status)| {
                let duration = status.duration_ms?;
                let target = if looped {
                    looped_target(target_ms, Some(duration))
                } else {
                    target_ms
                };
                Some((item, target))
            })
            .collect();

        if targets.is_empty() {
            info!("No media in the current scene");
            return 0;
        }

        join_all(
            targets
                .iter()
                .map(|(item, target)| self.set_media_cursor(item, *target)),
        )
        .await;
        info!("Seeked {} media inputs", targets.len());
        targets.len()
    }

    /// Removes every scene except the current program scene.
    pub async fn delete_all_scenes(&self) -> usize {
        let Some(current) = self.current_scene().await else {
            warn!("Could not read the current scene, not deleting anything");
            return 0;
        };
        let Some(scenes) = self.scene_list().await else {
            warn!("Could not list scenes, not deleting anything");
            return 0;
        };

        let doomed: Vec<String> = scenes.into_iter().filter(|s| *s != current).collect();
        join_all(doomed.iter().map(|scene| self.remove_scene(scene))).await;
        info!("Deleted {} scenes, kept {}", doomed.len(), current);
        doomed.len()
    }
}
