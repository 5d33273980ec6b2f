use serde_json::{Value, json};
use tracing::{info, warn};

use crate::{
    gateway::MixerClient,
    protocol::{MediaAction, MediaStatus},
};

pub const SET_CURRENT_PROGRAM_SCENE: &str = "SetCurrentProgramScene";
pub const GET_CURRENT_PROGRAM_SCENE: &str = "GetCurrentProgramScene";
pub const CREATE_SCENE: &str = "CreateScene";
pub const REMOVE_SCENE: &str = "RemoveScene";
pub const SET_SCENE_NAME: &str = "SetSceneName";
pub const GET_SCENE_LIST: &str = "GetSceneList";
pub const GET_SCENE_ITEM_LIST: &str = "GetSceneItemList";
pub const GET_MEDIA_INPUT_STATUS: &str = "GetMediaInputStatus";
pub const TRIGGER_MEDIA_INPUT_ACTION: &str = "TriggerMediaInputAction";
pub const SET_MEDIA_INPUT_CURSOR: &str = "SetMediaInputCursor";

/// Single-step requests. Every call resolves to `None`/`false` instead of
/// failing when the mixer is unreachable or rejects the request.
impl MixerClient {
    pub async fn set_scene(&self, scene_name: &str) -> bool {
        info!("Switching to scene {}", scene_name);
        self.request(
            SET_CURRENT_PROGRAM_SCENE,
            Some(json!({ "sceneName": scene_name })),
        )
        .await
        .is_some()
    }

    pub async fn create_scene(&self, scene_name: &str) -> bool {
        info!("Creating scene {}", scene_name);
        self.request(CREATE_SCENE, Some(json!({ "sceneName": scene_name })))
            .await
            .is_some()
    }

    pub async fn remove_scene(&self, scene_name: &str) -> bool {
        info!("Removing scene {}", scene_name);
        self.request(REMOVE_SCENE, Some(json!({ "sceneName": scene_name })))
            .await
            .is_some()
    }

    pub async fn rename_scene(&self, scene_name: &str, new_scene_name: &str) -> bool {
        info!("Renaming scene {} to {}", scene_name, new_scene_name);
        self.request(
            SET_SCENE_NAME,
            Some(json!({ "sceneName": scene_name, "newSceneName": new_scene_name })),
        )
        .await
        .is_some()
    }

    pub async fn current_scene(&self) -> Option<String> {
        let data = self.request(GET_CURRENT_PROGRAM_SCENE, None).await?;
        data.get("sceneName")
            .or_else(|| data.get("currentProgramSceneName"))
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    pub async fn scene_list(&self) -> Option<Vec<String>> {
        let data = self.request(GET_SCENE_LIST, None).await?;
        Some(names(data.get("scenes")?, "sceneName"))
    }

    /// Source names of every item in the current program scene.
    pub async fn scene_items(&self) -> Option<Vec<String>> {
        let scene = self.current_scene().await?;
        let data = self
            .request(GET_SCENE_ITEM_LIST, Some(json!({ "sceneName": scene })))
            .await?;
        Some(names(data.get("sceneItems")?, "sourceName"))
    }

    /// `None` when the input is unknown or is not a media source.
    pub async fn media_status(&self, input_name: &str) -> Option<MediaStatus> {
        self.request(
            GET_MEDIA_INPUT_STATUS,
            Some(json!({ "inputName": input_name })),
        )
        .await
        .map(|data| MediaStatus::from_response(&data))
    }

    pub async fn trigger_media_action(&self, input_name: &str, action: MediaAction) -> bool {
        self.request(
            TRIGGER_MEDIA_INPUT_ACTION,
            Some(json!({ "inputName": input_name, "mediaAction": action.as_wire() })),
        )
        .await
        .is_some()
    }

    pub async fn play(&self, input_name: &str) -> bool {
        info!("Playing media {}", input_name);
        self.trigger_media_action(input_name, MediaAction::Play).await
    }

    pub async fn pause(&self, input_name: &str) -> bool {
        info!("Pausing media {}", input_name);
        self.trigger_media_action(input_name, MediaAction::Pause).await
    }

    pub async fn set_media_cursor(&self, input_name: &str, cursor_ms: u64) -> bool {
        let ok = self
            .request(
                SET_MEDIA_INPUT_CURSOR,
                Some(json!({ "inputName": input_name, "mediaCursor": cursor_ms })),
            )
            .await
            .is_some();
        if !ok {
            warn!("Seeking {} to {}ms failed", input_name, cursor_ms);
        }
        ok
    }
}

fn names(list: &Value, key: &str) -> Vec<String> {
    list.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(key).and_then(Value::as_str))
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}
