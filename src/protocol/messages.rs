use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    common::{errors::ControlResult, types::RequestId},
    protocol::opcodes::MixerOp,
};

/// The outer `{op, d}` frame every mixer message travels in.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Envelope {
    pub op: u8,
    pub d: Value,
}

impl Envelope {
    pub fn new<T: Serialize>(op: MixerOp, payload: &T) -> ControlResult<Self> {
        Ok(Self {
            op: op.code(),
            d: serde_json::to_value(payload)?,
        })
    }

    pub fn parse(text: &str) -> ControlResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn payload<T: DeserializeOwned>(self) -> ControlResult<T> {
        Ok(serde_json::from_value(self.d)?)
    }

    pub fn to_json(&self) -> ControlResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub challenge: String,
    pub salt: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    #[serde(default)]
    pub obs_web_socket_version: Option<String>,
    pub rpc_version: u32,
    #[serde(default)]
    pub authentication: Option<AuthChallenge>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Identify {
    pub rpc_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    pub event_subscriptions: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    pub negotiated_rpc_version: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub request_type: String,
    pub request_id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_data: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RequestStatus {
    pub result: bool,
    pub code: u16,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_type: String,
    pub request_id: RequestId,
    pub request_status: RequestStatus,
    #[serde(default)]
    pub response_data: Option<Value>,
}

impl RequestResponse {
    /// Response data when the mixer reported success, otherwise `None`.
    ///
    /// A successful request without data yields an empty object so callers
    /// can still tell success from failure.
    pub fn into_result(self) -> Option<Value> {
        if !self.request_status.result {
            return None;
        }
        Some(
            self.response_data
                .unwrap_or_else(|| Value::Object(Default::default())),
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    pub event_type: String,
    #[serde(default)]
    pub event_intent: Option<u32>,
    #[serde(default)]
    pub event_data: Option<Value>,
}
