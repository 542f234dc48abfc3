use thiserror::Error;
use wasm_bindgen::JsValue;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("invalid audio source url {0:?}")]
    InvalidUrl(String),
    #[error("network request failed: {0}")]
    Network(String),
    #[error("server responded with status {0}")]
    Status(u16),
    #[error("failed to read response body: {0}")]
    Body(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to decode audio: {message}")]
pub struct DecodeError {
    pub message: String,
}

impl DecodeError {
    pub fn new(message: impl Into<String>) -> DecodeError {
        DecodeError {
            message: message.into(),
        }
    }
}

/// Anything that keeps a track from becoming playable. Cloneable so every
/// caller waiting on the same in-flight load receives the same error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("audio graph error: {0}")]
pub struct AudioError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to schedule deferred action: {0}")]
pub struct ScheduleError(pub String);

/// Renders a rejected promise or thrown exception for logs and error values.
pub fn describe_js_error(value: &JsValue) -> String {
    if let Some(message) = value.as_string() {
        return message;
    }
    js_sys::Reflect::get(value, &JsValue::from_str("message"))
        .ok()
        .and_then(|message| message.as_string())
        .unwrap_or_else(|| format!("{:?}", value))
}

impl From<JsValue> for AudioError {
    fn from(value: JsValue) -> AudioError {
        AudioError(describe_js_error(&value))
    }
}
