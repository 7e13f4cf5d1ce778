//! JSON control-message bodies carried as STRING payloads on the
//! `receiver` and `media` namespaces, plus the dispatch logic that turns a
//! raw JSON value into a typed [`CastResponse`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ChannelError;

/// A request body that can be sent through [`crate::Channel::send_request`].
///
/// Every concrete request type carries its own `requestId` field so the
/// registry (C3) can stamp it in just before the frame goes out.
pub trait CastRequest: Serialize {
    fn set_request_id(&mut self, id: u64);
    fn request_id(&self) -> u64;
}

macro_rules! impl_cast_request {
    ($ty:ty) => {
        impl CastRequest for $ty {
            fn set_request_id(&mut self, id: u64) {
                self.request_id = id;
            }

            fn request_id(&self) -> u64 {
                self.request_id
            }
        }
    };
}

#[derive(Debug, Clone, Serialize)]
pub struct GetStatusRequest {
    #[serde(rename = "type")]
    pub typ: &'static str,
    #[serde(rename = "requestId")]
    pub request_id: u64,
}

impl Default for GetStatusRequest {
    fn default() -> Self {
        Self {
            typ: "GET_STATUS",
            request_id: 0,
        }
    }
}
impl_cast_request!(GetStatusRequest);

#[derive(Debug, Clone, Serialize)]
pub struct GetAppAvailabilityRequest {
    #[serde(rename = "type")]
    pub typ: &'static str,
    #[serde(rename = "requestId")]
    pub request_id: u64,
    #[serde(rename = "appId")]
    pub app_id: Vec<String>,
}

impl GetAppAvailabilityRequest {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            typ: "GET_APP_AVAILABILITY",
            request_id: 0,
            app_id: vec![app_id.into()],
        }
    }
}
impl_cast_request!(GetAppAvailabilityRequest);

#[derive(Debug, Clone, Serialize)]
pub struct LaunchRequest {
    #[serde(rename = "type")]
    pub typ: &'static str,
    #[serde(rename = "requestId")]
    pub request_id: u64,
    #[serde(rename = "appId")]
    pub app_id: String,
}

impl LaunchRequest {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            typ: "LAUNCH",
            request_id: 0,
            app_id: app_id.into(),
        }
    }
}
impl_cast_request!(LaunchRequest);

#[derive(Debug, Clone, Serialize)]
pub struct StopRequest {
    #[serde(rename = "type")]
    pub typ: &'static str,
    #[serde(rename = "requestId")]
    pub request_id: u64,
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

impl StopRequest {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            typ: "STOP",
            request_id: 0,
            session_id: session_id.into(),
        }
    }
}
impl_cast_request!(StopRequest);

#[derive(Debug, Clone, Serialize)]
pub struct SetVolumeRequest {
    #[serde(rename = "type")]
    pub typ: &'static str,
    #[serde(rename = "requestId")]
    pub request_id: u64,
    pub volume: Volume,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
}

impl SetVolumeRequest {
    pub fn level(level: f32) -> Self {
        Self {
            typ: "SET_VOLUME",
            request_id: 0,
            volume: Volume {
                level: Some(level),
                muted: None,
            },
        }
    }

    pub fn muted(muted: bool) -> Self {
        Self {
            typ: "SET_VOLUME",
            request_id: 0,
            volume: Volume {
                level: None,
                muted: Some(muted),
            },
        }
    }
}
impl_cast_request!(SetVolumeRequest);

#[derive(Debug, Clone, Serialize)]
pub struct ConnectRequest {
    #[serde(rename = "type")]
    pub typ: &'static str,
}

impl Default for ConnectRequest {
    fn default() -> Self {
        Self { typ: "CONNECT" }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CloseRequest {
    #[serde(rename = "type")]
    pub typ: &'static str,
}

impl Default for CloseRequest {
    fn default() -> Self {
        Self { typ: "CLOSE" }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PingMessage {
    #[serde(rename = "type")]
    pub typ: &'static str,
}

impl Default for PingMessage {
    fn default() -> Self {
        Self { typ: "PING" }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PongMessage {
    #[serde(rename = "type")]
    pub typ: &'static str,
}

impl Default for PongMessage {
    fn default() -> Self {
        Self { typ: "PONG" }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadRequest {
    #[serde(rename = "type")]
    pub typ: &'static str,
    #[serde(rename = "requestId")]
    pub request_id: u64,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub media: MediaInformation,
    #[serde(rename = "autoplay")]
    pub autoplay: bool,
    #[serde(rename = "currentTime", skip_serializing_if = "Option::is_none")]
    pub current_time: Option<f64>,
    #[serde(rename = "customData", skip_serializing_if = "Option::is_none")]
    pub custom_data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInformation {
    #[serde(rename = "contentId")]
    pub content_id: String,
    #[serde(rename = "contentType")]
    pub content_type: String,
    #[serde(rename = "streamType", default)]
    pub stream_type: String,
    #[serde(rename = "metadata", skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl LoadRequest {
    pub fn new(
        session_id: impl Into<String>,
        media: MediaInformation,
        custom_data: Option<Value>,
    ) -> Self {
        Self {
            typ: "LOAD",
            request_id: 0,
            session_id: session_id.into(),
            media,
            autoplay: true,
            current_time: None,
            custom_data,
        }
    }
}
impl_cast_request!(LoadRequest);

#[derive(Debug, Clone, Serialize)]
pub struct PlayRequest {
    #[serde(rename = "type")]
    pub typ: &'static str,
    #[serde(rename = "requestId")]
    pub request_id: u64,
    #[serde(rename = "mediaSessionId")]
    pub media_session_id: i64,
}

impl PlayRequest {
    pub fn new(media_session_id: i64) -> Self {
        Self {
            typ: "PLAY",
            request_id: 0,
            media_session_id,
        }
    }
}
impl_cast_request!(PlayRequest);

#[derive(Debug, Clone, Serialize)]
pub struct PauseRequest {
    #[serde(rename = "type")]
    pub typ: &'static str,
    #[serde(rename = "requestId")]
    pub request_id: u64,
    #[serde(rename = "mediaSessionId")]
    pub media_session_id: i64,
}

impl PauseRequest {
    pub fn new(media_session_id: i64) -> Self {
        Self {
            typ: "PAUSE",
            request_id: 0,
            media_session_id,
        }
    }
}
impl_cast_request!(PauseRequest);

#[derive(Debug, Clone, Serialize)]
pub struct SeekRequest {
    #[serde(rename = "type")]
    pub typ: &'static str,
    #[serde(rename = "requestId")]
    pub request_id: u64,
    #[serde(rename = "mediaSessionId")]
    pub media_session_id: i64,
    #[serde(rename = "currentTime")]
    pub current_time: f64,
}

impl SeekRequest {
    pub fn new(media_session_id: i64, current_time: f64) -> Self {
        Self {
            typ: "SEEK",
            request_id: 0,
            media_session_id,
            current_time,
        }
    }
}
impl_cast_request!(SeekRequest);

#[derive(Debug, Clone, Serialize)]
pub struct GetMediaStatusRequest {
    #[serde(rename = "type")]
    pub typ: &'static str,
    #[serde(rename = "requestId")]
    pub request_id: u64,
}

impl Default for GetMediaStatusRequest {
    fn default() -> Self {
        Self {
            typ: "GET_STATUS",
            request_id: 0,
        }
    }
}
impl_cast_request!(GetMediaStatusRequest);

// --- Responses --------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReceiverStatusResponse {
    #[serde(rename = "requestId", default)]
    pub request_id: u64,
    pub status: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppAvailabilityResponse {
    #[serde(rename = "requestId", default)]
    pub request_id: u64,
    pub availability: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaStatusResponse {
    #[serde(rename = "requestId", default)]
    pub request_id: u64,
    pub status: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LaunchErrorResponse {
    #[serde(rename = "requestId", default)]
    pub request_id: u64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadFailedResponse {
    #[serde(rename = "requestId", default)]
    pub request_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvalidRequestResponse {
    #[serde(rename = "requestId", default)]
    pub request_id: u64,
    pub reason: Option<String>,
}

/// Which shape a pending request expects its reply to take. `None` means
/// "accept any non-error response" — used for fire-and-forget style
/// requests such as `CONNECT`/`CLOSE` that never get a matched reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    ReceiverStatus,
    MediaStatus,
    AppAvailability,
}

/// A decoded, typed reply to a previously sent request.
#[derive(Debug, Clone)]
pub enum CastResponse {
    ReceiverStatus(ReceiverStatusResponse),
    MediaStatus(MediaStatusResponse),
    AppAvailability(AppAvailabilityResponse),
    /// A recognised discriminator this crate does not model a struct for.
    Unknown(Value),
}

impl CastResponse {
    pub fn request_id(&self) -> u64 {
        match self {
            CastResponse::ReceiverStatus(r) => r.request_id,
            CastResponse::MediaStatus(r) => r.request_id,
            CastResponse::AppAvailability(r) => r.request_id,
            CastResponse::Unknown(v) => v
                .get("requestId")
                .and_then(Value::as_u64)
                .unwrap_or_default(),
        }
    }

    pub fn into_receiver_status(self) -> Result<ReceiverStatusResponse, ChannelError> {
        match self {
            CastResponse::ReceiverStatus(r) => Ok(r),
            other => Err(ChannelError::Decode(format!(
                "expected RECEIVER_STATUS, got {other:?}"
            ))),
        }
    }

    pub fn into_media_status(self) -> Result<MediaStatusResponse, ChannelError> {
        match self {
            CastResponse::MediaStatus(r) => Ok(r),
            other => Err(ChannelError::Decode(format!(
                "expected MEDIA_STATUS, got {other:?}"
            ))),
        }
    }

    pub fn into_app_availability(self) -> Result<AppAvailabilityResponse, ChannelError> {
        match self {
            CastResponse::AppAvailability(r) => Ok(r),
            other => Err(ChannelError::Decode(format!(
                "expected GET_APP_AVAILABILITY response, got {other:?}"
            ))),
        }
    }
}

/// Rewrite the inbound `type` discriminator to `responseType` so the rest
/// of this module never has to special-case the two names: devices reply
/// using `type`, matching what they were sent, but this crate's response
/// structs are keyed on the more descriptive `responseType` name used
/// throughout its own documentation and error messages.
fn rewrite_type_key(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        if let Some(t) = map.remove("type") {
            map.insert("responseType".to_string(), t);
        }
    }
    value
}

/// Where a decoded STRING payload should be routed.
///
/// A message with neither a recognised `responseType` discriminator nor a
/// `requestId` cannot be correlated to a pending request and is not one of
/// this crate's known control shapes — it is third-party application
/// traffic riding the same namespace, delivered verbatim instead of decoded.
pub enum StringMessageRoute {
    Response(CastResponse),
    CustomEvent,
}

/// Classify a raw STRING payload for [`crate::reader`]'s dispatcher: either
/// a control response to decode, or an undiscriminated custom event to hand
/// back to the caller as-is.
pub fn classify_string_message(raw: &str) -> Result<StringMessageRoute, ChannelError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| ChannelError::Decode(format!("invalid JSON control message: {e}")))?;
    let value = rewrite_type_key(value);

    let response_type = value
        .get("responseType")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let has_request_id = value.get("requestId").and_then(Value::as_u64).is_some();

    if response_type.is_empty() && !has_request_id {
        return Ok(StringMessageRoute::CustomEvent);
    }

    decode_response_value(value, &response_type).map(StringMessageRoute::Response)
}

/// Parse a raw STRING payload into a typed [`CastResponse`], checking for
/// the receiver's error discriminators before attempting a per-kind decode.
pub fn decode_response(raw: &str) -> Result<CastResponse, ChannelError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| ChannelError::Decode(format!("invalid JSON control message: {e}")))?;
    let value = rewrite_type_key(value);

    let response_type = value
        .get("responseType")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    decode_response_value(value, &response_type)
}

fn decode_response_value(value: Value, response_type: &str) -> Result<CastResponse, ChannelError> {
    match response_type {
        "INVALID_REQUEST" => {
            let r: InvalidRequestResponse = serde_json::from_value(value)
                .map_err(|e| ChannelError::Decode(e.to_string()))?;
            Err(ChannelError::BadRequest(
                r.reason.unwrap_or_else(|| "no reason given".into()),
            ))
        }
        "LOAD_FAILED" => Err(ChannelError::MediaLoadFailed),
        "LAUNCH_ERROR" => {
            let r: LaunchErrorResponse = serde_json::from_value(value)
                .map_err(|e| ChannelError::Decode(e.to_string()))?;
            Err(ChannelError::Launch(
                r.reason.unwrap_or_else(|| "no reason given".into()),
            ))
        }
        "RECEIVER_STATUS" => {
            let r: ReceiverStatusResponse = serde_json::from_value(value)
                .map_err(|e| ChannelError::Decode(e.to_string()))?;
            Ok(CastResponse::ReceiverStatus(r))
        }
        "MEDIA_STATUS" => {
            let r: MediaStatusResponse = serde_json::from_value(value)
                .map_err(|e| ChannelError::Decode(e.to_string()))?;
            Ok(CastResponse::MediaStatus(r))
        }
        "GET_APP_AVAILABILITY" => {
            let r: AppAvailabilityResponse = serde_json::from_value(value)
                .map_err(|e| ChannelError::Decode(e.to_string()))?;
            Ok(CastResponse::AppAvailability(r))
        }
        _ => Ok(CastResponse::Unknown(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_type_key_before_decoding() {
        let raw = r#"{"type":"RECEIVER_STATUS","requestId":7,"status":{}}"#;
        let resp = decode_response(raw).unwrap();
        assert_eq!(resp.request_id(), 7);
        assert!(matches!(resp, CastResponse::ReceiverStatus(_)));
    }

    #[test]
    fn invalid_request_becomes_bad_request_error() {
        let raw = r#"{"type":"INVALID_REQUEST","requestId":1,"reason":"bad namespace"}"#;
        let err = decode_response(raw).unwrap_err();
        assert!(matches!(err, ChannelError::BadRequest(ref r) if r == "bad namespace"));
    }

    #[test]
    fn load_failed_becomes_media_load_failed_error() {
        let raw = r#"{"type":"LOAD_FAILED","requestId":2}"#;
        let err = decode_response(raw).unwrap_err();
        assert!(matches!(err, ChannelError::MediaLoadFailed));
    }

    #[test]
    fn launch_error_carries_reason() {
        let raw = r#"{"type":"LAUNCH_ERROR","requestId":3,"reason":"no such app"}"#;
        let err = decode_response(raw).unwrap_err();
        assert!(matches!(err, ChannelError::Launch(ref r) if r == "no such app"));
    }

    #[test]
    fn unrecognised_discriminator_is_unknown_not_an_error() {
        let raw = r#"{"type":"SOME_FUTURE_TYPE","requestId":9}"#;
        let resp = decode_response(raw).unwrap();
        assert!(matches!(resp, CastResponse::Unknown(_)));
        assert_eq!(resp.request_id(), 9);
    }

    #[test]
    fn request_id_is_stamped_by_trait() {
        let mut req = GetStatusRequest::default();
        req.set_request_id(42);
        assert_eq!(req.request_id, 42);
    }

    #[test]
    fn serializes_with_camel_case_field_names() {
        let mut req = LaunchRequest::new("CC1AD845");
        req.set_request_id(5);
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["type"], "LAUNCH");
        assert_eq!(v["requestId"], 5);
        assert_eq!(v["appId"], "CC1AD845");
    }
}
