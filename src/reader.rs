//! Reader loop (C4): the single task that owns the read half of the
//! transport. It classifies each frame by payload type and namespace,
//! answers heartbeat `PING`s inline, and otherwise dispatches to a
//! spawned task so a slow listener callback never stalls the socket.

use std::sync::Arc;

use log::{debug, trace, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::envelope::{Envelope, Payload, DESTINATION_RECEIVER, NAMESPACE_HEARTBEAT};
use crate::error::ChannelError;
use crate::frame::{self, ReadOutcome};
use crate::listener::ChannelListener;
use crate::messages::{self, CastResponse, PongMessage};
use crate::registry::RequestRegistry;

/// Why the reader loop stopped. Every outcome tears the channel down; the
/// variant only changes what gets logged.
pub enum StopReason {
    Eof,
    Error(ChannelError),
    Cancelled,
}

pub struct ReaderContext<W> {
    pub writer: Arc<AsyncMutex<W>>,
    pub registry: Arc<RequestRegistry>,
    pub listener: Arc<dyn ChannelListener>,
    pub sender_id: String,
}

/// Run until the transport closes, a frame fails to decode, or `cancel`
/// fires. Returns the reason so the caller can log and drive channel
/// teardown.
pub async fn run<R, W>(
    mut reader: R,
    ctx: ReaderContext<W>,
    cancel: CancellationToken,
) -> StopReason
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return StopReason::Cancelled,
            result = frame::read_frame(&mut reader) => match result {
                Ok(ReadOutcome::Frame(bytes)) => bytes,
                Ok(ReadOutcome::Eof) => return StopReason::Eof,
                Err(e) => return StopReason::Error(e.into()),
            },
        };

        let envelope = match Envelope::decode(&frame) {
            Ok(e) => e,
            Err(e) => {
                warn!("dropping undecodable frame: {e}");
                continue;
            }
        };

        match &envelope.payload {
            Payload::Binary(bytes) => {
                trace!(
                    "binary frame on namespace {} ({} bytes)",
                    envelope.namespace,
                    bytes.len()
                );
                ctx.listener
                    .on_binary_event(&envelope.namespace, bytes);
            }
            Payload::String(raw) => {
                if envelope.namespace == NAMESPACE_HEARTBEAT {
                    handle_heartbeat(&ctx, &envelope.source_id, raw).await;
                    continue;
                }
                dispatch_string_message(&ctx, envelope.namespace.clone(), raw.clone());
            }
        }
    }
}

async fn handle_heartbeat<W>(ctx: &ReaderContext<W>, reply_to: &str, raw: &str)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let is_ping = serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str().map(str::to_string)))
        .map(|t| t == "PING")
        .unwrap_or(false);

    if !is_ping {
        debug!("heartbeat namespace message ignored: {raw}");
        return;
    }

    let body = match serde_json::to_string(&PongMessage::default()) {
        Ok(b) => b,
        Err(e) => {
            warn!("failed to encode PONG: {e}");
            return;
        }
    };
    let envelope = Envelope::new_string(&ctx.sender_id, reply_to, NAMESPACE_HEARTBEAT, body);
    let bytes = match envelope.encode() {
        Ok(b) => b,
        Err(e) => {
            warn!("failed to encode PONG envelope: {e}");
            return;
        }
    };
    let mut w = ctx.writer.lock().await;
    if let Err(e) = frame::write_frame(&mut *w, &bytes).await {
        warn!("failed to write PONG: {e}");
    }
}

/// Dispatch a non-heartbeat STRING control message to a freshly spawned
/// task, so that decoding and routing to the registry or listener never
/// blocks the frame-reading loop that `run` drives.
fn dispatch_string_message<W>(ctx: &ReaderContext<W>, namespace: String, raw: String)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let registry = ctx.registry.clone();
    let listener = ctx.listener.clone();
    tokio::spawn(async move {
        match messages::classify_string_message(&raw) {
            Ok(messages::StringMessageRoute::Response(response)) => {
                if !registry.fulfill(response.clone()).await {
                    listener.on_spontaneous_event(response_to_value(&response));
                }
            }
            Ok(messages::StringMessageRoute::CustomEvent) => {
                listener.on_string_custom_event(&namespace, &raw);
            }
            Err(e) => {
                // An INVALID_REQUEST/LOAD_FAILED/LAUNCH_ERROR still carries
                // the request id of whatever it is refusing; route the
                // error to that waiter if one is still outstanding.
                let routed = match extract_request_id(&raw) {
                    Some(id) => registry.fail(id, e).await,
                    None => false,
                };
                if !routed {
                    listener.on_string_custom_event(&namespace, &raw);
                }
            }
        }
    });
}

/// Best-effort extraction of `requestId` from a raw control message,
/// used only to route decode-time errors back to a waiting caller.
fn extract_request_id(raw: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|v| v.get("requestId").and_then(|id| id.as_u64()))
}

/// Turn an already-decoded [`CastResponse`] back into a JSON value for
/// [`ChannelListener::on_spontaneous_event`] — used when a response
/// decodes cleanly but no waiter is registered for its request id.
fn response_to_value(response: &CastResponse) -> serde_json::Value {
    match response {
        CastResponse::ReceiverStatus(r) => serde_json::json!({
            "requestId": r.request_id,
            "status": r.status,
        }),
        CastResponse::MediaStatus(r) => serde_json::json!({
            "requestId": r.request_id,
            "status": r.status,
        }),
        CastResponse::AppAvailability(r) => serde_json::json!({
            "requestId": r.request_id,
            "availability": r.availability,
        }),
        CastResponse::Unknown(v) => v.clone(),
    }
}
