//! Request multiplexing registry (C3): maps outstanding request ids to the
//! waiter that should be woken when a matching reply, or a channel-wide
//! failure, arrives.

use std::collections::HashMap;

use rand::Rng;
use tokio::sync::{oneshot, Mutex};

use crate::error::ChannelError;
use crate::messages::{CastResponse, ResponseKind};

struct PendingWaiter {
    expected_kind: Option<ResponseKind>,
    tx: oneshot::Sender<Result<CastResponse, ChannelError>>,
}

/// Allocates request ids and tracks the oneshot waiter for each one still
/// in flight.
///
/// The counter starts at a random value in `[1, 65536]` rather than 1, so
/// that request ids from back-to-back connections to the same device
/// don't collide in logs or captures. Allocation is otherwise a simple
/// monotonic increment guarded by the same lock as the waiter map — C3
/// has no separate atomic counter because every caller already awaits
/// the registry lock to insert its waiter.
pub struct RequestRegistry {
    next_id: Mutex<u64>,
    waiters: Mutex<HashMap<u64, PendingWaiter>>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        let start = rand::thread_rng().gen_range(1..=65536u64);
        Self {
            next_id: Mutex::new(start),
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve the next request id and register a waiter for it.
    pub async fn register(
        &self,
        expected_kind: Option<ResponseKind>,
    ) -> (u64, oneshot::Receiver<Result<CastResponse, ChannelError>>) {
        let mut next_id = self.next_id.lock().await;
        let id = *next_id;
        *next_id += 1;
        drop(next_id);

        let (tx, rx) = oneshot::channel();
        let mut waiters = self.waiters.lock().await;
        waiters.insert(id, PendingWaiter { expected_kind, tx });
        (id, rx)
    }

    /// Deliver a decoded response to the waiter registered for its
    /// request id, if one is still outstanding. Returns `true` if a
    /// waiter was found (regardless of whether it was still listening).
    pub async fn fulfill(&self, response: CastResponse) -> bool {
        let id = response.request_id();
        let mut waiters = self.waiters.lock().await;
        let Some(waiter) = waiters.remove(&id) else {
            return false;
        };
        drop(waiters);

        if let Some(expected) = waiter.expected_kind {
            let matches = matches!(
                (&response, expected),
                (CastResponse::ReceiverStatus(_), ResponseKind::ReceiverStatus)
                    | (CastResponse::MediaStatus(_), ResponseKind::MediaStatus)
                    | (
                        CastResponse::AppAvailability(_),
                        ResponseKind::AppAvailability
                    )
            );
            if !matches {
                let _ = waiter.tx.send(Err(ChannelError::Decode(format!(
                    "response for request {id} did not match the expected kind"
                ))));
                return true;
            }
        }
        let _ = waiter.tx.send(Ok(response));
        true
    }

    /// Fail every outstanding waiter with `error`, used when the channel
    /// tears down its transport and no further replies will ever arrive.
    pub async fn cancel_all(&self, error: ChannelError) {
        let mut waiters = self.waiters.lock().await;
        for (_, waiter) in waiters.drain() {
            let _ = waiter.tx.send(Err(clone_error(&error)));
        }
    }

    /// Drop the waiter for `id` without resolving it, used when a caller
    /// times out and stops listening; a late reply for this id is then
    /// silently discarded by `fulfill`.
    pub async fn abandon(&self, id: u64) {
        self.waiters.lock().await.remove(&id);
    }

    /// Deliver an error to the waiter registered for `id`, used when a
    /// control message fails to decode into the kind its request
    /// expected (e.g. `INVALID_REQUEST`/`LOAD_FAILED`/`LAUNCH_ERROR`).
    /// Returns `true` if a waiter was found.
    pub async fn fail(&self, id: u64, error: ChannelError) -> bool {
        let mut waiters = self.waiters.lock().await;
        let Some(waiter) = waiters.remove(&id) else {
            return false;
        };
        let _ = waiter.tx.send(Err(error));
        true
    }
}

impl Default for RequestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn clone_error(error: &ChannelError) -> ChannelError {
    match error {
        ChannelError::ChannelClosed => ChannelError::ChannelClosed,
        ChannelError::Io(e) => ChannelError::Internal(format!("io error: {e}")),
        other => ChannelError::Internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ReceiverStatusResponse;
    use serde_json::json;

    fn receiver_status(request_id: u64) -> CastResponse {
        CastResponse::ReceiverStatus(ReceiverStatusResponse {
            request_id,
            status: json!({}),
        })
    }

    #[tokio::test]
    async fn fulfill_wakes_the_matching_waiter() {
        let registry = RequestRegistry::new();
        let (id, rx) = registry.register(Some(ResponseKind::ReceiverStatus)).await;
        assert!(registry.fulfill(receiver_status(id)).await);
        let resp = rx.await.unwrap().unwrap();
        assert_eq!(resp.request_id(), id);
    }

    #[tokio::test]
    async fn fulfill_on_unknown_id_is_a_no_op() {
        let registry = RequestRegistry::new();
        assert!(!registry.fulfill(receiver_status(999_999)).await);
    }

    #[tokio::test]
    async fn mismatched_kind_is_reported_as_decode_error() {
        let registry = RequestRegistry::new();
        let (id, rx) = registry.register(Some(ResponseKind::MediaStatus)).await;
        assert!(registry.fulfill(receiver_status(id)).await);
        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(err, ChannelError::Decode(_)));
    }

    #[tokio::test]
    async fn cancel_all_fails_every_outstanding_waiter() {
        let registry = RequestRegistry::new();
        let (_, rx1) = registry.register(None).await;
        let (_, rx2) = registry.register(None).await;
        registry.cancel_all(ChannelError::ChannelClosed).await;
        assert!(matches!(
            rx1.await.unwrap().unwrap_err(),
            ChannelError::ChannelClosed
        ));
        assert!(matches!(
            rx2.await.unwrap().unwrap_err(),
            ChannelError::ChannelClosed
        ));
    }

    #[tokio::test]
    async fn abandon_makes_a_later_reply_a_silent_no_op() {
        let registry = RequestRegistry::new();
        let (id, rx) = registry.register(None).await;
        registry.abandon(id).await;
        assert!(!registry.fulfill(receiver_status(id)).await);
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn ids_increase_monotonically() {
        let registry = RequestRegistry::new();
        let (id1, _rx1) = registry.register(None).await;
        let (id2, _rx2) = registry.register(None).await;
        assert_eq!(id2, id1 + 1);
    }
}
