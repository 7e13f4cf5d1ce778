//! Heartbeat task (C5): keeps the device from dropping the TLS session for
//! inactivity by writing a `PING` envelope on the heartbeat namespace at a
//! fixed cadence.
//!
//! The device is expected to reply with its own `PING`s, which the reader
//! loop (C4) answers with `PONG` directly — this task only drives the
//! sender side.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use tokio::io::AsyncWrite;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

use crate::envelope::{Envelope, NAMESPACE_HEARTBEAT};
use crate::frame;
use crate::messages::PingMessage;

const INITIAL_DELAY: Duration = Duration::from_secs(1);
const PERIOD: Duration = Duration::from_secs(10);

/// Run the heartbeat loop until `cancel` fires. Write failures are logged
/// and otherwise ignored — the reader loop is what notices a dead
/// connection and tears the channel down; a heartbeat write failure would
/// be redundant with that.
pub async fn run<W>(
    writer: Arc<AsyncMutex<W>>,
    sender_id: String,
    destination_id: String,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin + Send,
{
    let mut ticker = interval_at(Instant::now() + INITIAL_DELAY, PERIOD);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("heartbeat task stopped");
                return;
            }
            _ = ticker.tick() => {
                if let Err(e) = send_ping(&writer, &sender_id, &destination_id).await {
                    warn!("heartbeat ping write failed: {e}");
                }
            }
        }
    }
}

async fn send_ping<W>(
    writer: &Arc<AsyncMutex<W>>,
    sender_id: &str,
    destination_id: &str,
) -> Result<(), crate::error::ChannelError>
where
    W: AsyncWrite + Unpin + Send,
{
    let body = serde_json::to_string(&PingMessage::default())
        .map_err(|e| crate::error::ChannelError::Internal(e.to_string()))?;
    let envelope = Envelope::new_string(sender_id, destination_id, NAMESPACE_HEARTBEAT, body);
    let bytes = envelope.encode()?;
    let mut w = writer.lock().await;
    frame::write_frame(&mut *w, &bytes).await?;
    Ok(())
}
