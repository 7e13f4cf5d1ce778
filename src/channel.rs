//! The Channel façade (C6): the public entry point that ties the frame
//! codec, envelope model, request registry, reader loop and heartbeat
//! timer into one long-lived, reconnectable session.

use std::collections::HashSet;
use std::sync::Arc;

use log::{info, warn};
use parking_lot::Mutex as SyncMutex;
use rustls_pki_types::ServerName;
use serde::Serialize;
use tokio::io::{split, AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ChannelConfig;
use crate::envelope::{
    self, Envelope, DESTINATION_RECEIVER, NAMESPACE_CONNECTION, NAMESPACE_MEDIA,
    NAMESPACE_RECEIVER,
};
use crate::error::{ChannelError, ChannelResult};
use crate::frame::{self, ReadOutcome};
use crate::heartbeat;
use crate::listener::{ChannelListener, NoopListener};
use crate::messages::{
    CastRequest, CastResponse, CloseRequest, ConnectRequest, GetAppAvailabilityRequest,
    GetMediaStatusRequest, GetStatusRequest, LaunchRequest, LoadRequest, MediaInformation,
    MediaStatusResponse, PauseRequest, PlayRequest, ReceiverStatusResponse, ResponseKind,
    SeekRequest, SetVolumeRequest, StopRequest,
};
use crate::reader::{self, ReaderContext, StopReason};
use crate::registry::RequestRegistry;
use crate::tls;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Disconnected,
    Handshaking,
    Connected,
    Closing,
}

struct ConnectionState {
    phase: Phase,
    writer: Option<Arc<AsyncMutex<BoxedWriter>>>,
    cancel: Option<CancellationToken>,
    reader_task: Option<JoinHandle<()>>,
    heartbeat_task: Option<JoinHandle<()>>,
}

impl ConnectionState {
    fn new() -> Self {
        Self {
            phase: Phase::Disconnected,
            writer: None,
            cancel: None,
            reader_task: None,
            heartbeat_task: None,
        }
    }
}

struct Inner {
    config: ChannelConfig,
    state: SyncMutex<ConnectionState>,
    /// Serialises `connect()`/`connect_for_test()` attempts so that two
    /// clones of the same `Channel` racing to reconnect (e.g. two
    /// concurrent `send_request` calls on a freshly-closed channel) open
    /// at most one transport instead of each winning a check-then-act
    /// race on `state`.
    connect_lock: AsyncMutex<()>,
    registry: Arc<RequestRegistry>,
    listener: Arc<dyn ChannelListener>,
    sub_sessions: SyncMutex<HashSet<String>>,
}

/// A long-lived, reconnectable session with a single Cast v2 receiver.
///
/// Cheap to clone — every clone shares the same underlying connection,
/// registry and sub-session set.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<Inner>,
}

impl Channel {
    /// Construct a channel. The channel starts `DISCONNECTED`; no socket
    /// is opened until [`Channel::connect`] or the first [`Channel::send_request`].
    pub fn new(config: ChannelConfig) -> ChannelResult<Self> {
        Self::with_listener(config, Arc::new(NoopListener))
    }

    /// Construct a channel with a custom [`ChannelListener`]. Validates
    /// `config` the same way [`Channel::new`] does — there is no
    /// unvalidated construction path.
    pub fn with_listener(
        config: ChannelConfig,
        listener: Arc<dyn ChannelListener>,
    ) -> ChannelResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                state: SyncMutex::new(ConnectionState::new()),
                connect_lock: AsyncMutex::new(()),
                registry: Arc::new(RequestRegistry::new()),
                listener,
                sub_sessions: SyncMutex::new(HashSet::new()),
            }),
        })
    }

    pub fn is_closed(&self) -> bool {
        !matches!(self.inner.state.lock().phase, Phase::Connected)
    }

    /// Open the TLS connection, perform the device-auth handshake, start
    /// the reader and heartbeat tasks, and establish the `receiver-0`
    /// sub-session. A no-op if already connected.
    pub async fn connect(&self) -> ChannelResult<()> {
        let _guard = self.inner.connect_lock.lock().await;
        if !self.is_closed() {
            return Ok(());
        }
        {
            let mut state = self.inner.state.lock();
            state.phase = Phase::Handshaking;
        }

        match self.establish().await {
            Ok(()) => Ok(()),
            Err(e) => {
                let mut state = self.inner.state.lock();
                *state = ConnectionState::new();
                Err(e)
            }
        }
    }

    async fn establish(&self) -> ChannelResult<()> {
        let cfg = &self.inner.config;
        info!(
            "connecting to {} ({}:{})",
            cfg.remote_name, cfg.host, cfg.port
        );

        let tcp = TcpStream::connect((cfg.host.as_str(), cfg.port)).await?;
        let server_name = ServerName::try_from(cfg.host.clone())
            .map_err(|e| ChannelError::Config(format!("invalid host for TLS SNI: {e}")))?;
        let connector = tls::insecure_connector();
        let tls_stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(ChannelError::Io)?;

        let (read_half, write_half): (
            ReadHalf<tokio_rustls::client::TlsStream<TcpStream>>,
            WriteHalf<tokio_rustls::client::TlsStream<TcpStream>>,
        ) = split(tls_stream);
        let mut reader: BoxedReader = Box::new(read_half);
        let mut writer: BoxedWriter = Box::new(write_half);

        self.device_auth(&mut reader, &mut writer).await?;

        let writer = Arc::new(AsyncMutex::new(writer));
        let cancel = CancellationToken::new();

        let ctx = ReaderContext {
            writer: writer.clone(),
            registry: self.inner.registry.clone(),
            listener: self.inner.listener.clone(),
            sender_id: cfg.sender_id.clone(),
        };
        let reader_cancel = cancel.clone();
        let this = self.clone();
        let reader_task = tokio::spawn(async move {
            let reason = reader::run(reader, ctx, reader_cancel).await;
            this.on_reader_stopped(reason).await;
        });

        let heartbeat_task = tokio::spawn(heartbeat::run(
            writer.clone(),
            cfg.sender_id.clone(),
            DESTINATION_RECEIVER.to_string(),
            cancel.clone(),
        ));

        {
            let mut state = self.inner.state.lock();
            state.phase = Phase::Connected;
            state.writer = Some(writer);
            state.cancel = Some(cancel);
            state.reader_task = Some(reader_task);
            state.heartbeat_task = Some(heartbeat_task);
        }

        self.inner.sub_sessions.lock().clear();
        self.ensure_sub_session(DESTINATION_RECEIVER).await?;

        self.inner.listener.on_connection_state(true);
        info!("channel connected to {}", cfg.remote_name);
        Ok(())
    }

    /// Test-only entry point that starts the reader loop, heartbeat timer
    /// and `receiver-0` sub-session directly on a pre-built transport,
    /// skipping the TLS handshake and device-auth round trip (both are
    /// covered by unit tests on [`crate::tls`] and [`crate::envelope`]).
    /// Gated behind the `test-util` feature, enabled only by this crate's
    /// own `[dev-dependencies]` entry on itself, so it never reaches a
    /// normal embedder's dependency graph.
    #[doc(hidden)]
    #[cfg(feature = "test-util")]
    pub async fn connect_for_test<R, W>(&self, reader: R, writer: W) -> ChannelResult<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let _guard = self.inner.connect_lock.lock().await;
        if !self.is_closed() {
            return Ok(());
        }
        {
            let mut state = self.inner.state.lock();
            state.phase = Phase::Handshaking;
        }

        let boxed_reader: BoxedReader = Box::new(reader);
        let boxed_writer: BoxedWriter = Box::new(writer);
        match self.establish_with_io(boxed_reader, boxed_writer).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let mut state = self.inner.state.lock();
                *state = ConnectionState::new();
                Err(e)
            }
        }
    }

    #[cfg(feature = "test-util")]
    async fn establish_with_io(
        &self,
        reader: BoxedReader,
        writer: BoxedWriter,
    ) -> ChannelResult<()> {
        let cfg = &self.inner.config;
        let writer = Arc::new(AsyncMutex::new(writer));
        let cancel = CancellationToken::new();

        let ctx = ReaderContext {
            writer: writer.clone(),
            registry: self.inner.registry.clone(),
            listener: self.inner.listener.clone(),
            sender_id: cfg.sender_id.clone(),
        };
        let reader_cancel = cancel.clone();
        let this = self.clone();
        let reader_task = tokio::spawn(async move {
            let reason = reader::run(reader, ctx, reader_cancel).await;
            this.on_reader_stopped(reason).await;
        });

        let heartbeat_task = tokio::spawn(heartbeat::run(
            writer.clone(),
            cfg.sender_id.clone(),
            DESTINATION_RECEIVER.to_string(),
            cancel.clone(),
        ));

        {
            let mut state = self.inner.state.lock();
            state.phase = Phase::Connected;
            state.writer = Some(writer);
            state.cancel = Some(cancel);
            state.reader_task = Some(reader_task);
            state.heartbeat_task = Some(heartbeat_task);
        }

        self.inner.sub_sessions.lock().clear();
        self.ensure_sub_session(DESTINATION_RECEIVER).await?;

        self.inner.listener.on_connection_state(true);
        info!("channel connected to {} (test transport)", cfg.remote_name);
        Ok(())
    }

    async fn device_auth(
        &self,
        reader: &mut BoxedReader,
        writer: &mut BoxedWriter,
    ) -> ChannelResult<()> {
        let cfg = &self.inner.config;
        let challenge = envelope::build_auth_challenge(&cfg.sender_id)?;
        let bytes = challenge.encode()?;
        frame::write_frame(writer, &bytes).await?;

        let reply = match frame::read_frame(reader).await? {
            ReadOutcome::Frame(bytes) => bytes,
            ReadOutcome::Eof => {
                return Err(ChannelError::Auth(
                    "connection closed before auth reply".into(),
                ))
            }
        };
        let envelope = Envelope::decode(&reply)?;
        let payload = envelope
            .into_binary()
            .ok_or_else(|| ChannelError::Auth("auth reply was not BINARY".into()))?;
        envelope::decode_auth_reply(&payload)
    }

    async fn on_reader_stopped(&self, reason: StopReason) {
        match &reason {
            StopReason::Eof => warn!("reader loop observed connection close"),
            StopReason::Error(e) => warn!("reader loop stopped: {e}"),
            StopReason::Cancelled => {}
        }
        if matches!(reason, StopReason::Cancelled) {
            // `close()` is already driving teardown; don't race it.
            return;
        }
        self.close().await;
    }

    /// Tear the channel down. Idempotent; safe to call from the reader's
    /// own failure path.
    pub async fn close(&self) {
        let (cancel, heartbeat_task) = {
            let mut state = self.inner.state.lock();
            if matches!(state.phase, Phase::Disconnected | Phase::Closing) {
                return;
            }
            state.phase = Phase::Closing;
            let cancel = state.cancel.take();
            let heartbeat_task = state.heartbeat_task.take();
            state.reader_task = None;
            state.writer = None;
            (cancel, heartbeat_task)
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(task) = heartbeat_task {
            task.abort();
        }

        self.inner.sub_sessions.lock().clear();
        self.inner
            .registry
            .cancel_all(ChannelError::ChannelClosed)
            .await;

        {
            let mut state = self.inner.state.lock();
            *state = ConnectionState::new();
        }

        self.inner.listener.on_connection_state(false);
        info!("channel closed");
    }

    async fn write_envelope(&self, envelope: &Envelope) -> ChannelResult<()> {
        let writer = {
            let state = self.inner.state.lock();
            if state.phase != Phase::Connected {
                return Err(ChannelError::ChannelClosed);
            }
            state
                .writer
                .clone()
                .ok_or(ChannelError::ChannelClosed)?
        };
        let bytes = envelope.encode()?;
        let mut w = writer.lock().await;
        frame::write_frame(&mut *w, &bytes).await.map_err(Into::into)
    }

    /// Send a `CONNECT` control message to `destination_id` if one has not
    /// already been sent on this channel.
    pub async fn ensure_sub_session(&self, destination_id: &str) -> ChannelResult<()> {
        {
            let sessions = self.inner.sub_sessions.lock();
            if sessions.contains(destination_id) {
                return Ok(());
            }
        }
        let body = serde_json::to_string(&ConnectRequest::default())
            .map_err(|e| ChannelError::Internal(e.to_string()))?;
        let envelope = Envelope::new_string(
            &self.inner.config.sender_id,
            destination_id,
            NAMESPACE_CONNECTION,
            body,
        );
        self.write_envelope(&envelope).await?;
        self.inner
            .sub_sessions
            .lock()
            .insert(destination_id.to_string());
        Ok(())
    }

    /// Send a `CLOSE` control message to `destination_id` without
    /// removing it from the sub-session set — the set is additions-only
    /// for the channel's lifetime.
    pub async fn close_sub_session(&self, destination_id: &str) -> ChannelResult<()> {
        let body = serde_json::to_string(&CloseRequest::default())
            .map_err(|e| ChannelError::Internal(e.to_string()))?;
        let envelope = Envelope::new_string(
            &self.inner.config.sender_id,
            destination_id,
            NAMESPACE_CONNECTION,
            body,
        );
        self.write_envelope(&envelope).await
    }

    /// The unified typed-send primitive. Reconnects transparently if the
    /// channel is currently closed, allocates a request id, optionally
    /// waits for a matching reply.
    pub async fn send_request<Req>(
        &self,
        namespace: &str,
        destination_id: &str,
        mut request: Req,
        expected: Option<ResponseKind>,
    ) -> ChannelResult<Option<CastResponse>>
    where
        Req: CastRequest,
    {
        if self.is_closed() {
            self.connect().await?;
        }

        match expected {
            None => {
                let body = serde_json::to_string(&request)
                    .map_err(|e| ChannelError::Internal(e.to_string()))?;
                let envelope =
                    Envelope::new_string(&self.inner.config.sender_id, destination_id, namespace, body);
                self.write_envelope(&envelope).await?;
                Ok(None)
            }
            Some(kind) => {
                let (id, rx) = self.inner.registry.register(Some(kind)).await;
                request.set_request_id(id);
                if request.request_id() != id {
                    self.inner.registry.abandon(id).await;
                    return Err(ChannelError::Internal(format!(
                        "request id round-trip mismatch: stamped {id}, read back {}",
                        request.request_id()
                    )));
                }

                let body = serde_json::to_string(&request)
                    .map_err(|e| ChannelError::Internal(e.to_string()))?;
                let envelope =
                    Envelope::new_string(&self.inner.config.sender_id, destination_id, namespace, body);

                if let Err(e) = self.write_envelope(&envelope).await {
                    self.inner.registry.abandon(id).await;
                    return Err(e);
                }

                let timeout = self.inner.config.request_timeout;
                match tokio::time::timeout(timeout, rx).await {
                    Ok(Ok(Ok(response))) => Ok(Some(response)),
                    Ok(Ok(Err(e))) => Err(e),
                    Ok(Err(_)) => Err(ChannelError::Internal(
                        "registry waiter dropped without a reply".into(),
                    )),
                    Err(_) => {
                        self.inner.registry.abandon(id).await;
                        Err(ChannelError::RequestTimeout)
                    }
                }
            }
        }
    }

    // --- High-level receiver verbs ------------------------------------

    pub async fn get_status(&self) -> ChannelResult<ReceiverStatusResponse> {
        let resp = self
            .send_request(
                NAMESPACE_RECEIVER,
                DESTINATION_RECEIVER,
                GetStatusRequest::default(),
                Some(ResponseKind::ReceiverStatus),
            )
            .await?
            .ok_or_else(|| ChannelError::Internal("ReceiverStatus response channel closed without a reply".into()))?;
        resp.into_receiver_status()
    }

    pub async fn is_app_available(&self, app_id: &str) -> ChannelResult<bool> {
        let resp = self
            .send_request(
                NAMESPACE_RECEIVER,
                DESTINATION_RECEIVER,
                GetAppAvailabilityRequest::new(app_id),
                Some(ResponseKind::AppAvailability),
            )
            .await?
            .ok_or_else(|| ChannelError::Internal("AppAvailability response channel closed without a reply".into()))?
            .into_app_availability()?;
        Ok(resp
            .availability
            .get(app_id)
            .and_then(|v| v.as_str())
            .map(|s| s == "APP_AVAILABLE")
            .unwrap_or(false))
    }

    pub async fn launch(&self, app_id: &str) -> ChannelResult<ReceiverStatusResponse> {
        let resp = self
            .send_request(
                NAMESPACE_RECEIVER,
                DESTINATION_RECEIVER,
                LaunchRequest::new(app_id),
                Some(ResponseKind::ReceiverStatus),
            )
            .await?
            .ok_or_else(|| ChannelError::Internal("ReceiverStatus response channel closed without a reply".into()))?;
        resp.into_receiver_status()
    }

    pub async fn stop(&self, session_id: &str) -> ChannelResult<ReceiverStatusResponse> {
        let resp = self
            .send_request(
                NAMESPACE_RECEIVER,
                DESTINATION_RECEIVER,
                StopRequest::new(session_id),
                Some(ResponseKind::ReceiverStatus),
            )
            .await?
            .ok_or_else(|| ChannelError::Internal("ReceiverStatus response channel closed without a reply".into()))?;
        resp.into_receiver_status()
    }

    pub async fn set_volume_level(&self, level: f32) -> ChannelResult<ReceiverStatusResponse> {
        let resp = self
            .send_request(
                NAMESPACE_RECEIVER,
                DESTINATION_RECEIVER,
                SetVolumeRequest::level(level),
                Some(ResponseKind::ReceiverStatus),
            )
            .await?
            .ok_or_else(|| ChannelError::Internal("ReceiverStatus response channel closed without a reply".into()))?;
        resp.into_receiver_status()
    }

    pub async fn set_muted(&self, muted: bool) -> ChannelResult<ReceiverStatusResponse> {
        let resp = self
            .send_request(
                NAMESPACE_RECEIVER,
                DESTINATION_RECEIVER,
                SetVolumeRequest::muted(muted),
                Some(ResponseKind::ReceiverStatus),
            )
            .await?
            .ok_or_else(|| ChannelError::Internal("ReceiverStatus response channel closed without a reply".into()))?;
        resp.into_receiver_status()
    }

    // --- High-level media verbs ----------------------------------------

    pub async fn load(
        &self,
        destination_id: &str,
        session_id: &str,
        media: MediaInformation,
        custom_data: Option<serde_json::Value>,
    ) -> ChannelResult<MediaStatusResponse> {
        self.ensure_sub_session(destination_id).await?;
        let resp = self
            .send_request(
                NAMESPACE_MEDIA,
                destination_id,
                LoadRequest::new(session_id, media, custom_data),
                Some(ResponseKind::MediaStatus),
            )
            .await?
            .ok_or_else(|| ChannelError::Internal("MediaStatus response channel closed without a reply".into()))?;
        resp.into_media_status()
    }

    pub async fn play(
        &self,
        destination_id: &str,
        media_session_id: i64,
    ) -> ChannelResult<MediaStatusResponse> {
        self.ensure_sub_session(destination_id).await?;
        let resp = self
            .send_request(
                NAMESPACE_MEDIA,
                destination_id,
                PlayRequest::new(media_session_id),
                Some(ResponseKind::MediaStatus),
            )
            .await?
            .ok_or_else(|| ChannelError::Internal("MediaStatus response channel closed without a reply".into()))?;
        resp.into_media_status()
    }

    pub async fn pause(
        &self,
        destination_id: &str,
        media_session_id: i64,
    ) -> ChannelResult<MediaStatusResponse> {
        self.ensure_sub_session(destination_id).await?;
        let resp = self
            .send_request(
                NAMESPACE_MEDIA,
                destination_id,
                PauseRequest::new(media_session_id),
                Some(ResponseKind::MediaStatus),
            )
            .await?
            .ok_or_else(|| ChannelError::Internal("MediaStatus response channel closed without a reply".into()))?;
        resp.into_media_status()
    }

    pub async fn seek(
        &self,
        destination_id: &str,
        media_session_id: i64,
        current_time: f64,
    ) -> ChannelResult<MediaStatusResponse> {
        self.ensure_sub_session(destination_id).await?;
        let resp = self
            .send_request(
                NAMESPACE_MEDIA,
                destination_id,
                SeekRequest::new(media_session_id, current_time),
                Some(ResponseKind::MediaStatus),
            )
            .await?
            .ok_or_else(|| ChannelError::Internal("MediaStatus response channel closed without a reply".into()))?;
        resp.into_media_status()
    }

    pub async fn get_media_status(
        &self,
        destination_id: &str,
    ) -> ChannelResult<MediaStatusResponse> {
        self.ensure_sub_session(destination_id).await?;
        let resp = self
            .send_request(
                NAMESPACE_MEDIA,
                destination_id,
                GetMediaStatusRequest::default(),
                Some(ResponseKind::MediaStatus),
            )
            .await?
            .ok_or_else(|| ChannelError::Internal("MediaStatus response channel closed without a reply".into()))?;
        resp.into_media_status()
    }

    /// Escape hatch for application-specific namespaces this crate does
    /// not model: ensures the sub-session, then forwards as-is.
    pub async fn send_generic<Req>(
        &self,
        destination_id: &str,
        namespace: &str,
        request: Req,
        expected: Option<ResponseKind>,
    ) -> ChannelResult<Option<CastResponse>>
    where
        Req: CastRequest,
    {
        self.ensure_sub_session(destination_id).await?;
        self.send_request(namespace, destination_id, request, expected)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_channel_starts_closed() {
        let cfg = ChannelConfig::new("10.0.0.5", "Living Room", "sender-1");
        let channel = Channel::new(cfg).unwrap();
        assert!(channel.is_closed());
    }

    #[test]
    fn rejects_invalid_config() {
        let cfg = ChannelConfig::new("", "Living Room", "sender-1");
        assert!(Channel::new(cfg).is_err());
    }
}
