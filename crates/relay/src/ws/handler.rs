use std::time::{Duration, Instant};

use axum::{
    body::Bytes,
    extract::{
        ws::{
            close_code, rejection::WebSocketUpgradeRejection, CloseFrame, Message, WebSocket,
            WebSocketUpgrade,
        },
        Path, State,
    },
    http::{header::AUTHORIZATION, HeaderMap},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    broadcast::broadcast,
    error::SocketError,
    membership::{authorize_chat_join, notification_join, JoinGrant},
    protocol::{send_error, send_frame, Frame, FrameKind},
    registry::{ConnectionRegistry, ConnectionTags},
    session::{SessionState, SocketSession, StreamKind},
    validator::{validate_chat_entry, validate_notification_entry},
    HEARTBEAT_INTERVAL_MS, MAX_FRAME_BYTES,
};
use crate::{
    auth::identity::{Identity, IdentityResolver},
    config::{RelayConfig, DEFAULT_OUTBOUND_QUEUE_CAPACITY},
    error::{request_id_from_headers_or_generate, with_request_id_scope, ErrorCode, RelayError},
    metrics,
    store::SocialStore,
};

const JOIN_ENDPOINT: &str = "join";

#[derive(Debug, Clone, Copy)]
pub struct SocketSettings {
    pub outbound_queue_capacity: usize,
    pub heartbeat_interval: Duration,
}

impl Default for SocketSettings {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            heartbeat_interval: Duration::from_millis(HEARTBEAT_INTERVAL_MS),
        }
    }
}

impl SocketSettings {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self { outbound_queue_capacity: config.outbound_queue_capacity, ..Self::default() }
    }
}

#[derive(Clone)]
pub struct SocketRouterState {
    resolver: IdentityResolver,
    store: SocialStore,
    registry: ConnectionRegistry,
    settings: SocketSettings,
}

impl SocketRouterState {
    pub fn new(
        resolver: IdentityResolver,
        store: SocialStore,
        registry: ConnectionRegistry,
        settings: SocketSettings,
    ) -> Self {
        Self { resolver, store, registry, settings }
    }
}

#[derive(Debug, Clone)]
enum StreamRequest {
    Chat { target: String },
    Notification,
}

impl StreamRequest {
    fn kind(&self) -> StreamKind {
        match self {
            Self::Chat { .. } => StreamKind::Chat,
            Self::Notification => StreamKind::Notification,
        }
    }
}

pub fn router(state: SocketRouterState) -> Router {
    Router::new()
        .route("/api/v1/ws/chats/{target}", get(chat_upgrade))
        .route("/api/v1/ws/notifications", get(notification_upgrade))
        .with_state(state)
}

async fn chat_upgrade(
    Path(target): Path<String>,
    State(state): State<SocketRouterState>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    open_stream(state, &headers, upgrade, StreamRequest::Chat { target })
}

async fn notification_upgrade(
    State(state): State<SocketRouterState>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    open_stream(state, &headers, upgrade, StreamRequest::Notification)
}

fn open_stream(
    state: SocketRouterState,
    headers: &HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    request: StreamRequest,
) -> Response {
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            return RelayError::new(ErrorCode::UpgradeRequired, rejection.body_text())
                .into_response();
        }
    };

    // Authentication happens after the upgrade so failures can be reported
    // as a socket frame.
    let credential = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned);
    let request_id = request_id_from_headers_or_generate(headers);

    upgrade.max_frame_size(MAX_FRAME_BYTES).max_message_size(MAX_FRAME_BYTES).on_upgrade(
        move |socket| async move {
            with_request_id_scope(request_id, handle_socket(state, socket, request, credential))
                .await;
        },
    )
}

async fn handle_socket(
    state: SocketRouterState,
    mut socket: WebSocket,
    request: StreamRequest,
    credential: Option<String>,
) {
    let mut session = SocketSession::new(request.kind());
    let join_started_at = Instant::now();

    let identity = match state.resolver.resolve(credential.as_deref()).await {
        Ok(identity) => identity,
        Err(error) => {
            session.step(SessionState::AuthFailed);
            reject(&mut socket, &mut session, &error, join_started_at).await;
            return;
        }
    };
    session.step(SessionState::Authenticated);

    let grant = match &request {
        StreamRequest::Chat { target } => authorize_chat_join(&state.store, &identity, target).await,
        StreamRequest::Notification => Ok(notification_join(&identity)),
    };
    let grant = match grant {
        Ok(grant) => grant,
        Err(error) => {
            session.step(SessionState::JoinRejected);
            reject(&mut socket, &mut session, &error, join_started_at).await;
            return;
        }
    };
    session.step(SessionState::Joined);

    let (outbound_sender, mut outbound_receiver) =
        mpsc::channel::<Frame>(state.settings.outbound_queue_capacity);
    let registration = state.registry.register(connection_tags(&identity, &grant), outbound_sender);
    let connection_id = registration.id();
    session.step(SessionState::Streaming);

    let stream = session.stream();
    metrics::record_ws_request(JOIN_ENDPOINT, false, elapsed_ms(join_started_at));
    metrics::connection_opened(stream.as_str());
    info!(
        connection_id = %connection_id,
        stream = stream.as_str(),
        group = %grant.group,
        identity = identity.kind(),
        user_id = ?identity.user_id(),
        "socket joined"
    );

    // The server pings every interval; a ping still unanswered at the next
    // tick closes the connection.
    let mut heartbeat = tokio::time::interval(state.settings.heartbeat_interval);
    heartbeat.reset();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if awaiting_pong {
                    warn!(connection_id = %connection_id, "heartbeat timeout, disconnecting");
                    break;
                }
                if socket.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }
            maybe_outbound = outbound_receiver.recv() => {
                let Some(frame) = maybe_outbound else {
                    break;
                };
                if send_frame(&mut socket, frame).await.is_err() {
                    break;
                }
            }
            maybe_message = socket.recv() => {
                let Some(message) = maybe_message else {
                    break;
                };

                let outcome = match message {
                    Ok(Message::Text(text)) => {
                        let raw = text.as_str().as_bytes();
                        handle_entry(&state, &identity, &grant, stream, &mut socket, raw, FrameKind::Text)
                            .await
                    }
                    Ok(Message::Binary(bytes)) => {
                        let raw = &bytes[..];
                        handle_entry(&state, &identity, &grant, stream, &mut socket, raw, FrameKind::Binary)
                            .await
                    }
                    Ok(Message::Ping(payload)) => socket
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|error| SocketError::Transport(error.to_string())),
                    Ok(Message::Pong(_)) => {
                        awaiting_pong = false;
                        Ok(())
                    }
                    Ok(Message::Close(_)) => break,
                    Err(error) => {
                        warn!(connection_id = %connection_id, error = %error, "socket read failed");
                        session.step(SessionState::ProtocolError);
                        let _ = send_error(&mut socket, &SocketError::Transport(error.to_string())).await;
                        break;
                    }
                };

                if outcome.is_err() {
                    break;
                }
            }
        }
    }

    drop(registration);
    metrics::connection_closed(stream.as_str());
    session.close();
    info!(connection_id = %connection_id, group = %grant.group, "socket left");
}

/// Validates and routes one inbound frame. Only transport failures on the
/// origin socket are returned as errors; rejected entries are answered and
/// the session keeps streaming.
async fn handle_entry(
    state: &SocketRouterState,
    identity: &Identity,
    grant: &JoinGrant,
    stream: StreamKind,
    socket: &mut WebSocket,
    raw: &[u8],
    kind: FrameKind,
) -> Result<(), SocketError> {
    let started_at = Instant::now();
    let validated = match stream {
        StreamKind::Chat => validate_chat_entry(&state.store, identity, &grant.group, raw).await,
        StreamKind::Notification => {
            validate_notification_entry(&state.store, identity, raw).await
        }
    };

    match validated {
        Ok(delivery) => {
            let frame = Frame::new(kind, delivery.payload);
            for group in &delivery.groups {
                broadcast(&state.registry, group, &frame);
            }
            metrics::record_ws_request(stream.entry_endpoint(), false, elapsed_ms(started_at));
            Ok(())
        }
        Err(error) => {
            metrics::record_ws_request(stream.entry_endpoint(), true, elapsed_ms(started_at));
            debug!(error_type = error.error_type(), error = %error, "socket entry rejected");
            send_error(socket, &error).await
        }
    }
}

async fn reject(
    socket: &mut WebSocket,
    session: &mut SocketSession,
    error: &SocketError,
    started_at: Instant,
) {
    metrics::record_ws_request(JOIN_ENDPOINT, true, elapsed_ms(started_at));
    info!(
        stream = session.stream().as_str(),
        state = %session.state(),
        code = error.code(),
        error_type = error.error_type(),
        "socket join rejected"
    );

    let frame = error.to_frame();
    if send_error(socket, error).await.is_ok() {
        let code = match error {
            SocketError::Internal(_) => close_code::ERROR,
            _ => close_code::POLICY,
        };
        let _ = socket
            .send(Message::Close(Some(CloseFrame { code, reason: frame.message.into() })))
            .await;
    }
    session.close();
}

fn connection_tags(identity: &Identity, grant: &JoinGrant) -> ConnectionTags {
    let viewer: Option<Uuid> = match identity {
        Identity::User(user) => Some(user.id),
        Identity::Service => grant.shadow_target,
    };

    ConnectionTags {
        group: grant.group.clone(),
        viewer,
        shadow_target: grant.shadow_target,
        identity_kind: identity.kind(),
    }
}

fn elapsed_ms(started_at: Instant) -> u64 {
    started_at.elapsed().as_millis() as u64
}
