//! HTTP and WebSocket surface of the messenger service.
//!
//! Unary operations are JSON routes. Streaming operations upgrade to a
//! WebSocket that carries one JSON text frame per update; a failing stream
//! sends a final `{"error": ...}` frame before closing.
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use log::{debug, error, info};
use protocol_node::{NodeConnector, NodeError};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::{
    api::{
        contact_request_views, ContactIdentity, ContactPubkeyResponse, ContactRequestView,
        ContactRequestsQuery, CreateGroupResponse, ErrorBody, InvitationLinkResponse,
        JoinGroupRequest, JoinGroupResponse, ListMessagesRequest, MessageView,
        SendContactRequest, SendMessageRequest, SuccessResponse,
    },
    error::{DecodeError, MessengerError},
    service::MessengerService,
    stream::Subscription,
};

pub struct AppState<C: NodeConnector> {
    service: Arc<MessengerService<C>>,
    /// Parent of every stream's cancellation token.
    shutdown: CancellationToken,
}

impl<C: NodeConnector> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<C: NodeConnector> AppState<C> {
    pub fn new(service: Arc<MessengerService<C>>, shutdown: CancellationToken) -> Self {
        Self { service, shutdown }
    }
}

/// Error response of a unary route.
#[derive(Debug)]
pub struct ApiError(pub MessengerError);

impl From<MessengerError> for ApiError {
    fn from(e: MessengerError) -> Self {
        ApiError(e)
    }
}

pub fn status_of(e: &MessengerError) -> StatusCode {
    match e {
        MessengerError::Decode { .. } => StatusCode::BAD_REQUEST,
        MessengerError::Resolution { .. } => StatusCode::NOT_FOUND,
        MessengerError::Connection { .. } => StatusCode::SERVICE_UNAVAILABLE,
        MessengerError::Relay { .. } | MessengerError::Lifecycle { .. } => StatusCode::BAD_GATEWAY,
        MessengerError::Node { source, .. } => match source {
            NodeError::NotFound(_) => StatusCode::NOT_FOUND,
            NodeError::Rejected(_) => StatusCode::CONFLICT,
            _ => StatusCode::BAD_GATEWAY,
        },
        MessengerError::Task { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_of(&self.0);
        if status.is_server_error() {
            error!("{}", self.0);
        } else {
            debug!("{}", self.0);
        }
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

fn parse<T: DeserializeOwned>(op: &'static str, body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError(MessengerError::decode(op, DecodeError::Json(e))))
}

pub fn router<C: NodeConnector>(state: AppState<C>) -> Router {
    Router::new()
        .route("/health", get(health::<C>))
        .route("/v1/invitation-link", get(invitation_link::<C>))
        .route("/v1/contact-pubkey", get(contact_pubkey::<C>))
        .route(
            "/v1/contact-requests",
            get(contact_requests::<C>).post(send_contact_request::<C>),
        )
        .route("/v1/contact-requests/ws", get(contact_requests_ws::<C>))
        .route(
            "/v1/contact-requests/accept",
            post(accept_contact_request::<C>),
        )
        .route(
            "/v1/contact-requests/discard",
            post(discard_contact_request::<C>),
        )
        .route("/v1/messages", post(send_message::<C>))
        .route("/v1/messages/ws", get(messages_ws::<C>))
        .route("/v1/groups", post(create_group::<C>))
        .route("/v1/groups/join", post(join_group::<C>))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` fires. Open streams are cancelled with it.
pub async fn serve<C: NodeConnector>(
    listener: TcpListener,
    service: Arc<MessengerService<C>>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = router(AppState::new(service, shutdown.clone()));
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn health<C: NodeConnector>(State(state): State<AppState<C>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "connected": state.service.is_connected().await,
    }))
}

async fn invitation_link<C: NodeConnector>(
    State(state): State<AppState<C>>,
) -> Result<Json<InvitationLinkResponse>, ApiError> {
    Ok(Json(state.service.get_invitation_link().await?))
}

async fn contact_pubkey<C: NodeConnector>(
    State(state): State<AppState<C>>,
) -> Result<Json<ContactPubkeyResponse>, ApiError> {
    Ok(Json(state.service.get_contact_pubkey().await?))
}

async fn contact_requests<C: NodeConnector>(
    State(state): State<AppState<C>>,
) -> Result<Json<Vec<ContactRequestView>>, ApiError> {
    let requests = state.service.contact_requests_snapshot().await?;
    Ok(Json(contact_request_views(&requests)))
}

async fn send_contact_request<C: NodeConnector>(
    State(state): State<AppState<C>>,
    body: Bytes,
) -> Result<Json<SuccessResponse>, ApiError> {
    let request: SendContactRequest = parse("send_contact_request", &body)?;
    Ok(Json(state.service.send_contact_request(request).await?))
}

async fn accept_contact_request<C: NodeConnector>(
    State(state): State<AppState<C>>,
    body: Bytes,
) -> Result<Json<SuccessResponse>, ApiError> {
    let request: ContactIdentity = parse("accept_contact_request", &body)?;
    Ok(Json(state.service.accept_contact_request(request).await?))
}

async fn discard_contact_request<C: NodeConnector>(
    State(state): State<AppState<C>>,
    body: Bytes,
) -> Result<Json<SuccessResponse>, ApiError> {
    let request: ContactIdentity = parse("discard_contact_request", &body)?;
    Ok(Json(state.service.discard_contact_request(request).await?))
}

async fn send_message<C: NodeConnector>(
    State(state): State<AppState<C>>,
    body: Bytes,
) -> Result<Json<SuccessResponse>, ApiError> {
    let request: SendMessageRequest = parse("send_message", &body)?;
    Ok(Json(state.service.send_message(request).await?))
}

async fn create_group<C: NodeConnector>(
    State(state): State<AppState<C>>,
) -> Result<Json<CreateGroupResponse>, ApiError> {
    Ok(Json(state.service.create_group().await?))
}

async fn join_group<C: NodeConnector>(
    State(state): State<AppState<C>>,
    body: Bytes,
) -> Result<Json<JoinGroupResponse>, ApiError> {
    let request: JoinGroupRequest = parse("join_group", &body)?;
    Ok(Json(state.service.join_group(request).await?))
}

/// The stream is opened before the upgrade, so a request that cannot be
/// served gets the same status code as its unary counterpart.
async fn contact_requests_ws<C: NodeConnector>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<C>>,
    Query(query): Query<ContactRequestsQuery>,
) -> Result<Response, ApiError> {
    let cancel = state.shutdown.child_token();
    let subscription = state.service.get_contact_requests(query, cancel).await?;
    Ok(ws.on_upgrade(move |socket| {
        forward(socket, subscription, |requests| {
            serde_json::to_string(&contact_request_views(requests))
        })
    }))
}

async fn messages_ws<C: NodeConnector>(
    ws: WebSocketUpgrade,
    State(state): State<AppState<C>>,
    Query(request): Query<ListMessagesRequest>,
) -> Result<Response, ApiError> {
    let cancel = state.shutdown.child_token();
    let subscription = state.service.list_messages(request, cancel).await?;
    Ok(ws.on_upgrade(move |socket| {
        forward(socket, subscription, |message| {
            serde_json::to_string(&MessageView::from(message))
        })
    }))
}

fn error_frame(e: &MessengerError) -> WsMessage {
    WsMessage::Text(json!({ "error": e.to_string() }).to_string())
}

async fn close(mut sender: SplitSink<WebSocket, WsMessage>) {
    if let Err(e) = sender.close().await {
        debug!("Closing websocket failed: {e}");
    }
}

/// Write every update of `subscription` to the socket until either side stops.
async fn forward<T, F>(
    socket: WebSocket,
    mut subscription: Subscription<T>,
    render: F,
) where
    T: Send + 'static,
    F: Fn(&T) -> Result<String, serde_json::Error>,
{
    let (mut sender, mut receiver) = socket.split();

    // The client only ever closes; anything else it sends is ignored.
    let cancel = subscription.cancellation_token();
    let watcher = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if let WsMessage::Close(_) = message {
                break;
            }
        }
        debug!("Websocket client went away");
        cancel.cancel();
    });

    while let Some(update) = subscription.next().await {
        let text = match render(&update) {
            Ok(text) => text,
            Err(e) => {
                error!("Unable to render update: {e}");
                subscription.cancel();
                break;
            }
        };
        if sender.send(WsMessage::Text(text)).await.is_err() {
            subscription.cancel();
            break;
        }
    }

    match subscription.finish().await {
        Ok(end) => debug!("Stream ended: {end:?}"),
        Err(e) => {
            error!("Stream failed: {e}");
            let _ = sender.send(error_frame(&e)).await;
        }
    }
    watcher.abort();
    close(sender).await;
}
