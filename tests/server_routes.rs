//! HTTP and WebSocket routes of the messenger server.

use std::{sync::Arc, time::Duration};

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use messenger_svc::{
    api::{
        ContactPubkeyResponse, ContactRequestView, CreateGroupResponse, ErrorBody,
        InvitationLinkResponse, JoinGroupResponse, MessageView, SuccessResponse,
    },
    codec,
    server::{self, AppState},
    MessengerService, ServiceOptions,
};
use protocol_node::{MemoryNetwork, MemoryNode};

const WAIT: Duration = Duration::from_secs(5);

struct Peer {
    service: Arc<MessengerService<MemoryNode>>,
    app: Router,
}

async fn peer(network: &MemoryNetwork, name: &str) -> Peer {
    let node = network.register_account(name).await;
    let service = Arc::new(
        MessengerService::connect(node, ServiceOptions::default())
            .await
            .unwrap(),
    );
    let app = server::router(AppState::new(service.clone(), CancellationToken::new()));
    Peer { service, app }
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn get_json<T: DeserializeOwned>(app: &Router, uri: &str) -> (StatusCode, T) {
    let request = Request::get(uri).body(Body::empty()).unwrap();
    let (status, body) = call(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_json<T: DeserializeOwned>(app: &Router, uri: &str, body: Value) -> (StatusCode, T) {
    let request = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, body) = call(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

/// Percent-encode the base64 characters that are not safe in a query.
fn query_escape(text: &str) -> String {
    text.replace('+', "%2B")
        .replace('/', "%2F")
        .replace('=', "%3D")
}

async fn spawn_server(peer: &Peer) -> (String, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    tokio::spawn(server::serve(
        listener,
        peer.service.clone(),
        shutdown.clone(),
    ));
    (format!("ws://{addr}"), shutdown)
}

async fn next_text<S>(socket: &mut S) -> Option<String>
where
    S: futures::Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    loop {
        let frame = tokio::time::timeout(WAIT, socket.next())
            .await
            .expect("no frame in time");
        match frame {
            Some(Ok(WsMessage::Text(text))) => return Some(text),
            Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        }
    }
}

// ─────────────────────────── Unary routes ───────────────────────────

#[tokio::test]
async fn health_reports_connection() {
    let network = MemoryNetwork::new();
    let alice = peer(&network, "alice").await;

    let (status, body): (_, Value) = get_json(&alice.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok", "connected": true }));
}

#[tokio::test]
async fn identity_routes_describe_the_account() {
    let network = MemoryNetwork::new();
    let alice = peer(&network, "alice").await;

    let (status, link): (_, InvitationLinkResponse) =
        get_json(&alice.app, "/v1/invitation-link").await;
    assert_eq!(status, StatusCode::OK);
    assert!(link.link.starts_with("memory://contact/"));

    let (status, card): (_, ContactPubkeyResponse) =
        get_json(&alice.app, "/v1/contact-pubkey").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        codec::decode_key("identity", &card.identity_b64).unwrap(),
        alice.service.account_pk()
    );
}

#[tokio::test]
async fn contact_request_round_trip_over_http() {
    let network = MemoryNetwork::new();
    let alice = peer(&network, "alice").await;
    let bob = peer(&network, "bob").await;

    let (_, card): (_, ContactPubkeyResponse) = get_json(&bob.app, "/v1/contact-pubkey").await;
    let (status, sent): (_, SuccessResponse) = post_json(
        &alice.app,
        "/v1/contact-requests",
        json!({
            "identity_b64": card.identity_b64,
            "rendezvous_seed_b64": card.rendezvous_seed_b64,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(sent.success);

    let (_, pending): (_, Vec<ContactRequestView>) =
        get_json(&bob.app, "/v1/contact-requests").await;
    assert_eq!(
        pending,
        vec![ContactRequestView {
            identity_b64: codec::encode(alice.service.account_pk()),
            display_name: "alice".to_string(),
        }]
    );

    let (status, _): (_, SuccessResponse) = post_json(
        &bob.app,
        "/v1/contact-requests/accept",
        json!({ "identity_b64": pending[0].identity_b64 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, pending): (_, Vec<ContactRequestView>) =
        get_json(&bob.app, "/v1/contact-requests").await;
    assert!(pending.is_empty());

    let (status, _): (_, SuccessResponse) = post_json(
        &bob.app,
        "/v1/messages",
        json!({
            "target": codec::encode(alice.service.account_pk()),
            "target_is_peer_identity": true,
            "payload": "hello alice",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn bad_requests_map_to_400() {
    let network = MemoryNetwork::new();
    let alice = peer(&network, "alice").await;

    let request = Request::post("/v1/contact-requests/accept")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = call(&alice.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: ErrorBody = serde_json::from_slice(&body).unwrap();
    assert!(body.error.starts_with("accept_contact_request:"));

    let (status, body): (_, ErrorBody) = post_json(
        &alice.app,
        "/v1/contact-requests/discard",
        json!({ "identity_b64": "!!!" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.error.contains("identity_b64"));

    let (status, _): (_, ErrorBody) = post_json(
        &alice.app,
        "/v1/groups/join",
        json!({ "invitation_b64": codec::encode(b"\x0a\xc8\x01") }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_target_maps_to_404() {
    let network = MemoryNetwork::new();
    let alice = peer(&network, "alice").await;

    let (status, body): (_, ErrorBody) = post_json(
        &alice.app,
        "/v1/messages",
        json!({
            "target": codec::encode(&[5u8; 32]),
            "target_is_peer_identity": false,
            "payload": "anyone?",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.error.starts_with("send_message:"));
}

#[tokio::test]
async fn unreachable_node_maps_to_503() {
    let network = MemoryNetwork::new();
    let alice = peer(&network, "alice").await;
    network.set_reachable(false);

    let (status, _): (_, ErrorBody) = get_json(&alice.app, "/v1/invitation-link").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (_, health): (_, Value) = get_json(&alice.app, "/health").await;
    assert_eq!(health["connected"], json!(false));
}

#[tokio::test]
async fn group_create_and_join_over_http() {
    let network = MemoryNetwork::new();
    let alice = peer(&network, "alice").await;
    let bob = peer(&network, "bob").await;

    let (status, created): (_, CreateGroupResponse) =
        post_json(&alice.app, "/v1/groups", json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let (status, joined): (_, JoinGroupResponse) = post_json(
        &bob.app,
        "/v1/groups/join",
        json!({ "invitation_b64": created.invitation_b64 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(joined.success);
    assert_eq!(joined.group_key_b64, created.group_key_b64);
}

// ─────────────────────────── WebSocket routes ───────────────────────────

#[tokio::test]
async fn contact_request_socket_streams_updates() {
    let network = MemoryNetwork::new();
    let alice = peer(&network, "alice").await;
    let bob = peer(&network, "bob").await;
    let (base, shutdown) = spawn_server(&bob).await;

    let (mut socket, _) = connect_async(format!("{base}/v1/contact-requests/ws?live_stream=true"))
        .await
        .unwrap();

    let (_, card): (_, ContactPubkeyResponse) = get_json(&bob.app, "/v1/contact-pubkey").await;
    let (status, _): (_, SuccessResponse) = post_json(
        &alice.app,
        "/v1/contact-requests",
        json!({
            "identity_b64": card.identity_b64,
            "rendezvous_seed_b64": card.rendezvous_seed_b64,
            "display_name": "Alice",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let frame = next_text(&mut socket).await.unwrap();
    let set: Vec<ContactRequestView> = serde_json::from_str(&frame).unwrap();
    assert_eq!(set.len(), 1);
    assert_eq!(set[0].display_name, "Alice");

    shutdown.cancel();
    assert!(next_text(&mut socket).await.is_none());
}

#[tokio::test]
async fn message_socket_replays_history_and_closes() {
    let network = MemoryNetwork::new();
    let alice = peer(&network, "alice").await;
    let (base, shutdown) = spawn_server(&alice).await;

    let (_, created): (_, CreateGroupResponse) =
        post_json(&alice.app, "/v1/groups", json!({})).await;
    for text in ["first", "second"] {
        let (status, _): (_, SuccessResponse) = post_json(
            &alice.app,
            "/v1/messages",
            json!({
                "target": created.group_key_b64,
                "payload": text,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let url = format!(
        "{base}/v1/messages/ws?target={}&until_now=true&reverse=true",
        query_escape(&created.group_key_b64)
    );
    let (mut socket, _) = connect_async(url).await.unwrap();

    let mut payloads = Vec::new();
    while let Some(frame) = next_text(&mut socket).await {
        let message: MessageView = serde_json::from_str(&frame).unwrap();
        payloads.push(message.payload);
    }
    assert_eq!(payloads, vec!["second", "first"]);
    shutdown.cancel();
}

/// Status the server answered a refused upgrade with.
async fn refused_upgrade(url: String) -> u16 {
    match connect_async(url).await {
        Err(WsError::Http(response)) => response.status().as_u16(),
        Err(e) => panic!("unexpected handshake failure: {e}"),
        Ok(_) => panic!("upgrade should have been refused"),
    }
}

#[tokio::test]
async fn message_socket_refuses_unresolvable_target() {
    let network = MemoryNetwork::new();
    let alice = peer(&network, "alice").await;
    let (base, shutdown) = spawn_server(&alice).await;

    let unknown = format!(
        "{base}/v1/messages/ws?target={}&until_now=true",
        query_escape(&codec::encode(&[3u8; 32]))
    );
    assert_eq!(refused_upgrade(unknown).await, 404);

    let undecodable = format!("{base}/v1/messages/ws?target=%21%21%21&until_now=true");
    assert_eq!(refused_upgrade(undecodable).await, 400);

    network.set_reachable(false);
    let down = format!("{base}/v1/contact-requests/ws?live_stream=true");
    assert_eq!(refused_upgrade(down).await, 503);
    shutdown.cancel();
}
