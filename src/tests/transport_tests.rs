use crate::transport::*;
use crate::{ChatConfig, Error};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::time::Duration;

/// A request as seen by the test server
#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    authorization: Option<String>,
    body: String,
}

type Log = Arc<Mutex<Vec<Recorded>>>;

const HISTORY: &str = r#"{"data":[
    {"id":"m1","senderId":"u1","receiverId":"u2","text":"hi","createdAt":"2023-11-14T22:13:20Z"},
    {"id":"m2","senderId":"u2","receiverId":"u1","text":"hello","createdAt":"2023-11-14T22:13:25Z","read":true}
]}"#;

fn reply(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

/// Fake messaging API
async fn handle(req: Request<Incoming>, log: Log) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let authorization = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = String::from_utf8_lossy(&req.collect().await?.to_bytes()).to_string();

    log.lock().await.push(Recorded {
        method: method.clone(),
        path: path.clone(),
        authorization,
        body: body.clone(),
    });

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/api/chat/u1/u2") => reply(StatusCode::OK, HISTORY.to_string()),
        (&Method::GET, "/api/chat/down/u2") => {
            reply(StatusCode::SERVICE_UNAVAILABLE, "maintenance".to_string())
        }
        (&Method::GET, "/api/chat/garbled/u2") => reply(StatusCode::OK, "<html>".to_string()),
        (&Method::POST, "/api/messages") => {
            let request: SendMessageRequest = serde_json::from_str(&body).unwrap();
            reply(
                StatusCode::CREATED,
                format!(
                    r#"{{"data":{{"id":"srv-1","senderId":"{}","receiverId":"{}","text":"{}","createdAt":"2023-11-14T22:14:00Z"}}}}"#,
                    request.sender_id, request.receiver_id, request.text
                ),
            )
        }
        (&Method::PATCH, "/api/messages/m1") => reply(
            StatusCode::OK,
            r#"{"data":{"id":"m1","senderId":"u1","receiverId":"u2","text":"fixed","createdAt":"2023-11-14T22:13:20Z","edited":true}}"#
                .to_string(),
        ),
        (&Method::DELETE, "/api/messages/m1") => reply(StatusCode::OK, "{}".to_string()),
        _ => reply(StatusCode::NOT_FOUND, String::new()),
    };

    Ok(response)
}

async fn start_server() -> (SocketAddr, Log) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().unwrap();
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let server_log = log.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let io = TokioIo::new(stream);
            let conn_log = server_log.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req| handle(req, conn_log.clone()));
                let _ = http1::Builder::new().serve_connection(io, service).await;
            });
        }
    });

    (addr, log)
}

fn backend_for(addr: SocketAddr) -> HttpBackend {
    HttpBackend::new(&format!("http://{}/api/", addr)).expect("Failed to create backend")
}

#[test]
fn test_backend_requires_base_url() {
    assert!(matches!(HttpBackend::new("  "), Err(Error::Config(_))));
}

#[test]
fn test_backend_trims_trailing_slash() {
    let backend = HttpBackend::new("http://localhost:5000/api/").unwrap();
    assert_eq!(backend.base_url(), "http://localhost:5000/api");
}

#[test]
fn test_status_error_classification() {
    // The backend client speaks reqwest's status type
    let server = status_error(reqwest::StatusCode::BAD_GATEWAY, String::new());
    assert!(matches!(server, Error::Server { status: 502, ref message } if message == "Bad Gateway"));

    let api = status_error(reqwest::StatusCode::FORBIDDEN, "no access".to_string());
    assert!(matches!(api, Error::Api { status: 403, ref message } if message == "no access"));
}

#[test]
fn test_send_request_wire_format() {
    let request = SendMessageRequest {
        sender_id: "u1".to_string(),
        receiver_id: "u2".to_string(),
        text: "hi".to_string(),
        replied_to: None,
    };

    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(value["senderId"], "u1");
    assert_eq!(value["receiverId"], "u2");
    assert!(value.get("repliedTo").is_none());
}

#[tokio::test]
async fn test_fetch_conversation() {
    let (addr, log) = start_server().await;
    let backend = backend_for(addr);

    let messages = backend
        .fetch_conversation("u1", "u2")
        .await
        .expect("Failed to fetch");

    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].id, "m1");
    assert_eq!(messages[1].id, "m2");
    assert!(messages[1].read);

    let recorded = log.lock().await;
    assert_eq!(recorded[0].method, Method::GET);
    assert_eq!(recorded[0].path, "/api/chat/u1/u2");
    assert!(recorded[0].authorization.is_none());
}

#[tokio::test]
async fn test_fetch_server_error() {
    let (addr, _log) = start_server().await;
    let backend = backend_for(addr);

    let result = backend.fetch_conversation("down", "u2").await;

    match result {
        Err(e @ Error::Server { .. }) => {
            assert!(e.is_server_error());
            assert!(e.to_string().contains("maintenance"));
        }
        other => panic!("Expected server error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_fetch_not_found_is_api_error() {
    let (addr, _log) = start_server().await;
    let backend = backend_for(addr);

    let result = backend.fetch_conversation("nobody", "u2").await;
    assert!(matches!(result, Err(Error::Api { status: 404, .. })));
}

#[tokio::test]
async fn test_fetch_garbled_body_is_decode_error() {
    let (addr, _log) = start_server().await;
    let backend = backend_for(addr);

    let result = backend.fetch_conversation("garbled", "u2").await;
    assert!(matches!(result, Err(Error::Decode(_))));
}

#[tokio::test]
async fn test_unreachable_backend_is_network_error() {
    // Bind then drop a listener to get a port nothing listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend =
        HttpBackend::with_options(&format!("http://{}", addr), None, Duration::from_secs(2))
            .unwrap();

    let result = backend.fetch_conversation("u1", "u2").await;
    assert!(matches!(result, Err(Error::Network(_))));
}

#[tokio::test]
async fn test_send_message_with_token() {
    let (addr, log) = start_server().await;
    let config = ChatConfig {
        base_url: format!("http://{}/api", addr),
        auth_token: Some("tok-123".to_string()),
        ..ChatConfig::default()
    };
    let backend = HttpBackend::from_config(&config).unwrap();

    let request = SendMessageRequest {
        sender_id: "u1".to_string(),
        receiver_id: "u2".to_string(),
        text: "see you in class".to_string(),
        replied_to: Some("m2".to_string()),
    };

    let message = backend.send_message(&request).await.expect("Failed to send");
    assert_eq!(message.id, "srv-1");
    assert_eq!(message.text, "see you in class");

    let recorded = log.lock().await;
    assert_eq!(recorded[0].method, Method::POST);
    assert_eq!(recorded[0].authorization.as_deref(), Some("Bearer tok-123"));

    let sent: SendMessageRequest = serde_json::from_str(&recorded[0].body).unwrap();
    assert_eq!(sent, request);
}

#[tokio::test]
async fn test_edit_message() {
    let (addr, log) = start_server().await;
    let backend = backend_for(addr);

    let message = backend
        .edit_message("m1", "u1", "fixed")
        .await
        .expect("Failed to edit");
    assert!(message.edited);
    assert_eq!(message.text, "fixed");

    let recorded = log.lock().await;
    assert_eq!(recorded[0].method, Method::PATCH);
    let body: EditMessageRequest = serde_json::from_str(&recorded[0].body).unwrap();
    assert_eq!(body.user_id, "u1");
    assert_eq!(body.text, "fixed");
}

#[tokio::test]
async fn test_delete_message() {
    let (addr, log) = start_server().await;
    let backend = backend_for(addr);

    backend
        .delete_message("m1", "u1")
        .await
        .expect("Failed to delete");

    let missing = backend.delete_message("m404", "u1").await;
    assert!(matches!(missing, Err(Error::Api { status: 404, .. })));

    let recorded = log.lock().await;
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0].method, Method::DELETE);
    assert_eq!(recorded[0].path, "/api/messages/m1");
}

#[tokio::test]
async fn test_ids_are_encoded_as_single_path_segments() {
    let (addr, log) = start_server().await;
    let backend = backend_for(addr);

    // Unknown resources answer 404; only the path matters here
    let _ = backend.fetch_conversation("a#x", "u/2?b").await;
    let _ = backend.delete_message("../admin", "u1").await;
    let _ = backend.edit_message("m 1", "u1", "x").await;

    let recorded = log.lock().await;
    assert_eq!(recorded.len(), 3);
    assert_eq!(recorded[0].path, "/api/chat/a%23x/u%2F2%3Fb");
    assert_eq!(recorded[1].method, Method::DELETE);
    assert_eq!(recorded[1].path, "/api/messages/..%2Fadmin");
    assert_eq!(recorded[2].path, "/api/messages/m%201");
}

#[tokio::test]
async fn test_dot_segment_ids_rejected_without_request() {
    let (addr, log) = start_server().await;
    let backend = backend_for(addr);

    let result = backend.delete_message("..", "u1").await;
    assert!(matches!(result, Err(Error::Validation(_))));

    let result = backend.fetch_conversation("u1", "").await;
    assert!(matches!(result, Err(Error::Validation(_))));

    assert!(log.lock().await.is_empty());
}

#[test]
fn test_backend_rejects_unparseable_base_url() {
    assert!(matches!(HttpBackend::new("not a url"), Err(Error::Config(_))));
}
