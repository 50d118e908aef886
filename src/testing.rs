//! Canned-response HTTP server for client tests

use axum::{
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::IntoResponse,
    Router,
};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// A request as the server saw it
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: Method,
    pub uri: Uri,
    pub body: String,
}

impl CapturedRequest {
    /// `METHOD /path?query`
    pub fn request_line(&self) -> String {
        format!("{} {}", self.method, self.uri)
    }
}

#[derive(Clone)]
struct CannedState {
    status: StatusCode,
    body: Arc<String>,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

pub struct CannedServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl CannedServer {
    /// Answer every request with `status` + `body` until the test ends
    pub async fn start(status: u16, body: &str) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = CannedState {
            status: StatusCode::from_u16(status).unwrap(),
            body: Arc::new(body.to_string()),
            requests: requests.clone(),
        };

        let router = Router::new().fallback(canned_reply).with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self {
            base_url: format!("http://{}", addr),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn canned_reply(
    State(state): State<CannedState>,
    method: Method,
    uri: Uri,
    body: String,
) -> impl IntoResponse {
    state
        .requests
        .lock()
        .unwrap()
        .push(CapturedRequest { method, uri, body });

    (
        state.status,
        [(header::CONTENT_TYPE, "application/json")],
        state.body.as_str().to_string(),
    )
}

/// A local address that refuses connections
pub async fn unreachable_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
