use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::routing::any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// One request as seen by the mock receiver.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A throwaway webhook receiver bound to an ephemeral port.
///
/// Answers 500 for the first `fail_first` requests, then 200, and records
/// every request it sees.
pub struct MockReceiver {
    pub url: String,
    hits: Arc<AtomicUsize>,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
}

impl MockReceiver {
    pub fn hit_count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn captured(&self) -> Vec<CapturedRequest> {
        self.captured.lock().expect("captured lock").clone()
    }
}

#[derive(Clone)]
struct ReceiverState {
    fail_first: usize,
    hits: Arc<AtomicUsize>,
    captured: Arc<Mutex<Vec<CapturedRequest>>>,
}

pub async fn spawn_receiver(fail_first: usize) -> MockReceiver {
    let hits = Arc::new(AtomicUsize::new(0));
    let captured = Arc::new(Mutex::new(Vec::new()));

    let state = ReceiverState {
        fail_first,
        hits: hits.clone(),
        captured: captured.clone(),
    };

    let app = Router::new().route("/hook", any(handle)).with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock receiver");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve mock receiver");
    });

    MockReceiver {
        url: format!("http://{addr}/hook"),
        hits,
        captured,
    }
}

async fn handle(
    State(state): State<ReceiverState>,
    method: Method,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, &'static str) {
    let seen = state.hits.fetch_add(1, Ordering::SeqCst);

    state
        .captured
        .lock()
        .expect("captured lock")
        .push(CapturedRequest {
            method: method.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect(),
            body,
        });

    if seen < state.fail_first {
        (StatusCode::INTERNAL_SERVER_ERROR, "simulated failure")
    } else {
        (StatusCode::OK, "ok")
    }
}
