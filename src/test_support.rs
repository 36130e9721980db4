//! Local HTTP server that stands in for a repository mirror in tests.
//!
//! The server runs on its own thread and runtime so it keeps answering while
//! the code under test blocks inside a `TaskPool` runtime.

use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Shared {
    files: HashMap<String, Vec<u8>>,
    hits: AtomicUsize,
    failures_left: AtomicUsize,
    stalled: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
}

pub struct MockMirror {
    base: String,
    shared: Arc<Shared>,
}

impl MockMirror {
    /// Serve `files`, keyed by absolute request path. Unknown paths get a 404.
    pub fn serve(files: Vec<(&str, Vec<u8>)>) -> Self {
        let shared = Arc::new(Shared {
            files: files
                .into_iter()
                .map(|(path, body)| (path.to_string(), body))
                .collect(),
            hits: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            stalled: Mutex::new(HashSet::new()),
            delays: Mutex::new(HashMap::new()),
        });

        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind mock mirror");
        listener.set_nonblocking(true).expect("nonblocking listener");
        let base = format!("http://{}", listener.local_addr().expect("local addr"));

        let state = shared.clone();
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("mock mirror runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).expect("tokio listener");
                let app = Router::new().fallback(respond).with_state(state);
                let _ = axum::serve(listener, app).await;
            });
        });

        Self { base, shared }
    }

    /// Answer the next `n` requests with a 500 regardless of path.
    pub fn failing_first(self, n: usize) -> Self {
        self.shared.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Send the body of `path` and then hang instead of finishing the response.
    pub fn stalling(self, path: &str) -> Self {
        self.shared.stalled.lock().unwrap().insert(path.to_string());
        self
    }

    /// Wait `delay` before answering requests for `path`.
    pub fn delaying(self, path: &str, delay: Duration) -> Self {
        self.shared.delays.lock().unwrap().insert(path.to_string(), delay);
        self
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Number of requests received so far.
    pub fn hits(&self) -> usize {
        self.shared.hits.load(Ordering::SeqCst)
    }
}

async fn respond(State(shared): State<Arc<Shared>>, uri: Uri) -> Response {
    shared.hits.fetch_add(1, Ordering::SeqCst);

    let delay = shared.delays.lock().unwrap().get(uri.path()).copied();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let failing = shared
        .failures_left
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if failing {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let Some(body) = shared.files.get(uri.path()).cloned() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if shared.stalled.lock().unwrap().contains(uri.path()) {
        let chunks = futures::stream::once(async move { Ok::<_, std::io::Error>(body) })
            .chain(futures::stream::pending());
        return (StatusCode::OK, Body::from_stream(chunks)).into_response();
    }

    (StatusCode::OK, body).into_response()
}

/// Base URL of a local port nobody listens on.
pub fn unreachable_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{}", addr)
}

/// Pool that prints nothing
pub fn quiet_pool(workers: usize) -> crate::pool::TaskPool {
    crate::pool::TaskPool::new(crate::pool::PoolOptions::new(
        workers,
        std::time::Duration::from_secs(5),
    ))
    .with_reporter(|_| {})
}

/// Retrieval options with short timeouts and no real waiting between attempts
pub fn fast_retrieval(attempts: u32) -> crate::downloaders::RetrievalOptions {
    crate::downloaders::RetrievalOptions::new(
        std::time::Duration::from_secs(5),
        std::time::Duration::from_millis(10),
        attempts,
    )
}
