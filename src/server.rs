use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub type LaunchFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Builds the future that runs the watcher from start to its terminal state.
pub type Launcher = Arc<dyn Fn() -> LaunchFuture + Send + Sync>;

/// Shared state passed to every route handler.
#[derive(Clone)]
pub struct AppState {
    running: Arc<AtomicBool>,
    launcher: Launcher,
    voice_message: Arc<str>,
}

impl AppState {
    pub fn new(launcher: Launcher, voice_message: impl Into<Arc<str>>) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            launcher,
            voice_message: voice_message.into(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/start", get(start_watcher))
        .route("/voice", post(voice))
        .route("/health", get(health))
        .with_state(state)
}

/// Binds `0.0.0.0:{port}` and serves until the process exits.
pub async fn serve(state: AppState, port: u16) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("Server running at http://localhost:{}", port);
    axum::serve(listener, build_router(state)).await
}

async fn start_watcher(State(state): State<AppState>) -> impl IntoResponse {
    if state.running.swap(true, Ordering::SeqCst) {
        tracing::warn!("Start requested while the watcher is already running");
        return (StatusCode::CONFLICT, "Watcher is already running.");
    }

    let running = Arc::clone(&state.running);
    let run = (state.launcher)();
    tokio::spawn(async move {
        run.await;
        running.store(false, Ordering::SeqCst);
    });

    (StatusCode::OK, "Watcher has started successfully.")
}

async fn voice(State(state): State<AppState>) -> impl IntoResponse {
    let body = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Say voice="alice">{}</Say></Response>"#,
        escape_xml(&state.voice_message)
    );
    ([(header::CONTENT_TYPE, "text/xml")], body)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "running": state.is_running() }))
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}
