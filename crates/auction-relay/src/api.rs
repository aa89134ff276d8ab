//! HTTP surface of the service: websocket upgrades for `/auction` and `/chat`.

use {
    crate::{chat::Chat, connection, metrics, relay::Relay},
    axum::{
        Router,
        extract::{
            State,
            ws::{WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
        },
        http::{HeaderMap, StatusCode, header},
        response::{IntoResponse, Response},
        routing::get,
    },
    std::{collections::HashSet, sync::Arc},
    tower_http::trace::TraceLayer,
};

#[derive(Clone)]
pub struct AppState {
    /// `None` if the auction relay is disabled.
    pub relay: Option<Arc<Relay>>,
    pub chat: Arc<Chat>,
    /// Origins allowed to connect. Empty allows all origins.
    pub allowed_origins: Arc<HashSet<String>>,
}

impl AppState {
    fn origin_allowed(&self, headers: &HeaderMap) -> bool {
        if self.allowed_origins.is_empty() {
            return true;
        }
        match headers.get(header::ORIGIN) {
            None => true,
            Some(origin) => origin
                .to_str()
                .is_ok_and(|origin| self.allowed_origins.contains(origin)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/auction", get(auction))
        .route("/chat", get(chat))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn auction(
    State(state): State<AppState>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(relay) = state.relay.clone() else {
        return StatusCode::GONE.into_response();
    };
    let upgrade = match authorize(&state, &headers, upgrade) {
        Ok(upgrade) => upgrade,
        Err(response) => return response,
    };
    upgrade
        .on_failed_upgrade(|err| {
            tracing::warn!(?err, "auction upgrade failed");
            metrics::get()
                .socket_errors
                .with_label_values(&["/auction"])
                .inc();
        })
        .on_upgrade(move |socket| connection::serve(socket, relay))
}

async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let upgrade = match authorize(&state, &headers, upgrade) {
        Ok(upgrade) => upgrade,
        Err(response) => return response,
    };
    let chat = state.chat.clone();
    upgrade.on_upgrade(move |socket| chat.serve(socket))
}

fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<WebSocketUpgrade, Response> {
    if !state.origin_allowed(headers) {
        tracing::debug!(origin = ?headers.get(header::ORIGIN), "rejected origin");
        return Err(StatusCode::FORBIDDEN.into_response());
    }
    upgrade.map_err(IntoResponse::into_response)
}
