use crate::session::SharedSession;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use nfc_proto::catalog;
use nfc_proto::config::LibraryConfig;
use nfc_proto::protocol::{
    MusicFileEntry, ReadNfcResponse, StateResponse, WriteQuery, WriteResponse,
};
use nfc_proto::Payload;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[derive(Clone)]
pub struct HttpState {
    pub session: SharedSession,
    pub library: Arc<LibraryConfig>,
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/json/musicfiles", get(music_files))
        .route("/json/readnfc", get(read_nfc))
        .route("/json/state", get(get_state))
        .route("/actions/writenfc", get(write_nfc).post(write_nfc))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn start_server(bind_address: String, port: u16, state: HttpState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(state);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

/// Rescan the library and install the fresh table.
async fn music_files(State(state): State<HttpState>) -> Result<Json<Vec<MusicFileEntry>>, StatusCode> {
    let library = state.library.clone();
    let table = tokio::task::spawn_blocking(move || catalog::build(&library))
        .await
        .map_err(|e| {
            error!("catalog scan task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("catalog scan failed: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let listing = MusicFileEntry::listing(&table);
    state.session.lock().await.install_table(table);
    Ok(Json(listing))
}

async fn read_nfc(State(state): State<HttpState>) -> Json<ReadNfcResponse> {
    let session = state.session.lock().await;
    Json(ReadNfcResponse::new(session.snapshot().as_ref(), session.table()))
}

async fn get_state(State(state): State<HttpState>) -> Json<StateResponse> {
    Json(state.session.lock().await.state())
}

enum WriteOutcome {
    Written(String),
    UnknownHash,
    Failed,
}

async fn write_nfc(
    State(state): State<HttpState>,
    Query(query): Query<WriteQuery>,
) -> Result<Json<WriteResponse>, StatusCode> {
    let Some(hex_data) = query.data else {
        error!("No data argument given for writenfc endpoint");
        return Ok(Json(WriteResponse::new("No data argument given")));
    };

    let payload = match Payload::from_hex(&hex_data) {
        Ok(p) => p,
        Err(e) => return Ok(Json(WriteResponse::new(format!("Invalid tag data: {}", e)))),
    };
    if payload.control().is_none() {
        return Ok(Json(WriteResponse::new(format!(
            "Unknown control byte: {:02x}",
            payload.0[0]
        ))));
    }

    info!("HTTP: write tag {}", payload);
    let session = state.session.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let mut session = session.blocking_lock();
        let Some(name) = session.table().get(&payload).map(|a| a.name().to_string()) else {
            return WriteOutcome::UnknownHash;
        };
        if session.write_payload(&payload) {
            WriteOutcome::Written(name)
        } else {
            WriteOutcome::Failed
        }
    })
    .await
    .map_err(|e| {
        error!("tag write task failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let message = match outcome {
        WriteOutcome::Written(name) => format!("Successfully wrote NFC tag for: {}", name),
        WriteOutcome::UnknownHash => "Unknown hash value!".to_string(),
        WriteOutcome::Failed => format!("Error writing NFC tag data {}", payload),
    };
    Ok(Json(WriteResponse::new(message)))
}
