//! Local HTTP server standing in for remote sources

use axum::{
    body::Body,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::time::Duration;

pub const SONG_BYTES: &[u8] = b"remote-audio-bytes-0123456789";

async fn song() -> impl IntoResponse {
    SONG_BYTES
}

async fn forbidden() -> impl IntoResponse {
    StatusCode::FORBIDDEN
}

async fn broken() -> impl IntoResponse {
    StatusCode::INTERNAL_SERVER_ERROR
}

/// Sends one chunk, then stalls far longer than any test deadline
async fn stalled() -> Response {
    let stream = async_stream::stream! {
        yield Ok::<_, std::io::Error>(axum::body::Bytes::from_static(b"partial"));
        tokio::time::sleep(Duration::from_secs(3600)).await;
    };
    Response::new(Body::from_stream(stream))
}

/// Serve on an ephemeral port; returns the bound address
///
/// Routes: `/files/song.mp3`, `/forbidden.mp3`, `/broken.mp3`, `/stalled.mp3`;
/// anything else is 404.
pub async fn spawn_file_server() -> SocketAddr {
    let app = Router::new()
        .route("/files/song.mp3", get(song))
        .route("/forbidden.mp3", get(forbidden))
        .route("/broken.mp3", get(broken))
        .route("/stalled.mp3", get(stalled));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
