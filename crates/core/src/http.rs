//! Static file front door.
//!
//! Serves everything under a root directory, including the transcoder's live
//! playlist and segments, with `tower-http`'s [`ServeDir`]. Missing paths and
//! traversal attempts get 404, non-GET/HEAD methods get 405, and directories
//! serve their `index.html`.
//!
//! The front door knows nothing about the transcoder. Readers may see a
//! playlist that references a segment which was rotated out a moment later;
//! HLS players tolerate that.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

use axum::Router;
use axum::extract::Request;
use axum::http::{HeaderValue, header};
use axum::middleware::{self, Next};
use axum::response::Response;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
pub const TS_SEGMENT_CONTENT_TYPE: &str = "video/mp2t";
pub const FMP4_SEGMENT_CONTENT_TYPE: &str = "video/iso.segment";

/// Build the router serving `root`.
pub fn router(root: impl AsRef<Path>) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(root.as_ref()))
        .layer(middleware::from_fn(hls_headers))
        .layer(TraceLayer::new_for_http())
}

/// Serve `root` on `listener` until `shutdown` is cancelled.
///
/// Once cancelled the listener is closed immediately and in-flight requests
/// are allowed to finish.
pub async fn serve(listener: TcpListener, root: PathBuf, shutdown: CancellationToken) -> io::Result<()> {
    if !root.is_dir() {
        tracing::warn!(root = %root.display(), "HTTP root is not a directory, every request will 404");
    }
    axum::serve(listener, router(&root))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    tracing::info!("HTTP listener closed");
    Ok(())
}

/// Content type for HLS artifacts, keyed by file extension.
///
/// Generic MIME tables disagree on `.ts` (TypeScript vs. MPEG-TS), so HLS
/// extensions are pinned here.
pub fn hls_content_type(path: &str) -> Option<&'static str> {
    let ext = Path::new(path).extension().and_then(OsStr::to_str)?;
    match ext.to_ascii_lowercase().as_str() {
        "m3u8" => Some(PLAYLIST_CONTENT_TYPE),
        "ts" => Some(TS_SEGMENT_CONTENT_TYPE),
        "m4s" => Some(FMP4_SEGMENT_CONTENT_TYPE),
        _ => None,
    }
}

async fn hls_headers(request: Request, next: Next) -> Response {
    let content_type = hls_content_type(request.uri().path());
    let mut response = next.run(request).await;

    if let Some(content_type) = content_type {
        if response.status().is_success() {
            let headers = response.headers_mut();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            // The playlist is rewritten every segment.
            if content_type == PLAYLIST_CONTENT_TYPE {
                headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            }
        }
    }

    response
}
