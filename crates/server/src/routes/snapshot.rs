//! Snapshot and oEmbed handlers.

use axum::Json;
use axum::extract::{Path, RawQuery, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use snapembed_core::{CachedImage, OEmbedDocument};

use crate::error::ApiError;
use crate::service::SnapshotOutcome;
use crate::state::AppState;

/// `GET /png/{*url}`
///
/// 1. Resolves the source URL's oEmbed document
/// 2. `rich`: returns the cached or freshly rendered PNG
/// 3. `photo`: redirects to the photo URL
/// 4. Anything else: `400` with the reason
pub async fn png_handler(
    State(state): State<AppState>, Path(url): Path<String>, RawQuery(query): RawQuery,
) -> Result<Response, ApiError> {
    let source_url = source_url(url, query);

    match state.service.get_snapshot(&source_url).await {
        SnapshotOutcome::Image(image) => Ok(png_response(image)),
        SnapshotOutcome::Redirect(location) => Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response()),
        SnapshotOutcome::NotAvailable(reason) => Err(reason.into()),
    }
}

/// `GET /oembed/{*url}`
pub async fn oembed_handler(
    State(state): State<AppState>, Path(url): Path<String>, RawQuery(query): RawQuery,
) -> Result<Json<OEmbedDocument>, ApiError> {
    let source_url = source_url(url, query);
    Ok(Json(state.service.get_oembed_raw(&source_url).await?))
}

/// The wildcard path plus the request's query string, if any.
fn source_url(path: String, query: Option<String>) -> String {
    match query {
        Some(query) if !query.is_empty() => format!("{path}?{query}"),
        _ => path,
    }
}

/// Build an HTTP response with PNG content and cache headers.
///
/// `max-age` is the TTL the cache enforces for the image.
fn png_response(image: CachedImage) -> Response {
    let headers = [
        (header::CONTENT_TYPE, "image/png".to_string()),
        (header::CACHE_CONTROL, format!("public, max-age={}", image.ttl.as_secs())),
    ];

    (StatusCode::OK, headers, image.bytes).into_response()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;

    #[test]
    fn test_source_url_appends_query() {
        assert_eq!(
            source_url("https://example.com/watch".into(), Some("v=abc&t=1".into())),
            "https://example.com/watch?v=abc&t=1"
        );
        assert_eq!(source_url("https://example.com/".into(), Some(String::new())), "https://example.com/");
        assert_eq!(source_url("https://example.com/".into(), None), "https://example.com/");
    }

    #[test]
    fn test_png_response_headers() {
        let image = CachedImage { bytes: Bytes::from_static(b"png"), ttl: Duration::from_secs(60) };
        let response = png_response(image);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=60");
    }
}
