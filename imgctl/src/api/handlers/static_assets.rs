//! HTTP handlers for the bundled web page.

use axum::{
    body::Body,
    extract::Path,
    http::{Response, StatusCode, header},
    response::IntoResponse,
};
use tracing::{debug, instrument};

use crate::static_assets::PageAssets;

fn asset_response(path: &str) -> Response<Body> {
    let Some(content) = PageAssets::get(path) else {
        debug!(path, "Static asset not found");
        return StatusCode::NOT_FOUND.into_response();
    };

    let mime = mime_guess::from_path(path).first_or_octet_stream();
    (
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from(content.data.into_owned()),
    )
        .into_response()
}

/// The landing page.
#[instrument]
pub async fn serve_index() -> impl IntoResponse {
    asset_response("index.html")
}

/// Files under `/static/`.
#[instrument]
pub async fn serve_static(Path(path): Path<String>) -> impl IntoResponse {
    asset_response(path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, routing::get};
    use axum_test::TestServer;

    fn create_test_router() -> Router {
        Router::new()
            .route("/", get(serve_index))
            .route("/static/{*path}", get(serve_static))
    }

    #[tokio::test]
    async fn test_root_serves_index_html() {
        let server = TestServer::new(create_test_router()).unwrap();

        let response = server.get("/").await;

        response.assert_status_ok();
        assert_eq!(
            response.headers().get("content-type").map(|v| v.to_str().unwrap()),
            Some("text/html")
        );
        assert_eq!(
            response.headers().get("cache-control").map(|v| v.to_str().unwrap()),
            Some("no-cache")
        );
        assert!(response.text().contains("<!DOCTYPE html>"));
    }

    #[tokio::test]
    async fn test_serves_script_and_stylesheet() {
        let server = TestServer::new(create_test_router()).unwrap();

        let script = server.get("/static/script.js").await;
        script.assert_status_ok();
        let content_type = script.headers().get("content-type").unwrap().to_str().unwrap().to_string();
        assert!(content_type.contains("javascript"), "unexpected content type {content_type}");
        assert!(script.text().contains("/generate_and_upload"));

        let style = server.get("/static/style.css").await;
        style.assert_status_ok();
        assert_eq!(style.headers().get("content-type").unwrap(), "text/css");
    }

    #[tokio::test]
    async fn test_missing_asset_is_not_found() {
        let server = TestServer::new(create_test_router()).unwrap();

        server.get("/static/missing.js").await.assert_status_not_found();
    }
}
