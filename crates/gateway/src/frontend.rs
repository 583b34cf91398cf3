//! The Sidekick chat page.
//!
//! `frontend/` is compiled into the binary. The page is served at `/` and
//! its stylesheet and script under `/static/{file}`, looked up in a single
//! asset table.

use axum::{
    Router,
    extract::Path,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};

/// One embedded file.
struct Asset {
    name: &'static str,
    content_type: &'static str,
    body: &'static str,
}

const PAGE: Asset = Asset {
    name: "index.html",
    content_type: "text/html; charset=utf-8",
    body: include_str!("../../../frontend/index.html"),
};

/// Files reachable under `/static/`.
const STATIC_ASSETS: &[Asset] = &[
    Asset {
        name: "style.css",
        content_type: "text/css; charset=utf-8",
        body: include_str!("../../../frontend/style.css"),
    },
    Asset {
        name: "app.js",
        content_type: "application/javascript; charset=utf-8",
        body: include_str!("../../../frontend/app.js"),
    },
];

pub fn frontend_router() -> Router {
    Router::new()
        .route("/", get(page_handler))
        .route("/static/{file}", get(static_handler))
}

async fn page_handler() -> Response {
    serve(&PAGE)
}

async fn static_handler(Path(file): Path<String>) -> Response {
    match STATIC_ASSETS.iter().find(|asset| asset.name == file) {
        Some(asset) => serve(asset),
        None => (StatusCode::NOT_FOUND, format!("No such asset: {file}")).into_response(),
    }
}

fn serve(asset: &Asset) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, asset.content_type),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        asset.body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    async fn get_text(uri: &str) -> (StatusCode, String, String) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = frontend_router().oneshot(req).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, content_type, String::from_utf8_lossy(&body).into_owned())
    }

    #[tokio::test]
    async fn every_asset_is_served_with_its_type() {
        for asset in STATIC_ASSETS {
            let (status, content_type, body) = get_text(&format!("/static/{}", asset.name)).await;
            assert_eq!(status, StatusCode::OK, "{}", asset.name);
            assert_eq!(content_type, asset.content_type);
            assert_eq!(body, asset.body);
        }
    }

    #[tokio::test]
    async fn unknown_asset_is_404() {
        let (status, _, _) = get_text("/static/secrets.toml").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn page_has_request_and_criteria_boxes() {
        let (status, content_type, page) = get_text("/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.starts_with("text/html"));
        assert!(page.contains("Sidekick"));
        for id in ["message", "success-criteria", "go", "reset", "chat"] {
            assert!(page.contains(&format!("id=\"{id}\"")), "missing #{id}");
        }
        assert!(page.contains("/static/app.js"));
        assert!(page.contains("/static/style.css"));
    }

    #[tokio::test]
    async fn script_wires_buttons_to_the_api() {
        let (_, _, script) = get_text("/static/app.js").await;
        for id in ["message", "success-criteria", "go", "reset"] {
            assert!(
                script.contains(&format!("getElementById(\"{id}\")")),
                "script never looks up #{id}"
            );
        }
        assert!(script.contains("/v1/sessions"));
        assert!(script.contains("/run/stream"));
        assert!(script.contains("/reset"));
    }
}
