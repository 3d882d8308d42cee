//! HTTP adapter.
//!
//! Routes:
//!
//! | Route                  | Serves                                   |
//! |------------------------|------------------------------------------|
//! | `GET /style/*path?id=` | tiles, grids and inspect for a style     |
//! | `GET /source/*path?id=`| tiles, grids and inspect for a source    |
//! | `GET /static/*path?id=`| center and bounding-box static exports   |
//!
//! A backend that is still loading answers `302 Found` pointing back at the
//! identical path and query, so clients simply retry.

mod error;

pub use error::{error_response, status_for, ApiError, Encoding, Route};

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{OriginalUri, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::fetch::FetchOptions;
use crate::service::{HandleKind, ServiceError, TileService};

type Params = HashMap<String, String>;

/// Builds the router over a shared service.
pub fn router(service: Arc<TileService>) -> Router {
    Router::new()
        .route("/style/*path", get(style_data))
        .route("/source/*path", get(source_data))
        .route("/static/*path", get(static_map))
        .with_state(service)
}

/// Serves on `addr` until `shutdown` resolves.
pub async fn serve<F>(
    service: Arc<TileService>,
    addr: SocketAddr,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    serve_listener(service, listener, shutdown).await
}

/// Serves on an already bound listener until `shutdown` resolves.
pub async fn serve_listener<F>(
    service: Arc<TileService>,
    listener: TcpListener,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(addr = %listener.local_addr()?, "Tile server listening");
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("Tile server stopped");
    Ok(())
}

async fn style_data(
    State(service): State<Arc<TileService>>,
    Path(path): Path<String>,
    Query(params): Query<Params>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Response {
    data(&service, HandleKind::Style, &path, &params, &uri, &headers).await
}

async fn source_data(
    State(service): State<Arc<TileService>>,
    Path(path): Path<String>,
    Query(params): Query<Params>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Response {
    data(&service, HandleKind::Source, &path, &params, &uri, &headers).await
}

async fn data(
    service: &TileService,
    kind: HandleKind,
    path: &str,
    params: &Params,
    uri: &axum::http::Uri,
    headers: &HeaderMap,
) -> Response {
    let options = FetchOptions {
        debug: params.contains_key("debug"),
    };
    let id = params.get("id").map(String::as_str);

    match service.data(kind, id, path, options).await {
        Ok(reply) => {
            let mut response = ok(reply.body, &reply.headers);
            for (name, value) in &reply.cookies {
                set_cookie(&mut response, name, value);
            }
            allow_any_origin(&mut response);
            response
        }
        Err(err) => {
            let mut response = failure(&err, Route::Data, uri, headers);
            if let Some(errors) = err.errors_cookie() {
                set_cookie(&mut response, crate::fetch::ERRORS_COOKIE, errors);
            }
            allow_any_origin(&mut response);
            response
        }
    }
}

async fn static_map(
    State(service): State<Arc<TileService>>,
    Path(path): Path<String>,
    Query(params): Query<Params>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Response {
    let id = params.get("id").map(String::as_str);
    match service.static_map(id, &path).await {
        Ok(image) => ok(image.data.clone(), &image.headers()),
        Err(err) => failure(&err, Route::Static, &uri, &headers),
    }
}

fn failure(
    err: &ServiceError,
    route: Route,
    uri: &axum::http::Uri,
    headers: &HeaderMap,
) -> Response {
    if err.is_not_ready() {
        let location = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| uri.path());
        debug!(location, "Backend not ready, redirecting");
        return redirect(location);
    }

    let status = status_for(err, route);
    if status.is_server_error() {
        warn!(path = uri.path(), code = err.code(), error = %err, "Request failed");
    } else {
        debug!(path = uri.path(), code = err.code(), error = %err, "Request rejected");
    }
    error_response(err, route, headers)
}

fn ok(body: Bytes, headers: &[(String, String)]) -> Response {
    let mut response = Response::new(Body::from(body));
    let map = response.headers_mut();
    for (name, value) in headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!(header = %name, "Dropping invalid response header"),
        }
    }
    response
}

fn redirect(location: &str) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::FOUND;
    if let Ok(value) = HeaderValue::from_str(location) {
        response.headers_mut().insert(header::LOCATION, value);
    }
    response
}

fn set_cookie(response: &mut Response, name: &str, value: &str) {
    let cookie = format!("{}={}; Path=/", name, encode_cookie_value(value));
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
}

fn allow_any_origin(response: &mut Response) {
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
}

/// Percent-encodes everything outside the URI-component unreserved set.
fn encode_cookie_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'!' | b'~' | b'*'
            | b'\'' | b'(' | b')' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::backend::tests::MockBackend;
    use crate::backend::{BackendError, MemoryCatalog, SourceHandle, StyleHandle, Tile};
    use crate::service::ServiceConfig;

    fn app(style: MockBackend) -> Router {
        let catalog = MemoryCatalog::new();
        let source = Arc::new(SourceHandle::new(
            "tmsource://src",
            Arc::new(MockBackend::ok(b"vector")),
        ));
        catalog.insert_style(Arc::new(StyleHandle::new(
            "tmstyle://style",
            "Style",
            Arc::new(style),
            source,
        )));
        router(Arc::new(TileService::new(
            Arc::new(catalog),
            ServiceConfig::default().with_pixel_limit(20_000),
        )))
    }

    async fn get(app: Router, uri: &str, accept: Option<&str>) -> Response {
        let mut request = Request::builder().uri(uri);
        if let Some(accept) = accept {
            request = request.header(header::ACCEPT, accept);
        }
        app.oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body(response: Response) -> Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
    }

    fn cookies(response: &Response) -> Vec<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_tile_ok_with_cookies_and_cors() {
        let style = MockBackend::new(Ok(Tile::new(&b"png"[..]).with_draw_time(7.0)));
        let response = get(app(style), "/style/3/1/2.png?id=tmstyle://style", None).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["cache-control"], "max-age=3600");
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        let cookies = cookies(&response);
        assert!(cookies.contains(&"drawtime=3-7-7-7; Path=/".to_string()));
        assert!(cookies.contains(&"errors=; Path=/".to_string()));
        assert_eq!(body(response).await.as_ref(), b"png");
    }

    #[tokio::test]
    async fn test_not_ready_redirects_to_same_path_and_query() {
        let style = MockBackend::new(Err(BackendError::NotReady));
        let uri = "/style/3/1/2@2x.png?id=tmstyle://style";
        let response = get(app(style), uri, None).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], uri);
    }

    #[tokio::test]
    async fn test_render_error_is_plain_404_with_errors_cookie() {
        let style = MockBackend::new(Err(BackendError::Failed("Bad layer".into())));
        let response = get(
            app(style),
            "/style/3/1/2.png?id=tmstyle://style",
            Some("application/json"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(cookies(&response), vec!["errors=Bad%20layer; Path=/"]);
        assert_eq!(body(response).await.as_ref(), b"Bad layer");
    }

    #[tokio::test]
    async fn test_unknown_id_json() {
        let response = get(
            app(MockBackend::ok(b"")),
            "/style/0/0/0.png?id=tmstyle://missing",
            Some("application/json"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json: serde_json::Value = serde_json::from_slice(&body(response).await).unwrap();
        assert_eq!(json["code"], "ENOTFOUND");
    }

    #[tokio::test]
    async fn test_invalid_tile_is_bad_request() {
        let response = get(
            app(MockBackend::ok(b"")),
            "/style/1/5/0.png?id=tmstyle://style",
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_vector_through_source_route() {
        let response = get(
            app(MockBackend::ok(b"")),
            "/source/0/0/0.vector.pbf?id=tmsource://src",
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-encoding"], "deflate");
        assert_eq!(body(response).await.as_ref(), b"vector");
    }

    #[tokio::test]
    async fn test_static_limit_is_bad_request_html() {
        let response = get(
            app(MockBackend::ok(b"")),
            "/static/10,0,0/20000x20000@1x.png?id=tmstyle://style",
            Some("text/html"),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/html"));
    }

    fn png_tile() -> Tile {
        let img = image::RgbaImage::from_pixel(256, 256, image::Rgba([0, 90, 160, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        Tile::new(out.into_inner())
    }

    #[tokio::test]
    async fn test_static_map_is_served() {
        let response = get(
            app(MockBackend::new(Ok(png_tile()))),
            "/static/2,0,0/60x40@2x.png?id=tmstyle://style",
            None,
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "image/png");
        assert_eq!(
            response.headers()["content-disposition"],
            "attachment; filename=Style-z2_0_0_2.png"
        );
        let decoded = image::load_from_memory(&body(response).await).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (120, 80));
    }

    #[tokio::test]
    async fn test_static_not_ready_redirects_to_same_path_and_query() {
        let uri = "/static/2,0,0/50x50@2x.jpg?id=tmstyle://style";
        let response = get(app(MockBackend::new(Err(BackendError::NotReady))), uri, None).await;

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], uri);
    }

    #[test]
    fn test_encode_cookie_value() {
        assert_eq!(encode_cookie_value("5-10-20-30.6-1-1-1"), "5-10-20-30.6-1-1-1");
        assert_eq!(encode_cookie_value("a b|c;d"), "a%20b%7Cc%3Bd");
    }
}
