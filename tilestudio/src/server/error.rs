//! Error responses.
//!
//! Tile, grid and inspect routes report render failures as a plain-text
//! `404`, which map clients treat as a missing tile. Every other failure is
//! rendered in the encoding the client asked for via `Accept`.

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::compose::ComposeError;
use crate::fetch::FetchError;
use crate::service::ServiceError;

/// Client-facing error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub message: String,
    pub code: &'static str,
}

impl From<&ServiceError> for ApiError {
    fn from(err: &ServiceError) -> Self {
        Self {
            message: err.to_string(),
            code: err.code(),
        }
    }
}

/// Response encoding chosen from the `Accept` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Json,
    Html,
    Text,
}

impl Encoding {
    pub fn negotiate(headers: &HeaderMap) -> Self {
        let accept = headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if accept.contains("application/json") {
            Encoding::Json
        } else if accept.contains("text/html") {
            Encoding::Html
        } else {
            Encoding::Text
        }
    }
}

/// Which family of route failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Tile, grid or inspect under a style or source.
    Data,
    /// Static export.
    Static,
}

/// Status code for a non-redirect failure.
pub fn status_for(err: &ServiceError, route: Route) -> StatusCode {
    match err {
        ServiceError::Request(_) | ServiceError::MissingId => StatusCode::BAD_REQUEST,
        ServiceError::Compose(
            ComposeError::LimitExceeded { .. }
            | ComposeError::EmptyExtent
            | ComposeError::UnsupportedFormat(_)
            | ComposeError::Request(_),
        ) => StatusCode::BAD_REQUEST,
        ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
        ServiceError::Fetch(FetchError::Render { .. }) if route == Route::Data => {
            StatusCode::NOT_FOUND
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Builds the error response for `err`.
pub fn error_response(err: &ServiceError, route: Route, headers: &HeaderMap) -> Response {
    let status = status_for(err, route);
    let body = ApiError::from(err);

    if route == Route::Data && matches!(err, ServiceError::Fetch(FetchError::Render { .. })) {
        return text(status, &body.message);
    }

    match Encoding::negotiate(headers) {
        Encoding::Json => (status, axum::Json(body)).into_response(),
        Encoding::Html => html(status, &body.message),
        Encoding::Text => text(status, &body.message),
    }
}

fn text(status: StatusCode, message: &str) -> Response {
    let mut response = Response::new(Body::from(message.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn html(status: StatusCode, message: &str) -> Response {
    let page = format!(
        "<!DOCTYPE html>\n<html><head><title>Error</title></head>\
         <body><h1>Error</h1><p>{}</p></body></html>\n",
        escape_html(message)
    );
    let mut response = Response::new(Body::from(page));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestError;
    use crate::service::HandleKind;

    fn accept(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_negotiate() {
        assert_eq!(
            Encoding::negotiate(&accept("application/json, text/plain")),
            Encoding::Json
        );
        assert_eq!(
            Encoding::negotiate(&accept("text/html,application/xhtml+xml")),
            Encoding::Html
        );
        assert_eq!(Encoding::negotiate(&HeaderMap::new()), Encoding::Text);
    }

    #[test]
    fn test_status_mapping() {
        let invalid = ServiceError::Request(RequestError::UnrecognizedPath("x".into()));
        assert_eq!(status_for(&invalid, Route::Data), StatusCode::BAD_REQUEST);

        let limit = ServiceError::Compose(ComposeError::LimitExceeded {
            width: 1,
            height: 1,
            scale: 1,
            limit: 0,
        });
        assert_eq!(status_for(&limit, Route::Static), StatusCode::BAD_REQUEST);

        let missing = ServiceError::NotFound {
            kind: HandleKind::Style,
            id: "s".into(),
        };
        assert_eq!(status_for(&missing, Route::Static), StatusCode::NOT_FOUND);

        let render = ServiceError::Fetch(FetchError::Render {
            message: "boom".into(),
            errors: None,
        });
        assert_eq!(status_for(&render, Route::Data), StatusCode::NOT_FOUND);

        let compose = ServiceError::Compose(ComposeError::Render("boom".into()));
        assert_eq!(
            status_for(&compose, Route::Static),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_api_error_body() {
        let err = ServiceError::MissingId;
        let body = serde_json::to_value(ApiError::from(&err)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "message": "Missing id parameter", "code": "EINVALID" })
        );
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>&</b>"), "&lt;b&gt;&amp;&lt;/b&gt;");
    }
}
