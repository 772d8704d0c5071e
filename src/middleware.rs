use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

/// Handlers return rendered pages as plain `String`s, which axum labels
/// `text/plain`. Relabel those as HTML; JSON and redirects pass untouched.
pub async fn html_headers<B>(
    request: Request<B>,
    next: Next<B>,
) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    let is_plain_text = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("text/plain"))
        .unwrap_or(false);
    if is_plain_text {
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
    }

    response
}
