//! Conversion between HTTP messages and exchanges.

use bytes::Bytes;
use docgate_core::{ErrorBody, Exchange, GatewayError, RequestId};
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{HeaderName, Request, Response, StatusCode};
use http_body_util::Full;
use serde_json::Value;

/// Header carrying the request id, read from requests and set on responses.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Body type of gateway responses.
pub type ResponseBody = Full<Bytes>;

/// A gateway response.
pub type HttpResponse = Response<ResponseBody>;

/// Builds the exchange for a request whose body was read in full.
///
/// A valid `X-Request-Id` header is kept as the request id.
pub fn exchange_from_request(request: Request<Bytes>) -> Exchange {
    let (parts, body) = request.into_parts();
    let query = parts.uri.query().unwrap_or_default().to_string();

    let mut exchange = Exchange::new(parts.method, parts.uri.path(), query)
        .with_headers(parts.headers)
        .with_body(body);

    if let Some(request_id) = exchange
        .header(REQUEST_ID_HEADER.as_str())
        .and_then(RequestId::parse)
    {
        exchange = exchange.with_request_id(request_id);
    }
    exchange
}

/// Builds the HTTP response of a finished exchange.
pub fn response_from_exchange(exchange: &Exchange) -> HttpResponse {
    let status = exchange.status().unwrap_or(StatusCode::OK);
    let body = match exchange.response_content() {
        Some(content) if carries_body(status) => Bytes::from(serde_json::to_vec(content).unwrap_or_default()),
        _ => Bytes::new(),
    };

    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    *response.headers_mut() = exchange.response_headers().clone();
    set_request_id(&mut response, exchange.request_id());
    response
}

/// Builds the response for an error that escaped the pipeline.
pub fn error_response(error: &GatewayError, include_trace: bool, request_id: RequestId) -> HttpResponse {
    let mut response = json_response(error.status_code(), &error.to_body(include_trace).to_json());
    set_request_id(&mut response, request_id);
    response
}

/// Builds a response with the standard error body, for failures detected
/// before an exchange exists.
pub fn status_response(status: StatusCode, message: &str) -> HttpResponse {
    json_response(status, &ErrorBody::new(status, message).to_json())
}

fn json_response(status: StatusCode, content: &Value) -> HttpResponse {
    let body = serde_json::to_vec(content).unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn set_request_id(response: &mut HttpResponse, request_id: RequestId) {
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
}

fn carries_body(status: StatusCode) -> bool {
    !matches!(status, StatusCode::NO_CONTENT | StatusCode::NOT_MODIFIED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::ETAG;
    use http::Method;
    use serde_json::json;

    #[test]
    fn test_exchange_from_request() {
        let request = Request::builder()
            .method(Method::PUT)
            .uri("/db/coll/1?filter=%7B%7D&page=2")
            .header("If-Match", "abc")
            .header("X-Request-Id", "0190b6d4-3a8e-7c2e-9b1a-6f4e5d3c2b1a")
            .body(Bytes::from_static(br#"{"a":1}"#))
            .unwrap();

        let exchange = exchange_from_request(request);
        assert_eq!(exchange.method(), Method::PUT);
        assert_eq!(exchange.path(), "/db/coll/1");
        assert_eq!(exchange.query_string(), "filter=%7B%7D&page=2");
        assert_eq!(exchange.query().first("filter"), Some("{}"));
        assert_eq!(exchange.header("if-match"), Some("abc"));
        assert_eq!(
            exchange.request_id().to_string(),
            "0190b6d4-3a8e-7c2e-9b1a-6f4e5d3c2b1a"
        );
        assert_eq!(exchange.content().unwrap(), Some(&json!({"a": 1})));
    }

    #[test]
    fn test_invalid_request_id_is_replaced() {
        let request = Request::builder()
            .uri("/ping")
            .header("X-Request-Id", "not-a-uuid")
            .body(Bytes::new())
            .unwrap();

        let exchange = exchange_from_request(request);
        assert_ne!(exchange.request_id().to_string(), "not-a-uuid");
    }

    #[test]
    fn test_response_from_exchange() {
        let mut exchange = Exchange::new(Method::GET, "/db/coll/1", "");
        exchange.set_status(StatusCode::OK);
        exchange.set_response_header(ETAG, "e1");
        exchange.set_response_header(CONTENT_TYPE, "application/json");
        exchange.set_response_content(Some(json!({"_id": "1"})));

        let response = response_from_exchange(&exchange);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[ETAG], "e1");
        assert_eq!(
            response.headers()[REQUEST_ID_HEADER],
            exchange.request_id().to_string().as_str()
        );
    }

    #[tokio::test]
    async fn test_no_content_has_empty_body() {
        use http_body_util::BodyExt;

        let mut exchange = Exchange::new(Method::DELETE, "/db/coll/1", "");
        exchange.set_status(StatusCode::NO_CONTENT);
        exchange.set_response_content(Some(json!({"ignored": true})));

        let body = response_from_exchange(&exchange).into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    #[test]
    fn test_error_response() {
        let err = GatewayError::internal("store exploded");
        let response = error_response(&err, false, RequestId::new());
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }
}
