//! Request extractors.

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::{HeaderMap, header::CONTENT_TYPE},
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::Error;

pub const INVALID_CONTENT_TYPE: &str = "Invalid Content-Type. Use application/json.";
pub const INVALID_BODY: &str = "Invalid request: No JSON body provided or invalid JSON format.";

/// A JSON object body.
///
/// Unlike [`axum::Json`], rejections use the service's error envelope: a wrong content type, an
/// empty or malformed body, or a body that is not a JSON object are all `400`s.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

fn invalid_body() -> Error {
    Error::BadRequest {
        message: INVALID_BODY.to_string(),
    }
}

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if !is_json(req.headers()) {
            return Err(Error::BadRequest {
                message: INVALID_CONTENT_TYPE.to_string(),
            });
        }

        let bytes = Bytes::from_request(req, state).await.map_err(|_| invalid_body())?;
        let value: Value = serde_json::from_slice(&bytes).map_err(|_| invalid_body())?;
        if !value.is_object() {
            return Err(invalid_body());
        }

        serde_json::from_value(value).map(JsonBody).map_err(|_| invalid_body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, routing::post};
    use axum_test::TestServer;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Echo {
        word: Option<String>,
    }

    fn server() -> TestServer {
        let app = Router::new().route(
            "/echo",
            post(|JsonBody(echo): JsonBody<Echo>| async move { echo.word.unwrap_or_default() }),
        );
        TestServer::new(app).unwrap()
    }

    #[tokio::test]
    async fn test_accepts_json_with_charset() {
        let response = server()
            .post("/echo")
            .bytes(Bytes::from_static(br#"{"word":"hello"}"#))
            .content_type("application/json; charset=utf-8")
            .await;

        response.assert_status_ok();
        assert_eq!(response.text(), "hello");
    }

    #[tokio::test]
    async fn test_rejects_other_content_types() {
        let response = server()
            .post("/echo")
            .bytes(Bytes::from_static(br#"{"word":"x"}"#))
            .content_type("text/plain")
            .await;

        response.assert_status_bad_request();
        let body: Value = response.json();
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], INVALID_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_rejects_missing_content_type() {
        let response = server().post("/echo").bytes(Bytes::from_static(b"{}")).await;

        response.assert_status_bad_request();
        assert_eq!(response.json::<Value>()["message"], INVALID_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_rejects_malformed_empty_and_non_object_bodies() {
        for body in ["{not json", "", "[1, 2]", "\"just a string\"", r#"{"word": 5}"#] {
            let response = server()
                .post("/echo")
                .bytes(Bytes::from(body))
                .content_type("application/json")
                .await;

            response.assert_status_bad_request();
            assert_eq!(response.json::<Value>()["message"], INVALID_BODY, "body: {body:?}");
        }
    }
}
