//! Typed client of the platform's REST API.
//!
//! Every request carries the session's bearer token. A 401 clears the stored
//! credentials so the next view sends the user to the login screen. Response
//! bodies are decoded into the contracts in `models`; anything that does not
//! fit is a `Contract` error rather than a half-filled value.

pub mod auth;
pub mod deliveries;
pub mod feedback;
pub mod vehicles;
pub mod wallet;

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::observability::metrics::Metrics;
use crate::session::SessionStore;

pub struct ApiClient {
    base_url: Url,
    http: reqwest::Client,
    session: Arc<SessionStore>,
    metrics: Metrics,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        session: Arc<SessionStore>,
        metrics: Metrics,
    ) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url)
            .map_err(|err| AppError::Internal(format!("invalid API_BASE_URL {base_url}: {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Internal(format!(
                "API_BASE_URL {base_url} cannot carry a path"
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Internal(format!("failed to build http client: {err}")))?;

        Ok(Self {
            base_url,
            http,
            session,
            metrics,
        })
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    fn url(&self, segments: &[&str]) -> Result<Url, AppError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Internal(format!("{} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn auth_headers(&self) -> Result<HeaderMap, AppError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = self.session.token() {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|err| AppError::Internal(format!("invalid auth header: {err}")))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, AppError> {
        let url = self.url(segments)?;
        Ok(self.http.request(method, url).headers(self.auth_headers()?))
    }

    /// GET decoded from `{"data": ..}`, `{"<key>": ..}` or a bare body.
    pub(crate) async fn get<T>(
        &self,
        resource: &'static str,
        segments: &[&str],
        key: Option<&str>,
    ) -> Result<T, AppError>
    where
        T: DeserializeOwned,
    {
        let builder = self.request(Method::GET, segments)?;
        let body = self.execute(resource, builder).await?;
        decode(&body, key)
    }

    pub(crate) async fn send<B, T>(
        &self,
        resource: &'static str,
        method: Method,
        segments: &[&str],
        payload: &B,
        key: Option<&str>,
    ) -> Result<T, AppError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let builder = self.request(method, segments)?.json(payload);
        let body = self.execute(resource, builder).await?;
        decode(&body, key)
    }

    pub(crate) async fn send_empty<B>(
        &self,
        resource: &'static str,
        method: Method,
        segments: &[&str],
        payload: Option<&B>,
    ) -> Result<(), AppError>
    where
        B: Serialize + ?Sized,
    {
        let mut builder = self.request(method, segments)?;
        if let Some(payload) = payload {
            builder = builder.json(payload);
        }
        self.execute(resource, builder).await.map(|_| ())
    }

    async fn execute(
        &self,
        resource: &'static str,
        builder: RequestBuilder,
    ) -> Result<Vec<u8>, AppError> {
        let result = self.execute_inner(builder).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(err) => err.kind(),
        };
        self.metrics
            .upstream_requests_total
            .with_label_values(&[resource, outcome])
            .inc();
        result
    }

    async fn execute_inner(&self, builder: RequestBuilder) -> Result<Vec<u8>, AppError> {
        let response = builder.send().await.map_err(|err| {
            warn!(error = %err, "platform request failed");
            AppError::Network(err.to_string())
        })?;

        let status = response.status();
        let url = response.url().clone();
        let body = response
            .bytes()
            .await
            .map_err(|err| AppError::Network(format!("failed to read response body: {err}")))?
            .to_vec();

        debug!(%url, status = status.as_u16(), bytes = body.len(), "platform response");

        if status.is_success() {
            return Ok(body);
        }

        let message = error_message(status, &body);

        if status == StatusCode::UNAUTHORIZED {
            warn!(%url, "platform rejected credentials; clearing session");
            self.session.clear_credentials()?;
            return Err(AppError::Unauthorized(message));
        }

        Err(classify(status, &body, message))
    }
}

fn classify(status: StatusCode, body: &[u8], message: String) -> AppError {
    match status {
        StatusCode::FORBIDDEN => AppError::Forbidden(message),
        StatusCode::NOT_FOUND => AppError::NotFound(message),
        StatusCode::CONFLICT => AppError::Conflict(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            let field = serde_json::from_slice::<Value>(body)
                .ok()
                .and_then(|value| value.get("field").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| "request".to_string());
            AppError::Validation { field, message }
        }
        _ => AppError::Upstream {
            status: status.as_u16(),
            message,
        },
    }
}

/// Best-effort human message from an error body: `message`, then `error`,
/// then the status text.
fn error_message(status: StatusCode, body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "error"]
                .into_iter()
                .find_map(|key| value.get(key).and_then(Value::as_str).map(str::to_string))
        })
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        })
}

fn decode<T>(body: &[u8], key: Option<&str>) -> Result<T, AppError>
where
    T: DeserializeOwned,
{
    let value: Value = serde_json::from_slice(body)
        .map_err(|err| AppError::Contract(format!("response is not json: {err}")))?;

    let inner = match value {
        Value::Object(mut object) => {
            let unwrapped = object
                .remove("data")
                .or_else(|| key.and_then(|key| object.remove(key)));
            unwrapped.unwrap_or(Value::Object(object))
        }
        other => other,
    };

    serde_json::from_value(inner).map_err(|err| AppError::Contract(err.to_string()))
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use serde_json::json;

    use super::{classify, decode, error_message};
    use crate::error::AppError;
    use crate::models::vehicle::Vehicle;

    fn vehicle() -> serde_json::Value {
        json!({
            "_id": "v-1",
            "name": "Van",
            "type": "Van",
            "plateNumber": "KA-05-1",
            "status": "Available"
        })
    }

    #[test]
    fn decodes_wrapped_keyed_and_bare_lists() {
        for body in [
            json!({ "data": [vehicle()] }),
            json!({ "success": true, "vehicles": [vehicle()] }),
            json!([vehicle()]),
        ] {
            let bytes = serde_json::to_vec(&body).unwrap();
            let vehicles: Vec<Vehicle> = decode(&bytes, Some("vehicles")).unwrap();
            assert_eq!(vehicles.len(), 1);
            assert_eq!(vehicles[0].plate_number, "KA-05-1");
        }
    }

    #[test]
    fn malformed_body_is_a_contract_error() {
        let bytes = serde_json::to_vec(&json!({ "data": [{ "name": "no id" }] })).unwrap();
        let err = decode::<Vec<Vehicle>>(&bytes, Some("vehicles")).unwrap_err();
        assert!(matches!(err, AppError::Contract(_)));

        let err = decode::<Vec<Vehicle>>(b"<html>", None).unwrap_err();
        assert!(matches!(err, AppError::Contract(_)));
    }

    #[test]
    fn error_message_prefers_body_then_status_text() {
        let body = serde_json::to_vec(&json!({ "message": "Delivery not found" })).unwrap();
        assert_eq!(
            error_message(StatusCode::NOT_FOUND, &body),
            "Delivery not found"
        );

        let body = serde_json::to_vec(&json!({ "error": "bad token" })).unwrap();
        assert_eq!(error_message(StatusCode::FORBIDDEN, &body), "bad token");

        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, b""),
            "Bad Gateway"
        );
    }

    #[test]
    fn classifies_statuses_into_kinds() {
        let body = serde_json::to_vec(&json!({ "message": "weight too high", "field": "weight" }))
            .unwrap();
        match classify(StatusCode::UNPROCESSABLE_ENTITY, &body, "weight too high".into()) {
            AppError::Validation { field, .. } => assert_eq!(field, "weight"),
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(
            classify(StatusCode::CONFLICT, b"", "x".into()).kind(),
            "conflict"
        );
        assert_eq!(
            classify(StatusCode::INTERNAL_SERVER_ERROR, b"", "x".into()).kind(),
            "upstream"
        );
    }
}
