// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared HTTP plumbing for the `{code, message, data}` JSON endpoints.

use std::time::Duration;

use kobeai_core::{ApiEnvelope, KobeError};
use reqwest::{IntoUrl, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Base URL plus a pooled HTTP client.
///
/// The underlying client has no global timeout so the same pool can carry
/// long-lived streams; JSON calls get `request_timeout` per request.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, KobeError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| KobeError::Network {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self::with_client(client, base_url, request_timeout))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, request_timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout,
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an endpoint path such as `/auth/login`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Absolute URL for `path` with `pairs` appended as an encoded query.
    pub fn url_with_query(&self, path: &str, pairs: &[(&str, &str)]) -> Result<Url, KobeError> {
        let mut url = Url::parse(&self.url(path))
            .map_err(|e| KobeError::Config(format!("invalid server base_url: {e}")))?;
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(url)
    }

    /// Start a JSON request, attaching the bearer header when given.
    pub fn request(&self, method: Method, path: &str, bearer: Option<&str>) -> RequestBuilder {
        self.request_to(method, self.url(path), bearer)
    }

    /// Like [`request`](Self::request) for a prepared URL.
    pub fn request_to(&self, method: Method, url: impl IntoUrl, bearer: Option<&str>) -> RequestBuilder {
        let mut req = self
            .client
            .request(method, url)
            .timeout(self.request_timeout);
        if let Some(bearer) = bearer {
            req = req.header(reqwest::header::AUTHORIZATION, bearer);
        }
        req
    }

    /// Send and unwrap the envelope, allowing an empty `data`.
    pub async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<Option<T>, KobeError> {
        let response = req.send().await.map_err(transport_error)?;
        let status = response.status();
        debug!(status = %status, url = %response.url().path(), "api response");

        if status == StatusCode::UNAUTHORIZED {
            return Err(KobeError::AuthExpired {
                message: "server rejected the credential".into(),
            });
        }

        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            return Err(match serde_json::from_str::<ApiEnvelope<serde_json::Value>>(&body) {
                Ok(envelope) => KobeError::Api {
                    code: envelope.code,
                    message: envelope.message.unwrap_or_else(|| status.to_string()),
                },
                Err(_) => KobeError::Api {
                    code: i64::from(status.as_u16()),
                    message: format!("HTTP {status}: {body}"),
                },
            });
        }

        let envelope: ApiEnvelope<T> =
            serde_json::from_str(&body).map_err(|e| KobeError::Internal(format!(
                "failed to parse response envelope: {e}"
            )))?;
        envelope.into_result()
    }

    /// Send and require a `data` payload.
    pub async fn send_data<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, KobeError> {
        self.send(req).await?.ok_or_else(|| {
            KobeError::Internal("response envelope carried no data".into())
        })
    }
}

/// Map a reqwest failure that produced no HTTP response.
pub fn transport_error(e: reqwest::Error) -> KobeError {
    if e.is_timeout() {
        return KobeError::Network {
            message: "request timed out".into(),
            source: Some(Box::new(e)),
        };
    }
    KobeError::Network {
        message: format!("HTTP request failed: {e}"),
        source: Some(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(uri: &str) -> ApiClient {
        ApiClient::new(&format!("{uri}/api/"), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn url_joins_without_double_slash() {
        let api = ApiClient::new("http://localhost:8080/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(api.url("/auth/login"), "http://localhost:8080/api/auth/login");
    }

    #[tokio::test]
    async fn send_unwraps_success_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/thing"))
            .and(header("authorization", "Bearer t0ken"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"code": 200, "message": "ok", "data": 41})),
            )
            .mount(&server)
            .await;

        let api = client(&server.uri());
        let req = api.request(Method::GET, "/thing", Some("Bearer t0ken"));
        let value: i64 = api.send_data(req).await.unwrap();
        assert_eq!(value, 41);
    }

    #[tokio::test]
    async fn non_200_code_in_200_response_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"code": 4001, "message": "nope", "data": null})),
            )
            .mount(&server)
            .await;

        let api = client(&server.uri());
        let err = api
            .send::<i64>(api.request(Method::GET, "/thing", None))
            .await
            .unwrap_err();
        assert!(matches!(err, KobeError::Api { code: 4001, .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn http_401_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let api = client(&server.uri());
        let err = api
            .send::<i64>(api.request(Method::GET, "/thing", None))
            .await
            .unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn http_500_without_envelope_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let api = client(&server.uri());
        let err = api
            .send::<i64>(api.request(Method::GET, "/thing", None))
            .await
            .unwrap_err();
        assert!(matches!(err, KobeError::Api { code: 500, .. }), "got {err:?}");
    }
}
