//! Request gateway — single call/response exchanges against the HTTP API.
//!
//! Both GET and POST funnel through one [`ApiGateway::request`] routine so
//! auth/header injection and error classification are defined exactly once:
//! the `token` param and the fixed identity `user-agent` are always merged
//! in (caller extras win on key clash), a non-success status is
//! [`GatewayError::Transport`], and a success body without `"ok": true` is
//! [`GatewayError::Api`]. No retries and no caching; memoization is the
//! resolver's job, not the gateway's.

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use tracing::{debug, error};

use crate::errors::GatewayError;

/// Fixed API base endpoint.
const DEFAULT_BASE_URL: &str = "https://slack.com/api";

/// Fixed identity header sent with every exchange.
const IDENTITY: &str = "relay-client/0.1";

/// Issues authenticated request/response exchanges against the remote API.
pub struct ApiGateway {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiGateway {
    /// Gateway against the default base endpoint.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    /// Gateway against an explicit base endpoint (tests, alternate hosts).
    #[must_use]
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    /// GET `{base}/{path}`, returning the decoded body.
    pub async fn get(
        &self,
        path: &str,
        extra_params: &[(&str, &str)],
        extra_headers: HeaderMap,
    ) -> Result<Value, GatewayError> {
        self.request(Method::GET, path, extra_params, extra_headers)
            .await
    }

    /// POST `{base}/{path}` with a form body, returning the decoded body.
    pub async fn post(
        &self,
        path: &str,
        extra_params: &[(&str, &str)],
        extra_headers: HeaderMap,
    ) -> Result<Value, GatewayError> {
        self.request(Method::POST, path, extra_params, extra_headers)
            .await
    }

    /// GET with a projection applied to the decoded body before returning.
    pub async fn get_with<T>(
        &self,
        path: &str,
        extra_params: &[(&str, &str)],
        extra_headers: HeaderMap,
        project: impl FnOnce(Value) -> T,
    ) -> Result<T, GatewayError> {
        self.get(path, extra_params, extra_headers).await.map(project)
    }

    /// POST with a projection applied to the decoded body before returning.
    pub async fn post_with<T>(
        &self,
        path: &str,
        extra_params: &[(&str, &str)],
        extra_headers: HeaderMap,
        project: impl FnOnce(Value) -> T,
    ) -> Result<T, GatewayError> {
        self.post(path, extra_params, extra_headers)
            .await
            .map(project)
    }

    /// The one normalization routine behind `get`/`post`.
    async fn request(
        &self,
        method: Method,
        path: &str,
        extra_params: &[(&str, &str)],
        extra_headers: HeaderMap,
    ) -> Result<Value, GatewayError> {
        let params = self.build_params(extra_params);
        let headers = Self::build_headers(extra_headers);
        let url = format!("{}/{}", self.base_url, path);

        let builder = if method == Method::POST {
            self.http.post(&url).form(&params)
        } else {
            self.http.get(&url).query(&params)
        };
        let response = builder.headers(headers).send().await?;

        let status = response.status();
        if !status.is_success() {
            error!(path, status = status.as_u16(), "request was not successful");
            return Err(GatewayError::Transport {
                status: status.as_u16(),
                path: path.to_owned(),
            });
        }

        let body: Value = response.json().await?;
        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            error!(path, "request reported a logical failure");
            return Err(GatewayError::Api {
                path: path.to_owned(),
            });
        }

        debug!(path, "request ok");
        Ok(body)
    }

    /// Mandatory `token` first, caller extras after (extras win on clash).
    fn build_params(&self, extra_params: &[(&str, &str)]) -> Vec<(String, String)> {
        let mut params = Vec::with_capacity(extra_params.len() + 1);
        params.push(("token".to_owned(), self.token.clone()));
        params.extend(
            extra_params
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned())),
        );
        params
    }

    /// Fixed identity header first, caller extras after (extras win on clash).
    fn build_headers(extra_headers: HeaderMap) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let _ = headers.insert(USER_AGENT, HeaderValue::from_static(IDENTITY));
        headers.extend(extra_headers);
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(server: &MockServer) -> ApiGateway {
        ApiGateway::with_base_url("xoxb-test", server.uri())
    }

    #[tokio::test]
    async fn get_merges_token_and_identity_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels.list"))
            .and(query_param("token", "xoxb-test"))
            .and(header("user-agent", IDENTITY))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let body = gateway(&server)
            .get("channels.list", &[], HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn get_passes_extra_params_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels.info"))
            .and(query_param("token", "xoxb-test"))
            .and(query_param("channel", "C1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let result = gateway(&server)
            .get("channels.info", &[("channel", "C1")], HeaderMap::new())
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn post_sends_form_body_with_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rtm.start"))
            .and(body_string_contains("token=xoxb-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let result = gateway(&server).post("rtm.start", &[], HeaderMap::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn non_success_status_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels.list"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let error = gateway(&server)
            .get("channels.list", &[], HeaderMap::new())
            .await
            .unwrap_err();
        assert_matches!(
            error,
            GatewayError::Transport { status: 404, path } if path == "channels.list"
        );
    }

    #[tokio::test]
    async fn ok_false_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users.list"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ok": false, "error": "invalid_auth"})),
            )
            .mount(&server)
            .await;

        let error = gateway(&server)
            .get("users.list", &[], HeaderMap::new())
            .await
            .unwrap_err();
        assert_matches!(error, GatewayError::Api { path } if path == "users.list");
    }

    #[tokio::test]
    async fn missing_ok_flag_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users.list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"warning": "?"})))
            .mount(&server)
            .await;

        let error = gateway(&server)
            .get("users.list", &[], HeaderMap::new())
            .await
            .unwrap_err();
        assert_matches!(error, GatewayError::Api { .. });
    }

    #[tokio::test]
    async fn projection_is_applied_to_the_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels.list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "channels": [{"id": "C1", "name": "general"}],
            })))
            .mount(&server)
            .await;

        let channels = gateway(&server)
            .get_with("channels.list", &[], HeaderMap::new(), |mut body| {
                body["channels"].take()
            })
            .await
            .unwrap();
        assert_eq!(channels[0]["name"], "general");
    }

    #[tokio::test]
    async fn projection_not_applied_on_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rtm.start"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = gateway(&server)
            .post_with("rtm.start", &[], HeaderMap::new(), |_| unreachable!())
            .await;
        assert_matches!(result, Err(GatewayError::Transport { status: 500, .. }));
    }

    #[tokio::test]
    async fn extra_headers_override_identity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels.list"))
            .and(header("user-agent", "custom/1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let mut extra = HeaderMap::new();
        let _ = extra.insert(USER_AGENT, HeaderValue::from_static("custom/1"));
        let result = gateway(&server).get("channels.list", &[], extra).await;
        assert!(result.is_ok());
    }
}
