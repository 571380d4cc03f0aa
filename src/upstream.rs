//! HTTP client for the OpenAI-compatible upstream API

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use reqwest::{header, Method};
use serde_json::Value;

use crate::{config::CredentialSource, context, errors::AppError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait UpstreamApi: Send + Sync {
    /// Issues `method path` against the upstream and returns the parsed JSON body.
    async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, AppError>;
}

#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: Arc<str>,
    api_key: Arc<str>,
    credential_source: CredentialSource,
}

impl OpenAiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        credential_source: CredentialSource,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: Arc::from(base_url.trim_end_matches('/')),
            api_key: Arc::from(api_key.into()),
            credential_source,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer_token(&self) -> Result<String, AppError> {
        match self.credential_source {
            CredentialSource::Env => Ok(self.api_key.to_string()),
            CredentialSource::Request => context::current()
                .map(|context| context.external_api_key().to_string())
                .ok_or_else(|| {
                    AppError::internal("upstream request issued outside of a request context")
                }),
        }
    }
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("credential_source", &self.credential_source)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl UpstreamApi for OpenAiClient {
    async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, AppError> {
        let url = self.url(path);
        let mut request = self
            .http
            .request(method.into(), url.as_str())
            .bearer_auth(self.bearer_token()?)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(body) = body.as_ref() {
            request = request.json(body);
        }

        tracing::debug!(method = %method, path, "sending upstream request");

        let response = request
            .send()
            .await
            .map_err(|err| {
                AppError::upstream(err.status().map(|status| status.as_u16()), err.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::upstream(
                Some(status.as_u16()),
                format!("{method} {path} returned {status}: {text}"),
            ));
        }

        response.json::<Value>().await.map_err(|err| {
            AppError::upstream(
                Some(status.as_u16()),
                format!("{method} {path} returned an invalid JSON body: {err}"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Bytes,
        http::{HeaderMap, StatusCode},
        routing::{any, get},
        Json, Router,
    };
    use serde_json::json;

    use super::*;
    use crate::context::RequestContext;

    async fn echo(method: axum::http::Method, headers: HeaderMap, body: Bytes) -> Json<Value> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let body = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).expect("json request body")
        };

        Json(json!({
            "method": method.as_str(),
            "authorization": header("authorization"),
            "content_type": header("content-type"),
            "body": body,
        }))
    }

    async fn spawn_upstream() -> String {
        let app = Router::new()
            .route("/v1/echo", any(echo))
            .route(
                "/v1/broken",
                get(|| async { (StatusCode::BAD_GATEWAY, "upstream exploded") }),
            )
            .route("/v1/plain", get(|| async { "not json" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test upstream");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve test upstream");
        });
        format!("http://{addr}/v1")
    }

    #[test]
    fn url_joins_base_and_path() {
        let client = OpenAiClient::new("https://api.example.com/v1/", "k", CredentialSource::Env);
        assert_eq!(client.url("/models"), "https://api.example.com/v1/models");
    }

    #[test]
    fn debug_output_omits_api_key() {
        let client = OpenAiClient::new(
            "https://api.example.com/v1",
            "sk-secret",
            CredentialSource::Env,
        );
        assert!(!format!("{client:?}").contains("sk-secret"));
    }

    #[tokio::test]
    async fn post_sends_bearer_and_json_body() {
        let base_url = spawn_upstream().await;
        let client = OpenAiClient::new(base_url, "sk-static", CredentialSource::Env);

        let echoed = client
            .request(HttpMethod::Post, "/echo", Some(json!({"model": "m"})))
            .await
            .expect("upstream call succeeds");

        assert_eq!(echoed["method"], "POST");
        assert_eq!(echoed["authorization"], "Bearer sk-static");
        assert_eq!(echoed["content_type"], "application/json");
        assert_eq!(echoed["body"], json!({"model": "m"}));
    }

    #[tokio::test]
    async fn get_without_body_still_sends_json_content_type() {
        let base_url = spawn_upstream().await;
        let client = OpenAiClient::new(base_url, "sk-static", CredentialSource::Env);

        let echoed = client
            .request(HttpMethod::Get, "/echo", None)
            .await
            .expect("upstream call succeeds");

        assert_eq!(echoed["method"], "GET");
        assert_eq!(echoed["content_type"], "application/json");
        assert!(echoed["body"].is_null());
    }

    #[tokio::test]
    async fn request_credential_source_uses_context_key() {
        let base_url = spawn_upstream().await;
        let client = OpenAiClient::new(base_url, "sk-static", CredentialSource::Request);

        let echoed = context::run(RequestContext::new("sk-caller"), async {
            client.request(HttpMethod::Get, "/echo", None).await
        })
        .await
        .expect("upstream call succeeds");

        assert_eq!(echoed["authorization"], "Bearer sk-caller");
    }

    #[tokio::test]
    async fn request_credential_source_without_context_fails() {
        let client =
            OpenAiClient::new("http://127.0.0.1:9", "sk-static", CredentialSource::Request);

        let error = client
            .request(HttpMethod::Get, "/models", None)
            .await
            .expect_err("no context must fail");
        assert!(matches!(error, AppError::Internal { .. }));
    }

    #[tokio::test]
    async fn non_success_status_surfaces_upstream_error() {
        let base_url = spawn_upstream().await;
        let client = OpenAiClient::new(base_url, "sk-static", CredentialSource::Env);

        let error = client
            .request(HttpMethod::Get, "/broken", None)
            .await
            .expect_err("502 must fail");

        match error {
            AppError::Upstream { status, message } => {
                assert_eq!(status, Some(502));
                assert!(message.contains("upstream exploded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_body_surfaces_upstream_error() {
        let base_url = spawn_upstream().await;
        let client = OpenAiClient::new(base_url, "sk-static", CredentialSource::Env);

        let error = client
            .request(HttpMethod::Get, "/plain", None)
            .await
            .expect_err("plain text must fail");
        assert!(matches!(error, AppError::Upstream { status: Some(200), .. }));
    }
}
