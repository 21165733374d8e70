//! Minimal JSON-over-HTTP client for REST-speaking stores.

use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde_json::Value;

use crate::error::{RefreshError, Result};

/// Request authentication.
#[derive(Clone, Default)]
pub enum HttpAuth {
    #[default]
    None,
    Basic {
        username: String,
        password: Option<String>,
    },
    /// Elasticsearch `Authorization: ApiKey <key>`.
    ApiKey(String),
}

impl HttpAuth {
    /// Basic auth when a username is set, nothing otherwise.
    pub fn basic(username: Option<&String>, password: Option<&String>) -> Self {
        match username {
            Some(user) => HttpAuth::Basic {
                username: user.clone(),
                password: password.cloned(),
            },
            None => HttpAuth::None,
        }
    }
}

/// Response status and decoded JSON body (`Null` when empty).
#[derive(Debug)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: Value,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Best-effort error text from the body.
    pub fn error_text(&self) -> String {
        let reason = self
            .body
            .pointer("/error/reason")
            .or_else(|| self.body.pointer("/status/message"))
            .or_else(|| self.body.get("message"))
            .or_else(|| self.body.get("error"));
        match reason {
            Some(Value::String(s)) => format!("{}: {}", self.status, s),
            Some(other) => format!("{}: {}", self.status, other),
            None => self.status.to_string(),
        }
    }
}

/// Shared reqwest client bound to one base URL.
#[derive(Clone)]
pub struct JsonHttp {
    store: &'static str,
    client: reqwest::Client,
    base_url: String,
    base: Url,
    auth: HttpAuth,
}

impl JsonHttp {
    pub fn new(store: &'static str, base_url: &str, auth: HttpAuth) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let base = Url::parse(&base_url).map_err(|e| {
            RefreshError::Config(format!("Invalid {} url '{}': {}", store, base_url, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(RefreshError::Config(format!(
                "Invalid {} url '{}': not a base url",
                store, base_url
            )));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RefreshError::connection(store, e))?;
        Ok(Self {
            store,
            client,
            base_url,
            base,
            auth,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Base URL extended by `segments`, each percent-encoded as one path segment.
    pub fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if segments.is_empty() {
            return url;
        }
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.auth {
            HttpAuth::None => builder,
            HttpAuth::Basic { username, password } => builder.basic_auth(username, password.as_ref()),
            HttpAuth::ApiKey(key) => builder.header("Authorization", format!("ApiKey {}", key)),
        }
    }

    /// Send a request and decode the reply, whatever its status.
    pub async fn send(&self, method: Method, url: Url, body: Option<&Value>) -> Result<HttpReply> {
        let mut request = self.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        Ok(HttpReply { status, body })
    }

    /// Send a request and fail on any non-2xx status.
    pub async fn send_ok(&self, method: Method, url: Url, body: Option<&Value>) -> Result<Value> {
        let reply = self.send(method, url, body).await?;
        if !reply.is_success() {
            return Err(RefreshError::store(self.store, reply.error_text()));
        }
        Ok(reply.body)
    }

    fn transport_error(&self, e: reqwest::Error) -> RefreshError {
        if e.is_connect() || e.is_timeout() {
            RefreshError::connection(self.store, e)
        } else {
            RefreshError::store(self.store, e)
        }
    }
}
