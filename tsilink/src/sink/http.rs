//! TrueSight Intelligence event API sink.

use futures::future::{BoxFuture, FutureExt};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

use super::{Sink, SinkResponse, SinkResult};
use crate::error::{ConfigError, TransportError};
use crate::models::Record;

/// Default API host
pub const DEFAULT_HOSTNAME: &str = "api.truesight.bmc.com";

/// Default API port
pub const DEFAULT_PORT: u16 = 443;

/// Event ingestion path
pub const EVENTS_PATH: &str = "/v1/events";

/// Connection settings for [`HttpSink`].
#[derive(Debug, Clone)]
pub struct HttpSinkOptions {
    pub email: String,
    pub api_token: String,
    pub hostname: String,
    pub port: u16,
    pub path: String,
    /// Per request timeout; a timeout is a transport error.
    pub timeout: Duration,
}

impl HttpSinkOptions {
    pub fn new(email: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            api_token: api_token.into(),
            hostname: DEFAULT_HOSTNAME.to_string(),
            port: DEFAULT_PORT,
            path: EVENTS_PATH.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn url(&self) -> String {
        format!("https://{}:{}{}", self.hostname, self.port, self.path)
    }
}

/// POSTs each record as JSON with basic authentication.
#[derive(Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
    email: String,
    api_token: String,
}

impl HttpSink {
    pub fn new(options: HttpSinkOptions) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(|e| ConfigError::Client(e.to_string()))?;

        info!(
            email = %options.email,
            hostname = %options.hostname,
            port = options.port,
            "Initialized api"
        );

        Ok(Self {
            client,
            url: options.url(),
            email: options.email,
            api_token: options.api_token,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Sink for HttpSink {
    fn send(&self, record: &Record, _attempt: u32) -> BoxFuture<'static, SinkResult> {
        let request = self
            .client
            .post(&self.url)
            .basic_auth(&self.email, Some(&self.api_token))
            .json(record);

        async move {
            let response = request.send().await.map_err(TransportError::from)?;
            let status = response.status().as_u16();

            let headers: BTreeMap<String, String> = response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect();

            // the body is only interesting when the event was rejected
            let body = if status >= 400 {
                response.text().await.ok()
            } else {
                None
            };

            Ok(SinkResponse {
                status,
                headers,
                body,
            })
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_url() {
        let options = HttpSinkOptions::new("me@company.com", "token");
        assert_eq!(options.url(), "https://api.truesight.bmc.com:443/v1/events");
    }

    #[test]
    fn test_custom_host_and_port() {
        let options = HttpSinkOptions::new("me@company.com", "token")
            .with_hostname("localhost")
            .with_port(8443);
        let sink = HttpSink::new(options).unwrap();
        assert_eq!(sink.url(), "https://localhost:8443/v1/events");
    }
}
