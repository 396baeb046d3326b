use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::errors::ClientError;

/// Which failures allow a request to be sent again.
///
/// Reads replay on 5xx and transport failures. Writes replay only when the
/// connection was never made, so a submission the backend may have stored
/// is not filed twice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Replay {
    Idempotent,
    ConnectOnly,
}

impl Replay {
    pub fn for_method(method: &Method) -> Self {
        if *method == Method::GET || *method == Method::HEAD {
            Self::Idempotent
        } else {
            Self::ConnectOnly
        }
    }

    fn after_status(self, status: StatusCode) -> bool {
        self == Self::Idempotent && status.is_server_error()
    }

    fn after_error(self, error: &reqwest::Error) -> bool {
        match self {
            Self::Idempotent => error.is_timeout() || error.is_connect() || error.is_request(),
            Self::ConnectOnly => error.is_connect() && !error.is_timeout(),
        }
    }
}

/// Budget service transport: one reqwest client plus the replay budget.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: ReqwestClient,
    max_attempts: u32,
    backoff: Duration,
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Sends the request, replaying it as [`Replay::for_method`] allows.
    ///
    /// Bodies must be buffered so the builder can be cloned per attempt.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, ClientError> {
        let mut attempt = 1;

        loop {
            let request = builder
                .try_clone()
                .ok_or_else(|| {
                    ClientError::Configuration("streaming request bodies cannot be replayed".into())
                })?
                .build()?;
            let replay = Replay::for_method(request.method());
            let method = request.method().clone();
            let path = request.url().path().to_string();
            let may_replay = attempt < self.max_attempts;

            match self.client.execute(request).await {
                Ok(response) if may_replay && replay.after_status(response.status()) => {
                    debug!(
                        event_name = "bcr.http.replay",
                        attempt,
                        %method,
                        path = %path,
                        status = response.status().as_u16(),
                        "budget service unavailable, replaying read"
                    );
                }
                Ok(response) => {
                    debug!(
                        attempt,
                        %method,
                        path = %path,
                        status = response.status().as_u16(),
                        "budget service responded"
                    );
                    return Ok(response);
                }
                Err(error) if may_replay && replay.after_error(&error) => {
                    debug!(
                        event_name = "bcr.http.replay",
                        attempt,
                        %method,
                        path = %path,
                        error = %error,
                        "budget service unreachable, replaying request"
                    );
                }
                Err(error) => return Err(error.into()),
            }

            tokio::time::sleep(self.delay_after(attempt)).await;
            attempt += 1;
        }
    }

    /// Doubles per attempt, capped at 64x the base backoff.
    fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(1u32 << attempt.saturating_sub(1).min(6))
    }
}

#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    max_attempts: u32,
    backoff: Duration,
    bearer_token: Option<SecretString>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            backoff: Duration::from_millis(200),
            bearer_token: None,
        }
    }
}

impl HttpClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total attempts for replayable requests, counting the first.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn bearer_token(mut self, token: SecretString) -> Self {
        self.bearer_token = Some(token);
        self
    }

    pub fn build(self) -> Result<HttpClient, ClientError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.bearer_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(|_| {
                    ClientError::Configuration("api token contains invalid header bytes".into())
                })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = ReqwestClient::builder()
            .timeout(self.timeout)
            .user_agent(concat!("budgetflow/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .no_proxy()
            .build()
            .map_err(|error| ClientError::Configuration(error.to_string()))?;

        Ok(HttpClient { client, max_attempts: self.max_attempts, backoff: self.backoff })
    }
}
