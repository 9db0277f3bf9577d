// ABOUTME: HTTP-based ready checks with bounded retries.
// ABOUTME: Polls a backend until it passes or the retry budget is exhausted.

use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// A header to attach to ready check requests.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HttpHeader {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: String,
}

/// A single HTTP probe.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HttpCheck {
    /// Path the request should be made to.
    #[serde(default)]
    pub path: String,

    /// Status code the response must have. Defaults to 200.
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,

    /// Headers to attach to the request.
    #[serde(default)]
    pub headers: Vec<HttpHeader>,

    /// Per-attempt request timeout. Defaults to 5 seconds.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_expected_status() -> u16 {
    200
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

/// A repeated probe with a retry budget.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Check {
    /// How often to retry while waiting for the backend to come online.
    #[serde(with = "humantime_serde")]
    pub frequency: Duration,

    /// Maximum number of attempts before giving up.
    pub maximum: u32,

    /// The HTTP probe to run.
    pub http: HttpCheck,
}

#[derive(Debug, thiserror::Error)]
pub enum ReadyError {
    #[error("unexpected status code (wanted {wanted}, got {got})")]
    UnexpectedStatus { wanted: u16, got: u16 },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("exhausted retry count: {0}")]
    RetriesExhausted(Box<ReadyError>),
}

impl Check {
    /// Run a single probe against `host` ("ip:port").
    pub async fn test(&self, client: &reqwest::Client, host: &str) -> Result<(), ReadyError> {
        let url = format!("http://{}{}", host, self.http.path);

        let mut request = client.get(&url).timeout(self.http.timeout);
        for header in &self.http.headers {
            request = request.header(&header.name, &header.value);
        }

        let response = request.send().await?;
        let got = response.status().as_u16();
        if got != self.http.expected_status {
            return Err(ReadyError::UnexpectedStatus {
                wanted: self.http.expected_status,
                got,
            });
        }

        Ok(())
    }

    /// Run the probe continuously until it passes or the maximum attempt
    /// count is reached.
    pub async fn wait(&self, host: &str) -> Result<(), ReadyError> {
        let client = reqwest::Client::new();
        let mut ticker = tokio::time::interval(self.frequency);
        // The first tick completes immediately; consume it so attempts are
        // spaced by the configured frequency.
        ticker.tick().await;

        debug!(host, "waiting for ready check to pass");
        let mut last_err = None;
        for attempt in 1..=self.maximum {
            match self.test(&client, host).await {
                Ok(()) => {
                    debug!(attempt, "attempt passed");
                    return Ok(());
                }
                Err(error) => {
                    debug!(
                        attempt,
                        max_attempts = self.maximum,
                        %error,
                        "attempt failed"
                    );
                    last_err = Some(error);
                }
            }

            ticker.tick().await;
        }

        let last = last_err.unwrap_or(ReadyError::UnexpectedStatus {
            wanted: self.http.expected_status,
            got: 0,
        });
        Err(ReadyError::RetriesExhausted(Box::new(last)))
    }
}
