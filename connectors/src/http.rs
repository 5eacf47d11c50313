use common::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Hard per-request timeout; exceeding it surfaces as a transient error.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Thin JSON REST client shared by all connectors.
///
/// Maps non-2xx responses into the error taxonomy so the pagination engine
/// can decide what is retryable. Cloning is cheap (reqwest clients share a
/// connection pool internally).
#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub async fn get_json<T>(
        &self,
        path: &str,
        params: &[(String, String)],
        headers: &[(String, String)],
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {} with {} params", url, params.len());
        let mut request = self.client.get(&url).query(params);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        Self::execute(request).await
    }

    pub async fn post_json<B, T>(
        &self,
        path: &str,
        body: &B,
        headers: &[(String, String)],
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);
        let mut request = self.client.post(&url).json(body);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        Self::execute(request).await
    }

    /// POST with headers only; used for auth handshakes that carry the
    /// whole payload in signed headers.
    pub async fn post_empty<T>(&self, path: &str, headers: &[(String, String)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {} (empty body)", url);
        let mut request = self.client.post(&url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        Self::execute(request).await
    }

    async fn execute<T: DeserializeOwned>(request: reqwest::RequestBuilder) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status.as_u16(), body));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| Error::Parse(format!("failed to parse response body: {}", e)))
    }
}

/// Deserializers tolerant of exchanges that encode numbers as strings.
pub mod de {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn f64_lenient<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| serde::de::Error::custom("number out of f64 range")),
            Value::String(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
            other => Err(serde::de::Error::custom(format!(
                "expected number or string, got {}",
                other
            ))),
        }
    }

    /// Millisecond timestamps arrive as integers, floats or strings.
    pub fn i64_lenient<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Ok(v)
                } else {
                    n.as_f64()
                        .map(|v| v as i64)
                        .ok_or_else(|| serde::de::Error::custom("number out of i64 range"))
                }
            }
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(|v| v as i64)
                .map_err(serde::de::Error::custom),
            other => Err(serde::de::Error::custom(format!(
                "expected number or string, got {}",
                other
            ))),
        }
    }

}
