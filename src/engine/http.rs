use crate::engine::Transport;
use crate::model::{
    ClassificationResult, ClientConfig, RequestError, SelectedFile, FILE_FIELD, PREDICT_PATH,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;

/// reqwest-backed transport with a fixed base address and a fixed per-request timeout.
///
/// Constructed once from [`ClientConfig`] and handed to the controller; there is no
/// process-wide client.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
    predict_url: Url,
    root_url: Url,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    message: Option<String>,
}

impl HttpTransport {
    pub fn new(cfg: &ClientConfig) -> Result<Self> {
        let base = cfg.base_url.trim_end_matches('/').to_string();
        let predict_url = Url::parse(&format!("{base}{PREDICT_PATH}"))
            .with_context(|| format!("invalid base URL: {}", cfg.base_url))?;
        let root_url = Url::parse(&format!("{base}/"))
            .with_context(|| format!("invalid base URL: {}", cfg.base_url))?;

        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.timeout)
            .build()
            .context("build http client")?;

        Ok(Self {
            http,
            base_url: base,
            predict_url,
            root_url,
            timeout: cfg.timeout,
        })
    }
}

/// Classify a transport failure by cause. A non-2xx status never reaches this function;
/// it is handled where the response is inspected.
fn classify_transport_error(err: &reqwest::Error) -> RequestError {
    if err.is_timeout() {
        RequestError::Timeout
    } else if err.is_builder() {
        RequestError::Unknown
    } else if err.is_connect() || err.is_request() {
        // The request left (or tried to leave) but nothing came back.
        RequestError::Unreachable
    } else {
        RequestError::Unknown
    }
}

/// Pull the optional `error` string out of an error response body.
fn server_message(body: &str) -> Option<String> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    v.get("error")
        .and_then(|e| e.as_str())
        .map(|s| s.to_string())
}

/// Turn a non-2xx response into a server error. A body that stalls past the client
/// timeout is still a timeout.
async fn error_status(resp: reqwest::Response) -> RequestError {
    let status = resp.status();
    match resp.text().await {
        Ok(body) => {
            tracing::warn!(%status, "service returned an error status");
            RequestError::server(server_message(&body))
        }
        Err(e) if e.is_timeout() => {
            tracing::warn!(%status, "timed out reading error response body");
            RequestError::Timeout
        }
        Err(e) => {
            tracing::warn!(%status, error = %e, "failed to read error response body");
            RequestError::server(None)
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn classify(&self, file: &SelectedFile) -> Result<ClassificationResult, RequestError> {
        let part = Part::bytes(file.bytes.to_vec())
            .file_name(file.name.clone())
            .mime_str(file.kind.mime_type())
            .map_err(|e| {
                tracing::warn!(error = %e, "failed to build multipart part");
                RequestError::Unknown
            })?;
        let form = Form::new().part(FILE_FIELD, part);

        tracing::debug!(
            url = %self.predict_url,
            file = %file.name,
            bytes = file.size(),
            "submitting image for classification"
        );

        let resp = self
            .http
            .post(self.predict_url.clone())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                let classified = classify_transport_error(&e);
                tracing::warn!(error = %e, kind = classified.kind_str(), "classification request failed");
                classified
            })?;

        if !resp.status().is_success() {
            return Err(error_status(resp).await);
        }

        let result = resp.json::<ClassificationResult>().await.map_err(|e| {
            if e.is_timeout() {
                RequestError::Timeout
            } else {
                tracing::warn!(error = %e, "unexpected classification response body");
                RequestError::Unknown
            }
        })?;

        tracing::info!(
            is_pothole = result.is_pothole,
            confidence = result.confidence,
            raw_probability = result.raw_probability,
            "classification completed"
        );
        Ok(result)
    }

    async fn health(&self) -> Result<String, RequestError> {
        let resp = self
            .http
            .get(self.root_url.clone())
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        if !resp.status().is_success() {
            return Err(error_status(resp).await);
        }

        let body = resp
            .json::<HealthBody>()
            .await
            .map_err(|e| classify_transport_error(&e))?;
        Ok(body.message.unwrap_or_else(|| "OK".to_string()))
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
