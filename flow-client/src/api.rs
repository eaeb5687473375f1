//! HTTP client for the run ledger API.

use std::time::Duration;

use shared_types::{LedgerEntry, RunRequest, RunResponse};

use crate::error::ClientError;

/// Client for one run ledger deployment.
#[derive(Debug, Clone)]
pub struct LedgerClient {
    base_url: String,
    http: reqwest::Client,
}

impl LedgerClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self::with_client(base_url, http))
    }

    pub fn with_client(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<(), ClientError> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(describe_http_error(response).await);
        }
        Ok(())
    }

    /// POST a run. A replayed run key comes back as [`RunResponse::Skipped`].
    pub async fn execute_run(
        &self,
        scope: &str,
        task_id: &str,
        request: &RunRequest,
    ) -> Result<RunResponse, ClientError> {
        let url = format!("{}/scopes/{scope}/tasks/{task_id}/runs", self.base_url);
        let response = self.http.post(url).json(request).send().await?;
        if !response.status().is_success() {
            return Err(describe_http_error(response).await);
        }
        response
            .json::<RunResponse>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    pub async fn list_runs(
        &self,
        scope: &str,
        task_id: &str,
    ) -> Result<Vec<LedgerEntry>, ClientError> {
        let url = format!("{}/scopes/{scope}/tasks/{task_id}/runs", self.base_url);
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(describe_http_error(response).await);
        }
        response
            .json::<Vec<LedgerEntry>>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }
}

async fn describe_http_error(response: reqwest::Response) -> ClientError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ClientError::Http {
        status,
        message: error_message(&body),
    }
}

fn error_message(body: &str) -> String {
    if body.trim().is_empty() {
        return "empty body".to_string();
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        let error = json.get("error");
        if let Some(code) = error.and_then(|e| e.get("code")).and_then(|v| v.as_str()) {
            let message = error
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            return format!("{code}: {message}");
        }
        if let Some(error) = error.and_then(|v| v.as_str()) {
            return error.to_string();
        }
        if let Some(message) = json.get("message").and_then(|v| v.as_str()) {
            return message.to_string();
        }
    }

    body.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_prefers_structured_error() {
        let body = r#"{"ok":false,"error":{"code":"TASK_NOT_FOUND","message":"task not found"}}"#;
        assert_eq!(error_message(body), "TASK_NOT_FOUND: task not found");
    }

    #[test]
    fn test_error_message_falls_back_to_body() {
        assert_eq!(error_message("upstream down"), "upstream down");
        assert_eq!(error_message(r#"{"message":"bad"}"#), "bad");
        assert_eq!(error_message("  "), "empty body");
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = LedgerClient::with_client("http://localhost:9191/", reqwest::Client::new());
        assert_eq!(client.base_url(), "http://localhost:9191");
    }
}
