use super::config::{effective_timeout, DEFAULT_PUSHPLUS_URL};
use super::curl::{parse_curl, ParsedRequest};
use crate::errors::{PrinterError, Result};
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

const ALERT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub status_code: u16,
    pub duration_ms: u64,
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error_message: String,
    pub response_size: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub response_body: String,
}

impl ExecutionResult {
    fn failed(message: String) -> Self {
        Self {
            error_message: message,
            ..Default::default()
        }
    }

    pub fn is_failure(&self) -> bool {
        self.timed_out || !self.success || !self.error_message.is_empty()
    }

    /// Failures always alert; successes alert when slower than the threshold.
    pub fn needs_alert(&self, threshold_ms: i64) -> bool {
        self.is_failure() || Duration::from_millis(self.duration_ms) > effective_timeout(threshold_ms)
    }
}

/// Runs monitor requests and delivers PushPlus notifications.
pub struct Executor {
    client: Client,
    push_plus_url: String,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|e| {
                error!("Failed to create HTTP client with custom config: {}. Using defaults.", e);
                Client::new()
            });

        Self {
            client,
            push_plus_url: DEFAULT_PUSHPLUS_URL.to_string(),
        }
    }

    pub fn with_push_plus_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        if !url.trim().is_empty() {
            self.push_plus_url = url;
        }
        self
    }

    pub async fn execute(&self, req: &ParsedRequest, timeout_ms: i64) -> ExecutionResult {
        let url = match url::Url::parse(&req.url) {
            Ok(url) => url,
            Err(e) => return ExecutionResult::failed(format!("Invalid request: invalid URL: {}", e)),
        };
        let method = match Method::from_bytes(req.method.as_bytes()) {
            Ok(method) => method,
            Err(e) => return ExecutionResult::failed(format!("Invalid request: {}", e)),
        };

        let timeout = effective_timeout(timeout_ms);
        let mut builder = self.client.request(method, url).timeout(timeout);
        for (key, value) in &req.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if !req.body.is_empty() {
            builder = builder.body(req.body.clone());
        }

        let started = Instant::now();
        let elapsed_ms = |started: Instant| started.elapsed().as_millis() as u64;

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return ExecutionResult {
                    timed_out: true,
                    duration_ms: elapsed_ms(started),
                    error_message: format!("Request timeout after {}ms", timeout.as_millis()),
                    ..Default::default()
                };
            }
            Err(e) => {
                return ExecutionResult {
                    duration_ms: elapsed_ms(started),
                    error_message: format!("Request failed: {}", e),
                    ..Default::default()
                };
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return ExecutionResult {
                    status_code: status.as_u16(),
                    timed_out: e.is_timeout(),
                    duration_ms: elapsed_ms(started),
                    error_message: format!("Failed to read response: {}", e),
                    ..Default::default()
                };
            }
        };

        let success = status.is_success();
        ExecutionResult {
            success,
            status_code: status.as_u16(),
            duration_ms: elapsed_ms(started),
            timed_out: false,
            error_message: if success {
                String::new()
            } else {
                format!("HTTP {}", status)
            },
            response_size: body.len() as u64,
            response_body: body,
        }
    }

    pub async fn execute_curl(&self, command: &str, timeout_ms: i64) -> ExecutionResult {
        match parse_curl(command) {
            Ok(req) => self.execute(&req, timeout_ms).await,
            Err(e) => ExecutionResult::failed(format!("Failed to parse curl command: {}", e)),
        }
    }

    /// Alerts for a task run. Without a token the alert is skipped; an empty
    /// `push_plus_url` falls back to the executor's own endpoint.
    pub async fn send_alert(
        &self,
        push_plus_url: &str,
        token: &str,
        task_name: &str,
        result: &ExecutionResult,
        threshold_ms: i64,
    ) -> Result<()> {
        if token.trim().is_empty() {
            warn!("PushPlus token not configured, skipping alert for '{}'", task_name);
            return Ok(());
        }

        let title = format!("API monitor alert - {}", task_name);
        let content = alert_content(task_name, result, threshold_ms);
        let endpoint = if push_plus_url.trim().is_empty() {
            self.push_plus_url.as_str()
        } else {
            push_plus_url
        };
        self.push(endpoint, token, &title, &content).await?;
        info!("Alert sent for task '{}': {}", task_name, result.error_message);
        Ok(())
    }

    pub async fn test_pushplus(&self, token: &str, title: &str, content: &str) -> Result<()> {
        if token.trim().is_empty() {
            return Err(PrinterError::Validation("pushplus token is empty".to_string()));
        }
        self.push(&self.push_plus_url, token, title, content).await?;
        info!("PushPlus test notification sent");
        Ok(())
    }

    async fn push(&self, endpoint: &str, token: &str, title: &str, content: &str) -> Result<()> {
        let response = self
            .client
            .get(endpoint)
            .query(&[("token", token), ("title", title), ("content", content)])
            .timeout(ALERT_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                warn!("PushPlus request failed: {}", e);
                PrinterError::Monitor(format!("send notification failed: {}", e))
            })?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(PrinterError::Monitor(format!(
                "pushplus returned status {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}

pub fn alert_content(task_name: &str, result: &ExecutionResult, threshold_ms: i64) -> String {
    let mut content = format!(
        "[API monitor alert]\n\nTask: {}\nStatus: failed or slow\nDuration: {} ms\nThreshold: {} ms\n",
        task_name, result.duration_ms, threshold_ms
    );
    if result.timed_out {
        content.push_str("Reason: request timed out\n");
    } else if !result.error_message.is_empty() {
        content.push_str(&format!("Reason: {}\n", result.error_message));
    } else if !result.success {
        content.push_str(&format!("Reason: HTTP {}\n", result.status_code));
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(server: &MockServer, route: &str) -> ParsedRequest {
        ParsedRequest {
            url: format!("{}{}", server.uri(), route),
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            body: String::new(),
        }
    }

    #[tokio::test]
    async fn test_success_records_body_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let result = Executor::new().execute(&request(&server, "/health"), 2000).await;
        assert!(result.success);
        assert_eq!(result.status_code, 200);
        assert_eq!(result.response_body, "ok");
        assert_eq!(result.response_size, 2);
        assert!(!result.needs_alert(2000));
    }

    #[tokio::test]
    async fn test_headers_and_body_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(header("Content-Type", "application/json"))
            .and(body_string("{\"a\":1}"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let command = format!(
            "curl -X POST {}/query -H 'Content-Type: application/json' -d '{{\"a\":1}}'",
            server.uri()
        );
        let result = Executor::new().execute_curl(&command, 2000).await;
        assert!(result.success, "{:?}", result);
    }

    #[tokio::test]
    async fn test_non_2xx_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let result = Executor::new().execute(&request(&server, "/down"), 2000).await;
        assert!(!result.success);
        assert_eq!(result.status_code, 502);
        assert!(result.error_message.starts_with("HTTP 502"));
        assert!(result.needs_alert(2000));
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let result = Executor::new().execute(&request(&server, "/slow"), 100).await;
        assert!(result.timed_out);
        assert!(!result.success);
        assert!(result.error_message.contains("timeout"));
    }

    #[tokio::test]
    async fn test_unparsable_curl_is_reported() {
        let result = Executor::new().execute_curl("curl -X GET", 1000).await;
        assert!(!result.success);
        assert!(result.error_message.starts_with("Failed to parse curl command"));
    }

    #[test]
    fn test_slow_success_alerts() {
        let result = ExecutionResult {
            success: true,
            status_code: 200,
            duration_ms: 1500,
            ..Default::default()
        };
        assert!(result.needs_alert(1000));
        assert!(!result.needs_alert(2000));
        // non-positive thresholds mean one second
        assert!(result.needs_alert(0));
    }

    #[tokio::test]
    async fn test_alert_goes_to_pushplus() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/send"))
            .and(query_param("token", "tok"))
            .and(query_param("title", "API monitor alert - his"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let executor = Executor::new().with_push_plus_url(format!("{}/send", server.uri()));
        let result = ExecutionResult {
            timed_out: true,
            ..Default::default()
        };
        executor.send_alert("", "tok", "his", &result, 1000).await.unwrap();
    }

    #[tokio::test]
    async fn test_alert_uses_given_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/send"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let executor = Executor::new().with_push_plus_url("http://127.0.0.1:9/send");
        let result = ExecutionResult {
            status_code: 500,
            ..Default::default()
        };
        executor
            .send_alert(&format!("{}/v2/send", server.uri()), "tok", "his", &result, 1000)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_alert_without_token_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let executor = Executor::new().with_push_plus_url(server.uri());
        executor
            .send_alert("", "", "his", &ExecutionResult::default(), 1000)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_pushplus_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let executor = Executor::new().with_push_plus_url(server.uri());
        let err = executor.test_pushplus("tok", "t", "c").await.unwrap_err();
        assert_eq!(err.to_string(), "Monitor error: pushplus returned status 500");
        assert!(executor.test_pushplus("", "t", "c").await.is_err());
    }

    #[test]
    fn test_alert_content_reason() {
        let result = ExecutionResult {
            status_code: 503,
            error_message: "HTTP 503 Service Unavailable".to_string(),
            duration_ms: 42,
            ..Default::default()
        };
        let content = alert_content("his", &result, 1000);
        assert!(content.contains("Task: his"));
        assert!(content.contains("Duration: 42 ms"));
        assert!(content.contains("Reason: HTTP 503 Service Unavailable"));
    }
}
