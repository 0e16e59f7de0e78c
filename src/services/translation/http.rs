// LibreTranslate-compatible HTTP backend

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

use super::Translator;
use crate::core::errors::{TranslationError, TranslationResult};
use crate::core::language::Language;

#[derive(Debug, Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: String,
}

pub struct HttpTranslator {
    endpoint: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl HttpTranslator {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            endpoint: endpoint.into(),
            api_key,
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Map a non-success status to the error taxonomy.
///
/// Throttling and server errors mean the provider is unavailable; any other
/// client error is a refusal of this particular input.
fn classify_status(status: StatusCode, body: String) -> TranslationError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        TranslationError::Unavailable(format!("{}: {}", status, body))
    } else {
        TranslationError::Rejected {
            reason: format!("{}: {}", status, body),
        }
    }
}

#[async_trait]
impl Translator for HttpTranslator {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self, text), fields(chars = text.chars().count()))]
    async fn translate(
        &self,
        text: &str,
        source: Language,
        target: Language,
    ) -> TranslationResult<String> {
        if text.trim().is_empty() || source == target {
            return Ok(text.to_string());
        }

        let body = TranslateRequest {
            q: text,
            source: source.iso_code(),
            target: target.iso_code(),
            format: "text",
            api_key: self.api_key.as_deref(),
        };

        let response = self.http_client.post(&self.endpoint).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            debug!("Translation request failed with status {}", status);
            return Err(classify_status(status, error_text));
        }

        let parsed: TranslateResponse = response
            .json()
            .await
            .map_err(|e| TranslationError::InvalidResponse(e.to_string()))?;
        if parsed.translated_text.trim().is_empty() {
            return Err(TranslationError::Rejected {
                reason: "empty translation".to_string(),
            });
        }
        Ok(parsed.translated_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers one request with `status` and a JSON `body`, returns the endpoint
    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{}/translate", addr)
    }

    /// Consume headers and body so closing the socket does not reset it
    async fn read_request(socket: &mut tokio::net::TcpStream) {
        let mut data = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            data.extend_from_slice(&chunk[..n]);
            let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&data[..end]).to_ascii_lowercase();
            let length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= end + 4 + length {
                return;
            }
        }
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "bad".into()),
            TranslationError::Rejected { .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()),
            TranslationError::Unavailable(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, String::new()),
            TranslationError::Unavailable(_)
        ));
    }

    #[test]
    fn test_request_shape() {
        let body = TranslateRequest {
            q: "こんにちは",
            source: "ja",
            target: "en",
            format: "text",
            api_key: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["source"], "ja");
        assert!(json.get("api_key").is_none());

        let parsed: TranslateResponse =
            serde_json::from_str(r#"{"translatedText":"Hello"}"#).unwrap();
        assert_eq!(parsed.translated_text, "Hello");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_unavailable() {
        let translator =
            HttpTranslator::new("http://127.0.0.1:9/translate", None, Duration::from_secs(2)).unwrap();
        let err = translator
            .translate("こんにちは", Language::Japanese, Language::English)
            .await
            .unwrap_err();
        assert!(matches!(err, TranslationError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_translated_text_is_returned() {
        let endpoint = serve_once("200 OK", r#"{"translatedText":"Hello"}"#).await;
        let translator = HttpTranslator::new(endpoint, None, Duration::from_secs(5)).unwrap();
        let out = translator
            .translate("こんにちは", Language::Japanese, Language::English)
            .await
            .unwrap();
        assert_eq!(out, "Hello");
    }

    #[tokio::test]
    async fn test_empty_translation_is_rejected() {
        let endpoint = serve_once("200 OK", r#"{"translatedText":""}"#).await;
        let translator = HttpTranslator::new(endpoint, None, Duration::from_secs(5)).unwrap();
        let err = translator
            .translate("こんにちは", Language::Japanese, Language::English)
            .await
            .unwrap_err();
        assert!(matches!(err, TranslationError::Rejected { ref reason } if reason == "empty translation"));
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let endpoint = serve_once("503 Service Unavailable", r#"{"error":"busy"}"#).await;
        let translator = HttpTranslator::new(endpoint, None, Duration::from_secs(5)).unwrap();
        let err = translator
            .translate("こんにちは", Language::Japanese, Language::English)
            .await
            .unwrap_err();
        assert!(matches!(err, TranslationError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_blank_text_skips_request() {
        let translator =
            HttpTranslator::new("http://127.0.0.1:9/translate", None, Duration::from_secs(2)).unwrap();
        let out = translator
            .translate("  ", Language::Japanese, Language::English)
            .await
            .unwrap();
        assert_eq!(out, "  ");
    }
}
