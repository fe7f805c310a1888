//! Outbound add-person request.

use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("no feature vector for this face")]
    MissingVector,
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Body of `POST /add-person`. The vector is authoritative; `name` is only
/// sent when the deployment opts in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddPersonRequest {
    pub vector: Vec<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl AddPersonRequest {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector, name: None }
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name.filter(|n| !n.trim().is_empty());
        self
    }
}

/// Anything that can register a face with the backend.
pub trait Registrar {
    fn add_person(
        &self,
        request: &AddPersonRequest,
    ) -> impl Future<Output = Result<(), RegistrationError>> + Send;
}

/// Registrar backed by the backend's HTTP API.
#[derive(Clone)]
pub struct HttpRegistrar {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpRegistrar {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RegistrationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RegistrationError::Client(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Registrar for HttpRegistrar {
    async fn add_person(&self, request: &AddPersonRequest) -> Result<(), RegistrationError> {
        tracing::info!(
            url = %self.url,
            dimensions = request.vector.len(),
            named = request.name.is_some(),
            "submitting add-person request"
        );

        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "add-person rejected");
            return Err(RegistrationError::Status {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        tracing::info!(status = status.as_u16(), "person added");
        Ok(())
    }
}

impl HttpRegistrar {
    fn classify(&self, e: reqwest::Error) -> RegistrationError {
        if e.is_timeout() {
            RegistrationError::Timeout(self.timeout)
        } else {
            RegistrationError::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serve exactly one request with `status_line`, returning the received body.
    async fn one_shot_server(status_line: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/add-person", listener.local_addr().unwrap());
        let (body_tx, body_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            let body = loop {
                let n = stream.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some((head, body)) = text.split_once("\r\n\r\n") {
                    let length = head
                        .lines()
                        .find_map(|l| {
                            let (k, v) = l.split_once(':')?;
                            k.eq_ignore_ascii_case("content-length")
                                .then(|| v.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if body.len() >= length {
                        break body.to_string();
                    }
                }
                if n == 0 {
                    break String::new();
                }
            };
            let payload = "stored";
            let response = format!(
                "{status_line}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{payload}",
                payload.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            let _ = body_tx.send(body);
        });

        (url, body_rx)
    }

    #[test]
    fn test_request_serializes_vector_only_by_default() {
        let request = AddPersonRequest::new(vec![0.5, -1.0]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({ "vector": [0.5, -1.0] }));
    }

    #[test]
    fn test_blank_name_is_not_sent() {
        let request = AddPersonRequest::new(vec![1.0]).with_name(Some("  ".into()));
        assert_eq!(request.name, None);
        let request = AddPersonRequest::new(vec![1.0]).with_name(Some("Grace".into()));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["name"], "Grace");
    }

    #[tokio::test]
    async fn test_success_posts_json_body() {
        let (url, body_rx) = one_shot_server("HTTP/1.1 200 OK").await;
        let registrar = HttpRegistrar::new(url, Duration::from_secs(5)).unwrap();

        registrar
            .add_person(&AddPersonRequest::new(vec![0.25, 0.75]))
            .await
            .unwrap();

        let body: serde_json::Value = serde_json::from_str(&body_rx.await.unwrap()).unwrap();
        assert_eq!(body, serde_json::json!({ "vector": [0.25, 0.75] }));
    }

    #[tokio::test]
    async fn test_server_error_is_reported_with_status() {
        let (url, _body_rx) = one_shot_server("HTTP/1.1 500 Internal Server Error").await;
        let registrar = HttpRegistrar::new(url, Duration::from_secs(5)).unwrap();

        let err = registrar
            .add_person(&AddPersonRequest::new(vec![1.0]))
            .await
            .unwrap_err();
        match err {
            RegistrationError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "stored");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unresponsive_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/add-person", listener.local_addr().unwrap());
        // Accept and hold the connection without answering.
        let _server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let registrar = HttpRegistrar::new(url, Duration::from_millis(200)).unwrap();
        let err = registrar
            .add_person(&AddPersonRequest::new(vec![1.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Timeout(_)), "{err}");
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let addr = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        let registrar =
            HttpRegistrar::new(format!("http://{addr}/add-person"), Duration::from_secs(2)).unwrap();
        let err = registrar
            .add_person(&AddPersonRequest::new(vec![1.0]))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Transport(_)), "{err}");
    }
}
