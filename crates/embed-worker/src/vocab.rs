//! Where the tokenizer vocabulary comes from, and how a fetched document becomes a [`Tokenizer`].

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use embed_error::{ErrorDetail, WorkerError, WrapCause};
use reqwest::Client;

use crate::config::WorkerConfig;
use crate::tokenizer::{Tokenizer, Vocabulary};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("vocabulary fetch returned status {status}")]
    Status { status: u16 },

    #[error("vocabulary transport failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("vocabulary document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A retrievable structured document holding the token -> id map.
#[async_trait]
pub trait VocabSource: Send + Sync + std::fmt::Debug {
    /// Human-readable location, attached to fetch errors.
    fn location(&self) -> &str;

    async fn fetch(&self) -> Result<serde_json::Value, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpVocabSource {
    client: Client,
    url: String,
}

impl HttpVocabSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), url)
    }

    pub fn with_client(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl VocabSource for HttpVocabSource {
    fn location(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<serde_json::Value, FetchError> {
        let res = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(Box::new(e)))?;

        if !res.status().is_success() {
            return Err(FetchError::Status {
                status: res.status().as_u16(),
            });
        }

        let body = res
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(Box::new(e)))?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Reads the vocabulary document from the local filesystem. A missing file reports status 404
/// so callers see the same fetch failure shape as the HTTP source.
#[derive(Debug, Clone)]
pub struct FileVocabSource {
    path: PathBuf,
    display: String,
}

impl FileVocabSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let display = path.display().to_string();
        Self { path, display }
    }
}

#[async_trait]
impl VocabSource for FileVocabSource {
    fn location(&self) -> &str {
        &self.display
    }

    async fn fetch(&self) -> Result<serde_json::Value, FetchError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FetchError::Status { status: 404 })
            }
            Err(e) => return Err(FetchError::Transport(Box::new(e))),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Pick the source matching the configured location.
pub fn source_for(config: &WorkerConfig) -> Arc<dyn VocabSource> {
    if config.vocab_is_remote() {
        Arc::new(HttpVocabSource::new(config.vocab_location.clone()))
    } else {
        Arc::new(FileVocabSource::new(config.vocab_path()))
    }
}

/// Fetch the vocabulary document and wrap it in a [`Tokenizer`].
///
/// - non-success status: `tokenizer_fetch_error` with the status
/// - no object at `pointer`: `tokenizer_format_error` with the received document
/// - anything else (transport, JSON, construction): `tokenizer_error` wrapping the cause
#[tracing::instrument(skip_all, fields(location = source.location()))]
pub async fn load_tokenizer(
    source: &dyn VocabSource,
    pointer: &str,
    unknown_token: &str,
    max_length: usize,
) -> embed_error::Result<Tokenizer> {
    let location = source.location().to_string();
    let tokenizer_detail = || ErrorDetail::Tokenizer {
        location: location.clone(),
    };

    let document = match source.fetch().await {
        Ok(doc) => doc,
        Err(FetchError::Status { status }) => {
            return Err(WorkerError::new(ErrorDetail::TokenizerFetch {
                location: location.clone(),
                status,
            }))
        }
        Err(e) => return Err(WorkerError::with_cause(tokenizer_detail(), e)),
    };

    let Some(map) = document.pointer(pointer).and_then(|v| v.as_object()) else {
        return Err(WorkerError::new(ErrorDetail::TokenizerFormat {
            pointer: pointer.to_string(),
            received: document,
        }));
    };

    let vocab = Vocabulary::from_json_map(map, unknown_token).wrap_cause(tokenizer_detail)?;
    let tokenizer = Tokenizer::new(vocab, max_length).wrap_cause(tokenizer_detail)?;
    tracing::debug!(vocab_size = tokenizer.vocab().len(), "tokenizer loaded");
    Ok(tokenizer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use embed_error::ErrorKind;
    use std::io::Write;

    fn write_doc(doc: &serde_json::Value) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{doc}").unwrap();
        file
    }

    #[tokio::test]
    async fn loads_vocab_from_file() {
        let file = write_doc(&serde_json::json!({
            "model": { "vocab": { "[UNK]": 100, "hello": 7592 } }
        }));
        let source = FileVocabSource::new(file.path());
        let tok = load_tokenizer(&source, "/model/vocab", "[UNK]", 4)
            .await
            .unwrap();
        assert_eq!(tok.encode("hello there").ids, vec![7592, 100, 0, 0]);
    }

    #[tokio::test]
    async fn missing_file_is_a_fetch_error_with_status() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileVocabSource::new(dir.path().join("tokenizer.json"));
        let err = load_tokenizer(&source, "/model/vocab", "[UNK]", 4)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TokenizerFetch);
        assert_eq!(err.to_record().details["status"], 404);
    }

    #[tokio::test]
    async fn missing_vocab_field_is_a_format_error() {
        let file = write_doc(&serde_json::json!({ "model": { "type": "WordPiece" } }));
        let source = FileVocabSource::new(file.path());
        let err = load_tokenizer(&source, "/model/vocab", "[UNK]", 4)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TokenizerFormat);
        assert_eq!(
            err.to_record().details["received_data"]["model"]["type"],
            "WordPiece"
        );
    }

    #[tokio::test]
    async fn invalid_json_and_missing_unk_are_tokenizer_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = load_tokenizer(&FileVocabSource::new(file.path()), "/model/vocab", "[UNK]", 4)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Tokenizer);
        assert!(err.cause().is_some());

        let file = write_doc(&serde_json::json!({ "model": { "vocab": { "hello": 1 } } }));
        let err = load_tokenizer(&FileVocabSource::new(file.path()), "/model/vocab", "[UNK]", 4)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Tokenizer);
    }

    /// Minimal HTTP/1.1 server: `/tokenizer.json` serves a vocabulary, `/garbage` serves
    /// non-JSON, anything else is a 500. Returns the base URL.
    async fn serve_vocab() -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&request);
                    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let (status, body) = match path.as_str() {
                        "/tokenizer.json" => (
                            "200 OK",
                            r#"{"model":{"vocab":{"[UNK]":100,"hello":7592,"world":2088}}}"#,
                        ),
                        "/garbage" => ("200 OK", "<html>not a tokenizer</html>"),
                        _ => ("500 Internal Server Error", "boom"),
                    };
                    let response = format!(
                        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });
        format!("http://{addr}")
    }

    fn http_source(url: String) -> HttpVocabSource {
        let client = Client::builder().no_proxy().build().unwrap();
        HttpVocabSource::with_client(client, url)
    }

    #[tokio::test]
    async fn http_source_surfaces_status_and_loads_document() {
        let base = serve_vocab().await;

        let source = http_source(format!("{base}/broken"));
        let err = load_tokenizer(&source, "/model/vocab", "[UNK]", 4)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TokenizerFetch);
        let record = err.to_record();
        assert_eq!(record.details["status"], 500);
        assert_eq!(record.details["location"], format!("{base}/broken"));

        let source = http_source(format!("{base}/tokenizer.json"));
        let tok = load_tokenizer(&source, "/model/vocab", "[UNK]", 4)
            .await
            .unwrap();
        assert_eq!(tok.encode("Hello WORLD again").ids, vec![7592, 2088, 100, 0]);
    }

    #[tokio::test]
    async fn http_body_and_transport_failures_are_tokenizer_errors() {
        let base = serve_vocab().await;
        let source = http_source(format!("{base}/garbage"));
        let err = load_tokenizer(&source, "/model/vocab", "[UNK]", 4)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Tokenizer);
        assert!(err.cause().is_some());

        // nothing listens on a port whose listener was just dropped
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let source = http_source(format!("http://{addr}/tokenizer.json"));
        let err = load_tokenizer(&source, "/model/vocab", "[UNK]", 4)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Tokenizer);
        assert!(err.to_record().cause.unwrap().contains("transport"));
    }

    #[test]
    fn source_for_selects_by_scheme() {
        let cfg = WorkerConfig {
            vocab_location: "https://example.com/tokenizer.json".into(),
            ..Default::default()
        };
        assert_eq!(source_for(&cfg).location(), "https://example.com/tokenizer.json");
        let cfg = WorkerConfig::default();
        assert_eq!(source_for(&cfg).location(), "model/tokenizer.json");
    }
}
