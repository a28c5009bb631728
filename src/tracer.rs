//! Request tracer
//!
//! Appends every HTTP exchange to an NDJSON file for debugging a source.
//! The file is rotated once it grows past `maxsize` megabytes, keeping at
//! most `maxbackups` old files (`trace.ndjson.1`, `trace.ndjson.2`, ...).
//! Write failures are logged and never reach the polling loop.

use crate::error::Result;
use crate::http::{HttpRequest, HttpResponse};
use chrono::Utc;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// `tracer` block of a source config
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TracerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub filename: PathBuf,
    /// Megabytes before rotation
    #[serde(default = "default_maxsize")]
    pub maxsize: u64,
    #[serde(default = "default_maxbackups")]
    pub maxbackups: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_maxsize() -> u64 {
    1
}

fn default_maxbackups() -> usize {
    5
}

struct TraceFile {
    file: File,
    size: u64,
}

/// Rotating NDJSON log of requests and responses
pub struct Tracer {
    path: PathBuf,
    max_bytes: u64,
    max_backups: usize,
    current: Mutex<Option<TraceFile>>,
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("path", &self.path)
            .field("max_bytes", &self.max_bytes)
            .field("max_backups", &self.max_backups)
            .finish_non_exhaustive()
    }
}

impl Tracer {
    /// The file and its parent directories are created on the first write
    pub fn new(config: &TracerConfig) -> Self {
        Self {
            path: config.filename.clone(),
            max_bytes: config.maxsize.max(1) * BYTES_PER_MB,
            max_backups: config.maxbackups,
            current: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one exchange
    pub async fn record(&self, req: &HttpRequest, outcome: &Result<HttpResponse>) {
        let mut entry = json!({
            "@timestamp": Utc::now().to_rfc3339(),
            "http.request": {
                "method": req.method.as_str(),
                "url": req.url.as_str(),
                "header": headers_json(&req.header),
                "body": req.body.as_deref().map(String::from_utf8_lossy),
            },
        });
        match outcome {
            Ok(resp) => {
                entry["http.response"] = json!({
                    "status_code": resp.status,
                    "header": headers_json(&resp.header),
                    "body": resp.text(),
                });
            }
            Err(e) => entry["error.message"] = Value::String(e.to_string()),
        }

        let mut line = entry.to_string();
        line.push('\n');
        if let Err(e) = self.write_line(line.as_bytes()).await {
            warn!(path = %self.path.display(), error = %e, "failed to write trace");
        }
    }

    async fn write_line(&self, line: &[u8]) -> Result<()> {
        let mut guard = self.current.lock().await;

        let needs_rotation = guard
            .as_ref()
            .is_some_and(|t| t.size > 0 && t.size + line.len() as u64 > self.max_bytes);
        if needs_rotation || guard.is_none() {
            *guard = None;
            if needs_rotation {
                self.rotate().await?;
            }
            *guard = Some(self.open().await?);
        }

        if let Some(trace) = guard.as_mut() {
            trace.file.write_all(line).await?;
            trace.file.flush().await?;
            trace.size += line.len() as u64;
        }
        Ok(())
    }

    async fn open(&self) -> Result<TraceFile> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let size = file.metadata().await?.len();
        Ok(TraceFile { file, size })
    }

    /// Shift `name.N-1` to `name.N` and move the live file to `name.1`
    async fn rotate(&self) -> Result<()> {
        if self.max_backups == 0 {
            tokio::fs::remove_file(&self.path).await?;
            return Ok(());
        }
        let oldest = self.backup(self.max_backups);
        if tokio::fs::try_exists(&oldest).await? {
            tokio::fs::remove_file(&oldest).await?;
        }
        for n in (1..self.max_backups).rev() {
            let from = self.backup(n);
            if tokio::fs::try_exists(&from).await? {
                tokio::fs::rename(&from, self.backup(n + 1)).await?;
            }
        }
        tokio::fs::rename(&self.path, self.backup(1)).await?;
        Ok(())
    }

    fn backup(&self, n: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }
}

fn headers_json(headers: &HeaderMap) -> Value {
    let mut out = Map::new();
    for (name, value) in headers {
        let value = if name == reqwest::header::AUTHORIZATION {
            "<redacted>".to_string()
        } else {
            String::from_utf8_lossy(value.as_bytes()).into_owned()
        };
        match out.get_mut(name.as_str()) {
            Some(Value::Array(values)) => values.push(Value::String(value)),
            _ => {
                out.insert(name.as_str().to_string(), json!([value]));
            }
        }
    }
    Value::Object(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use url::Url;

    fn request() -> HttpRequest {
        let mut header = HeaderMap::new();
        header.insert("authorization", HeaderValue::from_static("Bearer secret"));
        header.insert("accept", HeaderValue::from_static("application/json"));
        HttpRequest {
            method: reqwest::Method::GET,
            url: Url::parse("http://localhost/items?page=1").unwrap(),
            header,
            body: None,
        }
    }

    fn response() -> HttpResponse {
        HttpResponse {
            status: 200,
            header: HeaderMap::new(),
            url: Url::parse("http://localhost/items?page=1").unwrap(),
            body: br#"{"items": []}"#.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_records_exchange_as_ndjson() {
        let dir = tempfile::tempdir().unwrap();
        let config = TracerConfig {
            enabled: true,
            filename: dir.path().join("logs/trace.ndjson"),
            maxsize: 1,
            maxbackups: 2,
        };
        let tracer = Tracer::new(&config);
        assert!(!tracer.path().exists());
        tracer.record(&request(), &Ok(response())).await;
        tracer.record(&request(), &Err(crate::Error::Cancelled)).await;

        let contents = std::fs::read_to_string(tracer.path()).unwrap();
        let lines: Vec<Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["http.response"]["status_code"], 200);
        assert_eq!(
            lines[0]["http.request"]["header"]["authorization"],
            json!(["<redacted>"])
        );
        assert_eq!(lines[1]["error.message"], "Operation cancelled");
    }

    #[tokio::test]
    async fn test_rotates_and_keeps_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.ndjson");
        let tracer = Tracer {
            path: path.clone(),
            max_bytes: 64,
            max_backups: 2,
            current: Mutex::new(None),
        };
        for _ in 0..5 {
            tracer.write_line(&[b'x'; 40]).await.unwrap();
        }

        assert!(path.exists());
        assert!(dir.path().join("trace.ndjson.1").exists());
        assert!(dir.path().join("trace.ndjson.2").exists());
        assert!(!dir.path().join("trace.ndjson.3").exists());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 40);
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let config = TracerConfig {
            enabled: true,
            filename: blocker.join("trace.ndjson"),
            maxsize: 1,
            maxbackups: 1,
        };
        let tracer = Tracer::new(&config);
        tracer.record(&request(), &Ok(response())).await;
        assert!(!tracer.path().exists());
    }
}
