//! Shared helpers for the integration tests: a minimal HTTP/1.1 client over a
//! raw TCP socket, a collecting output sink, and `/bin/sh` stand-ins for
//! ffmpeg.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use relay::{HttpConfig, LineSink, OutputLine, RelayConfig, TranscoderConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub async fn request(addr: SocketAddr, method: &str, path: &str) -> std::io::Result<HttpResponse> {
    let exchange = async {
        let mut stream = TcpStream::connect(addr).await?;
        let req = format!("{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
        stream.write_all(req.as_bytes()).await?;

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await?;
        Ok::<_, std::io::Error>(parse_response(&raw))
    };

    tokio::time::timeout(IO_TIMEOUT, exchange)
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "HTTP request timed out"))?
}

pub async fn get(addr: SocketAddr, path: &str) -> HttpResponse {
    request(addr, "GET", path).await.expect("GET request")
}

fn parse_response(raw: &[u8]) -> HttpResponse {
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response head terminator");
    let head = String::from_utf8_lossy(&raw[..split]);
    let mut lines = head.lines();

    let status = lines
        .next()
        .and_then(|line| line.split(' ').nth(1))
        .and_then(|code| code.parse().ok())
        .expect("status line");
    let headers = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(n, v)| (n.trim().to_string(), v.trim().to_string()))
        .collect();

    HttpResponse {
        status,
        headers,
        body: raw[split + 4..].to_vec(),
    }
}

/// Sink that keeps every line for later inspection.
#[derive(Clone, Default)]
pub struct CollectSink(pub Arc<Mutex<Vec<OutputLine>>>);

impl CollectSink {
    pub fn texts(&self) -> Vec<String> {
        self.0.lock().iter().map(|l| l.text.clone()).collect()
    }
}

impl LineSink for CollectSink {
    fn line(&mut self, line: OutputLine) {
        self.0.lock().push(line);
    }
}

/// Write a shell script into `dir` and return a transcoder config that runs
/// it through `/bin/sh` in place of ffmpeg.
///
/// The script receives the usual ffmpeg argument vector, so `"$@"` ends with
/// the playlist path.
pub fn script_transcoder(dir: &Path, name: &str, body: &str, output: PathBuf) -> TranscoderConfig {
    let script = dir.join(name);
    std::fs::write(&script, body).expect("write transcoder script");

    TranscoderConfig {
        binary: "/bin/sh".to_string(),
        global_args: vec![script.to_string_lossy().into_owned()],
        input: "test-video.mp4".to_string(),
        output,
        ..TranscoderConfig::default()
    }
}

pub fn relay_config(root: &Path, transcoder: TranscoderConfig) -> RelayConfig {
    RelayConfig {
        http: HttpConfig {
            bind: "127.0.0.1:0".parse().unwrap(),
            root: root.to_path_buf(),
        },
        transcoder,
    }
}

pub fn missing_transcoder(output: PathBuf) -> TranscoderConfig {
    TranscoderConfig {
        binary: "/nonexistent/bin/ffmpeg".to_string(),
        output,
        ..TranscoderConfig::default()
    }
}

/// Poll `check` every 50ms until it returns true or `IO_TIMEOUT` passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + IO_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}
