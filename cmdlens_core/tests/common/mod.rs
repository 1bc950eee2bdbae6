//! Shared test utilities for cmdlens_core integration tests.
//!
//! - `MockBackend`: a raw TCP server speaking just enough HTTP/1.1 to stand in
//!   for the generative backend. Each connection replays a scripted response:
//!   newline-delimited fragments, stalls, malformed lines or an error status.
//!   The body is delimited by closing the connection.
//! - `CountingRunner` / `CountingExplainer`: fakes that record every call.
//! - `wait_for_pid_exit`: polls `/proc` until a process is gone.

// Test utilities; not every test binary uses all of them.
#![allow(dead_code)]

use async_trait::async_trait;
use cmdlens_core::allowlist::CommandUnit;
use cmdlens_core::explainer::{ExplainContext, ExplainError, Explainer, PromptTemplate};
use cmdlens_core::sandbox::{CommandRunner, ExecutionResult};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

/// One step of a scripted streaming body.
#[derive(Debug, Clone)]
pub enum Step {
    /// Write these bytes as-is.
    Raw(String),
    /// Write a `{"response": ...}` record followed by a newline.
    Fragment(String),
    /// Pause before the next step.
    Sleep(Duration),
}

#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Stream the steps, then a final `"done": true` record.
    Stream(Vec<Step>),
    /// Stream the steps and nothing else.
    Body(Vec<Step>),
    Status(u16, String),
}

/// Scripted stand-in for the generative backend.
///
/// The n-th connection gets the n-th response; the last one repeats.
pub struct MockBackend {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    bodies: Arc<Mutex<Vec<String>>>,
    task: tokio::task::JoinHandle<()>,
}

impl MockBackend {
    pub async fn start(responses: Vec<MockResponse>) -> Self {
        assert!(!responses.is_empty(), "mock backend needs a response");
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let responses = Arc::new(responses);

        let task = {
            let hits = hits.clone();
            let bodies = bodies.clone();
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    let n = hits.fetch_add(1, Ordering::SeqCst);
                    let response = responses[n.min(responses.len() - 1)].clone();
                    let bodies = bodies.clone();
                    tokio::spawn(async move {
                        let _ = serve(socket, response, bodies).await;
                    });
                }
            })
        };

        Self {
            addr,
            hits,
            bodies,
            task,
        }
    }

    /// Every connection streams `steps`.
    pub async fn streaming(steps: Vec<Step>) -> Self {
        Self::start(vec![MockResponse::Stream(steps)]).await
    }

    /// Every connection streams one fragment per item of `pieces`.
    pub async fn fragments(pieces: &[&str]) -> Self {
        Self::streaming(pieces.iter().map(|p| Step::Fragment(p.to_string())).collect()).await
    }

    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).unwrap()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Request bodies received so far, parsed as JSON.
    pub fn requests(&self) -> Vec<serde_json::Value> {
        self.bodies
            .lock()
            .unwrap()
            .iter()
            .map(|b| serde_json::from_str(b).unwrap())
            .collect()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A URL nothing is listening on.
pub async fn refused_url() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{addr}")).unwrap()
}

async fn serve(
    mut socket: TcpStream,
    response: MockResponse,
    bodies: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    let body = read_request(&mut socket).await?;
    bodies.lock().unwrap().push(body);

    match response {
        MockResponse::Status(status, body) => {
            let head = format!(
                "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await?;
            socket.write_all(body.as_bytes()).await?;
        }
        MockResponse::Stream(steps) => {
            write_steps(&mut socket, steps).await?;
            let done = serde_json::json!({"model": "llama3", "response": "", "done": true});
            socket.write_all(format!("{done}\n").as_bytes()).await?;
        }
        MockResponse::Body(steps) => write_steps(&mut socket, steps).await?,
    }
    socket.shutdown().await
}

async fn write_steps(socket: &mut TcpStream, steps: Vec<Step>) -> std::io::Result<()> {
    socket
        .write_all(
            b"HTTP/1.1 200 OK\r\nContent-Type: application/x-ndjson\r\nConnection: close\r\n\r\n",
        )
        .await?;
    for step in steps {
        match step {
            Step::Raw(bytes) => socket.write_all(bytes.as_bytes()).await?,
            Step::Fragment(text) => {
                let line = serde_json::json!({"model": "llama3", "response": text, "done": false});
                socket.write_all(format!("{line}\n").as_bytes()).await?;
            }
            Step::Sleep(duration) => tokio::time::sleep(duration).await,
        }
        socket.flush().await?;
    }
    Ok(())
}

/// Read one request and return its body.
async fn read_request(socket: &mut TcpStream) -> std::io::Result<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(String::new());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Ok(String::from_utf8_lossy(&buf[header_end..]).into_owned())
}

/// Runner fake: canned results per command, every call recorded.
#[derive(Default)]
pub struct CountingRunner {
    calls: Mutex<Vec<String>>,
    delays: HashMap<String, Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl CountingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `command` take `delay` to "run".
    pub fn with_delay(mut self, command: &str, delay: Duration) -> Self {
        self.delays.insert(command.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRunner for CountingRunner {
    async fn run(&self, unit: &CommandUnit) -> ExecutionResult {
        let command = unit.trimmed().to_string();
        self.calls.lock().unwrap().push(command.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(&command) {
            tokio::time::sleep(*delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        ExecutionResult {
            unit: unit.clone(),
            exit_code: Some(0),
            stdout: format!("output of {command}\n"),
            stderr: String::new(),
            duration_ms: 1,
            timed_out: false,
            spawn_error: None,
            timeout_ms: 5000,
        }
    }
}

/// Explainer fake: answers `"<prefix>: <command>"` and records every context.
pub struct CountingExplainer {
    prefix: String,
    calls: Mutex<Vec<(PromptTemplate, ExplainContext)>>,
}

impl CountingExplainer {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(PromptTemplate, ExplainContext)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Explainer for CountingExplainer {
    async fn explain(
        &self,
        template: PromptTemplate,
        context: &ExplainContext,
    ) -> Result<String, ExplainError> {
        self.calls.lock().unwrap().push((template, context.clone()));
        Ok(format!("{}: {}", self.prefix, context.command))
    }
}

/// Read a pid written by a test command, waiting for the file to appear.
pub async fn read_pid_file(path: &std::path::Path) -> u32 {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(contents) = std::fs::read_to_string(path)
            && let Ok(pid) = contents.trim().parse()
        {
            return pid;
        }
        assert!(Instant::now() < deadline, "no pid written to {}", path.display());
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Wait until `pid` is gone (or a zombie) or fail after `within`.
///
/// Orphans are reaped by init shortly after their group is killed.
#[cfg(target_os = "linux")]
pub async fn wait_for_pid_exit(pid: u32, within: Duration) {
    let deadline = Instant::now() + within;
    loop {
        let state = std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .ok()
            .and_then(|stat| {
                stat.rsplit_once(") ")
                    .and_then(|(_, rest)| rest.chars().next())
            });
        match state {
            None | Some('Z') | Some('X') => return,
            Some(other) => {
                assert!(
                    Instant::now() < deadline,
                    "process {pid} still alive in state {other}"
                );
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
}
