#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use aurora_chat::core::error::ProviderError;
use aurora_chat::core::message::Turn;
use aurora_chat::core::provider::{ChatProvider, FragmentStream};
use aurora_chat::core::session::{Session, SessionId};
use aurora_chat::engine::PresentationSink;

pub const DONE: &str = "data: [DONE]\n\n";

/// One SSE event carrying `text` as `choices[0].delta.content`.
pub fn delta(text: &str) -> String {
    let payload = serde_json::json!({"choices": [{"delta": {"content": text}}]});
    format!("data: {payload}\n\n")
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

// ---------------------------------------------------------------------------
// Scripted HTTP server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: serde_json::Value,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Reply {
    status: u16,
    parts: Vec<String>,
    delay: Duration,
    hold_open: bool,
}

impl Reply {
    /// A 200 event-stream response written part by part.
    pub fn stream(parts: Vec<String>) -> Self {
        Self {
            status: 200,
            parts,
            delay: Duration::ZERO,
            hold_open: false,
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            parts: vec![body.to_string()],
            delay: Duration::ZERO,
            hold_open: false,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Keep the socket open after the last part until the client goes away.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }
}

pub struct MockServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    released: Arc<AtomicUsize>,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MockServer {
    /// Serves `replies` in order, one per accepted connection, on its own thread.
    pub fn start(replies: Vec<Reply>) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let released = Arc::new(AtomicUsize::new(0));
        let (addr_tx, addr_rx) = std::sync::mpsc::channel();
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let thread = {
            let requests = Arc::clone(&requests);
            let released = Arc::clone(&released);
            std::thread::spawn(move || {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();
                rt.block_on(async move {
                    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                    addr_tx.send(listener.local_addr().unwrap()).unwrap();
                    let mut replies = VecDeque::from(replies);

                    loop {
                        tokio::select! {
                            _ = &mut shutdown_rx => break,
                            accepted = listener.accept() => {
                                let Ok((socket, _)) = accepted else { break };
                                let reply = replies.pop_front();
                                tokio::spawn(serve(
                                    socket,
                                    reply,
                                    Arc::clone(&requests),
                                    Arc::clone(&released),
                                ));
                            }
                        }
                    }
                });
            })
        };

        let addr = addr_rx.recv().unwrap();
        Self {
            addr,
            requests,
            released,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/v1/chat/completions", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of held-open responses whose client closed the connection.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub async fn wait_released(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.released() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.released() >= count
    }

    pub fn wait_released_blocking(&self, count: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.released() >= count)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

async fn serve(
    mut socket: TcpStream,
    reply: Option<Reply>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    released: Arc<AtomicUsize>,
) {
    let Some(request) = read_request(&mut socket).await else {
        return;
    };
    requests.lock().unwrap().push(request);

    let reply = reply.unwrap_or_else(|| Reply::status(500, "unexpected request"));

    if reply.status != 200 {
        let body = reply.parts.concat();
        let head = format!(
            "HTTP/1.1 {} Error\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            reply.status,
            body.len()
        );
        let _ = socket.write_all(head.as_bytes()).await;
        let _ = socket.write_all(body.as_bytes()).await;
        let _ = socket.shutdown().await;
        return;
    }

    let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n";
    if socket.write_all(head.as_bytes()).await.is_err() {
        return;
    }
    let _ = socket.flush().await;

    for part in &reply.parts {
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        if socket.write_all(part.as_bytes()).await.is_err() {
            released.fetch_add(1, Ordering::SeqCst);
            return;
        }
        let _ = socket.flush().await;
    }

    if reply.hold_open {
        let mut buf = [0u8; 1024];
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
        released.fetch_add(1, Ordering::SeqCst);
    } else {
        let _ = socket.shutdown().await;
    }
}

async fn read_request(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let end = (header_end + content_length).min(buf.len());
    let body = serde_json::from_slice(&buf[header_end..end]).unwrap_or(serde_json::Value::Null);

    Some(RecordedRequest {
        method,
        path,
        headers,
        body,
    })
}

// ---------------------------------------------------------------------------
// Scripted in-process provider
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Step {
    Fragment(String),
    Fail(ProviderError),
    /// Never yields again; the stream stays open until dropped.
    Hang,
}

#[derive(Debug, Clone)]
pub enum Script {
    Reject(ProviderError),
    Stream(Vec<Step>),
}

impl Script {
    pub fn reply(fragments: &[&str]) -> Self {
        Script::Stream(
            fragments
                .iter()
                .map(|f| Step::Fragment(f.to_string()))
                .collect(),
        )
    }
}

#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    histories: Mutex<Vec<Vec<Turn>>>,
    released: Arc<AtomicUsize>,
    shutdowns: AtomicUsize,
    shutdown_threads: Mutex<Vec<Option<String>>>,
}

struct ReleaseGuard(Arc<AtomicUsize>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        })
    }

    /// Histories passed to `stream`, in call order.
    pub fn histories(&self) -> Vec<Vec<Turn>> {
        self.histories.lock().unwrap().clone()
    }

    /// Streams that have been dropped, whether finished or abandoned.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Names of the threads `shutdown` ran on.
    pub fn shutdown_threads(&self) -> Vec<Option<String>> {
        self.shutdown_threads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn stream(&self, history: &[Turn]) -> Result<FragmentStream, ProviderError> {
        self.histories.lock().unwrap().push(history.to_vec());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::reply(&[]));

        let steps = match script {
            Script::Reject(error) => return Err(error),
            Script::Stream(steps) => steps,
        };

        let released = Arc::clone(&self.released);
        let stream = async_stream::stream! {
            let _guard = ReleaseGuard(released);
            for step in steps {
                match step {
                    Step::Fragment(text) => yield Ok(text),
                    Step::Fail(error) => {
                        yield Err(error);
                        break;
                    }
                    Step::Hang => std::future::pending::<()>().await,
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn shutdown(&self) {
        let thread = std::thread::current().name().map(str::to_string);
        self.shutdown_threads.lock().unwrap().push(thread);
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }

    fn model_id(&self) -> &str {
        "scripted/test-model"
    }
}

// ---------------------------------------------------------------------------
// Recording sink
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    ListChanged { titles: Vec<String>, active: usize },
    Append { session: SessionId, text: String },
    Committed { session: SessionId, turn: Turn },
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<SinkEvent>,
}

impl RecordingSink {
    pub fn appended(&self, session: SessionId) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Append { session: s, text } if *s == session => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn committed(&self, session: SessionId) -> Vec<Turn> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Committed { session: s, turn } if *s == session => Some(turn.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_list(&self) -> Option<(Vec<String>, usize)> {
        self.events.iter().rev().find_map(|e| match e {
            SinkEvent::ListChanged { titles, active } => Some((titles.clone(), *active)),
            _ => None,
        })
    }

    pub fn list_changes(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SinkEvent::ListChanged { .. }))
            .count()
    }
}

impl PresentationSink for RecordingSink {
    fn on_session_list_changed(&mut self, sessions: &[Session], active_index: usize) {
        self.events.push(SinkEvent::ListChanged {
            titles: sessions.iter().map(|s| s.title().to_string()).collect(),
            active: active_index,
        });
    }

    fn on_append_text(&mut self, session: SessionId, fragment: &str) {
        self.events.push(SinkEvent::Append {
            session,
            text: fragment.to_string(),
        });
    }

    fn on_turn_committed(&mut self, session: SessionId, turn: &Turn) {
        self.events.push(SinkEvent::Committed {
            session,
            turn: turn.clone(),
        });
    }
}
