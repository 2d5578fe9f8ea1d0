//! Line decoder for OpenAI-style `text/event-stream` chat completions.
//!
//! Raw body chunks go in, fragments come out. Only `data: ` lines carry
//! events; everything else (blank lines, comments, keep-alives) is framing
//! noise. A malformed event is dropped and counted, never fatal.

use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Fragment(String),
    Done,
}

#[derive(Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Counters shared between a provider and every decoder it creates.
#[derive(Debug, Default)]
pub struct DecodeStats {
    events: AtomicU64,
    skipped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeStatsSnapshot {
    pub events: u64,
    pub skipped: u64,
}

impl DecodeStats {
    pub fn snapshot(&self) -> DecodeStatsSnapshot {
        DecodeStatsSnapshot {
            events: self.events.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
    stats: Arc<DecodeStats>,
}

impl SseDecoder {
    pub fn new(stats: Arc<DecodeStats>) -> Self {
        Self {
            buffer: Vec::new(),
            done: false,
            stats,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feeds one body chunk and returns the events of every line it completed.
    /// Nothing is returned once `[DONE]` has been seen.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            if let Some(event) = self.decode_line(&line[..line.len() - 1]) {
                let finished = event == SseEvent::Done;
                events.push(event);
                if finished {
                    self.done = true;
                    self.buffer.clear();
                    break;
                }
            }
        }
        events
    }

    /// Decodes whatever is left after the body ended without a final newline.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.done || self.buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.buffer);
        let event = self.decode_line(&line);
        if event == Some(SseEvent::Done) {
            self.done = true;
        }
        event
    }

    fn decode_line(&self, raw: &[u8]) -> Option<SseEvent> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            return None;
        }

        let data = line.strip_prefix(DATA_PREFIX)?.trim();
        if data == DONE_SENTINEL {
            return Some(SseEvent::Done);
        }

        self.stats.events.fetch_add(1, Ordering::Relaxed);
        match serde_json::from_str::<ChunkPayload>(data) {
            Ok(payload) => payload
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)
                .filter(|text| !text.is_empty())
                .map(SseEvent::Fragment),
            Err(e) => {
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(error = %e, "skipping malformed stream event");
                None
            }
        }
    }
}
