// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Thread-safe output synchronization for preventing torn writes
//! when several hosts report at the same time.

use once_cell::sync::Lazy;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Global stdout mutex to prevent interleaved output
static STDOUT_MUTEX: Lazy<Mutex<io::Stdout>> = Lazy::new(|| Mutex::new(io::stdout()));

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Thread-safe print that writes `text` in one piece and flushes.
pub fn synchronized_print(text: &str) -> io::Result<()> {
    let mut stdout = lock(&STDOUT_MUTEX);
    write!(stdout, "{text}")?;
    stdout.flush()
}

/// Batch write multiple lines to stdout atomically
///
/// All lines from the same host appear together.
pub fn synchronized_print_lines<'a, I>(lines: I) -> io::Result<()>
where
    I: Iterator<Item = &'a str>,
{
    let mut stdout = lock(&STDOUT_MUTEX);
    for line in lines {
        writeln!(stdout, "{line}")?;
    }
    stdout.flush()
}

/// Destination for progress glyphs and the final summary.
#[derive(Debug, Clone, Default)]
pub enum ProgressSink {
    /// Process stdout, shared with every other synchronized writer.
    #[default]
    Stdout,
    /// In-memory buffer, for embedding and tests.
    Memory(Arc<Mutex<Vec<u8>>>),
    /// Discard everything.
    Silent,
}

impl ProgressSink {
    pub fn memory() -> Self {
        ProgressSink::Memory(Arc::new(Mutex::new(Vec::new())))
    }

    /// Write `text` as one uninterrupted unit.
    pub fn write(&self, text: &str) -> io::Result<()> {
        match self {
            ProgressSink::Stdout => synchronized_print(text),
            ProgressSink::Memory(buffer) => {
                lock(buffer).extend_from_slice(text.as_bytes());
                Ok(())
            }
            ProgressSink::Silent => Ok(()),
        }
    }

    /// Everything written so far (memory sinks only).
    pub fn contents(&self) -> String {
        match self {
            ProgressSink::Memory(buffer) => String::from_utf8_lossy(&lock(buffer)).into_owned(),
            _ => String::new(),
        }
    }
}

/// Writes streamed output as `[host] line`, one complete line at a time.
///
/// Chunks rarely end on a line (or character) boundary, so the unterminated
/// tail is kept as raw bytes until the next chunk or [`flush`](Self::flush).
/// Only complete lines are decoded.
pub struct NodeOutputWriter {
    node_prefix: String,
    partial: Vec<u8>,
}

impl NodeOutputWriter {
    /// Create a new writer with a node prefix
    pub fn new(node_host: &str) -> Self {
        Self {
            node_prefix: format!("[{node_host}]"),
            partial: Vec::new(),
        }
    }

    /// Prefix and return the complete lines contained in `data` plus any
    /// previously held partial line.
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(data);
        let Some(last_newline) = self.partial.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);
        String::from_utf8_lossy(&complete)
            .lines()
            .map(|line| self.prefixed(line))
            .collect()
    }

    /// Return the held partial line, if any, prefixed.
    pub fn flush(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.partial);
        Some(self.prefixed(&String::from_utf8_lossy(&line)))
    }

    fn prefixed(&self, line: &str) -> String {
        format!("{} {}", self.node_prefix, line)
    }

    /// Write complete lines from `data` to stdout atomically.
    pub fn write_stdout(&mut self, data: &[u8]) -> io::Result<()> {
        let lines = self.push(data);
        if lines.is_empty() {
            return Ok(());
        }
        synchronized_print_lines(lines.iter().map(String::as_str))
    }

    /// Write the held partial line to stdout, if any.
    pub fn finish_stdout(&mut self) -> io::Result<()> {
        match self.flush() {
            Some(line) => synchronized_print_lines(std::iter::once(line.as_str())),
            None => Ok(()),
        }
    }
}
