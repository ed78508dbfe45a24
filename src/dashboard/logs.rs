//! Log tail over server-sent events.
//!
//! `GET /api/logs/stream?lines=N` sends the last N lines of the scanner's
//! log file, then follows appends. Each connection polls the file on its
//! own, so a slow client never holds up other requests. If the file
//! shrinks (truncation or rotation) the tail restarts from the top.
//! Every line goes through [`redact_line`] before it is sent.

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream};
use serde::Deserialize;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::io::{self, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

use super::redact::redact_line;
use super::routes::ApiState;

pub const DEFAULT_BACKLOG_LINES: usize = 50;
pub const MAX_BACKLOG_LINES: usize = 500;

/// How far back from the end of the file the backlog looks.
const BACKLOG_WINDOW_BYTES: u64 = 256 * 1024;

#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    pub lines: Option<usize>,
}

/// GET /api/logs/stream
pub async fn stream_logs(
    State(state): State<ApiState>,
    Query(query): Query<LogQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let backlog = query
        .lines
        .unwrap_or(DEFAULT_BACKLOG_LINES)
        .min(MAX_BACKLOG_LINES);
    let tail = LogTail::new(state.log_file.clone(), backlog, state.log_poll);
    debug!(path = %tail.path.display(), backlog, "Log stream opened");

    let events = stream::unfold(tail, |mut tail| async move {
        let line = tail.next_line().await;
        let event = Event::default().data(redact_line(&line));
        Some((Ok(event), tail))
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Follows one file from a byte offset, yielding complete lines.
/// Bytes after the last newline are held undecoded, so a character split
/// across two appends comes out whole.
pub struct LogTail {
    path: PathBuf,
    backlog: usize,
    poll: Duration,
    offset: u64,
    started: bool,
    partial: Vec<u8>,
    pending: VecDeque<String>,
}

impl LogTail {
    pub fn new(path: PathBuf, backlog: usize, poll: Duration) -> Self {
        Self {
            path,
            backlog,
            poll,
            offset: 0,
            started: false,
            partial: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    /// Wait for and return the next complete line.
    pub async fn next_line(&mut self) -> String {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return line;
            }
            if let Err(e) = self.poll_file().await {
                // A missing log just means the scanner hasn't started yet.
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "Log tail read failed");
                }
            }
            if self.pending.is_empty() {
                tokio::time::sleep(self.poll).await;
            }
        }
    }

    async fn poll_file(&mut self) -> io::Result<()> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        let len = file.metadata().await?.len();

        if !self.started {
            self.started = true;
            let from = len.saturating_sub(BACKLOG_WINDOW_BYTES);
            let bytes = read_range(&mut file, from, len).await?;
            self.offset = len;
            self.load_backlog(&bytes, from > 0);
            return Ok(());
        }

        if len < self.offset {
            debug!(path = %self.path.display(), "Log file shrank, restarting tail from the top");
            self.offset = 0;
            self.partial.clear();
        }
        if len == self.offset {
            return Ok(());
        }

        let bytes = read_range(&mut file, self.offset, len).await?;
        self.offset = len;
        self.push_bytes(&bytes);
        Ok(())
    }

    fn load_backlog(&mut self, bytes: &[u8], starts_mid_file: bool) {
        let mut lines: Vec<&[u8]> = bytes.split(|&b| b == b'\n').collect();
        // Whatever follows the last newline is an unfinished line.
        let partial = lines.pop().unwrap_or_default();
        if starts_mid_file && !lines.is_empty() {
            lines.remove(0);
        }
        let skip = lines.len().saturating_sub(self.backlog);
        self.pending
            .extend(lines.into_iter().skip(skip).map(clean_line));
        self.partial = partial.to_vec();
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        self.partial.extend_from_slice(bytes);
        while let Some(pos) = self.partial.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=pos).collect();
            self.pending.push_back(clean_line(&line));
        }
    }
}

/// Decode one complete line. SSE cannot carry carriage returns.
fn clean_line(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    String::from_utf8_lossy(line).replace('\r', "")
}

async fn read_range(file: &mut tokio::fs::File, from: u64, to: u64) -> io::Result<Vec<u8>> {
    file.seek(SeekFrom::Start(from)).await?;
    let mut buf = Vec::with_capacity(to.saturating_sub(from) as usize);
    file.take(to.saturating_sub(from)).read_to_end(&mut buf).await?;
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;

    const POLL: Duration = Duration::from_millis(10);

    async fn next(tail: &mut LogTail) -> String {
        tokio::time::timeout(Duration::from_secs(2), tail.next_line())
            .await
            .expect("tail produced no line")
    }

    fn append(path: &std::path::Path, text: &str) {
        append_bytes(path, text.as_bytes());
    }

    fn append_bytes(path: &std::path::Path, bytes: &[u8]) {
        let mut f = OpenOptions::new().create(true).append(true).open(path).unwrap();
        f.write_all(bytes).unwrap();
    }

    #[tokio::test]
    async fn test_backlog_then_follow() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanner.log");
        append(&path, "one\ntwo\nthree\n");

        let mut tail = LogTail::new(path.clone(), 2, POLL);
        assert_eq!(next(&mut tail).await, "two");
        assert_eq!(next(&mut tail).await, "three");

        append(&path, "four\nfi");
        assert_eq!(next(&mut tail).await, "four");
        append(&path, "ve\n");
        assert_eq!(next(&mut tail).await, "five");
    }

    #[tokio::test]
    async fn test_split_multibyte_character() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanner.log");
        let euro = "€".as_bytes();
        append_bytes(&path, b"price ");

        let mut tail = LogTail::new(path.clone(), 10, POLL);
        let reader = tokio::spawn(async move { next(&mut tail).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        append_bytes(&path, &euro[..1]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        append_bytes(&path, &euro[1..]);
        append(&path, "1\n");
        assert_eq!(reader.await.unwrap(), "price €1");
    }

    #[tokio::test]
    async fn test_zero_backlog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanner.log");
        append(&path, "old\n");

        let mut tail = LogTail::new(path.clone(), 0, POLL);
        let reader = tokio::spawn(async move { next(&mut tail).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        append(&path, "new\n");
        assert_eq!(reader.await.unwrap(), "new");
    }

    #[tokio::test]
    async fn test_truncation_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanner.log");
        append(&path, "a long first line\n");

        let mut tail = LogTail::new(path.clone(), 10, POLL);
        assert_eq!(next(&mut tail).await, "a long first line");

        std::fs::write(&path, "x\n").unwrap();
        assert_eq!(next(&mut tail).await, "x");
    }

    #[tokio::test]
    async fn test_waits_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("later.log");
        let mut tail = LogTail::new(path.clone(), 10, POLL);
        let reader = tokio::spawn(async move { next(&mut tail).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        append(&path, "hello\r\n");
        assert_eq!(reader.await.unwrap(), "hello");
    }
}
