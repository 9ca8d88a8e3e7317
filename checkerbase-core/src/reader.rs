use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};
use crate::line::Line;
use crate::metrics::BytesReadSink;

/// Target size of one internal read from the underlying file.
pub const DEFAULT_SEGMENT_SIZE: usize = 1024 * 1024;

/// Default capacity of the bounded line queue between reader and workers.
pub const DEFAULT_LINE_QUEUE_CAPACITY: usize = 10_000;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];
const STACK_RESIDUAL_CAP: usize = 256;

/// Bytes carried across read boundaries that do not yet form a complete
/// line. Short residuals (the common case for line-oriented input) live
/// inline in a fixed-size array; a residual that outgrows the inline
/// capacity is promoted to a heap-allocated buffer so arbitrarily long
/// multi-segment lines are still handled correctly.
enum Residual {
    Inline([u8; STACK_RESIDUAL_CAP], usize),
    Pooled(Vec<u8>),
}

impl Residual {
    fn empty() -> Self {
        Residual::Inline([0u8; STACK_RESIDUAL_CAP], 0)
    }

    fn len(&self) -> usize {
        match self {
            Residual::Inline(_, len) => *len,
            Residual::Pooled(v) => v.len(),
        }
    }

    fn as_slice(&self) -> &[u8] {
        match self {
            Residual::Inline(buf, len) => &buf[..*len],
            Residual::Pooled(v) => v.as_slice(),
        }
    }

    fn append(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        match self {
            Residual::Inline(buf, len) => {
                if *len + bytes.len() <= STACK_RESIDUAL_CAP {
                    buf[*len..*len + bytes.len()].copy_from_slice(bytes);
                    *len += bytes.len();
                } else {
                    let mut pooled = Vec::with_capacity(*len + bytes.len());
                    pooled.extend_from_slice(&buf[..*len]);
                    pooled.extend_from_slice(bytes);
                    *self = Residual::Pooled(pooled);
                }
            }
            Residual::Pooled(v) => v.extend_from_slice(bytes),
        }
    }

    /// Removes the first `n` bytes, keeping the remainder for the next scan.
    fn drain_front(&mut self, n: usize) {
        match self {
            Residual::Inline(buf, len) => {
                let remaining = *len - n;
                buf.copy_within(n..*len, 0);
                *len = remaining;
            }
            Residual::Pooled(v) => {
                v.drain(0..n);
            }
        }
    }

    fn take_all(&mut self) -> Vec<u8> {
        let out = match self {
            Residual::Inline(buf, len) => buf[..*len].to_vec(),
            Residual::Pooled(v) => std::mem::take(v),
        };
        *self = Residual::empty();
        out
    }
}

fn strip_trailing_cr(bytes: &mut Vec<u8>) {
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
}

async fn emit(tx: &mpsc::Sender<Line>, line: Line) -> std::result::Result<(), ()> {
    match tx.try_send(line) {
        Ok(()) => Ok(()),
        Err(mpsc::error::TrySendError::Full(line)) => tx.send(line).await.map_err(|_| ()),
        Err(mpsc::error::TrySendError::Closed(_)) => Err(()),
    }
}

/// Streams a file, splitting it into lines with BOM/CRLF handling, and pushes
/// each line into a bounded channel. Reports bytes consumed to `bytes_sink`
/// after every pipeline advance.
pub struct LineReader {
    segment_size: usize,
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new(DEFAULT_SEGMENT_SIZE)
    }
}

impl LineReader {
    pub fn new(segment_size: usize) -> Self {
        Self { segment_size }
    }

    /// Reads `path` to completion (or until `cancel` fires), sending each
    /// line to `tx` and reporting byte progress to `bytes_sink`. On any I/O
    /// error the channel is simply dropped (closing it for the receivers);
    /// the error is returned to the caller.
    pub async fn run(
        &self,
        path: &Path,
        tx: mpsc::Sender<Line>,
        bytes_sink: Arc<dyn BytesReadSink>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let file = tokio::fs::File::open(path).await?;
        let mut reader = BufReader::with_capacity(self.segment_size, file);
        let mut pending = Residual::empty();
        let mut read_buf = vec![0u8; self.segment_size];
        let mut first_read = true;

        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let n = reader.read(&mut read_buf).await?;
            if n == 0 {
                if pending.len() > 0 {
                    let mut bytes = pending.take_all();
                    let consumed = bytes.len() as u64;
                    strip_trailing_cr(&mut bytes);
                    let line = Line(String::from_utf8(bytes)?);
                    bytes_sink.on_bytes_read(consumed);
                    let _ = emit(&tx, line).await;
                }
                return Ok(());
            }

            pending.append(&read_buf[..n]);

            let mut consumed_this_iter: u64 = 0;

            // The BOM may be split across reads by a pathologically small
            // segment size; check it against the accumulated residual, not
            // the raw chunk from this one read, and only once it is long
            // enough to tell either way.
            if first_read && pending.len() >= 3 {
                first_read = false;
                if pending.as_slice()[0..3] == UTF8_BOM {
                    pending.drain_front(3);
                    consumed_this_iter += 3;
                }
            }

            loop {
                let slice = pending.as_slice();
                let Some(pos) = slice.iter().position(|&b| b == b'\n') else {
                    break;
                };
                let mut line_bytes = slice[..pos].to_vec();
                let line_len_with_newline = pos + 1;
                strip_trailing_cr(&mut line_bytes);
                let line = Line(String::from_utf8(line_bytes)?);
                pending.drain_front(line_len_with_newline);
                consumed_this_iter += line_len_with_newline as u64;
                if emit(&tx, line).await.is_err() {
                    return Ok(());
                }
            }

            if consumed_this_iter > 0 {
                bytes_sink.on_bytes_read(consumed_this_iter);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use std::io::Write;
    use tokio::sync::mpsc;

    async fn collect(bytes: &[u8], segment_size: usize) -> (Vec<String>, u64) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();

        let (tx, mut rx) = mpsc::channel(16);
        let metrics = Arc::new(Metrics::new(bytes.len() as u64));
        let reader = LineReader::new(segment_size);
        let cancel = CancellationToken::new();

        let path = file.path().to_path_buf();
        let metrics_clone = metrics.clone();
        let handle = tokio::spawn(async move {
            reader.run(&path, tx, metrics_clone, cancel).await
        });

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line.into_string());
        }
        handle.await.unwrap().unwrap();
        (lines, metrics.snapshot().processed_bytes)
    }

    #[tokio::test]
    async fn bom_crlf_no_trailing_newline() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"a:1\r\nb:2\r\nc:3");
        let total_len = bytes.len() as u64;

        let (lines, processed) = collect(&bytes, DEFAULT_SEGMENT_SIZE).await;
        assert_eq!(lines, vec!["a:1", "b:2", "c:3"]);
        assert_eq!(processed, total_len);
    }

    #[tokio::test]
    async fn empty_file_yields_zero_lines() {
        let (lines, processed) = collect(b"", DEFAULT_SEGMENT_SIZE).await;
        assert!(lines.is_empty());
        assert_eq!(processed, 0);
    }

    #[tokio::test]
    async fn sole_bom_yields_zero_lines() {
        let (lines, _processed) = collect(&[0xEF, 0xBB, 0xBF], DEFAULT_SEGMENT_SIZE).await;
        assert!(lines.is_empty());
    }

    #[tokio::test]
    async fn bom_split_across_reads_by_a_tiny_segment_size_is_still_stripped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"a:1\nb:2\n");
        let total_len = bytes.len() as u64;

        // segment_size 1 forces the 3-byte BOM across three separate reads.
        let (lines, processed) = collect(&bytes, 1).await;
        assert_eq!(lines, vec!["a:1", "b:2"]);
        assert_eq!(processed, total_len);
    }

    #[tokio::test]
    async fn small_segment_size_still_splits_correctly_across_reads() {
        let bytes = b"alpha\nbeta\ngamma\ndelta\n".to_vec();
        let (lines, processed) = collect(&bytes, 4).await;
        assert_eq!(lines, vec!["alpha", "beta", "gamma", "delta"]);
        assert_eq!(processed, bytes.len() as u64);
    }

    #[tokio::test]
    async fn line_longer_than_inline_residual_is_handled() {
        let long_value = "x".repeat(1000);
        let bytes = format!("{long_value}\nshort\n").into_bytes();
        let (lines, processed) = collect(&bytes, 16).await;
        assert_eq!(lines, vec![long_value, "short".to_string()]);
        assert_eq!(processed, bytes.len() as u64);
    }
}
