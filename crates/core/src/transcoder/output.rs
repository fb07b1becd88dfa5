//! Forwarding of the transcoder's stdout/stderr to a diagnostic sink.
//!
//! Each child stream gets its own reader task that splits the stream into
//! lines with [`OutputDecoder`] and pushes them into a shared channel. A
//! single drain task owns the receiving end and hands every line to the
//! [`LineSink`], so lines from both streams arrive at the sink one at a time
//! and in per-stream order.

use std::sync::Arc;
use std::{fmt, io};

use bytes::{Buf, BytesMut};
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, FramedRead};

/// Longest line forwarded in one piece; longer runs are split.
pub const MAX_LINE_LENGTH: usize = 4096;

/// Which child stream a line was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// One line of transcoder output, without the trailing newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub pid: u32,
    pub stream: OutputStream,
    pub text: String,
}

/// Destination for transcoder output lines.
///
/// The relay never parses ffmpeg output; a sink only records it somewhere an
/// operator can read it.
pub trait LineSink: Send {
    fn line(&mut self, line: OutputLine);
}

/// Default sink: every line becomes a `tracing` event.
///
/// ffmpeg writes progress and warnings to stderr, so stderr lines are logged
/// at `info` like stdout rather than being treated as errors.
#[derive(Debug, Default)]
pub struct TracingSink;

impl LineSink for TracingSink {
    fn line(&mut self, line: OutputLine) {
        tracing::info!(target: "relay::transcoder", pid = line.pid, stream = %line.stream, "{}", line.text);
    }
}

pub(crate) type SharedSink = Arc<Mutex<Box<dyn LineSink>>>;

/// Splits transcoder output into lines.
///
/// ffmpeg terminates progress reports with `\r` rather than `\n`, so both
/// end a line; empty lines are skipped. Bytes that are not valid UTF-8 are
/// replaced rather than rejected, and a run longer than `max_length` without
/// a terminator is emitted in `max_length` pieces.
#[derive(Debug, Clone)]
pub struct OutputDecoder {
    max_length: usize,
}

impl OutputDecoder {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(1),
        }
    }
}

impl Default for OutputDecoder {
    fn default() -> Self {
        Self::new(MAX_LINE_LENGTH)
    }
}

impl Decoder for OutputDecoder {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<String>> {
        loop {
            let window = src.len().min(self.max_length + 1);
            match src[..window].iter().position(|b| matches!(b, b'\n' | b'\r')) {
                Some(end) => {
                    let line = src.split_to(end);
                    src.advance(1);
                    if !line.is_empty() {
                        return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
                    }
                }
                None if src.len() >= self.max_length => {
                    let line = src.split_to(self.max_length);
                    return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
                }
                None => return Ok(None),
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<String>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let rest = src.split();
        Ok(Some(String::from_utf8_lossy(&rest).into_owned()))
    }
}

/// Read `reader` until EOF and send each line to `tx`.
///
/// Keeps reading for as long as the child keeps its end open; closing the
/// pipe early would kill the child with SIGPIPE on its next write.
pub(crate) fn spawn_reader<R>(
    reader: R,
    pid: u32,
    stream: OutputStream,
    tx: mpsc::UnboundedSender<OutputLine>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = FramedRead::new(reader, OutputDecoder::default());
        while let Some(line) = lines.next().await {
            match line {
                Ok(text) => {
                    // The drain outlives every sender, so a failed send only
                    // drops this line.
                    let _ = tx.send(OutputLine { pid, stream, text });
                }
                Err(e) => {
                    tracing::debug!(pid, %stream, error = %e, "transcoder output read failed");
                    break;
                }
            }
        }
    })
}

/// Drain the channel into the shared sink. Ends once every reader has hung up.
pub(crate) fn spawn_drain(
    mut rx: mpsc::UnboundedReceiver<OutputLine>,
    sink: SharedSink,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            sink.lock().line(line);
        }
    })
}
