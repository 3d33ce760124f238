//! Incremental decoding of upstream Server-Sent Events
//!
//! Both vendors stream `data: <json>` frames separated by blank lines. Network
//! chunks do not align with frames, so bytes are buffered until a complete
//! block is available.

use super::{FragmentStream, ProviderError, StreamFragment};
use futures::stream::{self, Stream, StreamExt};

/// What a vendor parser made of one `data:` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Fragment(StreamFragment),
    /// Unrecognised or empty payload; keep reading
    Skip,
    /// Explicit end-of-stream marker
    End,
    /// Upstream reported a failure in-band; ends the stream with an error
    Error(String),
}

/// Buffers raw bytes and yields the `data` payload of each complete block
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    /// Last pushed byte was `\r`; a leading `\n` in the next chunk belongs to it
    after_cr: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a chunk, normalising `\r\n` and bare `\r` line endings to `\n`
    pub fn push(&mut self, chunk: &[u8]) {
        self.pending.reserve(chunk.len());
        for &byte in chunk {
            if std::mem::take(&mut self.after_cr) && byte == b'\n' {
                continue;
            }
            if byte == b'\r' {
                self.after_cr = true;
                self.pending.push(b'\n');
            } else {
                self.pending.push(byte);
            }
        }
    }

    /// Terminate any trailing block that the upstream did not close
    pub fn finish(&mut self) {
        if !self.pending.is_empty() {
            self.pending.extend_from_slice(b"\n\n");
        }
    }

    /// Next complete block's joined `data:` lines
    ///
    /// Blocks carrying no data (comments, bare `event:` lines) are skipped.
    pub fn next_data(&mut self) -> Option<String> {
        while let Some(end) = find_block_boundary(&self.pending) {
            let block: Vec<u8> = self.pending.drain(..end + 2).collect();
            let block = String::from_utf8_lossy(&block[..end]);
            if let Some(data) = parse_data_lines(&block) {
                return Some(data);
            }
        }
        None
    }

    pub fn has_remaining(&self) -> bool {
        self.pending.iter().any(|b| !b.is_ascii_whitespace())
    }
}

/// Position of the first blank-line separator in normalised input
fn find_block_boundary(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

fn parse_data_lines(block: &str) -> Option<String> {
    let data: Vec<&str> = block
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .collect();

    if data.is_empty() {
        None
    } else {
        Some(data.join("\n"))
    }
}

struct DecodeState<S, F> {
    bytes: S,
    decoder: SseDecoder,
    parse: F,
    upstream_done: bool,
}

/// Adapt an upstream byte stream into normalised fragments
///
/// Fragments are yielded in arrival order. A transport error is yielded once
/// and ends the stream, as does an in-band [`Frame::Error`]; [`Frame::End`]
/// or upstream EOF end it silently.
pub fn decode_fragments<S, B, E, F>(bytes: S, parse: F) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ProviderError> + Send + 'static,
    F: Fn(&str) -> Frame + Send + 'static,
{
    let state = DecodeState {
        bytes,
        decoder: SseDecoder::new(),
        parse,
        upstream_done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            while let Some(data) = state.decoder.next_data() {
                match (state.parse)(&data) {
                    Frame::Fragment(fragment) => return Some((Ok(fragment), state)),
                    Frame::Skip => continue,
                    Frame::End => return None,
                    Frame::Error(message) => {
                        state.upstream_done = true;
                        state.decoder = SseDecoder::new();
                        return Some((Err(ProviderError::Stream(message)), state));
                    }
                }
            }

            if state.upstream_done {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => state.decoder.push(chunk.as_ref()),
                Some(Err(e)) => {
                    state.upstream_done = true;
                    state.decoder = SseDecoder::new();
                    return Some((Err(e.into()), state));
                }
                None => {
                    state.upstream_done = true;
                    state.decoder.finish();
                }
            }
        }
    })
    .boxed()
}
