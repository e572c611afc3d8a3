//! Incremental decoder for the answer event stream.
//!
//! The stream is a sequence of blocks separated by a blank line. Each block
//! holds `event:` lines (the last one wins) and `data:` lines (joined with
//! `\n`). Everything else in a block is ignored so servers can add fields
//! without breaking older clients.

/// Event name used when a block carries no `event:` line.
pub const DEFAULT_EVENT: &str = "message";

/// One decoded `event` + `data` unit, prior to semantic interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub event: String,
    pub data: String,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }
}

/// Append-only byte buffer that yields complete frames as they become
/// available.
///
/// Bytes are buffered rather than text so a multi-byte character split across
/// two network reads is decoded once both halves have arrived.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    // Prefix of `buf` already known to hold no block delimiter.
    scanned: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes every complete frame in the buffer plus `chunk`, in arrival
    /// order, and keeps the trailing partial block for the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buf
            .extend(chunk.iter().copied().filter(|byte| *byte != b'\r'));

        // A delimiter may straddle the previous end of the buffer.
        let start = self.scanned.saturating_sub(2);
        if find_block_delimiter(&self.buf[start..]).is_none() {
            self.scanned = self.buf.len();
            return Vec::new();
        }

        let mut frames = Vec::new();
        let mut consumed = 0;
        loop {
            let (frame, rest) = extract_next_frame(&self.buf[consumed..]);
            consumed = self.buf.len() - rest.len();
            match frame {
                Some(frame) => frames.push(frame),
                None => break,
            }
        }
        self.buf.drain(..consumed);
        self.scanned = self.buf.len();
        frames
    }

    /// Number of buffered bytes that do not yet form a complete block.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Discards any buffered partial block.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.scanned = 0;
    }
}

/// Extracts the first frame from `buffer`.
///
/// Returns the frame (if a complete block carrying data was found) and the
/// unconsumed remainder. Complete blocks without any `data:` line are skipped.
/// When no frame is available the remainder is the trailing partial block.
pub fn extract_next_frame(buffer: &[u8]) -> (Option<Frame>, &[u8]) {
    let mut rest = buffer;
    while let Some((idx, delim_len)) = find_block_delimiter(rest) {
        let block = &rest[..idx];
        rest = &rest[idx + delim_len..];
        if let Some(frame) = parse_block(block) {
            return (Some(frame), rest);
        }
    }
    (None, rest)
}

// A blank line is `\n\n`; a stray CR between the two newlines is tolerated so
// the function also works on input that was not CR-stripped.
fn find_block_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i < buf.len() {
        if buf[i] == b'\n' {
            match buf.get(i + 1) {
                Some(b'\n') => return Some((i, 2)),
                Some(b'\r') if buf.get(i + 2) == Some(&b'\n') => return Some((i, 3)),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

fn parse_block(block: &[u8]) -> Option<Frame> {
    let text = String::from_utf8_lossy(block);
    let mut event: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();
    for raw_line in text.split('\n') {
        let line = raw_line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if data_lines.is_empty() {
        return None;
    }
    Some(Frame {
        event: event
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
        data: data_lines.join("\n"),
    })
}
