//! Terminal rendering of a streamed answer.

use std::io::Write as _;

use answer_stream::{ContextEntry, Metadata, SessionError, StreamHandlers, TerminalResult};

/// Writes deltas to stdout as they arrive and everything else to stderr.
pub struct TerminalHandlers {
    show_sources: bool,
    streamed: String,
}

impl TerminalHandlers {
    pub fn new(show_sources: bool) -> Self {
        Self {
            show_sources,
            streamed: String::new(),
        }
    }
}

impl StreamHandlers for TerminalHandlers {
    fn on_delta(&mut self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
        self.streamed.push_str(text);
    }

    fn on_metadata(&mut self, metadata: &Metadata) {
        tracing::debug!(sources = metadata.context.len(), "received sources");
    }

    fn on_done(&mut self, result: TerminalResult) {
        println!("{}", completion_suffix(&self.streamed, &result.answer));
        if result.possibly_incomplete() {
            eprintln!("(the answer may be incomplete: the stream closed early)");
        }
        if self.show_sources
            && let Some(metadata) = &result.metadata
        {
            for (idx, entry) in metadata.context.iter().enumerate() {
                eprintln!("{}", source_line(idx + 1, entry));
            }
        }
    }

    fn on_error(&mut self, error: SessionError) {
        if !self.streamed.is_empty() {
            println!();
        }
        eprintln!("error: {error}");
    }
}

/// Text still to print once the final answer is known.
///
/// The final answer is authoritative: when it extends what was streamed only
/// the tail is printed, otherwise it is printed in full on a fresh line.
pub fn completion_suffix<'a>(streamed: &str, answer: &'a str) -> std::borrow::Cow<'a, str> {
    if streamed.is_empty() {
        return answer.into();
    }
    match answer.strip_prefix(streamed) {
        Some(tail) => tail.into(),
        None if answer.is_empty() => "".into(),
        None => format!("\n{answer}").into(),
    }
}

/// One line per retrieved source: rank, score, then title and url when the
/// payload has them.
pub fn source_line(rank: usize, entry: &ContextEntry) -> String {
    let mut line = format!("[{rank}] {:.2}", entry.score);
    if let Some(title) = entry.payload_str("title") {
        line.push(' ');
        line.push_str(title);
    }
    if let Some(url) = entry.payload_str("url") {
        line.push_str(" <");
        line.push_str(url);
        line.push('>');
    }
    line
}
