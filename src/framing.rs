// src/framing.rs
//
// Line reassembly for the newline-delimited bridge stream.
//
// The transport hands back arbitrarily-sized byte chunks; a frame line can be
// split across any number of physical reads. The reassembler accumulates text
// and emits each complete segment before a '\n', keeping the trailing partial
// segment for the next read.

/// Stateful line reassembler.
///
/// Bytes are decoded permissively (invalid UTF-8 sequences are replaced, not
/// fatal). The accumulator is bounded: a peer that never sends a newline
/// cannot grow it past `max_line_len` — the buffered text is dropped instead.
pub struct LineReassembler {
    buffer: String,
    max_line_len: usize,
}

impl LineReassembler {
    pub fn new(max_line_len: usize) -> Self {
        LineReassembler {
            buffer: String::new(),
            max_line_len,
        }
    }

    /// Feed raw bytes from the transport.
    /// Returns every complete line (without its newline; trailing '\r' is
    /// stripped for CRLF peers).
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let segment: String = self.buffer.drain(..=pos).collect();
            lines.push(
                segment
                    .trim_end_matches('\n')
                    .trim_end_matches('\r')
                    .to_string(),
            );
        }

        // Bound the accumulator against a peer that never sends newlines.
        if self.buffer.len() > self.max_line_len {
            tlog!(
                "[framing] dropping {} buffered bytes without a newline",
                self.buffer.len()
            );
            self.buffer.clear();
        }

        lines
    }

    /// Text buffered since the last newline.
    pub fn pending(&self) -> &str {
        &self.buffer
    }
}
