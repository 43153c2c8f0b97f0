// SPDX-FileCopyrightText: 2026 KobeAI Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Incremental bytes-to-lines decoding.
//!
//! Network reads split the body at arbitrary byte offsets, including inside a
//! multi-byte UTF-8 sequence and inside a line. [`LineDecoder`] carries both
//! kinds of remainder across reads so the lines it yields do not depend on
//! where the reads were split.

const REPLACEMENT: char = '\u{FFFD}';

/// Turns a sequence of byte chunks into complete lines.
#[derive(Debug, Default)]
pub struct LineDecoder {
    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending_bytes: Vec<u8>,
    /// Decoded text not yet terminated by `\n`.
    partial_line: String,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every line it completed, without the line
    /// terminator (`\n` or `\r\n`).
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending_bytes.extend_from_slice(chunk);
        self.decode_pending();
        self.take_lines()
    }

    /// End of input: return the unterminated last line, if any. Incomplete
    /// UTF-8 left over at this point is replaced with U+FFFD.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending_bytes.is_empty() {
            self.partial_line
                .push_str(&String::from_utf8_lossy(&self.pending_bytes));
            self.pending_bytes.clear();
        }
        let rest = std::mem::take(&mut self.partial_line);
        (!rest.is_empty()).then(|| strip_cr(rest))
    }

    /// Move every decodable byte from `pending_bytes` into `partial_line`.
    fn decode_pending(&mut self) {
        let mut consumed = 0;
        loop {
            let rest = &self.pending_bytes[consumed..];
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    self.partial_line.push_str(text);
                    consumed = self.pending_bytes.len();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&rest[..valid]) {
                        self.partial_line.push_str(text);
                    }
                    match e.error_len() {
                        Some(bad) => {
                            self.partial_line.push(REPLACEMENT);
                            consumed += valid + bad;
                        }
                        None => {
                            // Incomplete sequence at the end; wait for more bytes.
                            consumed += valid;
                            break;
                        }
                    }
                }
            }
        }
        self.pending_bytes.drain(..consumed);
    }

    fn take_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(pos) = self.partial_line.find('\n') {
            let rest = self.partial_line.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.partial_line, rest);
            line.pop();
            lines.push(strip_cr(line));
        }
        lines
    }
}

fn strip_cr(mut line: String) -> String {
    if line.ends_with('\r') {
        line.pop();
    }
    line
}
