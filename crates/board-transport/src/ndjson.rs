//! Line reassembly for newline-delimited JSON bodies.

use tracing::warn;

/// Default cap for a single line. A board stream line is a few kilobytes at most.
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Buffers raw chunks and yields complete lines one at a time.
///
/// Lines are returned as raw bytes. Decoding is left to the JSON parser, so a
/// multi-byte character cut between two chunks is only seen whole, and a line
/// that is not valid UTF-8 is rejected rather than patched up.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    max_line_bytes: usize,
    /// Dropping the rest of an oversized line until the next newline.
    discarding: bool,
}

impl LineBuffer {
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_line_bytes,
            discarding: false,
        }
    }

    pub fn push(&mut self, mut chunk: &[u8]) {
        if self.discarding {
            match chunk.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    self.discarding = false;
                    chunk = &chunk[pos + 1..];
                }
                None => return,
            }
        }
        self.buf.extend_from_slice(chunk);
    }

    /// Next complete line, without its terminator (`\n` or `\r\n`).
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let Some(pos) = self.buf.iter().position(|b| *b == b'\n') else {
            if self.buf.len() > self.max_line_bytes {
                warn!(
                    "Dropping stream line longer than {} bytes",
                    self.max_line_bytes
                );
                self.buf.clear();
                self.discarding = true;
            }
            return None;
        };
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(line)
    }

    /// Unterminated tail left when the body ends.
    pub fn take_remainder(&mut self) -> Option<Vec<u8>> {
        if self.discarding || self.buf.is_empty() {
            self.buf.clear();
            return None;
        }
        Some(std::mem::take(&mut self.buf))
    }

    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(buffer: &mut LineBuffer) -> Vec<Vec<u8>> {
        std::iter::from_fn(|| buffer.next_line()).collect()
    }

    #[test]
    fn splits_lines_within_one_chunk() {
        let mut buffer = LineBuffer::default();
        buffer.push(b"{\"a\":1}\n{\"b\":2}\n");
        assert_eq!(drain(&mut buffer), vec![b"{\"a\":1}".to_vec(), b"{\"b\":2}".to_vec()]);
        assert_eq!(buffer.pending_bytes(), 0);
    }

    #[test]
    fn reassembles_line_across_chunks() {
        let mut buffer = LineBuffer::default();
        buffer.push(b"{\"moves\":\"e2");
        assert_eq!(buffer.next_line(), None);
        buffer.push(b"e4\"}\n{\"next\"");
        assert_eq!(buffer.next_line().as_deref(), Some(&b"{\"moves\":\"e2e4\"}"[..]));
        assert_eq!(buffer.next_line(), None);
        assert_eq!(buffer.take_remainder().as_deref(), Some(&b"{\"next\""[..]));
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let text = "{\"text\":\"échec\"}\n".as_bytes();
        let mut buffer = LineBuffer::default();
        // Cut inside the two-byte 'é'.
        buffer.push(&text[..10]);
        buffer.push(&text[10..]);
        let line = buffer.next_line().unwrap();
        assert_eq!(std::str::from_utf8(&line).unwrap(), "{\"text\":\"échec\"}");
    }

    #[test]
    fn strips_carriage_return_and_keeps_blank_lines() {
        let mut buffer = LineBuffer::default();
        buffer.push(b"\n{\"a\":1}\r\n");
        assert_eq!(drain(&mut buffer), vec![Vec::new(), b"{\"a\":1}".to_vec()]);
    }

    #[test]
    fn oversized_line_is_dropped_until_next_newline() {
        let mut buffer = LineBuffer::new(8);
        buffer.push(b"0123456789abc");
        assert_eq!(buffer.next_line(), None);
        buffer.push(b"def\n{\"ok\":1}\n");
        assert_eq!(drain(&mut buffer), vec![b"{\"ok\":1}".to_vec()]);
    }

    #[test]
    fn invalid_utf8_is_passed_through_untouched() {
        let mut buffer = LineBuffer::default();
        buffer.push(b"{\"s\":\"ab\xffcd\"}\n");
        assert_eq!(buffer.next_line().unwrap(), b"{\"s\":\"ab\xffcd\"}".to_vec());
    }

    #[test]
    fn empty_remainder_is_none() {
        let mut buffer = LineBuffer::default();
        buffer.push(b"{}\n");
        assert!(buffer.next_line().is_some());
        assert_eq!(buffer.take_remainder(), None);
    }
}
