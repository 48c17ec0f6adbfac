//! Reassembles the engine's raw output chunks into complete lines.
//!
//! Pipe reads split the stream at arbitrary byte boundaries; a trailing
//! partial line is carried over and prepended to the next chunk. Chunking is
//! observationally transparent: for any split of the stream into chunks, the
//! emitted lines are exactly the full stream split on `\n`.

/// Accumulates bytes and yields complete, trimmed lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and iterates over the lines it completes.
    ///
    /// Lines are yielded trimmed (this also strips a `\r` before the
    /// terminator). An unterminated tail stays buffered for the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Lines<'_> {
        self.buf.extend_from_slice(chunk);
        Lines { buf: &mut self.buf }
    }

    /// Emits the remaining partial line, if any, at stream close.
    pub fn flush(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        let line = String::from_utf8_lossy(&rest).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

pub struct Lines<'a> {
    buf: &'a mut Vec<u8>,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.buf.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&raw).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn collect(buffer: &mut LineBuffer, chunk: &[u8]) -> Vec<String> {
        buffer.feed(chunk).collect()
    }

    #[test]
    fn single_chunk_single_line() {
        let mut buffer = LineBuffer::new();
        assert_eq!(collect(&mut buffer, b"uciok\n"), vec!["uciok"]);
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn partial_line_carries_across_chunks() {
        let mut buffer = LineBuffer::new();
        assert_eq!(collect(&mut buffer, b"best"), Vec::<String>::new());
        assert_eq!(collect(&mut buffer, b"move e2e4\nrea"), vec!["bestmove e2e4"]);
        assert_eq!(collect(&mut buffer, b"dyok\n"), vec!["readyok"]);
    }

    #[test]
    fn crlf_is_trimmed() {
        let mut buffer = LineBuffer::new();
        assert_eq!(collect(&mut buffer, b"uciok\r\nreadyok\r\n"), vec!["uciok", "readyok"]);
    }

    #[test]
    fn flush_emits_unterminated_tail() {
        let mut buffer = LineBuffer::new();
        assert_eq!(collect(&mut buffer, b"bestmove e2e4"), Vec::<String>::new());
        assert_eq!(buffer.flush(), Some("bestmove e2e4".to_string()));
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn flush_drops_whitespace_only_tail() {
        let mut buffer = LineBuffer::new();
        let _ = collect(&mut buffer, b"  \r");
        assert_eq!(buffer.flush(), None);
    }

    #[test]
    fn empty_lines_are_preserved() {
        let mut buffer = LineBuffer::new();
        assert_eq!(collect(&mut buffer, b"a\n\nb\n"), vec!["a", "", "b"]);
    }

    proptest! {
        /// Chunk boundaries must not be observable in the output.
        #[test]
        fn chunking_is_transparent(
            stream in "[a-z0-9 \\r\\n]{0,200}",
            cuts in prop::collection::vec(0usize..=200, 0..8),
        ) {
            let bytes = stream.as_bytes();
            let mut cuts: Vec<usize> = cuts.into_iter().map(|c| c.min(bytes.len())).collect();
            cuts.sort_unstable();

            let mut buffer = LineBuffer::new();
            let mut got = Vec::new();
            let mut start = 0;
            for cut in cuts.into_iter().chain(std::iter::once(bytes.len())) {
                got.extend(buffer.feed(&bytes[start..cut]));
                start = cut;
            }
            got.extend(buffer.flush());

            let mut want: Vec<String> =
                stream.split('\n').map(|l| l.trim().to_string()).collect();
            // the reference split always has a final segment; an empty
            // unterminated tail is not a line
            if want.last().map(|l| l.is_empty()).unwrap_or(false) {
                want.pop();
            }
            prop_assert_eq!(got, want);
        }
    }
}
