//! Line splitting for child process output
//!
//! yt-dlp redraws its progress bar in place with `\r` and ends ordinary log
//! lines with `\n`, so both bytes are treated as line boundaries. Reads can stop
//! anywhere, including in the middle of a line; incomplete fragments stay
//! buffered until the next delimiter or end of stream.

use bytes::{Bytes, BytesMut};
use std::borrow::Cow;
use tokio::io::AsyncRead;
use tokio_util::codec::{Decoder, FramedRead};

/// Longest fragment buffered without a delimiter before it is emitted as-is
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Byte that ended a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTerminator {
    Newline,
    CarriageReturn,
}

impl LineTerminator {
    pub fn as_byte(&self) -> u8 {
        match self {
            LineTerminator::Newline => b'\n',
            LineTerminator::CarriageReturn => b'\r',
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'\n' => Some(LineTerminator::Newline),
            b'\r' => Some(LineTerminator::CarriageReturn),
            _ => None,
        }
    }
}

/// One line of process output, without its delimiter
///
/// `terminator` is `None` for the trailing fragment flushed at end of stream
/// and for fragments cut at the maximum line length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub bytes: Bytes,
    pub terminator: Option<LineTerminator>,
}

impl OutputLine {
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    pub fn is_blank(&self) -> bool {
        self.bytes.iter().all(|b| b.is_ascii_whitespace())
    }

    /// The exact bytes this line occupied in the stream
    pub fn to_raw(&self) -> Vec<u8> {
        let mut raw = self.bytes.to_vec();
        if let Some(terminator) = self.terminator {
            raw.push(terminator.as_byte());
        }
        raw
    }
}

/// [`Decoder`] yielding [`OutputLine`]s split on `\n` or `\r`
#[derive(Debug, Clone)]
pub struct OutputLineCodec {
    /// Where the delimiter search resumes; bytes before it are known delimiter-free
    next_index: usize,
    max_length: usize,
}

impl OutputLineCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length: max_length.max(1),
        }
    }
}

impl Default for OutputLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for OutputLineCodec {
    type Item = OutputLine;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<OutputLine>, Self::Error> {
        let search_from = self.next_index.min(buf.len());
        let found = buf[search_from..]
            .iter()
            .position(|b| *b == b'\n' || *b == b'\r')
            .map(|offset| search_from + offset);

        match found {
            Some(index) => {
                let mut line = buf.split_to(index + 1);
                let terminator = LineTerminator::from_byte(line[index]);
                line.truncate(index);
                self.next_index = 0;
                Ok(Some(OutputLine {
                    bytes: line.freeze(),
                    terminator,
                }))
            }
            None if buf.len() >= self.max_length => {
                self.next_index = 0;
                let chunk = buf.split_to(self.max_length);
                Ok(Some(OutputLine {
                    bytes: chunk.freeze(),
                    terminator: None,
                }))
            }
            None => {
                self.next_index = buf.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<OutputLine>, Self::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        self.next_index = 0;
        let rest = buf.split_to(buf.len());
        Ok(Some(OutputLine {
            bytes: rest.freeze(),
            terminator: None,
        }))
    }
}

/// Lazily splits `reader` into lines. Each call starts a fresh sequence.
pub fn output_lines<R: AsyncRead>(reader: R) -> FramedRead<R, OutputLineCodec> {
    FramedRead::new(reader, OutputLineCodec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use pretty_assertions::assert_eq;

    fn texts(lines: &[OutputLine]) -> Vec<String> {
        lines.iter().map(|l| l.text().into_owned()).collect()
    }

    /// Feeds `input` to a codec in chunks of `chunk` bytes, then flushes.
    fn decode_in_chunks(input: &[u8], chunk: usize, codec: &mut OutputLineCodec) -> Vec<OutputLine> {
        let mut buf = BytesMut::new();
        let mut lines = Vec::new();
        for piece in input.chunks(chunk.max(1)) {
            buf.extend_from_slice(piece);
            while let Some(line) = codec.decode(&mut buf).unwrap() {
                lines.push(line);
            }
        }
        while let Some(line) = codec.decode_eof(&mut buf).unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_splits_on_both_delimiters() {
        let input = b"[info] abc\nPROGRESS:  10.0%\rPROGRESS:  20.0%\rdone\n";
        let lines = decode_in_chunks(input, input.len(), &mut OutputLineCodec::new());
        assert_eq!(
            texts(&lines),
            vec!["[info] abc", "PROGRESS:  10.0%", "PROGRESS:  20.0%", "done"]
        );
        assert_eq!(lines[1].terminator, Some(LineTerminator::CarriageReturn));
        assert_eq!(lines[3].terminator, Some(LineTerminator::Newline));
    }

    #[test]
    fn test_buffers_partial_lines_across_reads() {
        let mut codec = OutputLineCodec::new();
        let mut buf = BytesMut::from(&b"PROGRESS:  4"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"2.5% of 3.1MiB\nPROG");
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(line.text(), "PROGRESS:  42.5% of 3.1MiB");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(&buf[..], b"PROG");
    }

    #[test]
    fn test_flushes_trailing_fragment_at_eof() {
        let lines = decode_in_chunks(b"first\nno newline at end", 4, &mut OutputLineCodec::new());
        assert_eq!(texts(&lines), vec!["first", "no newline at end"]);
        assert_eq!(lines[1].terminator, None);
    }

    #[test]
    fn test_crlf_yields_empty_line() {
        let lines = decode_in_chunks(b"a\r\nb", 1, &mut OutputLineCodec::new());
        assert_eq!(texts(&lines), vec!["a", "", "b"]);
        assert!(lines[1].is_blank());
    }

    #[test]
    fn test_round_trip_at_every_split_size() {
        let input: &[u8] =
            b"[youtube] abc: Downloading webpage\n\rPROGRESS:   0.5% of 10.00MiB\rPROGRESS:  50.0% of 10.00MiB\r\n\
              \xd0\x9f\xd1\x80\xd0\xb8\n\n\rPROGRESS: 100.0% of 10.00MiB\n[Merger] tail";
        for chunk in 1..=input.len() {
            let lines = decode_in_chunks(input, chunk, &mut OutputLineCodec::new());
            let rebuilt: Vec<u8> = lines.iter().flat_map(|l| l.to_raw()).collect();
            assert_eq!(rebuilt, input, "chunk size {}", chunk);
        }
    }

    #[test]
    fn test_oversized_fragment_is_cut_without_loss() {
        let input = b"abcdefghij\nk";
        let lines = decode_in_chunks(input, 3, &mut OutputLineCodec::with_max_length(4));
        let rebuilt: Vec<u8> = lines.iter().flat_map(|l| l.to_raw()).collect();
        assert_eq!(rebuilt, input.to_vec());
        assert!(lines.iter().all(|l| l.bytes.len() <= 4));
    }

    #[tokio::test]
    async fn test_output_lines_over_async_reader() {
        let reader: &[u8] = b"one\rtwo\nthree";
        let lines: Vec<OutputLine> = output_lines(reader)
            .map(|line| line.unwrap())
            .collect()
            .await;
        assert_eq!(texts(&lines), vec!["one", "two", "three"]);
    }
}
