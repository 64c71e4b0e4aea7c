// =============================================================================
// OVERLAY COORDINATOR — frame.rs
// Одна строка = один Envelope (compact JSON не содержит '\n')
// =============================================================================

use bytes::BytesMut;
use std::io;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

/// One application-layer frame read off the byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Line(String),
    /// Line exceeded the length limit; the rest of it is discarded.
    Oversized,
    /// Line was not valid UTF-8.
    Malformed,
}

/// Newline-delimited codec that reports bad lines as frames instead of
/// terminating the stream. Only I/O errors end it.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    lines: LinesCodec,
}

impl FrameCodec {
    pub fn new(max_frame_len: usize) -> Self {
        FrameCodec { lines: LinesCodec::new_with_max_length(max_frame_len) }
    }

    fn lift(res: Result<Option<String>, LinesCodecError>) -> Result<Option<Frame>, io::Error> {
        match res {
            Ok(Some(line)) => Ok(Some(Frame::Line(line))),
            Ok(None) => Ok(None),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(Frame::Oversized)),
            Err(LinesCodecError::Io(e)) if e.kind() == io::ErrorKind::InvalidData => {
                Ok(Some(Frame::Malformed))
            }
            Err(LinesCodecError::Io(e)) => Err(e),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        Self::lift(self.lines.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        Self::lift(self.lines.decode_eof(src))
    }
}

impl Encoder<String> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<(), io::Error> {
        self.lines.encode(line, dst).map_err(|e| match e {
            LinesCodecError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidInput, other),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_lines() {
        let mut codec = FrameCodec::new(64);
        let mut buf = BytesMut::from(&b"{\"a\":1}\n{\"b\":2}\npartial"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Line("{\"a\":1}".into())));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Line("{\"b\":2}".into())));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some(Frame::Line("partial".into())));
    }

    #[test]
    fn test_oversized_line_is_skipped_not_fatal() {
        let mut codec = FrameCodec::new(8);
        let mut buf = BytesMut::from(&b"0123456789abcdef\nok\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Oversized));
        let mut next = None;
        for _ in 0..4 {
            next = codec.decode(&mut buf).unwrap();
            if next.is_some() {
                break;
            }
        }
        assert_eq!(next, Some(Frame::Line("ok".into())));
    }

    #[test]
    fn test_invalid_utf8_is_malformed() {
        let mut codec = FrameCodec::new(64);
        let mut buf = BytesMut::from(&[0xff, 0xfe, b'\n', b'x', b'\n'][..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Malformed));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Line("x".into())));
    }

    #[test]
    fn test_encode_appends_newline() {
        let mut codec = FrameCodec::new(64);
        let mut dst = BytesMut::new();
        codec.encode("{}".to_string(), &mut dst).unwrap();
        assert_eq!(&dst[..], b"{}\n");
    }
}
