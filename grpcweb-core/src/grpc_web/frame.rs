//! # gRPC-Web Framing
//!
//! Every message on a gRPC-Web body is a frame:
//!
//! ```text
//! +------------+----------------------+-----------------+
//! | flags (u8) | length (u32, BE)     | payload         |
//! +------------+----------------------+-----------------+
//! ```
//!
//! * Data frame: flags `0x00` (compression is never used).
//! * Trailer frame: flags with the high bit set (`0x80`), payload made of
//!   `name: value\r\n` lines carrying `grpc-status` and `grpc-message`.
//!
//! The `grpc-web-text` variant base64-encodes whole frames.
//!
//! Parsing here is defensive: a body shorter than its declared length yields whatever
//! bytes are available and is flagged as truncated, it never fails.
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::{BufMut, Bytes, BytesMut};

pub const HEADER_LEN: usize = 5;

const TRAILER_FLAG: u8 = 0x80;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Invalid grpc-web-text body: '{0}'")]
    InvalidBase64(#[from] base64::DecodeError),
}

/// A single frame read from a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub flags: u8,
    /// Length announced by the frame header, 0 when the header itself is incomplete.
    pub declared_len: usize,
    /// Bytes actually available, at most `declared_len`.
    pub payload: Bytes,
    /// The body ended before the frame did.
    pub truncated: bool,
}

impl Frame {
    pub fn is_trailer(&self) -> bool {
        self.flags & TRAILER_FLAG != 0
    }
}

/// Wraps `payload` in an uncompressed data frame.
pub fn frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u8(0);
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(payload);
    buf.freeze()
}

/// Reads the first frame of `body`.
///
/// A body shorter than the 5-byte header yields an empty, truncated frame.
pub fn unframe(body: &Bytes) -> Frame {
    read_frame(body, 0).map(|(frame, _)| frame).unwrap_or_else(|| Frame {
        flags: body.first().copied().unwrap_or_default(),
        declared_len: 0,
        payload: Bytes::new(),
        truncated: true,
    })
}

/// Reads every complete header in `body`. The last frame may be truncated; trailing bytes
/// too short to hold a header are dropped.
pub fn frames(body: &Bytes) -> Vec<Frame> {
    let mut frames = Vec::new();
    let mut offset = 0;

    while let Some((frame, next)) = read_frame(body, offset) {
        frames.push(frame);
        offset = next;
    }

    frames
}

fn read_frame(body: &Bytes, offset: usize) -> Option<(Frame, usize)> {
    let header = body.get(offset..offset + HEADER_LEN)?;
    let flags = header[0];
    let declared_len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;

    let start = offset + HEADER_LEN;
    let end = start.saturating_add(declared_len).min(body.len());

    let payload = body.slice(start..end);
    let frame = Frame {
        flags,
        declared_len,
        truncated: payload.len() < declared_len,
        payload,
    };

    Some((frame, end))
}

/// Base64 encodes a framed body for the `grpc-web-text` content type.
pub fn encode_text(framed: &[u8]) -> String {
    STANDARD.encode(framed)
}

/// Decodes a `grpc-web-text` body.
///
/// Servers may encode each frame separately, producing several padded base64 chunks back
/// to back, so the input is split after every padded quantum. Whitespace is ignored.
pub fn decode_text(body: &[u8]) -> Result<Bytes, FrameError> {
    let compact: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    let mut decoded = Vec::with_capacity(compact.len() / 4 * 3);
    let mut chunk_start = 0;

    for (index, quantum) in compact.chunks(4).enumerate() {
        if quantum.contains(&b'=') {
            let chunk_end = (index + 1) * 4;
            STANDARD.decode_vec(&compact[chunk_start..chunk_end], &mut decoded)?;
            chunk_start = chunk_end;
        }
    }

    if chunk_start < compact.len() {
        STANDARD.decode_vec(&compact[chunk_start..], &mut decoded)?;
    }

    Ok(Bytes::from(decoded))
}

/// `grpc-status` and `grpc-message` as carried by a trailer frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trailers {
    pub status: Option<String>,
    pub message: Option<String>,
}

impl Trailers {
    /// Parses `name: value` lines. Names are case-insensitive; other entries are ignored.
    pub fn parse(payload: &[u8]) -> Self {
        let text = String::from_utf8_lossy(payload);
        let mut trailers = Self::default();

        for line in text.lines() {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim().to_string();

            match name.trim().to_ascii_lowercase().as_str() {
                "grpc-status" => trailers.status = Some(value),
                "grpc-message" => trailers.message = Some(value),
                _ => {}
            }
        }

        trailers
    }

    /// Finds and parses the first trailer frame of a body.
    pub fn from_body(body: &Bytes) -> Option<Self> {
        frames(body)
            .into_iter()
            .find(Frame::is_trailer)
            .map(|frame| Self::parse(&frame.payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_payload_with_header() {
        let framed = frame(b"abc");
        assert_eq!(&framed[..], &[0, 0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn frame_round_trip() {
        for payload in [&b""[..], &b"x"[..], &[0u8; 300][..]] {
            let frame = unframe(&frame(payload));
            assert_eq!(&frame.payload[..], payload);
            assert!(!frame.truncated);
            assert!(!frame.is_trailer());
        }
    }

    #[test]
    fn large_lengths_are_big_endian() {
        let payload = vec![7u8; 0x0102];
        let framed = frame(&payload);
        assert_eq!(&framed[1..5], &[0, 0, 0x01, 0x02]);
    }

    #[test]
    fn short_body_yields_empty_payload() {
        let frame = unframe(&Bytes::from_static(&[0, 0, 0]));
        assert!(frame.payload.is_empty());
        assert!(frame.truncated);

        assert!(unframe(&Bytes::new()).payload.is_empty());
    }

    #[test]
    fn truncated_payload_returns_available_bytes() {
        let body = Bytes::from_static(&[0, 0, 0, 0, 10, b'h', b'i']);
        let frame = unframe(&body);

        assert_eq!(&frame.payload[..], b"hi");
        assert_eq!(frame.declared_len, 10);
        assert!(frame.truncated);
    }

    #[test]
    fn huge_declared_length_does_not_overflow() {
        let body = Bytes::from_static(&[0, 0xff, 0xff, 0xff, 0xff, 1]);
        assert_eq!(&unframe(&body).payload[..], &[1]);
    }

    #[test]
    fn text_round_trip() {
        let framed = frame(b"\x00\xffbinary\x10");
        let text = encode_text(&framed);
        assert_eq!(decode_text(text.as_bytes()).unwrap(), framed);
    }

    #[test]
    fn decodes_concatenated_padded_chunks() {
        let data = frame(b"ab");
        let trailer = [&[0x80u8, 0, 0, 0, 15][..], &b"grpc-status: 0\r"[..]].concat();
        let body = format!("{}{}", encode_text(&data), encode_text(&trailer));

        let decoded = decode_text(body.as_bytes()).unwrap();

        assert_eq!(&decoded[..data.len()], &data[..]);
        assert_eq!(&decoded[data.len()..], &trailer[..]);
    }

    #[test]
    fn invalid_text_is_an_error() {
        assert!(decode_text(b"not base64!").is_err());
    }

    #[test]
    fn reads_data_and_trailer_frames() {
        let trailer_payload = b"grpc-status: 5\r\nGrpc-Message: not%20found\r\n";
        let mut body = frame(b"data").to_vec();
        body.push(0x80);
        body.extend_from_slice(&(trailer_payload.len() as u32).to_be_bytes());
        body.extend_from_slice(trailer_payload);
        let body = Bytes::from(body);

        let frames = frames(&body);
        assert_eq!(frames.len(), 2);
        assert!(frames[1].is_trailer());

        let trailers = Trailers::from_body(&body).unwrap();
        assert_eq!(trailers.status.as_deref(), Some("5"));
        assert_eq!(trailers.message.as_deref(), Some("not%20found"));
    }

    #[test]
    fn body_without_trailer_frame() {
        assert_eq!(Trailers::from_body(&frame(b"data")), None);
    }
}
