//! OSC messages framed for TCP with a 4-byte big-endian length prefix.
//!
//! Frame layout:
//!   [u32 length of everything after this field]
//!   [address, NUL terminated, padded to 4]
//!   [type tags starting with ',', NUL terminated, padded to 4]
//!   [arguments in tag order: i32 BE | f32 BE | padded string]

use std::io;

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::common::errors::ControlError;

/// Frames declaring more than this are treated as stream corruption.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

const MIN_PACKET_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum OscError {
    #[error("packet too short: {0} bytes")]
    TooShort(usize),
    #[error("declared length {declared} does not match {actual} remaining bytes")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("declared length {0} is not a multiple of 4")]
    Misaligned(usize),
    #[error("address is not NUL terminated")]
    MissingAddress,
    #[error("frame of {0} bytes exceeds the 1 MiB limit")]
    FrameTooLarge(usize),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<OscError> for ControlError {
    fn from(e: OscError) -> Self {
        ControlError::Protocol(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Int(i32),
    Float(f32),
    Str(String),
}

impl OscArg {
    fn tag(&self) -> u8 {
        match self {
            Self::Int(_) => b'i',
            Self::Float(_) => b'f',
            Self::Str(_) => b's',
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i32> for OscArg {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for OscArg {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for OscArg {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for OscArg {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    pub fn new(address: impl Into<String>, args: Vec<OscArg>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    /// Encodes the message including its length prefix.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf.freeze()
    }

    pub fn encode_into(&self, dst: &mut BytesMut) {
        let mut body = BytesMut::new();
        put_padded_str(&mut body, self.address.as_bytes());

        let mut tags = Vec::with_capacity(self.args.len() + 1);
        tags.push(b',');
        tags.extend(self.args.iter().map(OscArg::tag));
        put_padded_str(&mut body, &tags);

        for arg in &self.args {
            match arg {
                OscArg::Int(v) => body.put_i32(*v),
                OscArg::Float(v) => body.put_f32(*v),
                OscArg::Str(s) => put_padded_str(&mut body, s.as_bytes()),
            }
        }

        dst.reserve(4 + body.len());
        dst.put_u32(body.len() as u32);
        dst.extend_from_slice(&body);
    }

    /// Decodes one complete length-prefixed packet.
    ///
    /// The prefix and address are validated strictly. Type tags and
    /// arguments are best effort: decoding stops at the first unknown tag
    /// or truncated argument and keeps whatever was read so far.
    pub fn decode(packet: &[u8]) -> Result<Self, OscError> {
        if packet.len() < MIN_PACKET_LEN {
            return Err(OscError::TooShort(packet.len()));
        }

        let declared = BigEndian::read_u32(&packet[..4]) as usize;
        let body = &packet[4..];
        if declared != body.len() {
            return Err(OscError::LengthMismatch {
                declared,
                actual: body.len(),
            });
        }
        if declared % 4 != 0 {
            return Err(OscError::Misaligned(declared));
        }

        let (address, mut offset) = read_padded_str(body, 0).ok_or(OscError::MissingAddress)?;
        let mut args = Vec::new();

        if body.get(offset) == Some(&b',') {
            if let Some((tags, next)) = read_padded_str(body, offset) {
                offset = next;
                for tag in tags.bytes().skip(1) {
                    let Some((arg, next)) = read_arg(body, offset, tag) else {
                        break;
                    };
                    args.push(arg);
                    offset = next;
                }
            }
        }

        Ok(Self { address, args })
    }
}

fn padded_len(raw_len: usize) -> usize {
    (raw_len + 4) & !3
}

fn put_padded_str(dst: &mut BytesMut, raw: &[u8]) {
    dst.extend_from_slice(raw);
    dst.put_bytes(0, padded_len(raw.len()) - raw.len());
}

/// Reads a NUL-terminated string at `offset`; returns it with the offset of
/// the next 4-byte aligned field.
fn read_padded_str(buf: &[u8], offset: usize) -> Option<(String, usize)> {
    let rest = buf.get(offset..)?;
    let nul = rest.iter().position(|&b| b == 0)?;
    let s = String::from_utf8_lossy(&rest[..nul]).into_owned();
    Some((s, (offset + padded_len(nul)).min(buf.len())))
}

fn read_arg(buf: &[u8], offset: usize, tag: u8) -> Option<(OscArg, usize)> {
    match tag {
        b'i' => {
            let raw = buf.get(offset..offset + 4)?;
            Some((OscArg::Int(BigEndian::read_i32(raw)), offset + 4))
        }
        b'f' => {
            let raw = buf.get(offset..offset + 4)?;
            Some((OscArg::Float(BigEndian::read_f32(raw)), offset + 4))
        }
        b's' => read_padded_str(buf, offset).map(|(s, next)| (OscArg::Str(s), next)),
        _ => None,
    }
}

/// Splits a TCP byte stream into OSC messages.
///
/// A malformed frame is yielded as `Some(Err(_))` so the reader can log and
/// skip it. Only an oversized length prefix fails the stream itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct OscCodec;

impl Decoder for OscCodec {
    type Item = Result<OscMessage, OscError>;
    type Error = OscError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }

        let declared = BigEndian::read_u32(&src[..4]) as usize;
        if declared > MAX_FRAME_LEN {
            return Err(OscError::FrameTooLarge(declared));
        }

        let frame_len = 4 + declared;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let frame = src.split_to(frame_len);
        Ok(Some(OscMessage::decode(&frame)))
    }
}

impl Encoder<OscMessage> for OscCodec {
    type Error = OscError;

    fn encode(&mut self, item: OscMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.encode_into(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fire_address_round_trip() {
        let msg = OscMessage::new("/eos/cue/1/fire", vec![]);
        let packet = msg.encode();

        let declared = BigEndian::read_u32(&packet[..4]) as usize;
        assert_eq!(declared, packet.len() - 4);
        // 15 chars + NUL -> 16, ",\0" -> 4
        assert_eq!(declared, 20);
        assert_eq!(declared % 4, 0);

        let decoded = OscMessage::decode(&packet).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn arguments_round_trip() {
        let msg = OscMessage::new(
            "/eos/cmd",
            vec![
                OscArg::from("Record Cue 5 Label Opening Enter"),
                OscArg::Int(-7),
                OscArg::Float(0.5),
            ],
        );
        let decoded = OscMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn padding_lands_on_word_boundaries() {
        for len in 0..9 {
            let address = format!("/{}", "a".repeat(len));
            let packet = OscMessage::new(address, vec![OscArg::from("xyz")]).encode();
            assert_eq!((packet.len() - 4) % 4, 0);
        }
    }

    #[test]
    fn rejects_short_packet() {
        assert!(matches!(
            OscMessage::decode(&[0, 0, 0, 0]),
            Err(OscError::TooShort(4))
        ));
    }

    #[test]
    fn rejects_length_mismatch() {
        let mut packet = OscMessage::new("/eos/ping", vec![]).encode().to_vec();
        packet.push(0);
        assert!(matches!(
            OscMessage::decode(&packet),
            Err(OscError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn rejects_misaligned_length() {
        let packet = [0, 0, 0, 5, b'/', b'a', 0, 0, 0];
        assert!(matches!(
            OscMessage::decode(&packet),
            Err(OscError::Misaligned(5))
        ));
    }

    #[test]
    fn rejects_unterminated_address() {
        let packet = [0, 0, 0, 4, b'/', b'a', b'b', b'c'];
        assert!(matches!(
            OscMessage::decode(&packet),
            Err(OscError::MissingAddress)
        ));
    }

    #[test]
    fn unknown_tag_keeps_earlier_arguments() {
        let mut body = BytesMut::new();
        put_padded_str(&mut body, b"/eos/out/x");
        put_padded_str(&mut body, b",iTi");
        body.put_i32(3);
        body.put_i32(4);

        let mut packet = BytesMut::new();
        packet.put_u32(body.len() as u32);
        packet.extend_from_slice(&body);

        let decoded = OscMessage::decode(&packet).unwrap();
        assert_eq!(decoded.address, "/eos/out/x");
        assert_eq!(decoded.args, vec![OscArg::Int(3)]);
    }

    #[test]
    fn codec_waits_for_complete_frames() {
        let first = OscMessage::new("/eos/out/event/cue/1/5/fire", vec![]);
        let second = OscMessage::new("/eos/out/ping", vec![OscArg::Int(1)]);

        let mut wire = BytesMut::new();
        OscCodec.encode(first.clone(), &mut wire).unwrap();
        OscCodec.encode(second.clone(), &mut wire).unwrap();

        let mut src = BytesMut::from(&wire[..6]);
        assert!(OscCodec.decode(&mut src).unwrap().is_none());

        src.extend_from_slice(&wire[6..]);
        let a = OscCodec.decode(&mut src).unwrap().unwrap().unwrap();
        let b = OscCodec.decode(&mut src).unwrap().unwrap().unwrap();
        assert_eq!(a, first);
        assert_eq!(b, second);
        assert!(src.is_empty());
    }

    #[test]
    fn codec_yields_malformed_frames_without_failing() {
        let mut src = BytesMut::new();
        src.put_u32(4);
        src.extend_from_slice(b"/abc");
        src.extend_from_slice(&OscMessage::new("/ok", vec![]).encode());

        let bad = OscCodec.decode(&mut src).unwrap().unwrap();
        assert!(bad.is_err());
        let good = OscCodec.decode(&mut src).unwrap().unwrap().unwrap();
        assert_eq!(good.address, "/ok");
    }

    #[test]
    fn codec_rejects_oversized_frame() {
        let mut src = BytesMut::new();
        src.put_u32((MAX_FRAME_LEN + 1) as u32);
        assert!(matches!(
            OscCodec.decode(&mut src),
            Err(OscError::FrameTooLarge(_))
        ));
    }
}
