//! Framing: length-prefix (4 bytes LE) + bincode envelope tree.

use crate::metadata::{Metadata, Node, ParseError};

const LEN_SIZE: usize = 4;
const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024; // 16 MiB

/// Encode an envelope into a single frame: 4 bytes LE length + bincode tree.
pub fn encode_frame(metadata: &Metadata) -> Result<Vec<u8>, FrameEncodeError> {
    let payload = bincode::serialize(metadata.root()).map_err(FrameEncodeError::Encode)?;
    let len = payload.len() as u32;
    if len > MAX_FRAME_LEN {
        return Err(FrameEncodeError::TooLarge);
    }
    let mut out = Vec::with_capacity(LEN_SIZE + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Error encoding an envelope into a frame (bincode or size limit).
#[derive(Debug, thiserror::Error)]
pub enum FrameEncodeError {
    #[error("encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("frame too large")]
    TooLarge,
}

/// Decode one frame from the front of `bytes`. Returns the envelope (marked
/// read-only) and the number of bytes consumed.
/// Call with partial buffer; returns error if not enough bytes (caller should try again after more data).
pub fn decode_frame(bytes: &[u8]) -> Result<(Metadata, usize), FrameDecodeError> {
    if bytes.len() < LEN_SIZE {
        return Err(FrameDecodeError::NeedMore);
    }
    let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    if len > MAX_FRAME_LEN as usize {
        return Err(FrameDecodeError::TooLarge);
    }
    if bytes.len() < LEN_SIZE + len {
        return Err(FrameDecodeError::NeedMore);
    }
    let root: Node = bincode::deserialize(&bytes[LEN_SIZE..LEN_SIZE + len])
        .map_err(FrameDecodeError::Decode)?;
    let metadata = Metadata::from_node(root).map_err(FrameDecodeError::Envelope)?;
    Ok((metadata, LEN_SIZE + len))
}

/// Error decoding a frame (need more bytes, too large, bincode failure, or
/// an envelope root we do not recognize).
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("need more bytes")]
    NeedMore,
    #[error("frame too large")]
    TooLarge,
    #[error("decode error: {0}")]
    Decode(#[from] bincode::Error),
    #[error("envelope error: {0}")]
    Envelope(#[from] ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Direction, EnvelopeKind};

    fn sample_status() -> Metadata {
        Metadata::status("org.example.Foo", "playing", "svc1", &[("remote", "tv")]).unwrap()
    }

    #[test]
    fn roundtrip_status() {
        let status = sample_status();
        let frame = encode_frame(&status).unwrap();
        let (decoded, n) = decode_frame(&frame).unwrap();
        assert_eq!(n, frame.len());
        assert!(decoded.is_equal(&status));
        assert!(decoded.is_read_only());
    }

    #[test]
    fn roundtrip_invocation() {
        let args = serde_json::json!(true);
        let inv = Metadata::invocation("id-9", "cap", "next", Some(&args), Direction::Response);
        let frame = encode_frame(&inv).unwrap();
        let (decoded, _) = decode_frame(&frame).unwrap();
        assert_eq!(decoded.kind(), EnvelopeKind::Invocation);
        assert_eq!(decoded.invocation_id(), Some("id-9"));
        assert_eq!(decoded.arguments().unwrap(), Some(args));
    }

    #[test]
    fn partial_read_need_more() {
        let frame = encode_frame(&sample_status()).unwrap();
        assert!(matches!(
            decode_frame(&frame[..2]),
            Err(FrameDecodeError::NeedMore)
        ));
        assert!(matches!(
            decode_frame(&frame[..super::LEN_SIZE]),
            Err(FrameDecodeError::NeedMore)
        ));
    }

    #[test]
    fn multiple_messages() {
        let a = sample_status();
        let b = Metadata::message(&[("subject", "hi")]);
        let fa = encode_frame(&a).unwrap();
        let fb = encode_frame(&b).unwrap();
        let mut buf = Vec::new();
        buf.extend_from_slice(&fa);
        buf.extend_from_slice(&fb);
        let (m1, n1) = decode_frame(&buf).unwrap();
        assert_eq!(n1, fa.len());
        let (m2, n2) = decode_frame(&buf[n1..]).unwrap();
        assert_eq!(n2, fb.len());
        assert_eq!(m1.kind(), EnvelopeKind::Status);
        assert_eq!(m2.kind(), EnvelopeKind::Message);
    }

    #[test]
    fn unknown_root_rejected() {
        let node = crate::metadata::Node::new("presence");
        let payload = bincode::serialize(&node).unwrap();
        let mut frame = Vec::new();
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);
        assert!(matches!(
            decode_frame(&frame),
            Err(FrameDecodeError::Envelope(_))
        ));
    }
}
