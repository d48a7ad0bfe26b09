//! Classifies the next PDU on a byte stream from its first 1-4 bytes.
//!
//! Three framings share the wire: TPKT (ISO transport-service-over-TCP,
//! `0x03 0x00 <len:16 be>`), RDP Fast-Path (`<hdr> <len:7/15>`), and the
//! ASN.1 DER `TSRequest` SEQUENCE used by CredSSP (`0x30 <len>`). None of
//! the three payloads are decoded here — only enough of the header to know
//! how many more bytes make up one complete PDU.

use thiserror::Error;

/// Which of the three framings [`find_size`] recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Tpkt,
    FastPath,
    TsRequest,
}

/// The framing recognized plus the PDU's total declared length, header included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub framing: Framing,
    pub length: usize,
}

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("unrecognized PDU framing (first byte 0x{0:02x})")]
    UnrecognizedHeader(u8),
    #[error("TSRequest length encoding uses more than 2 length octets")]
    TsRequestLengthTooWide,
}

/// Finds the next PDU's framing and total length by reading the first few
/// bytes of `bytes`.
///
/// Returns `Ok(None)` when not enough bytes are buffered yet to decide —
/// callers should read more and try again. Returns `Err` only once enough
/// header bytes are present to be certain the framing is not recognizable.
pub fn find_size(bytes: &[u8]) -> Result<Option<FrameInfo>, FramingError> {
    let Some(&first) = bytes.first() else {
        return Ok(None);
    };

    match first {
        0x03 => find_tpkt_size(bytes),
        0x30 => find_ts_request_size(bytes),
        _ => find_fast_path_size(bytes),
    }
}

/// `03 00 LL_hi LL_lo ...` — total length is the big-endian u16 at bytes [2..4].
fn find_tpkt_size(bytes: &[u8]) -> Result<Option<FrameInfo>, FramingError> {
    const HEADER_SIZE: usize = 4;

    if bytes.len() < HEADER_SIZE {
        return Ok(None);
    }

    let length = u16::from_be_bytes([bytes[2], bytes[3]]);

    Ok(Some(FrameInfo {
        framing: Framing::Tpkt,
        length: usize::from(length),
    }))
}

/// `XX LL ...` (short, `LL` bit 7 clear) or `XX LL_hi LL_lo ...` (long, `LL_hi` bit 7 set).
fn find_fast_path_size(bytes: &[u8]) -> Result<Option<FrameInfo>, FramingError> {
    if bytes.len() < 2 {
        return Ok(None);
    }

    let a = bytes[1];

    let length = if a & 0x80 != 0 {
        if bytes.len() < 3 {
            return Ok(None);
        }
        let b = bytes[2];
        (usize::from(a & 0x7f) << 8) | usize::from(b)
    } else {
        usize::from(a)
    };

    Ok(Some(FrameInfo {
        framing: Framing::FastPath,
        length,
    }))
}

/// `30 LL ...` (`LL < 0x80`, total = LL + 2), `30 81 LL ...` (total = LL + 3),
/// or `30 82 LL_hi LL_lo ...` (total = LL_hi*256 + LL_lo + 4). Any other
/// length-octet count is a protocol error: this recognizer only supports the
/// one- and two-octet extended length forms CredSSP's `TSRequest` ever uses.
fn find_ts_request_size(bytes: &[u8]) -> Result<Option<FrameInfo>, FramingError> {
    if bytes.len() < 2 {
        return Ok(None);
    }

    let a = bytes[1];

    if a & 0x80 == 0 {
        return Ok(Some(FrameInfo {
            framing: Framing::TsRequest,
            length: usize::from(a) + 2,
        }));
    }

    match a & 0x7f {
        1 => {
            if bytes.len() < 3 {
                return Ok(None);
            }
            let len = bytes[2];
            Ok(Some(FrameInfo {
                framing: Framing::TsRequest,
                length: usize::from(len) + 3,
            }))
        }
        2 => {
            if bytes.len() < 4 {
                return Ok(None);
            }
            let len = u16::from_be_bytes([bytes[2], bytes[3]]);
            Ok(Some(FrameInfo {
                framing: Framing::TsRequest,
                length: usize::from(len) + 4,
            }))
        }
        _ => Err(FramingError::TsRequestLengthTooWide),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tpkt_header_only() {
        let info = find_size(&[0x03, 0x00, 0x00, 0x04]).unwrap().unwrap();
        assert_eq!(info.framing, Framing::Tpkt);
        assert_eq!(info.length, 4);
    }

    #[test]
    fn tpkt_waits_for_full_header() {
        assert_eq!(find_size(&[0x03, 0x00, 0x00]).unwrap(), None);
    }

    #[test]
    fn fast_path_short() {
        let info = find_size(&[0x00, 0x08]).unwrap().unwrap();
        assert_eq!(info.framing, Framing::FastPath);
        assert_eq!(info.length, 8);
    }

    #[test]
    fn fast_path_long() {
        let info = find_size(&[0x80, 0x02, 0x00]).unwrap().unwrap();
        assert_eq!(info.framing, Framing::FastPath);
        assert_eq!(info.length, 512);
    }

    #[test]
    fn ts_request_short_form() {
        let info = find_size(&[0x30, 0x05]).unwrap().unwrap();
        assert_eq!(info.framing, Framing::TsRequest);
        assert_eq!(info.length, 7);
    }

    #[test]
    fn ts_request_one_length_octet() {
        let info = find_size(&[0x30, 0x81, 0x80]).unwrap().unwrap();
        assert_eq!(info.length, 131);
    }

    #[test]
    fn ts_request_two_length_octets() {
        let info = find_size(&[0x30, 0x82, 0x01, 0x00]).unwrap().unwrap();
        assert_eq!(info.length, 260);
    }

    #[test]
    fn ts_request_rejects_wide_length_encoding() {
        let err = find_size(&[0x30, 0x83, 0x01, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, FramingError::TsRequestLengthTooWide));
    }

    #[test]
    fn empty_buffer_needs_more() {
        assert_eq!(find_size(&[]).unwrap(), None);
    }
}
