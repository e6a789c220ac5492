//! # Message Frame
//!
//! Every frame arriving from the transport begins with an opaque header
//! `{size: u32, version: u32, id: u32}` followed by a type-specific payload
//! (§6.2). The core treats messages as a tagged union over `id`; the
//! concrete numeric values of that tag are vendor-specific wire constants
//! bound by a real SDK and are referenced here only abstractly (§1 explicitly
//! keeps them out of scope). [`WellKnown`] collects the handful of ids the
//! core's own logic must recognize regardless of binding — open, quit, and
//! exception frames drive dispatcher-level behaviour rather than being left
//! to a user handler.

use crate::error::{Result, SimConnectError};

/// The wire-visible message-type tag. Concrete values come from the host
/// SDK this crate is eventually linked against; the core never hardcodes
/// more of them than it must reason about itself.
pub type MessageTypeId = u32;

/// Frame-header-driven ids the dispatcher itself must recognize (§4.6,
/// §5's auto-close, §7's exception channel). Any other id is opaque to the
/// core and is simply routed to the matching handler slot.
pub mod well_known {
    use super::MessageTypeId;

    /// Host accepted the `open` call; carries session/version info.
    pub const OPEN: MessageTypeId = 1;
    /// The simulator is shutting down; triggers auto-close when enabled.
    pub const QUIT: MessageTypeId = 2;
    /// A host-reported exception (§7, Kinds 5 and 6).
    pub const EXCEPTION: MessageTypeId = 3;
}

/// A decoded frame header, with the payload left as an opaque byte slice
/// for the subsystem that owns `id` to interpret.
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    /// Declared total frame size in bytes, header included.
    pub size: u32,
    /// Protocol version the frame was produced under.
    pub version: u32,
    /// The message-type tag.
    pub id: MessageTypeId,
}

/// Size in bytes of the fixed frame header.
pub const HEADER_SIZE: usize = 12;

impl FrameHeader {
    /// Parses the fixed 12-byte header from the front of `buf`.
    ///
    /// Returns [`SimConnectError::MalformedFrame`] when `buf` is too short
    /// to even contain a header, or when the header's declared `size`
    /// exceeds the number of bytes actually supplied — the dispatcher's
    /// `size >= declared frame size` sanity check (§4.6).
    pub fn parse(buf: &[u8]) -> Result<(FrameHeader, &[u8])> {
        if buf.len() < HEADER_SIZE {
            return Err(SimConnectError::MalformedFrame {
                declared: HEADER_SIZE as u32,
                actual: buf.len() as u32,
            });
        }
        let size = u32::from_ne_bytes(buf[0..4].try_into().unwrap());
        let version = u32::from_ne_bytes(buf[4..8].try_into().unwrap());
        let id = u32::from_ne_bytes(buf[8..12].try_into().unwrap());
        if (size as usize) > buf.len() {
            return Err(SimConnectError::MalformedFrame {
                declared: size,
                actual: buf.len() as u32,
            });
        }
        let header = FrameHeader { size, version, id };
        let payload = &buf[HEADER_SIZE..(size as usize).max(HEADER_SIZE)];
        Ok((header, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u32, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        let size = (HEADER_SIZE + payload.len()) as u32;
        buf.extend_from_slice(&size.to_ne_bytes());
        buf.extend_from_slice(&1u32.to_ne_bytes());
        buf.extend_from_slice(&id.to_ne_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn parses_header_and_payload() {
        let buf = frame(well_known::QUIT, &[0xAA, 0xBB]);
        let (header, payload) = FrameHeader::parse(&buf).unwrap();
        assert_eq!(header.id, well_known::QUIT);
        assert_eq!(header.version, 1);
        assert_eq!(payload, &[0xAA, 0xBB]);
    }

    #[test]
    fn rejects_buffer_shorter_than_header() {
        let err = FrameHeader::parse(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, SimConnectError::MalformedFrame { .. }));
    }

    #[test]
    fn rejects_declared_size_exceeding_buffer() {
        let mut buf = frame(well_known::OPEN, &[1, 2, 3, 4]);
        // Claim a larger size than the buffer actually carries.
        let bogus = (buf.len() as u32) + 100;
        buf[0..4].copy_from_slice(&bogus.to_ne_bytes());
        let err = FrameHeader::parse(&buf).unwrap_err();
        match err {
            SimConnectError::MalformedFrame { declared, actual } => {
                assert_eq!(declared, bogus);
                assert_eq!(actual, buf.len() as u32);
            }
            _ => panic!("expected MalformedFrame"),
        }
    }
}
