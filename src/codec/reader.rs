//! Position-tracking reader over a packed wire buffer, matching operations
//! one-for-one with [`crate::codec::builder::Builder`]'s puts.

use crate::error::{Result, SimConnectError};

/// A read-only, position-tracking view over a byte buffer.
///
/// Every `read_*` advances the position by exactly the size written by the
/// corresponding `put_*`. Reading past the end of the buffer surfaces as
/// [`SimConnectError::MalformedFrame`] rather than panicking, since a short
/// buffer here always traces back to a frame whose declared size didn't
/// match its payload.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Wraps `buf` for sequential reading starting at offset 0.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current read offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes remaining to be read.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(SimConnectError::MalformedFrame {
                declared: (self.pos + n) as u32,
                actual: self.buf.len() as u32,
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_ne_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_ne_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    /// Reads exactly `n` bytes and trims trailing NULs, matching the
    /// fixed-width string convention a matching `put_stringn` produced.
    pub fn read_stringn(&mut self, n: usize) -> Result<String> {
        let bytes = self.take(n)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Reads bytes up to and including the next NUL terminator, returning
    /// the bytes before it as a string.
    pub fn read_string_v(&mut self) -> Result<String> {
        let start = self.pos;
        let rel_end = self.buf[start..]
            .iter()
            .position(|&b| b == 0)
            .ok_or(SimConnectError::MalformedFrame {
                declared: (start + 1) as u32,
                actual: self.buf.len() as u32,
            })?;
        let s = String::from_utf8_lossy(&self.buf[start..start + rel_end]).into_owned();
        self.pos = start + rel_end + 1;
        Ok(s)
    }

    /// Reads a lat/lon/alt composite as three packed `f64`s.
    pub fn read_lat_lon_alt(&mut self) -> Result<(f64, f64, f64)> {
        Ok((self.read_f64()?, self.read_f64()?, self.read_f64()?))
    }

    /// Reads an x/y/z composite as three packed `f64`s.
    pub fn read_xyz(&mut self) -> Result<(f64, f64, f64)> {
        Ok((self.read_f64()?, self.read_f64()?, self.read_f64()?))
    }

    /// Reads a pitch/bank/heading composite as three packed `f64`s.
    pub fn read_pbh(&mut self) -> Result<(f64, f64, f64)> {
        Ok((self.read_f64()?, self.read_f64()?, self.read_f64()?))
    }

    /// Reads exactly `n` raw bytes, for getter/setter-bound fields whose
    /// accessor knows how to interpret them itself.
    pub fn read_raw(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }
}

#[cfg(test)]
mod tests {
    use super::super::builder::Builder;
    use super::*;

    #[test]
    fn round_trips_mixed_mappable_record() {
        let mut b = Builder::new();
        b.put_i32(1234);
        b.put_i64(0x123456789ABCDEF0u64 as i64);
        b.put_f32(3.14);
        b.put_f64(2.718281828459);
        b.put_stringn("ABC", 8);

        let bytes = b.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_i32().unwrap(), 1234);
        assert_eq!(r.read_i64().unwrap(), 0x123456789ABCDEF0u64 as i64);
        assert_eq!(r.read_f32().unwrap(), 3.14);
        assert_eq!(r.read_f64().unwrap(), 2.718281828459);
        assert_eq!(r.read_stringn(8).unwrap(), "ABC");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn round_trips_non_mappable_record_with_variable_string() {
        let mut b = Builder::new();
        b.put_string_v("Cessna 404 Titan");
        b.put_stringn("PH-BLA", 32);
        b.put_stringn("PH-BLA", 64);
        b.put_lat_lon_alt(52.383917, 5.277781, 10000.0);
        b.put_lat_lon_alt(52.37278, 4.89361, 7.0);

        let bytes = b.into_bytes();
        assert_eq!(bytes.len(), 17 + 32 + 64 + 24 + 24);

        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_string_v().unwrap(), "Cessna 404 Titan");
        assert_eq!(r.read_stringn(32).unwrap(), "PH-BLA");
        assert_eq!(r.read_stringn(64).unwrap(), "PH-BLA");
        assert_eq!(
            r.read_lat_lon_alt().unwrap(),
            (52.383917, 5.277781, 10000.0)
        );
        assert_eq!(r.read_lat_lon_alt().unwrap(), (52.37278, 4.89361, 7.0));
    }

    #[test]
    fn short_buffer_is_malformed_frame_not_a_panic() {
        let mut r = Reader::new(&[0u8; 2]);
        let err = r.read_i32().unwrap_err();
        assert!(matches!(err, SimConnectError::MalformedFrame { .. }));
    }
}
