//! Wire-order field access and the Internet checksum.
//!
//! Every multi-byte header field goes through the `read_*`/`write_*` helpers, so
//! host/network byte-order conversion happens in exactly one place.

#[must_use]
#[inline]
/// Read a big-endian u16 at `offset`.
pub fn read_be16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

#[must_use]
#[inline]
/// Read a big-endian u32 at `offset`.
pub fn read_be32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

#[inline]
/// Write `value` as a big-endian u16 at `offset`.
pub fn write_be16(data: &mut [u8], offset: usize, value: u16) {
    data[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

#[inline]
/// Write `value` as a big-endian u32 at `offset`.
pub fn write_be32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

/// Running ones'-complement sum over 16-bit big-endian words.
///
/// Chunks are summed as if concatenated. A chunk of odd length is padded with a
/// zero byte, so only the last chunk may have an odd length.
#[derive(Debug, Default, Clone, Copy)]
pub struct Checksum {
    sum: u32,
}

impl Checksum {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self { sum: 0 }
    }

    #[must_use]
    pub fn add(mut self, bytes: &[u8]) -> Self {
        let mut words = bytes.chunks_exact(2);
        for word in &mut words {
            self.sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
            self.fold();
        }
        if let [last] = words.remainder() {
            self.sum += u32::from(u16::from_be_bytes([*last, 0]));
            self.fold();
        }
        self
    }

    #[inline]
    fn fold(&mut self) {
        while self.sum >> 16 != 0 {
            self.sum = (self.sum & 0xFFFF) + (self.sum >> 16);
        }
    }

    #[must_use]
    #[inline]
    #[expect(clippy::cast_possible_truncation, reason = "Folded to 16 bits")]
    /// Return the ones' complement of the folded sum.
    pub const fn finish(self) -> u16 {
        !(self.sum as u16)
    }
}

#[must_use]
#[inline]
/// Calculate the Internet checksum of a buffer.
pub fn checksum(buffer: &[u8]) -> u16 {
    Checksum::new().add(buffer).finish()
}

#[must_use]
#[inline]
/// Calculate the Internet checksum of a pseudo-header followed by `data`.
///
/// `pseudo_header` must have an even length.
pub fn checksum_with_pseudo(pseudo_header: &[u8], data: &[u8]) -> u16 {
    Checksum::new().add(pseudo_header).add(data).finish()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_be_fields() {
        let mut data = [0u8; 6];
        write_be16(&mut data, 0, 0x0800);
        write_be32(&mut data, 2, 0xC0A8_0002);
        assert_eq!(data, [0x08, 0x00, 0xC0, 0xA8, 0x00, 0x02]);
        assert_eq!(read_be16(&data, 0), 0x0800);
        assert_eq!(read_be32(&data, 2), 0xC0A8_0002);
    }

    #[test]
    fn test_checksum_rfc1071_vector() {
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(checksum(&data), !0xddf2);
    }

    #[test]
    fn test_checksum_odd_length() {
        assert_eq!(checksum(&[0x12, 0x34, 0x56]), !0x6834);
    }

    #[test]
    fn test_checksum_verifies_to_zero() {
        let mut header = [
            0x45, 0x00, 0x00, 0x1c, 0x00, 0x00, 0x00, 0x00, 0x0a, 0x11, 0x00, 0x00, 0xc0, 0xa8,
            0x00, 0x02, 0xc0, 0xa8, 0x00, 0x0c,
        ];
        let sum = checksum(&header);
        write_be16(&mut header, 10, sum);
        assert_eq!(checksum(&header), 0);
    }

    #[test]
    fn test_pseudo_matches_concatenation() {
        let pseudo = [1, 2, 3, 4, 5, 6, 7, 8];
        let data = [9, 10, 11];
        let joined = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];
        assert_eq!(checksum_with_pseudo(&pseudo, &data), checksum(&joined));
    }
}
