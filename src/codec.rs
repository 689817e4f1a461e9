/// Bytes occupied by one packed word.
pub const BYTES_PER_INT: usize = 4;

/// Writes `value` as four big-endian bytes at `buf[offset..offset + 4]`.
///
/// Every number stored on the volume crosses through this function and
/// [`unpack_int`]; records are otherwise plain byte slices.
pub fn pack_int(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + BYTES_PER_INT].copy_from_slice(&value.to_be_bytes());
}

/// Reads the four big-endian bytes at `buf[offset..offset + 4]` back into
/// a word.
pub fn unpack_int(buf: &[u8], offset: usize) -> u32 {
    buf[offset..offset + BYTES_PER_INT]
        .iter()
        .fold(0, |word, &byte| (word << 8) | u32::from(byte))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_most_significant_byte_first() {
        let mut buf = [0u8; 8];
        pack_int(&mut buf, 1, 0x0102_0304);
        assert_eq!(buf, [0, 1, 2, 3, 4, 0, 0, 0]);
    }

    #[test]
    fn round_trips_extreme_values() {
        let mut buf = [0u8; 12];
        for &value in &[0, 1, 0x7fff_ffff, u32::MAX] {
            pack_int(&mut buf, 4, value);
            assert_eq!(unpack_int(&buf, 4), value);
        }
    }

    #[test]
    fn neighboring_words_do_not_overlap() {
        let mut buf = [0u8; 8];
        pack_int(&mut buf, 0, u32::MAX);
        pack_int(&mut buf, 4, 7);
        assert_eq!(unpack_int(&buf, 0), u32::MAX);
        assert_eq!(unpack_int(&buf, 4), 7);
    }
}
