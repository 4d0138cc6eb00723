//! The self-delimiting integer/bytestring encodings from NIST SP 800-185,
//! used throughout KT128 and the Protocol transcript engine to make framed
//! concatenations injectively parseable.

/// `left_encode(x)`: for `x=0` returns `[0x01, 0x00]`; otherwise the
/// big-endian bytes of `x` with no leading zeros, followed by one byte
/// giving the number of bytes emitted.
pub fn left_encode(x: u64) -> Vec<u8> {
    if x == 0 {
        return vec![0x01, 0x00];
    }
    let be = x.to_be_bytes();
    let first_nonzero = be.iter().position(|&b| b != 0).unwrap();
    let mut out = Vec::with_capacity(be.len() - first_nonzero + 1);
    out.push((be.len() - first_nonzero) as u8);
    out.extend_from_slice(&be[first_nonzero..]);
    out
}

/// `length_encode(data) = left_encode(|data|) ++ data`.
pub fn length_encode(data: &[u8]) -> Vec<u8> {
    let mut out = left_encode(data.len() as u64);
    out.extend_from_slice(data);
    out
}

/// KT128's length encoding: for `x=0` emit `0x00`;
/// otherwise the big-endian bytes of `x` with no leading zeros, followed by
/// one byte giving the number of bytes emitted. Unlike [`left_encode`], the
/// zero case is a single `0x00` byte, not `[0x01, 0x00]`.
pub fn kt_length_encode(x: u64) -> Vec<u8> {
    if x == 0 {
        return vec![0x00];
    }
    let be = x.to_be_bytes();
    let first_nonzero = be.iter().position(|&b| b != 0).unwrap();
    let mut out = Vec::with_capacity(be.len() - first_nonzero + 1);
    out.extend_from_slice(&be[first_nonzero..]);
    out.push((be.len() - first_nonzero) as u8);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_encode_zero() {
        assert_eq!(left_encode(0), vec![0x01, 0x00]);
    }

    #[test]
    fn left_encode_small() {
        // left_encode(256) from the SP 800-185 worked example.
        assert_eq!(left_encode(256), vec![0x02, 0x01, 0x00]);
    }

    #[test]
    fn left_encode_no_leading_zeros() {
        assert_eq!(left_encode(1), vec![0x01, 0x01]);
        assert_eq!(left_encode(255), vec![0x01, 0xff]);
        assert_eq!(left_encode(65536), vec![0x03, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn length_encode_wraps_data() {
        assert_eq!(length_encode(b"abc"), vec![0x01, 0x03, b'a', b'b', b'c']);
    }

    #[test]
    fn kt_length_encode_zero_is_single_byte() {
        assert_eq!(kt_length_encode(0), vec![0x00]);
    }

    #[test]
    fn kt_length_encode_matches_spec_example() {
        assert_eq!(kt_length_encode(8192), vec![0x20, 0x00, 0x02]);
    }
}
