//! Packed binary-coded-decimal fields, as used throughout RT-130 headers.

use crate::error::{Error, Flagged, IntegrityWarning, Result};
use crate::lib::Vec;

/// Decodes `count` BCD nibbles starting at nibble `start`, most significant
/// nibble first. Nibble `2n` is the high half of byte `n`.
///
/// A nibble above 9 is decoded as the digit 0 and reported as
/// [`IntegrityWarning::InvalidBcdNibble`].
///
/// ```
/// let f = reftekio::decode_bcd(&[0x12, 0x34], 0, 4).unwrap();
/// assert_eq!(f.value, 1234);
/// assert!(f.is_clean());
/// ```
pub fn decode_bcd(buf: &[u8], start: usize, count: usize) -> Result<Flagged<u32>> {
    let Some(end) = start.checked_add(count) else {
        return Err(Error::short("BCD field", usize::MAX, buf.len()));
    };
    let needed = end / 2 + end % 2;
    if buf.len() < needed {
        return Err(Error::short("BCD field", needed, buf.len()));
    }

    let mut value = 0u32;
    let mut warnings = Vec::new();
    for pos in start..end {
        let byte = buf[pos / 2];
        let nibble = if pos % 2 == 0 { byte >> 4 } else { byte & 0x0F };
        let digit = if nibble > 9 {
            log::warn!("Invalid BCD nibble {:#x} at nibble offset {}", nibble, pos);
            warnings.push(IntegrityWarning::InvalidBcdNibble {
                nibble_offset: pos,
                nibble,
            });
            0
        } else {
            nibble
        };
        value = value.wrapping_mul(10).wrapping_add(digit as u32);
    }

    Ok(Flagged { value, warnings })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn digits_in_order() {
        let f = decode_bcd(&[0x12, 0x34], 0, 4).unwrap();
        assert_eq!(f.value, 1234);
        assert!(f.is_clean());
    }

    #[test]
    fn odd_start_and_length() {
        // 0x01 0x23 0x45: nibbles 0 1 2 3 4 5
        let buf = [0x01, 0x23, 0x45];
        assert_eq!(decode_bcd(&buf, 1, 3).unwrap().value, 123);
        assert_eq!(decode_bcd(&buf, 3, 3).unwrap().value, 345);
        assert_eq!(decode_bcd(&buf, 5, 1).unwrap().value, 5);
    }

    #[test]
    fn zero_nibbles() {
        assert_eq!(decode_bcd(&[], 0, 0).unwrap().value, 0);
    }

    #[test]
    fn invalid_nibble_is_flagged() {
        let f = decode_bcd(&[0x1A, 0x34], 0, 4).unwrap();
        assert_eq!(f.value, 1034);
        assert_eq!(
            f.warnings,
            [IntegrityWarning::InvalidBcdNibble {
                nibble_offset: 1,
                nibble: 0xA
            }]
        );
    }

    #[test]
    fn field_beyond_addressable_range() {
        assert_eq!(
            decode_bcd(&[0; 4], usize::MAX, 2).unwrap_err(),
            Error::MalformedInput {
                context: "BCD field",
                expected: usize::MAX,
                actual: 4
            }
        );
        // end fits but rounding up to whole bytes must not overflow
        assert_eq!(
            decode_bcd(&[0; 4], usize::MAX - 1, 1).unwrap_err(),
            Error::short("BCD field", usize::MAX / 2 + 1, 4)
        );
    }

    #[test]
    fn short_buffer() {
        let e = decode_bcd(&[0x12], 1, 2).unwrap_err();
        assert_eq!(
            e,
            Error::MalformedInput {
                context: "BCD field",
                expected: 2,
                actual: 1
            }
        );
    }
}
