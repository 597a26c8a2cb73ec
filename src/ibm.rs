//! IBM System/360 hexadecimal floating point.
//!
//! | format | sign | exponent          | fraction                  |
//! |--------|------|-------------------|---------------------------|
//! | IBM    | 1    | 7, base 16, +64   | 24, no hidden bit         |
//! | IEEE   | 1    | 8, base 2, +127   | 23, hidden leading 1      |
//!
//! Conversions work on raw `u32` bit patterns with shifts and masks only.

use crate::error::{require, with_capacity, Result};
use crate::lib::Vec;

const SIGN: u32 = 0x8000_0000;
const IBM_FRACTION: u32 = 0x00FF_FFFF;
const IBM_TOP_BIT: u32 = 0x0080_0000;
const IEEE_FRACTION: u32 = 0x007F_FFFF;

/// Converts an IBM single-precision word to the bit pattern of the equivalent
/// IEEE-754 single.
///
/// Never yields NaN or infinity. Lossy cases:
/// - a zero fraction gives a signed zero whatever the exponent;
/// - magnitudes beyond `f32::MAX` saturate to `±f32::MAX`;
/// - magnitudes below the smallest normal become subnormals (fraction bits
///   shifted out are dropped) or signed zero.
pub fn ibm_to_ieee(ibm: u32) -> u32 {
    if ibm == 0 {
        return 0;
    }
    let sign = ibm & SIGN;
    let mut fraction = ibm & IBM_FRACTION;
    if fraction == 0 {
        return sign;
    }

    let mut exp = ((((ibm >> 24) & 0x7F) as i32) - 64) * 4;
    while fraction & IBM_TOP_BIT == 0 {
        fraction <<= 1;
        exp -= 1;
    }
    // the leading 1 becomes IEEE's hidden bit
    exp -= 1;
    let biased = exp + 127;

    if biased >= 0xFF {
        return sign | 0x7F7F_FFFF;
    }
    if biased <= 0 {
        let shift = (1 - biased) as u32;
        if shift > 24 {
            return sign;
        }
        return sign | (fraction >> shift);
    }
    sign | (biased as u32) << 23 | (fraction & IEEE_FRACTION)
}

/// [`ibm_to_ieee`] as an `f32`.
///
/// ```
/// assert_eq!(reftekio::ibm_to_f32(0x4110_0000), 1.0);
/// assert_eq!(reftekio::ibm_to_f32(0), 0.0);
/// ```
pub fn ibm_to_f32(ibm: u32) -> f32 {
    f32::from_bits(ibm_to_ieee(ibm))
}

/// Converts an IEEE-754 single bit pattern to an IBM word.
///
/// IEEE subnormals become zero. Infinities and NaN saturate to the largest
/// IBM magnitude with the same sign bit. Fraction bits shifted out while
/// aligning to a base-16 exponent are truncated.
pub fn ieee_to_ibm(ieee: u32) -> u32 {
    let sign = ieee & SIGN;
    let biased = ((ieee >> 23) & 0xFF) as i32;
    if biased == 0 {
        return 0;
    }
    if biased == 0xFF {
        return sign | 0x7FFF_FFFF;
    }

    let mut fraction = (ieee & IEEE_FRACTION) | IBM_TOP_BIT;
    let mut exp = biased - 127 + 1;
    while exp.rem_euclid(4) != 0 {
        fraction >>= 1;
        exp += 1;
    }
    let ibm_exp = (exp / 4 + 64) as u32;
    sign | ibm_exp << 24 | fraction
}

/// Decodes `n` big-endian IBM float words.
pub fn decode_ibm_floats(buf: &[u8], n: usize) -> Result<Vec<f32>> {
    let needed = require("IBM float payload", n, 4, buf.len())?;
    let mut out = with_capacity::<f32>(n)?;
    out.extend(
        buf[..needed]
            .chunks_exact(4)
            .map(|b| ibm_to_f32(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))),
    );
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_short_circuits() {
        assert_eq!(ibm_to_ieee(0), 0);
        assert_eq!(ibm_to_f32(0), 0.0);
    }

    #[test]
    fn exact_values() {
        assert_eq!(ibm_to_ieee(0x4110_0000), 1.0f32.to_bits());
        assert_eq!(ibm_to_ieee(0x4264_0000), 100.0f32.to_bits());
        assert_eq!(ibm_to_ieee(0xC276_A000), (-118.625f32).to_bits());
        assert_eq!(ibm_to_ieee(0x4080_0000), 0.5f32.to_bits());
        assert_eq!(ibm_to_ieee(0x3F80_0000), 0.03125f32.to_bits());
    }

    #[test]
    fn reference_word() {
        // -177.623764038
        assert_eq!(ibm_to_ieee(0xC2B1_9FAF), 0xC331_9FAF);
        assert_eq!(ieee_to_ibm(0xC331_9FAF), 0xC2B1_9FAF);
    }

    #[test]
    fn zero_fraction_keeps_sign() {
        assert_eq!(ibm_to_ieee(0x4500_0000), 0);
        assert_eq!(ibm_to_ieee(0xC500_0000), SIGN);
    }

    #[test]
    fn no_inf_or_nan() {
        for word in [0x7FFF_FFFFu32, 0xFFFF_FFFF, 0x0000_0001, 0x8010_0000, 0x0100_0000] {
            let f = ibm_to_f32(word);
            assert!(f.is_finite(), "{word:#010x} -> {f}");
        }
        assert_eq!(ibm_to_f32(0x7FFF_FFFF), f32::MAX);
        assert_eq!(ibm_to_f32(0xFFFF_FFFF), -f32::MAX);
    }

    #[test]
    fn tiny_values_go_subnormal() {
        // 16^-22 * 0.5 = 2^-89
        assert!(ibm_to_f32(0x2A80_0000).is_normal());
        // 16^-32 * 0.5 = 2^-129, subnormal
        let f = ibm_to_f32(0x2080_0000);
        assert!(f > 0.0 && !f.is_normal());
        assert_eq!(f, f32::from_bits(1 << 20));
    }

    #[test]
    fn ieee_round_trip_for_exact_values() {
        for v in [1.0f32, -2.0, 0.5, 100.0, -118.625, 3.0e-5, 1.5e20] {
            let back = ibm_to_f32(ieee_to_ibm(v.to_bits()));
            let tol = v.abs() * 1.0e-6;
            assert!((back - v).abs() <= tol, "{v} -> {back}");
        }
        assert_eq!(ieee_to_ibm(0), 0);
    }

    #[test]
    fn bulk_decode() {
        let buf = [0x41, 0x10, 0x00, 0x00, 0xC2, 0xB1, 0x9F, 0xAF];
        let v = decode_ibm_floats(&buf, 2).unwrap();
        assert_eq!(v[0], 1.0);
        assert_eq!(v[1].to_bits(), 0xC331_9FAF);
        assert!(decode_ibm_floats(&buf, 3).is_err());
        assert_eq!(
            decode_ibm_floats(&buf, usize::MAX / 4 + 1).unwrap_err(),
            crate::Error::MalformedInput {
                context: "IBM float payload",
                expected: usize::MAX,
                actual: 8
            }
        );
    }
}
