//! Uncompressed big-endian sample payloads.

use crate::error::{require, with_capacity, Result};
use crate::lib::Vec;

macro_rules! decode_be {
    ($buf: expr, $n: expr, $typ: ident, $len: expr, $context: expr) => {{
        let needed = require($context, $n, $len, $buf.len())?;
        let mut out = with_capacity::<i32>($n)?;
        out.extend($buf[..needed].chunks_exact($len).map(|b| {
            let mut bytes = [0; $len];
            bytes.copy_from_slice(b);
            <$typ>::from_be_bytes(bytes) as i32
        }));
        Ok(out)
    }};
}

/// Decodes `n` big-endian two's-complement 16-bit samples, sign-extended to 32 bits.
pub fn decode_int16(buf: &[u8], n: usize) -> Result<Vec<i32>> {
    decode_be!(buf, n, i16, 2, "int16 payload")
}

/// Decodes `n` big-endian two's-complement 32-bit samples.
pub fn decode_int32(buf: &[u8], n: usize) -> Result<Vec<i32>> {
    decode_be!(buf, n, i32, 4, "int32 payload")
}

/// Decodes `n` packed 3-byte big-endian samples, sign-extended from bit 23.
///
/// ```
/// let s = reftekio::decode_int24(&[0x80, 0x00, 0x00, 0x7F, 0xFF, 0xFF], 2).unwrap();
/// assert_eq!(s, [-8388608, 8388607]);
/// ```
pub fn decode_int24(buf: &[u8], n: usize) -> Result<Vec<i32>> {
    let needed = require("int24 payload", n, 3, buf.len())?;
    let mut out = with_capacity::<i32>(n)?;
    out.extend(buf[..needed].chunks_exact(3).map(|b| {
        let v = (b[0] as i32) << 16 | (b[1] as i32) << 8 | b[2] as i32;
        if b[0] & 0x80 != 0 {
            v - 0x100_0000
        } else {
            v
        }
    }));
    Ok(out)
}
