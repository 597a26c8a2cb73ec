//! Errors and non-fatal data-quality warnings.
//!
//! Hard failures ([`Error`]) abort the operation that raised them and carry no
//! partial result. Data-quality problems ([`IntegrityWarning`]) never abort a
//! decode: the best-effort value is returned inside a [`Flagged`] (or a
//! [`crate::DecodedTrace`]) together with every warning raised on the way.

use serde::{Deserialize, Serialize};

use crate::lib::{String, Vec};

pub type Result<T> = core::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The buffer is shorter than a header or the claimed sample count needs.
    MalformedInput,
    /// A format code or decimation factor has no implementation.
    UnsupportedParameter,
    /// An output or scratch buffer could not be allocated.
    ResourceExhaustion,
    /// A data-quality warning escalated to an error by the caller.
    DataIntegrity,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("malformed input: {context} needs {expected} bytes, got {actual}")]
    MalformedInput {
        context: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("unsupported data format code {0:#04x}")]
    UnsupportedFormat(u8),

    #[error("no FIR filter registered for decimation factor {0}")]
    UnsupportedFactor(u32),

    #[error("decimation cascade has {0} stages, at most 5 are supported")]
    TooManyStages(usize),

    #[error("decimation cascade has no stages")]
    EmptyCascade,

    #[error("cannot parse decimation factor {0:?}")]
    BadFactor(String),

    #[error("difference {difference} at sample {index} does not fit in 30 bits")]
    DifferenceOutOfRange { index: usize, difference: i32 },

    #[error("cannot allocate a buffer of {requested} elements")]
    ResourceExhaustion { requested: usize },

    #[error("data integrity: {0}")]
    DataIntegrity(IntegrityWarning),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedInput { .. } => ErrorKind::MalformedInput,
            Error::UnsupportedFormat(_)
            | Error::UnsupportedFactor(_)
            | Error::TooManyStages(_)
            | Error::EmptyCascade
            | Error::BadFactor(_)
            | Error::DifferenceOutOfRange { .. } => ErrorKind::UnsupportedParameter,
            Error::ResourceExhaustion { .. } => ErrorKind::ResourceExhaustion,
            Error::DataIntegrity(_) => ErrorKind::DataIntegrity,
        }
    }

    pub(crate) fn short(context: &'static str, expected: usize, actual: usize) -> Self {
        Error::MalformedInput {
            context,
            expected,
            actual,
        }
    }
}

/// A recoverable data-quality problem found while decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "PascalCase")]
pub enum IntegrityWarning {
    /// A BCD nibble held 0xA..=0xF. The digit was decoded as 0.
    #[error("invalid BCD nibble {nibble:#x} at nibble offset {nibble_offset}")]
    InvalidBcdNibble { nibble_offset: usize, nibble: u8 },

    /// The last reconstructed sample differs from the reverse integration constant.
    #[error("last sample {last_sample} does not match reverse integration constant {reverse_constant}")]
    ChecksumMismatch {
        last_sample: i32,
        reverse_constant: i32,
    },

    /// A Steim2 data word carried a sub-selector that is not defined for its code.
    /// The word was skipped.
    #[error("frame {frame} word {word}: impossible sub-code {sub_code:#04b} for code {code:#04b}")]
    InvalidSubCode {
        frame: usize,
        word: usize,
        code: u8,
        sub_code: u8,
    },

    /// Fewer samples were recovered than the header claims; the tail is zero-filled.
    #[error("decoded {decoded} samples, header claims {expected}")]
    SampleCountMismatch { decoded: usize, expected: usize },
}

/// A value together with the warnings raised while producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Flagged<T> {
    pub value: T,
    pub warnings: Vec<IntegrityWarning>,
}

impl<T> Flagged<T> {
    pub fn clean(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Moves this value's warnings into `sink` and returns the value.
    pub fn drain_into(self, sink: &mut Vec<IntegrityWarning>) -> T {
        sink.extend(self.warnings);
        self.value
    }

    /// Turns the first warning, if any, into an [`Error::DataIntegrity`].
    pub fn strict(self) -> Result<T> {
        match self.warnings.into_iter().next() {
            Some(w) => Err(Error::DataIntegrity(w)),
            None => Ok(self.value),
        }
    }
}

/// Bytes taken by `n` items of `width` bytes, checked against `available`.
/// A size that does not fit in `usize` is reported as `usize::MAX` needed.
pub(crate) fn require(
    context: &'static str,
    n: usize,
    width: usize,
    available: usize,
) -> Result<usize> {
    match n.checked_mul(width) {
        Some(needed) if needed <= available => Ok(needed),
        needed => Err(Error::short(context, needed.unwrap_or(usize::MAX), available)),
    }
}

/// Allocates an empty vector able to hold `n` elements without reallocating.
pub(crate) fn with_capacity<T>(n: usize) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(n)
        .map_err(|_| Error::ResourceExhaustion { requested: n })?;
    Ok(v)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(Error::short("x", 4, 2).kind(), ErrorKind::MalformedInput);
        assert_eq!(Error::UnsupportedFactor(3).kind(), ErrorKind::UnsupportedParameter);
        assert_eq!(Error::UnsupportedFormat(0x33).kind(), ErrorKind::UnsupportedParameter);
        assert_eq!(
            Error::ResourceExhaustion { requested: 1 }.kind(),
            ErrorKind::ResourceExhaustion
        );
    }

    #[test]
    fn strict_escalates_first_warning() {
        let mut f = Flagged::clean(7u32);
        assert_eq!(f.clone().strict(), Ok(7));
        f.warnings.push(IntegrityWarning::InvalidBcdNibble {
            nibble_offset: 3,
            nibble: 0xA,
        });
        assert!(matches!(
            f.strict(),
            Err(Error::DataIntegrity(IntegrityWarning::InvalidBcdNibble { .. }))
        ));
    }

    #[test]
    fn sizes_that_overflow() {
        assert_eq!(require("x", 3, 4, 12), Ok(12));
        assert_eq!(require("x", 3, 4, 11), Err(Error::short("x", 12, 11)));
        assert_eq!(
            require("x", usize::MAX / 2 + 1, 2, 4),
            Err(Error::short("x", usize::MAX, 4))
        );
    }

    #[test]
    fn huge_allocation_is_reported() {
        let r = with_capacity::<i64>(usize::MAX);
        assert_eq!(r.unwrap_err().kind(), ErrorKind::ResourceExhaustion);
    }
}
