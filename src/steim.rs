//! Steim-1 and Steim-2 difference compression.
//!
//! A compressed block is a run of 64-byte frames. Word 0 of each frame holds
//! sixteen 2-bit codes, one per word of the frame; words 1..=15 hold packed
//! first differences. In the first frame of a block, words 1 and 2 carry the
//! forward (X0) and reverse (Xn) integration constants instead of data.
//!
//! | code | Steim-1      | Steim-2 (sub-code in the top 2 bits of the word)  |
//! |------|--------------|---------------------------------------------------|
//! | 00   | no data      | no data                                           |
//! | 01   | 4 x 8 bits   | 4 x 8 bits                                        |
//! | 10   | 2 x 16 bits  | 01: 1 x 30, 10: 2 x 15, 11: 3 x 10 bits           |
//! | 11   | 1 x 32 bits  | 00: 5 x 6, 01: 6 x 5, 10: 7 x 4 bits              |

use crate::data::DecodedTrace;
use crate::error::{with_capacity, Error, IntegrityWarning, Result};
use crate::lib::Vec;

pub const FRAME_LEN: usize = 64;
const FRAME_WORDS: usize = 16;
/// Most differences one frame can carry (15 words of 7 x 4 bits).
const MAX_FRAME_DIFFS: usize = 105;

/// One 64-byte frame viewed as sixteen big-endian words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompressedFrame {
    words: [u32; FRAME_WORDS],
}

impl CompressedFrame {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FRAME_LEN {
            return Err(Error::short("Steim frame", FRAME_LEN, bytes.len()));
        }
        let mut words = [0u32; FRAME_WORDS];
        for (w, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *w = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(Self { words })
    }

    /// The control word holding the per-slot codes.
    pub fn control(&self) -> u32 {
        self.words[0]
    }

    /// The 2-bit code describing word `slot`, `None` past slot 15.
    pub fn code(&self, slot: usize) -> Option<u8> {
        (slot < FRAME_WORDS).then(|| self.slot_code(slot))
    }

    pub fn word(&self, slot: usize) -> Option<u32> {
        self.words.get(slot).copied()
    }

    fn slot_code(&self, slot: usize) -> u8 {
        ((self.words[0] >> (30 - 2 * slot)) & 0x03) as u8
    }

    fn set(&mut self, slot: usize, code: u8, word: u32) {
        self.words[0] |= (code as u32) << (30 - 2 * slot);
        self.words[slot] = word;
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        for w in &self.words {
            out.extend_from_slice(&w.to_be_bytes());
        }
    }
}

#[inline(always)]
fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

/// Reads fixed-width fields from a 32-bit word, most significant bits first.
pub(crate) struct BitCursor {
    word: u32,
    left: u32,
}

impl BitCursor {
    pub(crate) fn new(word: u32) -> Self {
        Self { word, left: 32 }
    }

    pub(crate) fn skip(&mut self, bits: u32) {
        self.left -= bits;
    }

    pub(crate) fn read(&mut self, width: u32) -> u32 {
        self.left -= width;
        let mask = if width == 32 { u32::MAX } else { (1 << width) - 1 };
        (self.word >> self.left) & mask
    }

    pub(crate) fn read_signed(&mut self, width: u32) -> i32 {
        sign_extend(self.read(width), width)
    }
}

/// How the differences of one data word are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Packing {
    Four8,
    Two16,
    One32,
    One30,
    Two15,
    Three10,
    Five6,
    Six5,
    Seven4,
}

const STEIM1_ORDER: [Packing; 3] = [Packing::Four8, Packing::Two16, Packing::One32];
const STEIM2_ORDER: [Packing; 7] = [
    Packing::Seven4,
    Packing::Six5,
    Packing::Five6,
    Packing::Four8,
    Packing::Three10,
    Packing::Two15,
    Packing::One30,
];

impl Packing {
    /// (number of differences, bits per difference)
    pub(crate) const fn layout(self) -> (usize, u32) {
        match self {
            Packing::Four8 => (4, 8),
            Packing::Two16 => (2, 16),
            Packing::One32 => (1, 32),
            Packing::One30 => (1, 30),
            Packing::Two15 => (2, 15),
            Packing::Three10 => (3, 10),
            Packing::Five6 => (5, 6),
            Packing::Six5 => (6, 5),
            Packing::Seven4 => (7, 4),
        }
    }

    /// (control code, sub-code stored in the top two bits of the word)
    const fn codes(self) -> (u8, Option<u8>) {
        match self {
            Packing::Four8 => (0b01, None),
            Packing::Two16 => (0b10, None),
            Packing::One32 => (0b11, None),
            Packing::One30 => (0b10, Some(0b01)),
            Packing::Two15 => (0b10, Some(0b10)),
            Packing::Three10 => (0b10, Some(0b11)),
            Packing::Five6 => (0b11, Some(0b00)),
            Packing::Six5 => (0b11, Some(0b01)),
            Packing::Seven4 => (0b11, Some(0b10)),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Packing::Four8 => "4x8b",
            Packing::Two16 => "2x16b",
            Packing::One32 => "1x32b",
            Packing::One30 => "1x30b",
            Packing::Two15 => "2x15b",
            Packing::Three10 => "3x10b",
            Packing::Five6 => "5x6b",
            Packing::Six5 => "6x5b",
            Packing::Seven4 => "7x4b",
        }
    }

    fn steim1(code: u8) -> Option<Packing> {
        match code {
            0b01 => Some(Packing::Four8),
            0b10 => Some(Packing::Two16),
            0b11 => Some(Packing::One32),
            _ => None,
        }
    }

    /// `Err(sub_code)` when the sub-code is undefined for `code`.
    fn steim2(code: u8, word: u32) -> core::result::Result<Option<Packing>, u8> {
        let dnib = (word >> 30) as u8;
        match (code, dnib) {
            (0b00, _) => Ok(None),
            (0b01, _) => Ok(Some(Packing::Four8)),
            (0b10, 0b01) => Ok(Some(Packing::One30)),
            (0b10, 0b10) => Ok(Some(Packing::Two15)),
            (0b10, 0b11) => Ok(Some(Packing::Three10)),
            (0b11, 0b00) => Ok(Some(Packing::Five6)),
            (0b11, 0b01) => Ok(Some(Packing::Six5)),
            (0b11, 0b10) => Ok(Some(Packing::Seven4)),
            (_, dnib) => Err(dnib),
        }
    }

    /// Appends the differences held in `word`. Fields are right-aligned, so
    /// whatever precedes them (sub-code, unused bits) is skipped.
    pub(crate) fn unpack(self, word: u32, out: &mut Vec<i32>) {
        let (count, width) = self.layout();
        let mut cursor = BitCursor::new(word);
        cursor.skip(32 - count as u32 * width);
        for _ in 0..count {
            out.push(cursor.read_signed(width));
        }
    }

    fn fits(self, diffs: &[i32]) -> bool {
        let (count, width) = self.layout();
        if diffs.len() < count {
            return false;
        }
        if width == 32 {
            return true;
        }
        let max = (1i32 << (width - 1)) - 1;
        let min = -(1i32 << (width - 1));
        diffs[..count].iter().all(|&d| (min..=max).contains(&d))
    }

    fn pack(self, diffs: &[i32]) -> u32 {
        let (count, width) = self.layout();
        let mask = if width == 32 { u32::MAX } else { (1u32 << width) - 1 };
        let mut word = match self.codes().1 {
            Some(dnib) => (dnib as u32) << 30,
            None => 0,
        };
        for (i, &d) in diffs[..count].iter().enumerate() {
            word |= (d as u32 & mask) << ((count - 1 - i) as u32 * width);
        }
        word
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    Steim1,
    Steim2,
}

impl Flavor {
    fn name(self) -> &'static str {
        match self {
            Flavor::Steim1 => "Steim1",
            Flavor::Steim2 => "Steim2",
        }
    }
}

impl crate::Steim1Decode for [u8] {
    fn decode_steim1(&self, sample_count: usize) -> Result<DecodedTrace> {
        decode(self, sample_count, Flavor::Steim1)
    }
}

impl crate::Steim2Decode for [u8] {
    fn decode_steim2(&self, sample_count: usize) -> Result<DecodedTrace> {
        decode(self, sample_count, Flavor::Steim2)
    }
}

fn decode(input: &[u8], sample_count: usize, flavor: Flavor) -> Result<DecodedTrace> {
    let max_frames = input.len() / FRAME_LEN;
    if max_frames == 0 {
        return Err(Error::short("Steim block", FRAME_LEN, input.len()));
    }
    log::trace!(
        "Decoding {} {} frames for {} samples",
        max_frames,
        flavor.name(),
        sample_count
    );

    let mut samples = with_capacity::<i32>(sample_count)?;
    let mut diffs: Vec<i32> = with_capacity(MAX_FRAME_DIFFS)?;
    let mut warnings = Vec::new();

    let first = CompressedFrame::from_bytes(&input[..FRAME_LEN])?;
    let x0 = first.words[1] as i32;
    let xn = first.words[2] as i32;
    if sample_count > 0 {
        samples.push(x0);
    }
    // the first difference of a block is relative to the previous block
    let mut skip_first = true;

    for (frame_idx, chunk) in input.chunks_exact(FRAME_LEN).enumerate() {
        if samples.len() >= sample_count {
            break;
        }
        let frame = CompressedFrame::from_bytes(chunk)?;
        let start_slot = if frame_idx == 0 {
            log::trace!("Frame {}: X0={}  Xn={}", frame_idx, x0, xn);
            3
        } else {
            log::trace!("Frame {}", frame_idx);
            1
        };

        diffs.clear();
        for slot in start_slot..FRAME_WORDS {
            let code = frame.slot_code(slot);
            let word = frame.words[slot];
            let packing = match flavor {
                Flavor::Steim1 => Ok(Packing::steim1(code)),
                Flavor::Steim2 => Packing::steim2(code, word),
            };
            match packing {
                Ok(None) => log::trace!("  W{:02}: 00=special", slot),
                Ok(Some(p)) => {
                    let from = diffs.len();
                    p.unpack(word, &mut diffs);
                    log::trace!("  W{:02}: {:02b}={}  {:?}", slot, code, p.label(), &diffs[from..]);
                }
                Err(sub_code) => {
                    log::warn!(
                        "Impossible {} sub-code {:02b} for code {:02b} in frame {} word {}",
                        flavor.name(),
                        sub_code,
                        code,
                        frame_idx,
                        slot
                    );
                    warnings.push(IntegrityWarning::InvalidSubCode {
                        frame: frame_idx,
                        word: slot,
                        code,
                        sub_code,
                    });
                }
            }
        }

        let mut pending = diffs.iter();
        if skip_first && !diffs.is_empty() {
            pending.next();
            skip_first = false;
        }
        for &d in pending {
            if samples.len() >= sample_count {
                break;
            }
            let last = samples[samples.len() - 1];
            samples.push(last.wrapping_add(d));
        }
    }

    let decoded = samples.len();
    if decoded < sample_count {
        log::warn!(
            "Warning: Number of samples decompressed doesn't match number in header: {} != {}",
            decoded,
            sample_count
        );
        warnings.push(IntegrityWarning::SampleCountMismatch {
            decoded,
            expected: sample_count,
        });
        samples.resize(sample_count, 0);
    } else if let Some(&last) = samples.last() {
        if last != xn {
            log::warn!(
                "Warning: Data integrity check for {} failed, Last sample={}, Xn={}",
                flavor.name(),
                last,
                xn
            );
            warnings.push(IntegrityWarning::ChecksumMismatch {
                last_sample: last,
                reverse_constant: xn,
            });
        }
    }

    Ok(DecodedTrace {
        samples,
        forward: x0,
        reverse: xn,
        warnings,
    })
}

/// Steim-1 compresses `samples`. `previous` is the last sample of the
/// preceding block (the first difference is taken against it).
///
/// ```
/// use reftekio::Steim1Decode;
///
/// let data = [10, 12, 9, 9, 400, -70000];
/// let block = reftekio::encode_steim1(&data, 0).unwrap();
/// let trace = block.decode_steim1(data.len()).unwrap();
/// assert_eq!(trace.samples, data);
/// assert!(trace.is_intact());
/// ```
pub fn encode_steim1(samples: &[i32], previous: i32) -> Result<Vec<u8>> {
    encode(samples, previous, Flavor::Steim1)
}

/// Steim-2 compresses `samples`. Fails when a difference needs more than
/// 30 bits.
pub fn encode_steim2(samples: &[i32], previous: i32) -> Result<Vec<u8>> {
    encode(samples, previous, Flavor::Steim2)
}

fn encode(samples: &[i32], previous: i32, flavor: Flavor) -> Result<Vec<u8>> {
    if samples.is_empty() {
        return Ok(Vec::new());
    }
    log::debug!("Encoding {} samples as {}", samples.len(), flavor.name());

    let mut diffs = with_capacity::<i32>(samples.len())?;
    diffs.push(samples[0].wrapping_sub(previous));
    diffs.extend(samples.windows(2).map(|w| w[1].wrapping_sub(w[0])));

    let order: &[Packing] = match flavor {
        Flavor::Steim1 => &STEIM1_ORDER,
        Flavor::Steim2 => &STEIM2_ORDER,
    };

    let mut frames: Vec<CompressedFrame> = Vec::new();
    let mut frame = CompressedFrame::default();
    frame.set(1, 0, samples[0] as u32);
    frame.set(2, 0, samples[samples.len() - 1] as u32);
    let mut slot = 3;
    let mut idx = 0;

    while idx < diffs.len() {
        if slot == FRAME_WORDS {
            frames.push(frame);
            frame = CompressedFrame::default();
            slot = 1;
        }
        let rest = &diffs[idx..];
        let packing = order
            .iter()
            .copied()
            .find(|p| p.fits(rest))
            .ok_or(Error::DifferenceOutOfRange {
                index: idx,
                difference: rest[0],
            })?;
        let (count, _) = packing.layout();
        log::trace!("  W{:02}: {} {:?}", slot, packing.label(), &rest[..count]);
        frame.set(slot, packing.codes().0, packing.pack(rest));
        idx += count;
        slot += 1;
    }
    frames.push(frame);

    let mut out = with_capacity::<u8>(frames.len() * FRAME_LEN)?;
    for f in &frames {
        f.write_to(&mut out);
    }
    Ok(out)
}
