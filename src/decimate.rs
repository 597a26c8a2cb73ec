//! Multi-stage FIR decimation.
//!
//! A [`DecimationCascade`] low-pass filters and downsamples a stream through
//! up to five stages. It carries the tail of the stream between calls, so a
//! long trace may be fed in arbitrary pieces and one cascade must be used per
//! channel. A [`DelayedCascade`] does the same but holds back outputs near the
//! end of each piece until their input has arrived.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{with_capacity, Error, Result};
use crate::fir::{FirStage, FIR_2, FIR_4, FIR_5};
use crate::lib::{fmt, String, ToString, Vec};

const MAX_STAGES: usize = 5;

/// A supported decimation factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Factor {
    Two,
    Four,
    Five,
}

impl Factor {
    pub fn value(self) -> u32 {
        match self {
            Factor::Two => 2,
            Factor::Four => 4,
            Factor::Five => 5,
        }
    }

    fn stage(self) -> FirStage {
        match self {
            Factor::Two => FirStage::new(2, &FIR_2),
            Factor::Four => FirStage::new(4, &FIR_4),
            Factor::Five => FirStage::new(5, &FIR_5),
        }
    }
}

impl TryFrom<u32> for Factor {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            2 => Ok(Factor::Two),
            4 => Ok(Factor::Four),
            5 => Ok(Factor::Five),
            other => Err(Error::UnsupportedFactor(other)),
        }
    }
}

impl From<Factor> for u32 {
    fn from(f: Factor) -> u32 {
        f.value()
    }
}

/// Ordered decimation factors, applied first to last.
///
/// ```
/// let spec: reftekio::DecimationSpec = "2,4,5".parse().unwrap();
/// assert_eq!(spec.total(), 40);
/// assert!("2,3".parse::<reftekio::DecimationSpec>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FactorList", into = "Vec<u32>")]
pub struct DecimationSpec {
    factors: Vec<Factor>,
}

impl DecimationSpec {
    pub fn new(factors: &[u32]) -> Result<Self> {
        if factors.is_empty() {
            return Err(Error::EmptyCascade);
        }
        if factors.len() > MAX_STAGES {
            return Err(Error::TooManyStages(factors.len()));
        }
        let factors = factors
            .iter()
            .map(|&f| Factor::try_from(f))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { factors })
    }

    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    /// Product of all factors.
    pub fn total(&self) -> u32 {
        self.factors.iter().map(|f| f.value()).product()
    }
}

impl FromStr for DecimationSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let factors = s
            .split(',')
            .map(|f| {
                let f = f.trim();
                f.parse::<u32>()
                    .map_err(|_| Error::BadFactor(f.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(&factors)
    }
}

impl fmt::Display for DecimationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, factor) in self.factors.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", factor.value())?;
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FactorList {
    Text(String),
    List(Vec<u32>),
}

impl TryFrom<FactorList> for DecimationSpec {
    type Error = Error;

    fn try_from(value: FactorList) -> Result<Self> {
        match value {
            FactorList::Text(s) => s.parse(),
            FactorList::List(v) => Self::new(&v),
        }
    }
}

impl From<DecimationSpec> for Vec<u32> {
    fn from(spec: DecimationSpec) -> Vec<u32> {
        spec.factors.iter().map(|f| f.value()).collect()
    }
}

/// Output of one [`DecimationCascade::decimate`] call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Decimated {
    pub samples: Vec<f64>,
    /// Index, in this call's input, of the sample the first output is centred
    /// on. The decimated trace starts `start_offset` input periods after the
    /// input's first sample.
    pub start_offset: usize,
    /// Input samples the next call must consume before its first output.
    pub shift: usize,
}

impl Decimated {
    /// Rounds every sample to the nearest count, halves away from zero.
    pub fn to_counts(&self) -> Vec<i32> {
        self.samples
            .iter()
            .map(|&x| if x >= 0.0 { (x + 0.5) as i32 } else { (x - 0.5) as i32 })
            .collect()
    }
}

/// Decimation state of one continuous channel.
#[derive(Debug, Clone)]
pub struct DecimationCascade {
    spec: DecimationSpec,
    stages: Vec<FirStage>,
    total: usize,
    /// Samples of context the cascade needs on each side of an output.
    pad: usize,
    /// Last `pad - shift` samples of the stream so far.
    history: Vec<f64>,
    shift: usize,
}

impl DecimationCascade {
    pub fn new(spec: &DecimationSpec) -> Result<Self> {
        let (stages, pad) = build_stages(spec);
        let mut history = with_capacity(pad)?;
        history.resize(pad, 0.0);
        log::debug!(
            "Decimation cascade {} (total {}), padding {} samples",
            spec,
            spec.total(),
            pad
        );
        Ok(Self {
            spec: spec.clone(),
            stages,
            total: spec.total() as usize,
            pad,
            history,
            shift: 0,
        })
    }

    pub fn spec(&self) -> &DecimationSpec {
        &self.spec
    }

    /// Shift carried into the next call.
    pub fn pending_shift(&self) -> usize {
        self.shift
    }

    /// Forgets the stream so far, as if the cascade were new.
    pub fn reset(&mut self) {
        self.history.clear();
        self.history.resize(self.pad, 0.0);
        self.shift = 0;
    }

    /// Decimates the next piece of the stream.
    ///
    /// With `M` input samples and a carried shift `s`, emits nothing when
    /// `M <= s`, otherwise `ceil((M - s) / total)` samples, the first centred
    /// on input sample `s`.
    ///
    /// Every call is filtered as one block: the signal beyond the end of the
    /// input is taken as zero, so the last outputs of a call are attenuated,
    /// about `pad / total` of them. [`DelayedCascade`] holds those outputs
    /// back until the samples they depend on have arrived.
    pub fn decimate(&mut self, input: &[f64]) -> Result<Decimated> {
        let m = input.len();
        let s = self.shift;

        if m <= s {
            let next = s - m;
            self.carry(input, next)?;
            log::debug!("{} samples consumed by shift {}, nothing emitted", m, s);
            return Ok(Decimated {
                samples: Vec::new(),
                start_offset: s,
                shift: next,
            });
        }

        let mut work = with_capacity::<f64>(self.history.len() + m + self.pad)?;
        work.extend_from_slice(&self.history);
        work.extend_from_slice(input);
        work.resize(work.len() + self.pad, 0.0);
        let work = run_stages(&self.stages, work)?;

        let rem = (m - s) % self.total;
        let next = if rem == 0 { 0 } else { self.total - rem };
        self.carry(input, next)?;
        log::debug!(
            "Decimated {} samples to {} (offset {}, next shift {})",
            m,
            work.len(),
            s,
            next
        );

        Ok(Decimated {
            samples: work,
            start_offset: s,
            shift: next,
        })
    }

    /// [`Self::decimate`] for integer counts.
    pub fn decimate_counts(&mut self, input: &[i32]) -> Result<Decimated> {
        let mut widened = with_capacity::<f64>(input.len())?;
        widened.extend(input.iter().map(|&x| x as f64));
        self.decimate(&widened)
    }

    /// Keeps the last `pad - next` samples of history followed by `input`.
    fn carry(&mut self, input: &[f64], next: usize) -> Result<()> {
        let keep = self.pad - next;
        let from_old = keep.saturating_sub(input.len());
        let mut history = with_capacity::<f64>(keep)?;
        history.extend_from_slice(&self.history[self.history.len() - from_old..]);
        history.extend_from_slice(&input[input.len() - (keep - from_old)..]);
        self.history = history;
        self.shift = next;
        Ok(())
    }
}

/// The FIR stages of `spec` and the samples of context an output needs on
/// each side, `h0 + d0 * (h1 + d1 * (h2 + ...))`.
fn build_stages(spec: &DecimationSpec) -> (Vec<FirStage>, usize) {
    let stages: Vec<FirStage> = spec.factors().iter().map(|f| f.stage()).collect();
    let pad = stages
        .iter()
        .rev()
        .fold(0, |inner, s| s.half() + s.factor * inner);
    (stages, pad)
}

fn run_stages(stages: &[FirStage], mut work: Vec<f64>) -> Result<Vec<f64>> {
    for stage in stages {
        let mut out = with_capacity::<f64>(work.len() / stage.factor + 1)?;
        stage.apply(&work, &mut out);
        log::trace!("Stage /{}: {} -> {} samples", stage.factor, work.len(), out.len());
        work = out;
    }
    Ok(work)
}

/// Decimation of one continuous channel that emits an output only once its
/// whole filter window has been received.
///
/// A stream pushed in pieces decimates to the same values as the whole
/// stream passed to [`DecimationCascade::decimate`] at once, at the cost of
/// holding back about `pad / total` outputs until the next push or
/// [`Self::finish`].
#[derive(Debug, Clone)]
pub struct DelayedCascade {
    stages: Vec<FirStage>,
    total: usize,
    pad: usize,
    /// The stream from `pad` samples before the next output's centre.
    backlog: Vec<f64>,
    next_centre: u64,
    received: u64,
}

impl DelayedCascade {
    pub fn new(spec: &DecimationSpec) -> Result<Self> {
        let (stages, pad) = build_stages(spec);
        let mut backlog = with_capacity(pad)?;
        backlog.resize(pad, 0.0);
        Ok(Self {
            stages,
            total: spec.total() as usize,
            pad,
            backlog,
            next_centre: 0,
            received: 0,
        })
    }

    /// Index, in the whole stream, of the input sample the next output is
    /// centred on.
    pub fn next_centre(&self) -> u64 {
        self.next_centre
    }

    /// Appends `input` to the stream and returns every output whose window is
    /// now complete.
    pub fn push(&mut self, input: &[f64]) -> Result<Vec<f64>> {
        self.backlog
            .try_reserve(input.len())
            .map_err(|_| Error::ResourceExhaustion {
                requested: self.backlog.len() + input.len(),
            })?;
        self.backlog.extend_from_slice(input);
        self.received += input.len() as u64;

        let window = 2 * self.pad + 1;
        if self.backlog.len() < window {
            return Ok(Vec::new());
        }
        self.emit((self.backlog.len() - window) / self.total + 1)
    }

    /// Emits the outputs still held back, treating the stream as ending here,
    /// and starts a new stream.
    pub fn finish(&mut self) -> Result<Vec<f64>> {
        let pending = self.received.saturating_sub(self.next_centre) as usize;
        let count = pending.div_ceil(self.total);
        let out = if count == 0 {
            Vec::new()
        } else {
            self.backlog.resize(self.backlog.len() + self.pad, 0.0);
            self.emit(count)?
        };
        self.backlog.clear();
        self.backlog.resize(self.pad, 0.0);
        self.next_centre = 0;
        self.received = 0;
        Ok(out)
    }

    /// Filters the next `count` outputs and drops the input they used up.
    fn emit(&mut self, count: usize) -> Result<Vec<f64>> {
        let span = 2 * self.pad + (count - 1) * self.total + 1;
        let mut work = with_capacity::<f64>(span)?;
        work.extend_from_slice(&self.backlog[..span]);
        let out = run_stages(&self.stages, work)?;

        let consumed = count * self.total;
        self.backlog.drain(..consumed);
        self.next_centre += consumed as u64;
        log::debug!(
            "Emitted {} delayed samples, next centred on input {}",
            out.len(),
            self.next_centre
        );
        Ok(out)
    }
}
