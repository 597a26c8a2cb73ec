//! Anti-alias FIR tables for the decimation cascade.
//!
//! Linear-phase low-pass filters (Hamming-windowed sinc, cutoff at 0.8 of the
//! output Nyquist frequency), one per supported factor. Every table has odd
//! length so the filter is centred on a sample.

pub(crate) const FIR_2: [f64; 33] = [
    0.00151235, 0.0, -0.0024849, -0.00226515, 0.00334508, 0.00782125,
    0.0, -0.01513216, -0.01261821, 0.01681737, 0.03609642, 0.0,
    -0.06542937, -0.05748145, 0.09019537, 0.29979599, 0.39965481, 0.29979599,
    0.09019537, -0.05748145, -0.06542937, 0.0, 0.03609642, 0.01681737,
    -0.01261821, -0.01513216, 0.0, 0.00782125, 0.00334508, -0.00226515,
    -0.0024849, 0.0, 0.00151235,
];

pub(crate) const FIR_4: [f64; 57] = [
    -0.00086623, -0.00093079, -0.00065966, 0.0, 0.00098025, 0.00198395,
    0.00248551, 0.00191598, 0.0, -0.00291188, -0.00573373, -0.00692096,
    -0.00512522, 0.0, 0.00722738, 0.01379486, 0.01622931, 0.01178647,
    0.0, -0.01633788, -0.03133404, -0.03747626, -0.02809533, 0.0,
    0.04471021, 0.09845184, 0.14984256, 0.18683467, 0.200298, 0.18683467,
    0.14984256, 0.09845184, 0.04471021, 0.0, -0.02809533, -0.03747626,
    -0.03133404, -0.01633788, 0.0, 0.01178647, 0.01622931, 0.01379486,
    0.00722738, 0.0, -0.00512522, -0.00692096, -0.00573373, -0.00291188,
    0.0, 0.00191598, 0.00248551, 0.00198395, 0.00098025, 0.0,
    -0.00065966, -0.00093079, -0.00086623,
];

pub(crate) const FIR_5: [f64; 71] = [
    -0.00069288, -0.00075373, -0.00065038, -0.00035412, 0.00014089, 0.00078407,
    0.00144312, 0.00190694, 0.00192953, 0.00131174, 0.0, -0.00183357,
    -0.00376785, -0.00519389, -0.0054638, -0.00409952, -0.00100553, 0.00338547,
    0.00809917, 0.01177497, 0.01298136, 0.01063116, 0.00439492, -0.00500681,
    -0.01573754, -0.0250632, -0.02984379, -0.02721154, -0.01528935, 0.00622445,
    0.03576242, 0.06998473, 0.10427693, 0.13356287, 0.15326643, 0.16021266,
    0.15326643, 0.13356287, 0.10427693, 0.06998473, 0.03576242, 0.00622445,
    -0.01528935, -0.02721154, -0.02984379, -0.0250632, -0.01573754, -0.00500681,
    0.00439492, 0.01063116, 0.01298136, 0.01177497, 0.00809917, 0.00338547,
    -0.00100553, -0.00409952, -0.0054638, -0.00519389, -0.00376785, -0.00183357,
    0.0, 0.00131174, 0.00192953, 0.00190694, 0.00144312, 0.00078407,
    0.00014089, -0.00035412, -0.00065038, -0.00075373, -0.00069288,
];

/// One anti-alias stage: a tap table and the stride it is applied with.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FirStage {
    pub(crate) factor: usize,
    pub(crate) taps: &'static [f64],
    /// Sum of the taps; outputs are divided by it.
    pub(crate) scale: f64,
}

impl FirStage {
    pub(crate) fn new(factor: usize, taps: &'static [f64]) -> Self {
        Self {
            factor,
            taps,
            scale: taps.iter().sum(),
        }
    }

    pub(crate) fn half(&self) -> usize {
        self.taps.len() / 2
    }

    /// Filters `input` at every `factor`-th position whose whole tap window
    /// lies inside the buffer, starting at the first such position.
    pub(crate) fn apply(&self, input: &[f64], out: &mut crate::lib::Vec<f64>) {
        let half = self.half();
        let mut i = half;
        while i + half < input.len() {
            let window = &input[i - half..=i + half];
            // y[i] = sum x[i + half - k] * tap[k]
            let acc: f64 = window
                .iter()
                .rev()
                .zip(self.taps)
                .map(|(x, t)| x * t)
                .sum();
            out.push(acc / self.scale);
            i += self.factor;
        }
    }
}
