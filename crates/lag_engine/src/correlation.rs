//! Masked normalized cross-correlation (Padfield, "Masked FFT registration",
//! CVPR 2010) and peak-lag extraction.
//!
//! Correlation is expressed as convolution with the time-reversed expected
//! signal. Overlap counts, local sums and local sums of squares all come from
//! FFTs of the mask and the squared signals, so samples outside the mask never
//! contribute to the normalization.

use std::fmt;
use std::sync::Arc;

use contracts::ContractError;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// Peak of the causal correlation range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationPeak {
    /// Lag of `actual` behind `expected` (seconds)
    pub lag: f64,
    /// Correlation at the integer peak, in [-1, 1]
    pub confidence: f64,
}

/// Largest `len + max_lag` span a correlation will pad to; keeps the
/// `2 * n` search bound in [`fft_next_good_size`] from overflowing
const MAX_FFT_SPAN: usize = (isize::MAX as usize) / 4;

/// Smallest 2·3·5·7·11-smooth integer `>= n`; sizes up to 6 are returned as is.
pub fn fft_next_good_size(n: usize) -> usize {
    if n <= 6 {
        return n;
    }

    let mut best = 2 * n;
    let mut f2 = 1;
    while f2 < best {
        let mut f23 = f2;
        while f23 < best {
            let mut f235 = f23;
            while f235 < best {
                let mut f2357 = f235;
                while f2357 < best {
                    let mut f235711 = f2357;
                    while f235711 < best {
                        if f235711 >= n {
                            best = f235711;
                        }
                        f235711 *= 11;
                    }
                    f2357 *= 7;
                }
                f235 *= 5;
            }
            f23 *= 3;
        }
        f2 *= 2;
    }
    best
}

/// Sub-sample peak position from a 3-point parabola around `max_index`.
///
/// Peaks on either boundary are returned unrefined.
pub fn parabolic_peak_interp(values: &[f64], max_index: usize) -> f64 {
    if max_index == 0 || max_index + 1 >= values.len() {
        return max_index as f64;
    }

    let y_m1 = values[max_index - 1];
    let y_0 = values[max_index];
    let y_p1 = values[max_index + 1];
    let curvature = 2.0 * y_0 - y_p1 - y_m1;
    if curvature == 0.0 {
        return max_index as f64;
    }
    max_index as f64 + 0.5 * (y_p1 - y_m1) / curvature
}

/// Index of the first maximum
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, value) in values.iter().enumerate().skip(1) {
        if *value > values[best] {
            best = i;
        }
    }
    best
}

/// FFT-backed masked cross-correlator
///
/// Holds an `FftPlanner`, so plans for a given padded length are built once
/// and reused across calls.
pub struct CrossCorrelator {
    planner: FftPlanner<f64>,
}

impl fmt::Debug for CrossCorrelator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrossCorrelator").finish_non_exhaustive()
    }
}

impl Default for CrossCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl CrossCorrelator {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Estimate how far `actual` lags `expected`.
    ///
    /// Only lags in `[0, max_lag)` samples are searched. The integer peak is
    /// refined by parabolic interpolation.
    ///
    /// # Errors
    /// `InvalidInput` when the three sequences differ in length, are empty,
    /// or `max_lag` is non-finite or shorter than one sample.
    pub fn correlate(
        &mut self,
        expected: &[f64],
        actual: &[f64],
        mask: &[bool],
        sample_period: f64,
        max_lag: f64,
    ) -> Result<CorrelationPeak, ContractError> {
        if expected.len() != actual.len() || expected.len() != mask.len() {
            return Err(ContractError::invalid_input(format!(
                "signal lengths differ: expected={}, actual={}, mask={}",
                expected.len(),
                actual.len(),
                mask.len()
            )));
        }
        if expected.is_empty() {
            return Err(ContractError::invalid_input("signals are empty"));
        }
        if !(sample_period > 0.0) {
            return Err(ContractError::invalid_input(format!(
                "sample_period must be > 0, got {sample_period}"
            )));
        }

        if !max_lag.is_finite() {
            return Err(ContractError::invalid_input(format!(
                "max_lag must be finite, got {max_lag}"
            )));
        }

        let max_lag_samples = (max_lag / sample_period) as usize;
        if max_lag_samples == 0 {
            return Err(ContractError::invalid_input(format!(
                "max_lag {max_lag} is shorter than one sample ({sample_period})"
            )));
        }

        let len = expected.len();
        let span = len
            .checked_add(max_lag_samples)
            .filter(|&span| span <= MAX_FFT_SPAN)
            .ok_or_else(|| {
                ContractError::invalid_input(format!(
                    "max_lag {max_lag} spans too many samples ({max_lag_samples})"
                ))
            })?;
        let padded = fft_next_good_size(span);
        let ncc = self.masked_ncc(expected, actual, mask, padded);

        let roi = &ncc[len - 1..len - 1 + max_lag_samples];
        let peak = argmax(roi);

        Ok(CorrelationPeak {
            lag: parabolic_peak_interp(roi, peak) * sample_period,
            confidence: roi[peak],
        })
    }

    /// Full masked NCC over all `padded` circular lags.
    ///
    /// Index `len - 1 + k` holds the correlation for `actual` lagging
    /// `expected` by `k` samples.
    pub fn masked_ncc(
        &mut self,
        expected: &[f64],
        actual: &[f64],
        mask: &[bool],
        padded: usize,
    ) -> Vec<f64> {
        let eps = f64::EPSILON;

        let gate = |signal: &[f64]| -> Vec<f64> {
            signal
                .iter()
                .zip(mask)
                .map(|(&v, &ok)| if ok { v } else { 0.0 })
                .collect()
        };
        let actual_sig = gate(actual);
        let rotated_expected: Vec<f64> = gate(expected).into_iter().rev().collect();
        let mask_sig: Vec<f64> = mask.iter().map(|&ok| f64::from(u8::from(ok))).collect();
        let rotated_mask: Vec<f64> = mask_sig.iter().rev().copied().collect();
        let square = |signal: &[f64]| signal.iter().map(|v| v * v).collect::<Vec<_>>();

        let forward = self.planner.plan_fft_forward(padded);
        let inverse = self.planner.plan_fft_inverse(padded);

        let actual_fft = spectrum(&forward, &actual_sig, padded);
        let rotated_expected_fft = spectrum(&forward, &rotated_expected, padded);
        let mask_fft = spectrum(&forward, &mask_sig, padded);
        let rotated_mask_fft = spectrum(&forward, &rotated_mask, padded);
        let actual_squared_fft = spectrum(&forward, &square(&actual_sig), padded);
        let rotated_expected_squared_fft =
            spectrum(&forward, &square(&rotated_expected), padded);

        let overlap: Vec<f64> = convolve(&inverse, &rotated_mask_fft, &mask_fft)
            .into_iter()
            .map(|count| count.round().max(eps))
            .collect();
        let masked_actual = convolve(&inverse, &rotated_mask_fft, &actual_fft);
        let masked_expected = convolve(&inverse, &mask_fft, &rotated_expected_fft);

        let mut numerator = convolve(&inverse, &rotated_expected_fft, &actual_fft);
        for i in 0..padded {
            numerator[i] -= masked_actual[i] * masked_expected[i] / overlap[i];
        }

        let mut actual_denom = convolve(&inverse, &rotated_mask_fft, &actual_squared_fft);
        for i in 0..padded {
            actual_denom[i] =
                (actual_denom[i] - masked_actual[i] * masked_actual[i] / overlap[i]).max(0.0);
        }

        let mut expected_denom = convolve(&inverse, &mask_fft, &rotated_expected_squared_fft);
        for i in 0..padded {
            expected_denom[i] = (expected_denom[i]
                - masked_expected[i] * masked_expected[i] / overlap[i])
                .max(0.0);
        }

        let denom: Vec<f64> = actual_denom
            .iter()
            .zip(&expected_denom)
            .map(|(a, e)| (a * e).sqrt())
            .collect();

        let tol = 1e3 * eps * denom.iter().fold(0.0_f64, |acc, d| acc.max(d.abs()));

        numerator
            .iter()
            .zip(&denom)
            .map(|(&num, &den)| {
                if den > tol {
                    (num / den).clamp(-1.0, 1.0)
                } else {
                    0.0
                }
            })
            .collect()
    }
}

/// Zero-padded forward transform of a real signal
fn spectrum(plan: &Arc<dyn Fft<f64>>, signal: &[f64], padded: usize) -> Vec<Complex<f64>> {
    let mut buffer = vec![Complex::new(0.0, 0.0); padded];
    for (slot, &value) in buffer.iter_mut().zip(signal) {
        slot.re = value;
    }
    plan.process(&mut buffer);
    buffer
}

/// Real part of the normalized inverse transform of `lhs · rhs`
fn convolve(
    plan: &Arc<dyn Fft<f64>>,
    lhs: &[Complex<f64>],
    rhs: &[Complex<f64>],
) -> Vec<f64> {
    let mut buffer: Vec<Complex<f64>> = lhs.iter().zip(rhs).map(|(a, b)| a * b).collect();
    plan.process(&mut buffer);
    let scale = buffer.len() as f64;
    buffer.into_iter().map(|c| c.re / scale).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f64 = 0.05;

    /// Broadband test signal: sum of incommensurate sinusoids
    fn signal(len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| {
                let t = i as f64 * DT;
                (0.7 * t).sin() + 0.5 * (1.9 * t + 0.3).sin() + 0.25 * (4.3 * t + 1.1).sin()
            })
            .collect()
    }

    fn delayed(expected: &[f64], lag: usize) -> Vec<f64> {
        (0..expected.len())
            .map(|i| if i >= lag { expected[i - lag] } else { 0.0 })
            .collect()
    }

    #[test]
    fn test_next_good_size() {
        assert_eq!(fft_next_good_size(0), 0);
        assert_eq!(fft_next_good_size(1), 1);
        assert_eq!(fft_next_good_size(6), 6);
        assert_eq!(fft_next_good_size(7), 7);
        assert_eq!(fft_next_good_size(13), 14);
        assert_eq!(fft_next_good_size(17), 18);
        assert_eq!(fft_next_good_size(97), 98);
        assert_eq!(fft_next_good_size(6020), 6048);
    }

    #[test]
    fn test_next_good_size_is_smooth_and_minimal() {
        let smooth = |mut v: usize| {
            for p in [2, 3, 5, 7, 11] {
                while v % p == 0 {
                    v /= p;
                }
            }
            v == 1
        };
        for n in 7..2000 {
            let good = fft_next_good_size(n);
            assert!(good >= n);
            assert!(smooth(good), "{good} is not smooth");
            assert!((n..good).all(|m| !smooth(m)), "{good} is not minimal for {n}");
        }
    }

    #[test]
    fn test_parabolic_interp() {
        assert_eq!(parabolic_peak_interp(&[1.0, 0.5, 0.2], 0), 0.0);
        assert_eq!(parabolic_peak_interp(&[0.2, 0.5, 1.0], 2), 2.0);
        assert_eq!(parabolic_peak_interp(&[0.5, 1.0, 0.5], 1), 1.0);

        // Samples of -(x - 1.25)^2 at x = 0, 1, 2
        let parabola: Vec<f64> = (0..3).map(|x| -((x as f64) - 1.25).powi(2)).collect();
        assert!((parabolic_peak_interp(&parabola, 1) - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_recovers_integer_lag() {
        let expected = signal(1200);
        let mut correlator = CrossCorrelator::new();
        for lag in [0usize, 3, 6, 11] {
            let actual = delayed(&expected, lag);
            let mask = vec![true; expected.len()];
            let peak = correlator
                .correlate(&expected, &actual, &mask, DT, 1.0)
                .unwrap();
            assert!(
                (peak.lag - lag as f64 * DT).abs() < 1e-2,
                "lag {lag}: got {}",
                peak.lag
            );
            assert!((peak.confidence - 1.0).abs() < 1e-2, "confidence {}", peak.confidence);
        }
    }

    #[test]
    fn test_mask_excludes_corrupted_region() {
        let expected = signal(1200);
        let mut actual = delayed(&expected, 6);
        let mut mask = vec![true; expected.len()];
        for i in 400..600 {
            actual[i] = 50.0 * ((i * 7919) % 13) as f64;
            mask[i] = false;
        }
        let mut correlator = CrossCorrelator::new();
        let peak = correlator
            .correlate(&expected, &actual, &mask, DT, 1.0)
            .unwrap();
        assert!((peak.lag - 0.3).abs() < 1e-2, "got {}", peak.lag);
        assert!(peak.confidence > 0.95);
    }

    #[test]
    fn test_outputs_stay_in_range() {
        let expected = signal(600);
        let actual: Vec<f64> = (0..600).map(|i| ((i * 31) % 17) as f64 - 8.0).collect();
        let mask: Vec<bool> = (0..600).map(|i| i % 5 != 0).collect();
        let mut correlator = CrossCorrelator::new();
        for max_lag in [0.05, 0.5, 1.0, 2.0] {
            let peak = correlator
                .correlate(&expected, &actual, &mask, DT, max_lag)
                .unwrap();
            assert!(peak.lag >= 0.0 && peak.lag <= max_lag, "lag {}", peak.lag);
            assert!((-1.0..=1.0).contains(&peak.confidence));
        }
    }

    #[test]
    fn test_zero_signal_has_zero_confidence() {
        let zeros = vec![0.0; 500];
        let mask = vec![true; 500];
        let mut correlator = CrossCorrelator::new();
        let peak = correlator.correlate(&zeros, &zeros, &mask, DT, 1.0).unwrap();
        assert_eq!(peak.confidence, 0.0);
        assert!(peak.lag.is_finite());
    }

    #[test]
    fn test_fully_masked_has_zero_confidence() {
        let expected = signal(500);
        let actual = delayed(&expected, 4);
        let mask = vec![false; 500];
        let mut correlator = CrossCorrelator::new();
        let peak = correlator
            .correlate(&expected, &actual, &mask, DT, 1.0)
            .unwrap();
        assert_eq!(peak.confidence, 0.0);
        assert_eq!(peak.lag, 0.0);
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        let mut correlator = CrossCorrelator::new();
        let err = correlator
            .correlate(&[0.0; 10], &[0.0; 9], &[true; 10], DT, 1.0)
            .unwrap_err();
        assert!(matches!(err, ContractError::InvalidInput { .. }));

        let err = correlator
            .correlate(&[0.0; 10], &[0.0; 10], &[true; 8], DT, 1.0)
            .unwrap_err();
        assert!(matches!(err, ContractError::InvalidInput { .. }));
    }

    #[test]
    fn test_unbounded_max_lag_rejected() {
        let mut correlator = CrossCorrelator::new();
        for max_lag in [f64::INFINITY, f64::NAN, 1e300] {
            let err = correlator
                .correlate(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], &[true; 3], 0.05, max_lag)
                .unwrap_err();
            assert!(matches!(err, ContractError::InvalidInput { .. }), "{max_lag}");
        }
    }

    #[test]
    fn test_sub_sample_lag_lands_between_samples() {
        // Band-limited signal delayed by 4.5 samples
        let len = 1500;
        let lag = 4.5;
        let wave = |x: f64| (0.35 * x).sin() + 0.6 * (0.11 * x + 0.4).sin();
        let expected: Vec<f64> = (0..len).map(|i| wave(i as f64)).collect();
        let actual: Vec<f64> = (0..len).map(|i| wave(i as f64 - lag)).collect();
        let mask = vec![true; len];
        let mut correlator = CrossCorrelator::new();
        let peak = correlator
            .correlate(&expected, &actual, &mask, 1.0, 20.0)
            .unwrap();
        assert!((peak.lag - lag).abs() < 0.1, "got {}", peak.lag);
    }
}
