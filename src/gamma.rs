//! Gamma look-up-table builder (§4.3).
//!
//! A pure, off-line transform: 11 luminance samples at equally spaced input
//! code values in, a 256-entry tone-mapping table out.

use crate::gamut::Measurement;

/// An ordered sequence of 256 corrected code values; index is the input
/// code value (§3 invariant: every entry is clamped to `[0, 255]`).
pub type GammaTable = [u8; 256];

/// Input code value spacing between the 11 samples (255 / 10).
const STEP: f64 = 25.5;

/// Builds a 256-entry gamma table from 11 measured luminance samples taken
/// at input code values `{0, 25.5, 51, ..., 255}` (§4.3).
///
/// `samples[i].y_lum` is the measured luminance; `x`/`y` chromaticity on the
/// samples is unused here (the caller may reuse [`Measurement`] values that
/// also fed [`crate::gamut::solve_gamut`]).
pub fn build_gamma(samples: &[Measurement; 11]) -> GammaTable {
    let white_y = samples[10].y_lum;
    let mut table = [0u8; 256];

    for (i, slot) in table.iter_mut().enumerate() {
        let t_y = (i as f64 / 255.0).powf(2.2) * white_y;

        // Smallest segment s in [0, 10) with samples[s].Y <= tY <= samples[s+1].Y.
        // Falls through to segment 0 when no segment matches (§9 — preserved
        // deliberately; this is what produces the all-zero table in the flat
        // luminance scenario).
        let mut seg = 0usize;
        for s in 0..10 {
            if samples[s].y_lum <= t_y && t_y <= samples[s + 1].y_lum {
                seg = s;
                break;
            }
        }

        let x0 = STEP * seg as f64;
        let x1 = STEP * (seg + 1) as f64;
        let y0 = samples[seg].y_lum;
        let y1 = samples[seg + 1].y_lum;

        let v = if (y1 - y0).abs() < 1e-9 {
            x0
        } else {
            x0 + (t_y - y0) * (x1 - x0) / (y1 - y0)
        };

        let v_trunc = v.trunc();
        let clamped = v_trunc.clamp(0.0, 255.0);
        *slot = clamped as u8;
    }

    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_at(i: usize, y: f64) -> Measurement {
        let _ = i;
        Measurement::new(0.3, 0.3, y)
    }

    #[test]
    fn ideal_2_2_curve_matches_checkpoints() {
        let samples: Vec<Measurement> = (0..11)
            .map(|i| sample_at(i, (i as f64 / 10.0).powf(2.2) * 100.0))
            .collect();
        let samples: [Measurement; 11] = samples.try_into().unwrap();

        let table = build_gamma(&samples);
        assert_eq!(table[0], 0);
        assert!((127..=128).contains(&table[128]), "table[128]={}", table[128]);
        assert!((254..=255).contains(&table[255]), "table[255]={}", table[255]);
    }

    #[test]
    fn flat_luminance_yields_all_zero_table() {
        let samples: [Measurement; 11] = [sample_at(0, 100.0); 11];
        let table = build_gamma(&samples);
        assert!(table.iter().all(|&v| v == 0));
    }

    #[test]
    fn every_entry_is_in_range_by_construction() {
        let samples: Vec<Measurement> = (0..11)
            .map(|i| sample_at(i, (i as f64 / 10.0).powf(2.2) * 100.0))
            .collect();
        let samples: [Measurement; 11] = samples.try_into().unwrap();
        let table = build_gamma(&samples);
        // u8 makes out-of-range unrepresentable; this documents the invariant.
        assert!(table.iter().all(|&v| v <= 255));
    }
}
