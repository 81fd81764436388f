//! Box-map breaks (quartiles plus hinge fences).
//!
//! Quartiles use midpoint plotting positions: the `i`-th smallest of `n`
//! values sits at percentile `100 * (i + 0.5) / n`, and percentiles between
//! two positions are linearly interpolated. Percentiles outside the first
//! and last positions clamp to the minimum and maximum.

use transit_density_analytics_models::{BoxBreaks, BoxCategory};

use crate::AnalyticsError;

/// Fence multiplier for the common 1.5 × IQR box map.
pub const DEFAULT_HINGE: f64 = 1.5;

/// Computes quartiles and fences for `values`.
///
/// # Errors
///
/// * [`AnalyticsError::EmptyInput`] if there are no values
/// * [`AnalyticsError::InvalidParameter`] if `hinge` is not positive and
///   finite, or any value is not finite
pub fn box_breaks(values: &[f64], hinge: f64) -> Result<BoxBreaks, AnalyticsError> {
    if !(hinge.is_finite() && hinge > 0.0) {
        return Err(AnalyticsError::InvalidParameter {
            name: "hinge",
            value: hinge,
        });
    }
    if values.is_empty() {
        return Err(AnalyticsError::EmptyInput { what: "values" });
    }
    if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
        return Err(AnalyticsError::InvalidParameter {
            name: "value",
            value: *bad,
        });
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let q1 = percentile(&sorted, 25.0);
    let median = percentile(&sorted, 50.0);
    let q3 = percentile(&sorted, 75.0);
    let iqr = q3 - q1;

    Ok(BoxBreaks {
        hinge,
        lower_fence: hinge.mul_add(-iqr, q1),
        q1,
        median,
        q3,
        upper_fence: hinge.mul_add(iqr, q3),
    })
}

/// Bins every value against breaks computed from the same values.
///
/// # Errors
///
/// See [`box_breaks`].
pub fn box_map(values: &[f64], hinge: f64) -> Result<(BoxBreaks, Vec<BoxCategory>), AnalyticsError> {
    let breaks = box_breaks(values, hinge)?;
    let categories = values.iter().map(|v| breaks.classify(*v)).collect();
    Ok((breaks, categories))
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let n = sorted.len() as f64;
    let position = p * n / 100.0 - 0.5;

    if position <= 0.0 {
        return sorted[0];
    }
    let last = sorted.len() - 1;

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lower = position.floor() as usize;
    if lower >= last {
        return sorted[last];
    }

    #[allow(clippy::cast_precision_loss)]
    let fraction = position - lower as f64;
    fraction.mul_add(sorted[lower + 1] - sorted[lower], sorted[lower])
}
