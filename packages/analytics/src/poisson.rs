//! Poisson probability mass function.

use statrs::distribution::{Discrete, Poisson};

use crate::AnalyticsError;

/// Probability of observing exactly `k` events when `mean` are expected.
///
/// A zero mean puts all mass on `k = 0`.
///
/// # Errors
///
/// Returns [`AnalyticsError::InvalidParameter`] if `mean` is negative or
/// not finite.
pub fn pmf(k: u64, mean: f64) -> Result<f64, AnalyticsError> {
    if !(mean.is_finite() && mean >= 0.0) {
        return Err(AnalyticsError::InvalidParameter { name: "mean", value: mean });
    }
    if mean <= 0.0 {
        return Ok(if k == 0 { 1.0 } else { 0.0 });
    }

    let distribution = Poisson::new(mean)
        .map_err(|_| AnalyticsError::InvalidParameter { name: "mean", value: mean })?;
    Ok(distribution.pmf(k))
}
