//! Homogeneous intensity model and per-tract significance classification.

use transit_density_analytics_models::{
    IntensityReport, RegionAggregate, RegionAggregateInput, Significance,
};

use crate::AnalyticsError;
use crate::poisson;

/// Default significance threshold.
pub const DEFAULT_ALPHA: f64 = 0.01;

/// Fits one intensity to all regions and classifies each one.
///
/// Regions without an observed count are treated as zero. Every area is
/// validated before anything is computed, so a bad region never yields a
/// partial report.
///
/// # Errors
///
/// * [`AnalyticsError::InvalidParameter`] if `alpha` is not in `(0, 1)`
/// * [`AnalyticsError::EmptyInput`] if `inputs` is empty
/// * [`AnalyticsError::InvalidRegion`] if any area is zero, negative, or
///   not finite
pub fn assess(
    inputs: &[RegionAggregateInput],
    alpha: f64,
) -> Result<IntensityReport, AnalyticsError> {
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(AnalyticsError::InvalidParameter {
            name: "alpha",
            value: alpha,
        });
    }
    if inputs.is_empty() {
        return Err(AnalyticsError::EmptyInput { what: "regions" });
    }
    if let Some(bad) = inputs
        .iter()
        .find(|r| !(r.area_km2.is_finite() && r.area_km2 > 0.0))
    {
        return Err(AnalyticsError::InvalidRegion {
            region_id: bad.region_id.clone(),
            area_km2: bad.area_km2,
        });
    }

    let total_observed: u64 = inputs.iter().map(|r| r.observed_count.unwrap_or(0)).sum();
    let total_area_km2: f64 = inputs.iter().map(|r| r.area_km2).sum();
    #[allow(clippy::cast_precision_loss)]
    let intensity = total_observed as f64 / total_area_km2;

    log::info!(
        "Fitted intensity {intensity:.4} per km² ({total_observed} over {total_area_km2:.3} km², {} regions)",
        inputs.len()
    );

    let regions = inputs
        .iter()
        .map(|input| {
            let observed_count = input.observed_count.unwrap_or(0);
            let expected_count = intensity * input.area_km2;
            let p_value = poisson::pmf(observed_count, expected_count)?;
            Ok(RegionAggregate {
                region_id: input.region_id.clone(),
                area_km2: input.area_km2,
                observed_count,
                expected_count,
                p_value,
                significance: classify(observed_count, expected_count, p_value, alpha),
            })
        })
        .collect::<Result<Vec<_>, AnalyticsError>>()?;

    let count_of = |class: Significance| regions.iter().filter(|r| r.significance == class).count();
    let report = IntensityReport {
        intensity,
        total_observed,
        total_area_km2,
        alpha,
        more_than_expected: count_of(Significance::MoreThanExpected),
        less_than_expected: count_of(Significance::LessThanExpected),
        non_significant: count_of(Significance::NonSignificant),
        regions,
    };

    log::info!(
        "More than expected: {}, less than expected: {}, non-significant: {}",
        report.more_than_expected,
        report.less_than_expected,
        report.non_significant,
    );

    Ok(report)
}

/// Relative difference under which an observed count is taken to equal its
/// expectation.
const EQUALITY_TOLERANCE: f64 = 1e-9;

/// Classifies one region. A region is significant only when `p_value` is
/// strictly below `alpha` and its observed count differs from the
/// expectation by more than rounding error.
#[must_use]
pub fn classify(observed: u64, expected: f64, p_value: f64, alpha: f64) -> Significance {
    #[allow(clippy::cast_precision_loss)]
    let deviation = observed as f64 - expected;
    if p_value >= alpha || deviation.abs() <= EQUALITY_TOLERANCE * expected.abs().max(1.0) {
        Significance::NonSignificant
    } else if deviation > 0.0 {
        Significance::MoreThanExpected
    } else {
        Significance::LessThanExpected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(id: &str, area: f64, count: u64) -> RegionAggregateInput {
        RegionAggregateInput::new(id, area, Some(count))
    }

    #[test]
    fn two_tract_split_is_significant_both_ways() {
        let report = assess(&[input("A", 1.0, 0), input("B", 1.0, 10)], 0.05).unwrap();

        assert!((report.intensity - 5.0).abs() < 1e-12);
        assert_eq!(report.total_observed, 10);

        let a = &report.regions[0];
        assert!((a.expected_count - 5.0).abs() < 1e-12);
        assert!((a.p_value - 0.006_737_9).abs() < 1e-6);
        assert_eq!(a.significance, Significance::LessThanExpected);

        let b = &report.regions[1];
        assert!((b.p_value - 0.018_13).abs() < 1e-4);
        assert_eq!(b.significance, Significance::MoreThanExpected);

        assert_eq!(report.more_than_expected, 1);
        assert_eq!(report.less_than_expected, 1);
        assert_eq!(report.non_significant, 0);
    }

    #[test]
    fn intensity_weights_by_area() {
        let report = assess(&[input("A", 2.0, 4), input("B", 3.0, 6)], 0.01).unwrap();

        assert!((report.intensity - 2.0).abs() < 1e-12);
        assert!((report.regions[0].expected_count - 4.0).abs() < 1e-12);
        assert!((report.regions[1].expected_count - 6.0).abs() < 1e-12);
        assert!((report.regions[0].p_value - 0.195_366_8).abs() < 1e-6);
        assert!(report
            .regions
            .iter()
            .all(|r| r.significance == Significance::NonSignificant));
    }

    #[test]
    fn expected_counts_sum_to_observed_total() {
        let inputs: Vec<_> = (0..25_u32)
            .map(|i| {
                input(
                    &format!("R{i}"),
                    0.3 + f64::from(i) * 0.17,
                    u64::from(i * 7 % 11),
                )
            })
            .collect();
        let report = assess(&inputs, DEFAULT_ALPHA).unwrap();

        let expected_total: f64 = report.regions.iter().map(|r| r.expected_count).sum();
        #[allow(clippy::cast_precision_loss)]
        let observed_total = report.total_observed as f64;
        assert!((expected_total - observed_total).abs() < 1e-9 * observed_total.max(1.0));
        assert!(report.regions.iter().all(|r| (0.0..=1.0).contains(&r.p_value)));
        assert_eq!(
            report.more_than_expected + report.less_than_expected + report.non_significant,
            inputs.len()
        );
    }

    #[test]
    fn observed_equal_to_expected_is_never_significant() {
        // p(1000; 1000) is about 0.0126, below alpha, but there is no
        // deviation to report.
        let report = assess(&[input("A", 1.0, 1_000), input("B", 1.0, 1_000)], 0.05).unwrap();
        assert!(report.regions[0].p_value < 0.05);
        assert!(report
            .regions
            .iter()
            .all(|r| r.significance == Significance::NonSignificant));
    }

    #[test]
    fn rounded_expectation_equal_to_observed_is_not_significant() {
        // Intensity is 3000 / 0.30000000000000004, so each expected count
        // lands a hair below its observed count.
        let report = assess(&[input("A", 0.1, 1_000), input("B", 0.2, 2_000)], 0.05).unwrap();
        assert!(report.regions.iter().all(|r| r.p_value < 0.05));
        assert!(report
            .regions
            .iter()
            .all(|r| r.significance == Significance::NonSignificant));
        assert_eq!(report.non_significant, 2);
    }

    #[test]
    fn missing_counts_are_zero() {
        let report = assess(
            &[
                RegionAggregateInput::new("A", 1.0, None),
                input("B", 1.0, 4),
            ],
            0.5,
        )
        .unwrap();
        assert_eq!(report.regions[0].observed_count, 0);
        assert!((report.intensity - 2.0).abs() < 1e-12);
    }

    #[test]
    fn all_zero_counts_are_non_significant() {
        let report = assess(&[input("A", 1.0, 0), input("B", 4.0, 0)], 0.05).unwrap();
        assert!(report.intensity.abs() < f64::EPSILON);
        assert!(report.regions.iter().all(|r| (r.p_value - 1.0).abs() < f64::EPSILON));
        assert_eq!(report.non_significant, 2);
    }

    #[test]
    fn rejects_degenerate_areas_before_computing() {
        for area in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = assess(&[input("A", 1.0, 3), input("bad", area, 1)], 0.01).unwrap_err();
            assert!(matches!(err, AnalyticsError::InvalidRegion { ref region_id, .. } if region_id == "bad"));
        }
    }

    #[test]
    fn rejects_empty_input() {
        assert_eq!(
            assess(&[], 0.01),
            Err(AnalyticsError::EmptyInput { what: "regions" })
        );
    }

    #[test]
    fn rejects_alpha_outside_unit_interval() {
        let inputs = [input("A", 1.0, 1)];
        for alpha in [0.0, 1.0, -0.5, 2.0, f64::NAN] {
            assert!(matches!(
                assess(&inputs, alpha),
                Err(AnalyticsError::InvalidParameter { name: "alpha", .. })
            ));
        }
    }

    #[test]
    fn classify_requires_low_p_and_real_deviation() {
        assert_eq!(classify(5, 5.0, 0.001, 0.01), Significance::NonSignificant);
        assert_eq!(
            classify(1_000, 999.999_999_999_999_9, 0.001, 0.01),
            Significance::NonSignificant
        );
        assert_eq!(classify(9, 5.0, 0.01, 0.01), Significance::NonSignificant);
        assert_eq!(classify(9, 5.0, 0.009, 0.01), Significance::MoreThanExpected);
        assert_eq!(classify(1, 5.0, 0.009, 0.01), Significance::LessThanExpected);
    }
}
