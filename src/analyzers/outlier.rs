//! Interquartile-range outlier removal.

use tracing::{debug, info};

use crate::analyzers::types::{AcceptanceRange, OutlierMode};
use crate::analyzers::utility::{quantile_sorted, sorted};
use crate::error::Result;
use crate::table::Table;

/// Fewer non-missing values than this and no range is computed; every
/// non-missing record is kept.
pub const MIN_POINTS: usize = 4;

const IQR_FACTOR: f64 = 1.5;

/// Computes `[Q1 - 1.5*IQR, Q3 + 1.5*IQR]` over `values`.
///
/// Returns `None` when there are fewer than [`MIN_POINTS`] values.
pub fn acceptance_range(values: &[f64]) -> Option<AcceptanceRange> {
    if values.len() < MIN_POINTS {
        return None;
    }
    let sorted = sorted(values);
    let q1 = quantile_sorted(&sorted, 0.25);
    let q3 = quantile_sorted(&sorted, 0.75);
    let iqr = q3 - q1;
    Some(AcceptanceRange {
        q1,
        q3,
        lower: q1 - IQR_FACTOR * iqr,
        upper: q3 + IQR_FACTOR * iqr,
    })
}

/// One filtering pass over `field`. Records whose value is missing are
/// always dropped.
#[tracing::instrument(skip(table), fields(rows = table.len()))]
pub fn remove_outliers(table: &Table, field: &str) -> Result<Table> {
    let idx = table.column_index(field)?;
    let values = table.numeric_values(field)?;
    let range = acceptance_range(&values);

    let kept = table.filter(|r| match (r.get(idx).as_f64(), &range) {
        (Some(v), Some(range)) => range.contains(v),
        (Some(_), None) => true,
        (None, _) => false,
    });

    match range {
        Some(range) => info!(
            q1 = range.q1,
            q3 = range.q3,
            lower = range.lower,
            upper = range.upper,
            removed = table.len() - kept.len(),
            "Outlier pass complete"
        ),
        None => debug!(
            points = values.len(),
            "Too few values for an acceptance range, keeping all non-missing rows"
        ),
    }

    Ok(kept)
}

/// Repeats [`remove_outliers`] until a pass removes nothing.
pub fn remove_outliers_until_stable(table: &Table, field: &str) -> Result<Table> {
    let mut current = remove_outliers(table, field)?;
    let mut passes = 1;
    loop {
        let next = remove_outliers(&current, field)?;
        if next.len() == current.len() {
            debug!(passes, "Outlier filter reached a fixed point");
            return Ok(current);
        }
        current = next;
        passes += 1;
    }
}

pub fn filter_outliers(table: &Table, field: &str, mode: OutlierMode) -> Result<Table> {
    match mode {
        OutlierMode::SinglePass => remove_outliers(table, field),
        OutlierMode::UntilStable => remove_outliers_until_stable(table, field),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::utility::median;
    use crate::table::Value;

    fn numbers(values: &[Option<f64>]) -> Table {
        Table::from_rows(
            vec!["Index".into(), "Number".into()],
            values
                .iter()
                .enumerate()
                .map(|(i, v)| vec![Value::Number(i as f64), Value::from(*v)])
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_range_for_small_sample() {
        let range = acceptance_range(&[1.0, 2.0, 3.0, 100.0]).unwrap();
        assert_eq!(range.q1, 1.75);
        assert_eq!(range.q3, 27.25);
        assert_eq!(range.iqr(), 25.5);
        assert_eq!(range.lower, -36.5);
        assert_eq!(range.upper, 65.5);
    }

    #[test]
    fn test_extreme_value_removed() {
        let t = numbers(&[Some(1.0), Some(2.0), Some(3.0), Some(100.0)]);
        let kept = remove_outliers(&t, "Number").unwrap();
        assert_eq!(kept.numeric_values("Number").unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_bounds_are_inclusive() {
        // iqr = 0 collapses the range onto the single repeated value
        let t = numbers(&[Some(5.0), Some(5.0), Some(5.0), Some(5.0), Some(6.0)]);
        let range = acceptance_range(&t.numeric_values("Number").unwrap()).unwrap();
        assert_eq!((range.lower, range.upper), (5.0, 5.0));
        let kept = remove_outliers(&t, "Number").unwrap();
        assert_eq!(kept.numeric_values("Number").unwrap(), vec![5.0; 4]);
    }

    #[test]
    fn test_missing_values_are_dropped() {
        let t = numbers(&[Some(1.0), None, Some(2.0), Some(3.0), Some(4.0)]);
        let kept = remove_outliers(&t, "Number").unwrap();
        assert_eq!(kept.len(), 4);
        assert!(kept.column("Number").unwrap().iter().all(|v| !v.is_missing()));
    }

    #[test]
    fn test_fewer_than_four_points_keeps_everything() {
        let t = numbers(&[Some(1.0), Some(1000.0), None]);
        let kept = remove_outliers(&t, "Number").unwrap();
        assert_eq!(kept.numeric_values("Number").unwrap(), vec![1.0, 1000.0]);
        assert!(acceptance_range(&[5.0]).is_none());
    }

    #[test]
    fn test_median_survives() {
        let values = [3.0, 5.0, 5.0, 6.0, 7.0, 8.0, 9.0, 250.0, -400.0];
        let t = numbers(&values.iter().copied().map(Some).collect::<Vec<_>>());
        let kept = remove_outliers(&t, "Number").unwrap();
        let m = median(&values).unwrap();
        assert!(kept.numeric_values("Number").unwrap().contains(&m));
    }

    #[test]
    fn test_until_stable_is_a_fixed_point() {
        let t = numbers(&[
            Some(1.0),
            Some(2.0),
            Some(2.0),
            Some(3.0),
            Some(3.0),
            Some(4.0),
            Some(9.0),
            Some(40.0),
            Some(1000.0),
        ]);
        let once = remove_outliers_until_stable(&t, "Number").unwrap();
        let twice = remove_outliers(&once, "Number").unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_single_pass_idempotent_on_clean_data() {
        let t = numbers(&[Some(10.0), Some(11.0), Some(12.0), Some(13.0), Some(50.0)]);
        let once = filter_outliers(&t, "Number", OutlierMode::SinglePass).unwrap();
        let twice = filter_outliers(&once, "Number", OutlierMode::SinglePass).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_unknown_field() {
        let t = numbers(&[Some(1.0)]);
        assert!(remove_outliers(&t, "Count").is_err());
    }
}
