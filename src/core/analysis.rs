//! The four questions asked of every normalized table.

use crate::core::normalize::{GROSS, TITLE, YEAR};
use crate::domain::model::{Dataset, LinearFit};
use crate::utils::error::{EtlError, Result};
use std::cmp::Ordering;

pub const RANK: &str = "Rank";
pub const PEAK: &str = "Peak";

pub const NOT_FOUND: &str = "Not found";

const TWO_BILLION: f64 = 2_000_000_000.0;
const ONE_AND_A_HALF_BILLION: f64 = 1_500_000_000.0;
const CUTOFF_YEAR: f64 = 2000.0;

/// Rows grossing at least $2B that were released before 2000.
pub fn count_two_billion_before_2000(data: &Dataset) -> usize {
    data.records
        .iter()
        .filter(|r| match (r.number(GROSS), r.number(YEAR)) {
            (Some(gross), Some(year)) => gross >= TWO_BILLION && year < CUTOFF_YEAR,
            _ => false,
        })
        .count()
}

/// Title of the earliest row grossing over $1.5B, or [`NOT_FOUND`].
///
/// Ties on year keep table order; rows without a year sort last.
pub fn earliest_over_one_and_a_half_billion(data: &Dataset) -> Result<String> {
    let mut matches: Vec<_> = data
        .records
        .iter()
        .filter(|r| r.number(GROSS).is_some_and(|g| g > ONE_AND_A_HALF_BILLION))
        .collect();

    matches.sort_by(|a, b| match (a.number(YEAR), b.number(YEAR)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    let Some(first) = matches.first() else {
        return Ok(NOT_FOUND.to_string());
    };

    if !data.has_column(TITLE) {
        return Err(EtlError::processing(format!("{} column not found", TITLE)));
    }

    Ok(first.text(TITLE).unwrap_or_default().to_string())
}

/// (Rank, Peak) pairs where both cells are numeric. Empty when either column
/// is absent.
pub fn rank_peak_pairs(data: &Dataset) -> Vec<(f64, f64)> {
    if !data.has_column(RANK) || !data.has_column(PEAK) {
        return Vec::new();
    }

    data.records
        .iter()
        .filter_map(|r| Some((r.number(RANK)?, r.number(PEAK)?)))
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Pearson's r. `None` for fewer than two pairs or a constant series.
pub fn pearson(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }

    let mx = mean(pairs.iter().map(|p| p.0))?;
    let my = mean(pairs.iter().map(|p| p.1))?;

    let (sxy, sxx, syy) = pairs.iter().fold((0.0, 0.0, 0.0), |(sxy, sxx, syy), &(x, y)| {
        let (dx, dy) = (x - mx, y - my);
        (sxy + dx * dy, sxx + dx * dx, syy + dy * dy)
    });

    let denom = (sxx * syy).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return None;
    }

    Some((sxy / denom).clamp(-1.0, 1.0))
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Rank/Peak correlation rounded to six decimals.
pub fn rank_peak_correlation(data: &Dataset) -> Option<f64> {
    pearson(&rank_peak_pairs(data)).map(|r| round_to(r, 6))
}

/// Least-squares fit of y on x. A constant x gives a flat line through mean(y).
pub fn fit_line(pairs: &[(f64, f64)]) -> Option<LinearFit> {
    let mx = mean(pairs.iter().map(|p| p.0))?;
    let my = mean(pairs.iter().map(|p| p.1))?;

    let (sxy, sxx) = pairs.iter().fold((0.0, 0.0), |(sxy, sxx), &(x, y)| {
        (sxy + (x - mx) * (y - my), sxx + (x - mx) * (x - mx))
    });

    let slope = if sxx == 0.0 { 0.0 } else { sxy / sxx };
    Some(LinearFit {
        slope,
        intercept: my - slope * mx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::normalize::normalize;
    use crate::domain::model::Record;
    use serde_json::{json, Value};

    fn dataset(columns: &[&str], rows: &[Vec<Value>]) -> Dataset {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let records = rows
            .iter()
            .map(|row| {
                let mut r = Record::default();
                for (c, v) in columns.iter().zip(row) {
                    r.set(c.clone(), v.clone());
                }
                r
            })
            .collect();
        Dataset::new(columns, records)
    }

    fn three_films() -> Dataset {
        normalize(dataset(
            &["Title", "Worldwide gross"],
            &[
                vec![json!("A (1999)"), json!("$2,100,000,000")],
                vec![json!("B (2001)"), json!("$1,600,000,000")],
                vec![json!("C (2010)"), json!("$1,000,000,000")],
            ],
        ))
        .unwrap()
    }

    #[test]
    fn test_count_and_earliest_on_derived_years() {
        let ds = three_films();
        assert_eq!(count_two_billion_before_2000(&ds), 1);
        assert_eq!(earliest_over_one_and_a_half_billion(&ds).unwrap(), "A");
    }

    #[test]
    fn test_count_includes_exact_threshold() {
        let ds = normalize(dataset(
            &["Title", "Gross", "Year"],
            &[
                vec![json!("Titanic"), json!("$2,100,000,000"), json!(1997)],
                vec![json!("Exact"), json!("2000000000"), json!(1998)],
                vec![json!("Late"), json!("$3,000,000,000"), json!(2000)],
                vec![json!("Unknown"), Value::Null, json!(1990)],
            ],
        ))
        .unwrap();
        assert_eq!(count_two_billion_before_2000(&ds), 2);
    }

    #[test]
    fn test_earliest_not_found_sentinel() {
        let ds = normalize(dataset(
            &["Title", "Gross", "Year"],
            &[vec![json!("Small"), json!("$1,500,000,000"), json!(1990)]],
        ))
        .unwrap();
        assert_eq!(earliest_over_one_and_a_half_billion(&ds).unwrap(), NOT_FOUND);
    }

    #[test]
    fn test_earliest_ties_keep_table_order_and_null_years_last() {
        let ds = normalize(dataset(
            &["Title", "Gross", "Year"],
            &[
                vec![json!("NoYear"), json!("$2,000,000,000"), Value::Null],
                vec![json!("First2009"), json!("$2,000,000,000"), json!(2009)],
                vec![json!("Second2009"), json!("$2,000,000,000"), json!(2009)],
            ],
        ))
        .unwrap();
        assert_eq!(earliest_over_one_and_a_half_billion(&ds).unwrap(), "First2009");
    }

    #[test]
    fn test_rank_peak_pairs_drop_non_numeric() {
        let ds = dataset(
            &["Rank", "Peak"],
            &[
                vec![json!(1), json!(1)],
                vec![json!("2"), json!("n/a")],
                vec![json!(3), json!("2")],
            ],
        );
        assert_eq!(rank_peak_pairs(&ds), vec![(1.0, 1.0), (3.0, 2.0)]);
    }

    #[test]
    fn test_correlation_absent_columns_is_none() {
        let ds = dataset(&["Rank"], &[vec![json!(1)], vec![json!(2)]]);
        assert_eq!(rank_peak_correlation(&ds), None);
    }

    #[test]
    fn test_correlation_rounded_and_bounded() {
        let ds = dataset(
            &["Rank", "Peak"],
            &[
                vec![json!(1), json!(1)],
                vec![json!(2), json!(1)],
                vec![json!(3), json!(2)],
                vec![json!(4), json!(5)],
            ],
        );
        let r = rank_peak_correlation(&ds).unwrap();
        assert!((-1.0..=1.0).contains(&r));
        assert_eq!(r, round_to(r, 6));
        assert!((r - 0.886593).abs() < 1e-9);
    }

    #[test]
    fn test_correlation_degenerate_cases() {
        assert_eq!(pearson(&[]), None);
        assert_eq!(pearson(&[(1.0, 2.0)]), None);
        assert_eq!(pearson(&[(1.0, 2.0), (2.0, 2.0)]), None);
        assert_eq!(pearson(&[(1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]), Some(1.0));
    }

    #[test]
    fn test_fit_line() {
        let fit = fit_line(&[(1.0, 3.0), (2.0, 5.0), (3.0, 7.0)]).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!((fit.intercept - 1.0).abs() < 1e-12);
        assert!((fit.predict(4.0) - 9.0).abs() < 1e-12);

        let flat = fit_line(&[(2.0, 1.0), (2.0, 3.0)]).unwrap();
        assert_eq!(flat.slope, 0.0);
        assert_eq!(flat.intercept, 2.0);

        assert!(fit_line(&[]).is_none());
    }
}
