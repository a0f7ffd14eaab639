//! Column clean-up applied to every scraped table before analysis.
//!
//! Every numeric coercion here is silent: a cell that cannot be read as a
//! number becomes null rather than failing the request.

use crate::domain::model::{Dataset, Record};
use crate::utils::error::{EtlError, Result};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

pub const GROSS: &str = "Gross";
pub const WORLDWIDE_GROSS: &str = "Worldwide gross";
pub const YEAR: &str = "Year";
pub const TITLE: &str = "Title";

fn non_numeric() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\d.]").expect("static regex"))
}

fn parenthesized_year() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\((\d{4})\)").expect("static regex"))
}

fn number_value(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Reads a currency-formatted cell such as `"$2,100,000,000"` as a float.
pub fn parse_gross(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => non_numeric()
            .replace_all(s, "")
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite()),
        _ => None,
    }
}

/// The first `(YYYY)` in a title, as a float.
pub fn extract_year(title: &str) -> Option<f64> {
    parenthesized_year()
        .captures(title)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

pub fn trim_column_names(data: &mut Dataset) {
    data.rename_columns(|c| c.trim().to_string());
}

/// Fills `Gross` from `Worldwide gross`, falling back to an existing `Gross`.
pub fn derive_gross(data: &mut Dataset) -> Result<()> {
    let source = [WORLDWIDE_GROSS, GROSS]
        .into_iter()
        .find(|c| data.has_column(c))
        .ok_or_else(|| EtlError::MissingColumnError {
            column: GROSS.to_string(),
        })?;

    tracing::debug!(source, "deriving {} column", GROSS);
    data.derive_column(GROSS, |r| {
        parse_gross(r.get(source)).map_or(Value::Null, number_value)
    });
    Ok(())
}

/// Makes every non-null `Title` cell a string.
pub fn coerce_title(data: &mut Dataset) {
    if !data.has_column(TITLE) {
        return;
    }
    data.derive_column(TITLE, |r| match r.get(TITLE) {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    });
}

/// Coerces an existing `Year` to numbers, or derives it from `Title`.
pub fn derive_year(data: &mut Dataset) -> Result<()> {
    if data.has_column(YEAR) {
        data.derive_column(YEAR, |r: &Record| r.number(YEAR).map_or(Value::Null, number_value));
        return Ok(());
    }

    if !data.has_column(TITLE) {
        return Err(EtlError::processing(format!(
            "{} column not found; cannot derive {}",
            TITLE, YEAR
        )));
    }

    data.derive_column(YEAR, |r| {
        r.text(TITLE)
            .and_then(extract_year)
            .map_or(Value::Null, number_value)
    });
    Ok(())
}

/// Runs every normalization step in order.
pub fn normalize(mut data: Dataset) -> Result<Dataset> {
    trim_column_names(&mut data);
    derive_gross(&mut data)?;
    coerce_title(&mut data);
    derive_year(&mut data)?;
    Ok(data)
}
