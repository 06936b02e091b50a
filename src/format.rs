//! Display formatting for money, dates and areas.

use chrono::{DateTime, NaiveDate};

/// Group an unsigned integer with thousands separators.
fn group_thousands(n: u64) -> String {
  let digits = n.to_string();
  let mut out = String::with_capacity(digits.len() + digits.len() / 3);
  for (i, c) in digits.chars().enumerate() {
    if i > 0 && (digits.len() - i) % 3 == 0 {
      out.push(',');
    }
    out.push(c);
  }
  out
}

/// Round to a whole number and split off the sign.
fn rounded_parts(value: f64) -> (&'static str, String) {
  let rounded = value.round();
  let sign = if rounded < 0.0 { "-" } else { "" };
  (sign, group_thousands(rounded.abs() as u64))
}

/// Whole-dollar amount, e.g. `$1,000` or `-$1,000`. Cents are rounded.
pub fn format_currency(amount: f64) -> String {
  if !amount.is_finite() {
    return "-".to_string();
  }
  let (sign, digits) = rounded_parts(amount);
  format!("{}${}", sign, digits)
}

/// Long date such as `January 1, 2024`.
pub fn format_date(date: NaiveDate) -> String {
  date.format("%B %-d, %Y").to_string()
}

/// Format an API timestamp or date string; unparseable input is returned as is.
pub fn format_date_str(value: &str) -> String {
  if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
    return format_date(date);
  }
  if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
    return format_date(ts.date_naive());
  }
  for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
    if let Ok(ts) = chrono::NaiveDateTime::parse_from_str(value, pattern) {
      return format_date(ts.date());
    }
  }
  value.to_string()
}

/// Area in square feet, e.g. `1,000 sqft`.
pub fn format_area(square_feet: f64) -> String {
  if !square_feet.is_finite() {
    return "-".to_string();
  }
  let (sign, digits) = rounded_parts(square_feet);
  format!("{}{} sqft", sign, digits)
}
