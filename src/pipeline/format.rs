//! Number formatting for report cells.
//!
//! Two styles exist, matching how each field reads in a CMA:
//!
//! * **grouped**: en-US thousands separators, at most three fraction
//!   digits (`650000` → `650,000`, `1234.5` → `1,234.5`). Used for prices,
//!   proceeds and square footage.
//! * **plain**: the bare number (`195`, `201.5`, `2004`). Used for $/SF,
//!   years and day counts.
//!
//! A missing value formats as the empty string. Callers add literal
//! prefixes such as `$` themselves, so a missing price renders as a lone
//! `$`. Text values (a model that sends `"$650,000"` as a string) pass
//! through verbatim in both styles.

use crate::record::Scalar;

/// Format with thousands separators; empty when absent.
pub fn grouped(value: Option<&Scalar>) -> String {
    match value {
        Some(Scalar::Number(n)) => group_number(*n),
        Some(other) => scalar_text(other),
        None => String::new(),
    }
}

/// Format as a bare number; empty when absent.
pub fn plain(value: Option<&Scalar>) -> String {
    match value {
        Some(Scalar::Number(n)) => plain_number(*n),
        Some(other) => scalar_text(other),
        None => String::new(),
    }
}

/// Text fields (addresses, names, dates); numbers are printed plainly.
pub fn text(value: Option<&Scalar>) -> String {
    plain(value)
}

/// `$` followed by the grouped amount. The `$` stays when the amount is
/// absent.
pub fn currency(value: Option<&Scalar>) -> String {
    format!("${}", grouped(value))
}

fn scalar_text(value: &Scalar) -> String {
    match value {
        Scalar::Number(n) => plain_number(*n),
        Scalar::Text(s) => s.clone(),
        Scalar::Bool(b) => b.to_string(),
    }
}

fn non_finite(n: f64) -> Option<String> {
    if n.is_nan() {
        Some("NaN".to_string())
    } else if n.is_infinite() {
        Some(if n > 0.0 { "∞" } else { "-∞" }.to_string())
    } else {
        None
    }
}

/// Integers print without a fraction; everything else uses the shortest
/// round-trip representation.
fn plain_number(n: f64) -> String {
    if let Some(s) = non_finite(n) {
        return s;
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn group_number(n: f64) -> String {
    if let Some(s) = non_finite(n) {
        return s;
    }
    let fixed = format!("{:.3}", n.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let frac_part = frac_part.trim_end_matches('0');

    let mut out = String::with_capacity(fixed.len() + fixed.len() / 3 + 1);
    // Negatives that round to zero keep their sign, as en-US locale output does.
    if n.is_sign_negative() {
        out.push('-');
    }
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if !frac_part.is_empty() {
        out.push('.');
        out.push_str(frac_part);
    }
    out
}
