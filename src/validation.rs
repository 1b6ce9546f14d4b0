use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

/// Field name -> ordered list of human-readable violation messages.
pub type ValidationErrors = BTreeMap<String, Vec<String>>;

/// A single validation check. A closed set instead of runtime-parsed rule
/// strings; the semantics of each variant match the classic pipe-rule names
/// (`required`, `min:N`, `max:N`, `email`, `date`, `numeric`, `in:a,b,c`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Required,
    /// Like `Required`, but only when the field is present: an absent or null
    /// field passes, a blank one does not. Used on partial updates where a
    /// column may be omitted but never blanked.
    Filled,
    Min(usize),
    Max(usize),
    Email,
    Date,
    Numeric,
    OneOf(&'static [&'static str]),
}

/// A rule set: each field paired with the checks that apply to it.
pub type RuleSet = &'static [(&'static str, &'static [Rule])];

/// Runs every rule of every field against the data bag, accumulating
/// violations. Only `Required` fires on an absent field; every other rule is
/// skipped when the field is absent or null. Output is deterministic for
/// identical input.
pub fn validate(data: &Map<String, Value>, rules: RuleSet) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    for (field, checks) in rules {
        let value = data.get(*field).filter(|v| !v.is_null());

        for check in *checks {
            let message = match (check, value) {
                (Rule::Required, None) => Some(format!("{field} is required")),
                (Rule::Required, Some(v)) | (Rule::Filled, Some(v))
                    if stringify(v).trim().is_empty() =>
                {
                    Some(format!("{field} is required"))
                }
                (Rule::Min(n), Some(v)) if stringify(v).chars().count() < *n => {
                    Some(format!("{field} must be at least {n} characters"))
                }
                (Rule::Max(n), Some(v)) if stringify(v).chars().count() > *n => {
                    Some(format!("{field} must be less than {n} characters"))
                }
                (Rule::Email, Some(v)) if !is_email(&stringify(v)) => {
                    Some(format!("{field} must be a valid email address"))
                }
                (Rule::Date, Some(v)) if !is_date(&stringify(v)) => {
                    Some(format!("{field} must be a valid date"))
                }
                (Rule::Numeric, Some(v)) if !is_numeric(v) => {
                    Some(format!("{field} must be numeric"))
                }
                (Rule::OneOf(allowed), Some(v)) if !allowed.contains(&stringify(v).as_str()) => {
                    Some(format!("{field} must be one of: {}", allowed.join(", ")))
                }
                _ => None,
            };

            if let Some(message) = message {
                errors.entry(field.to_string()).or_default().push(message);
            }
        }
    }

    errors
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn is_numeric(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => s.trim().parse::<f64>().is_ok(),
        _ => false,
    }
}

fn is_email(s: &str) -> bool {
    let mut parts = s.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && domain.contains('.')
                && !s.chars().any(char::is_whitespace)
        }
        _ => false,
    }
}

fn is_date(s: &str) -> bool {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
        || DateTime::parse_from_rfc3339(s).is_ok()
}
