use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{AppError, AppResult, FieldError};

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Trims optional text; blank becomes `None`.
pub fn clean_text(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Deserializes a field that may be absent (`None`), explicitly `null`
/// (`Some(None)`) or set (`Some(Some(v))`). Use with `#[serde(default)]`.
pub fn nullable<'de, D, T>(d: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    <Option<T> as serde::Deserialize>::deserialize(d).map(Some)
}

/// Collects field errors so a request reports all of them at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ok: bool, field: &str, message: &str) -> &mut Self {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    pub fn required(&mut self, value: Option<&str>, field: &str) -> &mut Self {
        let present = value.map(|v| !v.trim().is_empty()).unwrap_or(false);
        self.check(present, field, "is required")
    }

    pub fn non_negative(&mut self, value: Option<f64>, field: &str) -> &mut Self {
        let ok = value.map(|v| v.is_finite() && v >= 0.0).unwrap_or(true);
        self.check(ok, field, "must be a non-negative number")
    }

    pub fn positive(&mut self, value: Option<f64>, field: &str) -> &mut Self {
        let ok = value.map(|v| v.is_finite() && v > 0.0).unwrap_or(true);
        self.check(ok, field, "must be greater than zero")
    }

    pub fn push(&mut self, err: FieldError) -> &mut Self {
        self.errors.push(err);
        self
    }

    pub fn extend(&mut self, errs: impl IntoIterator<Item = FieldError>) -> &mut Self {
        self.errors.extend(errs);
        self
    }

    pub fn finish(&mut self) -> AppResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(std::mem::take(&mut self.errors)))
        }
    }
}
