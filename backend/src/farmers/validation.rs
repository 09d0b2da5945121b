use std::borrow::Cow;
use validator::ValidationError;

use super::models::PreferredLanguage;

pub const MIN_PASSWORD_CHARS: usize = 8;
const DEFAULT_COUNTRY_CODE: &str = "91";
const BLANK: &str = "This field may not be blank.";

fn invalid(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    error
}

/// Normalizes a phone number to E.164. Numbers without a country code are
/// taken to be Indian.
pub fn normalize_phone(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    let international = trimmed.starts_with('+');
    let digits: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.' | '+'))
        .collect();
    let invalid = || "Enter a valid phone number.".to_string();

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if trimmed.matches('+').count() > 1 || (trimmed.contains('+') && !international) {
        return Err(invalid());
    }

    if international {
        return if (8..=15).contains(&digits.len()) && !digits.starts_with('0') {
            Ok(format!("+{}", digits))
        } else {
            Err(invalid())
        };
    }

    let national = if digits.len() == 11 && digits.starts_with('0') {
        &digits[1..]
    } else if digits.len() == 12 && digits.starts_with(DEFAULT_COUNTRY_CODE) {
        &digits[2..]
    } else {
        digits.as_str()
    };

    if national.len() == 10 && !national.starts_with('0') {
        Ok(format!("+{}{}", DEFAULT_COUNTRY_CODE, national))
    } else {
        Err(invalid())
    }
}

/// Trims the address and lower-cases its domain. Syntax is checked by the
/// request's `email` validation.
pub fn normalize_email(raw: &str) -> String {
    let email = raw.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

/// All rule violations for `password`, empty when it is acceptable.
pub fn password_problems(password: &str) -> Vec<String> {
    let mut problems = Vec::new();
    if password.chars().count() < MIN_PASSWORD_CHARS {
        problems.push(format!(
            "This password is too short. It must contain at least {} characters.",
            MIN_PASSWORD_CHARS
        ));
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("This password is entirely numeric.".to_string());
    }
    problems
}

pub fn parse_language(raw: &str) -> Result<PreferredLanguage, String> {
    PreferredLanguage::parse(raw.trim())
        .ok_or_else(|| format!("\"{}\" is not a valid choice.", raw.trim()))
}

pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(invalid("blank", BLANK));
    }
    Ok(())
}

pub fn valid_phone(value: &str) -> Result<(), ValidationError> {
    not_blank(value)?;
    normalize_phone(value)
        .map(|_| ())
        .map_err(|message| invalid("phone", message))
}

pub fn strong_password(value: &str) -> Result<(), ValidationError> {
    not_blank(value)?;
    let problems = password_problems(value);
    if problems.is_empty() {
        Ok(())
    } else {
        Err(invalid("password", problems.join(" ")))
    }
}

/// Blank means "keep the default".
pub fn valid_language(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Ok(());
    }
    parse_language(value)
        .map(|_| ())
        .map_err(|message| invalid("choice", message))
}
