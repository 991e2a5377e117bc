/// Input validation helpers
///
/// Field-level rules live on the request structs as `validator` derives;
/// the checks here cover what the derives cannot express (age from a birth
/// date, password strength, free-text bodies).
use crate::error::{AppError, AppResult};
use chrono::{Datelike, NaiveDate};
use validator::{Validate, ValidationErrors};

/// Minimum age required to hold an account
pub const MINIMUM_AGE: u32 = 18;

/// Maximum length of a comment or reply
pub const MAX_TEXT_LENGTH: usize = 1000;

/// Run the derived validations on a request body
pub fn validate_request<T: Validate>(request: &T) -> AppResult<()> {
    request.validate().map_err(validation_errors_to_app_error)
}

/// Convert validator errors to AppError
pub fn validation_errors_to_app_error(errors: ValidationErrors) -> AppError {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errors)| {
            errors.iter().map(move |e| match &e.message {
                Some(message) => format!("{}: {}", field, message),
                None => format!("{}: invalid ({})", field, e.code),
            })
        })
        .collect();
    messages.sort();

    AppError::Validation(messages.join(", "))
}

/// Full years between `date_of_birth` and `today`
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        age -= 1;
    }
    age
}

/// Reject accounts younger than `MINIMUM_AGE`
pub fn ensure_adult(date_of_birth: NaiveDate, today: NaiveDate) -> AppResult<()> {
    if age_on(date_of_birth, today) < MINIMUM_AGE as i32 {
        return Err(AppError::Validation(format!(
            "You must be at least {} years old",
            MINIMUM_AGE
        )));
    }
    Ok(())
}

/// At least 8 characters with a lowercase letter, an uppercase letter,
/// a digit and a symbol
pub fn is_strong_password(password: &str) -> bool {
    password.chars().count() >= 8
        && password.chars().any(|c| c.is_lowercase())
        && password.chars().any(|c| c.is_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password
            .chars()
            .any(|c| !c.is_alphanumeric() && !c.is_whitespace())
}

pub fn ensure_strong_password(password: &str) -> AppResult<()> {
    if !is_strong_password(password) {
        return Err(AppError::Validation(
            "Password must be at least 8 characters long and include uppercase, lowercase, number, and symbol"
                .to_string(),
        ));
    }
    Ok(())
}

/// Usernames are stored trimmed and lowercase
pub fn normalize_username(username: &str) -> AppResult<String> {
    let username = username.trim().to_lowercase();

    if username.len() < 2 || username.len() > 15 {
        return Err(AppError::Validation(
            "Username must be between 2 and 15 characters".to_string(),
        ));
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        return Err(AppError::Validation(
            "Username contains invalid characters".to_string(),
        ));
    }

    Ok(username)
}

/// Trimmed, non-empty, bounded comment/reply text
pub fn clean_text(text: &str) -> AppResult<String> {
    let text = text.trim();

    if text.is_empty() {
        return Err(AppError::Validation("Text cannot be empty".to_string()));
    }

    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(AppError::Validation(format!(
            "Text exceeds maximum length of {} characters",
            MAX_TEXT_LENGTH
        )));
    }

    Ok(text.to_string())
}
