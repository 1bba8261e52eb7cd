use crate::domain::model::PhoneNumber;
use crate::utils::error::{Result, WatchError};
use std::collections::HashSet;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(WatchError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(WatchError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(WatchError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(WatchError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(WatchError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

/// An unresolved `${VAR}` means the environment variable was not set.
pub fn validate_resolved(field_name: &str, value: &str) -> Result<()> {
    if value.contains("${") {
        return Err(WatchError::MissingConfigError {
            field: format!("{} (unset placeholder {})", field_name, value),
        });
    }
    Ok(())
}

pub fn validate_phone(field_name: &str, value: &str) -> Result<PhoneNumber> {
    PhoneNumber::parse(value).map_err(|reason| WatchError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason,
    })
}

/// Accepts "1".."31" with or without a leading zero; returns the two-digit form.
pub fn normalize_day(field_name: &str, value: &str) -> Result<String> {
    let invalid = |reason: &str| WatchError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.len() > 2 || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("Day must be one or two digits"));
    }
    let day: u8 = trimmed.parse().map_err(|_| invalid("Day must be numeric"))?;
    if !(1..=31).contains(&day) {
        return Err(invalid("Day must be between 01 and 31"));
    }
    Ok(format!("{:02}", day))
}

pub fn validate_centers(field_name: &str, centers: &[usize]) -> Result<()> {
    if centers.is_empty() {
        return Err(WatchError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: "[]".to_string(),
            reason: "At least one center index is required".to_string(),
        });
    }

    let mut seen = HashSet::new();
    for center in centers {
        if !seen.insert(center) {
            return Err(WatchError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: center.to_string(),
                reason: "Center index listed twice".to_string(),
            });
        }
    }
    Ok(())
}
