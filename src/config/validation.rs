use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid push URL '{url}': {reason}")]
    InvalidPushUrl { url: String, reason: String },

    #[error("{field} must be positive")]
    NotPositive { field: &'static str },

    #[error("push.interval_offset ({offset:?}) must be shorter than the push interval ({interval:?})")]
    OffsetExceedsInterval {
        offset: std::time::Duration,
        interval: std::time::Duration,
    },

    #[error("GDPR obfuscation is enabled but no pre-shared key is configured")]
    MissingGdprKey,

    #[error("GDPR obfuscation is enabled but no fields are configured")]
    NoGdprFields,

    #[error("Queue path must not be empty")]
    EmptyQueuePath,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_queue(config)?;
    validate_push(config)?;
    validate_collect(config)?;
    validate_gdpr(config)?;
    Ok(())
}

fn validate_queue(config: &Config) -> Result<(), ValidationError> {
    if config.queue.path.as_os_str().is_empty() {
        return Err(ValidationError::EmptyQueuePath);
    }
    Ok(())
}

/// Endpoint must be an absolute http(s) URL; sizes and intervals positive
fn validate_push(config: &Config) -> Result<(), ValidationError> {
    let push = &config.push;

    let url = reqwest::Url::parse(&push.url).map_err(|e| ValidationError::InvalidPushUrl {
        url: push.url.clone(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::InvalidPushUrl {
            url: push.url.clone(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }

    if push.batch_size == Some(0) {
        return Err(ValidationError::NotPositive {
            field: "push.batch_size",
        });
    }
    if push.attempts == 0 {
        return Err(ValidationError::NotPositive {
            field: "push.attempts",
        });
    }
    if push.timeout.as_duration().is_zero() {
        return Err(ValidationError::NotPositive {
            field: "push.timeout",
        });
    }

    if let Some(interval) = push.interval {
        if interval.as_duration().is_zero() {
            return Err(ValidationError::NotPositive {
                field: "push.interval",
            });
        }
        if let Some(offset) = push.interval_offset {
            if offset.as_duration() >= interval.as_duration() {
                return Err(ValidationError::OffsetExceedsInterval {
                    offset: offset.as_duration(),
                    interval: interval.as_duration(),
                });
            }
        }
    }

    Ok(())
}

fn validate_collect(config: &Config) -> Result<(), ValidationError> {
    if config.collect.attempts == 0 {
        return Err(ValidationError::NotPositive {
            field: "collect.attempts",
        });
    }
    if config.collect.progress_every == 0 {
        return Err(ValidationError::NotPositive {
            field: "collect.progress_every",
        });
    }
    Ok(())
}

fn validate_gdpr(config: &Config) -> Result<(), ValidationError> {
    let gdpr = &config.gdpr;
    if !gdpr.enabled {
        return Ok(());
    }

    match gdpr.psk.as_deref() {
        Some(psk) if !psk.is_empty() => {}
        _ => return Err(ValidationError::MissingGdprKey),
    }
    if gdpr.fields.is_empty() {
        return Err(ValidationError::NoGdprFields);
    }

    Ok(())
}
