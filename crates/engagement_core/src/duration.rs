//! crates/engagement_core/src/duration.rs
//!
//! Conversion between `HH:MM:SS` style text and integer seconds. Durations are
//! kept as seconds everywhere else; text only exists at the boundary.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    #[error("Malformed duration '{0}'")]
    Malformed(String),
}

/// Parses `HH:MM:SS`, `MM:SS` or `SS`. Empty input is zero seconds.
pub fn seconds_from_duration(text: &str) -> Result<u64, DurationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(0);
    }

    let segments = trimmed
        .split(':')
        .map(|segment| segment.trim().parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| DurationError::Malformed(trimmed.to_string()))?;

    let seconds = match segments.as_slice() {
        [h, m, s] => h
            .checked_mul(3600)
            .and_then(|hours| hours.checked_add(m.checked_mul(60)?))
            .and_then(|total| total.checked_add(*s)),
        [m, s] => m.checked_mul(60).and_then(|total| total.checked_add(*s)),
        [s] => Some(*s),
        _ => None,
    };
    seconds.ok_or_else(|| DurationError::Malformed(trimmed.to_string()))
}

/// Formats seconds as zero-padded `HH:MM:SS`. Hours are not capped at 24.
pub fn duration_from_seconds(total: u64) -> String {
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
