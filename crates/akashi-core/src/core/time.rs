// crates/akashi-core/src/core/time.rs
// ============================================================================
// Module: Akashi Time Model
// Description: Microsecond-truncated timestamps for hashing and bi-temporal fields.
// Purpose: Keep in-memory timestamps aligned with store precision.
// Dependencies: time
// ============================================================================

//! ## Overview
//! PostgreSQL stores timestamps with microsecond precision while the `time`
//! crate carries nanoseconds. Every timestamp that participates in content
//! hashing must be truncated to microseconds before hashing so a recompute
//! against a stored row reproduces the original digest. The canonical text
//! form is RFC 3339 UTC with exactly six fractional digits, produced by an
//! explicit formatter so digests never depend on a library formatter's
//! variable precision.

// ============================================================================
// SECTION: Imports
// ============================================================================

use time::OffsetDateTime;
use time::UtcOffset;

// ============================================================================
// SECTION: Truncation
// ============================================================================

/// Truncates a timestamp to microsecond precision.
///
/// # Invariants
/// - The result is always representable; truncation only zeroes sub-micro digits.
#[must_use]
pub fn truncate_micros(value: OffsetDateTime) -> OffsetDateTime {
    let micros = value.nanosecond() / 1_000;
    // replace_nanosecond only fails above 999_999_999, which micros * 1000 cannot reach.
    value.replace_nanosecond(micros * 1_000).unwrap_or(value)
}

/// Formats a timestamp as RFC 3339 UTC with exactly six fractional digits.
///
/// # Invariants
/// - Output is stable for equal microsecond-truncated inputs.
/// - The offset is always rendered as `Z`.
#[must_use]
pub fn format_micros(value: OffsetDateTime) -> String {
    let utc = value.to_offset(UtcOffset::UTC);
    let micros = utc.nanosecond() / 1_000;
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:06}Z",
        utc.year(),
        u8::from(utc.month()),
        utc.day(),
        utc.hour(),
        utc.minute(),
        utc.second(),
        micros
    )
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use time::Duration;
    use time::OffsetDateTime;

    use super::format_micros;
    use super::truncate_micros;

    #[test]
    fn truncation_zeroes_sub_micro_digits() {
        let base = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp");
        let with_nanos = base + Duration::nanoseconds(123_456_789);
        let truncated = truncate_micros(with_nanos);
        assert_eq!(truncated.nanosecond() % 1_000, 0);
        assert_eq!(truncated.nanosecond(), 123_456_000);
    }

    #[test]
    fn format_is_fixed_width() {
        let base = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp");
        let formatted = format_micros(base);
        assert_eq!(formatted, "2023-11-14T22:13:20.000000Z");
    }

    #[test]
    fn format_matches_truncated_value() {
        let base = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("timestamp");
        let with_nanos = base + Duration::nanoseconds(42_000_999);
        assert_eq!(format_micros(truncate_micros(with_nanos)), format_micros(with_nanos));
    }
}
