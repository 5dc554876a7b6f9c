// crates/ultimate-mcp-core/src/core/time.rs
// ============================================================================
// Module: Time Helpers
// Description: Wall-clock epoch accessors used for claims and audit records.
// Purpose: Keep system-time reads in one place with saturating conversions.
// Dependencies: std
// ============================================================================

//! Wall-clock helpers. Records store unix epoch values; windows and deadlines
//! use monotonic `Instant`s at their call sites.

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Returns the current unix time in milliseconds.
#[must_use]
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Returns the current unix time in seconds.
#[must_use]
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or(0)
}
