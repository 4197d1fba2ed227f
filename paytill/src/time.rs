//! Epoch-seconds timestamps for intent and notification records.

use std::time::SystemTime;

/// Returns the current system time as seconds since the Unix epoch.
///
/// # Panics
///
/// Panics if the system clock is set to a time before the Unix epoch,
/// which should never happen on properly configured systems.
#[must_use]
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("SystemTime before UNIX epoch?!?")
        .as_secs()
}
