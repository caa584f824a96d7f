//! Small shared helpers.

use uuid::Uuid;

/// Generate a unique event identifier: a time-ordered UUIDv7 with the
/// dashes stripped, always 32 lowercase hex characters.
pub fn unique_id() -> String {
    Uuid::now_v7().simple().to_string()
}
