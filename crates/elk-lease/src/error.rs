use std::fmt;

use elk_schemas::User;

/// Lease operation outcomes that are not a success.
///
/// Neither variant is exceptional. `AlreadyLocked` is a normal business
/// answer rendered to the user as "being edited by ...". `Stale` means the
/// caller's lease is gone (reaped or superseded); the caller re-acquires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseError {
    AlreadyLocked { holder: User },
    Stale,
}

impl fmt::Display for LeaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaseError::AlreadyLocked { holder } => write!(
                f,
                "record is being edited by {} (user {})",
                holder.fullname, holder.id
            ),
            LeaseError::Stale => f.write_str("lease no longer exists"),
        }
    }
}

impl std::error::Error for LeaseError {}
