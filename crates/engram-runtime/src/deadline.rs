use std::time::{Duration, Instant};

use crate::{Error, Result};

/// Cooperative request deadline, checked at every storage I/O boundary.
///
/// Exceeding the deadline aborts before the next I/O; since write paths
/// check before commit, partial writes roll back with the transaction.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Instant,
}

impl Deadline {
    pub fn after_secs(secs: u64) -> Self {
        Self {
            expires_at: Instant::now() + Duration::from_secs(secs),
        }
    }

    pub fn after(duration: Duration) -> Self {
        Self {
            expires_at: Instant::now() + duration,
        }
    }

    pub fn check(&self) -> Result<()> {
        if Instant::now() >= self.expires_at {
            Err(Error::DeadlineExceeded)
        } else {
            Ok(())
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_deadline_passes() {
        let deadline = Deadline::after_secs(30);
        assert!(deadline.check().is_ok());
    }

    #[test]
    fn test_elapsed_deadline_fails() {
        let deadline = Deadline::after(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(2));
        assert!(matches!(deadline.check(), Err(Error::DeadlineExceeded)));
    }
}
