// Buffer-growth fetcher for native tables of unknown size
// Native queries that fill a caller-supplied buffer only say "too small"
// after the fact, so the buffer grows between attempts up to a hard cap.

use serde::{Deserialize, Serialize};

use crate::error::{SnapshotError, SnapshotResult};

/// Outcome of one native query against a caller-supplied buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    /// The query succeeded and wrote this many bytes
    Filled(usize),
    /// The buffer was too small; some APIs also report the size they need
    BufferTooSmall { required: Option<usize> },
    /// Any other native status code
    Failed(i32),
}

/// Growth configuration for [`fetch_with_growth`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrowthPolicy {
    #[serde(default = "default_initial_size")]
    pub initial_size: usize,
    #[serde(default = "default_growth_factor")]
    pub growth_factor: usize,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_initial_size() -> usize {
    4 * 1024
}
fn default_growth_factor() -> usize {
    2
}
fn default_max_size() -> usize {
    16 * 1024 * 1024
}
fn default_max_attempts() -> u32 {
    8
}

impl Default for GrowthPolicy {
    fn default() -> Self {
        GrowthPolicy {
            initial_size: default_initial_size(),
            growth_factor: default_growth_factor(),
            max_size: default_max_size(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl GrowthPolicy {
    /// Copy of this policy starting from at least `hint` bytes
    pub fn starting_at(&self, hint: usize) -> Self {
        GrowthPolicy {
            initial_size: self.initial_size.max(hint),
            ..self.clone()
        }
    }

    /// Size of the buffer to try after `current` was reported too small
    pub fn next_size(&self, current: usize, required: Option<usize>) -> usize {
        let grown = current.saturating_mul(self.growth_factor.max(2));
        grown.max(required.unwrap_or(0))
    }
}

/// Run `query` until it fills a buffer, growing the buffer on each
/// "too small" report.
///
/// The returned vector is truncated to the length the query reported.
/// Fails with [`SnapshotError::NativeCallFailed`] on any other status and with
/// [`SnapshotError::TableTooLarge`] once `max_attempts` calls were spent or
/// the next size would exceed `max_size`.
pub fn fetch_with_growth<F>(
    call: &'static str,
    policy: &GrowthPolicy,
    mut query: F,
) -> SnapshotResult<Vec<u8>>
where
    F: FnMut(&mut [u8]) -> QueryOutcome,
{
    let mut size = policy.initial_size.clamp(1, policy.max_size.max(1));
    let mut attempt = 0;

    loop {
        attempt += 1;
        let mut buf = vec![0u8; size];

        match query(&mut buf) {
            QueryOutcome::Filled(len) => {
                if attempt > 1 {
                    tracing::debug!(call, attempt, size, "table fetched after growing buffer");
                }
                buf.truncate(len.min(size));
                return Ok(buf);
            }
            QueryOutcome::BufferTooSmall { required } => {
                let next = policy.next_size(size, required);
                if attempt >= policy.max_attempts || next > policy.max_size {
                    return Err(SnapshotError::TableTooLarge {
                        call,
                        attempts: attempt,
                        size: next,
                    });
                }
                tracing::trace!(call, attempt, size, next, "buffer too small, growing");
                size = next;
            }
            QueryOutcome::Failed(code) => {
                return Err(SnapshotError::NativeCallFailed { call, code });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grows_twice_then_succeeds() {
        let policy = GrowthPolicy {
            initial_size: 16,
            ..GrowthPolicy::default()
        };
        let mut calls = Vec::new();

        let buf = fetch_with_growth("stub", &policy, |buf| {
            calls.push(buf.len());
            if calls.len() < 3 {
                return QueryOutcome::BufferTooSmall { required: None };
            }
            buf[..4].copy_from_slice(&[3, 3, 3, 3]);
            QueryOutcome::Filled(4)
        })
        .unwrap();

        assert_eq!(calls, vec![16, 32, 64]);
        assert_eq!(buf, vec![3, 3, 3, 3]);
    }

    #[test]
    fn test_required_size_wins_over_factor() {
        let policy = GrowthPolicy {
            initial_size: 8,
            ..GrowthPolicy::default()
        };
        let mut sizes = Vec::new();

        fetch_with_growth("stub", &policy, |buf| {
            sizes.push(buf.len());
            if buf.len() < 1000 {
                QueryOutcome::BufferTooSmall { required: Some(1000) }
            } else {
                QueryOutcome::Filled(1000)
            }
        })
        .unwrap();

        assert_eq!(sizes, vec![8, 1000]);
    }

    #[test]
    fn test_other_status_fails_immediately() {
        let mut calls = 0;
        let err = fetch_with_growth("stub", &GrowthPolicy::default(), |_| {
            calls += 1;
            QueryOutcome::Failed(87)
        })
        .unwrap_err();

        assert_eq!(calls, 1);
        assert!(matches!(
            err,
            SnapshotError::NativeCallFailed { call: "stub", code: 87 }
        ));
    }

    #[test]
    fn test_attempts_are_capped() {
        let policy = GrowthPolicy {
            initial_size: 4,
            growth_factor: 2,
            max_size: usize::MAX,
            max_attempts: 5,
        };
        let mut calls = 0;
        let err = fetch_with_growth("stub", &policy, |_| {
            calls += 1;
            QueryOutcome::BufferTooSmall { required: None }
        })
        .unwrap_err();

        assert_eq!(calls, 5);
        assert!(matches!(err, SnapshotError::TableTooLarge { attempts: 5, .. }));
    }

    #[test]
    fn test_size_is_capped() {
        let policy = GrowthPolicy {
            initial_size: 64,
            growth_factor: 2,
            max_size: 200,
            max_attempts: 100,
        };
        let mut sizes = Vec::new();
        let err = fetch_with_growth("stub", &policy, |buf| {
            sizes.push(buf.len());
            QueryOutcome::BufferTooSmall { required: None }
        })
        .unwrap_err();

        assert_eq!(sizes, vec![64, 128]);
        assert!(matches!(err, SnapshotError::TableTooLarge { size: 256, .. }));
    }

    #[test]
    fn test_starting_at_keeps_larger_hint() {
        let policy = GrowthPolicy::default();
        assert_eq!(policy.starting_at(10).initial_size, policy.initial_size);
        assert_eq!(policy.starting_at(1 << 20).initial_size, 1 << 20);
    }
}
