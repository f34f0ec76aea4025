use chrono::{DateTime, SubsecRound, Utc};

/// Creation stamps for a new record: `created_at == updated_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamps {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Timestamps {
    pub fn now() -> Self {
        let now = now();
        Self {
            created_at: now,
            updated_at: now,
        }
    }
}

/// Refreshed `updated_at` for a mutation.
pub fn touch() -> DateTime<Utc> {
    now()
}

// Postgres stores microseconds; truncate so both backends round-trip the same value.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creation_stamps_are_equal() {
        let stamps = Timestamps::now();
        assert_eq!(stamps.created_at, stamps.updated_at);
    }

    #[test]
    fn test_touch_is_not_before_creation() {
        let stamps = Timestamps::now();
        assert!(touch() >= stamps.updated_at);
    }
}
