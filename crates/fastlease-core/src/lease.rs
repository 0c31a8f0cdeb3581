//! Lease data model
//!
//! The lease key holds `<contender id>,<unix millis>`. Its presence with a
//! fresh timestamp is the only authority for "the lock is held"; a stale or
//! unparseable value means the lock is free.

use std::fmt::{Display, Formatter};

use fastlease_common::LEASE_SEPARATOR;
use serde::{Deserialize, Serialize};

/// Lease state as observed by a reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaseState {
    /// No lease recorded
    Free,
    /// Lease recorded and fresh
    Held,
    /// Lease recorded but older than the lease lifetime
    Stale,
}

/// Parsed view of the lease key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Contender that wrote the lease
    pub holder: String,
    /// Acquisition or last refresh timestamp (unix millis)
    pub refreshed_at: i64,
}

impl Lease {
    pub fn new(holder: impl Into<String>, refreshed_at: i64) -> Self {
        Self {
            holder: holder.into(),
            refreshed_at,
        }
    }

    /// Parse a stored value; `None` for anything malformed
    pub fn parse(raw: &str) -> Option<Self> {
        let (holder, ts) = raw.split_once(LEASE_SEPARATOR)?;
        if holder.is_empty() {
            return None;
        }
        let refreshed_at = ts.trim().parse::<i64>().ok()?;
        Some(Self::new(holder, refreshed_at))
    }

    /// Negative when the lease is dated ahead of `now`
    pub fn age_ms(&self, now: i64) -> i64 {
        now.saturating_sub(self.refreshed_at)
    }

    /// Fresh while the age lies strictly between `-max_lock_time_ms` and
    /// `max_lock_time_ms`. A lease dated further ahead than one lifetime is
    /// treated as stale so clock skew cannot extend the lease bound.
    pub fn is_fresh(&self, now: i64, max_lock_time_ms: u64) -> bool {
        let max = clamp_millis(max_lock_time_ms);
        let age = self.age_ms(now);
        age < max && age > max.saturating_neg()
    }

    /// Whether the timestamp is further ahead of `now` than one lifetime
    pub fn is_future_dated(&self, now: i64, max_lock_time_ms: u64) -> bool {
        self.age_ms(now) <= clamp_millis(max_lock_time_ms).saturating_neg()
    }

    pub fn expires_at(&self, max_lock_time_ms: u64) -> i64 {
        self.refreshed_at
            .saturating_add(clamp_millis(max_lock_time_ms))
    }

    pub fn remaining_ms(&self, now: i64, max_lock_time_ms: u64) -> u64 {
        let remaining = self.expires_at(max_lock_time_ms).saturating_sub(now).max(0);
        u64::try_from(remaining).unwrap_or(0)
    }

    pub fn is_held_by(&self, holder: &str) -> bool {
        self.holder == holder
    }

    pub fn state(&self, now: i64, max_lock_time_ms: u64) -> LeaseState {
        if self.is_fresh(now, max_lock_time_ms) {
            LeaseState::Held
        } else {
            LeaseState::Stale
        }
    }
}

fn clamp_millis(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

impl Display for Lease {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.holder, LEASE_SEPARATOR, self.refreshed_at)
    }
}

/// Point-in-time view of a lock's two keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseSnapshot {
    pub name: String,
    /// Last announced contender (contention marker only)
    #[serde(default)]
    pub announced: Option<String>,
    #[serde(default)]
    pub lease: Option<Lease>,
    pub state: LeaseState,
    #[serde(default)]
    pub age_ms: Option<i64>,
    #[serde(default)]
    pub remaining_ms: Option<u64>,
}

impl LeaseSnapshot {
    pub fn new(
        name: impl Into<String>,
        announced: Option<String>,
        lease: Option<Lease>,
        now: i64,
        max_lock_time_ms: u64,
    ) -> Self {
        let state = lease
            .as_ref()
            .map(|l| l.state(now, max_lock_time_ms))
            .unwrap_or(LeaseState::Free);
        let age_ms = lease.as_ref().map(|l| l.age_ms(now));
        let remaining_ms = lease
            .as_ref()
            .filter(|_| state == LeaseState::Held)
            .map(|l| l.remaining_ms(now, max_lock_time_ms));
        Self {
            name: name.into(),
            announced,
            lease,
            state,
            age_ms,
            remaining_ms,
        }
    }

    pub fn is_held(&self) -> bool {
        self.state == LeaseState::Held
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_and_format() {
        let lease = Lease::parse("1700000000000:42:0,1700000001000").unwrap();
        assert_eq!(lease.holder, "1700000000000:42:0");
        assert_eq!(lease.refreshed_at, 1_700_000_001_000);
        assert_eq!(lease.to_string(), "1700000000000:42:0,1700000001000");
    }

    #[test]
    fn test_malformed_values_are_free() {
        assert!(Lease::parse("").is_none());
        assert!(Lease::parse("no-separator").is_none());
        assert!(Lease::parse(",123").is_none());
        assert!(Lease::parse("holder,").is_none());
        assert!(Lease::parse("holder,soon").is_none());
        assert!(Lease::parse("holder,1,2").is_none());
    }

    #[test]
    fn test_freshness_boundary() {
        let lease = Lease::new("a", 10_000);
        assert!(lease.is_fresh(10_000, 5000));
        assert!(lease.is_fresh(14_999, 5000));
        assert!(!lease.is_fresh(15_000, 5000));
        assert_eq!(lease.state(15_000, 5000), LeaseState::Stale);
        assert_eq!(lease.remaining_ms(12_000, 5000), 3000);
        assert_eq!(lease.remaining_ms(20_000, 5000), 0);
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let ancient = Lease::new("ghost", i64::MIN);
        assert!(!ancient.is_fresh(1_700_000_000_000, 5000));
        assert_eq!(ancient.state(1_700_000_000_000, 5000), LeaseState::Stale);
        assert_eq!(ancient.remaining_ms(1_700_000_000_000, 5000), 0);

        let far_future = Lease::new("ghost", i64::MAX);
        assert!(!far_future.is_fresh(1_700_000_000_000, 5000));
        assert!(far_future.is_future_dated(1_700_000_000_000, 5000));
        assert_eq!(far_future.expires_at(5000), i64::MAX);

        let lease = Lease::new("a", 1000);
        assert!(lease.is_fresh(2000, u64::MAX));
        assert_eq!(lease.expires_at(u64::MAX), i64::MAX);
    }

    #[test]
    fn test_future_dated_lease_bound() {
        let lease = Lease::new("a", 20_000);
        // skew within one lifetime still counts as held
        assert!(lease.is_fresh(15_001, 5000));
        assert!(!lease.is_future_dated(15_001, 5000));
        // further ahead than one lifetime is stale
        assert!(!lease.is_fresh(15_000, 5000));
        assert!(lease.is_future_dated(15_000, 5000));
    }

    #[test]
    fn test_snapshot_states() {
        let free = LeaseSnapshot::new("jobs", None, None, 0, 5000);
        assert_eq!(free.state, LeaseState::Free);
        assert!(free.age_ms.is_none());

        let held = LeaseSnapshot::new(
            "jobs",
            Some("a".to_string()),
            Some(Lease::new("a", 1000)),
            3000,
            5000,
        );
        assert!(held.is_held());
        assert_eq!(held.age_ms, Some(2000));
        assert_eq!(held.remaining_ms, Some(3000));

        let stale = LeaseSnapshot::new("jobs", None, Some(Lease::new("a", 0)), 9000, 5000);
        assert_eq!(stale.state, LeaseState::Stale);
        assert!(stale.remaining_ms.is_none());
    }

    #[test]
    fn test_snapshot_serializes_snake_case_state() {
        let snapshot = LeaseSnapshot::new("jobs", None, None, 0, 5000);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["state"], "free");
        assert_eq!(json["name"], "jobs");
    }

    proptest! {
        #[test]
        fn parse_never_panics(raw in ".*") {
            let _ = Lease::parse(&raw);
        }

        #[test]
        fn lease_arithmetic_never_panics(
            ts in any::<i64>(),
            now in any::<i64>(),
            max in any::<u64>(),
        ) {
            let lease = Lease::new("a", ts);
            let fresh = lease.is_fresh(now, max);
            let state = lease.state(now, max);
            let _ = lease.remaining_ms(now, max);
            prop_assert_eq!(fresh, state == LeaseState::Held);
            if lease.is_future_dated(now, max) {
                prop_assert!(!fresh);
            }
            let snapshot = LeaseSnapshot::new("jobs", None, Some(lease), now, max);
            prop_assert_eq!(snapshot.is_held(), fresh);
        }

        #[test]
        fn parsed_holder_never_contains_separator(holder in "[^,]+", ts in any::<i64>()) {
            let raw = format!("{},{}", holder, ts);
            let lease = Lease::parse(&raw).unwrap();
            prop_assert_eq!(lease.holder, holder);
            prop_assert_eq!(lease.refreshed_at, ts);
        }
    }
}
