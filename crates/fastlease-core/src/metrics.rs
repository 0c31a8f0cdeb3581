// Metric names published through the `metrics` facade.
// Nothing is recorded unless the application installs a recorder.

use metrics::{describe_counter, describe_gauge};

pub const ACQUISITIONS_TOTAL: &str = "fastlease_acquisitions_total";
pub const CONTENTION_RETRIES_TOTAL: &str = "fastlease_contention_retries_total";
pub const CLAIMS_LOST_TOTAL: &str = "fastlease_claims_lost_total";
pub const STALE_LEASES_TOTAL: &str = "fastlease_stale_leases_total";
pub const RELEASES_TOTAL: &str = "fastlease_releases_total";
pub const HEARTBEAT_FAILURES_TOTAL: &str = "fastlease_heartbeat_failures_total";
pub const LOCKS_HELD: &str = "fastlease_locks_held";

/// Register metric descriptions; call once at startup
pub fn describe_metrics() {
    describe_counter!(ACQUISITIONS_TOTAL, "Total number of locks acquired");
    describe_counter!(
        CONTENTION_RETRIES_TOTAL,
        "Acquisition rounds that found a fresh lease held by another contender"
    );
    describe_counter!(
        CLAIMS_LOST_TOTAL,
        "Claims overwritten by another contender during verification"
    );
    describe_counter!(
        STALE_LEASES_TOTAL,
        "Expired leases observed and taken over"
    );
    describe_counter!(RELEASES_TOTAL, "Total number of held locks released");
    describe_counter!(
        HEARTBEAT_FAILURES_TOTAL,
        "Lease refresh writes rejected by the store"
    );
    describe_gauge!(LOCKS_HELD, "Locks currently held by this process");
}
