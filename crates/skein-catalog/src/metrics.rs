//! Catalog metrics.
//!
//! Provides counters for review writes, CAS retries, partial failures of the
//! review write sequence, and repair actions. These complement the
//! structured logging already in place.

use metrics::{counter, describe_counter};

// ============================================================================
// Review Write Metrics
// ============================================================================

/// Review write counter, labeled by `operation` and `outcome`.
pub const REVIEW_WRITES: &str = "skein_review_writes_total";

/// Partial failure counter, labeled by `operation` and the resulting `state`
/// (`orphan` or `dangling_ref`).
pub const PARTIAL_FAILURES: &str = "skein_partial_failures_total";

// ============================================================================
// CAS Metrics
// ============================================================================

/// CAS retry counter.
pub const CAS_RETRY: &str = "skein_cas_retry_total";

// ============================================================================
// Repair Metrics
// ============================================================================

/// Repair action counter, labeled by `action`.
pub const REPAIR_ACTIONS: &str = "skein_repair_actions_total";

// ============================================================================
// Metric Registration
// ============================================================================

/// Registers all catalog metric descriptions.
///
/// Call this once at application startup after initializing the metrics recorder.
pub fn register_metrics() {
    describe_counter!(REVIEW_WRITES, "Total review create/edit/delete operations");
    describe_counter!(
        PARTIAL_FAILURES,
        "Review write sequences that stopped after the first write"
    );
    describe_counter!(CAS_RETRY, "Total CAS retry attempts");
    describe_counter!(REPAIR_ACTIONS, "Total repair actions applied by the reconciler");
}

// ============================================================================
// Metric Recording
// ============================================================================

/// Records the outcome of a review operation.
pub fn record_review_write(operation: &'static str, outcome: &'static str) {
    counter!(REVIEW_WRITES, "operation" => operation, "outcome" => outcome).increment(1);
}

/// Records a write sequence left in a repairable intermediate state.
pub fn record_partial_failure(operation: &'static str, state: &'static str) {
    counter!(PARTIAL_FAILURES, "operation" => operation, "state" => state).increment(1);
}

/// Records a CAS retry attempt.
pub fn record_cas_retry(operation: &str) {
    counter!(CAS_RETRY, "operation" => operation.to_string()).increment(1);
}

/// Records one applied repair.
pub fn record_repair_action(action: &'static str) {
    counter!(REPAIR_ACTIONS, "action" => action).increment(1);
}
