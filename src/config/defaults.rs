//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Batching
// ============================================================================

/// Events buffered before a batch is sealed and submitted.
pub const BATCH_SIZE_THRESHOLD: usize = 100;

// ============================================================================
// Retry / Backoff
// ============================================================================

/// Retries after the first failed attempt, per channel (4 attempts total).
pub const MAX_RETRIES: u32 = 3;

/// Delay before the first retry (seconds). Doubles per retry.
pub const BACKOFF_BASE_SECS: u64 = 5;

/// Upper bound on any single backoff delay (seconds).
pub const BACKOFF_CAP_SECS: u64 = 30;

/// Random jitter added to each backoff delay (milliseconds). Zero keeps
/// retry timing deterministic.
pub const BACKOFF_JITTER_MS: u64 = 0;

// ============================================================================
// Channels
// ============================================================================

/// Per-attempt timeout for the primary API channel (seconds).
pub const API_TIMEOUT_SECS: u64 = 30;

/// Per-attempt timeout for the object-storage channel (seconds).
pub const STORAGE_TIMEOUT_SECS: u64 = 30;

/// Region used to derive the object-storage endpoint when none is configured.
pub const STORAGE_REGION: &str = "us-east-1";

/// Key prefix for batches written to the object-storage bucket.
pub const STORAGE_KEY_PREFIX: &str = "telemetry";

// ============================================================================
// Local fallback
// ============================================================================

/// Directory for batches that neither channel accepted.
pub const FALLBACK_DIR: &str = "./data/telemetry_fallback";

/// File name prefix for persisted fallback batches.
pub const FALLBACK_FILE_PREFIX: &str = "telemetry_fallback_";
