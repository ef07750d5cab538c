use crate::model::Minutes;

/// Scheduling granularity used when a facility does not set one.
pub const DEFAULT_GRANULARITY_MINUTES: Minutes = 30;

/// Store calls slower than this surface as retryable failures.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 2_000;

pub const MAX_TENANTS: usize = 1_000;
pub const MAX_TENANT_NAME_LEN: usize = 128;

pub const MAX_COURTS_PER_FACILITY: usize = 512;
pub const MAX_WINDOWS_PER_COURT: usize = 512;
pub const MAX_RATE_ENTRIES_PER_COURT: usize = 256;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_LABEL_LEN: usize = 1024;

pub const MAX_OFFERED_DURATIONS: usize = 16;
/// No single booking may run longer than a day.
pub const MAX_DURATION_MINUTES: u32 = 24 * 60;

/// Upper bound on courts named in one enumeration query.
pub const MAX_COURTS_PER_QUERY: usize = 256;
