/// Max coaches registered in one tenant.
pub const MAX_COACHES_PER_TENANT: usize = 10_000;

/// Max bookings (all statuses) kept on a single coach.
pub const MAX_BOOKINGS_PER_COACH: usize = 100_000;

/// Max session packages kept on a single coach.
pub const MAX_PACKAGES_PER_COACH: usize = 50_000;

/// Max sessions a single package can carry.
pub const MAX_PACKAGE_SESSIONS: u32 = 500;

/// Longest single session, in minutes.
pub const MAX_SESSION_MINUTES: u32 = 8 * 60;

/// Longest coach name, in bytes.
pub const MAX_NAME_LEN: usize = 256;

/// Longest booking note, in bytes.
pub const MAX_NOTES_LEN: usize = 2_000;

/// Furthest booking horizon a policy may configure.
pub const MAX_HORIZON_DAYS: u32 = 365;

/// Max loaded tenants per process.
pub const MAX_TENANTS: usize = 1_000;

/// Longest tenant name, in bytes.
pub const MAX_TENANT_NAME_LEN: usize = 64;

/// Earliest accepted booking timestamp (2000-01-01T00:00:00Z).
pub const MIN_VALID_TIMESTAMP_MS: i64 = 946_684_800_000;

/// Latest accepted booking timestamp (2100-01-01T00:00:00Z).
pub const MAX_VALID_TIMESTAMP_MS: i64 = 4_102_444_800_000;
