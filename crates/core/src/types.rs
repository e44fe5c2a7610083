/// Jobs are keyed by random v4 UUIDs, unique for the registry's lifetime.
pub type JobId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
