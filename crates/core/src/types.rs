/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Queue-assigned identifier of one pipeline invocation.
///
/// Also the key of `Project::history`.
pub type JobId = uuid::Uuid;
