/// Database primary keys of the durable store are BIGSERIAL.
pub type DbId = i64;

/// Identifier of the user that owns a task or a connection.
pub type OwnerId = DbId;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifier of a task held by the in-process queue.
pub type TaskId = uuid::Uuid;

/// Identifier of one live connection (unique per process).
pub type ConnectionId = String;
