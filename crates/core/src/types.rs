/// Opaque unique entity token. Allocated once at insertion, never reused.
pub type EntityId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Allocate a fresh entity id (UUID v4 in string form).
pub fn new_entity_id() -> EntityId {
    uuid::Uuid::new_v4().to_string()
}

/// Current UTC time truncated to millisecond precision -- the resolution
/// timestamps are persisted at, so round-tripped state compares equal.
pub fn now_millis() -> Timestamp {
    let now = chrono::Utc::now();
    chrono::DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
