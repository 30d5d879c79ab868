/// Tables for the response cache and the session slots.
pub const SCHEMA: &str = r#"
-- Cached query payloads (serialized JSON), one row per query hash
CREATE TABLE IF NOT EXISTS query_cache (
    query_hash TEXT PRIMARY KEY,
    scope TEXT NOT NULL,
    query_description TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    payload BLOB NOT NULL,
    max_updated TEXT,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    invalidated INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_query_cache_scope ON query_cache(scope);

-- Session-scoped key/value state (access token, featured artist)
CREATE TABLE IF NOT EXISTS session_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;
