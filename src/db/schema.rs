/// Schema for the per-site cache database.
pub const SCHEMA: &str = r#"
-- Last successful web-service read per cache key (serialized JSON)
CREATE TABLE IF NOT EXISTS ws_cache (
    cache_key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Downloaded files, one row per (component, component id, remote url)
CREATE TABLE IF NOT EXISTS filepool (
    component TEXT NOT NULL,
    component_id TEXT NOT NULL,
    file_url TEXT NOT NULL,
    revision INTEGER NOT NULL DEFAULT 0,
    timemodified INTEGER NOT NULL DEFAULT 0,
    path TEXT NOT NULL,
    stale INTEGER NOT NULL DEFAULT 0,
    downloaded_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (component, component_id, file_url)
);

CREATE INDEX IF NOT EXISTS idx_filepool_owner ON filepool(component, component_id);
"#;
