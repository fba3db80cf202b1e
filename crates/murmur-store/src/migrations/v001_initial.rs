//! v001 -- Initial schema creation.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key       TEXT PRIMARY KEY NOT NULL,   -- "<name>_v<version>"
    version   INTEGER NOT NULL,
    timestamp TEXT NOT NULL,               -- RFC-3339
    data      BLOB NOT NULL
);
"#;

/// Apply the v001 migration.
pub fn up(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(UP_SQL)
}
