//! SQLite-backed gateway database.
//!
//! One file holds the artifact key-value medium (the reload-persistence layer
//! behind the production store), the user/customer records, session token
//! digests, and received webhook events. WAL mode so the serve loop and CLI
//! commands can share the file.

use std::path::Path;

use rusqlite::{Connection, params};
use serde_json;

use crate::util::now_ts;

pub(crate) struct GatewayDb {
    conn: Connection,
}

// ── Schema SQL ───────────────────────────────────────────────────────────

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS artifacts (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL DEFAULT '',
    membership TEXT NOT NULL DEFAULT 'free',
    user_metadata TEXT NOT NULL DEFAULT '{}',
    provider_metadata TEXT NOT NULL DEFAULT '{}',
    stripe_customer_id TEXT,
    stripe_subscription_id TEXT,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE TABLE IF NOT EXISTS sessions (
    token_digest TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

CREATE TABLE IF NOT EXISTS webhook_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    dedup_key TEXT NOT NULL UNIQUE,
    event_type TEXT NOT NULL,
    received_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);
";

// ── Rows ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) struct UserRow {
    pub(crate) id: String,
    pub(crate) email: String,
    pub(crate) membership: String,
    pub(crate) user_metadata: serde_json::Value,
    pub(crate) provider_metadata: serde_json::Value,
    pub(crate) stripe_customer_id: Option<String>,
    pub(crate) stripe_subscription_id: Option<String>,
}

// ── Core implementation ──────────────────────────────────────────────────

impl GatewayDb {
    /// Open an existing database. Errors if the file doesn't exist.
    pub(crate) fn open(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Err(format!("database not found: {} (run `callsheet init` first)", path.display()).into());
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.apply_pragmas()?;
        db.init_schema()?;
        Ok(db)
    }

    /// Open or create a database file with full schema.
    pub(crate) fn open_or_create(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.apply_pragmas()?;
        db.init_schema()?;
        Ok(db)
    }

    fn apply_pragmas(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    fn init_schema(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    // ── Artifact medium ──────────────────────────────────────────────

    pub(crate) fn artifact_get(&self, key: &str) -> Option<String> {
        self.conn
            .query_row(
                "SELECT value FROM artifacts WHERE key = ?",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .ok()
    }

    pub(crate) fn artifact_set(&self, key: &str, value: &str) -> Result<(), String> {
        self.conn
            .execute(
                "INSERT INTO artifacts (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now_ts()],
            )
            .map_err(|e| format!("artifact_set({key}): {e}"))?;
        Ok(())
    }

    pub(crate) fn artifact_remove(&self, key: &str) -> Result<bool, String> {
        let rows = self
            .conn
            .execute("DELETE FROM artifacts WHERE key = ?", params![key])
            .map_err(|e| format!("artifact_remove({key}): {e}"))?;
        Ok(rows > 0)
    }

    // ── Users ────────────────────────────────────────────────────────

    pub(crate) fn user_upsert(
        &self,
        id: &str,
        email: &str,
        user_metadata: &serde_json::Value,
    ) -> Result<(), String> {
        let meta = serde_json::to_string(user_metadata).map_err(|e| format!("user metadata: {e}"))?;
        self.conn
            .execute(
                "INSERT INTO users (id, email, user_metadata, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET email = excluded.email,
                     user_metadata = excluded.user_metadata, updated_at = excluded.updated_at",
                params![id, email, meta, now_ts()],
            )
            .map_err(|e| format!("user_upsert({id}): {e}"))?;
        Ok(())
    }

    pub(crate) fn user_get(&self, id: &str) -> Option<UserRow> {
        self.conn
            .query_row(
                "SELECT id, email, membership, user_metadata, provider_metadata,
                        stripe_customer_id, stripe_subscription_id
                 FROM users WHERE id = ?",
                params![id],
                Self::map_user_row,
            )
            .ok()
    }

    /// Provider-side role assignment: writes role + derived permissions into
    /// the provider-managed metadata, leaving user-editable metadata alone.
    pub(crate) fn user_set_provider_metadata(
        &self,
        id: &str,
        metadata: &serde_json::Value,
    ) -> Result<bool, String> {
        let meta = serde_json::to_string(metadata).map_err(|e| format!("provider metadata: {e}"))?;
        let rows = self
            .conn
            .execute(
                "UPDATE users SET provider_metadata = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, meta, now_ts()],
            )
            .map_err(|e| format!("user_set_provider_metadata({id}): {e}"))?;
        Ok(rows > 0)
    }

    /// Membership changes arrive from the billing side; nothing else writes
    /// this column.
    #[allow(dead_code)]
    pub(crate) fn user_set_membership(&self, id: &str, membership: &str) -> Result<bool, String> {
        let rows = self
            .conn
            .execute(
                "UPDATE users SET membership = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, membership, now_ts()],
            )
            .map_err(|e| format!("user_set_membership({id}): {e}"))?;
        Ok(rows > 0)
    }

    fn map_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
        let user_meta: String = row.get(3)?;
        let provider_meta: String = row.get(4)?;
        Ok(UserRow {
            id: row.get(0)?,
            email: row.get(1)?,
            membership: row.get(2)?,
            user_metadata: serde_json::from_str(&user_meta)
                .unwrap_or(serde_json::Value::Null),
            provider_metadata: serde_json::from_str(&provider_meta)
                .unwrap_or(serde_json::Value::Null),
            stripe_customer_id: row.get(5)?,
            stripe_subscription_id: row.get(6)?,
        })
    }

    // ── Sessions ─────────────────────────────────────────────────────

    pub(crate) fn session_create(&self, token_digest: &str, user_id: &str) -> Result<(), String> {
        self.conn
            .execute(
                "INSERT INTO sessions (token_digest, user_id, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(token_digest) DO UPDATE SET user_id = excluded.user_id",
                params![token_digest, user_id, now_ts()],
            )
            .map_err(|e| format!("session_create: {e}"))?;
        Ok(())
    }

    pub(crate) fn session_user(&self, token_digest: &str) -> Option<UserRow> {
        let user_id: String = self
            .conn
            .query_row(
                "SELECT user_id FROM sessions WHERE token_digest = ?",
                params![token_digest],
                |row| row.get(0),
            )
            .ok()?;
        self.user_get(&user_id)
    }

    // ── Webhook events ───────────────────────────────────────────────

    /// Record a webhook delivery. Returns false when the dedup key was
    /// already present (a redelivery).
    pub(crate) fn webhook_record(&self, dedup_key: &str, event_type: &str) -> Result<bool, String> {
        let rows = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO webhook_events (dedup_key, event_type, received_at)
                 VALUES (?1, ?2, ?3)",
                params![dedup_key, event_type, now_ts()],
            )
            .map_err(|e| format!("webhook_record: {e}"))?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_db_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("callsheet_test");
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(format!("test_{}_{name}.sqlite", std::process::id()))
    }

    #[test]
    fn test_open_requires_existing_file() {
        let path = temp_db_path("open_missing");
        let _ = std::fs::remove_file(&path);
        assert!(GatewayDb::open(&path).is_err());
        let _ = GatewayDb::open_or_create(&path).unwrap();
        assert!(GatewayDb::open(&path).is_ok());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_artifact_kv() {
        let path = temp_db_path("artifact_kv");
        let _ = std::fs::remove_file(&path);
        let db = GatewayDb::open_or_create(&path).unwrap();

        assert!(db.artifact_get("SCRIPT_DATA").is_none());
        db.artifact_set("SCRIPT_DATA", "{\"a\":1}").unwrap();
        assert_eq!(db.artifact_get("SCRIPT_DATA").as_deref(), Some("{\"a\":1}"));

        db.artifact_set("SCRIPT_DATA", "{\"a\":2}").unwrap();
        assert_eq!(db.artifact_get("SCRIPT_DATA").as_deref(), Some("{\"a\":2}"));

        assert!(db.artifact_remove("SCRIPT_DATA").unwrap());
        assert!(!db.artifact_remove("SCRIPT_DATA").unwrap());
        assert!(db.artifact_get("SCRIPT_DATA").is_none());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_user_and_session() {
        let path = temp_db_path("user_session");
        let _ = std::fs::remove_file(&path);
        let db = GatewayDb::open_or_create(&path).unwrap();

        let meta = serde_json::json!({"role": "writer"});
        db.user_upsert("user_1", "w@example.com", &meta).unwrap();
        let user = db.user_get("user_1").unwrap();
        assert_eq!(user.email, "w@example.com");
        assert_eq!(user.membership, "free");
        assert_eq!(user.user_metadata["role"], "writer");

        let provider = serde_json::json!({"role": "producer", "permissions": ["projects:view"]});
        assert!(db.user_set_provider_metadata("user_1", &provider).unwrap());
        assert!(!db.user_set_provider_metadata("nobody", &provider).unwrap());

        db.session_create("digest_abc", "user_1").unwrap();
        let resolved = db.session_user("digest_abc").unwrap();
        assert_eq!(resolved.id, "user_1");
        assert_eq!(resolved.provider_metadata["role"], "producer");
        assert!(db.session_user("digest_other").is_none());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_webhook_dedup() {
        let path = temp_db_path("webhook_dedup");
        let _ = std::fs::remove_file(&path);
        let db = GatewayDb::open_or_create(&path).unwrap();

        assert!(db.webhook_record("evt_1", "checkout.session.completed").unwrap());
        assert!(!db.webhook_record("evt_1", "checkout.session.completed").unwrap());
        assert!(db.webhook_record("evt_2", "customer.subscription.updated").unwrap());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_malformed_metadata_maps_to_null() {
        let path = temp_db_path("bad_meta");
        let _ = std::fs::remove_file(&path);
        let db = GatewayDb::open_or_create(&path).unwrap();

        db.conn
            .execute(
                "INSERT INTO users (id, email, user_metadata) VALUES ('u', '', 'not json')",
                [],
            )
            .unwrap();
        let user = db.user_get("u").unwrap();
        assert!(user.user_metadata.is_null());

        std::fs::remove_file(&path).ok();
    }
}
