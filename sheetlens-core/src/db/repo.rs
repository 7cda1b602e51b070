//! Database repository layer
//!
//! The configuration store is a table of JSON blobs keyed by name. The sync
//! controller only sees it through [`SessionStore`].

use crate::error::{Error, Result};
use crate::types::{AnalysisResult, SyncConfig};
use crate::views::DossierSnapshot;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Mutex;

const SYNC_CONFIG_KEY: &str = "sync_config";
const REPORTS_KEY: &str = "reports";
const DOSSIERS_KEY: &str = "dossiers";

/// Persistence seam for one sync configuration and its report collection.
pub trait SessionStore: Send + Sync {
    /// Stored sync settings, or the disconnected default
    fn load_sync_config(&self) -> Result<SyncConfig>;

    fn save_sync_config(&self, config: &SyncConfig) -> Result<()>;

    /// Report collection from the last sync, empty if none
    fn load_reports(&self) -> Result<Vec<AnalysisResult>>;

    /// Replace the stored report collection
    fn save_reports(&self, reports: &[AnalysisResult]) -> Result<()>;

    /// Last dossiers computed, with the collection fingerprint they match
    fn load_dossiers(&self) -> Result<Option<DossierSnapshot>>;

    fn save_dossiers(&self, snapshot: &DossierSnapshot) -> Result<()>;
}

/// Database handle with connection pooling (single connection for now)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    // ============================================
    // Key-value operations
    // ============================================

    /// Read and decode the blob stored under `key`
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let conn = self.conn.lock().unwrap();
        let raw: Option<String> = conn
            .query_row("SELECT value FROM kv_store WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        raw.map(|text| serde_json::from_str(&text).map_err(Error::from))
            .transpose()
    }

    /// Encode `value` and store it under `key`, replacing any previous blob
    pub fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let text = serde_json::to_string(value)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![key, text, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Remove the blob under `key`, returning whether one existed
    pub fn delete_key(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute("DELETE FROM kv_store WHERE key = ?", [key])?;
        Ok(removed > 0)
    }
}

impl SessionStore for Database {
    fn load_sync_config(&self) -> Result<SyncConfig> {
        Ok(self.get_json(SYNC_CONFIG_KEY)?.unwrap_or_default())
    }

    fn save_sync_config(&self, config: &SyncConfig) -> Result<()> {
        self.put_json(SYNC_CONFIG_KEY, config)
    }

    fn load_reports(&self) -> Result<Vec<AnalysisResult>> {
        Ok(self.get_json(REPORTS_KEY)?.unwrap_or_default())
    }

    fn save_reports(&self, reports: &[AnalysisResult]) -> Result<()> {
        self.put_json(REPORTS_KEY, reports)
    }

    fn load_dossiers(&self) -> Result<Option<DossierSnapshot>> {
        self.get_json(DOSSIERS_KEY)
    }

    fn save_dossiers(&self, snapshot: &DossierSnapshot) -> Result<()> {
        self.put_json(DOSSIERS_KEY, snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, MetricSet};

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn create_test_report(label: &str) -> AnalysisResult {
        AnalysisResult {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            category: Category::ProcessAudit,
            label: label.to_string(),
            summary: "Ticket closed after two escalations".to_string(),
            insights: vec!["Escalation path unclear".to_string()],
            metrics: MetricSet {
                conversion_probability: 0.0,
                customer_sentiment: 42.5,
                deal_size_estimate: None,
                resolution_time_minutes: Some(95.0),
                churn_risk: 61.0,
            },
            raw_text: "full transcript".to_string(),
        }
    }

    #[test]
    fn test_empty_store_defaults() {
        let db = test_db();
        let config = db.load_sync_config().unwrap();
        assert!(!config.connected);
        assert_eq!(config.sheet_name, "Sheet1");
        assert!(db.load_reports().unwrap().is_empty());
    }

    #[test]
    fn test_sync_config_round_trip() {
        let db = test_db();
        let config = SyncConfig {
            source_id: "abc123".to_string(),
            sheet_name: "Calls".to_string(),
            last_sync_time: Some(Utc::now()),
            connected: true,
            analysis_prompt: Some("Focus on churn".to_string()),
        };
        db.save_sync_config(&config).unwrap();
        assert_eq!(db.load_sync_config().unwrap(), config);
    }

    #[test]
    fn test_save_reports_replaces_collection() {
        let db = test_db();
        db.save_reports(&[create_test_report("a"), create_test_report("b")])
            .unwrap();
        assert_eq!(db.load_reports().unwrap().len(), 2);

        let replacement = vec![create_test_report("c")];
        db.save_reports(&replacement).unwrap();
        assert_eq!(db.load_reports().unwrap(), replacement);
    }

    #[test]
    fn test_dossier_snapshot_round_trip() {
        let db = test_db();
        assert!(db.load_dossiers().unwrap().is_none());

        let snapshot = DossierSnapshot {
            fingerprint: "abc".to_string(),
            dossiers: crate::types::StrategicDossiers {
                yes_no: "Price objections".to_string(),
                opps_threats: "Competitor discounting".to_string(),
                act_now: vec!["Offer annual plan".to_string()],
            },
        };
        db.save_dossiers(&snapshot).unwrap();
        assert_eq!(db.load_dossiers().unwrap(), Some(snapshot));
    }

    #[test]
    fn test_corrupt_blob_is_json_error() {
        let db = test_db();
        {
            let conn = db.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO kv_store (key, value, updated_at) VALUES ('reports', 'not json', '2024-01-01')",
                [],
            )
            .unwrap();
        }
        assert!(matches!(db.load_reports(), Err(Error::Json(_))));
        assert!(db.delete_key("reports").unwrap());
        assert!(db.load_reports().unwrap().is_empty());
    }

    #[test]
    fn test_open_on_disk_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.db");
        let db = Database::open(&path).unwrap();
        db.migrate().unwrap();
        db.save_sync_config(&SyncConfig::default()).unwrap();
        assert!(path.exists());
    }
}
