//! Export surface: duplicate CSV and config backup
//!
//! CSV: one row per group member, UTF-8 BOM, CRLF line endings,
//! RFC-4180 quoting, fixed header order. Nulls render as empty fields,
//! booleans as `true`/`false`, tag arrays `|`-joined.
//!
//! Config backup: a versioned JSON document of the app-config map and
//! the typed dedup configuration. Schema-metadata keys are stripped in
//! both directions, and the dedup keys travel only through the typed
//! record so imports cannot bypass validation.

use std::collections::BTreeMap;
use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use docdedupe_storage::{MemberExportRow, SqliteStore, SCHEMA_META_PREFIX};

use crate::features::config::{ConfigService, DedupConfig, DedupConfigPatch, CONFIG_PREFIX};
use crate::shared::error::{DedupeError, Result};

/// Fixed CSV header, in order.
pub const CSV_HEADER: [&str; 14] = [
    "group_id",
    "confidence_score",
    "jaccard_similarity",
    "fuzzy_text_ratio",
    "group_status",
    "is_primary",
    "upstream_id",
    "title",
    "correspondent",
    "document_type",
    "tags",
    "created_date",
    "word_count",
    "group_created_at",
];

/// Backup format version; imports accept any `1.x`.
pub const BACKUP_VERSION: &str = "1.0";

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Exported config backup document.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigBackup {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub app_config: BTreeMap<String, String>,
    pub dedup_config: DedupConfig,
}

/// Parsed backup on the import side; tolerant of partial dedup configs
/// from older exports.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigBackupImport {
    pub version: String,
    #[serde(default)]
    pub app_config: BTreeMap<String, String>,
    #[serde(default)]
    pub dedup_config: DedupConfigPatch,
}

#[derive(Clone)]
pub struct ExportService {
    store: SqliteStore,
}

impl ExportService {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    /// Stream every group member as CSV into `writer`. Returns the
    /// number of data rows written.
    pub fn export_members_csv<W: Write>(&self, mut writer: W) -> Result<u64> {
        writer
            .write_all(UTF8_BOM)
            .map_err(|err| DedupeError::internal("CSV write failed").with_source(err))?;

        let mut csv_writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::CRLF)
            .from_writer(writer);

        csv_writer
            .write_record(CSV_HEADER)
            .map_err(|err| DedupeError::internal("CSV write failed").with_source(err))?;

        let rows = self.store.member_export_rows()?;
        let written = rows.len() as u64;
        for row in rows {
            csv_writer
                .write_record(csv_fields(&row))
                .map_err(|err| DedupeError::internal("CSV write failed").with_source(err))?;
        }
        csv_writer
            .flush()
            .map_err(|err| DedupeError::internal("CSV write failed").with_source(err))?;
        info!(rows = written, "duplicate CSV exported");
        Ok(written)
    }

    /// Build the config backup document.
    pub fn export_config(&self, config_service: &ConfigService) -> Result<ConfigBackup> {
        let app_config = self
            .store
            .config_all()?
            .into_iter()
            .filter(|(key, _)| {
                !key.starts_with(SCHEMA_META_PREFIX) && !key.starts_with(CONFIG_PREFIX)
            })
            .collect();
        Ok(ConfigBackup {
            version: BACKUP_VERSION.to_string(),
            exported_at: Utc::now(),
            app_config,
            dedup_config: config_service.get()?,
        })
    }

    /// Apply a parsed backup: reject unknown versions, strip schema
    /// metadata, upsert the app config and route the dedup config
    /// through the validating service.
    pub fn import_config(
        &self,
        config_service: &ConfigService,
        backup: &ConfigBackupImport,
    ) -> Result<DedupConfig> {
        if !backup.version.starts_with("1.") {
            return Err(DedupeError::validation(format!(
                "unsupported backup version {:?} (only 1.x accepted)",
                backup.version
            )));
        }

        let entries: Vec<(String, String)> = backup
            .app_config
            .iter()
            .filter(|(key, _)| {
                !key.starts_with(SCHEMA_META_PREFIX) && !key.starts_with(CONFIG_PREFIX)
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        self.store.upsert_config(&entries)?;

        let applied = config_service.set(&backup.dedup_config)?;
        info!(app_keys = entries.len(), "config backup imported");
        Ok(applied)
    }
}

fn csv_fields(row: &MemberExportRow) -> Vec<String> {
    vec![
        row.group_id.to_string(),
        row.confidence.to_string(),
        row.jaccard.to_string(),
        row.fuzzy.to_string(),
        row.group_status.to_string(),
        row.is_primary.to_string(),
        row.upstream_id.to_string(),
        row.title.clone(),
        row.correspondent.clone().unwrap_or_default(),
        row.document_type.clone().unwrap_or_default(),
        row.tags.join("|"),
        row.created_at.map(|dt| dt.to_rfc3339()).unwrap_or_default(),
        row.word_count.map(|c| c.to_string()).unwrap_or_default(),
        row.group_created_at.to_rfc3339(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use docdedupe_storage::GroupStatus;

    fn sample_row() -> MemberExportRow {
        MemberExportRow {
            group_id: 3,
            confidence: 0.92,
            jaccard: 1.0,
            fuzzy: 0.97,
            group_status: GroupStatus::Pending,
            is_primary: true,
            upstream_id: 77,
            title: "Invoice".to_string(),
            correspondent: None,
            document_type: Some("invoice".to_string()),
            tags: vec!["inbox".to_string(), "tax".to_string()],
            created_at: None,
            word_count: Some(120),
            group_created_at: Utc::now(),
        }
    }

    #[test]
    fn test_csv_fields_render_rules() {
        let fields = csv_fields(&sample_row());
        assert_eq!(fields[0], "3");
        assert_eq!(fields[4], "pending");
        assert_eq!(fields[5], "true");
        // Null correspondent renders as an empty field.
        assert_eq!(fields[8], "");
        assert_eq!(fields[10], "inbox|tax");
        // Null created date renders empty.
        assert_eq!(fields[11], "");
        assert_eq!(fields[12], "120");
    }

    #[test]
    fn test_header_matches_field_count() {
        assert_eq!(csv_fields(&sample_row()).len(), CSV_HEADER.len());
    }

    #[test]
    fn test_import_rejects_unknown_version() {
        let store = SqliteStore::open_in_memory().unwrap();
        let service = ExportService::new(store.clone());
        let config_service = ConfigService::new(store);

        let backup = ConfigBackupImport {
            version: "2.0".to_string(),
            app_config: BTreeMap::new(),
            dedup_config: DedupConfigPatch::default(),
        };
        let err = service.import_config(&config_service, &backup).unwrap_err();
        assert_eq!(err.kind, crate::shared::error::ErrorKind::Validation);
    }

    #[test]
    fn test_backup_roundtrip_strips_schema_keys() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set_config_value("ui.theme", "dark").unwrap();
        let service = ExportService::new(store.clone());
        let config_service = ConfigService::new(store.clone());

        let backup = service.export_config(&config_service).unwrap();
        assert_eq!(backup.version, BACKUP_VERSION);
        assert_eq!(backup.app_config.get("ui.theme").map(String::as_str), Some("dark"));
        assert!(!backup
            .app_config
            .keys()
            .any(|key| key.starts_with(SCHEMA_META_PREFIX)));
        assert!(!backup.app_config.keys().any(|key| key.starts_with(CONFIG_PREFIX)));

        // Round-trip through JSON into the import shape.
        let json = serde_json::to_string(&backup).unwrap();
        let parsed: ConfigBackupImport = serde_json::from_str(&json).unwrap();

        let fresh = SqliteStore::open_in_memory().unwrap();
        let fresh_export = ExportService::new(fresh.clone());
        let fresh_config = ConfigService::new(fresh.clone());
        fresh_export.import_config(&fresh_config, &parsed).unwrap();

        assert_eq!(
            fresh.config_value("ui.theme").unwrap().as_deref(),
            Some("dark")
        );
    }

    #[test]
    fn test_import_schema_keys_never_applied() {
        let store = SqliteStore::open_in_memory().unwrap();
        let service = ExportService::new(store.clone());
        let config_service = ConfigService::new(store.clone());

        let mut app_config = BTreeMap::new();
        app_config.insert("schema.hash".to_string(), "forged".to_string());
        app_config.insert("ui.lang".to_string(), "de".to_string());

        let backup = ConfigBackupImport {
            version: "1.3".to_string(),
            app_config,
            dedup_config: DedupConfigPatch::default(),
        };
        service.import_config(&config_service, &backup).unwrap();

        assert_eq!(store.config_value("ui.lang").unwrap().as_deref(), Some("de"));
        // The stored schema hash was not overwritten by the forgery.
        assert_ne!(
            store.config_value("schema.hash").unwrap().as_deref(),
            Some("forged")
        );
    }
}
