use chrono::{DateTime, NaiveDateTime, Utc};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::{
    core::errors::{BudgetError, Result},
    ledger::Ledger,
    utils::paths::{backups_dir_in, canonical_name, ensure_dir, ledgers_dir_in, write_atomic},
};

use super::{decode_ledger, RecordStore};

const BACKUP_EXTENSION: &str = "json";
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const DEFAULT_RETENTION: usize = 5;

/// One JSON file per ledger under `<root>/ledgers`, with rotating snapshots of
/// the previous file under `<root>/backups/<name>`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    backup_dir: PathBuf,
    stem: String,
    retention: usize,
}

impl JsonFileStore {
    pub fn new(root: &Path, ledger_name: &str, retention: Option<usize>) -> Result<Self> {
        let stem = canonical_name(ledger_name);
        let ledgers_dir = ledgers_dir_in(root);
        ensure_dir(&ledgers_dir)?;
        Ok(Self {
            path: ledgers_dir.join(format!("{}.json", stem)),
            backup_dir: backups_dir_in(root).join(&stem),
            stem,
            retention: retention.unwrap_or(DEFAULT_RETENTION).max(1),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes a labelled snapshot of `ledger` into the backup directory.
    pub fn backup(&self, ledger: &Ledger, note: Option<&str>) -> Result<PathBuf> {
        let mut file_stem = self.backup_stem();
        if let Some(label) = sanitize_backup_note(note) {
            file_stem.push('_');
            file_stem.push_str(&label);
        }
        let path = self
            .backup_dir
            .join(format!("{}.{}", file_stem, BACKUP_EXTENSION));
        write_atomic(&path, &serde_json::to_string_pretty(ledger)?)?;
        self.prune_backups()?;
        Ok(path)
    }

    /// Backup file names, newest first.
    pub fn list_backups(&self) -> Result<Vec<String>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.backup_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(BACKUP_EXTENSION) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
                entries.push(name.to_string());
            }
        }
        entries.sort_by(|a, b| {
            parse_backup_timestamp(&self.stem, b)
                .cmp(&parse_backup_timestamp(&self.stem, a))
                .then_with(|| b.cmp(a))
        });
        Ok(entries)
    }

    /// Copies a backup over the live file and loads it.
    pub fn restore(&self, backup_name: &str) -> Result<Ledger> {
        let backup_path = self.backup_dir.join(backup_name);
        if !backup_path.exists() {
            return Err(BudgetError::Storage(format!(
                "backup `{}` not found",
                backup_name
            )));
        }
        let data = fs::read_to_string(&backup_path)?;
        let ledger = decode_ledger(&data, backup_name)?;
        write_atomic(&self.path, &data)?;
        Ok(ledger)
    }

    fn backup_stem(&self) -> String {
        format!(
            "{}_{}",
            self.stem,
            Utc::now().format(BACKUP_TIMESTAMP_FORMAT)
        )
    }

    fn backup_existing_file(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        ensure_dir(&self.backup_dir)?;
        let backup_path = self
            .backup_dir
            .join(format!("{}.{}", self.backup_stem(), BACKUP_EXTENSION));
        fs::copy(&self.path, &backup_path)?;
        self.prune_backups()
    }

    fn prune_backups(&self) -> Result<()> {
        for stale in self.list_backups()?.iter().skip(self.retention) {
            if let Err(err) = fs::remove_file(self.backup_dir.join(stale)) {
                debug!(backup = %stale, error = %err, "could not prune backup");
            }
        }
        Ok(())
    }
}

impl RecordStore for JsonFileStore {
    fn load(&self) -> Result<Option<Ledger>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&self.path)?;
        decode_ledger(&data, &self.describe()).map(Some)
    }

    fn save(&self, ledger: &Ledger) -> Result<()> {
        self.backup_existing_file()?;
        let json = serde_json::to_string_pretty(ledger)?;
        write_atomic(&self.path, &json)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn sanitize_backup_note(note: Option<&str>) -> Option<String> {
    let raw = note?.trim();
    let mut sanitized = String::new();
    let mut last_dash = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            sanitized.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if (ch.is_whitespace() || matches!(ch, '-' | '.')) && !sanitized.is_empty() && !last_dash
        {
            sanitized.push('-');
            last_dash = true;
        }
    }
    let trimmed = sanitized.trim_matches('-').to_string();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn parse_backup_timestamp(stem: &str, file_name: &str) -> Option<DateTime<Utc>> {
    let rest = file_name.strip_prefix(stem)?.strip_prefix('_')?;
    let raw = rest.get(..15)?;
    NaiveDateTime::parse_from_str(raw, BACKUP_TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Money;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn store_with_temp_dir(retention: usize) -> (JsonFileStore, TempDir) {
        let temp = TempDir::new().expect("temp dir");
        let store = JsonFileStore::new(temp.path(), "Household", Some(retention)).expect("store");
        (store, temp)
    }

    #[test]
    fn missing_file_loads_as_none() {
        let (store, _guard) = store_with_temp_dir(3);
        assert!(store.load().unwrap().is_none());
        assert!(store.path().ends_with("ledgers/household.json"));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let (store, _guard) = store_with_temp_dir(3);
        let mut ledger = Ledger::new("Household");
        ledger.upsert_week(
            1,
            NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
            Money::from_cents(216_250),
        )
        .unwrap();
        store.save(&ledger).unwrap();
        let loaded = store.load().unwrap().expect("stored ledger");
        assert_eq!(loaded.id, ledger.id);
        assert_eq!(loaded.weeks, ledger.weeks);
    }

    #[test]
    fn newer_schema_is_rejected() {
        let (store, _guard) = store_with_temp_dir(3);
        let mut ledger = Ledger::new("Household");
        ledger.schema_version = u8::MAX;
        store.save(&ledger).unwrap();
        assert!(matches!(store.load(), Err(BudgetError::Storage(_))));
    }

    #[test]
    fn backups_are_pruned_to_retention() {
        let (store, _guard) = store_with_temp_dir(2);
        let ledger = Ledger::new("Household");
        for note in ["first", "second", "third"] {
            store.backup(&ledger, Some(note)).unwrap();
        }
        let backups = store.list_backups().unwrap();
        assert_eq!(backups.len(), 2);
        assert!(backups.iter().all(|name| name.starts_with("household_")));
    }

    #[test]
    fn restore_replaces_live_file() {
        let (store, _guard) = store_with_temp_dir(3);
        let original = Ledger::new("Household");
        let backup = store.backup(&original, Some("before change")).unwrap();
        assert!(backup.to_string_lossy().ends_with("_before-change.json"));

        store.save(&Ledger::new("Other")).unwrap();
        let name = backup.file_name().unwrap().to_str().unwrap().to_string();
        let restored = store.restore(&name).unwrap();
        assert_eq!(restored.id, original.id);
        assert_eq!(store.load().unwrap().unwrap().id, original.id);
    }
}
