//! On-disk snapshots of the in-memory store.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::core::{Collection, Record, Result};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub next_ids: BTreeMap<Collection, i64>,
    pub tables: BTreeMap<Collection, Vec<Record>>,
}

impl StoreSnapshot {
    pub fn new(tables: BTreeMap<Collection, Vec<Record>>, next_ids: BTreeMap<Collection, i64>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now(),
            next_ids,
            tables,
        }
    }

    pub fn row_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }
}

/// JSON snapshot file, replaced atomically on every save.
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> Result<Option<StoreSnapshot>> {
        if !self.exists() {
            debug!("no snapshot at {}", self.path.display());
            return Ok(None);
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let snapshot: StoreSnapshot = serde_json::from_reader(reader)?;
        info!(
            "loaded snapshot {} ({} rows)",
            self.path.display(),
            snapshot.row_count()
        );
        Ok(Some(snapshot))
    }

    /// Write to a temp file in the same directory, then rename over the target.
    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let tmp = NamedTempFile::new_in(&dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer_pretty(&mut writer, snapshot)?;
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        info!(
            "saved snapshot {} ({} rows)",
            self.path.display(),
            snapshot.row_count()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Fields, RowId, Value};
    use tempfile::TempDir;

    #[test]
    fn test_snapshot_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let file = SnapshotFile::new(temp_dir.path().join("nested").join("store.json"));
        assert!(file.load().unwrap().is_none());

        let mut fields = Fields::new();
        fields.insert("name".into(), Value::from("Ops"));
        let mut tables = BTreeMap::new();
        tables.insert(
            Collection::Sectors,
            vec![Record::new(RowId::Seq(1), fields)],
        );
        let mut next_ids = BTreeMap::new();
        next_ids.insert(Collection::Sectors, 2);

        file.save(&StoreSnapshot::new(tables, next_ids)).unwrap();
        assert!(file.exists());

        let loaded = file.load().unwrap().unwrap();
        assert_eq!(loaded.version, SNAPSHOT_VERSION);
        assert_eq!(loaded.row_count(), 1);
        assert_eq!(loaded.next_ids.get(&Collection::Sectors), Some(&2));
        assert_eq!(
            loaded.tables[&Collection::Sectors][0].text("name"),
            Some("Ops")
        );
    }
}
