//! Persistent records of downloaded files.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Row};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::cache::parse_datetime;
use crate::db::Database;

/// The entity a set of files belongs to, e.g. (`mod_certificate`, module id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FileOwner {
  pub component: String,
  pub component_id: String,
}

impl FileOwner {
  pub fn new(component: &str, component_id: impl ToString) -> Self {
    Self {
      component: component.to_string(),
      component_id: component_id.to_string(),
    }
  }
}

impl fmt::Display for FileOwner {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}", self.component, self.component_id)
  }
}

/// What is known about one downloaded file.
#[derive(Debug, Clone)]
pub struct FileRecord {
  pub owner: FileOwner,
  pub file_url: String,
  /// Package revision the file was downloaded for; 0 when unversioned
  pub revision: i64,
  /// Remote modification time the file was downloaded for
  pub timemodified: i64,
  pub path: PathBuf,
  /// Set by invalidation; forces a download on next access
  pub stale: bool,
  pub downloaded_at: DateTime<Utc>,
}

impl FileRecord {
  /// Whether this copy can serve a request for `revision` / `timemodified`.
  pub fn is_valid_for(&self, revision: i64, timemodified: i64) -> bool {
    !self.stale && self.revision >= revision && self.timemodified == timemodified
  }
}

/// SQLite table of file records.
#[derive(Clone)]
pub struct FileRecordStore {
  db: Database,
}

impl FileRecordStore {
  pub fn new(db: Database) -> Self {
    Self { db }
  }

  pub fn get(&self, owner: &FileOwner, file_url: &str) -> Result<Option<FileRecord>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare(
        "SELECT component, component_id, file_url, revision, timemodified, path, stale, downloaded_at
         FROM filepool WHERE component = ? AND component_id = ? AND file_url = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row = match stmt.query_row(
      params![owner.component, owner.component_id, file_url],
      RawRecord::from_row,
    ) {
      Ok(row) => row,
      Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
      Err(e) => return Err(eyre!("Failed to read file record: {}", e)),
    };

    row.into_record().map(Some)
  }

  pub fn list(&self, owner: &FileOwner) -> Result<Vec<FileRecord>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare(
        "SELECT component, component_id, file_url, revision, timemodified, path, stale, downloaded_at
         FROM filepool WHERE component = ? AND component_id = ? ORDER BY file_url",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<RawRecord> = stmt
      .query_map(params![owner.component, owner.component_id], RawRecord::from_row)
      .map_err(|e| eyre!("Failed to query file records: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    rows.into_iter().map(RawRecord::into_record).collect()
  }

  /// Insert or replace the record, clearing any stale mark.
  pub fn upsert(&self, record: &FileRecord) -> Result<()> {
    let conn = self.db.conn()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO filepool
           (component, component_id, file_url, revision, timemodified, path, stale, downloaded_at)
         VALUES (?, ?, ?, ?, ?, ?, 0, datetime('now'))",
        params![
          record.owner.component,
          record.owner.component_id,
          record.file_url,
          record.revision,
          record.timemodified,
          record.path.to_string_lossy(),
        ],
      )
      .map_err(|e| eyre!("Failed to store file record: {}", e))?;
    Ok(())
  }

  /// Mark every file of `owner` stale. Returns how many records changed.
  pub fn mark_stale(&self, owner: &FileOwner) -> Result<usize> {
    let conn = self.db.conn()?;
    conn
      .execute(
        "UPDATE filepool SET stale = 1 WHERE component = ? AND component_id = ?",
        params![owner.component, owner.component_id],
      )
      .map_err(|e| eyre!("Failed to invalidate files of {}: {}", owner, e))
  }

  pub fn clear(&self) -> Result<()> {
    let conn = self.db.conn()?;
    conn
      .execute("DELETE FROM filepool", [])
      .map_err(|e| eyre!("Failed to clear file records: {}", e))?;
    Ok(())
  }
}

struct RawRecord {
  component: String,
  component_id: String,
  file_url: String,
  revision: i64,
  timemodified: i64,
  path: String,
  stale: bool,
  downloaded_at: String,
}

impl RawRecord {
  fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      component: row.get(0)?,
      component_id: row.get(1)?,
      file_url: row.get(2)?,
      revision: row.get(3)?,
      timemodified: row.get(4)?,
      path: row.get(5)?,
      stale: row.get(6)?,
      downloaded_at: row.get(7)?,
    })
  }

  fn into_record(self) -> Result<FileRecord> {
    Ok(FileRecord {
      owner: FileOwner {
        component: self.component,
        component_id: self.component_id,
      },
      file_url: self.file_url,
      revision: self.revision,
      timemodified: self.timemodified,
      path: PathBuf::from(self.path),
      stale: self.stale,
      downloaded_at: parse_datetime(&self.downloaded_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(owner: &FileOwner, url: &str, revision: i64, timemodified: i64) -> FileRecord {
    FileRecord {
      owner: owner.clone(),
      file_url: url.to_string(),
      revision,
      timemodified,
      path: PathBuf::from("/tmp/x"),
      stale: false,
      downloaded_at: Utc::now(),
    }
  }

  #[test]
  fn test_validity_rule() {
    let owner = FileOwner::new("mod_certificate", 7);
    let r = record(&owner, "u", 2, 100);
    assert!(r.is_valid_for(2, 100));
    assert!(r.is_valid_for(1, 100));
    assert!(!r.is_valid_for(3, 100));
    assert!(!r.is_valid_for(2, 101));

    let stale = FileRecord { stale: true, ..r };
    assert!(!stale.is_valid_for(2, 100));
  }

  #[test]
  fn test_upsert_get_and_mark_stale() {
    let store = FileRecordStore::new(Database::open_in_memory().unwrap());
    let owner = FileOwner::new("mod_certificate", 7);
    let other = FileOwner::new("mod_certificate", 8);

    store.upsert(&record(&owner, "a", 0, 10)).unwrap();
    store.upsert(&record(&owner, "b", 0, 10)).unwrap();
    store.upsert(&record(&other, "a", 0, 10)).unwrap();

    assert_eq!(store.list(&owner).unwrap().len(), 2);
    assert_eq!(store.mark_stale(&owner).unwrap(), 2);
    assert!(store.get(&owner, "a").unwrap().unwrap().stale);
    assert!(!store.get(&other, "a").unwrap().unwrap().stale);

    // A new download clears the mark
    store.upsert(&record(&owner, "a", 1, 11)).unwrap();
    let fresh = store.get(&owner, "a").unwrap().unwrap();
    assert!(!fresh.stale);
    assert_eq!(fresh.revision, 1);
    assert_eq!(fresh.timemodified, 11);
  }

  #[test]
  fn test_missing_record() {
    let store = FileRecordStore::new(Database::open_in_memory().unwrap());
    assert!(store
      .get(&FileOwner::new("mod_certificate", 1), "nope")
      .unwrap()
      .is_none());
  }

  #[test]
  fn test_corrupt_record_is_reported() {
    let db = Database::open_in_memory().unwrap();
    db.conn()
      .unwrap()
      .execute(
        "INSERT INTO filepool (component, component_id, file_url, revision, path)
         VALUES ('mod_certificate', '1', 'u', 'abc', '/tmp/x')",
        [],
      )
      .unwrap();

    let store = FileRecordStore::new(db);
    assert!(store.get(&FileOwner::new("mod_certificate", 1), "u").is_err());
  }
}
