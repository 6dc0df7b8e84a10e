//! Table metadata cache.
//!
//! Metadata is introspected on first use, kept in memory for the life of the
//! connection and, outside debug and interactive modes, persisted to
//! `<cache_dir>/models/<database>/<table>.cache.json`. Nothing here watches
//! the live schema: after a migration callers must [`evict`](MetadataCache::evict).

use super::driver::ColumnInfo;
use super::sync::acquire_lock;
use crate::{Error, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// What the query layer needs to know about a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    /// First primary-key column, empty if the table has none.
    pub primary_key: String,
    /// The primary key is generated by the database.
    pub pk_auto_increment: bool,
    /// Column names in declaration order.
    pub fields: Vec<String>,
}

impl TableMetadata {
    /// Derives metadata from a table description.
    ///
    /// Only the first primary-key column is kept; composite keys are reduced
    /// to their leading column.
    #[must_use]
    pub fn from_columns(columns: &[ColumnInfo]) -> Self {
        let primary = columns.iter().find(|c| c.is_primary());
        Self {
            primary_key: primary.map(|c| c.field.clone()).unwrap_or_default(),
            pk_auto_increment: primary.is_some_and(ColumnInfo::is_auto_increment),
            fields: columns.iter().map(|c| c.field.clone()).collect(),
        }
    }

    /// Returns true if `column` exists.
    #[must_use]
    pub fn has_field(&self, column: &str) -> bool {
        self.fields.iter().any(|f| f == column)
    }
}

type Slot = Arc<OnceCell<Arc<TableMetadata>>>;

/// Per-database metadata cache.
///
/// Concurrent misses for one table share a single introspection: the first
/// caller runs it and the rest block on the same cell.
///
/// Each [`evict`](Self::evict) bumps the table's generation. A load persists
/// its result only if the generation it started under is still current, so an
/// eviction racing an in-flight load cannot bring the cache file back.
#[derive(Debug)]
pub(crate) struct MetadataCache {
    database: String,
    disk_root: Option<PathBuf>,
    tables: Mutex<HashMap<String, Slot>>,
    generations: Mutex<HashMap<String, u64>>,
}

impl MetadataCache {
    /// Creates a cache. `disk_root` of `None` keeps metadata in memory only.
    pub(crate) fn new(database: &str, disk_root: Option<PathBuf>) -> Self {
        Self {
            database: sanitize(database),
            disk_root,
            tables: Mutex::new(HashMap::new()),
            generations: Mutex::new(HashMap::new()),
        }
    }

    fn generation(&self, table: &str) -> u64 {
        acquire_lock(&self.generations).get(table).copied().unwrap_or(0)
    }

    /// Returns cached metadata, loading it with `introspect` on a miss.
    pub(crate) fn get_or_load(
        &self,
        table: &str,
        introspect: impl FnOnce() -> Result<Vec<ColumnInfo>>,
    ) -> Result<Arc<TableMetadata>> {
        let slot = {
            let mut tables = acquire_lock(&self.tables);
            Arc::clone(tables.entry(table.to_string()).or_default())
        };
        if let Some(meta) = slot.get() {
            metrics::counter!("db_metadata_cache_hits_total", "source" => "memory").increment(1);
            return Ok(Arc::clone(meta));
        }
        let meta = slot.get_or_try_init(|| self.load(table, introspect))?;
        Ok(Arc::clone(meta))
    }

    fn load(
        &self,
        table: &str,
        introspect: impl FnOnce() -> Result<Vec<ColumnInfo>>,
    ) -> Result<Arc<TableMetadata>> {
        let generation = self.generation(table);
        if let Some(meta) = self.read_disk(table) {
            metrics::counter!("db_metadata_cache_hits_total", "source" => "disk").increment(1);
            return Ok(Arc::new(meta));
        }
        metrics::counter!("db_metadata_introspections_total").increment(1);
        let meta = TableMetadata::from_columns(&introspect()?);
        tracing::debug!(
            database = %self.database,
            table,
            primary_key = %meta.primary_key,
            fields = meta.fields.len(),
            "Loaded table metadata"
        );
        self.persist(table, generation, &meta);
        Ok(Arc::new(meta))
    }

    fn persist(&self, table: &str, generation: u64, meta: &TableMetadata) {
        // Held across the write so an eviction lands strictly before or after it.
        let generations = acquire_lock(&self.generations);
        if generations.get(table).copied().unwrap_or(0) != generation {
            tracing::debug!(table, "Table evicted during load; not persisting metadata");
            return;
        }
        if let Err(e) = self.write_disk(table, meta) {
            tracing::warn!(table, error = %e, "Failed to persist table metadata");
        }
    }

    /// Returns metadata already in memory.
    pub(crate) fn cached(&self, table: &str) -> Option<Arc<TableMetadata>> {
        acquire_lock(&self.tables)
            .get(table)
            .and_then(|slot| slot.get().cloned())
    }

    /// Drops a table's metadata from memory and disk.
    ///
    /// A load already in flight still returns its result to its callers but
    /// neither caches nor persists it.
    pub(crate) fn evict(&self, table: &str) -> Result<()> {
        let mut generations = acquire_lock(&self.generations);
        *generations.entry(table.to_string()).or_insert(0) += 1;
        acquire_lock(&self.tables).remove(table);
        let Some(path) = self.path(table) else {
            return Ok(());
        };
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Configuration(format!(
                "cannot remove metadata cache {}: {e}",
                path.display()
            ))),
        }
    }

    /// Location of a table's cache file.
    pub(crate) fn path(&self, table: &str) -> Option<PathBuf> {
        self.disk_root.as_ref().map(|root| {
            root.join("models")
                .join(&self.database)
                .join(format!("{}.cache.json", sanitize(table)))
        })
    }

    fn read_disk(&self, table: &str) -> Option<TableMetadata> {
        let path = self.path(table)?;
        let contents = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(meta) => Some(meta),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring corrupt metadata cache file");
                None
            },
        }
    }

    fn write_disk(&self, table: &str, meta: &TableMetadata) -> std::io::Result<()> {
        let Some(path) = self.path(table) else {
            return Ok(());
        };
        let Some(dir) = path.parent() else {
            return Ok(());
        };
        std::fs::create_dir_all(dir)?;
        let json = serde_json::to_vec_pretty(meta).map_err(std::io::Error::other)?;
        write_atomic(&path, &json)
    }
}

/// Writes through a sibling temp file and renames it into place, so readers
/// never observe a partial file.
fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
    let result = std::fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(contents)?;
        file.sync_all()
    });
    match result.and_then(|()| std::fs::rename(&tmp, path)) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            Err(e)
        },
    }
}

fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        cleaned
    }
}
