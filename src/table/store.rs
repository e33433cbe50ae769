//! Table: the log manager
//!
//! Owns every view of one table and keeps them consistent:
//!
//! - `resident`: records materialized in memory
//! - `pending_writes`: inserts not yet appended to the log
//! - `pending_updates`: latest value per id, authoritative over resident
//!   and over the log until the next compaction
//! - `pending_deletes` / `deleted_ids`: tombstones from this session and
//!   from a previous one
//! - the LRU cache and the secondary indices, updated synchronously
//!
//! # Visibility
//!
//! A lookup resolves in order: tombstone, pending update, cache, pending
//! write, resident, and finally a streaming pass over the log when the table
//! is not fully resident.
//!
//! # Durability
//!
//! A mutation that returns `Ok` has taken effect in memory. Inserts reach
//! the log by append (batch size, debounced save, `flush`). Updates and
//! deletes reach it by compaction, which rewrites the log through a temp
//! file and an atomic rename. A failed compaction leaves the log and every
//! in-memory buffer untouched.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use chrono::Duration;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::events::{Subscribers, TableEvent};
use super::scheduler::SaveScheduler;
use crate::cache::{CacheStats, RecordCache};
use crate::config::{IdStrategy, TableOptions};
use crate::document::{
    format_timestamp, parse_date, Document, CREATED_FIELD, ID_FIELD, MODIFIED_FIELD,
};
use crate::error::{TableError, TableResult};
use crate::index::{IndexKind, IndexManager};
use crate::observability::{log_event, Event, MetricsSnapshot, ObservationScope, TableMetrics};
use crate::query::Query;
use crate::storage::{
    CompactReason, LogFile, LogRewrite, MetadataStore, SaveAction, SaveBacklog, StorageResult,
    TableMetadata,
};

/// Table lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    /// Constructed, nothing read yet
    Unloaded,
    /// Reading metadata and log
    Loading,
    /// Serving operations
    Ready,
    /// Rewriting the log
    Compacting,
    /// Closed or dropped
    Closed,
}

impl TableState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableState::Unloaded => "unloaded",
            TableState::Loading => "loading",
            TableState::Ready => "ready",
            TableState::Compacting => "compacting",
            TableState::Closed => "closed",
        }
    }
}

impl fmt::Display for TableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named collection of records backed by `<dir>/<name>.log`
pub struct Table {
    name: String,
    dir: PathBuf,
    options: TableOptions,
    clock: Arc<dyn Clock>,
    state: TableState,

    log: LogFile,
    meta_store: MetadataStore,
    metadata: TableMetadata,

    resident: BTreeMap<String, Document>,
    pending_writes: Vec<Document>,
    pending_updates: HashMap<String, Document>,
    pending_deletes: BTreeSet<String>,
    deleted_ids: BTreeSet<String>,

    cache: RecordCache,
    indices: IndexManager,
    scheduler: SaveScheduler,

    /// Every visible record is in `resident` (or pending)
    fully_resident: bool,
    /// Record count as of the last load, append or compaction
    record_count: usize,
    /// An append failed; the next save must rewrite the log
    needs_full_save: bool,
    /// Metadata changed without record changes
    metadata_dirty: bool,
    last_compaction: chrono::DateTime<chrono::Utc>,

    subscribers: Subscribers,
    metrics: TableMetrics,
}

impl Table {
    /// Creates an unloaded table using the system clock. Nothing is read
    /// until `load()`.
    pub fn open(dir: impl AsRef<Path>, name: &str, options: TableOptions) -> TableResult<Self> {
        Self::with_clock(dir, name, options, Arc::new(SystemClock))
    }

    /// Creates an unloaded table with an explicit time source
    pub fn with_clock(
        dir: impl AsRef<Path>,
        name: &str,
        options: TableOptions,
        clock: Arc<dyn Clock>,
    ) -> TableResult<Self> {
        validate_name(name)?;
        let dir = dir.as_ref().to_path_buf();
        let now = clock.now();

        Ok(Self {
            name: name.to_string(),
            log: LogFile::new(&dir, name),
            meta_store: MetadataStore::new(&dir, name),
            dir,
            cache: RecordCache::new(options.cache_capacity),
            scheduler: SaveScheduler::new(options.debounce_ms),
            options,
            clock,
            state: TableState::Unloaded,
            metadata: TableMetadata::default(),
            resident: BTreeMap::new(),
            pending_writes: Vec::new(),
            pending_updates: HashMap::new(),
            pending_deletes: BTreeSet::new(),
            deleted_ids: BTreeSet::new(),
            indices: IndexManager::new(),
            fully_resident: true,
            record_count: 0,
            needs_full_save: false,
            metadata_dirty: false,
            last_compaction: now,
            subscribers: Subscribers::default(),
            metrics: TableMetrics::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state(&self) -> TableState {
        self.state
    }

    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    /// Path of the record log
    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    /// Path of the metadata side-file
    pub fn metadata_path(&self) -> &Path {
        self.meta_store.path()
    }

    // ==================
    // Lifecycle
    // ==================

    /// Reads metadata and the log.
    ///
    /// Records are kept in memory while their count stays within the cache
    /// capacity; beyond that only the indices are built and records are
    /// fetched on demand. A missing log is an empty table. Unparseable
    /// lines are skipped.
    pub fn load(&mut self) -> TableResult<()> {
        match self.state {
            TableState::Unloaded => {}
            TableState::Ready => return Ok(()),
            state => return Err(self.not_ready(state)),
        }

        self.state = TableState::Loading;
        match self.load_from_disk() {
            Ok(()) => {
                self.state = TableState::Ready;
                Ok(())
            }
            Err(e) => {
                self.reset_memory();
                self.state = TableState::Unloaded;
                Err(e)
            }
        }
    }

    fn load_from_disk(&mut self) -> TableResult<()> {
        let scope = ObservationScope::with_fields("TABLE_LOAD", &[("table", &self.name)]);

        let metadata = self.meta_store.read()?.unwrap_or_default();
        let tombstones: BTreeSet<String> = metadata.tombstones.iter().cloned().collect();
        let fields = metadata.indices.clone();
        let capacity = self.options.cache_capacity;

        let mut field_values: Vec<BTreeMap<String, Value>> = vec![BTreeMap::new(); fields.len()];
        let mut resident = BTreeMap::new();
        let mut duplicates = HashMap::new();
        let mut seen = HashSet::new();
        let mut fully_resident = true;

        let summary = self.log.scan(|doc| {
            let Some(id) = doc.id().map(str::to_string) else {
                return ControlFlow::Continue(());
            };
            if tombstones.contains(&id) {
                return ControlFlow::Continue(());
            }

            // The latest line decides the indexed value
            for (field, values) in fields.iter().zip(field_values.iter_mut()) {
                match doc.get_path(field) {
                    Some(value) => {
                        values.insert(id.clone(), value.clone());
                    }
                    None => {
                        values.remove(&id);
                    }
                }
            }

            if !seen.insert(id.clone()) {
                // Re-appended id: the later line becomes a pending update so
                // it is visible now and consolidated by the next compaction
                duplicates.insert(id, doc);
                return ControlFlow::Continue(());
            }

            if fully_resident {
                if resident.len() < capacity {
                    resident.insert(id, doc);
                } else {
                    fully_resident = false;
                    resident.clear();
                }
            }
            ControlFlow::Continue(())
        })?;

        self.indices.clear();
        for (field, values) in fields.iter().zip(field_values) {
            self.indices.create_index(field, values)?;
        }

        self.metadata = metadata;
        self.deleted_ids = tombstones;
        self.resident = resident;
        self.pending_updates = duplicates;
        self.fully_resident = fully_resident;
        self.record_count = seen.len();
        self.last_compaction = self.clock.now();

        if summary.malformed > 0 {
            self.metrics.add_malformed_lines(summary.malformed as u64);
            log_event(
                Event::MalformedLineSkipped,
                &[
                    ("table", &self.name),
                    ("count", &summary.malformed.to_string()),
                ],
            );
        }

        if !self.pending_updates.is_empty() || !self.deleted_ids.is_empty() {
            self.schedule_save();
        }

        scope.complete_with_fields(&[
            ("records", &self.record_count.to_string()),
            ("fully_resident", &self.fully_resident.to_string()),
            ("indices", &self.metadata.indices.len().to_string()),
        ]);
        Ok(())
    }

    /// Appends pending inserts, compacts if updates, deletes or tombstones
    /// are outstanding, writes metadata and closes the table.
    pub fn close(&mut self) -> TableResult<()> {
        match self.state {
            TableState::Closed => return Ok(()),
            TableState::Unloaded => {
                self.state = TableState::Closed;
                return Ok(());
            }
            _ => {}
        }

        self.scheduler.cancel();
        let backlog = self.backlog();
        if backlog.needs_full_save || backlog.garbage() > 0 {
            self.compact_with(CompactReason::PendingChanges)?;
        } else {
            self.flush_writes()?;
            self.write_metadata()?;
        }

        self.reset_memory();
        self.state = TableState::Closed;
        log_event(Event::TableClosed, &[("table", &self.name)]);
        Ok(())
    }

    /// Deletes the log and metadata and discards all in-memory state.
    ///
    /// Any scheduled save is cancelled first.
    pub fn drop_table(&mut self) -> TableResult<()> {
        self.scheduler.cancel();
        self.log.remove()?;
        self.meta_store.remove()?;

        self.reset_memory();
        self.metadata = TableMetadata::default();
        self.record_count = 0;
        self.state = TableState::Closed;

        log_event(Event::TableDropped, &[("table", &self.name)]);
        Ok(())
    }

    /// Removes every record and index, deletes the log and re-persists
    /// empty metadata. The auto-increment counter survives.
    pub fn truncate(&mut self) -> TableResult<()> {
        self.ensure_ready()?;
        self.scheduler.cancel();
        self.log.remove()?;

        let auto_increment = self.metadata.auto_increment;
        self.reset_memory();
        self.metadata = TableMetadata {
            auto_increment,
            ..TableMetadata::default()
        };
        self.record_count = 0;
        self.fully_resident = true;
        self.write_metadata()?;

        log_event(Event::TableTruncated, &[("table", &self.name)]);
        Ok(())
    }

    // ==================
    // Writes
    // ==================

    /// Inserts one record.
    ///
    /// Assigns `_id` when absent (numeric ids are stored as strings) and
    /// stamps `_created`/`_modified`. Inserting an id that already exists
    /// replaces the visible record.
    pub fn insert(&mut self, record: Value) -> TableResult<Document> {
        self.ensure_ready()?;
        let (doc, id) = prepare_record(record)?;
        let inserted = self.insert_prepared(doc, id)?;
        self.after_insert();
        Ok(inserted)
    }

    /// Inserts several records with a single flush check at the end.
    ///
    /// Every record is validated before any is applied.
    pub fn insert_many<I>(&mut self, records: I) -> TableResult<Vec<Document>>
    where
        I: IntoIterator<Item = Value>,
    {
        self.ensure_ready()?;
        let prepared = records
            .into_iter()
            .map(prepare_record)
            .collect::<TableResult<Vec<_>>>()?;

        let mut inserted = Vec::with_capacity(prepared.len());
        for (doc, id) in prepared {
            inserted.push(self.insert_prepared(doc, id)?);
        }
        self.after_insert();
        Ok(inserted)
    }

    fn insert_prepared(&mut self, mut doc: Document, id: Option<String>) -> TableResult<Document> {
        let (id, existing) = match id {
            Some(id) => {
                let existing = self.lookup(&id)?;
                (id, existing)
            }
            None => (self.next_id()?, None),
        };

        let stamp = self.stamp_after(existing.as_ref());
        doc.set(ID_FIELD, Value::String(id.clone()));
        doc.set(CREATED_FIELD, Value::String(stamp.clone()));
        doc.set(MODIFIED_FIELD, Value::String(stamp));

        let was_deleted = self.pending_deletes.remove(&id) | self.deleted_ids.remove(&id);
        if was_deleted {
            // A persisted tombstone would hide the new line on reload
            self.metadata_dirty = true;
        }
        if existing.is_some() || was_deleted {
            // Older lines for this id may still be in the log
            self.pending_updates.insert(id.clone(), doc.clone());
        }

        self.cache.set(id.clone(), doc.clone());
        self.indices.update_indices(&id, existing.as_ref(), Some(&doc));
        self.pending_writes.push(doc.clone());

        self.metrics.increment_inserts();
        self.subscribers.notify(TableEvent::Inserted(doc.clone()));
        Ok(doc)
    }

    fn after_insert(&mut self) {
        if !self.options.autosave {
            return;
        }
        if self.pending_writes.len() >= self.options.effective_batch_size() {
            match self.flush_writes() {
                Ok(_) if self.metadata_dirty => {
                    if let Err(e) = self.write_metadata() {
                        log_event(
                            Event::WriteFlushFailed,
                            &[("table", &self.name), ("error", &e.to_string())],
                        );
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    self.needs_full_save = true;
                    log_event(
                        Event::WriteFlushFailed,
                        &[("table", &self.name), ("error", &e.to_string())],
                    );
                }
            }
        }
        self.schedule_save();
    }

    /// Merges `patch` over the current record.
    ///
    /// `_id` and `_created` are preserved and `_modified` refreshed.
    /// Returns `None` when the id is not visible.
    pub fn update(&mut self, id: &str, patch: Value) -> TableResult<Option<Document>> {
        self.ensure_ready()?;
        let patch = patch_object(patch)?;
        let updated = self.apply_update(id, &patch)?;
        if updated.is_some() {
            self.schedule_save();
        }
        Ok(updated)
    }

    /// Applies `patch` to every record matching `filter`. Returns the number
    /// of records updated.
    pub fn update_many(&mut self, filter: Value, patch: Value) -> TableResult<usize> {
        self.ensure_ready()?;
        let patch = patch_object(patch)?;
        let ids = self.find(filter)?.ids()?;

        let mut updated = 0;
        for id in ids {
            if self.apply_update(&id, &patch)?.is_some() {
                updated += 1;
            }
        }
        if updated > 0 {
            self.schedule_save();
        }
        Ok(updated)
    }

    fn apply_update(&mut self, id: &str, patch: &Map<String, Value>) -> TableResult<Option<Document>> {
        let Some(before) = self.lookup(id)? else {
            return Ok(None);
        };

        let mut after = before.clone();
        for (field, value) in patch {
            if matches!(field.as_str(), ID_FIELD | CREATED_FIELD | MODIFIED_FIELD) {
                continue;
            }
            after.set(field.clone(), value.clone());
        }
        after.set(MODIFIED_FIELD, Value::String(self.stamp_after(Some(&before))));

        self.pending_updates.insert(id.to_string(), after.clone());
        self.cache.set(id.to_string(), after.clone());
        self.indices.update_indices(id, Some(&before), Some(&after));

        self.metrics.increment_updates();
        self.subscribers.notify(TableEvent::Updated {
            before,
            after: after.clone(),
        });
        Ok(Some(after))
    }

    /// Deletes a record. Returns false when the id is not visible.
    pub fn delete(&mut self, id: &str) -> TableResult<bool> {
        self.ensure_ready()?;
        let deleted = self.apply_delete(id)?;
        if deleted {
            self.schedule_save();
        }
        Ok(deleted)
    }

    /// Deletes every record matching `filter`. Returns the number deleted.
    pub fn delete_many(&mut self, filter: Value) -> TableResult<usize> {
        self.ensure_ready()?;
        let ids = self.find(filter)?.ids()?;

        let mut deleted = 0;
        for id in ids {
            if self.apply_delete(&id)? {
                deleted += 1;
            }
        }
        if deleted > 0 {
            self.schedule_save();
        }
        Ok(deleted)
    }

    fn apply_delete(&mut self, id: &str) -> TableResult<bool> {
        let Some(before) = self.lookup(id)? else {
            return Ok(false);
        };

        self.cache.delete(&id.to_string());
        self.indices.update_indices(id, Some(&before), None);
        self.pending_updates.remove(id);
        self.pending_writes.retain(|doc| doc.id() != Some(id));
        self.pending_deletes.insert(id.to_string());
        // Tombstones ride along in metadata until compaction purges them
        self.metadata_dirty = true;

        self.metrics.increment_deletes();
        self.subscribers.notify(TableEvent::Deleted { id: id.to_string() });
        Ok(true)
    }

    // ==================
    // Reads
    // ==================

    /// Current value of a record, or `None` if absent or deleted
    pub fn get(&mut self, id: &str) -> TableResult<Option<Document>> {
        self.ensure_ready()?;
        self.lookup(id)
    }

    /// True if the id is visible
    pub fn contains(&mut self, id: &str) -> TableResult<bool> {
        Ok(self.get(id)?.is_some())
    }

    /// Starts an unfiltered query
    pub fn query(&mut self) -> Query<'_> {
        Query::new(self)
    }

    /// Starts a query with a filter such as `{"age": {"$gte": 25}}`
    pub fn find(&mut self, filter: Value) -> TableResult<Query<'_>> {
        self.ensure_ready()?;
        self.query().filter(filter)
    }

    /// First record matching `filter`
    pub fn find_one(&mut self, filter: Value) -> TableResult<Option<Document>> {
        self.find(filter)?.first()
    }

    /// Every visible record
    pub fn all(&mut self) -> TableResult<Vec<Document>> {
        self.query().execute()
    }

    /// Number of records matching `filter`
    pub fn count(&mut self, filter: Value) -> TableResult<usize> {
        self.find(filter)?.count()
    }

    /// Number of visible records
    pub fn len(&mut self) -> TableResult<usize> {
        self.query().count()
    }

    pub fn is_empty(&mut self) -> TableResult<bool> {
        Ok(self.len()? == 0)
    }

    // ==================
    // Indices
    // ==================

    /// Builds an index on a (possibly nested) field from the current
    /// records and records the field in metadata. Recreating an existing
    /// index rebuilds it.
    pub fn create_index(&mut self, field: &str) -> TableResult<IndexKind> {
        self.ensure_ready()?;
        IndexManager::validate_field(field)?;

        let mut entries = Vec::new();
        self.scan_visible(|doc| {
            if let (Some(id), Some(value)) = (doc.id(), doc.get_path(field)) {
                entries.push((id.to_string(), value.clone()));
            }
        })?;
        let entry_count = entries.len();
        let kind = self.indices.create_index(field, entries)?;

        self.metadata_dirty = true;
        self.schedule_save();
        log_event(
            Event::IndexCreated,
            &[
                ("table", &self.name),
                ("field", field),
                ("kind", kind.as_str()),
                ("entries", &entry_count.to_string()),
            ],
        );
        Ok(kind)
    }

    /// Removes the index on `field`. Returns whether one existed.
    pub fn drop_index(&mut self, field: &str) -> TableResult<bool> {
        self.ensure_ready()?;
        let existed = self.indices.drop_index(field);
        if existed {
            self.metadata_dirty = true;
            self.schedule_save();
            log_event(Event::IndexDropped, &[("table", &self.name), ("field", field)]);
        }
        Ok(existed)
    }

    pub fn indexed_fields(&self) -> Vec<String> {
        self.indices.indexed_fields()
    }

    pub fn index_kind(&self, field: &str) -> Option<IndexKind> {
        self.indices.index_kind(field)
    }

    // ==================
    // Persistence
    // ==================

    /// Appends pending inserts to the log and persists metadata.
    ///
    /// Bypasses the debounce for inserts only; pending updates and deletes
    /// still wait for a save. If an earlier append failed, the buffered
    /// inserts go through a full compaction instead.
    pub fn flush(&mut self) -> TableResult<()> {
        self.ensure_ready()?;
        if self.needs_full_save {
            self.compact_with(CompactReason::FailedFlush)?;
            return Ok(());
        }

        let written = self.flush_writes()?;
        if written > 0 || self.metadata_dirty {
            self.write_metadata()?;
        }
        Ok(())
    }

    /// Runs the gated save: skip, append, or compact depending on what is
    /// buffered. On failure the buffers are kept and the save is
    /// rescheduled.
    pub fn save(&mut self) -> TableResult<SaveAction> {
        self.ensure_ready()?;
        self.scheduler.cancel();

        let since_ms = (self.clock.now() - self.last_compaction).num_milliseconds();
        let action = self
            .options
            .compaction_policy()
            .decide(&self.backlog(), since_ms);

        let result = match action {
            SaveAction::Skip => {
                log_event(Event::CompactionSkipped, &[("table", &self.name)]);
                Ok(())
            }
            SaveAction::Append => self
                .flush_writes()
                .and_then(|_| self.write_metadata()),
            SaveAction::Compact(reason) => self.compact_with(reason).map(|_| ()),
        };

        match result {
            Ok(()) => Ok(action),
            Err(e) => {
                self.schedule_save();
                Err(e)
            }
        }
    }

    /// Rewrites the log now, regardless of the garbage ratio. Returns the
    /// number of records in the new log.
    pub fn compact(&mut self) -> TableResult<usize> {
        self.ensure_ready()?;
        self.compact_with(CompactReason::Requested)
    }

    /// Runs a scheduled save whose debounce deadline has passed.
    ///
    /// Hosts call this from a timer or event loop.
    pub fn tick(&mut self) -> TableResult<Option<SaveAction>> {
        if self.state != TableState::Ready {
            return Ok(None);
        }
        if self.scheduler.take_due(self.clock.now()) {
            self.save().map(Some)
        } else {
            Ok(None)
        }
    }

    /// True if a debounced save is waiting
    pub fn save_pending(&self) -> bool {
        self.scheduler.is_scheduled()
    }

    fn flush_writes(&mut self) -> TableResult<usize> {
        if self.pending_writes.is_empty() {
            return Ok(0);
        }

        let batch: Vec<Document> = self
            .pending_writes
            .iter()
            .filter(|doc| doc.id().map_or(false, |id| !self.is_deleted(id)))
            .cloned()
            .collect();
        let written = self.log.append(&batch)?;

        for doc in batch {
            if let Some(id) = doc.id() {
                self.resident.insert(id.to_string(), doc);
            }
        }
        self.pending_writes.clear();
        self.record_count += written;

        self.metrics.increment_flushes();
        log_event(
            Event::WritesFlushed,
            &[("table", &self.name), ("records", &written.to_string())],
        );
        Ok(written)
    }

    fn compact_with(&mut self, reason: CompactReason) -> TableResult<usize> {
        self.state = TableState::Compacting;
        let result = self.rewrite_log(reason);
        self.state = TableState::Ready;

        match result {
            Ok(written) => {
                self.metrics.increment_compactions();
                Ok(written)
            }
            Err(e) => {
                self.metrics.increment_compaction_failures();
                log_event(
                    Event::CompactionFailed,
                    &[
                        ("table", &self.name),
                        ("reason", reason.as_str()),
                        ("error", &e.to_string()),
                    ],
                );
                Err(e)
            }
        }
    }

    /// Rewrites the log: lines in first-occurrence order, tombstoned ids
    /// dropped, pending updates substituted, then resident-only records and
    /// pending inserts not already written.
    fn rewrite_log(&mut self, reason: CompactReason) -> TableResult<usize> {
        let scope = ObservationScope::with_fields(
            "COMPACTION",
            &[("table", &self.name), ("reason", reason.as_str())],
        );

        let mut pass = CompactionPass {
            rewrite: LogRewrite::begin(&self.log)?,
            seen: HashSet::new(),
            updates: &self.pending_updates,
            pending_deletes: &self.pending_deletes,
            tombstones: &self.deleted_ids,
        };

        let mut write_error = None;
        let summary = self.log.scan(|doc| match pass.offer(&doc) {
            Ok(()) => ControlFlow::Continue(()),
            Err(e) => {
                write_error = Some(e);
                ControlFlow::Break(())
            }
        })?;
        if let Some(e) = write_error {
            return Err(e.into());
        }
        for doc in self.resident.values() {
            pass.offer(doc)?;
        }
        for doc in &self.pending_writes {
            pass.offer(doc)?;
        }
        let written = pass.rewrite.commit()?;

        // The new log is in place; fold the buffers into resident
        let writes = std::mem::take(&mut self.pending_writes);
        let updates = std::mem::take(&mut self.pending_updates);
        for doc in writes {
            if let Some(id) = doc.id().map(str::to_string) {
                self.resident.insert(id, doc);
            }
        }
        for (id, doc) in updates {
            self.resident.insert(id, doc);
        }
        for id in self.pending_deletes.iter().chain(self.deleted_ids.iter()) {
            self.resident.remove(id);
        }
        self.pending_deletes.clear();
        self.deleted_ids.clear();

        self.needs_full_save = false;
        self.record_count = written;
        self.last_compaction = self.clock.now();
        self.scheduler.cancel();
        self.write_metadata()?;

        scope.complete_with_fields(&[
            ("records", &written.to_string()),
            ("malformed_dropped", &summary.malformed.to_string()),
        ]);
        Ok(written)
    }

    fn write_metadata(&mut self) -> TableResult<()> {
        self.metadata.record_count = self.record_count;
        self.metadata.modified = Some(format_timestamp(self.clock.now()));
        self.metadata.indices = self.indices.indexed_fields();
        self.metadata.tombstones = self
            .pending_deletes
            .union(&self.deleted_ids)
            .cloned()
            .collect();
        self.meta_store.write(&self.metadata)?;
        self.metadata_dirty = false;
        Ok(())
    }

    fn backlog(&self) -> SaveBacklog {
        SaveBacklog {
            pending_writes: self.pending_writes.len(),
            pending_updates: self.pending_updates.len(),
            pending_deletes: self.pending_deletes.len(),
            tombstones: self.deleted_ids.len(),
            record_count: self.record_count,
            metadata_dirty: self.metadata_dirty,
            needs_full_save: self.needs_full_save,
        }
    }

    fn schedule_save(&mut self) {
        if self.options.autosave {
            self.scheduler.schedule(self.clock.now());
        }
    }

    // ==================
    // Introspection
    // ==================

    /// Receives an event for every insert, update and delete from now on
    pub fn subscribe(&mut self) -> Receiver<TableEvent> {
        self.subscribers.subscribe()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Inserts not yet appended to the log
    pub fn pending_write_count(&self) -> usize {
        self.pending_writes.len()
    }

    /// Updates, deletes and tombstones not yet compacted away
    pub fn garbage_count(&self) -> usize {
        self.backlog().garbage()
    }

    /// Whether every record is held in memory
    pub fn is_fully_resident(&self) -> bool {
        self.fully_resident
    }

    // ==================
    // Query support
    // ==================

    pub(crate) fn ensure_ready(&self) -> TableResult<()> {
        match self.state {
            TableState::Ready => Ok(()),
            state => Err(self.not_ready(state)),
        }
    }

    pub(crate) fn index_manager(&self) -> &IndexManager {
        &self.indices
    }

    pub(crate) fn record_query(&self, indexed: bool) {
        self.metrics.record_query(indexed);
    }

    /// Resolves one id to its current visible value
    pub(crate) fn lookup(&mut self, id: &str) -> TableResult<Option<Document>> {
        if self.is_deleted(id) {
            return Ok(None);
        }
        if let Some(doc) = self.pending_updates.get(id) {
            return Ok(Some(doc.clone()));
        }

        let key = id.to_string();
        if let Some(doc) = self.cache.get(&key) {
            return Ok(Some(doc));
        }
        if let Some(doc) = self.pending_writes.iter().rev().find(|d| d.id() == Some(id)) {
            let doc = doc.clone();
            self.cache.set(key, doc.clone());
            return Ok(Some(doc));
        }
        if let Some(doc) = self.resident.get(id) {
            let doc = doc.clone();
            self.cache.set(key, doc.clone());
            return Ok(Some(doc));
        }
        if self.fully_resident {
            return Ok(None);
        }

        match self.log.find(id)? {
            Some(doc) => {
                self.cache.set(key.clone(), doc.clone());
                self.resident.insert(key, doc.clone());
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }

    /// Visits every visible record once, with pending updates applied.
    ///
    /// Fully resident tables are served from memory; otherwise the log is
    /// streamed.
    pub(crate) fn scan_visible<F>(&self, mut visit: F) -> TableResult<()>
    where
        F: FnMut(Document),
    {
        let mut seen: HashSet<String> = HashSet::new();
        let current = |id: &str, doc: &Document| -> Document {
            self.pending_updates.get(id).unwrap_or(doc).clone()
        };

        if !self.fully_resident {
            self.log.scan(|doc| {
                if let Some(id) = doc.id() {
                    if seen.insert(id.to_string()) && !self.is_deleted(id) {
                        visit(current(id, &doc));
                    }
                }
                ControlFlow::Continue(())
            })?;
        }

        for (id, doc) in &self.resident {
            if seen.insert(id.clone()) && !self.is_deleted(id) {
                visit(current(id, doc));
            }
        }
        for doc in &self.pending_writes {
            if let Some(id) = doc.id() {
                if seen.insert(id.to_string()) && !self.is_deleted(id) {
                    visit(current(id, doc));
                }
            }
        }
        Ok(())
    }

    // ==================
    // Internals
    // ==================

    fn is_deleted(&self, id: &str) -> bool {
        self.pending_deletes.contains(id) || self.deleted_ids.contains(id)
    }

    fn not_ready(&self, state: TableState) -> TableError {
        TableError::NotReady {
            table: self.name.clone(),
            state,
        }
    }

    fn reset_memory(&mut self) {
        self.resident.clear();
        self.pending_writes.clear();
        self.pending_updates.clear();
        self.pending_deletes.clear();
        self.deleted_ids.clear();
        self.cache.clear();
        self.indices.clear();
        self.needs_full_save = false;
        self.metadata_dirty = false;
    }

    fn next_id(&mut self) -> TableResult<String> {
        match self.options.id_strategy {
            IdStrategy::Uuid => Ok(Uuid::new_v4().to_string()),
            IdStrategy::AutoIncrement => loop {
                self.metadata.auto_increment += 1;
                self.metadata_dirty = true;
                let id = self.metadata.auto_increment.to_string();
                if self.lookup(&id)?.is_none() {
                    return Ok(id);
                }
            },
        }
    }

    /// Timestamp for a new version of `previous`: now, but always at least
    /// one microsecond after the previous `_modified`
    fn stamp_after(&self, previous: Option<&Document>) -> String {
        let now = self.clock.now();
        let floor = previous
            .and_then(Document::modified)
            .and_then(parse_date)
            .map(|prev| prev + Duration::microseconds(1));
        match floor {
            Some(floor) if floor > now => format_timestamp(floor),
            _ => format_timestamp(now),
        }
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .field("state", &self.state)
            .field("record_count", &self.record_count)
            .field("fully_resident", &self.fully_resident)
            .field("pending_writes", &self.pending_writes.len())
            .field("pending_updates", &self.pending_updates.len())
            .field("pending_deletes", &self.pending_deletes.len())
            .field("indices", &self.indices.indexed_fields())
            .finish()
    }
}

/// One compaction's output stream, deduplicated by id
struct CompactionPass<'a> {
    rewrite: LogRewrite,
    seen: HashSet<String>,
    updates: &'a HashMap<String, Document>,
    pending_deletes: &'a BTreeSet<String>,
    tombstones: &'a BTreeSet<String>,
}

impl CompactionPass<'_> {
    /// Writes the current value of `doc`'s id the first time the id is seen
    fn offer(&mut self, doc: &Document) -> StorageResult<()> {
        let Some(id) = doc.id() else {
            return Ok(());
        };
        if !self.seen.insert(id.to_string()) {
            return Ok(());
        }
        if self.pending_deletes.contains(id) || self.tombstones.contains(id) {
            return Ok(());
        }
        self.rewrite.write(self.updates.get(id).unwrap_or(doc))
    }
}

fn validate_name(name: &str) -> TableResult<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.chars().any(|c| matches!(c, '/' | '\\' | '\0'));
    if invalid {
        return Err(TableError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Validates an inserted value and normalizes a caller-supplied `_id`
fn prepare_record(record: Value) -> TableResult<(Document, Option<String>)> {
    let mut doc = Document::from_value(record)
        .ok_or_else(|| TableError::InvalidDocument("expected a JSON object".to_string()))?;

    let id = match doc.get(ID_FIELD) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(other) => {
            return Err(TableError::InvalidDocument(format!("unusable _id: {}", other)));
        }
    };
    if id.is_none() {
        doc.remove(ID_FIELD);
    }
    Ok((doc, id))
}

fn patch_object(patch: Value) -> TableResult<Map<String, Value>> {
    match patch {
        Value::Object(map) => Ok(map),
        _ => Err(TableError::InvalidDocument(
            "patch must be a JSON object".to_string(),
        )),
    }
}
