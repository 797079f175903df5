//! Transactions over the in-memory store.

use crate::error::{CoreError, CoreResult};
use crate::records::{ClientGroupRecord, ClientRecord, CvrRecord, EntityVersions};
use crate::store::memory::{MemoryStore, ReadKey, ScanScope, StoredCvr, Tables};
use crate::types::{ClientGroupId, ClientId, CvrId, SequenceNumber, UserId};
use cvrsync_schema::Record;
use std::collections::{BTreeMap, HashMap};

/// A domain row: the logical record and the user it belongs to.
///
/// Rows are identified by `(table, owner, key)`, so two users may hold the
/// same key independently.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Owning user.
    pub owner: UserId,
    /// Logical record, key fields included.
    pub record: Record,
}

/// Buffered writes of one transaction. `None` marks a delete.
#[derive(Debug, Default)]
pub(crate) struct WriteSet {
    pub client_groups: HashMap<ClientGroupId, ClientGroupRecord>,
    pub clients: HashMap<ClientId, ClientRecord>,
    pub cvrs: HashMap<CvrId, Option<StoredCvr>>,
    pub rows: HashMap<(String, UserId, String), Option<Row>>,
}

impl WriteSet {
    pub fn len(&self) -> usize {
        self.client_groups.len() + self.clients.len() + self.cvrs.len() + self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn touches_rows_of(&self, table: &str, owner: &UserId) -> bool {
        self.rows.keys().any(|(t, o, _)| t == table && o == owner)
    }
}

/// A serializable transaction.
///
/// Reads see committed state overlaid with this transaction's own writes.
/// Nothing is visible to others until [`commit`](Self::commit); dropping the
/// transaction discards its writes.
#[derive(Debug)]
pub struct Transaction<'s> {
    store: &'s MemoryStore,
    reads: HashMap<ReadKey, Option<u64>>,
    writes: WriteSet,
    finished: bool,
}

impl<'s> Transaction<'s> {
    pub(crate) fn new(store: &'s MemoryStore) -> Self {
        Self {
            store,
            reads: HashMap::new(),
            writes: WriteSet::default(),
            finished: false,
        }
    }

    /// Records what the first read of `key` saw.
    fn observe(&mut self, tables: &Tables, key: ReadKey) {
        let seen = tables.observed(&key);
        self.reads.entry(key).or_insert(seen);
    }

    // === Client groups ===

    /// Loads a client-group record.
    pub fn client_group(&mut self, id: &ClientGroupId) -> Option<ClientGroupRecord> {
        if let Some(record) = self.writes.client_groups.get(id) {
            return Some(record.clone());
        }
        let store = self.store;
        let tables = store.tables.read();
        self.observe(&tables, ReadKey::ClientGroup(id.clone()));
        tables.client_groups.get(id).cloned()
    }

    /// Inserts or replaces a client-group record.
    pub fn put_client_group(&mut self, record: ClientGroupRecord) {
        self.writes.client_groups.insert(record.id.clone(), record);
    }

    // === Clients ===

    /// Loads a client record.
    pub fn client(&mut self, id: &ClientId) -> Option<ClientRecord> {
        if let Some(record) = self.writes.clients.get(id) {
            return Some(record.clone());
        }
        let store = self.store;
        let tables = store.tables.read();
        self.observe(&tables, ReadKey::Client(id.clone()));
        tables.clients.get(id).cloned()
    }

    /// Inserts or replaces a client record.
    pub fn put_client(&mut self, record: ClientRecord) {
        self.writes.clients.insert(record.id.clone(), record);
    }

    /// Returns every client of a group, ordered by client id.
    pub fn clients_in_group(&mut self, group: &ClientGroupId) -> Vec<ClientRecord> {
        let mut found: BTreeMap<ClientId, ClientRecord> = {
            let store = self.store;
            let tables = store.tables.read();
            self.observe(&tables, ReadKey::Scan(ScanScope::ClientsOf(group.clone())));
            tables
                .clients
                .values()
                .filter(|c| &c.client_group_id == group)
                .map(|c| (c.id.clone(), c.clone()))
                .collect()
        };
        self.store.stats_handle().record_scan();

        for record in self.writes.clients.values() {
            if &record.client_group_id == group {
                found.insert(record.id.clone(), record.clone());
            }
        }
        found.into_values().collect()
    }

    // === Client view records ===

    /// Loads and decodes a CVR.
    pub fn cvr(&mut self, id: &CvrId) -> CoreResult<Option<CvrRecord>> {
        if let Some(pending) = self.writes.cvrs.get(id) {
            return pending
                .as_ref()
                .map(|stored| CvrRecord::from_cbor(&stored.bytes))
                .transpose();
        }
        let bytes = {
            let store = self.store;
            let tables = store.tables.read();
            self.observe(&tables, ReadKey::Cvr(*id));
            tables.cvrs.get(id).map(|stored| stored.bytes.clone())
        };
        bytes.map(|b| CvrRecord::from_cbor(&b)).transpose()
    }

    /// Persists a new CVR. CVRs are immutable; writing an existing id fails.
    pub fn put_cvr(&mut self, cvr: &CvrRecord) -> CoreResult<()> {
        let exists = match self.writes.cvrs.get(&cvr.id) {
            Some(pending) => pending.is_some(),
            None => {
                let store = self.store;
                let tables = store.tables.read();
                self.observe(&tables, ReadKey::Cvr(cvr.id));
                tables.cvrs.contains_key(&cvr.id)
            }
        };
        if exists {
            return Err(CoreError::invalid_operation(format!(
                "cvr {} already exists",
                cvr.id
            )));
        }

        let stored = StoredCvr {
            client_group_id: cvr.client_group_id.clone(),
            order: cvr.order,
            bytes: cvr.to_cbor()?,
        };
        self.writes.cvrs.insert(cvr.id, Some(stored));
        Ok(())
    }

    /// Deletes a CVR.
    pub fn delete_cvr(&mut self, id: &CvrId) {
        self.writes.cvrs.insert(*id, None);
    }

    /// Returns `(order, id)` of every CVR of a group, oldest first.
    pub fn cvrs_in_group(&mut self, group: &ClientGroupId) -> Vec<(u64, CvrId)> {
        let mut found: BTreeMap<CvrId, u64> = {
            let store = self.store;
            let tables = store.tables.read();
            self.observe(&tables, ReadKey::Scan(ScanScope::CvrsOf(group.clone())));
            tables
                .cvrs
                .iter()
                .filter(|(_, stored)| &stored.client_group_id == group)
                .map(|(id, stored)| (*id, stored.order))
                .collect()
        };
        self.store.stats_handle().record_scan();

        for (id, pending) in &self.writes.cvrs {
            match pending {
                Some(stored) if &stored.client_group_id == group => {
                    found.insert(*id, stored.order);
                }
                Some(_) => {}
                None => {
                    found.remove(id);
                }
            }
        }

        let mut out: Vec<(u64, CvrId)> =
            found.into_iter().map(|(id, order)| (order, id)).collect();
        out.sort();
        out
    }

    // === Domain rows ===

    /// Loads a domain row of `owner`.
    pub fn get_row(&mut self, table: &str, owner: &UserId, id: &str) -> Option<Row> {
        let key = (table.to_string(), owner.clone(), id.to_string());
        if let Some(pending) = self.writes.rows.get(&key) {
            return pending.clone();
        }
        let store = self.store;
        let tables = store.tables.read();
        let (table, owner, id) = key;
        let found = tables
            .rows
            .get(&(table.clone(), owner.clone()))
            .and_then(|rows| rows.get(&id))
            .map(|stored| stored.row.clone());
        self.observe(&tables, ReadKey::Row(table, owner, id));
        found
    }

    /// Inserts or replaces a domain row under its owner.
    pub fn put_row(&mut self, table: &str, id: &str, row: Row) {
        self.writes
            .rows
            .insert((table.to_string(), row.owner.clone(), id.to_string()), Some(row));
    }

    /// Deletes a domain row of `owner`.
    pub fn delete_row(&mut self, table: &str, owner: &UserId, id: &str) {
        self.writes
            .rows
            .insert((table.to_string(), owner.clone(), id.to_string()), None);
    }

    /// Returns every row of `owner` in `table`, including pending writes,
    /// ordered by id.
    pub fn scan_rows(&mut self, table: &str, owner: &UserId) -> Vec<(String, Row)> {
        let mut found: BTreeMap<String, Row> = {
            let store = self.store;
            let tables = store.tables.read();
            self.observe(
                &tables,
                ReadKey::Scan(ScanScope::RowsOf(table.to_string(), owner.clone())),
            );
            tables
                .rows
                .get(&(table.to_string(), owner.clone()))
                .map(|rows| {
                    rows.iter()
                        .map(|(id, stored)| (id.clone(), stored.row.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };
        self.store.stats_handle().record_scan();

        for ((t, o, id), pending) in &self.writes.rows {
            if t != table || o != owner {
                continue;
            }
            match pending {
                Some(row) => {
                    found.insert(id.clone(), row.clone());
                }
                None => {
                    found.remove(id);
                }
            }
        }
        found.into_iter().collect()
    }

    /// Returns `id -> version token` for every committed row of `owner`.
    ///
    /// Version tokens exist only for committed rows, so this fails if the
    /// transaction has pending writes to the owner's rows of `table`.
    pub fn row_versions(&mut self, table: &str, owner: &UserId) -> CoreResult<EntityVersions> {
        if self.writes.touches_rows_of(table, owner) {
            return Err(CoreError::invalid_operation(format!(
                "cannot version rows of `{table}` for {owner} with pending writes"
            )));
        }
        let versions = {
            let store = self.store;
            let tables = store.tables.read();
            self.observe(
                &tables,
                ReadKey::Scan(ScanScope::RowsOf(table.to_string(), owner.clone())),
            );
            tables
                .rows
                .get(&(table.to_string(), owner.clone()))
                .map(|rows| {
                    rows.iter()
                        .map(|(id, stored)| (id.clone(), stored.version))
                        .collect()
                })
                .unwrap_or_default()
        };
        self.store.stats_handle().record_scan();
        Ok(versions)
    }

    /// Loads the rows of `owner` with the given ids, skipping missing ones.
    pub fn rows<'a, I>(&mut self, table: &str, owner: &UserId, ids: I) -> Vec<(String, Row)>
    where
        I: IntoIterator<Item = &'a String>,
    {
        ids.into_iter()
            .filter_map(|id| self.get_row(table, owner, id).map(|row| (id.clone(), row)))
            .collect()
    }

    // === Lifecycle ===

    /// Returns the number of buffered writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Validates and commits the transaction.
    ///
    /// Fails with a retryable [`CoreError::SerializationConflict`] if
    /// anything this transaction read has been written since.
    pub fn commit(mut self) -> CoreResult<SequenceNumber> {
        self.finished = true;
        let writes = std::mem::take(&mut self.writes);
        self.store.commit_inner(&self.reads, writes)
    }

    /// Discards the transaction.
    pub fn abort(mut self) {
        self.finished = true;
        self.store.stats_handle().record_transaction_abort();
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.store.stats_handle().record_transaction_abort();
        }
    }
}
