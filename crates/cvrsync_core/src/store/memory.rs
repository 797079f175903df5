//! The committed state and the commit protocol.

use crate::error::{CoreError, CoreResult};
use crate::records::{ClientGroupRecord, ClientRecord};
use crate::stats::{StatsSnapshot, StoreStats};
use crate::store::transaction::{Row, Transaction, WriteSet};
use crate::types::{ClientGroupId, ClientId, CvrId, SequenceNumber, UserId, VersionToken};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// The set of rows a scan reads.
///
/// Scans are scoped to one client group or one owner, so unrelated groups
/// never invalidate each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ScanScope {
    ClientsOf(ClientGroupId),
    CvrsOf(ClientGroupId),
    RowsOf(String, UserId),
}

/// Something a transaction observed.
///
/// Point reads observe one key; scans observe a scope, which is
/// invalidated by any write into it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ReadKey {
    ClientGroup(ClientGroupId),
    Client(ClientId),
    Cvr(CvrId),
    Row(String, UserId, String),
    Scan(ScanScope),
}

impl fmt::Display for ReadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadKey::ClientGroup(id) => write!(f, "client-group:{id}"),
            ReadKey::Client(id) => write!(f, "client:{id}"),
            ReadKey::Cvr(id) => write!(f, "cvr:{id}"),
            ReadKey::Row(table, owner, id) => write!(f, "{table}:{owner}:{id}"),
            ReadKey::Scan(ScanScope::ClientsOf(group)) => write!(f, "clients-of:{group}"),
            ReadKey::Scan(ScanScope::CvrsOf(group)) => write!(f, "cvrs-of:{group}"),
            ReadKey::Scan(ScanScope::RowsOf(table, owner)) => write!(f, "{table}-of:{owner}"),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct StoredCvr {
    pub client_group_id: ClientGroupId,
    pub order: u64,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub(crate) struct StoredRow {
    pub row: Row,
    pub version: VersionToken,
}

#[derive(Debug, Default)]
pub(crate) struct Tables {
    pub client_groups: HashMap<ClientGroupId, ClientGroupRecord>,
    pub clients: HashMap<ClientId, ClientRecord>,
    pub cvrs: HashMap<CvrId, StoredCvr>,
    /// Domain rows per `(table, owner)`. Keys are unique per owner only.
    pub rows: HashMap<(String, UserId), BTreeMap<String, StoredRow>>,
    /// Sequence of the last committed write per key (deleted keys included).
    pub versions: HashMap<ReadKey, u64>,
    pub committed_seq: u64,
}

impl Tables {
    pub fn observed(&self, key: &ReadKey) -> Option<u64> {
        self.versions.get(key).copied()
    }

    fn stamp(&mut self, key: ReadKey, scope: ScanScope, seq: u64) {
        self.versions.insert(key, seq);
        self.versions.insert(ReadKey::Scan(scope), seq);
    }
}

/// In-memory relational store with serializable transactions.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub(crate) tables: RwLock<Tables>,
    stats: StoreStats,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins a transaction.
    pub fn begin(&self) -> Transaction<'_> {
        self.stats.record_transaction_start();
        Transaction::new(self)
    }

    /// Returns the sequence of the newest committed write transaction.
    #[must_use]
    pub fn committed_seq(&self) -> SequenceNumber {
        SequenceNumber::new(self.tables.read().committed_seq)
    }

    /// Returns the number of persisted CVRs across all groups.
    #[must_use]
    pub fn cvr_count(&self) -> usize {
        self.tables.read().cvrs.len()
    }

    /// Returns a snapshot of the transaction counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub(crate) fn stats_handle(&self) -> &StoreStats {
        &self.stats
    }

    /// Validates the read set and applies the write set atomically.
    pub(crate) fn commit_inner(
        &self,
        reads: &HashMap<ReadKey, Option<u64>>,
        writes: WriteSet,
    ) -> CoreResult<SequenceNumber> {
        let mut tables = self.tables.write();

        if let Some((key, _)) = reads
            .iter()
            .find(|(key, observed)| tables.observed(key) != **observed)
        {
            self.stats.record_conflict();
            self.stats.record_transaction_abort();
            tracing::debug!(%key, "commit rejected by read-set validation");
            return Err(CoreError::serialization_conflict(key.to_string()));
        }

        if writes.is_empty() {
            self.stats.record_transaction_commit();
            return Ok(SequenceNumber::new(tables.committed_seq));
        }

        let seq = SequenceNumber::new(tables.committed_seq).next();
        let raw = seq.as_u64();
        let write_count = writes.len();

        for (id, record) in writes.client_groups {
            tables.versions.insert(ReadKey::ClientGroup(id.clone()), raw);
            tables.client_groups.insert(id, record);
        }
        for (id, record) in writes.clients {
            let scope = ScanScope::ClientsOf(record.client_group_id.clone());
            tables.stamp(ReadKey::Client(id.clone()), scope, raw);
            tables.clients.insert(id, record);
        }
        for (id, cvr) in writes.cvrs {
            match cvr {
                Some(cvr) => {
                    let scope = ScanScope::CvrsOf(cvr.client_group_id.clone());
                    tables.stamp(ReadKey::Cvr(id), scope, raw);
                    tables.cvrs.insert(id, cvr);
                }
                None => {
                    if let Some(old) = tables.cvrs.remove(&id) {
                        let scope = ScanScope::CvrsOf(old.client_group_id);
                        tables.stamp(ReadKey::Cvr(id), scope, raw);
                    }
                }
            }
        }
        for ((table, owner, id), row) in writes.rows {
            let key = ReadKey::Row(table.clone(), owner.clone(), id.clone());
            let scope = ScanScope::RowsOf(table.clone(), owner.clone());
            tables.stamp(key, scope, raw);
            let rows = tables.rows.entry((table, owner)).or_default();
            match row {
                Some(row) => {
                    rows.insert(
                        id,
                        StoredRow {
                            row,
                            version: seq.version_token(),
                        },
                    );
                }
                None => {
                    rows.remove(&id);
                }
            }
        }

        tables.committed_seq = raw;
        self.stats.record_transaction_commit();
        tracing::debug!(%seq, writes = write_count, "transaction committed");
        Ok(seq)
    }
}
