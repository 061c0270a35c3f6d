//! Bounded shard tables, grouped into size classes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strand_archive::ArchiveWriter;
use strand_store::Blockstore;
use strand_types::{Cid, CidSet, Tid};
use tracing::debug;

use crate::config::ShardConfig;
use crate::error::{CollectionError, CollectionResult};

/// Size class of a shard table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TableSize {
    #[serde(rename = "sm")]
    Sm,
    #[serde(rename = "md")]
    Md,
    #[serde(rename = "lg")]
    Lg,
    #[serde(rename = "xl")]
    Xl,
}

impl TableSize {
    /// The class a merge of four tables of this class produces.
    pub fn next(&self) -> Option<TableSize> {
        match self {
            TableSize::Sm => Some(TableSize::Md),
            TableSize::Md => Some(TableSize::Lg),
            TableSize::Lg => Some(TableSize::Xl),
            TableSize::Xl => None,
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            TableSize::Sm => 0,
            TableSize::Md => 1,
            TableSize::Lg => 2,
            TableSize::Xl => 3,
        }
    }
}

impl fmt::Display for TableSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TableSize::Sm => "sm",
            TableSize::Md => "md",
            TableSize::Lg => "lg",
            TableSize::Xl => "xl",
        };
        f.write_str(s)
    }
}

/// One collection entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub tid: Tid,
    pub cid: Cid,
}

/// Persisted form of a shard table. Entries are newest-first.
#[derive(Serialize, Deserialize)]
struct TableBlock {
    size: TableSize,
    entries: Vec<Entry>,
}

/// A bounded, size-classed table of `Tid -> Cid` entries.
///
/// Every mutation persists the new table state and updates [`cid`](Self::cid).
#[derive(Clone, Debug)]
pub struct ShardTable {
    store: Blockstore,
    config: ShardConfig,
    cid: Cid,
    size: TableSize,
    data: BTreeMap<Tid, Cid>,
}

impl ShardTable {
    /// Create and persist an empty `sm` table.
    pub async fn create(store: &Blockstore, config: ShardConfig) -> CollectionResult<Self> {
        Self::persisted(store.clone(), config, TableSize::Sm, BTreeMap::new()).await
    }

    pub async fn load(store: &Blockstore, cid: Cid, config: ShardConfig) -> CollectionResult<Self> {
        let block: TableBlock = store.get(&cid).await?;
        let data = block.entries.into_iter().map(|e| (e.tid, e.cid)).collect();
        Ok(Self {
            store: store.clone(),
            config,
            cid,
            size: block.size,
            data,
        })
    }

    async fn persisted(
        store: Blockstore,
        config: ShardConfig,
        size: TableSize,
        data: BTreeMap<Tid, Cid>,
    ) -> CollectionResult<Self> {
        let mut table = Self {
            store,
            config,
            cid: Cid::from_hash([0; 32]),
            size,
            data,
        };
        table.persist().await?;
        Ok(table)
    }

    async fn persist(&mut self) -> CollectionResult<()> {
        let block = TableBlock {
            size: self.size,
            entries: self.entries().collect(),
        };
        self.cid = self.store.put(&block).await?;
        Ok(())
    }

    pub fn cid(&self) -> Cid {
        self.cid
    }

    pub fn size(&self) -> TableSize {
        self.size
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity(self.size)
    }

    pub fn get_entry(&self, tid: &Tid) -> Option<Cid> {
        self.data.get(tid).copied()
    }

    /// Insert a new entry.
    ///
    /// Fails if the table is full, the identifier is already present, or it
    /// is older than the table's current oldest identifier.
    pub async fn add_entry(&mut self, tid: Tid, cid: Cid) -> CollectionResult<()> {
        if self.is_full() {
            return Err(CollectionError::TableFull { size: self.size });
        }
        if self.data.contains_key(&tid) {
            return Err(CollectionError::Duplicate(tid));
        }
        if let Some(oldest) = self.oldest_tid() {
            if tid.older_than(&oldest) {
                return Err(CollectionError::Monotonicity { tid, bound: oldest });
            }
        }
        self.data.insert(tid, cid);
        self.persist().await
    }

    pub async fn edit_entry(&mut self, tid: Tid, cid: Cid) -> CollectionResult<()> {
        let slot = self
            .data
            .get_mut(&tid)
            .ok_or(CollectionError::NotFound(tid))?;
        *slot = cid;
        self.persist().await
    }

    pub async fn delete_entry(&mut self, tid: Tid) -> CollectionResult<()> {
        self.data
            .remove(&tid)
            .ok_or(CollectionError::NotFound(tid))?;
        self.persist().await
    }

    /// Entries newest-first. Each call starts a fresh iteration.
    pub fn entries(&self) -> impl Iterator<Item = Entry> + '_ {
        self.data
            .iter()
            .rev()
            .map(|(tid, cid)| Entry { tid: *tid, cid: *cid })
    }

    pub fn oldest_tid(&self) -> Option<Tid> {
        self.data.keys().next().copied()
    }

    pub fn newest_tid(&self) -> Option<Tid> {
        self.data.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity()
    }

    /// Fold exactly four tables of one class into a table of the next class.
    ///
    /// The result holds the union of the inputs' entries, so its floor is
    /// the minimum of their floors.
    pub async fn merge(tables: Vec<ShardTable>) -> CollectionResult<ShardTable> {
        if tables.len() != 4 {
            return Err(CollectionError::InvalidMerge(format!(
                "expected 4 tables, got {}",
                tables.len()
            )));
        }
        let size = tables[0].size;
        if let Some(other) = tables.iter().find(|t| t.size != size) {
            return Err(CollectionError::InvalidMerge(format!(
                "mixed size classes {size} and {}",
                other.size
            )));
        }
        let next = size
            .next()
            .ok_or_else(|| CollectionError::InvalidMerge(format!("{size} tables do not merge")))?;

        let store = tables[0].store.clone();
        let config = tables[0].config;
        let mut data = BTreeMap::new();
        for table in tables {
            data.extend(table.data);
        }
        let merged = Self::persisted(store, config, next, data).await?;
        debug!(
            table = %merged.cid.short_hex(),
            size = %next,
            entries = merged.len(),
            "merged shard tables"
        );
        Ok(merged)
    }

    /// Addresses referenced by entries.
    pub fn cids(&self) -> CidSet {
        self.data.values().copied().collect()
    }

    /// Entry addresses not present in the backing store.
    pub async fn missing_cids(&self) -> CollectionResult<CidSet> {
        let cids: Vec<Cid> = self.cids().to_list();
        Ok(self.store.missing(&cids).await?.into_iter().collect())
    }

    /// Stream this table's block and every entry block.
    pub async fn write_to_archive(&self, writer: &mut ArchiveWriter) -> CollectionResult<()> {
        self.store.add_to_archive(writer, &self.cid).await?;
        let cids: Vec<Cid> = self.data.values().copied().collect();
        self.store.add_all_to_archive(writer, &cids).await?;
        Ok(())
    }
}
