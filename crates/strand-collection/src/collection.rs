//! Sharded, time-ordered collection keyed by each shard's oldest identifier.

use std::collections::BTreeMap;

use futures::future::try_join_all;
use strand_archive::ArchiveWriter;
use strand_diff::{tid_entries_diff, Collection, Event};
use strand_store::Blockstore;
use strand_types::{Cid, CidSet, Tid};
use tracing::debug;

use crate::config::ShardConfig;
use crate::error::{CollectionError, CollectionResult};
use crate::table::{Entry, ShardTable};

/// Result of one collection mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionUpdate {
    /// The identifier the mutation targeted.
    pub tid: Tid,
    /// Every block the mutation introduced, including `root`.
    pub touched: CidSet,
    /// Address of the newly persisted shard map.
    pub root: Cid,
}

/// An ordered `Tid -> Cid` map partitioned into shard tables.
///
/// The shard map keys each table by the oldest identifier it holds. The
/// table owning an identifier is the one with the greatest key not newer
/// than it. New entries only ever go to the newest shard.
///
/// Mutations build the next shard map on a working copy and only install
/// it once everything is persisted, so a failed mutation leaves the
/// collection as it was.
#[derive(Clone)]
pub struct TidCollection {
    store: Blockstore,
    config: ShardConfig,
    cid: Cid,
    data: BTreeMap<Tid, Cid>,
}

impl std::fmt::Debug for TidCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TidCollection")
            .field("cid", &self.cid)
            .field("tables", &self.data.len())
            .finish()
    }
}

impl TidCollection {
    /// Create and persist an empty collection.
    pub async fn create(store: &Blockstore, config: ShardConfig) -> CollectionResult<Self> {
        let data = BTreeMap::new();
        let cid = store.put(&data).await?;
        Ok(Self {
            store: store.clone(),
            config,
            cid,
            data,
        })
    }

    pub async fn load(store: &Blockstore, cid: Cid, config: ShardConfig) -> CollectionResult<Self> {
        let data: BTreeMap<Tid, Cid> = store.get(&cid).await?;
        Ok(Self {
            store: store.clone(),
            config,
            cid,
            data,
        })
    }

    /// Address of the current shard map.
    pub fn cid(&self) -> Cid {
        self.cid
    }

    // ---------------------------------------------------------------
    // Shard lookup
    // ---------------------------------------------------------------

    /// Shard keys, newest-first unless `oldest_first`.
    pub fn table_names(&self, oldest_first: bool) -> Vec<Tid> {
        if oldest_first {
            self.data.keys().copied().collect()
        } else {
            self.data.keys().rev().copied().collect()
        }
    }

    pub fn table_count(&self) -> usize {
        self.data.len()
    }

    /// Shard table addresses, newest shard first.
    pub fn shallow_cids(&self) -> Vec<Cid> {
        self.data.values().rev().copied().collect()
    }

    /// Key of the shard that owns `tid`: the newest key not newer than it.
    pub fn get_table_name_for_tid(&self, tid: &Tid) -> Option<Tid> {
        self.data.range(..=*tid).next_back().map(|(name, _)| *name)
    }

    pub async fn get_table(&self, name: &Tid) -> CollectionResult<Option<ShardTable>> {
        match self.data.get(name) {
            Some(cid) => Ok(Some(self.load_table(*cid).await?)),
            None => Ok(None),
        }
    }

    async fn load_table(&self, cid: Cid) -> CollectionResult<ShardTable> {
        ShardTable::load(&self.store, cid, self.config).await
    }

    async fn get_table_for_tid(&self, tid: &Tid) -> CollectionResult<Option<(Tid, ShardTable)>> {
        let Some(name) = self.get_table_name_for_tid(tid) else {
            return Ok(None);
        };
        Ok(self.get_table(&name).await?.map(|table| (name, table)))
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    pub async fn get_entry(&self, tid: &Tid) -> CollectionResult<Option<Cid>> {
        Ok(self
            .get_table_for_tid(tid)
            .await?
            .and_then(|(_, table)| table.get_entry(tid)))
    }

    /// Up to `count` entries newest-first, strictly older than `from` if given.
    ///
    /// Passing the last identifier of one page as `from` yields the next
    /// page with no gaps or repeats.
    pub async fn get_entries(&self, count: usize, from: Option<Tid>) -> CollectionResult<Vec<Entry>> {
        let names = self.table_names(false);
        let start = match from {
            Some(from) => match names.iter().position(|n| !from.older_than(n)) {
                Some(index) => index,
                None => return Ok(Vec::new()),
            },
            None => 0,
        };

        let mut entries = Vec::new();
        for (i, name) in names.iter().enumerate().skip(start) {
            if entries.len() >= count {
                break;
            }
            let cid = self.data[name];
            let table = self.load_table(cid).await?;
            let remaining = count - entries.len();
            match from {
                Some(from) if i == start => entries.extend(
                    table
                        .entries()
                        .filter(|e| e.tid.older_than(&from))
                        .take(remaining),
                ),
                _ => entries.extend(table.entries().take(remaining)),
            }
        }
        Ok(entries)
    }

    pub async fn get_all_entries(&self) -> CollectionResult<Vec<Entry>> {
        self.get_entries(usize::MAX, None).await
    }

    // ---------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------

    /// Append an entry to the newest shard.
    ///
    /// Rejected if `tid` is older than the newest shard's floor. When the
    /// newest shard is full the entry opens a new shard, so it must also be
    /// newer than every entry already in the collection.
    pub async fn add_entry(&mut self, tid: Tid, cid: Cid) -> CollectionResult<CollectionUpdate> {
        let current = match self.data.iter().next_back() {
            Some((name, table_cid)) => Some((*name, self.load_table(*table_cid).await?)),
            None => None,
        };

        if let Some((_, table)) = &current {
            if let Some(floor) = table.oldest_tid() {
                if tid.older_than(&floor) {
                    return Err(CollectionError::Monotonicity { tid, bound: floor });
                }
            }
            if table.is_full() {
                if let Some(newest) = table.newest_tid() {
                    if !tid.newer_than(&newest) {
                        return Err(CollectionError::Monotonicity { tid, bound: newest });
                    }
                }
            }
        }

        let mut data = self.data.clone();
        let mut touched = CidSet::new();
        let (old_name, mut table) = match current {
            Some((name, table)) if table.is_full() => {
                touched = touched.add_set(self.compress_tables(&mut data, name, table).await?);
                (None, ShardTable::create(&self.store, self.config).await?)
            }
            Some((name, table)) => (Some(name), table),
            None => (None, ShardTable::create(&self.store, self.config).await?),
        };

        table.add_entry(tid, cid).await?;
        if let Some(name) = old_name {
            data.remove(&name);
        }
        let floor = table.oldest_tid().unwrap_or(tid);
        data.insert(floor, table.cid());

        debug!(
            %tid,
            entry = %cid.short_hex(),
            table = %table.cid().short_hex(),
            tables = data.len(),
            "added collection entry"
        );
        self.commit(tid, data, touched.add(cid).add(table.cid())).await
    }

    pub async fn edit_entry(&mut self, tid: Tid, cid: Cid) -> CollectionResult<CollectionUpdate> {
        let (name, mut table) = self
            .get_table_for_tid(&tid)
            .await?
            .ok_or(CollectionError::NotFound(tid))?;
        table.edit_entry(tid, cid).await?;

        let mut data = self.data.clone();
        data.insert(name, table.cid());
        debug!(%tid, entry = %cid.short_hex(), "edited collection entry");
        self.commit(tid, data, CidSet::new().add(cid).add(table.cid()))
            .await
    }

    pub async fn delete_entry(&mut self, tid: Tid) -> CollectionResult<CollectionUpdate> {
        let (name, mut table) = self
            .get_table_for_tid(&tid)
            .await?
            .ok_or(CollectionError::NotFound(tid))?;
        table.delete_entry(tid).await?;

        let mut data = self.data.clone();
        let mut touched = CidSet::new();
        data.remove(&name);
        if let Some(floor) = table.oldest_tid() {
            data.insert(floor, table.cid());
            touched.add_mut(table.cid());
        }
        debug!(%tid, tables = data.len(), "deleted collection entry");
        self.commit(tid, data, touched).await
    }

    /// Persist `data` as the new shard map and install it.
    async fn commit(
        &mut self,
        tid: Tid,
        data: BTreeMap<Tid, Cid>,
        touched: CidSet,
    ) -> CollectionResult<CollectionUpdate> {
        let root = self.store.put(&data).await?;
        self.data = data;
        self.cid = root;
        Ok(CollectionUpdate {
            tid,
            touched: touched.add(root),
            root,
        })
    }

    /// Run the compaction cascade from the newest shard down.
    ///
    /// Shard keys newest-first act as a base-4 counter: while the carry and
    /// the next three shards share a size class below `xl`, the four fold
    /// into one table of the next class, which becomes the carry. Returns
    /// the addresses of merged tables.
    async fn compress_tables(
        &self,
        data: &mut BTreeMap<Tid, Cid>,
        top: Tid,
        newest: ShardTable,
    ) -> CollectionResult<CidSet> {
        let older: Vec<Tid> = data.range(..top).rev().map(|(name, _)| *name).collect();
        let mut carry = newest;
        let mut merged_any = false;
        let mut touched = CidSet::new();

        for keys in older.chunks(3) {
            if keys.len() < 3 || carry.size().next().is_none() {
                break;
            }
            let tables = try_join_all(keys.iter().map(|k| self.load_table(data[k]))).await?;
            if tables.iter().any(|t| t.size() != carry.size()) {
                break;
            }
            for k in keys {
                data.remove(k);
            }
            let mut group = Vec::with_capacity(4);
            group.push(carry);
            group.extend(tables);
            carry = ShardTable::merge(group).await?;
            touched.add_mut(carry.cid());
            merged_any = true;
            debug!(
                table = %carry.cid().short_hex(),
                size = %carry.size(),
                "compacted shards"
            );
        }

        if merged_any {
            data.remove(&top);
            let floor = carry.oldest_tid().unwrap_or(top);
            data.insert(floor, carry.cid());
        }
        Ok(touched)
    }

    // ---------------------------------------------------------------
    // Sync support
    // ---------------------------------------------------------------

    /// Blocks this collection references that the store lacks.
    ///
    /// An absent shard table is reported itself; its contents are unknown.
    pub async fn missing_cids(&self) -> CollectionResult<CidSet> {
        let per_shard = try_join_all(self.data.values().map(|cid| async move {
            if self.store.has(cid).await? {
                self.load_table(*cid).await?.missing_cids().await
            } else {
                Ok::<_, CollectionError>(CidSet::new().add(*cid))
            }
        }))
        .await?;
        Ok(per_shard
            .into_iter()
            .fold(CidSet::new(), |acc, set| acc.add_set(set)))
    }

    /// Every shard table address and every entry address.
    pub async fn cids(&self) -> CollectionResult<CidSet> {
        let tables = self.load_all_tables().await?;
        let mut all = CidSet::new();
        for table in tables {
            all.add_mut(table.cid());
            all.extend(table.cids().iter().copied());
        }
        Ok(all)
    }

    /// Stream every shard table, every entry block and the shard map.
    pub async fn write_to_archive(&self, writer: &mut ArchiveWriter) -> CollectionResult<()> {
        for table in self.load_all_tables().await? {
            table.write_to_archive(writer).await?;
        }
        self.store.add_to_archive(writer, &self.cid).await?;
        Ok(())
    }

    async fn load_all_tables(&self) -> CollectionResult<Vec<ShardTable>> {
        try_join_all(self.shallow_cids().into_iter().map(|cid| self.load_table(cid))).await
    }

    // ---------------------------------------------------------------
    // Verification
    // ---------------------------------------------------------------

    /// Entry-level events between `prev` and this collection.
    ///
    /// Compares entries by identity, so reshuffling shards without changing
    /// entries yields no events.
    pub async fn verify_update(
        &self,
        prev: &TidCollection,
        new_cids: &CidSet,
        namespace: &str,
        collection: Collection,
    ) -> CollectionResult<Vec<Event>> {
        let (curr_entries, prev_entries) =
            futures::try_join!(self.get_all_entries(), prev.get_all_entries())?;
        let diff = tid_entries_diff(
            prev_entries.into_iter().map(|e| (e.tid, e.cid)),
            curr_entries.into_iter().map(|e| (e.tid, e.cid)),
            new_cids,
        )?;

        let mut events = Vec::with_capacity(diff.len());
        for del in diff.deletes {
            events.push(Event::DeletedObject {
                namespace: namespace.to_string(),
                collection,
                tid: del.key,
            });
        }
        for add in diff.adds {
            events.push(Event::AddedObject {
                namespace: namespace.to_string(),
                collection,
                tid: add.key,
                cid: add.cid,
            });
        }
        for update in diff.updates {
            events.push(Event::UpdatedObject {
                namespace: namespace.to_string(),
                collection,
                tid: update.key,
                prev: update.prev,
                cid: update.cid,
            });
        }
        Ok(events)
    }
}
