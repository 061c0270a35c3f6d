//! A named sub-tree holding two time-ordered collections.

use strand_archive::ArchiveWriter;
use strand_collection::{CollectionUpdate, Entry, ShardConfig, TidCollection};
use strand_diff::{Collection, Event};
use strand_store::Blockstore;
use strand_types::{Cid, CidSet, Tid};
use tracing::debug;

use crate::blocks::NamespaceBlock;
use crate::error::RepoResult;

/// Result of a namespace mutation.
#[derive(Clone, Debug)]
pub struct NamespaceUpdate {
    /// Blocks written by the mutation, including the new namespace block.
    pub touched: CidSet,
    /// Address of the new namespace block.
    pub root: Cid,
}

#[derive(Clone)]
pub struct Namespace {
    store: Blockstore,
    config: ShardConfig,
    cid: Cid,
    posts: TidCollection,
    interactions: TidCollection,
}

impl Namespace {
    /// Create a namespace with two empty collections and persist it.
    pub async fn create(store: &Blockstore, config: ShardConfig) -> RepoResult<Self> {
        let posts = TidCollection::create(store, config).await?;
        let interactions = TidCollection::create(store, config).await?;
        let cid = store
            .put(&NamespaceBlock {
                posts: posts.cid(),
                interactions: interactions.cid(),
            })
            .await?;
        Ok(Self {
            store: store.clone(),
            config,
            cid,
            posts,
            interactions,
        })
    }

    pub async fn load(store: &Blockstore, cid: Cid, config: ShardConfig) -> RepoResult<Self> {
        let block: NamespaceBlock = store.get(&cid).await?;
        let (posts, interactions) = futures::try_join!(
            TidCollection::load(store, block.posts, config),
            TidCollection::load(store, block.interactions, config),
        )?;
        Ok(Self {
            store: store.clone(),
            config,
            cid,
            posts,
            interactions,
        })
    }

    pub fn cid(&self) -> Cid {
        self.cid
    }

    pub fn collection(&self, collection: Collection) -> &TidCollection {
        match collection {
            Collection::Posts => &self.posts,
            Collection::Interactions => &self.interactions,
        }
    }

    fn collection_mut(&mut self, collection: Collection) -> &mut TidCollection {
        match collection {
            Collection::Posts => &mut self.posts,
            Collection::Interactions => &mut self.interactions,
        }
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    pub async fn get_entry(&self, collection: Collection, tid: &Tid) -> RepoResult<Option<Cid>> {
        Ok(self.collection(collection).get_entry(tid).await?)
    }

    pub async fn get_entries(
        &self,
        collection: Collection,
        count: usize,
        from: Option<Tid>,
    ) -> RepoResult<Vec<Entry>> {
        Ok(self.collection(collection).get_entries(count, from).await?)
    }

    pub async fn get_all_entries(&self, collection: Collection) -> RepoResult<Vec<Entry>> {
        Ok(self.collection(collection).get_all_entries().await?)
    }

    // ---------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------

    pub async fn add_entry(
        &mut self,
        collection: Collection,
        tid: Tid,
        cid: Cid,
    ) -> RepoResult<NamespaceUpdate> {
        let update = self.collection_mut(collection).add_entry(tid, cid).await?;
        self.rewrite(collection, update).await
    }

    pub async fn edit_entry(
        &mut self,
        collection: Collection,
        tid: Tid,
        cid: Cid,
    ) -> RepoResult<NamespaceUpdate> {
        let update = self.collection_mut(collection).edit_entry(tid, cid).await?;
        self.rewrite(collection, update).await
    }

    pub async fn delete_entry(
        &mut self,
        collection: Collection,
        tid: Tid,
    ) -> RepoResult<NamespaceUpdate> {
        let update = self.collection_mut(collection).delete_entry(tid).await?;
        self.rewrite(collection, update).await
    }

    async fn rewrite(
        &mut self,
        collection: Collection,
        update: CollectionUpdate,
    ) -> RepoResult<NamespaceUpdate> {
        let root = self
            .store
            .put(&NamespaceBlock {
                posts: self.posts.cid(),
                interactions: self.interactions.cid(),
            })
            .await?;
        self.cid = root;
        debug!(
            %collection,
            tid = %update.tid,
            namespace = %root.short_hex(),
            touched = update.touched.len() + 1,
            "rewrote namespace"
        );
        Ok(NamespaceUpdate {
            touched: update.touched.add(root),
            root,
        })
    }

    // ---------------------------------------------------------------
    // Sync
    // ---------------------------------------------------------------

    /// Blocks reachable from the namespace at `cid` that the store lacks.
    ///
    /// Works on partially present data: an absent namespace block or
    /// collection map is itself reported and not descended into.
    pub async fn missing_cids_at(
        store: &Blockstore,
        cid: Cid,
        config: ShardConfig,
    ) -> RepoResult<CidSet> {
        if !store.has(&cid).await? {
            return Ok(CidSet::new().add(cid));
        }
        let block: NamespaceBlock = store.get(&cid).await?;
        let mut missing = CidSet::new();
        for map in [block.posts, block.interactions] {
            if store.has(&map).await? {
                let coll = TidCollection::load(store, map, config).await?;
                missing = missing.add_set(coll.missing_cids().await?);
            } else {
                missing.add_mut(map);
            }
        }
        Ok(missing)
    }

    pub async fn missing_cids(&self) -> RepoResult<CidSet> {
        Self::missing_cids_at(&self.store, self.cid, self.config).await
    }

    /// Write every block reachable from this namespace.
    pub async fn write_to_archive(&self, writer: &mut ArchiveWriter) -> RepoResult<()> {
        self.posts.write_to_archive(writer).await?;
        self.interactions.write_to_archive(writer).await?;
        self.store.add_to_archive(writer, &self.cid).await?;
        Ok(())
    }

    /// Events turning `prev` into `self`, posts first.
    pub async fn verify_update(
        &self,
        prev: &Namespace,
        new_cids: &CidSet,
        name: &str,
    ) -> RepoResult<Vec<Event>> {
        let mut events = Vec::new();
        for collection in Collection::ALL {
            let (curr, old) = (self.collection(collection), prev.collection(collection));
            if curr.cid() != old.cid() {
                events.extend(
                    curr.verify_update(old, new_cids, name, collection)
                        .await?,
                );
            }
        }
        Ok(events)
    }
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("cid", &self.cid.short_hex())
            .field("posts", &self.posts.cid().short_hex())
            .field("interactions", &self.interactions.cid().short_hex())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(n: u64) -> Tid {
        Tid::new(n, 0)
    }

    async fn record(store: &Blockstore, text: &str) -> Cid {
        store.put(&text.to_string()).await.unwrap()
    }

    #[tokio::test]
    async fn collections_are_independent() {
        let store = Blockstore::memory();
        let mut ns = Namespace::create(&store, ShardConfig::default()).await.unwrap();
        let post = record(&store, "post").await;
        let like = record(&store, "like").await;

        ns.add_entry(Collection::Posts, tid(1), post).await.unwrap();
        ns.add_entry(Collection::Interactions, tid(1), like).await.unwrap();

        assert_eq!(ns.get_entry(Collection::Posts, &tid(1)).await.unwrap(), Some(post));
        assert_eq!(
            ns.get_entry(Collection::Interactions, &tid(1)).await.unwrap(),
            Some(like)
        );
    }

    #[tokio::test]
    async fn update_reports_new_namespace_block() {
        let store = Blockstore::memory();
        let mut ns = Namespace::create(&store, ShardConfig::default()).await.unwrap();
        let before = ns.cid();
        let post = record(&store, "post").await;

        let update = ns.add_entry(Collection::Posts, tid(1), post).await.unwrap();
        assert_ne!(update.root, before);
        assert_eq!(update.root, ns.cid());
        assert!(update.touched.contains(&update.root));
        assert!(update.touched.contains(&post));
        assert!(update.touched.contains(&ns.collection(Collection::Posts).cid()));

        let loaded = Namespace::load(&store, ns.cid(), ShardConfig::default())
            .await
            .unwrap();
        assert_eq!(
            loaded.get_entry(Collection::Posts, &tid(1)).await.unwrap(),
            Some(post)
        );
    }

    #[tokio::test]
    async fn missing_namespace_block_is_reported() {
        let store = Blockstore::memory();
        let cid = Cid::from_hash([4; 32]);
        let missing = Namespace::missing_cids_at(&store, cid, ShardConfig::default())
            .await
            .unwrap();
        assert_eq!(missing.to_list(), vec![cid]);
    }

    #[tokio::test]
    async fn missing_collection_map_is_reported() {
        let store = Blockstore::memory();
        let posts = Cid::from_hash([5; 32]);
        let interactions = Cid::from_hash([6; 32]);
        let cid = store
            .put(&NamespaceBlock { posts, interactions })
            .await
            .unwrap();
        let missing = Namespace::missing_cids_at(&store, cid, ShardConfig::default())
            .await
            .unwrap();
        assert_eq!(missing.len(), 2);
        assert!(missing.contains(&posts) && missing.contains(&interactions));
    }

    #[tokio::test]
    async fn complete_namespace_has_nothing_missing() {
        let store = Blockstore::memory();
        let mut ns = Namespace::create(&store, ShardConfig::default()).await.unwrap();
        let post = record(&store, "post").await;
        ns.add_entry(Collection::Posts, tid(1), post).await.unwrap();
        assert!(ns.missing_cids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn verify_update_orders_posts_before_interactions() {
        let store = Blockstore::memory();
        let prev = Namespace::create(&store, ShardConfig::default()).await.unwrap();
        let mut ns = prev.clone();
        let mut new_cids = CidSet::new();

        let like = record(&store, "like").await;
        new_cids = new_cids.add_set(
            ns.add_entry(Collection::Interactions, tid(2), like)
                .await
                .unwrap()
                .touched,
        );
        let post = record(&store, "post").await;
        new_cids = new_cids.add_set(
            ns.add_entry(Collection::Posts, tid(1), post).await.unwrap().touched,
        );

        let events = ns.verify_update(&prev, &new_cids, "social").await.unwrap();
        assert_eq!(
            events,
            vec![
                Event::AddedObject {
                    namespace: "social".into(),
                    collection: Collection::Posts,
                    tid: tid(1),
                    cid: post,
                },
                Event::AddedObject {
                    namespace: "social".into(),
                    collection: Collection::Interactions,
                    tid: tid(2),
                    cid: like,
                },
            ]
        );
    }
}
