use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use strand_collection::Entry;
use strand_crypto::{Signer, VerifyingKey};
use strand_diff::Collection;
use strand_store::Blockstore;
use strand_types::{Cid, CidSet, Identity, Tid};
use tracing::{debug, info};

use crate::blocks::{Commit, RepoRoot};
use crate::config::RepoConfig;
use crate::error::{RepoError, RepoResult};
use crate::namespace::Namespace;

/// A signed chain of commits owned by one identity.
///
/// Every mutation produces a new commit whose root records the blocks it
/// introduced. Mutations require a signer; a repo loaded without one is
/// read-only. A failed mutation leaves the repo at its previous commit.
///
/// Namespaces touched by a mutation or by [`Repo::load_or_create_namespace`]
/// stay cached as live handles until the head is replaced by an import.
pub struct Repo {
    pub(crate) store: Blockstore,
    pub(crate) config: RepoConfig,
    pub(crate) cid: Cid,
    pub(crate) root: RepoRoot,
    pub(crate) handles: BTreeMap<String, Namespace>,
    pub(crate) signer: Option<Arc<dyn Signer>>,
}

impl Repo {
    /// Create a repo with an empty genesis commit.
    pub async fn create(
        store: &Blockstore,
        did: Identity,
        signer: Arc<dyn Signer>,
        config: RepoConfig,
    ) -> RepoResult<Self> {
        config.validate()?;
        let root = RepoRoot {
            did,
            prev: None,
            new_cids: Vec::new(),
            namespaces: BTreeMap::new(),
        };
        let cid = write_commit(store, signer.as_ref(), &root).await?;
        info!(commit = %cid.short_hex(), did = %root.did, "created repo");
        Ok(Self {
            store: store.clone(),
            config,
            cid,
            root,
            handles: BTreeMap::new(),
            signer: Some(signer),
        })
    }

    /// Load the repo whose head commit is `cid`.
    pub async fn load(
        store: &Blockstore,
        cid: Cid,
        signer: Option<Arc<dyn Signer>>,
        config: RepoConfig,
    ) -> RepoResult<Self> {
        config.validate()?;
        let commit: Commit = store.get(&cid).await?;
        let root: RepoRoot = store.get(&commit.root).await?;
        debug!(commit = %cid.short_hex(), namespaces = root.namespaces.len(), "loaded repo");
        Ok(Self {
            store: store.clone(),
            config,
            cid,
            root,
            handles: BTreeMap::new(),
            signer,
        })
    }

    // ---------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------

    /// Address of the head commit.
    pub fn cid(&self) -> Cid {
        self.cid
    }

    pub fn did(&self) -> &Identity {
        &self.root.did
    }

    pub fn root(&self) -> &RepoRoot {
        &self.root
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    pub fn store(&self) -> &Blockstore {
        &self.store
    }

    pub fn is_read_only(&self) -> bool {
        self.signer.is_none()
    }

    pub fn namespace_names(&self) -> Vec<String> {
        self.root.namespaces.keys().cloned().collect()
    }

    pub async fn get_commit(&self) -> RepoResult<Commit> {
        Ok(self.store.get(&self.cid).await?)
    }

    pub async fn get_root(&self) -> RepoResult<RepoRoot> {
        let commit = self.get_commit().await?;
        Ok(self.store.get(&commit.root).await?)
    }

    /// Check the head commit's signature against `key`.
    pub async fn verify_commit_signature(&self, key: &VerifyingKey) -> RepoResult<()> {
        let commit = self.get_commit().await?;
        key.verify(commit.root.as_bytes(), &commit.sig)?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Namespaces
    // ---------------------------------------------------------------

    /// The named namespace: the live handle if cached, else loaded from its block.
    async fn namespace(&self, name: &str) -> RepoResult<Option<Cow<'_, Namespace>>> {
        if let Some(ns) = self.handles.get(name) {
            return Ok(Some(Cow::Borrowed(ns)));
        }
        match self.root.namespaces.get(name) {
            Some(cid) => Ok(Some(Cow::Owned(
                Namespace::load(&self.store, *cid, self.config.shard).await?,
            ))),
            None => Ok(None),
        }
    }

    async fn require_namespace(&self, name: &str) -> RepoResult<Cow<'_, Namespace>> {
        self.namespace(name)
            .await?
            .ok_or_else(|| RepoError::NotFound(format!("namespace {name}")))
    }

    pub async fn get_namespace(&self, name: &str) -> RepoResult<Option<Namespace>> {
        Ok(self.namespace(name).await?.map(Cow::into_owned))
    }

    /// Create an empty namespace and cache it as a live handle.
    ///
    /// Nothing is committed; the namespace enters the root with the first
    /// mutation made in it.
    pub async fn create_namespace(&mut self, name: &str) -> RepoResult<&Namespace> {
        if self.root.namespaces.contains_key(name) || self.handles.contains_key(name) {
            return Err(RepoError::AlreadyExists(format!("namespace {name}")));
        }
        let ns = self.new_namespace(name).await?;
        debug!(namespace = name, cid = %ns.cid().short_hex(), "created namespace");
        let ns: &Namespace = self.handles.entry(name.to_string()).or_insert(ns);
        Ok(ns)
    }

    /// The named namespace, loaded or created in memory if not cached.
    pub async fn load_or_create_namespace(&mut self, name: &str) -> RepoResult<&Namespace> {
        if !self.handles.contains_key(name) {
            let existing = self.root.namespaces.get(name).copied();
            match existing {
                Some(cid) => {
                    let ns = Namespace::load(&self.store, cid, self.config.shard).await?;
                    self.handles.insert(name.to_string(), ns);
                }
                None => {
                    self.create_namespace(name).await?;
                }
            }
        }
        self.handles
            .get(name)
            .ok_or_else(|| RepoError::NotFound(format!("namespace {name}")))
    }

    async fn new_namespace(&self, name: &str) -> RepoResult<Namespace> {
        if name.is_empty() {
            return Err(RepoError::Structural("namespace name must not be empty".into()));
        }
        Namespace::create(&self.store, self.config.shard).await
    }

    // ---------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------

    /// Add an entry, creating the namespace if needed. Returns the new commit.
    pub async fn add_entry(
        &mut self,
        namespace: &str,
        collection: Collection,
        tid: Tid,
        cid: Cid,
    ) -> RepoResult<Cid> {
        self.require_signer()?;
        let mut ns = match self.namespace(namespace).await? {
            Some(ns) => ns.into_owned(),
            None => self.new_namespace(namespace).await?,
        };
        let structure = self.uncommitted_structure(namespace, &ns);
        let update = ns.add_entry(collection, tid, cid).await?;
        self.update_root_for_namespace(namespace, ns, structure.add_set(update.touched))
            .await
    }

    pub async fn edit_entry(
        &mut self,
        namespace: &str,
        collection: Collection,
        tid: Tid,
        cid: Cid,
    ) -> RepoResult<Cid> {
        self.require_signer()?;
        let mut ns = self.require_namespace(namespace).await?.into_owned();
        let update = ns.edit_entry(collection, tid, cid).await?;
        self.update_root_for_namespace(namespace, ns, update.touched)
            .await
    }

    pub async fn delete_entry(
        &mut self,
        namespace: &str,
        collection: Collection,
        tid: Tid,
    ) -> RepoResult<Cid> {
        self.require_signer()?;
        let mut ns = self.require_namespace(namespace).await?.into_owned();
        let update = ns.delete_entry(collection, tid).await?;
        self.update_root_for_namespace(namespace, ns, update.touched)
            .await
    }

    /// Collection roots of a namespace the root does not name yet.
    ///
    /// Taken before the first mutation, so the commit that adds the
    /// namespace reports the collection it left empty as well.
    fn uncommitted_structure(&self, name: &str, ns: &Namespace) -> CidSet {
        if self.root.namespaces.contains_key(name) {
            return CidSet::new();
        }
        Collection::ALL
            .into_iter()
            .map(|c| ns.collection(c).cid())
            .collect()
    }

    /// Commit `ns` under `name` and keep it as the live handle.
    async fn update_root_for_namespace(
        &mut self,
        name: &str,
        ns: Namespace,
        new_cids: CidSet,
    ) -> RepoResult<Cid> {
        let mut namespaces = self.root.namespaces.clone();
        namespaces.insert(name.to_string(), ns.cid());
        let cid = self.commit(namespaces, new_cids).await?;
        self.handles.insert(name.to_string(), ns);
        Ok(cid)
    }

    /// Write a commit that keeps every namespace and reports `new_cids`.
    pub async fn update_root(&mut self, new_cids: CidSet) -> RepoResult<Cid> {
        let namespaces = self.root.namespaces.clone();
        self.commit(namespaces, new_cids).await
    }

    async fn commit(
        &mut self,
        namespaces: BTreeMap<String, Cid>,
        new_cids: CidSet,
    ) -> RepoResult<Cid> {
        let signer = self.require_signer()?;
        let root = RepoRoot {
            did: self.root.did.clone(),
            prev: Some(self.cid),
            new_cids: new_cids.to_list(),
            namespaces,
        };
        let cid = write_commit(&self.store, signer.as_ref(), &root).await?;
        info!(
            commit = %cid.short_hex(),
            prev = %self.cid.short_hex(),
            new_cids = root.new_cids.len(),
            "committed"
        );
        self.cid = cid;
        self.root = root;
        Ok(cid)
    }

    fn require_signer(&self) -> RepoResult<Arc<dyn Signer>> {
        self.signer.clone().ok_or(RepoError::ReadOnly)
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    pub async fn get_entry(
        &self,
        namespace: &str,
        collection: Collection,
        tid: &Tid,
    ) -> RepoResult<Option<Cid>> {
        let ns = self.require_namespace(namespace).await?;
        ns.get_entry(collection, tid).await
    }

    /// Up to `count` entries, newest first, strictly older than `from`.
    pub async fn get_entries(
        &self,
        namespace: &str,
        collection: Collection,
        count: usize,
        from: Option<Tid>,
    ) -> RepoResult<Vec<Entry>> {
        let ns = self.require_namespace(namespace).await?;
        ns.get_entries(collection, count, from).await
    }

    pub async fn get_all_entries(
        &self,
        namespace: &str,
        collection: Collection,
    ) -> RepoResult<Vec<Entry>> {
        let ns = self.require_namespace(namespace).await?;
        ns.get_all_entries(collection).await
    }

    /// Store a record block. Records are not part of any commit until an
    /// entry points at them.
    pub async fn put_record<T: Serialize + ?Sized + Sync>(&self, record: &T) -> RepoResult<Cid> {
        Ok(self.store.put(record).await?)
    }

    pub async fn get_record<T: DeserializeOwned>(&self, cid: &Cid) -> RepoResult<T> {
        Ok(self.store.get(cid).await?)
    }

    /// Blocks reachable from the head's namespaces that the store lacks.
    pub async fn missing_cids(&self) -> RepoResult<CidSet> {
        let per_ns = try_join_all(
            self.root
                .namespaces
                .values()
                .map(|cid| Namespace::missing_cids_at(&self.store, *cid, self.config.shard)),
        )
        .await?;
        Ok(per_ns
            .into_iter()
            .fold(CidSet::new(), |acc, set| acc.add_set(set)))
    }
}

/// Sign `root` and persist it with its commit, returning the commit address.
async fn write_commit(store: &Blockstore, signer: &dyn Signer, root: &RepoRoot) -> RepoResult<Cid> {
    let root_cid = store.put(root).await?;
    let commit = Commit {
        root: root_cid,
        sig: signer.sign(root_cid.as_bytes()),
    };
    Ok(store.put(&commit).await?)
}

impl std::fmt::Debug for Repo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repo")
            .field("cid", &self.cid.short_hex())
            .field("did", &self.root.did)
            .field("namespaces", &self.root.namespaces.len())
            .field("read_only", &self.signer.is_none())
            .finish()
    }
}
