//! Archive export and import.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::try_join_all;
use strand_archive::{Archive, ArchiveWriter};
use strand_crypto::{Signer, VerifyingKey};
use strand_diff::Event;
use strand_store::Blockstore;
use strand_types::Cid;
use tracing::{debug, info, warn};

use crate::blocks::{Commit, RepoRoot};
use crate::config::RepoConfig;
use crate::error::{RepoError, RepoResult};
use crate::namespace::Namespace;
use crate::repo::Repo;

impl Repo {
    // ---------------------------------------------------------------
    // Export
    // ---------------------------------------------------------------

    /// Every block needed to read the head state, without history.
    pub async fn export_snapshot(&self) -> RepoResult<Vec<u8>> {
        let mut writer = ArchiveWriter::new(vec![self.cid]);
        let commit = self.get_commit().await?;
        self.store.add_to_archive(&mut writer, &self.cid).await?;
        self.store.add_to_archive(&mut writer, &commit.root).await?;

        let namespaces = try_join_all(
            self.root
                .namespaces
                .values()
                .map(|cid| Namespace::load(&self.store, *cid, self.config.shard)),
        )
        .await?;
        for ns in &namespaces {
            ns.write_to_archive(&mut writer).await?;
        }
        debug!(commit = %self.cid.short_hex(), blocks = writer.len(), "exported snapshot");
        Ok(writer.finish())
    }

    /// The blocks introduced by every commit after `to`, up to the head.
    ///
    /// With `to = None` the walk runs to genesis. Exporting from the head
    /// itself yields an archive with no blocks. Fails with
    /// [`RepoError::Structural`] if `to` is not an ancestor of the head.
    pub async fn export_diff(&self, to: Option<Cid>) -> RepoResult<Vec<u8>> {
        let mut writer = ArchiveWriter::new(vec![self.cid]);
        let mut cursor = self.cid;
        let mut commits = 0usize;

        while Some(cursor) != to {
            let commit: Commit = self.store.get(&cursor).await?;
            let root: RepoRoot = self.store.get(&commit.root).await?;
            self.store.add_to_archive(&mut writer, &cursor).await?;
            self.store.add_to_archive(&mut writer, &commit.root).await?;
            self.store
                .add_all_to_archive(&mut writer, &root.new_cids)
                .await?;
            commits += 1;

            match (root.prev, to) {
                (Some(prev), _) => cursor = prev,
                (None, None) => break,
                (None, Some(to)) => {
                    return Err(RepoError::Structural(format!(
                        "could not find commit {}",
                        to.short_hex()
                    )))
                }
            }
        }

        debug!(
            commit = %self.cid.short_hex(),
            commits,
            blocks = writer.len(),
            "exported diff"
        );
        Ok(writer.finish())
    }

    /// Every commit back to genesis along with the blocks each introduced.
    pub async fn export_full_history(&self) -> RepoResult<Vec<u8>> {
        self.export_diff(None).await
    }

    // ---------------------------------------------------------------
    // Import
    // ---------------------------------------------------------------

    /// Open a repo from an archive, ingesting all of its blocks into `store`.
    pub async fn from_archive(
        store: &Blockstore,
        bytes: &[u8],
        signer: Option<Arc<dyn Signer>>,
        config: RepoConfig,
    ) -> RepoResult<Self> {
        let head = ingest(store, bytes, &config).await?;
        let repo = Repo::load(store, head, signer, config).await?;
        info!(commit = %head.short_hex(), did = %repo.did(), "opened repo from archive");
        Ok(repo)
    }

    /// Open a repo from a full-history archive, verifying every commit.
    ///
    /// The walk runs from the archive's head back to genesis. Each commit
    /// must be signed by the key behind the head's identity and each step
    /// must be a valid successor of the last. Returns the repo at the head
    /// with the change events from genesis on, in commit order.
    pub async fn from_verified_archive(
        store: &Blockstore,
        bytes: &[u8],
        signer: Option<Arc<dyn Signer>>,
        config: RepoConfig,
    ) -> RepoResult<(Self, Vec<Event>)> {
        config.validate()?;
        let head = ingest(store, bytes, &config).await?;
        let commit: Commit = store.get(&head).await?;
        let root: RepoRoot = store.get(&commit.root).await?;
        let key = VerifyingKey::from_identity(&root.did)?;

        let mut chain = signed_chain(store, head, None, &key).await?.into_iter();
        let view = |(cid, root): (Cid, RepoRoot)| Repo {
            store: store.clone(),
            config: config.clone(),
            cid,
            root,
            handles: BTreeMap::new(),
            signer: None,
        };
        let mut prev = match chain.next() {
            Some(genesis) => view(genesis),
            None => return Err(RepoError::Structural("archive holds no commits".into())),
        };
        let mut events = prev.verify_genesis().await?;
        for link in chain {
            let next = view(link);
            events.extend(next.verify_update(&prev).await?);
            prev = next;
        }

        info!(
            commit = %head.short_hex(),
            did = %prev.root.did,
            events = events.len(),
            "verified repo from archive"
        );
        prev.signer = signer;
        Ok((prev, events))
    }

    /// Ingest an archive and adopt its root as the head.
    ///
    /// The repo takes on the identity the archive's root names. No commit
    /// is checked beyond the archive's own integrity; use
    /// [`Repo::load_and_verify_diff`] for untrusted input.
    pub async fn import_archive(&mut self, bytes: &[u8]) -> RepoResult<Cid> {
        let head = ingest(&self.store, bytes, &self.config).await?;
        let commit: Commit = self.store.get(&head).await?;
        let root: RepoRoot = self.store.get(&commit.root).await?;
        info!(
            from = %self.cid.short_hex(),
            to = %head.short_hex(),
            did = %root.did,
            namespaces = root.namespaces.len(),
            "imported archive"
        );
        self.cid = head;
        self.root = root;
        self.handles.clear();
        Ok(head)
    }

    /// Ingest a diff archive, verify every commit it adds and adopt its head.
    ///
    /// The archive's head must descend from the current head. Each new
    /// commit must be signed by the key behind the repo's identity and must
    /// only point at blocks it reports. Returns the change events in commit
    /// order. On failure the head is unchanged.
    pub async fn load_and_verify_diff(&mut self, bytes: &[u8]) -> RepoResult<Vec<Event>> {
        let head = ingest(&self.store, bytes, &self.config).await?;
        let key = VerifyingKey::from_identity(&self.root.did)?;
        let chain = signed_chain(&self.store, head, Some(self.cid), &key).await?;

        let mut prev = self.read_only_view(self.cid, self.root.clone());
        let mut events = Vec::new();
        for (cid, root) in chain {
            let next = self.read_only_view(cid, root);
            events.extend(next.verify_update(&prev).await?);
            prev = next;
        }

        info!(
            from = %self.cid.short_hex(),
            to = %head.short_hex(),
            events = events.len(),
            "verified and applied diff"
        );
        self.cid = prev.cid;
        self.root = prev.root;
        self.handles.clear();
        Ok(events)
    }

    fn read_only_view(&self, cid: Cid, root: RepoRoot) -> Repo {
        Repo {
            store: self.store.clone(),
            config: self.config.clone(),
            cid,
            root,
            handles: BTreeMap::new(),
            signer: None,
        }
    }
}

/// Commits from `head` back to `base`, oldest first, each signature checked.
///
/// `base` itself is excluded. With no base the walk ends at genesis, which
/// is included.
async fn signed_chain(
    store: &Blockstore,
    head: Cid,
    base: Option<Cid>,
    key: &VerifyingKey,
) -> RepoResult<Vec<(Cid, RepoRoot)>> {
    let mut chain = Vec::new();
    let mut cursor = head;
    while Some(cursor) != base {
        let commit: Commit = store.get(&cursor).await?;
        let root: RepoRoot = store.get(&commit.root).await?;
        key.verify(commit.root.as_bytes(), &commit.sig)
            .inspect_err(|_| warn!(commit = %cursor.short_hex(), "bad commit signature"))?;
        let prev = root.prev;
        chain.push((cursor, root));
        match (prev, base) {
            (Some(prev), _) => cursor = prev,
            (None, None) => break,
            (None, Some(base)) => {
                return Err(RepoError::Structural(format!(
                    "could not find commit {} in archive history",
                    base.short_hex()
                )))
            }
        }
    }
    chain.reverse();
    Ok(chain)
}

/// Parse an archive, require exactly one root and store every block.
async fn ingest(store: &Blockstore, bytes: &[u8], config: &RepoConfig) -> RepoResult<Cid> {
    let archive = Archive::from_bytes_with_limit(bytes, config.archive.max_block_size)
        .inspect_err(|e| warn!(error = %e, bytes = bytes.len(), "rejected archive"))?;
    let head = match archive.roots.as_slice() {
        [head] => *head,
        roots => {
            warn!(roots = roots.len(), "rejected archive");
            return Err(RepoError::Structural(format!(
                "expected one root, got {}",
                roots.len()
            )))
        }
    };
    store.put_archive(archive).await?;
    Ok(head)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::repo::tests::{fixture, post, tid};
    use strand_crypto::SigningKey;
    use strand_diff::Collection;
    use strand_types::CidSet;

    fn block_cids(bytes: &[u8]) -> BTreeSet<Cid> {
        Archive::from_bytes(bytes)
            .unwrap()
            .blocks
            .into_iter()
            .map(|(cid, _)| cid)
            .collect()
    }

    async fn commit_blocks(repo: &Repo, commit: Cid) -> BTreeSet<Cid> {
        let c: Commit = repo.store().get(&commit).await.unwrap();
        let root: RepoRoot = repo.store().get(&c.root).await.unwrap();
        let mut set: BTreeSet<Cid> = root.new_cids.into_iter().collect();
        set.insert(commit);
        set.insert(c.root);
        set
    }

    #[tokio::test]
    async fn snapshot_restores_into_empty_store() {
        let mut f = fixture().await;
        for n in 1..=5 {
            post(&mut f.repo, "social", n).await;
        }
        let bytes = f.repo.export_snapshot().await.unwrap();

        let target = Blockstore::memory();
        let copy = Repo::from_archive(&target, &bytes, None, RepoConfig::default())
            .await
            .unwrap();
        assert_eq!(copy.cid(), f.repo.cid());
        assert_eq!(
            copy.get_all_entries("social", Collection::Posts).await.unwrap(),
            f.repo
                .get_all_entries("social", Collection::Posts)
                .await
                .unwrap()
        );
        assert!(copy.missing_cids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn diff_holds_exactly_the_newer_commits() {
        let mut f = fixture().await;
        post(&mut f.repo, "social", 1).await;
        let first = f.repo.cid();
        post(&mut f.repo, "social", 2).await;
        let second = f.repo.cid();
        post(&mut f.repo, "social", 3).await;
        let third = f.repo.cid();

        let bytes = f.repo.export_diff(Some(first)).await.unwrap();
        let mut expected = commit_blocks(&f.repo, second).await;
        expected.extend(commit_blocks(&f.repo, third).await);
        assert_eq!(block_cids(&bytes), expected);
        assert!(!block_cids(&bytes).contains(&first));
    }

    #[tokio::test]
    async fn diff_from_head_is_empty() {
        let mut f = fixture().await;
        post(&mut f.repo, "social", 1).await;
        let bytes = f.repo.export_diff(Some(f.repo.cid())).await.unwrap();
        let archive = Archive::from_bytes(&bytes).unwrap();
        assert!(archive.blocks.is_empty());
        assert_eq!(archive.roots, vec![f.repo.cid()]);
    }

    #[tokio::test]
    async fn diff_from_unknown_commit_fails() {
        let mut f = fixture().await;
        post(&mut f.repo, "social", 1).await;
        let stranger = Cid::from_hash([7; 32]);
        assert!(matches!(
            f.repo.export_diff(Some(stranger)).await,
            Err(RepoError::Structural(msg)) if msg.contains("could not find commit")
        ));
    }

    #[tokio::test]
    async fn full_history_walks_to_genesis() {
        let mut f = fixture().await;
        let genesis = f.repo.cid();
        for n in 1..=3 {
            post(&mut f.repo, "social", n).await;
        }
        let bytes = f.repo.export_full_history().await.unwrap();

        let target = Blockstore::memory();
        let copy = Repo::from_archive(&target, &bytes, None, RepoConfig::default())
            .await
            .unwrap();
        let mut cursor = Some(copy.cid());
        let mut commits = Vec::new();
        let mut expected = BTreeSet::new();
        while let Some(cid) = cursor {
            let commit: Commit = target.get(&cid).await.unwrap();
            let root: RepoRoot = target.get(&commit.root).await.unwrap();
            expected.extend(commit_blocks(&f.repo, cid).await);
            commits.push(cid);
            cursor = root.prev;
        }
        assert_eq!(commits.len(), 4);
        assert_eq!(commits.last(), Some(&genesis));
        assert_eq!(block_cids(&bytes), expected);
    }

    #[tokio::test]
    async fn import_requires_exactly_one_root() {
        let mut f = fixture().await;
        let bytes = ArchiveWriter::new(vec![]).finish();
        assert!(matches!(
            f.repo.import_archive(&bytes).await,
            Err(RepoError::Structural(msg)) if msg == "expected one root, got 0"
        ));
        let two = ArchiveWriter::new(vec![Cid::from_hash([1; 32]), Cid::from_hash([2; 32])]).finish();
        assert!(matches!(
            Repo::from_archive(&Blockstore::memory(), &two, None, RepoConfig::default()).await,
            Err(RepoError::Structural(_))
        ));
    }

    #[tokio::test]
    async fn import_diff_advances_replica() {
        let mut f = fixture().await;
        post(&mut f.repo, "social", 1).await;
        let snapshot = f.repo.export_snapshot().await.unwrap();
        let base = f.repo.cid();

        let target = Blockstore::memory();
        let mut replica = Repo::from_archive(&target, &snapshot, None, RepoConfig::default())
            .await
            .unwrap();
        replica.load_or_create_namespace("social").await.unwrap();

        post(&mut f.repo, "social", 2).await;
        let diff = f.repo.export_diff(Some(base)).await.unwrap();
        let head = replica.import_archive(&diff).await.unwrap();
        assert_eq!(head, f.repo.cid());
        assert_eq!(
            replica
                .get_all_entries("social", Collection::Posts)
                .await
                .unwrap()
                .len(),
            2
        );
        assert!(replica.missing_cids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn import_adopts_archive_identity() {
        let mut f = fixture().await;
        let mut g = fixture().await;
        let record = post(&mut g.repo, "social", 1).await;
        let bytes = g.repo.export_full_history().await.unwrap();

        let head = f.repo.import_archive(&bytes).await.unwrap();
        assert_eq!(head, g.repo.cid());
        assert_eq!(f.repo.did(), g.repo.did());
        assert_eq!(
            f.repo
                .get_entry("social", Collection::Posts, &tid(1))
                .await
                .unwrap(),
            Some(record)
        );
    }

    #[tokio::test]
    async fn verified_clone_replays_history_from_genesis() {
        let mut f = fixture().await;
        let first = post(&mut f.repo, "social", 1).await;
        let second = post(&mut f.repo, "social", 2).await;
        let edited = f.repo.put_record(&"edited".to_string()).await.unwrap();
        f.repo
            .edit_entry("social", Collection::Posts, tid(1), edited)
            .await
            .unwrap();
        let bytes = f.repo.export_full_history().await.unwrap();

        let target = Blockstore::memory();
        let (clone, events) =
            Repo::from_verified_archive(&target, &bytes, None, RepoConfig::default())
                .await
                .unwrap();
        assert_eq!(clone.cid(), f.repo.cid());
        assert_eq!(clone.did(), f.repo.did());
        assert!(clone.is_read_only());
        assert_eq!(
            events,
            vec![
                Event::AddedObject {
                    namespace: "social".into(),
                    collection: Collection::Posts,
                    tid: tid(1),
                    cid: first,
                },
                Event::AddedObject {
                    namespace: "social".into(),
                    collection: Collection::Posts,
                    tid: tid(2),
                    cid: second,
                },
                Event::UpdatedObject {
                    namespace: "social".into(),
                    collection: Collection::Posts,
                    tid: tid(1),
                    prev: first,
                    cid: edited,
                },
            ]
        );
    }

    #[tokio::test]
    async fn verified_clone_rejects_wrong_signer() {
        let owner = SigningKey::generate();
        let impostor = Arc::new(SigningKey::generate());
        let store = Blockstore::memory();
        let mut forged = Repo::create(&store, owner.identity(), impostor, RepoConfig::default())
            .await
            .unwrap();
        post(&mut forged, "social", 1).await;
        let bytes = forged.export_full_history().await.unwrap();

        let target = Blockstore::memory();
        assert!(matches!(
            Repo::from_verified_archive(&target, &bytes, None, RepoConfig::default()).await,
            Err(RepoError::Signature(_))
        ));
    }

    #[tokio::test]
    async fn verified_clone_rejects_partial_history() {
        let mut f = fixture().await;
        post(&mut f.repo, "social", 1).await;
        let base = f.repo.cid();
        post(&mut f.repo, "social", 2).await;
        let diff = f.repo.export_diff(Some(base)).await.unwrap();

        let target = Blockstore::memory();
        assert!(Repo::from_verified_archive(&target, &diff, None, RepoConfig::default())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn verified_diff_yields_events_in_commit_order() {
        let mut f = fixture().await;
        let first = post(&mut f.repo, "social", 1).await;
        let base = f.repo.cid();
        let snapshot = f.repo.export_snapshot().await.unwrap();
        let target = Blockstore::memory();
        let mut replica = Repo::from_archive(&target, &snapshot, None, RepoConfig::default())
            .await
            .unwrap();

        let second = post(&mut f.repo, "social", 2).await;
        let edited = f.repo.put_record(&"edited".to_string()).await.unwrap();
        f.repo
            .edit_entry("social", Collection::Posts, tid(1), edited)
            .await
            .unwrap();

        let diff = f.repo.export_diff(Some(base)).await.unwrap();
        let events = replica.load_and_verify_diff(&diff).await.unwrap();
        assert_eq!(
            events,
            vec![
                Event::AddedObject {
                    namespace: "social".into(),
                    collection: Collection::Posts,
                    tid: tid(2),
                    cid: second,
                },
                Event::UpdatedObject {
                    namespace: "social".into(),
                    collection: Collection::Posts,
                    tid: tid(1),
                    prev: first,
                    cid: edited,
                },
            ]
        );
        assert_eq!(replica.cid(), f.repo.cid());
    }

    #[tokio::test]
    async fn verified_diff_rejects_wrong_signer() {
        let owner = SigningKey::generate();
        let impostor = Arc::new(SigningKey::generate());
        let store = Blockstore::memory();
        let mut forged = Repo::create(&store, owner.identity(), impostor, RepoConfig::default())
            .await
            .unwrap();
        let genesis = forged.cid();

        let replica_store = Blockstore::memory();
        let snapshot = forged.export_snapshot().await.unwrap();
        let mut replica = Repo::from_archive(&replica_store, &snapshot, None, RepoConfig::default())
            .await
            .unwrap();

        post(&mut forged, "social", 1).await;
        let diff = forged.export_diff(Some(genesis)).await.unwrap();
        assert!(matches!(
            replica.load_and_verify_diff(&diff).await,
            Err(RepoError::Signature(_))
        ));
        assert_eq!(replica.cid(), genesis);
    }

    #[tokio::test]
    async fn verified_diff_requires_descent_from_head() {
        let mut f = fixture().await;
        let genesis = f.repo.cid();
        post(&mut f.repo, "social", 1).await;
        let snapshot = f.repo.export_snapshot().await.unwrap();
        let replica_store = Blockstore::memory();
        let mut replica = Repo::from_archive(&replica_store, &snapshot, None, RepoConfig::default())
            .await
            .unwrap();

        let signer: Arc<dyn Signer> = f.key.clone();
        let mut fork = Repo::load(&f.store, genesis, Some(signer), RepoConfig::default())
            .await
            .unwrap();
        post(&mut fork, "social", 2).await;
        let history = fork.export_full_history().await.unwrap();

        let head = replica.cid();
        assert!(matches!(
            replica.load_and_verify_diff(&history).await,
            Err(RepoError::Structural(msg)) if msg.contains("could not find commit")
        ));
        assert_eq!(replica.cid(), head);
    }

    #[tokio::test]
    async fn empty_commit_yields_no_events() {
        let mut f = fixture().await;
        post(&mut f.repo, "social", 1).await;
        let base = f.repo.cid();
        let snapshot = f.repo.export_snapshot().await.unwrap();
        let replica_store = Blockstore::memory();
        let mut replica = Repo::from_archive(&replica_store, &snapshot, None, RepoConfig::default())
            .await
            .unwrap();

        f.repo.update_root(CidSet::new()).await.unwrap();
        let diff = f.repo.export_diff(Some(base)).await.unwrap();
        assert!(replica.load_and_verify_diff(&diff).await.unwrap().is_empty());
        assert_eq!(replica.cid(), f.repo.cid());
    }
}
