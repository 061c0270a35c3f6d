//! Commit-to-commit verification.

use std::collections::BTreeMap;

use strand_diff::{id_map_diff, Collection, Event};
use strand_types::{Cid, CidSet};
use tracing::debug;

use crate::error::{RepoError, RepoResult};
use crate::namespace::Namespace;
use crate::repo::Repo;

impl Repo {
    /// Check that `self` is a valid successor of `prev` and describe the change.
    ///
    /// Events are ordered deleted namespaces, then added namespaces (one
    /// event per entry), then per-entry changes inside updated namespaces.
    pub async fn verify_update(&self, prev: &Repo) -> RepoResult<Vec<Event>> {
        match self.root.prev {
            Some(p) if p == prev.cid => {}
            Some(p) => {
                return Err(RepoError::Monotonicity(format!(
                    "commit follows {}, not {}",
                    p.short_hex(),
                    prev.cid.short_hex()
                )))
            }
            None => {
                return Err(RepoError::Monotonicity(
                    "genesis commit has no predecessor".into(),
                ))
            }
        }
        if self.root.did != prev.root.did {
            return Err(RepoError::Structural(format!(
                "identity changed from {} to {}",
                prev.root.did, self.root.did
            )));
        }
        let events = self.namespace_events(&prev.root.namespaces).await?;
        debug!(
            commit = %self.cid.short_hex(),
            prev = %prev.cid.short_hex(),
            events = events.len(),
            "verified update"
        );
        Ok(events)
    }

    /// Check that `self` is a genesis commit and describe its contents.
    ///
    /// Every namespace the genesis root names is reported as added.
    pub async fn verify_genesis(&self) -> RepoResult<Vec<Event>> {
        if let Some(p) = self.root.prev {
            return Err(RepoError::Monotonicity(format!(
                "commit {} follows {}, not genesis",
                self.cid.short_hex(),
                p.short_hex()
            )));
        }
        let events = self.namespace_events(&BTreeMap::new()).await?;
        debug!(commit = %self.cid.short_hex(), events = events.len(), "verified genesis");
        Ok(events)
    }

    async fn namespace_events(&self, prev: &BTreeMap<String, Cid>) -> RepoResult<Vec<Event>> {
        let new_cids: CidSet = self.root.new_cids.iter().copied().collect();
        let diff = id_map_diff(prev, &self.root.namespaces, &new_cids)?;
        let shard = self.config.shard;
        let mut events = Vec::new();

        for del in diff.deletes {
            events.push(Event::DeletedNamespace { namespace: del.key });
        }

        for add in diff.adds {
            let missing = Namespace::missing_cids_at(&self.store, add.cid, shard).await?;
            if !missing.is_empty() {
                return Err(RepoError::MissingBlocks {
                    namespace: add.key,
                    cids: missing.to_list(),
                });
            }
            let ns = Namespace::load(&self.store, add.cid, shard).await?;
            for collection in Collection::ALL {
                let mut entries = ns.get_all_entries(collection).await?;
                entries.reverse();
                events.extend(entries.into_iter().map(|e| Event::AddedObject {
                    namespace: add.key.clone(),
                    collection,
                    tid: e.tid,
                    cid: e.cid,
                }));
            }
        }

        for update in diff.updates {
            let (curr, old) = futures::try_join!(
                Namespace::load(&self.store, update.cid, shard),
                Namespace::load(&self.store, update.prev, shard),
            )?;
            events.extend(curr.verify_update(&old, &new_cids, &update.key).await?);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{NamespaceBlock, RepoRoot};
    use crate::repo::tests::{fixture, post, tid};
    use strand_types::Identity;

    fn successor(prev: &Repo, namespaces: BTreeMap<String, Cid>, new_cids: Vec<Cid>) -> Repo {
        Repo {
            store: prev.store.clone(),
            config: prev.config.clone(),
            cid: Cid::from_hash([0xee; 32]),
            root: RepoRoot {
                did: prev.root.did.clone(),
                prev: Some(prev.cid),
                new_cids,
                namespaces,
            },
            handles: BTreeMap::new(),
            signer: None,
        }
    }

    fn snapshot(repo: &Repo) -> Repo {
        Repo {
            store: repo.store.clone(),
            config: repo.config.clone(),
            cid: repo.cid,
            root: repo.root.clone(),
            handles: BTreeMap::new(),
            signer: None,
        }
    }

    #[tokio::test]
    async fn added_namespace_reports_every_entry() {
        let mut f = fixture().await;
        let genesis = snapshot(&f.repo);
        let a = post(&mut f.repo, "social", 1).await;
        let first = snapshot(&f.repo);
        let b = post(&mut f.repo, "social", 2).await;

        // Squash both commits into one successor of genesis.
        let mut new_cids = first.root.new_cids.clone();
        new_cids.extend(f.repo.root.new_cids.iter().copied());
        let squashed = successor(&genesis, f.repo.root.namespaces.clone(), new_cids);

        let events = squashed.verify_update(&genesis).await.unwrap();
        assert_eq!(
            events,
            vec![
                Event::AddedObject {
                    namespace: "social".into(),
                    collection: Collection::Posts,
                    tid: tid(1),
                    cid: a,
                },
                Event::AddedObject {
                    namespace: "social".into(),
                    collection: Collection::Posts,
                    tid: tid(2),
                    cid: b,
                },
            ]
        );
    }

    #[tokio::test]
    async fn updated_namespace_recurses_into_collections() {
        let mut f = fixture().await;
        post(&mut f.repo, "social", 1).await;
        let prev = snapshot(&f.repo);
        f.repo
            .delete_entry("social", Collection::Posts, tid(1))
            .await
            .unwrap();

        let events = f.repo.verify_update(&prev).await.unwrap();
        assert_eq!(
            events,
            vec![Event::DeletedObject {
                namespace: "social".into(),
                collection: Collection::Posts,
                tid: tid(1),
            }]
        );
    }

    #[tokio::test]
    async fn removed_namespace_is_one_event() {
        let mut f = fixture().await;
        post(&mut f.repo, "social", 1).await;
        post(&mut f.repo, "work", 1).await;
        let prev = snapshot(&f.repo);
        let mut namespaces = prev.root.namespaces.clone();
        namespaces.remove("work");

        let next = successor(&prev, namespaces, vec![]);
        assert_eq!(
            next.verify_update(&prev).await.unwrap(),
            vec![Event::DeletedNamespace {
                namespace: "work".into()
            }]
        );
    }

    #[tokio::test]
    async fn wrong_predecessor_is_monotonicity_error() {
        let mut f = fixture().await;
        let genesis = snapshot(&f.repo);
        post(&mut f.repo, "social", 1).await;
        let first = snapshot(&f.repo);
        post(&mut f.repo, "social", 2).await;

        assert!(matches!(
            f.repo.verify_update(&genesis).await,
            Err(RepoError::Monotonicity(_))
        ));
        assert!(matches!(
            genesis.verify_update(&first).await,
            Err(RepoError::Monotonicity(_))
        ));
    }

    #[tokio::test]
    async fn identity_change_is_structural_error() {
        let f = fixture().await;
        let prev = snapshot(&f.repo);
        let mut next = successor(&prev, BTreeMap::new(), vec![]);
        next.root.did = Identity::new("did:key:someone-else");
        assert!(matches!(
            next.verify_update(&prev).await,
            Err(RepoError::Structural(_))
        ));
    }

    #[tokio::test]
    async fn unreported_namespace_is_structural_error() {
        let mut f = fixture().await;
        let genesis = snapshot(&f.repo);
        post(&mut f.repo, "social", 1).await;
        let next = successor(&genesis, f.repo.root.namespaces.clone(), vec![]);
        assert!(matches!(
            next.verify_update(&genesis).await,
            Err(RepoError::Structural(_))
        ));
    }

    #[tokio::test]
    async fn added_namespace_with_absent_blocks_is_reported() {
        let f = fixture().await;
        let prev = snapshot(&f.repo);
        let absent_posts = Cid::from_hash([1; 32]);
        let absent_interactions = Cid::from_hash([2; 32]);
        let ns = f
            .store
            .put(&NamespaceBlock {
                posts: absent_posts,
                interactions: absent_interactions,
            })
            .await
            .unwrap();
        let namespaces = BTreeMap::from([("social".to_string(), ns)]);
        let next = successor(&prev, namespaces, vec![ns]);

        match next.verify_update(&prev).await {
            Err(RepoError::MissingBlocks { namespace, cids }) => {
                assert_eq!(namespace, "social");
                assert_eq!(cids.len(), 2);
                assert!(cids.contains(&absent_posts) && cids.contains(&absent_interactions));
            }
            other => panic!("expected missing blocks, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn genesis_reports_no_events() {
        let f = fixture().await;
        assert!(snapshot(&f.repo).verify_genesis().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_genesis_commit_fails_genesis_check() {
        let mut f = fixture().await;
        post(&mut f.repo, "social", 1).await;
        assert!(matches!(
            snapshot(&f.repo).verify_genesis().await,
            Err(RepoError::Monotonicity(_))
        ));
    }
}
