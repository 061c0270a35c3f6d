//! Keyed address-map diff.
//!
//! Both sides are maps from a key (a namespace name, a TID) to the address
//! of the value stored under it. A commit reports the set of addresses it
//! introduced; any key that is added or re-pointed must land on one of
//! those, otherwise the commit claims state it never wrote.

use std::collections::BTreeMap;
use std::fmt::Display;

use strand_types::{Cid, CidSet, Tid};

use crate::error::{DiffError, DiffResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Add<K> {
    pub key: K,
    pub cid: Cid,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Update<K> {
    pub key: K,
    pub prev: Cid,
    pub cid: Cid,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delete<K> {
    pub key: K,
    pub cid: Cid,
}

/// Changes between two keyed address maps, each list in ascending key order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataDiff<K> {
    pub adds: Vec<Add<K>>,
    pub updates: Vec<Update<K>>,
    pub deletes: Vec<Delete<K>>,
}

impl<K> Default for DataDiff<K> {
    fn default() -> Self {
        Self {
            adds: Vec::new(),
            updates: Vec::new(),
            deletes: Vec::new(),
        }
    }
}

impl<K> DataDiff<K> {
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// Total number of changes.
    pub fn len(&self) -> usize {
        self.adds.len() + self.updates.len() + self.deletes.len()
    }
}

/// Diff two keyed address maps.
///
/// Keys only in `curr` are adds, keys only in `prev` are deletes, keys in
/// both with different addresses are updates. Fails with
/// [`DiffError::UnreportedCid`] if an add or update points at an address
/// outside `new_cids`.
pub fn data_diff<K, P, C>(prev: P, curr: C, new_cids: &CidSet) -> DiffResult<DataDiff<K>>
where
    K: Ord + Clone + Display,
    P: IntoIterator<Item = (K, Cid)>,
    C: IntoIterator<Item = (K, Cid)>,
{
    let prev: BTreeMap<K, Cid> = prev.into_iter().collect();
    let curr: BTreeMap<K, Cid> = curr.into_iter().collect();
    let mut diff = DataDiff::default();

    for (key, cid) in &curr {
        match prev.get(key) {
            Some(old) if old == cid => {}
            Some(old) => {
                check_reported(key, cid, new_cids)?;
                diff.updates.push(Update {
                    key: key.clone(),
                    prev: *old,
                    cid: *cid,
                });
            }
            None => {
                check_reported(key, cid, new_cids)?;
                diff.adds.push(Add {
                    key: key.clone(),
                    cid: *cid,
                });
            }
        }
    }

    for (key, cid) in &prev {
        if !curr.contains_key(key) {
            diff.deletes.push(Delete {
                key: key.clone(),
                cid: *cid,
            });
        }
    }

    Ok(diff)
}

/// Diff two namespace maps.
pub fn id_map_diff(
    prev: &BTreeMap<String, Cid>,
    curr: &BTreeMap<String, Cid>,
    new_cids: &CidSet,
) -> DiffResult<DataDiff<String>> {
    data_diff(
        prev.iter().map(|(k, v)| (k.clone(), *v)),
        curr.iter().map(|(k, v)| (k.clone(), *v)),
        new_cids,
    )
}

/// Diff two collection entry lists.
pub fn tid_entries_diff<P, C>(prev: P, curr: C, new_cids: &CidSet) -> DiffResult<DataDiff<Tid>>
where
    P: IntoIterator<Item = (Tid, Cid)>,
    C: IntoIterator<Item = (Tid, Cid)>,
{
    data_diff(prev, curr, new_cids)
}

fn check_reported<K: Display>(key: &K, cid: &Cid, new_cids: &CidSet) -> DiffResult<()> {
    if new_cids.contains(cid) {
        Ok(())
    } else {
        Err(DiffError::UnreportedCid {
            key: key.to_string(),
            cid: *cid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(n: u8) -> Cid {
        Cid::from_hash([n; 32])
    }

    fn tid(n: u64) -> Tid {
        Tid::new(n, 0)
    }

    fn map(pairs: &[(&str, u8)]) -> BTreeMap<String, Cid> {
        pairs.iter().map(|(k, n)| (k.to_string(), cid(*n))).collect()
    }

    #[test]
    fn identical_maps_no_diff() {
        let m = map(&[("a", 1), ("b", 2)]);
        let diff = id_map_diff(&m, &m, &CidSet::new()).unwrap();
        assert!(diff.is_empty());
    }

    #[test]
    fn adds_updates_deletes() {
        let prev = map(&[("keep", 1), ("edit", 2), ("gone", 3)]);
        let curr = map(&[("keep", 1), ("edit", 4), ("new", 5)]);
        let reported: CidSet = [cid(4), cid(5)].into_iter().collect();

        let diff = id_map_diff(&prev, &curr, &reported).unwrap();
        assert_eq!(diff.len(), 3);
        assert_eq!(
            diff.adds,
            vec![Add {
                key: "new".to_string(),
                cid: cid(5)
            }]
        );
        assert_eq!(
            diff.updates,
            vec![Update {
                key: "edit".to_string(),
                prev: cid(2),
                cid: cid(4)
            }]
        );
        assert_eq!(
            diff.deletes,
            vec![Delete {
                key: "gone".to_string(),
                cid: cid(3)
            }]
        );
    }

    #[test]
    fn unreported_add_is_rejected() {
        let prev = map(&[]);
        let curr = map(&[("sneaky", 9)]);
        let err = id_map_diff(&prev, &curr, &CidSet::new()).unwrap_err();
        assert_eq!(
            err,
            DiffError::UnreportedCid {
                key: "sneaky".into(),
                cid: cid(9)
            }
        );
    }

    #[test]
    fn deletes_need_no_report() {
        let prev = map(&[("a", 1)]);
        let curr = map(&[]);
        let diff = id_map_diff(&prev, &curr, &CidSet::new()).unwrap();
        assert_eq!(diff.deletes.len(), 1);
    }

    #[test]
    fn tid_entries_in_ascending_order() {
        let prev = vec![(tid(1), cid(1))];
        let curr = vec![(tid(3), cid(3)), (tid(2), cid(2)), (tid(1), cid(1))];
        let reported: CidSet = [cid(2), cid(3)].into_iter().collect();
        let diff = tid_entries_diff(prev, curr, &reported).unwrap();
        let keys: Vec<Tid> = diff.adds.iter().map(|a| a.key).collect();
        assert_eq!(keys, vec![tid(2), tid(3)]);
    }

    #[test]
    fn same_entries_in_different_order_is_empty() {
        let a = vec![(tid(1), cid(1)), (tid(2), cid(2))];
        let b = vec![(tid(2), cid(2)), (tid(1), cid(1))];
        assert!(tid_entries_diff(a, b, &CidSet::new()).unwrap().is_empty());
    }
}
