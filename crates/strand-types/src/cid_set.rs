use std::collections::HashSet;

use crate::cid::Cid;

/// Deduplicating accumulator of content addresses.
///
/// Collects every block a mutation introduces so the commit can record them
/// and incremental export never has to walk the whole DAG.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CidSet {
    set: HashSet<Cid>,
}

impl CidSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an address, returning the set for chaining.
    pub fn add(mut self, cid: Cid) -> Self {
        self.set.insert(cid);
        self
    }

    pub fn add_mut(&mut self, cid: Cid) -> &mut Self {
        self.set.insert(cid);
        self
    }

    /// Merge another set into this one.
    pub fn add_set(mut self, other: CidSet) -> Self {
        self.set.extend(other.set);
        self
    }

    pub fn contains(&self, cid: &Cid) -> bool {
        self.set.contains(cid)
    }

    /// All addresses, sorted so the output is deterministic.
    pub fn to_list(&self) -> Vec<Cid> {
        let mut list: Vec<Cid> = self.set.iter().copied().collect();
        list.sort();
        list
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cid> {
        self.set.iter()
    }
}

impl FromIterator<Cid> for CidSet {
    fn from_iter<I: IntoIterator<Item = Cid>>(iter: I) -> Self {
        Self {
            set: iter.into_iter().collect(),
        }
    }
}

impl Extend<Cid> for CidSet {
    fn extend<I: IntoIterator<Item = Cid>>(&mut self, iter: I) {
        self.set.extend(iter);
    }
}
