use serde::{Deserialize, Serialize};

use crate::table::TableSize;

/// Entry capacity of each shard size class.
///
/// Only writers consult capacities; a reader can load tables written under
/// any configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardConfig {
    /// Capacities for `sm`, `md`, `lg` and `xl`, in that order.
    pub capacities: [usize; 4],
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            capacities: [100, 400, 1600, 6400],
        }
    }
}

impl ShardConfig {
    pub fn capacity(&self, size: TableSize) -> usize {
        self.capacities[size.index()]
    }

    /// Each class must be non-empty and hold at least four of the previous
    /// class, otherwise a merge could overflow its output table.
    pub fn validate(&self) -> Result<(), String> {
        if self.capacities[0] == 0 {
            return Err("shard capacities must be non-zero".into());
        }
        for pair in self.capacities.windows(2) {
            if pair[1] < pair[0].saturating_mul(4) {
                return Err(format!(
                    "shard capacity {} cannot hold a merge of four tables of {}",
                    pair[1], pair[0]
                ));
            }
        }
        Ok(())
    }
}
