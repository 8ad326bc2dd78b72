use std::collections::BTreeMap;

use crate::rules::schema::IdPoolType;

/// Sequential id allocator, one sequence per pool.
///
/// Each pool starts after the highest id seen externally. A pool whose
/// sequence would pass `u64::MAX` is exhausted and hands out nothing.
#[derive(Debug, Clone, Default)]
pub struct IdPool {
    next: BTreeMap<IdPoolType, Option<u64>>,
}

impl IdPool {
    pub fn new(max_ids: &BTreeMap<IdPoolType, u64>) -> Self {
        IdPool {
            next: max_ids
                .iter()
                .map(|(pool, max)| (*pool, max.checked_add(1)))
                .collect(),
        }
    }

    /// Hand out the next id of a pool. Unknown pools start at 1.
    pub fn next(&mut self, pool: IdPoolType) -> Option<u64> {
        let slot = self.next.entry(pool).or_insert(Some(1));
        let id = (*slot)?;
        *slot = id.checked_add(1);
        Some(id)
    }

    /// The id `next` would return, without consuming it.
    pub fn peek(&self, pool: IdPoolType) -> Option<u64> {
        self.next.get(&pool).copied().unwrap_or(Some(1))
    }
}
