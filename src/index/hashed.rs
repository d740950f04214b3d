//! Hash map index store: equality lookups only, not countable.

use std::collections::HashMap;

use crate::{
    hasher::CityHasher,
    tuple::{KeyTuple, RowId},
    Result,
};

pub struct HashedIndex {
    map: HashMap<KeyTuple, Vec<RowId>, CityHasher>,
    entries: usize,
}

impl Default for HashedIndex {
    fn default() -> HashedIndex {
        HashedIndex::new()
    }
}

impl HashedIndex {
    pub fn new() -> HashedIndex {
        HashedIndex {
            map: HashMap::with_hasher(CityHasher::new()),
            entries: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.entries = 0;
    }

    pub fn insert(&mut self, key: KeyTuple, row: RowId, unique: bool) -> Result<()> {
        let rows = self.map.entry(key).or_insert_with(Vec::new);
        if unique && !rows.is_empty() {
            return err_at!(ConstraintFail, msg: "duplicate key in hash index");
        }
        rows.push(row);
        self.entries += 1;
        Ok(())
    }

    pub fn remove(&mut self, key: &KeyTuple, row: RowId) -> Result<bool> {
        let rows = match self.map.get_mut(key) {
            Some(rows) => rows,
            None => return Ok(false),
        };
        match rows.iter().position(|r| *r == row) {
            Some(at) => {
                rows.remove(at);
                if rows.is_empty() {
                    self.map.remove(key);
                }
                self.entries -= 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn get(&self, key: &KeyTuple) -> Option<&[RowId]> {
        self.map.get(key).map(|rows| rows.as_slice())
    }

    pub fn has_key(&self, key: &KeyTuple) -> bool {
        self.map.contains_key(key)
    }
}

#[cfg(test)]
#[path = "hashed_test.rs"]
mod hashed_test;
