//! Module implement table indexes: key extraction, uniqueness, partial
//! predicates and the ordered/hashed stores behind one façade.
//!
//! An index maps a key tuple, materialized from one or more base-table
//! columns, to row addresses. Ordered indexes are countable (rank-style
//! queries); hash indexes only answer equality probes. A partial index
//! carries a predicate over the base row; rows failing it simply do not
//! participate, on add and on delete alike.

use std::sync::Arc;

use crate::{
    expr::{EvalCtx, Expr},
    schema::{ColumnSpec, TupleSchema},
    tuple::{KeyTuple, RowId, Tuple},
    Result,
};

mod hashed;
mod ordered;

pub use hashed::HashedIndex;
pub use ordered::{OrderedCursor, OrderedIndex};

/// Index description: identity, shape, covered columns, predicate.
#[derive(Clone)]
pub struct IndexScheme {
    pub name: String,
    /// Base-table column ids materialized into the key, in key order.
    pub columns: Vec<usize>,
    pub key_schema: Arc<TupleSchema>,
    pub unique: bool,
    pub hashed: bool,
    /// Partial-index predicate over the base row, if any.
    pub partial: Option<Expr>,
}

impl IndexScheme {
    /// Build a scheme over `columns` of `table_schema`.
    pub fn new(
        name: &str,
        table_schema: &TupleSchema,
        columns: Vec<usize>,
        unique: bool,
        hashed: bool,
        partial: Option<Expr>,
    ) -> Result<IndexScheme> {
        let mut specs = vec![];
        for col in columns.iter() {
            let c = table_schema.column_checked(*col)?;
            specs.push(ColumnSpec {
                name: c.name.clone(),
                vtype: c.vtype,
                length: c.length,
                in_bytes: c.in_bytes,
            });
        }
        let key_schema = TupleSchema::new_key(specs)?;
        Ok(IndexScheme {
            name: name.to_string(),
            columns,
            key_schema,
            unique,
            hashed,
            partial,
        })
    }

    /// Columns whose change can affect this index: the keyed columns
    /// plus any referenced by the partial predicate.
    pub fn relevant_columns(&self) -> Vec<usize> {
        let mut cols = self.columns.clone();
        if let Some(pred) = &self.partial {
            pred.collect_columns(0, &mut cols);
        }
        cols.sort_unstable();
        cols.dedup();
        cols
    }
}

enum IndexStore {
    Ordered(OrderedIndex),
    Hashed(HashedIndex),
}

/// One secondary (or primary) index of a persistent table.
pub struct TableIndex {
    pub scheme: IndexScheme,
    store: IndexStore,
}

impl TableIndex {
    pub fn new(scheme: IndexScheme) -> TableIndex {
        let store = match scheme.hashed {
            true => IndexStore::Hashed(HashedIndex::new()),
            false => IndexStore::Ordered(OrderedIndex::new()),
        };
        TableIndex { scheme, store }
    }

    pub fn name(&self) -> &str {
        &self.scheme.name
    }

    /// Ordered indexes support rank queries and range cursors.
    pub fn is_countable(&self) -> bool {
        matches!(self.store, IndexStore::Ordered(_))
    }

    pub fn len(&self) -> usize {
        match &self.store {
            IndexStore::Ordered(ix) => ix.len(),
            IndexStore::Hashed(ix) => ix.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        match &mut self.store {
            IndexStore::Ordered(ix) => ix.clear(),
            IndexStore::Hashed(ix) => ix.clear(),
        }
    }

    /// Materialize the key for a base-table row.
    pub fn key_for(&self, tuple: &Tuple) -> Result<KeyTuple> {
        let mut key = KeyTuple::new(Arc::clone(&self.scheme.key_schema))?;
        for (i, col) in self.scheme.columns.iter().enumerate() {
            key.set_value(i, &tuple.value(*col)?)?;
        }
        Ok(key)
    }

    /// Whether the row participates, per the partial predicate.
    pub fn qualifies(&self, tuple: &Tuple) -> Result<bool> {
        match &self.scheme.partial {
            None => Ok(true),
            Some(pred) => Ok(pred.eval(&EvalCtx::default(), Some(tuple), None)?.is_true()),
        }
    }

    /// Index a base row. Returns false when the partial predicate
    /// filtered it out.
    pub fn add_tuple(&mut self, tuple: &Tuple, row: RowId) -> Result<bool> {
        if !self.qualifies(tuple)? {
            return Ok(false);
        }
        let key = self.key_for(tuple)?;
        self.insert_key(key, row)?;
        Ok(true)
    }

    /// Unindex a base row. Deleting a non-qualifying row is a no-op
    /// success.
    pub fn remove_tuple(&mut self, tuple: &Tuple, row: RowId) -> Result<bool> {
        if !self.qualifies(tuple)? {
            return Ok(false);
        }
        let key = self.key_for(tuple)?;
        self.remove_key(&key, row)
    }

    pub fn insert_key(&mut self, key: KeyTuple, row: RowId) -> Result<()> {
        match &mut self.store {
            IndexStore::Ordered(ix) => ix.insert(key, row, self.scheme.unique),
            IndexStore::Hashed(ix) => ix.insert(key, row, self.scheme.unique),
        }
    }

    pub fn remove_key(&mut self, key: &KeyTuple, row: RowId) -> Result<bool> {
        match &mut self.store {
            IndexStore::Ordered(ix) => ix.remove(key, row),
            IndexStore::Hashed(ix) => ix.remove(key, row),
        }
    }

    pub fn get(&self, key: &KeyTuple) -> Option<&[RowId]> {
        match &self.store {
            IndexStore::Ordered(ix) => ix.get(key),
            IndexStore::Hashed(ix) => ix.get(key),
        }
    }

    pub fn has_key(&self, key: &KeyTuple) -> bool {
        match &self.store {
            IndexStore::Ordered(ix) => ix.has_key(key),
            IndexStore::Hashed(ix) => ix.has_key(key),
        }
    }

    /// Rank query, ordered indexes only.
    pub fn entries_below(&self, key: &KeyTuple, inclusive: bool) -> Result<usize> {
        match &self.store {
            IndexStore::Ordered(ix) => Ok(ix.entries_below(key, inclusive)),
            IndexStore::Hashed(_) => {
                err_at!(InvalidInput, msg: "rank query on hash index {}", self.scheme.name)
            }
        }
    }

    /// Full-index cursor, ordered indexes only.
    pub fn cursor_all(&self, reverse: bool) -> Result<OrderedCursor> {
        match &self.store {
            IndexStore::Ordered(ix) => Ok(ix.cursor_all(reverse)),
            IndexStore::Hashed(_) => {
                err_at!(InvalidInput, msg: "cursor on hash index {}", self.scheme.name)
            }
        }
    }

    /// Seek cursor, ordered indexes only. GE/GT forward, LE/LT reverse.
    pub fn cursor_from(
        &self,
        key: &KeyTuple,
        inclusive: bool,
        reverse: bool,
    ) -> Result<OrderedCursor> {
        match &self.store {
            IndexStore::Ordered(ix) => Ok(ix.cursor_from(key, inclusive, reverse)),
            IndexStore::Hashed(_) => {
                err_at!(InvalidInput, msg: "cursor on hash index {}", self.scheme.name)
            }
        }
    }

    /// Whether an update changing `changed` columns requires
    /// maintenance on this index.
    pub fn relevant_to_update(&self, changed: &[usize]) -> bool {
        let relevant = self.scheme.relevant_columns();
        changed.iter().any(|c| relevant.binary_search(c).is_ok())
    }
}
