//! Module implement tables: persistent partitioned storage, executor
//! temp buffers, block-paged large temps and streamed export pipes,
//! plus the name-keyed catalog the engine executes against.

use std::collections::HashMap;

mod large;
mod persistent;
mod streamed;
mod temp;

pub use large::LargeTempTable;
pub use persistent::{PersistentTable, DR_DELETE, DR_INSERT, DR_UPDATE};
pub use streamed::StreamedTable;
pub use temp::{SharedLimits, TempLimits, TempTable};

use crate::Result;

/// A catalog-resident table.
pub enum Table {
    Persistent(PersistentTable),
    Streamed(StreamedTable),
}

impl Table {
    pub fn name(&self) -> &str {
        match self {
            Table::Persistent(t) => t.name(),
            Table::Streamed(t) => t.name(),
        }
    }

    pub fn schema(&self) -> &std::sync::Arc<crate::schema::TupleSchema> {
        match self {
            Table::Persistent(t) => t.schema(),
            Table::Streamed(t) => t.schema(),
        }
    }
}

/// Name-keyed table directory for one partition.
#[derive(Default)]
pub struct Catalog {
    tables: HashMap<String, Table>,
}

impl Catalog {
    pub fn new() -> Catalog {
        Catalog::default()
    }

    pub fn add(&mut self, table: Table) -> Result<()> {
        let name = table.name().to_string();
        if self.tables.contains_key(&name) {
            return err_at!(InvalidInput, msg: "table {} already exists", name);
        }
        self.tables.insert(name, table);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Table> {
        match self.tables.get(name) {
            Some(table) => Ok(table),
            None => err_at!(InvalidInput, msg: "no table {}", name),
        }
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Table> {
        match self.tables.get_mut(name) {
            Some(table) => Ok(table),
            None => err_at!(InvalidInput, msg: "no table {}", name),
        }
    }

    pub fn persistent(&self, name: &str) -> Result<&PersistentTable> {
        match self.get(name)? {
            Table::Persistent(t) => Ok(t),
            Table::Streamed(_) => err_at!(InvalidInput, msg: "{} is a streamed table", name),
        }
    }

    pub fn persistent_mut(&mut self, name: &str) -> Result<&mut PersistentTable> {
        match self.get_mut(name)? {
            Table::Persistent(t) => Ok(t),
            Table::Streamed(_) => err_at!(InvalidInput, msg: "{} is a streamed table", name),
        }
    }

    pub fn streamed_mut(&mut self, name: &str) -> Result<&mut StreamedTable> {
        match self.get_mut(name)? {
            Table::Streamed(t) => Ok(t),
            Table::Persistent(_) => err_at!(InvalidInput, msg: "{} is a persistent table", name),
        }
    }

    /// Exchange the contents of two same-schema persistent tables.
    pub fn swap_tables(&mut self, a: &str, b: &str) -> Result<()> {
        if a == b {
            return err_at!(InvalidInput, msg: "swap of {} with itself", a);
        }
        let mut ta = match self.tables.remove(a) {
            Some(Table::Persistent(t)) => t,
            Some(other) => {
                self.tables.insert(a.to_string(), other);
                return err_at!(InvalidInput, msg: "{} is not a persistent table", a);
            }
            None => return err_at!(InvalidInput, msg: "no table {}", a),
        };
        let res = match self.tables.get_mut(b) {
            Some(Table::Persistent(tb)) => ta.swap_contents(tb),
            Some(_) => err_at!(InvalidInput, msg: "{} is not a persistent table", b),
            None => err_at!(InvalidInput, msg: "no table {}", b),
        };
        self.tables.insert(a.to_string(), Table::Persistent(ta));
        res
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
