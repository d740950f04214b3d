//! Package implement the per-partition execution core of a distributed,
//! in-memory relational database. The engine receives serialized plan
//! fragments, compiles them into executor pipelines and runs them
//! against in-memory tables to produce result tables.
//!
//! Each [Engine] instance is strictly single threaded and bound to one
//! partition of the data. The surrounding distributed system, its
//! transaction coordinator, catalog manager, network transport and
//! durability log, sits on the other side of the narrow [Topend]
//! boundary and is out of scope for this package.
//!
//! A fragment executes as a synchronous call: the engine looks up a
//! cached executor vector, or fetches and compiles the fragment's JSON
//! plan through [Topend], then drives each statement's executor list
//! bottom-up. Executors read rows from child temp-tables, scans or
//! index cursors, and append rows into their own output temp-table.
//! Intra-query temporaries are backed by [Arena] and released in bulk
//! at fragment boundary.

#[macro_use]
mod error;
#[macro_use]
pub mod util;

pub mod arena;
pub mod config;
pub mod engine;
pub mod exec;
pub mod expr;
pub mod hasher;
pub mod index;
pub mod plan;
pub mod projector;
pub mod schema;
pub mod table;
pub mod tuple;
pub mod undo;
pub mod value;

pub use crate::arena::Arena;
pub use crate::config::Config;
pub use crate::engine::{Engine, Topend};
pub use crate::error::Error;
pub use crate::schema::{ColumnSpec, TupleSchema};
pub use crate::tuple::{KeyTuple, OwnedTuple, RowId, Tuple};
pub use crate::value::{Value, ValueType};

#[cfg(not(target_env = "msvc"))]
use jemallocator;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

/// Type alias for Result return type, used by this package.
pub type Result<T> = std::result::Result<T, Error>;
