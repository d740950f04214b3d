//! Module implement the immutable tuple-layout descriptor.
//!
//! A schema lists, for every column, its type, declared length, length
//! semantics (bytes vs characters for VARCHAR), whether the value is
//! stored inline and the byte offset of the column within the row
//! payload. Hidden columns, used for system-maintained fields, follow
//! the visible columns. Schemas are shared behind [std::sync::Arc] and
//! never mutated after construction.
//!
//! "Headerless" schemas describe index-key tuples: no status header
//! byte, and never any out-of-line data.

use std::sync::Arc;

use crate::{value::ValueType, Result};

/// Declared lengths at or below this many payload bytes stay inline in
/// the row; longer columns store an 8-byte blob id instead.
pub const UNINLINEABLE_OBJECT_LENGTH: usize = 64;

/// Worst-case utf8 expansion for VARCHAR lengths declared in characters.
pub const MAX_BYTES_PER_CHAR: usize = 4;

/// Byte width of an out-of-line column slot (a blob id).
pub const UNINLINED_SLOT_WIDTH: usize = 8;

/// Column description supplied by schema builders.
#[derive(Clone, Debug)]
pub struct ColumnSpec {
    pub name: String,
    pub vtype: ValueType,
    /// Declared length for variable-length types; ignored for
    /// fixed-width types.
    pub length: usize,
    /// VARCHAR length semantics: true for bytes, false for characters.
    pub in_bytes: bool,
}

impl ColumnSpec {
    pub fn new(name: &str, vtype: ValueType) -> ColumnSpec {
        ColumnSpec {
            name: name.to_string(),
            vtype,
            length: 0,
            in_bytes: false,
        }
    }

    pub fn new_varchar(name: &str, length: usize, in_bytes: bool) -> ColumnSpec {
        ColumnSpec {
            name: name.to_string(),
            vtype: ValueType::Varchar,
            length,
            in_bytes,
        }
    }

    pub fn new_varbinary(name: &str, length: usize) -> ColumnSpec {
        ColumnSpec {
            name: name.to_string(),
            vtype: ValueType::Varbinary,
            length,
            in_bytes: true,
        }
    }

    /// Worst-case payload bytes for this column's values.
    pub fn max_bytes(&self) -> usize {
        match self.vtype {
            ValueType::Varchar if !self.in_bytes => self.length * MAX_BYTES_PER_CHAR,
            _ => self.length,
        }
    }
}

/// One column of a materialized schema.
#[derive(Clone, Debug)]
pub struct Column {
    pub name: String,
    pub vtype: ValueType,
    pub length: usize,
    pub in_bytes: bool,
    pub inlined: bool,
    /// Byte offset within the row payload (header excluded).
    pub offset: usize,
    /// Bytes this column occupies in the row payload.
    pub size: usize,
}

impl Column {
    /// Whether a value for `other` can be raw-copied into this column:
    /// same type, declared length and length semantics.
    pub fn matches(&self, other: &Column) -> bool {
        self.vtype == other.vtype && self.length == other.length && self.in_bytes == other.in_bytes
    }
}

/// Immutable row-layout descriptor. Refer to the module documentation.
#[derive(Debug)]
pub struct TupleSchema {
    columns: Vec<Column>,
    visible: usize,
    headerless: bool,
    tuple_length: usize,
    uninlined: Vec<usize>,
}

impl TupleSchema {
    /// Build a schema with a status header, `specs` visible columns and
    /// `hidden` trailing system columns.
    pub fn new(specs: Vec<ColumnSpec>, hidden: Vec<ColumnSpec>) -> Result<Arc<TupleSchema>> {
        Self::build(specs, hidden, false)
    }

    /// Build a headerless index-key schema. Key columns must be
    /// inlineable; keys never carry out-of-line data.
    pub fn new_key(specs: Vec<ColumnSpec>) -> Result<Arc<TupleSchema>> {
        for spec in specs.iter() {
            if spec.vtype.is_variable_length() && spec.max_bytes() > UNINLINEABLE_OBJECT_LENGTH {
                return err_at!(
                    InvalidInput,
                    msg: "key column {} too wide ({})", spec.name, spec.max_bytes()
                );
            }
        }
        Self::build(specs, vec![], true)
    }

    fn build(
        specs: Vec<ColumnSpec>,
        hidden: Vec<ColumnSpec>,
        headerless: bool,
    ) -> Result<Arc<TupleSchema>> {
        let visible = specs.len();
        let mut columns = Vec::with_capacity(visible + hidden.len());
        let mut offset = 0;
        let mut uninlined = vec![];

        for spec in specs.into_iter().chain(hidden.into_iter()) {
            let (inlined, size) = match spec.vtype.fixed_width() {
                Some(w) => (true, w),
                None => {
                    let max = spec.max_bytes();
                    match max <= UNINLINEABLE_OBJECT_LENGTH {
                        true => (true, max + 1),
                        false => (false, UNINLINED_SLOT_WIDTH),
                    }
                }
            };
            if !inlined {
                uninlined.push(columns.len());
            }
            columns.push(Column {
                name: spec.name,
                vtype: spec.vtype,
                length: spec.length,
                in_bytes: spec.in_bytes,
                inlined,
                offset,
                size,
            });
            offset += size;
        }

        if headerless && !uninlined.is_empty() {
            return err_at!(Fatal, msg: "headerless schema with uninlined columns");
        }

        Ok(Arc::new(TupleSchema {
            columns,
            visible,
            headerless,
            tuple_length: offset,
            uninlined,
        }))
    }

    #[inline]
    pub fn column(&self, i: usize) -> &Column {
        &self.columns[i]
    }

    pub fn column_checked(&self, i: usize) -> Result<&Column> {
        match self.columns.get(i) {
            Some(c) => Ok(c),
            None => err_at!(InvalidInput, msg: "column index {}/{}", i, self.columns.len()),
        }
    }

    /// Number of SQL-visible columns.
    #[inline]
    pub fn count_visible(&self) -> usize {
        self.visible
    }

    /// Total columns including hidden ones.
    #[inline]
    pub fn count_all(&self) -> usize {
        self.columns.len()
    }

    /// Payload bytes per row, header excluded.
    #[inline]
    pub fn tuple_length(&self) -> usize {
        self.tuple_length
    }

    /// Full row bytes: payload plus the status header when present.
    #[inline]
    pub fn row_bytes(&self) -> usize {
        match self.headerless {
            true => self.tuple_length,
            false => self.tuple_length + 1,
        }
    }

    #[inline]
    pub fn is_headerless(&self) -> bool {
        self.headerless
    }

    /// Column indexes holding out-of-line data, ascending.
    #[inline]
    pub fn uninlined_columns(&self) -> &[usize] {
        &self.uninlined
    }

    /// Whether rows of `other` are column-wise compatible with rows of
    /// this schema, over visible columns.
    pub fn compatible(&self, other: &TupleSchema) -> bool {
        self.visible == other.visible
            && (0..self.visible).all(|i| self.columns[i].matches(&other.columns[i]))
    }
}

#[cfg(test)]
#[path = "schema_test.rs"]
mod schema_test;
