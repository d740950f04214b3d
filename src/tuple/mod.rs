//! Module implement rows: byte-level layout, views and owned variants.
//!
//! Rows live inside container-owned buffers (table blocks, temp-table
//! arenas, scratch vectors). A [Tuple] is a borrowed view over one
//! row's bytes plus its schema and, when the schema has out-of-line
//! columns, the owning container's [BlobStore]. Byte 0 of a row is the
//! status header bitmap unless the schema is headerless.
//!
//! Out-of-line values are stored as an 8-byte blob id into the owning
//! container's store; id 0 encodes NULL. Copying a row between
//! containers re-homes every blob id into the destination store, which
//! is what keeps tuple bytes freely memcpy-able within one container.

use std::{cmp::Ordering, convert::TryInto, hash::Hasher, rc::Rc, sync::Arc};

use crate::{
    hasher::city64,
    schema::{Column, TupleSchema},
    value::{self, Value, ValueType},
    Result,
};

mod wire;

pub use wire::{
    deserialize_tuple_be, deserialize_tuple_le, serialize_tuple_be, serialize_tuple_le,
};

pub const ACTIVE_MASK: u8 = 1;
pub const DIRTY_MASK: u8 = 2;
pub const PENDING_DELETE_MASK: u8 = 4;
pub const PENDING_DELETE_ON_UNDO_RELEASE_MASK: u8 = 8;

/// Inline variable-length null marker, stored in the length byte.
const INLINE_NULL_LENGTH: u8 = 0xFF;

/// Address of a row within its persistent table: block and slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(pub u64);

impl RowId {
    pub fn new(block: u32, slot: u32) -> RowId {
        RowId(((block as u64) << 32) | (slot as u64))
    }

    #[inline]
    pub fn block(&self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    pub fn slot(&self) -> u32 {
        self.0 as u32
    }
}

/// Slab of reference-counted payloads backing a container's
/// out-of-line columns. Ids are 1-based; 0 encodes NULL.
#[derive(Default, Debug)]
pub struct BlobStore {
    slots: Vec<Option<Rc<[u8]>>>,
    free: Vec<usize>,
    bytes: usize,
}

impl BlobStore {
    pub fn new() -> BlobStore {
        BlobStore::default()
    }

    pub fn put(&mut self, blob: Rc<[u8]>) -> u64 {
        self.bytes += blob.len();
        match self.free.pop() {
            Some(i) => {
                self.slots[i] = Some(blob);
                (i as u64) + 1
            }
            None => {
                self.slots.push(Some(blob));
                self.slots.len() as u64
            }
        }
    }

    pub fn get(&self, id: u64) -> Result<&Rc<[u8]>> {
        match self.slots.get((id as usize).wrapping_sub(1)) {
            Some(Some(blob)) => Ok(blob),
            _ => err_at!(Fatal, msg: "dangling blob id {}", id),
        }
    }

    pub fn remove(&mut self, id: u64) -> Result<Rc<[u8]>> {
        let i = (id as usize).wrapping_sub(1);
        match self.slots.get_mut(i).and_then(|s| s.take()) {
            Some(blob) => {
                self.bytes -= blob.len();
                self.free.push(i);
                Ok(blob)
            }
            None => err_at!(Fatal, msg: "dangling blob id {}", id),
        }
    }

    /// Bytes held across all live blobs.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Live blobs in ascending id order. Spill/reload paths depend on
    /// re-inserting these in order reproducing the same ids.
    pub fn export(&self) -> Vec<(u64, Rc<[u8]>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|b| ((i as u64) + 1, Rc::clone(b))))
            .collect()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.bytes = 0;
    }
}

// Enforce the declared column width on a variable-length value.
fn check_width(col: &Column, value: &Value) -> Result<()> {
    match (col.vtype, value) {
        (ValueType::Varchar, Value::Varchar(s)) => {
            let n = match col.in_bytes {
                true => s.len(),
                false => s.chars().count(),
            };
            if n > col.length {
                err_at!(
                    WidthMismatch,
                    msg: "varchar length {} exceeds {} for {}", n, col.length, col.name
                )
            } else {
                Ok(())
            }
        }
        (ValueType::Varbinary, Value::Varbinary(b)) if b.len() > col.length => {
            err_at!(
                WidthMismatch,
                msg: "varbinary length {} exceeds {} for {}", b.len(), col.length, col.name
            )
        }
        _ => Ok(()),
    }
}

// Payload-level field write; casts the value to the column type first,
// so overflow/underflow/width errors surface from here.
pub(crate) fn write_field(
    payload: &mut [u8],
    col: &Column,
    mut blobs: Option<&mut BlobStore>,
    value: &Value,
) -> Result<()> {
    let value = match value.vtype() == col.vtype {
        true => value.clone(),
        false => value.cast_to(col.vtype)?,
    };
    let at = col.offset;

    if col.vtype.is_variable_length() {
        check_width(col, &value)?;
        let bytes: Option<Vec<u8>> = match &value {
            Value::Null(_) => None,
            Value::Varchar(s) => Some(s.as_bytes().to_vec()),
            Value::Varbinary(b) => Some(b.to_vec()),
            Value::Polygon(_) => {
                let mut buf = vec![];
                value::write_value_be(&mut buf, ValueType::Polygon, &value)?;
                Some(buf)
            }
            _ => err_at!(Fatal, msg: "variable-length {}", value.vtype().to_name())?,
        };
        if col.inlined {
            match bytes {
                None => payload[at] = INLINE_NULL_LENGTH,
                Some(data) => {
                    payload[at] = data.len() as u8;
                    payload[at + 1..at + 1 + data.len()].copy_from_slice(&data);
                }
            }
        } else {
            let store = match blobs.as_mut() {
                Some(store) => store,
                None => err_at!(Fatal, msg: "no blob store for column {}", col.name)?,
            };
            let old = u64::from_le_bytes(payload[at..at + 8].try_into().unwrap());
            if old != 0 {
                store.remove(old)?;
            }
            let id = match bytes {
                None => 0,
                Some(data) => store.put(Rc::from(data.as_slice())),
            };
            payload[at..at + 8].copy_from_slice(&id.to_le_bytes());
        }
        return Ok(());
    }

    match col.vtype {
        ValueType::TinyInt => {
            let n = match &value {
                Value::Null(_) => i8::MIN,
                v => v.as_bigint()? as i8,
            };
            payload[at] = n as u8;
        }
        ValueType::Boolean => {
            payload[at] = match &value {
                Value::Null(_) => 0x80,
                v => v.is_true() as u8,
            };
        }
        ValueType::SmallInt => {
            let n = match &value {
                Value::Null(_) => i16::MIN,
                v => v.as_bigint()? as i16,
            };
            payload[at..at + 2].copy_from_slice(&n.to_le_bytes());
        }
        ValueType::Integer => {
            let n = match &value {
                Value::Null(_) => i32::MIN,
                v => v.as_bigint()? as i32,
            };
            payload[at..at + 4].copy_from_slice(&n.to_le_bytes());
        }
        ValueType::BigInt | ValueType::Timestamp => {
            let n = match &value {
                Value::Null(_) => i64::MIN,
                v => v.as_bigint()?,
            };
            payload[at..at + 8].copy_from_slice(&n.to_le_bytes());
        }
        ValueType::Address => {
            let n = match &value {
                Value::Null(_) => u64::MAX,
                Value::Address(a) => *a,
                v => err_at!(Fatal, msg: "address from {}", v.vtype().to_name())?,
            };
            payload[at..at + 8].copy_from_slice(&n.to_le_bytes());
        }
        ValueType::Double => {
            let f = match &value {
                Value::Null(_) => value::DOUBLE_NULL,
                v => v.as_double()?,
            };
            payload[at..at + 8].copy_from_slice(&f.to_le_bytes());
        }
        ValueType::Decimal => {
            let d = match &value {
                Value::Null(_) => i128::MIN,
                v => v.as_decimal()?,
            };
            payload[at..at + 16].copy_from_slice(&d.to_le_bytes());
        }
        ValueType::Point => {
            let (lat, lng) = match &value {
                Value::Null(_) => (f64::NAN, f64::NAN),
                Value::Point(p) => (p.lat, p.lng),
                v => err_at!(Fatal, msg: "point from {}", v.vtype().to_name())?,
            };
            payload[at..at + 8].copy_from_slice(&lat.to_le_bytes());
            payload[at + 8..at + 16].copy_from_slice(&lng.to_le_bytes());
        }
        _ => err_at!(Fatal, msg: "cannot store {}", col.vtype.to_name())?,
    }
    Ok(())
}

pub(crate) fn read_field(
    payload: &[u8],
    col: &Column,
    blobs: Option<&BlobStore>,
) -> Result<Value> {
    let at = col.offset;

    if col.vtype.is_variable_length() {
        let bytes: Option<Vec<u8>> = if col.inlined {
            match payload[at] {
                INLINE_NULL_LENGTH => None,
                n => Some(payload[at + 1..at + 1 + (n as usize)].to_vec()),
            }
        } else {
            let id = u64::from_le_bytes(payload[at..at + 8].try_into().unwrap());
            match id {
                0 => None,
                id => {
                    let store = match blobs {
                        Some(store) => store,
                        None => err_at!(Fatal, msg: "no blob store for column {}", col.name)?,
                    };
                    Some(store.get(id)?.to_vec())
                }
            }
        };
        let value = match bytes {
            None => Value::Null(col.vtype),
            Some(data) => match col.vtype {
                ValueType::Varchar => {
                    let s = err_at!(DecodeFail, std::str::from_utf8(&data))?;
                    Value::Varchar(Rc::from(s))
                }
                ValueType::Varbinary => Value::Varbinary(Rc::from(data.as_slice())),
                ValueType::Polygon => {
                    let mut off = 0;
                    value::read_value_be(&data, &mut off, ValueType::Polygon)?
                }
                _ => err_at!(Fatal, msg: "variable-length {}", col.vtype.to_name())?,
            },
        };
        return Ok(value);
    }

    let value = match col.vtype {
        ValueType::TinyInt => match payload[at] as i8 {
            i8::MIN => Value::Null(col.vtype),
            n => Value::TinyInt(n),
        },
        ValueType::Boolean => match payload[at] {
            0x80 => Value::Null(col.vtype),
            n => Value::Boolean(n != 0),
        },
        ValueType::SmallInt => {
            match i16::from_le_bytes(payload[at..at + 2].try_into().unwrap()) {
                i16::MIN => Value::Null(col.vtype),
                n => Value::SmallInt(n),
            }
        }
        ValueType::Integer => {
            match i32::from_le_bytes(payload[at..at + 4].try_into().unwrap()) {
                i32::MIN => Value::Null(col.vtype),
                n => Value::Integer(n),
            }
        }
        ValueType::BigInt => {
            match i64::from_le_bytes(payload[at..at + 8].try_into().unwrap()) {
                i64::MIN => Value::Null(col.vtype),
                n => Value::BigInt(n),
            }
        }
        ValueType::Timestamp => {
            match i64::from_le_bytes(payload[at..at + 8].try_into().unwrap()) {
                i64::MIN => Value::Null(col.vtype),
                n => Value::Timestamp(n),
            }
        }
        ValueType::Address => {
            match u64::from_le_bytes(payload[at..at + 8].try_into().unwrap()) {
                u64::MAX => Value::Null(col.vtype),
                n => Value::Address(n),
            }
        }
        ValueType::Double => {
            let f = f64::from_le_bytes(payload[at..at + 8].try_into().unwrap());
            match f == value::DOUBLE_NULL {
                true => Value::Null(col.vtype),
                false => Value::Double(f),
            }
        }
        ValueType::Decimal => {
            match i128::from_le_bytes(payload[at..at + 16].try_into().unwrap()) {
                i128::MIN => Value::Null(col.vtype),
                d => Value::Decimal(d),
            }
        }
        ValueType::Point => {
            let lat = f64::from_le_bytes(payload[at..at + 8].try_into().unwrap());
            let lng = f64::from_le_bytes(payload[at + 8..at + 16].try_into().unwrap());
            match lat.is_nan() {
                true => Value::Null(col.vtype),
                false => Value::Point(value::GeoPoint { lat, lng }),
            }
        }
        _ => err_at!(Fatal, msg: "cannot load {}", col.vtype.to_name())?,
    };
    Ok(value)
}

/// Borrowed read view over one row.
#[derive(Clone, Copy)]
pub struct Tuple<'a> {
    bytes: &'a [u8],
    schema: &'a TupleSchema,
    blobs: Option<&'a BlobStore>,
}

impl<'a> Tuple<'a> {
    pub fn new(bytes: &'a [u8], schema: &'a TupleSchema, blobs: Option<&'a BlobStore>) -> Tuple<'a> {
        Tuple { bytes, schema, blobs }
    }

    #[inline]
    pub fn schema(&self) -> &TupleSchema {
        self.schema
    }

    #[inline]
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    #[inline]
    pub(crate) fn blob_store(&self) -> Option<&'a BlobStore> {
        self.blobs
    }

    /// Column payload bytes, header excluded.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        match self.schema.is_headerless() {
            true => self.bytes,
            false => &self.bytes[1..],
        }
    }

    #[inline]
    fn header(&self) -> u8 {
        match self.schema.is_headerless() {
            true => ACTIVE_MASK,
            false => self.bytes[0],
        }
    }

    pub fn is_active(&self) -> bool {
        self.header() & ACTIVE_MASK != 0
    }

    pub fn is_dirty(&self) -> bool {
        self.header() & DIRTY_MASK != 0
    }

    pub fn is_pending_delete(&self) -> bool {
        self.header() & PENDING_DELETE_MASK != 0
    }

    pub fn is_pending_delete_on_undo_release(&self) -> bool {
        self.header() & PENDING_DELETE_ON_UNDO_RELEASE_MASK != 0
    }

    pub fn value(&self, col: usize) -> Result<Value> {
        read_field(self.payload(), self.schema.column_checked(col)?, self.blobs)
    }

    pub fn is_null(&self, col: usize) -> Result<bool> {
        Ok(self.value(col)?.is_null())
    }

    /// Visible column values, left to right.
    pub fn values(&self) -> Result<Vec<Value>> {
        (0..self.schema.count_visible()).map(|i| self.value(i)).collect()
    }

    /// Hash over the named columns' canonical value images.
    pub fn hash_columns(&self, cols: &[usize]) -> Result<u64> {
        let mut buf = vec![];
        for col in cols.iter() {
            self.value(*col)?.hash_bytes(&mut buf);
        }
        Ok(city64(&buf))
    }

    pub fn hash_code(&self) -> Result<u64> {
        let cols: Vec<usize> = (0..self.schema.count_visible()).collect();
        self.hash_columns(&cols)
    }

    /// Column-wise ordering over visible columns, nulls first.
    pub fn compare(&self, other: &Tuple) -> Result<Ordering> {
        for i in 0..self.schema.count_visible() {
            let ord = self.value(i)?.cmp_nulls_first(&other.value(i)?)?;
            if ord != Ordering::Equal {
                return Ok(ord);
            }
        }
        Ok(Ordering::Equal)
    }

    /// As [Tuple::compare] with nulls sorting above every value.
    pub fn compare_null_as_max(&self, other: &Tuple) -> Result<Ordering> {
        for i in 0..self.schema.count_visible() {
            let ord = self.value(i)?.cmp_nulls_max(&other.value(i)?)?;
            if ord != Ordering::Equal {
                return Ok(ord);
            }
        }
        Ok(Ordering::Equal)
    }

    /// Visible-column equality without requiring the same schema object.
    pub fn equals(&self, other: &Tuple) -> Result<bool> {
        if self.schema.count_visible() != other.schema().count_visible() {
            return Ok(false);
        }
        for i in 0..self.schema.count_visible() {
            if !self.value(i)?.op_not_distinct(&other.value(i)?)?.is_true() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Equality including hidden columns.
    pub fn equals_with_hidden(&self, other: &Tuple) -> Result<bool> {
        if self.schema.count_all() != other.schema().count_all() {
            return Ok(false);
        }
        for i in 0..self.schema.count_all() {
            if !self.value(i)?.op_not_distinct(&other.value(i)?)?.is_true() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Borrowed write view over one row.
pub struct TupleMut<'a> {
    bytes: &'a mut [u8],
    schema: &'a TupleSchema,
    blobs: Option<&'a mut BlobStore>,
}

impl<'a> TupleMut<'a> {
    pub fn new(
        bytes: &'a mut [u8],
        schema: &'a TupleSchema,
        blobs: Option<&'a mut BlobStore>,
    ) -> TupleMut<'a> {
        TupleMut { bytes, schema, blobs }
    }

    #[inline]
    pub fn schema(&self) -> &TupleSchema {
        self.schema
    }

    #[inline]
    fn header_offset(&self) -> Option<usize> {
        match self.schema.is_headerless() {
            true => None,
            false => Some(0),
        }
    }

    pub fn set_header_bit(&mut self, mask: u8, on: bool) {
        if let Some(at) = self.header_offset() {
            match on {
                true => self.bytes[at] |= mask,
                false => self.bytes[at] &= !mask,
            }
        }
    }

    pub fn set_active(&mut self, on: bool) {
        self.set_header_bit(ACTIVE_MASK, on)
    }

    pub fn set_dirty(&mut self, on: bool) {
        self.set_header_bit(DIRTY_MASK, on)
    }

    pub fn set_pending_delete(&mut self, on: bool) {
        self.set_header_bit(PENDING_DELETE_MASK, on)
    }

    pub fn set_pending_delete_on_undo_release(&mut self, on: bool) {
        self.set_header_bit(PENDING_DELETE_ON_UNDO_RELEASE_MASK, on)
    }

    pub fn set_value(&mut self, col: usize, value: &Value) -> Result<()> {
        let column = self.schema.column_checked(col)?;
        let payload = match self.schema.is_headerless() {
            true => &mut self.bytes[..],
            false => &mut self.bytes[1..],
        };
        write_field(payload, column, self.blobs.as_deref_mut(), value)
    }

    pub fn set_all_nulls(&mut self) -> Result<()> {
        for i in 0..self.schema.count_all() {
            let vtype = self.schema.column(i).vtype;
            self.set_value(i, &Value::Null(vtype))?;
        }
        Ok(())
    }

    pub fn value(&self, col: usize) -> Result<Value> {
        let payload = match self.schema.is_headerless() {
            true => &self.bytes[..],
            false => &self.bytes[1..],
        };
        read_field(payload, self.schema.column_checked(col)?, self.blobs.as_deref())
    }
}

/// Standalone scratch row: DML staging, output assembly, null tuples.
pub struct OwnedTuple {
    data: Vec<u8>,
    schema: Arc<TupleSchema>,
    blobs: BlobStore,
}

impl OwnedTuple {
    /// A fresh active row with every column null.
    pub fn new(schema: Arc<TupleSchema>) -> Result<OwnedTuple> {
        let mut ot = OwnedTuple {
            data: vec![0; schema.row_bytes()],
            schema,
            blobs: BlobStore::new(),
        };
        {
            let mut tm = ot.as_mut();
            tm.set_all_nulls()?;
            tm.set_active(true);
        }
        Ok(ot)
    }

    pub fn schema(&self) -> &Arc<TupleSchema> {
        &self.schema
    }

    pub fn as_tuple(&self) -> Tuple {
        Tuple::new(&self.data, &self.schema, Some(&self.blobs))
    }

    pub fn as_mut(&mut self) -> TupleMut {
        TupleMut::new(&mut self.data, &self.schema, Some(&mut self.blobs))
    }

    /// Mutable column payload bytes, header excluded. Raw-copy callers
    /// must keep the schema's layout invariants intact.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        match self.schema.is_headerless() {
            true => &mut self.data[..],
            false => &mut self.data[1..],
        }
    }

    pub fn set_value(&mut self, col: usize, value: &Value) -> Result<()> {
        self.as_mut().set_value(col, value)
    }

    pub fn value(&self, col: usize) -> Result<Value> {
        self.as_tuple().value(col)
    }

    /// Copy a source row into this scratch, re-homing blobs.
    pub fn copy_from(&mut self, src: &Tuple) -> Result<()> {
        copy_row(&mut self.data, &mut self.blobs, &self.schema, src)
    }
}

/// Copy `src` into a destination row buffer owned by another container,
/// re-homing out-of-line payloads into `dst_blobs`. The destination
/// buffer must already be `schema.row_bytes()` long.
pub fn copy_row(
    dst: &mut [u8],
    dst_blobs: &mut BlobStore,
    schema: &TupleSchema,
    src: &Tuple,
) -> Result<()> {
    // drop blobs the destination row currently points at.
    release_row_blobs(dst, schema, dst_blobs)?;
    dst.copy_from_slice(src.bytes());

    let base = match schema.is_headerless() {
        true => 0,
        false => 1,
    };
    for col in schema.uninlined_columns().iter() {
        let column = schema.column(*col);
        let at = base + column.offset;
        let id = u64::from_le_bytes(dst[at..at + 8].try_into().unwrap());
        let new_id = match id {
            0 => 0,
            id => {
                let store = match src.blob_store() {
                    Some(store) => store,
                    None => err_at!(Fatal, msg: "source row without blob store")?,
                };
                dst_blobs.put(Rc::clone(store.get(id)?))
            }
        };
        dst[at..at + 8].copy_from_slice(&new_id.to_le_bytes());
    }
    Ok(())
}

/// Release every blob a row references and zero the ids. The free
/// half of the "free non-inlined columns" contract; containers call it
/// on delete and bulk clear.
pub fn release_row_blobs(
    row: &mut [u8],
    schema: &TupleSchema,
    blobs: &mut BlobStore,
) -> Result<()> {
    let base = match schema.is_headerless() {
        true => 0,
        false => 1,
    };
    for col in schema.uninlined_columns().iter() {
        let column = schema.column(*col);
        let at = base + column.offset;
        let id = u64::from_le_bytes(row[at..at + 8].try_into().unwrap());
        if id != 0 {
            blobs.remove(id)?;
            row[at..at + 8].copy_from_slice(&0u64.to_le_bytes());
        }
    }
    Ok(())
}

/// Owned, headerless, inline-only index key. Ordered column-wise with
/// nulls first, hashable over canonical value images.
#[derive(Clone)]
pub struct KeyTuple {
    data: Vec<u8>,
    schema: Arc<TupleSchema>,
}

impl KeyTuple {
    /// A fresh all-null key.
    pub fn new(schema: Arc<TupleSchema>) -> Result<KeyTuple> {
        let mut kt = KeyTuple {
            data: vec![0; schema.row_bytes()],
            schema,
        };
        kt.set_all_nulls()?;
        Ok(kt)
    }

    pub fn schema(&self) -> &Arc<TupleSchema> {
        &self.schema
    }

    pub fn set_all_nulls(&mut self) -> Result<()> {
        let mut tm = TupleMut::new(&mut self.data, &self.schema, None);
        tm.set_all_nulls()
    }

    /// Set a key field; cast failures (overflow, underflow, width
    /// mismatch) surface to the caller, which decides how the scan
    /// degrades.
    pub fn set_value(&mut self, col: usize, value: &Value) -> Result<()> {
        let mut tm = TupleMut::new(&mut self.data, &self.schema, None);
        tm.set_value(col, value)
    }

    /// Truncate a too-long variable-length value to the column width and
    /// store the prefix. Used when a search key overflows the declared
    /// width and the scan degrades to a prefix probe.
    pub fn shrink_set_value(&mut self, col: usize, value: &Value) -> Result<()> {
        let column = self.schema.column_checked(col)?.clone();
        let shrunk = match value {
            Value::Varchar(s) => {
                let take = match column.in_bytes {
                    true => {
                        let mut n = column.length.min(s.len());
                        while !s.is_char_boundary(n) {
                            n -= 1;
                        }
                        n
                    }
                    false => s
                        .char_indices()
                        .nth(column.length)
                        .map(|(i, _)| i)
                        .unwrap_or_else(|| s.len()),
                };
                Value::varchar(&s[..take])
            }
            Value::Varbinary(b) => Value::varbinary(&b[..column.length.min(b.len())]),
            v => v.clone(),
        };
        self.set_value(col, &shrunk)
    }

    pub fn value(&self, col: usize) -> Result<Value> {
        let t = Tuple::new(&self.data, &self.schema, None);
        t.value(col)
    }

    pub fn is_null(&self, col: usize) -> Result<bool> {
        Ok(self.value(col)?.is_null())
    }

    pub fn as_tuple(&self) -> Tuple {
        Tuple::new(&self.data, &self.schema, None)
    }

    // Compare over the shared column prefix: a partial-covering probe
    // key compares equal to every full key that matches its prefix,
    // which is what lets cursors seek on leading key columns.
    fn cmp_checked(&self, other: &KeyTuple) -> Result<Ordering> {
        let n = self.schema.count_visible().min(other.schema.count_visible());
        for i in 0..n {
            let ord = self.value(i)?.cmp_nulls_first(&other.value(i)?)?;
            if ord != Ordering::Equal {
                return Ok(ord);
            }
        }
        Ok(Ordering::Equal)
    }
}

impl PartialEq for KeyTuple {
    fn eq(&self, other: &KeyTuple) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyTuple {}

impl PartialOrd for KeyTuple {
    fn partial_cmp(&self, other: &KeyTuple) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyTuple {
    // Keys within one index share a schema; comparison cannot fail
    // there. A corrupted key degrades to Equal rather than panicking
    // mid-scan.
    fn cmp(&self, other: &KeyTuple) -> Ordering {
        self.cmp_checked(other).unwrap_or(Ordering::Equal)
    }
}

impl std::hash::Hash for KeyTuple {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut buf = vec![];
        for i in 0..self.schema.count_visible() {
            if let Ok(v) = self.value(i) {
                v.hash_bytes(&mut buf);
            }
        }
        state.write(&buf);
    }
}

impl std::fmt::Debug for KeyTuple {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Key[")?;
        for i in 0..self.schema.count_visible() {
            if i > 0 {
                write!(f, ",")?;
            }
            match self.value(i) {
                Ok(v) => write!(f, "{}", v)?,
                Err(_) => write!(f, "?")?,
            }
        }
        write!(f, "]")
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
