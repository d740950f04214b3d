use std::sync::Arc;

use super::*;
use crate::{
    schema::{ColumnSpec, TupleSchema},
    tuple::OwnedTuple,
    value::{Value, ValueType},
};

fn schema() -> Arc<TupleSchema> {
    TupleSchema::new(
        vec![
            ColumnSpec::new("a", ValueType::BigInt),
            ColumnSpec::new_varchar("s", 100, true), // uninlined
        ],
        vec![],
    )
    .unwrap()
}

fn tmpdir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("sqlsite-ltt-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_spill_and_reload() {
    let schema = schema();
    let dir = tmpdir("spill");
    // budget of one resident block forces spilling as blocks fill.
    let mut ltt = LargeTempTable::new("q1", Arc::clone(&schema), &dir, 1);

    let n = 5000_usize; // several 1024-row blocks
    for i in 0..n {
        let mut row = OwnedTuple::new(Arc::clone(&schema)).unwrap();
        row.set_value(0, &Value::BigInt(i as i64)).unwrap();
        row.set_value(1, &Value::varchar(&format!("heap payload for row {}", i))).unwrap();
        ltt.append_tuple(&row.as_tuple()).unwrap();
    }
    assert_eq!(ltt.len(), n);
    assert!(ltt.block_count() >= 4);
    assert!(ltt.resident_blocks() < ltt.block_count(), "nothing spilled");

    // full scan sees every row, in order, with payloads intact.
    let mut seen = 0_usize;
    ltt.for_each(|t| {
        assert_eq!(t.value(0).unwrap(), Value::BigInt(seen as i64));
        assert_eq!(
            t.value(1).unwrap(),
            Value::varchar(&format!("heap payload for row {}", seen))
        );
        seen += 1;
        Ok(())
    })
    .unwrap();
    assert_eq!(seen, n);

    ltt.clear().unwrap();
    assert!(ltt.is_empty());
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_block_files_removed_on_drop() {
    let schema = schema();
    let dir = tmpdir("drop");
    {
        let mut ltt = LargeTempTable::new("q2", Arc::clone(&schema), &dir, 1);
        for i in 0..4000_usize {
            let mut row = OwnedTuple::new(Arc::clone(&schema)).unwrap();
            row.set_value(0, &Value::BigInt(i as i64)).unwrap();
            row.set_value(1, &Value::varchar("x")).unwrap();
            ltt.append_tuple(&row.as_tuple()).unwrap();
        }
        assert!(ltt.resident_blocks() < ltt.block_count());
    }
    let leftovers: Vec<_> = std::fs::read_dir(&dir).unwrap().collect();
    assert!(leftovers.is_empty(), "{:?}", leftovers);
    std::fs::remove_dir_all(&dir).ok();
}
