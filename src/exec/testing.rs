//! Shared fixtures for executor tests.

use std::{
    cell::RefCell,
    collections::HashMap,
    io::Write,
    rc::Rc,
    sync::{atomic::AtomicBool, Arc},
};

use crate::{
    engine::Topend,
    exec::ExecCtx,
    expr::Expr,
    hasher::Hashinator,
    index::{IndexScheme, TableIndex},
    schema::{ColumnSpec, TupleSchema},
    table::{Catalog, PersistentTable, SharedLimits, Table, TempLimits, TempTable},
    tuple::OwnedTuple,
    undo::UndoLog,
    value::{Value, ValueType},
    Result,
};

pub(crate) struct TestTopend {
    pub plans: HashMap<i64, String>,
    pub deps: HashMap<i32, Vec<u8>>,
    /// Shared so callers keep a handle after boxing the topend.
    pub conflicts: Rc<RefCell<Vec<(String, Vec<u8>)>>>,
    pub fetches: Rc<RefCell<u64>>,
    pub progress: u64,
}

impl TestTopend {
    pub fn new() -> TestTopend {
        TestTopend {
            plans: HashMap::new(),
            deps: HashMap::new(),
            conflicts: Rc::new(RefCell::new(vec![])),
            fetches: Rc::new(RefCell::new(0)),
            progress: 0,
        }
    }
}

impl Topend for TestTopend {
    fn plan_for_fragment(&mut self, fragment_id: i64) -> Result<Vec<u8>> {
        *self.fetches.borrow_mut() += 1;
        match self.plans.get(&fragment_id) {
            Some(text) => Ok(encode_plan(text)),
            None => err_at!(InvalidInput, msg: "no plan for fragment {}", fragment_id),
        }
    }

    fn load_dependency(&mut self, node_id: i32) -> Result<Option<Vec<u8>>> {
        Ok(self.deps.get(&node_id).cloned())
    }

    fn progress_update(&mut self, tuples_processed: u64) {
        self.progress = tuples_processed;
    }

    fn report_dr_conflict(&mut self, table: &str, row: &[u8]) {
        self.conflicts.borrow_mut().push((table.to_string(), row.to_vec()));
    }
}

/// gzip + base64, the shape plans arrive in from the host.
pub(crate) fn encode_plan(text: &str) -> Vec<u8> {
    let mut gz = flate2::write::GzEncoder::new(vec![], flate2::Compression::default());
    gz.write_all(text.as_bytes()).unwrap();
    base64::encode(gz.finish().unwrap()).into_bytes()
}

/// Owns everything an [ExecCtx] borrows.
pub(crate) struct TestEnv {
    pub params: Vec<Value>,
    pub catalog: Catalog,
    pub outputs: HashMap<i32, TempTable>,
    pub topend: TestTopend,
    pub limits: SharedLimits,
    pub interrupt: AtomicBool,
    pub undo: UndoLog,
    pub hashinator: Hashinator,
}

impl TestEnv {
    pub fn new() -> TestEnv {
        TestEnv {
            params: vec![],
            catalog: Catalog::new(),
            outputs: HashMap::new(),
            topend: TestTopend::new(),
            limits: Rc::new(RefCell::new(TempLimits::default())),
            interrupt: AtomicBool::new(false),
            undo: UndoLog::new(),
            hashinator: Hashinator::new(0, 1),
        }
    }

    pub fn ctx(&mut self) -> ExecCtx {
        ExecCtx {
            params: &self.params,
            catalog: &mut self.catalog,
            outputs: &mut self.outputs,
            topend: &mut self.topend,
            limits: Rc::clone(&self.limits),
            interrupt: &self.interrupt,
            undo: &mut self.undo,
            hashinator: &self.hashinator,
            replicated: None,
            tuples_processed: 0,
        }
    }
}

pub(crate) fn bigint_schema(n: usize) -> Arc<TupleSchema> {
    let specs = (0..n)
        .map(|i| ColumnSpec::new(&format!("c{}", i), ValueType::BigInt))
        .collect();
    TupleSchema::new(specs, vec![]).unwrap()
}

/// Temp table of BIGINT rows; `None` cells are NULL.
pub(crate) fn bigint_rows(schema: &Arc<TupleSchema>, rows: &[Vec<Option<i64>>]) -> TempTable {
    let mut out = TempTable::new(Arc::clone(schema), None);
    for row in rows.iter() {
        let values: Vec<Value> = row
            .iter()
            .map(|v| match v {
                Some(n) => Value::BigInt(*n),
                None => Value::Null(ValueType::BigInt),
            })
            .collect();
        out.append_values(&values).unwrap();
    }
    out
}

/// Materialize a temp table back into `Option<i64>` rows.
pub(crate) fn rows_of(table: &TempTable) -> Vec<Vec<Option<i64>>> {
    table
        .iter()
        .map(|t| {
            (0..t.schema().count_visible())
                .map(|i| match t.value(i).unwrap() {
                    Value::Null(_) => None,
                    v => Some(v.as_bigint().unwrap()),
                })
                .collect()
        })
        .collect()
}

/// BIGINT persistent table `name` with a unique ordered index `pk` on
/// column 0, loaded with `rows`.
pub(crate) fn table_with_pk(name: &str, cols: usize, rows: &[Vec<i64>]) -> PersistentTable {
    let schema = bigint_schema(cols);
    let mut table = PersistentTable::new(name, Arc::clone(&schema), None, false);
    let pk_name = format!("{}_pk", name);
    let scheme = IndexScheme::new(&pk_name, &schema, vec![0], true, false, None).unwrap();
    table.add_index(TableIndex::new(scheme), true).unwrap();
    for row in rows.iter() {
        let mut t = OwnedTuple::new(Arc::clone(&schema)).unwrap();
        for (i, v) in row.iter().enumerate() {
            t.set_value(i, &Value::BigInt(*v)).unwrap();
        }
        table.insert_tuple(&t.as_tuple(), None).unwrap();
    }
    table
}

pub(crate) fn add_table(env: &mut TestEnv, table: PersistentTable) {
    env.catalog.add(Table::Persistent(table)).unwrap();
}

pub(crate) fn col(side: usize, col: usize) -> Expr {
    Expr::TupleValue { side, col }
}

pub(crate) fn lit(n: i64) -> Expr {
    Expr::Constant(Value::BigInt(n))
}
