//! Module implement the per-partition engine: catalog, plan-fragment
//! cache, shared buffers and the host entry points.
//!
//! The engine is strictly single threaded. A fragment executes as one
//! synchronous call: look up (or fetch, decompress and compile) the
//! fragment's executor vector, open an undo quantum, drive the
//! statement lists, serialize the root output into the result buffer.
//! On error the quantum rolls back, temp tables are dropped and the
//! exception buffer carries a 4-byte error code followed by the
//! rendered message.

use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    io::Read,
    rc::Rc,
    sync::{atomic::AtomicBool, atomic::Ordering, Arc},
};

use crate::{
    config::Config,
    exec::{build_vector, dml::ReplicatedCell, ExecCtx, ExecutorVector},
    hasher::Hashinator,
    index::{IndexScheme, TableIndex},
    plan::fragment_from_json,
    schema::TupleSchema,
    table::{Catalog, PersistentTable, StreamedTable, Table, TempLimits, TempTable},
    tuple::{deserialize_tuple_be, deserialize_tuple_le, serialize_tuple_be, OwnedTuple},
    undo::{UndoAction, UndoLog, UndoToken},
    util,
    value::Value,
    Result,
};

/// Host callbacks. The engine blocks synchronously on these; there is
/// no other communication channel to the outside.
pub trait Topend {
    /// Fetch a fragment's plan: base64 over gzip over JSON.
    fn plan_for_fragment(&mut self, fragment_id: i64) -> Result<Vec<u8>>;

    /// Fetch the serialized dependency block for a receive-flavor node.
    fn load_dependency(&mut self, node_id: i32) -> Result<Option<Vec<u8>>>;

    /// Periodic progress tick with the running tuple count.
    fn progress_update(&mut self, tuples_processed: u64);

    /// A binary-log row hit a constraint; the host resolves it.
    fn report_dr_conflict(&mut self, table: &str, row: &[u8]);
}

/// Per-fragment execution counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct FragStats {
    pub executions: u64,
    pub tuples_processed: u64,
}

// Bounded executor-vector cache, least-recently-used eviction. The
// currently executing fragment is never evicted.
struct PlanCache {
    cap: usize,
    map: HashMap<i64, Rc<ExecutorVector>>,
    lru: VecDeque<i64>,
}

impl PlanCache {
    fn new(cap: usize) -> PlanCache {
        PlanCache {
            cap: cap.max(1),
            map: HashMap::new(),
            lru: VecDeque::new(),
        }
    }

    fn touch(&mut self, id: i64) {
        if let Some(at) = self.lru.iter().position(|x| *x == id) {
            self.lru.remove(at);
        }
        self.lru.push_back(id);
    }

    fn get(&mut self, id: i64) -> Option<Rc<ExecutorVector>> {
        let hit = self.map.get(&id).map(Rc::clone);
        if hit.is_some() {
            self.touch(id);
        }
        hit
    }

    fn put(&mut self, id: i64, vector: Rc<ExecutorVector>, protect: i64) {
        while self.map.len() >= self.cap {
            let victim = self
                .lru
                .iter()
                .position(|x| *x != protect)
                .map(|at| self.lru[at]);
            match victim {
                Some(victim) => {
                    self.lru.retain(|x| *x != victim);
                    self.map.remove(&victim);
                }
                None => break,
            }
        }
        self.map.insert(id, vector);
        self.touch(id);
    }
}

/// The per-partition execution engine.
pub struct Engine {
    config: Config,
    catalog: Catalog,
    cache: PlanCache,
    topend: Box<dyn Topend>,
    interrupt: Arc<AtomicBool>,
    undo: UndoLog,
    limits: Rc<RefCell<TempLimits>>,
    hashinator: Hashinator,
    replicated: Option<Arc<ReplicatedCell>>,
    stats: HashMap<i64, FragStats>,
    result_buffer: Vec<u8>,
    exception_buffer: Vec<u8>,
}

impl Engine {
    pub fn new(config: Config, topend: Box<dyn Topend>) -> Engine {
        let limits = Rc::new(RefCell::new(TempLimits::new(
            config.temp_limit_log,
            config.temp_limit_hard,
        )));
        let hashinator = Hashinator::new(config.partition_id, config.partition_count);
        let cache = PlanCache::new(config.plan_cache_size);
        Engine {
            config,
            catalog: Catalog::new(),
            cache,
            topend,
            interrupt: Arc::new(AtomicBool::new(false)),
            undo: UndoLog::new(),
            limits,
            hashinator,
            replicated: None,
            stats: HashMap::new(),
            result_buffer: vec![],
            exception_buffer: vec![],
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Handle the host sets to request cooperative cancellation.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    pub fn set_replicated_cell(&mut self, cell: Arc<ReplicatedCell>) {
        self.replicated = Some(cell);
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    pub fn create_table(
        &mut self,
        name: &str,
        schema: Arc<TupleSchema>,
        partition_col: Option<usize>,
        is_replicated: bool,
    ) -> Result<()> {
        let mut table = PersistentTable::new(name, schema, partition_col, is_replicated);
        if self.config.dr_enabled {
            table.enable_dr();
        }
        self.catalog.add(Table::Persistent(table))
    }

    pub fn create_stream(&mut self, name: &str, schema: Arc<TupleSchema>) -> Result<()> {
        self.catalog.add(Table::Streamed(StreamedTable::new(name, schema)))
    }

    pub fn add_index(&mut self, table: &str, scheme: IndexScheme, is_pk: bool) -> Result<()> {
        self.catalog
            .persistent_mut(table)?
            .add_index(TableIndex::new(scheme), is_pk)
    }

    pub fn stats(&self, fragment_id: i64) -> Option<&FragStats> {
        self.stats.get(&fragment_id)
    }

    /// Result bytes of the last successful entry-point call.
    pub fn results(&self) -> &[u8] {
        &self.result_buffer
    }

    /// Exception bytes of the last failing entry-point call: 4-byte
    /// code then the rendered message.
    pub fn exception(&self) -> &[u8] {
        &self.exception_buffer
    }

    fn raise(&mut self, err: crate::Error) -> i32 {
        self.exception_buffer.clear();
        util::write_i32_be(&mut self.exception_buffer, err.code());
        self.exception_buffer.extend_from_slice(format!("{}", err).as_bytes());
        if matches!(err, crate::Error::Fatal(_, _)) {
            log::error!("fatal engine error: {}", err);
        }
        1
    }

    // fetch, decompress and compile a fragment's plan.
    fn vector_for(&mut self, fragment_id: i64) -> Result<Rc<ExecutorVector>> {
        if let Some(vector) = self.cache.get(fragment_id) {
            return Ok(vector);
        }
        log::debug!("plan cache miss for fragment {}", fragment_id);
        let encoded = self.topend.plan_for_fragment(fragment_id)?;
        let compressed = err_at!(DecodeFail, base64::decode(&encoded))?;
        let mut text = String::new();
        let mut decoder = flate2::read::GzDecoder::new(&compressed[..]);
        err_at!(DecodeFail, decoder.read_to_string(&mut text))?;

        let frag = fragment_from_json(fragment_id, &text)?;
        let catalog = &self.catalog;
        let resolver = |name: &str| -> Result<Arc<TupleSchema>> {
            Ok(Arc::clone(catalog.get(name)?.schema()))
        };
        let vector = Rc::new(build_vector(&frag, &resolver)?);
        self.cache.put(fragment_id, Rc::clone(&vector), fragment_id);
        Ok(vector)
    }

    fn rollback(&mut self, token: UndoToken) -> Result<()> {
        for action in self.undo.take_rollback(token) {
            match action {
                UndoAction::Insert { table, row } => {
                    self.catalog.persistent_mut(&table)?.rollback_insert(row)?;
                }
                UndoAction::Delete { table, values } => {
                    self.catalog.persistent_mut(&table)?.rollback_delete(&values)?;
                }
                UndoAction::Update { table, row, values } => {
                    self.catalog
                        .persistent_mut(&table)?
                        .rollback_update(row, &values)?;
                }
            }
        }
        Ok(())
    }

    fn execute_fragment(&mut self, fragment_id: i64, params: &[Value]) -> Result<()> {
        let vector = self.vector_for(fragment_id)?;
        let token = self.undo.begin_quantum();
        self.interrupt.store(false, Ordering::Relaxed);

        let mut outputs: HashMap<i32, TempTable> = HashMap::new();
        let run = {
            let Engine {
                catalog,
                topend,
                undo,
                hashinator,
                interrupt,
                limits,
                replicated,
                ..
            } = self;
            let mut ctx = ExecCtx {
                params,
                catalog,
                outputs: &mut outputs,
                topend: topend.as_mut(),
                limits: Rc::clone(limits),
                interrupt: &**interrupt,
                undo,
                hashinator,
                replicated: replicated.clone(),
                tuples_processed: 0,
            };
            let res = vector.execute(&mut ctx);
            (res, ctx.tuples_processed)
        };
        let (res, processed) = run;

        match res {
            Ok(()) => {
                let root = vector.root_node()?;
                let result = match outputs.get(&root) {
                    Some(result) => result,
                    None => err_at!(Fatal, msg: "fragment {} lost its root output", fragment_id)?,
                };
                util::write_i32_be(&mut self.result_buffer, result.len() as i32);
                for row in result.iter() {
                    serialize_tuple_be(&row, &mut self.result_buffer)?;
                }
                let entry = self.stats.entry(fragment_id).or_default();
                entry.executions += 1;
                entry.tuples_processed += processed;
                self.undo.release(token);
                Ok(())
            }
            Err(err) => {
                // unwind: temp tables drop here, persistent state rolls
                // back as one quantum.
                drop(outputs);
                self.rollback(token)?;
                Err(err)
            }
        }
    }

    /// Entry point: run plan fragments against this partition. Result
    /// tables serialize into the result buffer starting at
    /// `output_offset`; returns 0 on success, 1 with the exception
    /// buffer populated on error.
    pub fn execute_plan_fragments(
        &mut self,
        fragments: &[(i64, Vec<Value>)],
        output_offset: usize,
    ) -> i32 {
        self.result_buffer.clear();
        self.result_buffer.resize(output_offset, 0);
        self.exception_buffer.clear();

        for (fragment_id, params) in fragments.iter() {
            if let Err(err) = self.execute_fragment(*fragment_id, params) {
                return self.raise(err);
            }
        }
        0
    }

    /// Entry point: bulk-load a wire tuple block (i32 row count, then
    /// network-format tuples) into a table through the full insert
    /// path.
    pub fn load_table(&mut self, table: &str, data: &[u8]) -> Result<usize> {
        let token = self.undo.begin_quantum();
        let res = self.load_table_inner(table, data);
        match res {
            Ok(n) => {
                self.undo.release(token);
                Ok(n)
            }
            Err(err) => {
                self.rollback(token)?;
                Err(err)
            }
        }
    }

    fn load_table_inner(&mut self, table: &str, data: &[u8]) -> Result<usize> {
        let schema = Arc::clone(self.catalog.get(table)?.schema());
        let mut off = 0;
        let count = util::read_i32_be(data, &mut off)?;
        if count < 0 {
            return err_at!(DecodeFail, msg: "negative row count {}", count);
        }
        let target = self.catalog.persistent_mut(table)?;
        let mut n = 0;
        for _ in 0..count {
            let mut row = OwnedTuple::new(Arc::clone(&schema))?;
            deserialize_tuple_be(data, &mut off, &mut row.as_mut())?;
            target.insert_tuple(&row.as_tuple(), Some(&mut self.undo))?;
            n += 1;
        }
        Ok(n)
    }

    /// Entry point: apply one recovery message. Layout: u8 kind (1 =
    /// table scan block), i32 table-name length, the name, then a wire
    /// tuple block as in [Engine::load_table].
    pub fn process_recovery_message(&mut self, msg: &[u8]) -> Result<usize> {
        let mut off = 0;
        let kind = util::read_u8(msg, &mut off)?;
        if kind != 1 {
            return err_at!(DecodeFail, msg: "unknown recovery message kind {}", kind);
        }
        let name_len = util::read_i32_be(msg, &mut off)?;
        if name_len < 0 {
            return err_at!(DecodeFail, msg: "negative name length {}", name_len);
        }
        let name_bytes = util::read_bytes(msg, &mut off, name_len as usize)?;
        let name = err_at!(DecodeFail, std::str::from_utf8(name_bytes))?.to_string();
        self.load_table(&name, &msg[off..])
    }

    /// Entry point: apply a replication binary log. Layout: i32 table
    /// name length, name, i32 record count, then per record a DR op
    /// byte and a little-endian row image. Constraint failures route
    /// through the conflict callback and do not unwind.
    pub fn apply_binary_log(&mut self, log: &[u8]) -> Result<usize> {
        let mut off = 0;
        let name_len = util::read_i32_be(log, &mut off)?;
        if name_len < 0 {
            return err_at!(DecodeFail, msg: "negative name length {}", name_len);
        }
        let name_bytes = util::read_bytes(log, &mut off, name_len as usize)?;
        let name = err_at!(DecodeFail, std::str::from_utf8(name_bytes))?.to_string();
        let count = util::read_i32_be(log, &mut off)?;

        let schema = Arc::clone(self.catalog.get(&name)?.schema());
        let mut applied = 0;
        for _ in 0..count {
            let op = util::read_u8(log, &mut off)?;
            let row_at = off;
            let mut row = OwnedTuple::new(Arc::clone(&schema))?;
            deserialize_tuple_le(log, &mut off, &mut row.as_mut())?;
            let row_image = &log[row_at..off];

            match self.apply_dr_record(&name, op, &row) {
                Ok(()) => applied += 1,
                Err(err) if matches!(err, crate::Error::ConstraintFail(_, _)) => {
                    self.topend.report_dr_conflict(&name, row_image);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(applied)
    }

    fn apply_dr_record(&mut self, table: &str, op: u8, row: &OwnedTuple) -> Result<()> {
        let target = self.catalog.persistent_mut(table)?;
        match op {
            crate::table::DR_INSERT => {
                target.insert_tuple(&row.as_tuple(), None)?;
                Ok(())
            }
            crate::table::DR_DELETE | crate::table::DR_UPDATE => {
                let pk = match target.primary_key() {
                    Some(pk) => pk,
                    None => err_at!(InvalidInput, msg: "dr apply to {} without key", table)?,
                };
                let key = pk.key_for(&row.as_tuple())?;
                let row_id = match pk.get(&key).and_then(|rows| rows.first().copied()) {
                    Some(row_id) => row_id,
                    None => {
                        return err_at!(ConstraintFail, msg: "dr row missing in {}", table);
                    }
                };
                match op {
                    crate::table::DR_DELETE => target.delete_tuple(row_id, None),
                    _ => {
                        let mut staged = OwnedTuple::new(Arc::clone(target.schema()))?;
                        staged.copy_from(&row.as_tuple())?;
                        let all: Vec<usize> = (0..target.schema().count_all()).collect();
                        target.update_tuple(row_id, &staged, &all, None)
                    }
                }
            }
            op => err_at!(DecodeFail, msg: "unknown dr op {}", op),
        }
    }

    /// Drain a table's replication stream for the host.
    pub fn drain_dr(&mut self, table: &str) -> Result<Vec<u8>> {
        match self.catalog.persistent_mut(table)?.dr_stream_mut() {
            Some(stream) => Ok(stream.drain()),
            None => Ok(vec![]),
        }
    }
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;
