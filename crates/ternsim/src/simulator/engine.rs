use super::poke::{lookup, poke};
use super::store::{Shadow, Store};
use super::{SimError, SimulatorOptions};
use crate::bitvec::{BitVec, Ternary};
use crate::circuit::{Block, Design, Statement};
use crate::prim::{Graph, ModuleId, NodeId, PrimKind};
use crate::value::Value;
use crate::HashMap;
use indexmap::IndexSet;

/// A schedulable piece of logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Unit {
    Continuous { module: ModuleId, storage: NodeId },
    Combinational { module: ModuleId, storage: NodeId },
    Clocked { module: ModuleId, clock: NodeId },
    AsyncReset {
        module: ModuleId,
        clock: NodeId,
        reset: NodeId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Rising,
    /// An unknown value was involved; the signal may have risen.
    Possible,
    None,
}

fn classify(previous: Option<Ternary>, current: Ternary) -> Edge {
    match (previous, current) {
        (Some(Ternary::False), Ternary::True) => Edge::Rising,
        (Some(Ternary::False), Ternary::Unknown) | (Some(Ternary::Unknown), Ternary::True) => {
            Edge::Possible
        }
        _ => Edge::None,
    }
}

/// Value store plus the work queues that drive it to a fixed point.
pub(crate) struct Engine {
    pub(crate) design: Design,
    pub(crate) store: Store,
    pub(crate) time: u64,
    options: SimulatorOptions,
    assign_queue: IndexSet<Unit>,
    comb_queue: IndexSet<Unit>,
    clocked_queue: IndexSet<Unit>,
    /// Storage to the units that read it.
    deps: HashMap<NodeId, Vec<Unit>>,
    /// Last sampled level of every edge-triggering signal.
    last_levels: HashMap<NodeId, Ternary>,
    /// Storages changed since the last [`Engine::take_changed`].
    changed: IndexSet<NodeId>,
}

impl Engine {
    pub(crate) fn new(design: Design, options: SimulatorOptions) -> Self {
        let deps = index_dependencies(&design);
        Self {
            design,
            store: Store::default(),
            time: 0,
            options,
            assign_queue: IndexSet::new(),
            comb_queue: IndexSet::new(),
            clocked_queue: IndexSet::new(),
            deps,
            last_levels: HashMap::default(),
            changed: IndexSet::new(),
        }
    }

    pub(crate) fn graph(&self) -> &Graph {
        &self.design.graph
    }

    pub(crate) fn options(&self) -> &SimulatorOptions {
        &self.options
    }

    pub(crate) fn has_work(&self) -> bool {
        !(self.assign_queue.is_empty() && self.comb_queue.is_empty() && self.clocked_queue.is_empty())
    }

    pub(crate) fn eval(&self, expr: NodeId) -> Result<Value, SimError> {
        Ok(self.design.graph.eval(expr, &lookup(&self.store))?)
    }

    pub(crate) fn eval_bits(&self, expr: NodeId) -> Result<BitVec, SimError> {
        Ok(self.eval(expr)?.into_bits())
    }

    /// Drives `lvalue` from outside the design. Takes effect immediately.
    pub(crate) fn poke(&mut self, lvalue: NodeId, value: &Value) -> Result<(), SimError> {
        let mut shadow = Shadow::default();
        poke(&self.design.graph, &self.store, &mut shadow, lvalue, value, false)?;
        self.commit(shadow);
        Ok(())
    }

    pub(crate) fn take_changed(&mut self) -> Vec<NodeId> {
        self.changed.drain(..).collect()
    }

    /// Clears every storage to X, runs the initial blocks and settles.
    pub(crate) fn reset(&mut self) -> Result<(), SimError> {
        log::debug!("reset at time {}", self.time);
        self.store.reset(&self.design.graph);
        self.assign_queue.clear();
        self.comb_queue.clear();
        self.clocked_queue.clear();
        self.last_levels.clear();
        self.changed.clear();

        for circuit in self.design.circuits.values() {
            for block in circuit.initial.values() {
                let mut shadow = Shadow::default();
                exec_block(&self.design.graph, &self.store, &mut shadow, block, false)?;
                let changed = shadow.commit(&mut self.store);
                self.changed.extend(changed);
            }
        }
        let mut units = Vec::new();
        for (&module, circuit) in &self.design.circuits {
            units.extend(
                circuit
                    .continuous
                    .keys()
                    .map(|&storage| Unit::Continuous { module, storage }),
            );
            units.extend(
                circuit
                    .combinational
                    .keys()
                    .map(|&storage| Unit::Combinational { module, storage }),
            );
        }
        for unit in units {
            self.enqueue(unit);
        }
        self.step_combinational()?;
        self.record_levels()
    }

    /// Samples every clock and async reset so the first transition after
    /// reset is classified against its post-reset level.
    fn record_levels(&mut self) -> Result<(), SimError> {
        let signals: IndexSet<NodeId> = self
            .design
            .circuits
            .values()
            .flat_map(|circuit| {
                let clocks = circuit.clocked.keys().copied();
                let resets = circuit
                    .async_reset
                    .keys()
                    .flat_map(|&(clock, reset)| [clock, reset]);
                clocks.chain(resets)
            })
            .collect();
        for signal in signals {
            let level = self.eval_bits(signal)?.truthiness();
            self.last_levels.insert(signal, level);
        }
        // Already accounted for by the samples above.
        self.clocked_queue.clear();
        Ok(())
    }

    fn enqueue(&mut self, unit: Unit) {
        let queue = match unit {
            Unit::Continuous { .. } => &mut self.assign_queue,
            Unit::Combinational { .. } => &mut self.comb_queue,
            Unit::Clocked { .. } | Unit::AsyncReset { .. } => &mut self.clocked_queue,
        };
        // Re-triggering moves the unit to the back instead of duplicating it.
        queue.shift_remove(&unit);
        queue.insert(unit);
    }

    fn commit(&mut self, mut shadow: Shadow) {
        for storage in shadow.commit(&mut self.store) {
            self.changed.insert(storage);
            let readers = self.deps.get(&storage).cloned().unwrap_or_default();
            for unit in readers {
                self.enqueue(unit);
            }
        }
    }

    /// Runs continuous and combinational logic until nothing is pending.
    pub(crate) fn step_combinational(&mut self) -> Result<(), SimError> {
        let mut iterations = 0;
        loop {
            let Some(unit) = self
                .assign_queue
                .shift_remove_index(0)
                .or_else(|| self.comb_queue.shift_remove_index(0))
            else {
                return Ok(());
            };
            if iterations == self.options.max_settle_iterations {
                return Err(SimError::CombinationalLoop {
                    iterations,
                    time: self.time,
                });
            }
            iterations += 1;
            log::trace!("settle {unit:?}");
            let mut shadow = Shadow::default();
            let graph = &self.design.graph;
            match unit {
                Unit::Continuous { module, storage } => {
                    for &(lvalue, rvalue) in &self.design.circuits[&module].continuous[&storage] {
                        let value = graph.eval(rvalue, &lookup(&self.store))?;
                        poke(graph, &self.store, &mut shadow, lvalue, &value, false)?;
                    }
                }
                Unit::Combinational { module, storage } => {
                    let block = &self.design.circuits[&module].combinational[&storage];
                    exec_block(graph, &self.store, &mut shadow, block, false)?;
                }
                Unit::Clocked { .. } | Unit::AsyncReset { .. } => {
                    unreachable!("clocked units are never queued for settling")
                }
            }
            self.commit(shadow);
        }
    }

    /// Settles, fires every clocked block whose edge occurred, commits
    /// their writes together and settles again.
    pub(crate) fn step(&mut self) -> Result<(), SimError> {
        self.step_combinational()?;
        if self.clocked_queue.is_empty() {
            return Ok(());
        }
        let (regular, resets): (Vec<Unit>, Vec<Unit>) = self
            .clocked_queue
            .drain(..)
            .partition(|unit| matches!(unit, Unit::Clocked { .. }));
        let mut sampled = HashMap::default();
        let mut shadow = Shadow::default();
        for unit in regular.into_iter().chain(resets) {
            self.run_clocked(unit, &mut sampled, &mut shadow)?;
        }
        if !shadow.is_empty() {
            log::trace!("clock edge at time {}", self.time);
        }
        self.commit(shadow);
        self.step_combinational()
    }

    /// Edge of `signal` since it was last sampled. Each signal is sampled
    /// at most once per step.
    fn sample_edge(
        &mut self,
        signal: NodeId,
        sampled: &mut HashMap<NodeId, Edge>,
    ) -> Result<Edge, SimError> {
        if let Some(&edge) = sampled.get(&signal) {
            return Ok(edge);
        }
        let level = self.eval_bits(signal)?.truthiness();
        let edge = classify(self.last_levels.insert(signal, level), level);
        sampled.insert(signal, edge);
        Ok(edge)
    }

    fn run_clocked(
        &mut self,
        unit: Unit,
        sampled: &mut HashMap<NodeId, Edge>,
        shadow: &mut Shadow,
    ) -> Result<(), SimError> {
        let (module, block, uncertain) = match unit {
            Unit::Clocked { module, clock } => {
                if self.sample_edge(clock, sampled)? != Edge::Rising {
                    return Ok(());
                }
                (module, &self.design.circuits[&module].clocked[&clock], false)
            }
            Unit::AsyncReset {
                module,
                clock,
                reset,
            } => {
                let reset_edge = self.sample_edge(reset, sampled)?;
                let clock_edge = self.sample_edge(clock, sampled)?;
                let level = self.eval_bits(reset)?.truthiness();
                let uncertain = match (reset_edge, clock_edge, level) {
                    (Edge::Rising, _, _) | (_, Edge::Rising, Ternary::True) => false,
                    (Edge::Possible, _, _) | (_, Edge::Rising, Ternary::Unknown) => true,
                    _ => return Ok(()),
                };
                let block = &self.design.circuits[&module].async_reset[&(clock, reset)];
                (module, block, uncertain)
            }
            Unit::Continuous { .. } | Unit::Combinational { .. } => {
                unreachable!("settle units are never queued as clocked")
            }
        };
        log::trace!("firing {unit:?} in {module}");
        exec_block(&self.design.graph, &self.store, shadow, block, uncertain)
    }

    /// Every storage value, in declaration order.
    pub(crate) fn snapshot(&self) -> Vec<(NodeId, &Value)> {
        self.design
            .graph
            .storage_nodes()
            .filter_map(|id| self.store.get(id).map(|value| (id, value)))
            .collect()
    }
}

/// Executes a block against the live store, writing into `shadow`. An
/// unknown condition runs both branches from the same starting point and
/// combines what they wrote.
fn exec_block(
    graph: &Graph,
    store: &Store,
    shadow: &mut Shadow,
    block: &Block,
    uncertain: bool,
) -> Result<(), SimError> {
    for statement in &block.statements {
        match statement {
            Statement::Assign { lvalue, rvalue, .. } => {
                let value = graph.eval(*rvalue, &lookup(store))?;
                poke(graph, store, shadow, *lvalue, &value, uncertain)?;
            }
            Statement::If {
                cond,
                then_block,
                else_block,
            } => match graph.eval_bits(*cond, &lookup(store))?.truthiness() {
                Ternary::True => exec_block(graph, store, shadow, then_block, uncertain)?,
                Ternary::False => exec_block(graph, store, shadow, else_block, uncertain)?,
                Ternary::Unknown => {
                    let mut then = shadow.clone();
                    exec_block(graph, store, &mut then, then_block, uncertain)?;
                    let mut other = shadow.clone();
                    exec_block(graph, store, &mut other, else_block, uncertain)?;
                    shadow.merge_branches(store, &then, &other);
                }
            },
        }
    }
    Ok(())
}

/// Storage read by the operands of an lvalue chain, not by its base.
fn lvalue_reads(graph: &Graph, lvalue: NodeId, out: &mut Vec<NodeId>) {
    match &graph.node(lvalue).kind {
        PrimKind::Slice { base, .. } => lvalue_reads(graph, *base, out),
        PrimKind::BitIndex { base, index } | PrimKind::Index { base, index } => {
            out.extend(graph.accessed_storage(*index));
            lvalue_reads(graph, *base, out);
        }
        PrimKind::Mux { select, ports } => {
            out.extend(graph.accessed_storage(*select));
            for &port in ports {
                lvalue_reads(graph, port, out);
            }
        }
        PrimKind::Concat(parts) => {
            for &part in parts {
                lvalue_reads(graph, part, out);
            }
        }
        _ => {}
    }
}

fn block_reads(graph: &Graph, block: &Block) -> Vec<NodeId> {
    let mut out = Vec::new();
    block.visit(&mut |statement| match statement {
        Statement::Assign { lvalue, rvalue, .. } => {
            out.extend(graph.accessed_storage(*rvalue));
            lvalue_reads(graph, *lvalue, &mut out);
        }
        Statement::If { cond, .. } => out.extend(graph.accessed_storage(*cond)),
    });
    out
}

fn index_dependencies(design: &Design) -> HashMap<NodeId, Vec<Unit>> {
    let graph = &design.graph;
    let mut deps: HashMap<NodeId, Vec<Unit>> = HashMap::default();
    let mut add = |unit: Unit, reads: Vec<NodeId>| {
        for storage in reads {
            let readers = deps.entry(storage).or_default();
            if !readers.contains(&unit) {
                readers.push(unit);
            }
        }
    };
    for (&module, circuit) in &design.circuits {
        for (&storage, assigns) in &circuit.continuous {
            let mut reads = Vec::new();
            for &(lvalue, rvalue) in assigns {
                reads.extend(graph.accessed_storage(rvalue));
                lvalue_reads(graph, lvalue, &mut reads);
            }
            add(Unit::Continuous { module, storage }, reads);
        }
        for (&storage, block) in &circuit.combinational {
            add(
                Unit::Combinational { module, storage },
                block_reads(graph, block),
            );
        }
        for &clock in circuit.clocked.keys() {
            let reads = graph.accessed_storage(clock).into_iter().collect();
            add(Unit::Clocked { module, clock }, reads);
        }
        for &(clock, reset) in circuit.async_reset.keys() {
            let mut reads: Vec<NodeId> = graph.accessed_storage(clock).into_iter().collect();
            reads.extend(graph.accessed_storage(reset));
            add(
                Unit::AsyncReset {
                    module,
                    clock,
                    reset,
                },
                reads,
            );
        }
    }
    deps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edge_classification() {
        use Ternary::{False, True, Unknown};
        assert_eq!(classify(Some(False), True), Edge::Rising);
        assert_eq!(classify(Some(False), Unknown), Edge::Possible);
        assert_eq!(classify(Some(Unknown), True), Edge::Possible);
        assert_eq!(classify(Some(True), True), Edge::None);
        assert_eq!(classify(Some(True), False), Edge::None);
        assert_eq!(classify(None, True), Edge::None);
    }

    #[test]
    fn test_reset_samples_clock_levels() {
        use crate::circuit::AssignKind;
        use crate::prim::{StorageInfo, StorageKind};

        let mut design = Design::new();
        let top = design.add_module("top", None);
        let g = &mut design.graph;
        let clk = g.declare(StorageInfo::new("clk", Some(top), StorageKind::Wire, 1));
        let q = g.declare(StorageInfo::new("q", Some(top), StorageKind::Reg, 1));
        let low = g.literal(1, 0);
        design
            .assign(top, AssignKind::Clocked { clock: clk }, &[], q, clk)
            .unwrap();
        design.assign(top, AssignKind::Initial, &[], clk, low).unwrap();
        design.finalize();

        let mut engine = Engine::new(design, SimulatorOptions::default());
        engine.reset().unwrap();
        assert_eq!(engine.last_levels.get(&clk), Some(&Ternary::False));
        assert!(engine.clocked_queue.is_empty());
    }
}
