use crate::optimizer::PassManager;
use crate::prim::{Graph, ModuleId, NodeId};
use indexmap::IndexMap;
use std::fmt;
use thiserror::Error;

mod block;

pub use block::{Block, BlockDisplay, Condition, Statement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Read,
    Write,
}

impl fmt::Display for AccessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessKind::Read => write!(f, "read"),
            AccessKind::Write => write!(f, "write"),
        }
    }
}

/// A module touched a node outside its allowed readers or writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("module {module} may not {access} node {node}")]
pub struct AccessError {
    pub access: AccessKind,
    pub module: ModuleId,
    pub node: NodeId,
}

/// Which process an assignment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssignKind {
    /// Unconditional wire assignment.
    Continuous,
    Combinational,
    /// Evaluated on the rising edge of `clock`.
    Clocked { clock: NodeId },
    /// Clocked assignment that takes priority over the regular clocked block.
    SyncReset { clock: NodeId },
    AsyncReset { clock: NodeId, reset: NodeId },
    /// Runs once on simulator reset.
    Initial,
}

/// Assignment blocks of one module.
#[derive(Debug, Clone)]
pub struct Circuit {
    module: ModuleId,
    pub(crate) continuous: IndexMap<NodeId, Vec<(NodeId, NodeId)>>,
    pub(crate) combinational: IndexMap<NodeId, Block>,
    pub(crate) clocked: IndexMap<NodeId, Block>,
    pub(crate) sync_reset: IndexMap<NodeId, Block>,
    pub(crate) async_reset: IndexMap<(NodeId, NodeId), Block>,
    pub(crate) initial: IndexMap<NodeId, Block>,
    finalized: bool,
}

impl Circuit {
    pub fn new(module: ModuleId) -> Self {
        Self {
            module,
            continuous: IndexMap::new(),
            combinational: IndexMap::new(),
            clocked: IndexMap::new(),
            sync_reset: IndexMap::new(),
            async_reset: IndexMap::new(),
            initial: IndexMap::new(),
            finalized: false,
        }
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Storage to `(lvalue, rvalue)` wire assignments.
    pub fn continuous(&self) -> &IndexMap<NodeId, Vec<(NodeId, NodeId)>> {
        &self.continuous
    }

    pub fn combinational(&self) -> &IndexMap<NodeId, Block> {
        &self.combinational
    }

    /// Clock to the block evaluated on its rising edge.
    pub fn clocked(&self) -> &IndexMap<NodeId, Block> {
        &self.clocked
    }

    pub fn sync_reset(&self) -> &IndexMap<NodeId, Block> {
        &self.sync_reset
    }

    /// `(clock, reset)` to reset block.
    pub fn async_reset(&self) -> &IndexMap<(NodeId, NodeId), Block> {
        &self.async_reset
    }

    pub fn initial(&self) -> &IndexMap<NodeId, Block> {
        &self.initial
    }

    /// Records `lvalue = rvalue` under `conditions`, lowering dynamic
    /// selection in the target into guarded branches.
    pub fn assign(
        &mut self,
        graph: &mut Graph,
        kind: AssignKind,
        conditions: &[Condition],
        lvalue: NodeId,
        rvalue: NodeId,
    ) -> Result<(), AccessError> {
        assert!(!self.finalized, "assignment to a finalized circuit");
        assert_eq!(
            graph.dims(lvalue),
            graph.dims(rvalue),
            "assign: mismatched dimensions between {} and {}",
            graph.display(lvalue),
            graph.display(rvalue)
        );
        let module = self.module;
        if !graph.node(lvalue).writers.contains(module) {
            return Err(AccessError {
                access: AccessKind::Write,
                module,
                node: lvalue,
            });
        }
        let reads = conditions.iter().map(|c| c.expr).chain(std::iter::once(rvalue));
        for node in reads {
            if !graph.node(node).readers.contains(module) {
                return Err(AccessError {
                    access: AccessKind::Read,
                    module,
                    node,
                });
            }
        }
        if let AssignKind::Clocked { clock }
        | AssignKind::SyncReset { clock }
        | AssignKind::AsyncReset { clock, .. } = kind
        {
            if !graph.node(clock).readers.contains(module) {
                return Err(AccessError {
                    access: AccessKind::Read,
                    module,
                    node: clock,
                });
            }
        }

        for lowered in graph.lower_assignment(lvalue, rvalue) {
            let mut path = conditions.to_vec();
            path.extend(lowered.conditions);
            let (storage, lvalue, rvalue) = (lowered.storage, lowered.lvalue, lowered.rvalue);
            let block = match kind {
                AssignKind::Continuous if path.is_empty() => {
                    self.continuous.entry(storage).or_default().push((lvalue, rvalue));
                    continue;
                }
                AssignKind::Continuous | AssignKind::Combinational => {
                    self.combinational.entry(storage).or_default()
                }
                AssignKind::Clocked { clock } => self.clocked.entry(clock).or_default(),
                AssignKind::SyncReset { clock } => self.sync_reset.entry(clock).or_default(),
                AssignKind::AsyncReset { clock, reset } => {
                    self.async_reset.entry((clock, reset)).or_default()
                }
                AssignKind::Initial => self.initial.entry(storage).or_default(),
            };
            block.add(&path, storage, lvalue, rvalue);
        }
        Ok(())
    }

    /// Runs the default optimization pipeline. Must be called exactly once.
    pub fn finalize(&mut self, graph: &mut Graph) {
        assert!(!self.finalized, "circuit for {} finalized twice", self.module);
        PassManager::default_pipeline().run(self, graph);
        self.finalized = true;
    }

    pub fn display<'a>(&'a self, graph: &'a Graph) -> CircuitDisplay<'a> {
        CircuitDisplay {
            circuit: self,
            graph,
        }
    }
}

pub struct CircuitDisplay<'a> {
    circuit: &'a Circuit,
    graph: &'a Graph,
}

impl fmt::Display for CircuitDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (c, g) = (self.circuit, self.graph);
        writeln!(f, "circuit {}", g.module(c.module).name)?;
        for (lvalue, rvalue) in c.continuous.values().flatten() {
            writeln!(f, "assign {} = {};", g.display(*lvalue), g.display(*rvalue))?;
        }
        let sections = [
            ("comb", &c.combinational),
            ("posedge", &c.clocked),
            ("sync_reset", &c.sync_reset),
            ("initial", &c.initial),
        ];
        for (label, blocks) in sections {
            for (key, block) in blocks {
                writeln!(f, "{label} {}:", g.display(*key))?;
                write!(f, "{}", block.display(g))?;
            }
        }
        for ((clock, reset), block) in &c.async_reset {
            writeln!(f, "async_reset {} {}:", g.display(*clock), g.display(*reset))?;
            write!(f, "{}", block.display(g))?;
        }
        Ok(())
    }
}

/// All graph nodes plus one circuit per module.
#[derive(Debug, Clone, Default)]
pub struct Design {
    pub graph: Graph,
    pub circuits: IndexMap<ModuleId, Circuit>,
}

impl Design {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module and its (empty) circuit.
    pub fn add_module(&mut self, name: impl Into<String>, parent: Option<ModuleId>) -> ModuleId {
        let id = self.graph.add_module(name, parent);
        self.circuits.insert(id, Circuit::new(id));
        id
    }

    pub fn circuit(&self, module: ModuleId) -> &Circuit {
        &self.circuits[&module]
    }

    /// Records an assignment in `module`'s circuit.
    pub fn assign(
        &mut self,
        module: ModuleId,
        kind: AssignKind,
        conditions: &[Condition],
        lvalue: NodeId,
        rvalue: NodeId,
    ) -> Result<(), AccessError> {
        let circuit = self
            .circuits
            .get_mut(&module)
            .unwrap_or_else(|| panic!("unknown module {module}"));
        circuit.assign(&mut self.graph, kind, conditions, lvalue, rvalue)
    }

    /// Finalizes every circuit that has not been finalized yet.
    pub fn finalize(&mut self) {
        for circuit in self.circuits.values_mut() {
            if !circuit.is_finalized() {
                circuit.finalize(&mut self.graph);
            }
        }
    }
}
