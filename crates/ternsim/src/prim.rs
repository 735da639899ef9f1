use crate::HashMap;
use crate::bitvec::BitVec;
use crate::value::Value;
use itertools::Itertools;
use std::fmt;

mod access;
mod build;
mod eval;
mod lower;

pub use access::AccessSet;
pub use build::RegisterSpec;
pub use eval::{Lookup, NotAvailable};
pub(crate) use eval::{Selection, select};
pub(crate) use lower::LoweredAssign;

/// Handle to a node in a [`Graph`]. Two structurally identical nodes built
/// from the same operands share one handle, so `==` on handles is structural
/// equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(pub usize);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mod{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    Reg,
    Wire,
    Port(Direction),
}

/// Declaration of a named storage element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageInfo {
    pub name: String,
    /// Owning module; `None` means unrestricted access.
    pub module: Option<ModuleId>,
    pub kind: StorageKind,
    pub width: usize,
    pub dims: Vec<usize>,
}

impl StorageInfo {
    pub fn new(name: impl Into<String>, module: Option<ModuleId>, kind: StorageKind, width: usize) -> Self {
        Self {
            name: name.into(),
            module,
            kind,
            width,
            dims: Vec::new(),
        }
    }

    pub fn with_dims(mut self, dims: impl Into<Vec<usize>>) -> Self {
        self.dims = dims.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub name: String,
    pub parent: Option<ModuleId>,
    pub children: Vec<ModuleId>,
    pub storages: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    And,
    Or,
    Xor,
    Add,
    Sub,
    Mul,
    Eq,
    Lt,
    SignedLt,
}

impl BinaryOp {
    /// Comparisons produce a single bit; everything else keeps the operand width.
    pub fn is_comparison(self) -> bool {
        matches!(self, BinaryOp::Eq | BinaryOp::Lt | BinaryOp::SignedLt)
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Eq => "==",
            BinaryOp::Lt => "<",
            BinaryOp::SignedLt => "<s",
        }
    }
}

/// Node operator together with its operand handles. This is also the
/// hash-consing key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrimKind {
    Storage(StorageId),
    Register {
        storage: NodeId,
        clock: NodeId,
        enable: Option<NodeId>,
        reset: Option<NodeId>,
    },
    Const(Value),
    Not(NodeId),
    Binary(BinaryOp, NodeId, NodeId),
    SignExtend {
        arg: NodeId,
        width: usize,
    },
    ZeroExtend {
        arg: NodeId,
        width: usize,
    },
    Slice {
        base: NodeId,
        start: usize,
        len: usize,
    },
    Repeat {
        arg: NodeId,
        count: usize,
    },
    BitIndex {
        base: NodeId,
        index: NodeId,
    },
    Index {
        base: NodeId,
        index: NodeId,
    },
    Mux {
        select: NodeId,
        ports: Vec<NodeId>,
    },
    Table(Vec<NodeId>),
    /// Most significant part first.
    Concat(Vec<NodeId>),
}

impl PrimKind {
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            PrimKind::Storage(_) | PrimKind::Const(_) => Vec::new(),
            PrimKind::Register {
                storage,
                clock,
                enable,
                reset,
            } => std::iter::once(*storage)
                .chain(std::iter::once(*clock))
                .chain(*enable)
                .chain(*reset)
                .collect(),
            PrimKind::Not(arg)
            | PrimKind::SignExtend { arg, .. }
            | PrimKind::ZeroExtend { arg, .. }
            | PrimKind::Repeat { arg, .. } => vec![*arg],
            PrimKind::Slice { base, .. } => vec![*base],
            PrimKind::Binary(_, a, b) => vec![*a, *b],
            PrimKind::BitIndex { base, index } | PrimKind::Index { base, index } => {
                vec![*base, *index]
            }
            PrimKind::Mux { select, ports } => {
                std::iter::once(*select).chain(ports.iter().copied()).collect()
            }
            PrimKind::Table(entries) | PrimKind::Concat(entries) => entries.clone(),
        }
    }

    /// Rebuilds the kind with operands replaced through `f`.
    pub fn map_children(&self, mut f: impl FnMut(NodeId) -> NodeId) -> PrimKind {
        match self {
            PrimKind::Storage(_) | PrimKind::Const(_) => self.clone(),
            PrimKind::Register {
                storage,
                clock,
                enable,
                reset,
            } => PrimKind::Register {
                storage: f(*storage),
                clock: f(*clock),
                enable: enable.map(&mut f),
                reset: reset.map(&mut f),
            },
            PrimKind::Not(arg) => PrimKind::Not(f(*arg)),
            PrimKind::Binary(op, a, b) => {
                let a = f(*a);
                PrimKind::Binary(*op, a, f(*b))
            }
            PrimKind::SignExtend { arg, width } => PrimKind::SignExtend {
                arg: f(*arg),
                width: *width,
            },
            PrimKind::ZeroExtend { arg, width } => PrimKind::ZeroExtend {
                arg: f(*arg),
                width: *width,
            },
            PrimKind::Slice { base, start, len } => PrimKind::Slice {
                base: f(*base),
                start: *start,
                len: *len,
            },
            PrimKind::Repeat { arg, count } => PrimKind::Repeat {
                arg: f(*arg),
                count: *count,
            },
            PrimKind::BitIndex { base, index } => {
                let base = f(*base);
                PrimKind::BitIndex {
                    base,
                    index: f(*index),
                }
            }
            PrimKind::Index { base, index } => {
                let base = f(*base);
                PrimKind::Index {
                    base,
                    index: f(*index),
                }
            }
            PrimKind::Mux { select, ports } => {
                let select = f(*select);
                PrimKind::Mux {
                    select,
                    ports: ports.iter().map(|&p| f(p)).collect(),
                }
            }
            PrimKind::Table(entries) => PrimKind::Table(entries.iter().map(|&e| f(e)).collect()),
            PrimKind::Concat(parts) => PrimKind::Concat(parts.iter().map(|&p| f(p)).collect()),
        }
    }
}

/// Number of distinct values a `width`-bit select can take, if it fits.
fn reachable(width: usize) -> Option<usize> {
    u32::try_from(width).ok().and_then(|w| 1usize.checked_shl(w))
}

#[derive(Debug, Clone)]
pub struct PrimNode {
    pub kind: PrimKind,
    pub width: usize,
    pub dims: Vec<usize>,
    pub readers: AccessSet,
    pub writers: AccessSet,
}

impl PrimNode {
    pub fn is_const(&self) -> bool {
        matches!(self.kind, PrimKind::Const(_))
    }

    pub fn is_storage(&self) -> bool {
        matches!(self.kind, PrimKind::Storage(_))
    }

    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }
}

/// Arena of hash-consed primitive nodes plus the module and storage
/// declarations they refer to.
///
/// Nodes are immutable once created. Operands always have smaller ids than
/// the nodes that use them.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<PrimNode>,
    cache: HashMap<PrimKind, NodeId>,
    storages: Vec<StorageInfo>,
    modules: Vec<ModuleInfo>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(&mut self, name: impl Into<String>, parent: Option<ModuleId>) -> ModuleId {
        let id = ModuleId(self.modules.len());
        self.modules.push(ModuleInfo {
            name: name.into(),
            parent,
            children: Vec::new(),
            storages: Vec::new(),
        });
        if let Some(parent) = parent {
            self.modules[parent.0].children.push(id);
        }
        id
    }

    pub fn module(&self, id: ModuleId) -> &ModuleInfo {
        &self.modules[id.0]
    }

    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &ModuleInfo)> {
        self.modules.iter().enumerate().map(|(i, m)| (ModuleId(i), m))
    }

    /// Declares a new storage element. Storage nodes are never deduplicated.
    pub fn declare(&mut self, info: StorageInfo) -> NodeId {
        let storage = StorageId(self.storages.len());
        let (readers, writers) = self.storage_access(&info);
        let id = NodeId(self.nodes.len());
        self.nodes.push(PrimNode {
            kind: PrimKind::Storage(storage),
            width: info.width,
            dims: info.dims.clone(),
            readers,
            writers,
        });
        if let Some(module) = info.module {
            self.modules[module.0].storages.push(id);
        }
        self.storages.push(info);
        id
    }

    pub fn node(&self, id: NodeId) -> &PrimNode {
        &self.nodes[id.0]
    }

    pub fn width(&self, id: NodeId) -> usize {
        self.nodes[id.0].width
    }

    pub fn dims(&self, id: NodeId) -> &[usize] {
        &self.nodes[id.0].dims
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Storage declaration behind a storage node.
    pub fn storage_info(&self, id: NodeId) -> Option<&StorageInfo> {
        match self.node(id).kind {
            PrimKind::Storage(storage) => Some(&self.storages[storage.0]),
            _ => None,
        }
    }

    /// All storage nodes in declaration order.
    pub fn storage_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_storage())
            .map(|(i, _)| NodeId(i))
    }

    /// Collapses read-only wrappers: reading a register reads its storage.
    pub fn simplify_read(&self, id: NodeId) -> NodeId {
        match self.node(id).kind {
            PrimKind::Register { storage, .. } => storage,
            _ => id,
        }
    }

    pub fn const_value(&self, id: NodeId) -> Option<&Value> {
        match &self.node(id).kind {
            PrimKind::Const(value) => Some(value),
            _ => None,
        }
    }

    /// The bit-vector held by a scalar constant node.
    pub fn const_bits(&self, id: NodeId) -> Option<&BitVec> {
        match self.const_value(id) {
            Some(Value::Bits(bits)) => Some(bits),
            _ => None,
        }
    }

    fn scalar(&self, id: NodeId, context: &str) -> usize {
        let node = self.node(id);
        assert!(
            node.dims.is_empty(),
            "{context}: operand {} has dimensions {:?}, expected a scalar",
            self.display(id),
            node.dims
        );
        node.width
    }

    /// Width and dimensions of a would-be node, checking operand contracts.
    fn shape(&self, kind: &PrimKind) -> (usize, Vec<usize>) {
        match kind {
            PrimKind::Storage(id) => {
                let info = &self.storages[id.0];
                (info.width, info.dims.clone())
            }
            PrimKind::Register { storage, clock, .. } => {
                assert!(
                    self.node(*storage).is_storage(),
                    "register must wrap a storage node"
                );
                self.scalar(*clock, "register clock");
                let node = self.node(*storage);
                (node.width, node.dims.clone())
            }
            PrimKind::Const(value) => const_shape(value),
            PrimKind::Not(arg) => (self.scalar(*arg, "not"), Vec::new()),
            PrimKind::Binary(op, a, b) => {
                let wa = self.scalar(*a, op.symbol());
                let wb = self.scalar(*b, op.symbol());
                assert_eq!(
                    wa,
                    wb,
                    "binary `{}`: mismatched operand widths {wa} and {wb}",
                    op.symbol()
                );
                (if op.is_comparison() { 1 } else { wa }, Vec::new())
            }
            PrimKind::SignExtend { arg, width } | PrimKind::ZeroExtend { arg, width } => {
                let w = self.scalar(*arg, "extend");
                assert!(*width >= w, "extend: target width {width} below operand width {w}");
                (*width, Vec::new())
            }
            PrimKind::Slice { base, start, len } => {
                let w = self.scalar(*base, "slice");
                assert!(
                    start + len <= w,
                    "slice [{start} +: {len}] out of range for width {w}"
                );
                (*len, Vec::new())
            }
            PrimKind::Repeat { arg, count } => (self.scalar(*arg, "repeat") * count, Vec::new()),
            PrimKind::BitIndex { base, index } => {
                self.scalar(*base, "bit index");
                self.scalar(*index, "bit index");
                (1, Vec::new())
            }
            PrimKind::Index { base, index } => {
                self.scalar(*index, "index");
                let node = self.node(*base);
                assert!(!node.dims.is_empty(), "index: base is not an array");
                (node.width, node.dims[1..].to_vec())
            }
            PrimKind::Mux { select, ports } => {
                let select_width = self.scalar(*select, "mux select");
                assert!(!ports.is_empty(), "mux: no ports");
                assert!(
                    reachable(select_width).is_none_or(|n| ports.len() <= n),
                    "mux: {} ports cannot all be selected by a {select_width}-bit select",
                    ports.len()
                );
                let first = self.node(ports[0]);
                for &port in &ports[1..] {
                    let node = self.node(port);
                    assert!(
                        node.width == first.width && node.dims == first.dims,
                        "mux: ports have mismatched shapes"
                    );
                }
                (first.width, first.dims.clone())
            }
            PrimKind::Table(entries) => {
                assert!(!entries.is_empty(), "table: no entries");
                let first = self.node(entries[0]);
                for &entry in &entries[1..] {
                    let node = self.node(entry);
                    assert!(
                        node.width == first.width && node.dims == first.dims,
                        "table: entries have mismatched shapes"
                    );
                }
                let mut dims = vec![entries.len()];
                dims.extend_from_slice(&first.dims);
                (first.width, dims)
            }
            PrimKind::Concat(parts) => {
                let width = parts.iter().map(|&p| self.scalar(p, "concat")).sum();
                (width, Vec::new())
            }
        }
    }

    fn alloc(&mut self, kind: PrimKind) -> NodeId {
        let (width, dims) = self.shape(&kind);
        let (readers, writers) = self.derived_access(&kind);
        let id = NodeId(self.nodes.len());
        self.nodes.push(PrimNode {
            kind: kind.clone(),
            width,
            dims,
            readers,
            writers,
        });
        self.cache.insert(kind, id);
        id
    }

    /// Builds (or finds) a node: operand normalization, hash-consing lookup,
    /// constant folding, then node-specific simplification.
    pub(crate) fn intern(&mut self, kind: PrimKind) -> NodeId {
        let kind = kind.map_children(|c| self.simplify_read(c));
        if let Some(&id) = self.cache.get(&kind) {
            return id;
        }

        if self.is_foldable(&kind) {
            let (width, dims) = self.shape(&kind);
            if let Ok(value) = self.eval_kind(&kind, width, &dims, &|_| None) {
                let folded = self.constant_value(value);
                self.cache.insert(kind, folded);
                return folded;
            }
        }

        if let Some(simplified) = self.simplify(&kind) {
            self.cache.insert(kind, simplified);
            return simplified;
        }

        self.alloc(kind)
    }

    fn is_foldable(&self, kind: &PrimKind) -> bool {
        !matches!(
            kind,
            PrimKind::Storage(_) | PrimKind::Const(_) | PrimKind::Register { .. }
        ) && kind.children().iter().all(|&c| self.node(c).is_const())
    }

    /// Indexing a one-dimensional table becomes a multiplexer over its entries.
    fn simplify(&mut self, kind: &PrimKind) -> Option<NodeId> {
        let PrimKind::Index { base, index } = kind else {
            return None;
        };
        let PrimKind::Table(entries) = &self.node(*base).kind else {
            return None;
        };
        if self.node(*base).dims.len() != 1 {
            return None;
        }
        let mut entries = entries.clone();
        // Entries past what the index can address are unreachable.
        if let Some(n) = reachable(self.node(*index).width) {
            entries.truncate(n);
        }
        Some(self.mux(*index, entries))
    }

    /// Renders a node as an expression.
    pub fn display(&self, id: NodeId) -> NodeDisplay<'_> {
        NodeDisplay { graph: self, id }
    }
}

fn const_shape(value: &Value) -> (usize, Vec<usize>) {
    match value {
        Value::Bits(bits) => (bits.width(), Vec::new()),
        Value::Array(elems) => {
            assert!(!elems.is_empty(), "constant array with no elements");
            let (width, inner) = const_shape(&elems[0]);
            let mut dims = vec![elems.len()];
            dims.extend(inner);
            (width, dims)
        }
    }
}

pub struct NodeDisplay<'a> {
    graph: &'a Graph,
    id: NodeId,
}

impl fmt::Display for NodeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.graph;
        let d = |id: NodeId| g.display(id);
        let list = |ids: &[NodeId]| ids.iter().map(|&id| d(id)).join(", ");
        match &g.node(self.id).kind {
            PrimKind::Storage(id) => write!(f, "{}", g.storages[id.0].name),
            PrimKind::Register { storage, .. } => write!(f, "reg({})", d(*storage)),
            PrimKind::Const(Value::Bits(bits)) => write!(f, "{}'b{bits}", bits.width()),
            PrimKind::Const(value) => write!(f, "{value}"),
            PrimKind::Not(arg) => write!(f, "~{}", d(*arg)),
            PrimKind::Binary(op, a, b) => write!(f, "({} {} {})", d(*a), op.symbol(), d(*b)),
            PrimKind::SignExtend { arg, width } => write!(f, "sext({}, {width})", d(*arg)),
            PrimKind::ZeroExtend { arg, width } => write!(f, "zext({}, {width})", d(*arg)),
            PrimKind::Slice { base, start, len } => write!(f, "{}[{start} +: {len}]", d(*base)),
            PrimKind::Repeat { arg, count } => write!(f, "{{{count}{{{}}}}}", d(*arg)),
            PrimKind::BitIndex { base, index } | PrimKind::Index { base, index } => {
                write!(f, "{}[{}]", d(*base), d(*index))
            }
            PrimKind::Mux { select, ports } => write!(f, "mux({}; {})", d(*select), list(ports)),
            PrimKind::Table(entries) => write!(f, "[{}]", list(entries)),
            PrimKind::Concat(parts) => write!(f, "{{{}}}", list(parts)),
        }
    }
}
