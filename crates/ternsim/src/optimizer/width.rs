use super::{CircuitPass, blocks_mut};
use crate::circuit::{Block, Circuit, Statement};
use crate::prim::{BinaryOp, Graph, NodeId, PrimKind};
use crate::{HashMap, HashSet};

/// Narrows expressions to the bits their consumers actually use.
///
/// First computes, for every node reachable from an rvalue or condition, the
/// number of low bits any consumer requires, then rebuilds the expressions
/// bottom-up at those widths.
pub struct ReduceWidths;

impl CircuitPass for ReduceWidths {
    fn name(&self) -> &'static str {
        "reduce-widths"
    }

    fn run(&self, circuit: &mut Circuit, graph: &mut Graph) {
        let mut roots = Vec::new();
        for (lvalue, rvalue) in circuit.continuous.values().flatten() {
            roots.push((*rvalue, root_width(graph, *lvalue, *rvalue)));
        }
        for block in blocks_mut(circuit) {
            collect_roots(graph, block, &mut roots);
        }
        if roots.is_empty() {
            return;
        }

        let mut reducer = Reducer::new(graph, &roots);
        for assigns in circuit.continuous.values_mut() {
            for (lvalue, rvalue) in assigns.iter_mut() {
                let width = root_width(reducer.graph, *lvalue, *rvalue);
                *rvalue = reducer.fetch(*rvalue, width);
            }
        }
        for block in blocks_mut(circuit) {
            reducer.rewrite_block(block);
        }
        log::debug!(
            "reduce-widths: {} of {} nodes narrowed",
            reducer.narrowed,
            reducer.rewritten.len()
        );
    }
}

/// Bits of `rvalue` an assignment to `lvalue` can observe.
fn root_width(graph: &Graph, lvalue: NodeId, rvalue: NodeId) -> usize {
    if graph.node(rvalue).is_scalar() {
        graph.width(lvalue).min(graph.width(rvalue))
    } else {
        graph.width(rvalue)
    }
}

fn collect_roots(graph: &Graph, block: &Block, roots: &mut Vec<(NodeId, usize)>) {
    block.visit(&mut |s| match s {
        Statement::Assign { lvalue, rvalue, .. } => {
            roots.push((*rvalue, root_width(graph, *lvalue, *rvalue)));
        }
        Statement::If { cond, .. } => roots.push((*cond, graph.width(*cond))),
    });
}

struct Reducer<'g> {
    graph: &'g mut Graph,
    required: HashMap<NodeId, usize>,
    rewritten: HashMap<NodeId, NodeId>,
    narrowed: usize,
}

impl<'g> Reducer<'g> {
    fn new(graph: &'g mut Graph, roots: &[(NodeId, usize)]) -> Self {
        let mut reachable = HashSet::default();
        let mut stack: Vec<NodeId> = roots.iter().map(|&(id, _)| id).collect();
        while let Some(id) = stack.pop() {
            if reachable.insert(id) {
                stack.extend(graph.node(id).kind.children());
            }
        }
        let mut order: Vec<NodeId> = reachable.into_iter().collect();
        order.sort_unstable();

        let mut required: HashMap<NodeId, usize> = HashMap::default();
        for &(id, width) in roots {
            let entry = required.entry(id).or_insert(0);
            *entry = (*entry).max(width);
        }
        // Consumers always have larger ids than their operands, so walking
        // downwards finalizes each node's requirement before it is read.
        for &id in order.iter().rev() {
            let r = required.get(&id).copied().unwrap_or(0);
            for (child, need) in child_requirements(graph, id, r) {
                let entry = required.entry(child).or_insert(0);
                *entry = (*entry).max(need);
            }
        }

        let mut reducer = Self {
            graph,
            required,
            rewritten: HashMap::default(),
            narrowed: 0,
        };
        for id in order {
            reducer.rewrite(id);
        }
        reducer
    }

    /// Rebuilds `id` at its required width. Operands are already rewritten.
    fn rewrite(&mut self, id: NodeId) {
        let width = self.graph.width(id);
        let r = self.required[&id].min(width);
        let kind = self.graph.node(id).kind.clone();
        let new = match kind {
            PrimKind::Storage(_) | PrimKind::Const(_) => self.narrow(id, r),
            PrimKind::Not(arg) => {
                let arg = self.fetch(arg, r);
                self.graph.not(arg)
            }
            PrimKind::Binary(op, a, b) if !op.is_comparison() => {
                let (a, b) = (self.fetch(a, r), self.fetch(b, r));
                self.graph.binary(op, a, b)
            }
            PrimKind::SignExtend { arg, .. } | PrimKind::ZeroExtend { arg, .. }
                if r <= self.graph.width(arg) =>
            {
                self.fetch(arg, r)
            }
            PrimKind::SignExtend { arg, .. } => {
                let arg = self.fetch(arg, self.graph.width(arg));
                self.graph.sign_extend(arg, r)
            }
            PrimKind::ZeroExtend { arg, .. } => {
                let arg = self.fetch(arg, self.graph.width(arg));
                self.graph.zero_extend(arg, r)
            }
            PrimKind::Slice { base, start, .. } => {
                let base = self.fetch(base, start + r);
                self.graph.slice(base, start, r)
            }
            PrimKind::Mux { select, ports } if self.graph.node(id).is_scalar() => {
                let select = self.fetch(select, self.graph.width(select));
                let ports = ports.into_iter().map(|p| self.fetch(p, r)).collect();
                self.graph.mux(select, ports)
            }
            kind => {
                let kind = kind.map_children(|c| {
                    let full = self.graph.width(c);
                    self.fetch(c, full)
                });
                let rebuilt = self.graph.intern(kind);
                self.narrow(rebuilt, r)
            }
        };
        if self.graph.width(new) < width {
            self.narrowed += 1;
        }
        self.rewritten.insert(id, new);
    }

    fn narrow(&mut self, id: NodeId, width: usize) -> NodeId {
        if self.graph.width(id) == width {
            id
        } else {
            self.graph.truncate(id, width)
        }
    }

    /// Low `width` bits of the rewritten form of `id`.
    fn fetch(&mut self, id: NodeId, width: usize) -> NodeId {
        let rewritten = self.rewritten[&id];
        self.narrow(rewritten, width)
    }

    fn rewrite_block(&mut self, block: &mut Block) {
        for statement in &mut block.statements {
            match statement {
                Statement::Assign { lvalue, rvalue, .. } => {
                    let width = root_width(self.graph, *lvalue, *rvalue);
                    *rvalue = self.fetch(*rvalue, width);
                }
                Statement::If {
                    cond,
                    then_block,
                    else_block,
                } => {
                    *cond = self.rewritten[&*cond];
                    self.rewrite_block(then_block);
                    self.rewrite_block(else_block);
                }
            }
        }
    }
}

/// Width each operand of `id` must provide when `r` low bits of `id` are used.
fn child_requirements(graph: &Graph, id: NodeId, r: usize) -> Vec<(NodeId, usize)> {
    let node = graph.node(id);
    let full = |c: NodeId| (c, graph.width(c));
    if !node.is_scalar() {
        return node.kind.children().into_iter().map(full).collect();
    }
    match &node.kind {
        PrimKind::Not(arg) => vec![(*arg, r)],
        PrimKind::Binary(op, a, b) if !op.is_comparison() => vec![(*a, r), (*b, r)],
        PrimKind::Binary(BinaryOp::Eq | BinaryOp::Lt | BinaryOp::SignedLt, a, b) => {
            vec![full(*a), full(*b)]
        }
        PrimKind::SignExtend { arg, .. } | PrimKind::ZeroExtend { arg, .. } => {
            vec![(*arg, r.min(graph.width(*arg)))]
        }
        PrimKind::Slice { base, start, len } => vec![(*base, start + r.min(*len))],
        PrimKind::Mux { select, ports } => std::iter::once(full(*select))
            .chain(ports.iter().map(|&p| (p, r)))
            .collect(),
        kind => kind.children().into_iter().map(full).collect(),
    }
}
