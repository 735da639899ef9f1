use super::{Graph, NodeId, PrimKind};
use crate::circuit::Condition;

/// An assignment whose target no longer goes through dynamic selection:
/// every remaining index in `lvalue` is a constant, and `conditions` guard
/// the branch that picked it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LoweredAssign {
    pub conditions: Vec<Condition>,
    pub storage: NodeId,
    pub lvalue: NodeId,
    pub rvalue: NodeId,
}

/// Number of concrete positions an index of `index_width` bits can reach
/// inside `len` slots.
fn reachable(len: usize, index_width: usize) -> usize {
    if index_width >= usize::BITS as usize {
        len
    } else {
        len.min(1usize << index_width)
    }
}

impl Graph {
    /// Expands `lvalue = rvalue` into one guarded assignment per concrete
    /// target. Panics if `lvalue` is not assignable.
    pub(crate) fn lower_assignment(&mut self, lvalue: NodeId, rvalue: NodeId) -> Vec<LoweredAssign> {
        let mut out = Vec::new();
        self.lower_into(lvalue, rvalue, &mut out);
        out
    }

    fn lower_into(&mut self, lvalue: NodeId, rvalue: NodeId, out: &mut Vec<LoweredAssign>) {
        let lvalue = self.simplify_read(lvalue);
        if let PrimKind::Concat(parts) = &self.node(lvalue).kind {
            let parts = parts.clone();
            let total = self.width(lvalue);
            let rvalue = if self.width(rvalue) < total {
                self.zero_extend(rvalue, total)
            } else {
                rvalue
            };
            let mut offset = 0;
            for part in parts.into_iter().rev() {
                let width = self.width(part);
                let piece = self.slice(rvalue, offset, width);
                self.lower_into(part, piece, out);
                offset += width;
            }
            return;
        }
        for (conditions, target) in self.expand_target(lvalue) {
            out.push(LoweredAssign {
                conditions,
                storage: self.target_storage(target),
                lvalue: target,
                rvalue,
            });
        }
    }

    /// Splits dynamic selection in an lvalue chain into guarded static chains.
    fn expand_target(&mut self, lvalue: NodeId) -> Vec<(Vec<Condition>, NodeId)> {
        match self.node(lvalue).kind.clone() {
            PrimKind::Storage(_) => vec![(Vec::new(), lvalue)],
            PrimKind::Register { storage, .. } => self.expand_target(storage),
            PrimKind::Slice { base, start, len } => self
                .expand_target(base)
                .into_iter()
                .map(|(conds, b)| (conds, self.slice(b, start, len)))
                .collect(),
            PrimKind::Index { base, index } => {
                let bases = self.expand_target(base);
                if self.node(index).is_const() {
                    return bases
                        .into_iter()
                        .map(|(conds, b)| (conds, self.index(b, index)))
                        .collect();
                }
                let len = self.dims(base)[0];
                let reach = reachable(len, self.width(index));
                let mut out = Vec::new();
                for (conds, b) in bases {
                    for i in 0..reach {
                        let (guard, at) = self.index_guard(index, i);
                        let mut conds = conds.clone();
                        conds.push(guard);
                        out.push((conds, self.index(b, at)));
                    }
                }
                out
            }
            PrimKind::BitIndex { base, index } => {
                let bases = self.expand_target(base);
                if self.node(index).is_const() {
                    return bases
                        .into_iter()
                        .map(|(conds, b)| (conds, self.bit(b, index)))
                        .collect();
                }
                let reach = reachable(self.width(base), self.width(index));
                let mut out = Vec::new();
                for (conds, b) in bases {
                    for i in 0..reach {
                        let (guard, _) = self.index_guard(index, i);
                        let mut conds = conds.clone();
                        conds.push(guard);
                        out.push((conds, self.slice(b, i, 1)));
                    }
                }
                out
            }
            PrimKind::Mux { select, ports } => {
                let mut out = Vec::new();
                for (j, port) in ports.into_iter().enumerate() {
                    let (guard, _) = self.index_guard(select, j);
                    for (conds, target) in self.expand_target(port) {
                        let mut all = vec![guard];
                        all.extend(conds);
                        out.push((all, target));
                    }
                }
                out
            }
            _ => panic!("{} is not assignable", self.display(lvalue)),
        }
    }

    /// `index == i` as a condition, plus the constant `i` itself.
    fn index_guard(&mut self, index: NodeId, i: usize) -> (Condition, NodeId) {
        let at = self.literal(self.width(index), i as u64);
        let expr = self.eq(index, at);
        (Condition::when(expr), at)
    }

    /// Storage element at the root of a static lvalue chain.
    pub(crate) fn target_storage(&self, lvalue: NodeId) -> NodeId {
        match &self.node(lvalue).kind {
            PrimKind::Storage(_) => lvalue,
            PrimKind::Register { storage, .. } => *storage,
            PrimKind::Slice { base, .. }
            | PrimKind::Index { base, .. }
            | PrimKind::BitIndex { base, .. } => self.target_storage(*base),
            _ => panic!("{} has no storage root", self.display(lvalue)),
        }
    }
}
