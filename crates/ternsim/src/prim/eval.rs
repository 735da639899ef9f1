use super::{BinaryOp, Graph, NodeId, PrimKind};
use crate::bitvec::BitVec;
use crate::value::Value;
use indexmap::IndexSet;
use num_bigint::BigUint;
use num_traits::ToPrimitive as _;
use std::borrow::Cow;
use thiserror::Error;

/// A referenced storage element has no value available. Used to abort
/// speculative evaluation during constant folding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("value of {node} is not available")]
pub struct NotAvailable {
    pub node: NodeId,
}

/// Resolves storage nodes to their current values.
pub type Lookup<'v> = dyn Fn(NodeId) -> Option<&'v Value> + 'v;

/// Which concrete positions a possibly-unknown index may select among `len`.
pub(crate) enum Selection {
    /// A single defined in-range position.
    One(usize),
    /// Several positions are possible; all are in range.
    Some(Vec<usize>),
    /// Defined, but past the end.
    OutOfRange,
    /// Unknown bits make an out-of-range position possible.
    Anywhere,
}

pub(crate) fn select(index: &BitVec, len: usize) -> Selection {
    let (_, max) = index.bounds();
    if index.is_fully_defined() {
        return match max.to_usize() {
            Some(i) if i < len => Selection::One(i),
            _ => Selection::OutOfRange,
        };
    }
    if max >= BigUint::from(len) {
        return Selection::Anywhere;
    }
    Selection::Some(
        index
            .values()
            .filter_map(|v| v.to_usize())
            .collect(),
    )
}

impl Graph {
    /// Evaluates `id` against storage values supplied by `lookup`.
    pub fn eval<'v>(&self, id: NodeId, lookup: &Lookup<'v>) -> Result<Value, NotAvailable> {
        let node = self.node(id);
        if node.is_storage() {
            return lookup(id).cloned().ok_or(NotAvailable { node: id });
        }
        self.eval_kind(&node.kind, node.width, &node.dims, lookup)
    }

    pub fn eval_bits<'v>(&self, id: NodeId, lookup: &Lookup<'v>) -> Result<BitVec, NotAvailable> {
        Ok(self.eval(id, lookup)?.into_bits())
    }

    /// Evaluates without cloning when `id` is a storage node.
    fn eval_cow<'v>(&self, id: NodeId, lookup: &Lookup<'v>) -> Result<Cow<'v, Value>, NotAvailable> {
        if self.node(id).is_storage() {
            lookup(id).map(Cow::Borrowed).ok_or(NotAvailable { node: id })
        } else {
            self.eval(id, lookup).map(Cow::Owned)
        }
    }

    pub(super) fn eval_kind<'v>(
        &self,
        kind: &PrimKind,
        width: usize,
        dims: &[usize],
        lookup: &Lookup<'v>,
    ) -> Result<Value, NotAvailable> {
        let bits = |id: NodeId| self.eval_bits(id, lookup);
        let result = match kind {
            PrimKind::Storage(_) => unreachable!("storage is resolved through the lookup"),
            PrimKind::Register { storage, .. } => return self.eval(*storage, lookup),
            PrimKind::Const(value) => return Ok(value.clone()),
            PrimKind::Not(arg) => bits(*arg)?.bit_not(),
            PrimKind::Binary(op, a, b) => {
                let (a, b) = (bits(*a)?, bits(*b)?);
                match op {
                    BinaryOp::And => a.bit_and(&b),
                    BinaryOp::Or => a.bit_or(&b),
                    BinaryOp::Xor => a.bit_xor(&b),
                    BinaryOp::Add => a.wrapping_add(&b),
                    BinaryOp::Sub => a.wrapping_sub(&b),
                    BinaryOp::Mul => a.wrapping_mul(&b),
                    BinaryOp::Eq => a.ternary_eq(&b).into(),
                    BinaryOp::Lt => a.lt(&b).into(),
                    BinaryOp::SignedLt => a.signed_lt(&b).into(),
                }
            }
            PrimKind::SignExtend { arg, width } => bits(*arg)?.sign_extend(*width),
            PrimKind::ZeroExtend { arg, width } => bits(*arg)?.zero_extend(*width),
            PrimKind::Slice { base, start, len } => bits(*base)?.slice(*start, *len),
            PrimKind::Repeat { arg, count } => bits(*arg)?.repeat(*count),
            PrimKind::Concat(parts) => {
                let parts = parts.iter().map(|&p| bits(p)).collect::<Result<Vec<_>, _>>()?;
                BitVec::concat(&parts)
            }
            PrimKind::BitIndex { base, index } => {
                let base = bits(*base)?;
                match select(&bits(*index)?, base.width()) {
                    Selection::One(i) => base.slice(i, 1),
                    Selection::Some(positions) => positions
                        .iter()
                        .map(|&i| base.slice(i, 1))
                        .reduce(|a, b| a.combine(&b))
                        .unwrap_or_else(|| BitVec::x(1)),
                    Selection::OutOfRange | Selection::Anywhere => BitVec::x(1),
                }
            }
            PrimKind::Index { base, index } => {
                let index = bits(*index)?;
                let base = self.eval_cow(*base, lookup)?;
                let elems = base.as_array();
                return Ok(match select(&index, elems.len()) {
                    Selection::One(i) => elems[i].clone(),
                    Selection::Some(positions) => positions
                        .iter()
                        .map(|&i| elems[i].clone())
                        .reduce(|a, b| a.combine(&b))
                        .unwrap_or_else(|| Value::x(width, dims)),
                    Selection::OutOfRange | Selection::Anywhere => Value::x(width, dims),
                });
            }
            PrimKind::Mux { select: sel, ports } => {
                let choice = bits(*sel)?;
                return match select(&choice, ports.len()) {
                    Selection::One(i) => self.eval(ports[i], lookup),
                    Selection::Some(positions) => {
                        let mut merged: Option<Value> = None;
                        for i in positions {
                            let value = self.eval(ports[i], lookup)?;
                            merged = Some(match merged {
                                Some(prev) => prev.combine(&value),
                                None => value,
                            });
                        }
                        Ok(merged.unwrap_or_else(|| Value::x(width, dims)))
                    }
                    Selection::OutOfRange | Selection::Anywhere => Ok(Value::x(width, dims)),
                };
            }
            PrimKind::Table(entries) => {
                return entries
                    .iter()
                    .map(|&e| self.eval(e, lookup))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array);
            }
        };
        Ok(Value::Bits(result))
    }

    /// Storage nodes an expression reads, in first-encounter order.
    pub fn accessed_storage(&self, id: NodeId) -> IndexSet<NodeId> {
        let mut out = IndexSet::new();
        let mut visited = crate::HashSet::default();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let node = self.node(current);
            match &node.kind {
                PrimKind::Storage(_) => {
                    out.insert(current);
                }
                // Only the wrapped storage is read through a register.
                PrimKind::Register { storage, .. } => stack.push(*storage),
                kind => stack.extend(kind.children().into_iter().rev()),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prim::{StorageInfo, StorageKind};

    #[test]
    fn test_eval_with_lookup() {
        let mut g = Graph::new();
        let a = g.declare(StorageInfo::new("a", None, StorageKind::Wire, 8));
        let b = g.declare(StorageInfo::new("b", None, StorageKind::Wire, 8));
        let sum = g.add(a, b);
        let va = Value::Bits(BitVec::new(8, 200u32));
        let vb = Value::Bits(BitVec::new(8, 100u32));
        let lookup = |id: NodeId| {
            if id == a {
                Some(&va)
            } else if id == b {
                Some(&vb)
            } else {
                None
            }
        };
        assert_eq!(g.eval_bits(sum, &lookup).unwrap().to_u64(), Some(44));
    }

    #[test]
    fn test_eval_missing_storage_is_not_available() {
        let mut g = Graph::new();
        let a = g.declare(StorageInfo::new("a", None, StorageKind::Wire, 4));
        let n = g.not(a);
        assert_eq!(g.eval(n, &|_| None), Err(NotAvailable { node: a }));
    }

    #[test]
    fn test_index_with_unknown_bits_combines_candidates() {
        let mut g = Graph::new();
        let mem = g.declare(StorageInfo::new("mem", None, StorageKind::Reg, 4).with_dims([4]));
        let idx = g.declare(StorageInfo::new("idx", None, StorageKind::Wire, 2));
        let read = g.index(mem, idx);
        let contents = Value::Array(
            ["0001", "0011", "0111", "1111"]
                .iter()
                .map(|s| Value::Bits(s.parse().unwrap()))
                .collect(),
        );
        let index: Value = Value::Bits("0x".parse().unwrap());
        let lookup = |id: NodeId| {
            if id == mem {
                Some(&contents)
            } else if id == idx {
                Some(&index)
            } else {
                None
            }
        };
        assert_eq!(g.eval_bits(read, &lookup).unwrap().to_string(), "00x1");
    }

    #[test]
    fn test_accessed_storage_order() {
        let mut g = Graph::new();
        let a = g.declare(StorageInfo::new("a", None, StorageKind::Wire, 4));
        let b = g.declare(StorageInfo::new("b", None, StorageKind::Wire, 4));
        let x = g.and(a, b);
        let y = g.or(x, a);
        let accessed: Vec<NodeId> = g.accessed_storage(y).into_iter().collect();
        assert_eq!(accessed, vec![a, b]);
    }
}
