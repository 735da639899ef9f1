use super::{BinaryOp, Graph, NodeId, PrimKind};
use crate::bitvec::BitVec;
use crate::value::Value;

/// Clock, enable and reset metadata attached to a register wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSpec {
    pub clock: NodeId,
    pub enable: Option<NodeId>,
    pub reset: Option<NodeId>,
}

impl Graph {
    pub fn constant(&mut self, bits: BitVec) -> NodeId {
        self.constant_value(Value::Bits(bits))
    }

    pub fn constant_value(&mut self, value: Value) -> NodeId {
        let kind = PrimKind::Const(value);
        if let Some(&id) = self.cache.get(&kind) {
            return id;
        }
        self.alloc(kind)
    }

    /// Fully-defined constant of `width` bits.
    pub fn literal(&mut self, width: usize, value: u64) -> NodeId {
        self.constant(BitVec::new(width, value))
    }

    pub fn register(&mut self, storage: NodeId, spec: RegisterSpec) -> NodeId {
        self.intern(PrimKind::Register {
            storage,
            clock: spec.clock,
            enable: spec.enable,
            reset: spec.reset,
        })
    }

    pub fn not(&mut self, arg: NodeId) -> NodeId {
        self.intern(PrimKind::Not(arg))
    }

    pub fn binary(&mut self, op: BinaryOp, a: NodeId, b: NodeId) -> NodeId {
        self.intern(PrimKind::Binary(op, a, b))
    }

    pub fn and(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(BinaryOp::And, a, b)
    }

    pub fn or(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(BinaryOp::Or, a, b)
    }

    pub fn xor(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(BinaryOp::Xor, a, b)
    }

    pub fn add(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(BinaryOp::Add, a, b)
    }

    pub fn sub(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(BinaryOp::Sub, a, b)
    }

    pub fn mul(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(BinaryOp::Mul, a, b)
    }

    pub fn eq(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(BinaryOp::Eq, a, b)
    }

    pub fn ne(&mut self, a: NodeId, b: NodeId) -> NodeId {
        let eq = self.eq(a, b);
        self.not(eq)
    }

    pub fn lt(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(BinaryOp::Lt, a, b)
    }

    pub fn signed_lt(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.binary(BinaryOp::SignedLt, a, b)
    }

    pub fn sign_extend(&mut self, arg: NodeId, width: usize) -> NodeId {
        if self.width(self.simplify_read(arg)) == width {
            return self.simplify_read(arg);
        }
        self.intern(PrimKind::SignExtend { arg, width })
    }

    pub fn zero_extend(&mut self, arg: NodeId, width: usize) -> NodeId {
        if self.width(self.simplify_read(arg)) == width {
            return self.simplify_read(arg);
        }
        self.intern(PrimKind::ZeroExtend { arg, width })
    }

    pub fn slice(&mut self, base: NodeId, start: usize, len: usize) -> NodeId {
        let base = self.simplify_read(base);
        if start == 0 && len == self.width(base) && self.node(base).is_scalar() {
            return base;
        }
        self.intern(PrimKind::Slice { base, start, len })
    }

    /// Low `width` bits of `arg`.
    pub fn truncate(&mut self, arg: NodeId, width: usize) -> NodeId {
        self.slice(arg, 0, width)
    }

    pub fn repeat(&mut self, arg: NodeId, count: usize) -> NodeId {
        self.intern(PrimKind::Repeat { arg, count })
    }

    /// Single bit of `base` selected by a (possibly dynamic) index.
    pub fn bit(&mut self, base: NodeId, index: NodeId) -> NodeId {
        self.intern(PrimKind::BitIndex { base, index })
    }

    /// Element of an array selected by a (possibly dynamic) index.
    pub fn index(&mut self, base: NodeId, index: NodeId) -> NodeId {
        self.intern(PrimKind::Index { base, index })
    }

    pub fn mux(&mut self, select: NodeId, ports: Vec<NodeId>) -> NodeId {
        self.intern(PrimKind::Mux { select, ports })
    }

    pub fn table(&mut self, entries: Vec<NodeId>) -> NodeId {
        self.intern(PrimKind::Table(entries))
    }

    /// Concatenation, most significant part first.
    pub fn concat(&mut self, parts: Vec<NodeId>) -> NodeId {
        if parts.len() == 1 {
            return self.simplify_read(parts[0]);
        }
        self.intern(PrimKind::Concat(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prim::{AccessSet, Direction, StorageInfo, StorageKind};

    fn wire(g: &mut Graph, name: &str, width: usize) -> NodeId {
        g.declare(StorageInfo::new(name, None, StorageKind::Wire, width))
    }

    #[test]
    fn test_hash_consing_returns_same_node() {
        let mut g = Graph::new();
        let a = wire(&mut g, "a", 8);
        let b = wire(&mut g, "b", 8);
        let x = g.add(a, b);
        let y = g.add(a, b);
        assert_eq!(x, y);
        let z = g.add(b, a);
        assert_ne!(x, z);
    }

    #[test]
    fn test_storage_is_never_deduplicated() {
        let mut g = Graph::new();
        let a = wire(&mut g, "a", 8);
        let b = wire(&mut g, "a", 8);
        assert_ne!(a, b);
    }

    #[test]
    fn test_constant_operands_fold() {
        let mut g = Graph::new();
        let a = g.literal(8, 200);
        let b = g.literal(8, 100);
        let sum = g.add(a, b);
        assert_eq!(g.const_bits(sum).unwrap().to_u64(), Some(44));
        let cmp = g.lt(b, a);
        assert_eq!(g.const_bits(cmp).unwrap().to_u64(), Some(1));
        let x = g.constant(BitVec::x(8));
        let zero = g.literal(8, 0);
        let masked = g.and(x, zero);
        assert_eq!(g.const_bits(masked).unwrap().to_u64(), Some(0));
    }

    #[test]
    fn test_register_reads_collapse_to_storage() {
        let mut g = Graph::new();
        let clk = wire(&mut g, "clk", 1);
        let q = g.declare(StorageInfo::new("q", None, StorageKind::Reg, 4));
        let reg = g.register(
            q,
            RegisterSpec {
                clock: clk,
                enable: None,
                reset: None,
            },
        );
        let one = g.literal(4, 1);
        assert_eq!(g.add(reg, one), g.add(q, one));
    }

    #[test]
    fn test_table_index_becomes_mux() {
        let mut g = Graph::new();
        let sel = wire(&mut g, "sel", 2);
        let a = wire(&mut g, "a", 4);
        let b = wire(&mut g, "b", 4);
        let table = g.table(vec![a, b]);
        let read = g.index(table, sel);
        assert!(matches!(
            &g.node(read).kind,
            PrimKind::Mux { select, ports } if *select == sel && ports == &vec![a, b]
        ));
    }

    #[test]
    fn test_access_sets_follow_structure() {
        let mut g = Graph::new();
        let top = g.add_module("top", None);
        let child = g.add_module("child", Some(top));
        let input = g.declare(StorageInfo::new(
            "i",
            Some(child),
            StorageKind::Port(Direction::Input),
            4,
        ));
        let internal = g.declare(StorageInfo::new("r", Some(child), StorageKind::Reg, 4));
        let sum = g.add(input, internal);
        assert!(g.node(input).writers.contains(top));
        assert!(!g.node(input).writers.contains(child));
        assert!(g.node(input).readers.contains(top));
        assert_eq!(g.node(sum).readers, AccessSet::only([child]));
        assert_eq!(g.node(sum).writers, AccessSet::none());
        let slice = g.slice(internal, 1, 2);
        assert_eq!(g.node(slice).writers, AccessSet::only([child]));
    }

    #[test]
    #[should_panic(expected = "cannot all be selected")]
    fn test_mux_with_more_ports_than_select_values_panics() {
        let mut g = Graph::new();
        let sel = wire(&mut g, "sel", 1);
        let ports: Vec<_> = (0..3).map(|i| wire(&mut g, &format!("p{i}"), 4)).collect();
        g.mux(sel, ports);
    }

    #[test]
    fn test_narrow_table_index_drops_unreachable_entries() {
        let mut g = Graph::new();
        let sel = wire(&mut g, "sel", 1);
        let entries: Vec<_> = (0..3).map(|i| wire(&mut g, &format!("e{i}"), 4)).collect();
        let table = g.table(entries.clone());
        let read = g.index(table, sel);
        assert!(matches!(
            &g.node(read).kind,
            PrimKind::Mux { ports, .. } if ports[..] == entries[..2]
        ));
    }

    #[test]
    #[should_panic(expected = "mismatched operand widths")]
    fn test_width_mismatch_panics() {
        let mut g = Graph::new();
        let a = wire(&mut g, "a", 8);
        let b = wire(&mut g, "b", 4);
        g.add(a, b);
    }
}
