use insta::assert_snapshot;
use proptest::prelude::*;
use ternsim::{
    AssignKind, BitVec, Block, Circuit, CircuitPass, Condition, Design, Graph, NodeId,
    RemoveOverwritten, StorageInfo, StorageKind, Value,
};

fn wire(g: &mut Graph, name: &str, width: usize) -> NodeId {
    g.declare(StorageInfo::new(name, None, StorageKind::Wire, width))
}

fn render(block: &Block, graph: &Graph) -> String {
    block.display(graph).to_string()
}

#[test]
fn test_nested_full_cover_drops_earlier_write() {
    let mut design = Design::new();
    let top = design.add_module("top", None);
    let g = &mut design.graph;
    let a = wire(g, "a", 1);
    let b = wire(g, "b", 1);
    let x = wire(g, "x", 2);
    let values: Vec<NodeId> = (0..4).map(|v| g.literal(2, v)).collect();

    let assign = |design: &mut Design, path: &[Condition], value| {
        design
            .assign(top, AssignKind::Combinational, path, x, value)
            .unwrap();
    };
    assign(&mut design, &[], values[0]);
    assign(
        &mut design,
        &[Condition::when(a), Condition::when(b)],
        values[1],
    );
    assign(
        &mut design,
        &[Condition::when(a), Condition::unless(b)],
        values[2],
    );
    assign(&mut design, &[Condition::unless(a)], values[3]);

    let mut circuit: Circuit = design.circuit(top).clone();
    assert_snapshot!(render(&circuit.combinational()[&x], &design.graph), @r"
    x = 2'b00;
    if a {
        if b {
            x = 2'b01;
        } else {
            x = 2'b10;
        }
    } else {
        x = 2'b11;
    }
    ");

    RemoveOverwritten.run(&mut circuit, &mut design.graph);
    assert_snapshot!(render(&circuit.combinational()[&x], &design.graph), @r"
    if a {
        if b {
            x = 2'b01;
        } else {
            x = 2'b10;
        }
    } else {
        x = 2'b11;
    }
    ");
}

#[test]
fn test_partial_cover_keeps_default() {
    let mut design = Design::new();
    let top = design.add_module("top", None);
    let g = &mut design.graph;
    let a = wire(g, "a", 1);
    let b = wire(g, "b", 1);
    let x = wire(g, "x", 2);
    let zero = g.literal(2, 0);
    let one = g.literal(2, 1);
    design
        .assign(top, AssignKind::Combinational, &[], x, zero)
        .unwrap();
    design
        .assign(
            top,
            AssignKind::Combinational,
            &[Condition::when(a), Condition::when(b)],
            x,
            one,
        )
        .unwrap();
    let mut circuit = design.circuit(top).clone();
    RemoveOverwritten.run(&mut circuit, &mut design.graph);
    assert_eq!(circuit.combinational()[&x].statements.len(), 2);
}

#[test]
fn test_finalize_narrows_wide_arithmetic() {
    let mut design = Design::new();
    let top = design.add_module("top", None);
    let g = &mut design.graph;
    let a = wire(g, "a", 16);
    let b = wire(g, "b", 16);
    let y = wire(g, "y", 4);
    let sum = g.add(a, b);
    design
        .assign(top, AssignKind::Continuous, &[], y, sum)
        .unwrap();
    design.finalize();
    let (_, rvalue) = design.circuit(top).continuous()[&y][0];
    assert_eq!(design.graph.width(rvalue), 4);
    assert_snapshot!(design.graph.display(rvalue).to_string(), @"(a[0 +: 4] + b[0 +: 4])");
}

#[derive(Debug, Clone)]
enum Step {
    Not(usize),
    Binary(u8, usize, usize),
    Compare(u8, usize, usize),
    Window(usize, usize),
    SignWindow(usize, usize),
    Mux(usize, usize, usize),
    Const(u8),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        any::<usize>().prop_map(Step::Not),
        (0u8..6, any::<usize>(), any::<usize>()).prop_map(|(op, a, b)| Step::Binary(op, a, b)),
        (0u8..3, any::<usize>(), any::<usize>()).prop_map(|(op, a, b)| Step::Compare(op, a, b)),
        (any::<usize>(), 0usize..=4).prop_map(|(a, s)| Step::Window(a, s)),
        (any::<usize>(), 0usize..=4).prop_map(|(a, s)| Step::SignWindow(a, s)),
        (any::<usize>(), any::<usize>(), any::<usize>()).prop_map(|(s, a, b)| Step::Mux(s, a, b)),
        any::<u8>().prop_map(Step::Const),
    ]
}

/// Builds an 8-bit expression over `inputs` from a list of steps. Every
/// step produces an 8-bit node and may use any earlier one.
fn build(g: &mut Graph, inputs: &[NodeId], steps: &[Step]) -> NodeId {
    let mut nodes = inputs.to_vec();
    for step in steps {
        let pick = |i: usize| nodes[i % nodes.len()];
        let node = match *step {
            Step::Not(a) => g.not(pick(a)),
            Step::Binary(op, a, b) => {
                let (a, b) = (pick(a), pick(b));
                match op {
                    0 => g.and(a, b),
                    1 => g.or(a, b),
                    2 => g.xor(a, b),
                    3 => g.add(a, b),
                    4 => g.sub(a, b),
                    _ => g.mul(a, b),
                }
            }
            Step::Compare(op, a, b) => {
                let (a, b) = (pick(a), pick(b));
                let bit = match op {
                    0 => g.eq(a, b),
                    1 => g.lt(a, b),
                    _ => g.signed_lt(a, b),
                };
                g.zero_extend(bit, 8)
            }
            Step::Window(a, start) => {
                let wide = g.zero_extend(pick(a), 12);
                g.slice(wide, start, 8)
            }
            Step::SignWindow(a, start) => {
                let wide = g.sign_extend(pick(a), 12);
                g.slice(wide, start, 8)
            }
            Step::Mux(s, a, b) => {
                let at = g.truncate(inputs[0], 3);
                let select = g.bit(pick(s), at);
                g.mux(select, vec![pick(a), pick(b)])
            }
            Step::Const(v) => g.literal(8, v as u64),
        };
        nodes.push(node);
    }
    nodes[nodes.len() - 1]
}

proptest! {
    #[test]
    fn prop_width_reduction_preserves_observed_bits(
        steps in prop::collection::vec(step(), 1..10),
        out_width in 1usize..=8,
        a in any::<u8>(),
        b in any::<u8>(),
    ) {
        let mut design = Design::new();
        let top = design.add_module("top", None);
        let g = &mut design.graph;
        let ia = wire(g, "a", 8);
        let ib = wire(g, "b", 8);
        let out = wire(g, "out", out_width);
        let expr = build(g, &[ia, ib], &steps);
        design.assign(top, AssignKind::Continuous, &[], out, expr).unwrap();

        let inputs = [
            (ia, Value::Bits(BitVec::new(8, a))),
            (ib, Value::Bits(BitVec::new(8, b))),
        ];
        let lookup = |id: NodeId| inputs.iter().find(|(n, _)| *n == id).map(|(_, v)| v);
        let before = design.graph.eval_bits(expr, &lookup).unwrap();

        design.finalize();
        let (_, reduced) = design.circuit(top).continuous()[&out][0];
        let after = design.graph.eval_bits(reduced, &lookup).unwrap();
        prop_assert_eq!(after.resize(out_width), before.resize(out_width));
    }
}
