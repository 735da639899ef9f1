use super::CircuitPass;
use crate::circuit::{Circuit, Statement};
use crate::prim::Graph;

/// Turns combinational blocks that consist of a single unconditional
/// whole-storage assignment into continuous assignments.
pub struct ExtractContinuous;

impl CircuitPass for ExtractContinuous {
    fn name(&self) -> &'static str {
        "extract-continuous"
    }

    fn run(&self, circuit: &mut Circuit, _graph: &mut Graph) {
        let extractable: Vec<_> = circuit
            .combinational
            .iter()
            .filter_map(|(&key, block)| match block.statements.as_slice() {
                [Statement::Assign {
                    storage,
                    lvalue,
                    rvalue,
                }] if *storage == key && *lvalue == key => Some((key, *rvalue)),
                _ => None,
            })
            .collect();
        for (storage, rvalue) in extractable {
            circuit.combinational.shift_remove(&storage);
            circuit
                .continuous
                .entry(storage)
                .or_default()
                .push((storage, rvalue));
        }
    }
}
