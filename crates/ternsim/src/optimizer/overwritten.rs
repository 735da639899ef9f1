use super::{CircuitPass, blocks_mut};
use crate::HashSet;
use crate::circuit::{Block, Circuit, Statement};
use crate::prim::{Graph, NodeId};

/// Drops assignments that a later statement in the same block always
/// overwrites. Not part of the default pipeline.
pub struct RemoveOverwritten;

impl CircuitPass for RemoveOverwritten {
    fn name(&self) -> &'static str {
        "remove-overwritten"
    }

    fn run(&self, circuit: &mut Circuit, _graph: &mut Graph) {
        for block in blocks_mut(circuit) {
            remove_overwritten(block);
        }
    }
}

pub(crate) fn remove_overwritten(block: &mut Block) {
    let mut written = HashSet::default();
    prune(block, &mut written);
}

/// Walks `block` backwards. `written` holds the lvalues unconditionally
/// assigned after the current position.
fn prune(block: &mut Block, written: &mut HashSet<NodeId>) {
    let mut kept = Vec::with_capacity(block.statements.len());
    for statement in std::mem::take(&mut block.statements).into_iter().rev() {
        match statement {
            Statement::Assign {
                storage, lvalue, ..
            } => {
                if written.contains(&lvalue) || written.contains(&storage) {
                    log::trace!("dropping overwritten assignment to {lvalue}");
                    continue;
                }
                written.insert(lvalue);
                kept.push(statement);
            }
            Statement::If {
                cond,
                mut then_block,
                mut else_block,
            } => {
                let mut then_written = written.clone();
                prune(&mut then_block, &mut then_written);
                let mut else_written = written.clone();
                prune(&mut else_block, &mut else_written);
                *written = then_written.intersection(&else_written).copied().collect();
                if then_block.is_empty() && else_block.is_empty() {
                    continue;
                }
                kept.push(Statement::If {
                    cond,
                    then_block,
                    else_block,
                });
            }
        }
    }
    kept.reverse();
    block.statements = kept;
}
