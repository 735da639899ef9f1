use super::CircuitPass;
use crate::circuit::Circuit;
use crate::prim::Graph;

/// Folds synchronous-reset blocks into the clocked block of the same clock.
///
/// Reset statements are appended after the regular ones, not placed in
/// front of them. Later statements override earlier ones, so only the
/// appended position gives the reset priority over the regular assignments.
pub struct LowerSyncReset;

impl CircuitPass for LowerSyncReset {
    fn name(&self) -> &'static str {
        "lower-sync-reset"
    }

    fn run(&self, circuit: &mut Circuit, _graph: &mut Graph) {
        for (clock, block) in std::mem::take(&mut circuit.sync_reset) {
            log::trace!("merging sync reset for clock {clock}");
            circuit.clocked.entry(clock).or_default().extend(block);
        }
    }
}
