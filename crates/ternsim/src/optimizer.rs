use crate::circuit::{Block, Circuit};
use crate::prim::Graph;

mod continuous;
mod overwritten;
mod sync_reset;
mod width;

pub use continuous::ExtractContinuous;
pub use overwritten::RemoveOverwritten;
pub use sync_reset::LowerSyncReset;
pub use width::ReduceWidths;

pub trait CircuitPass {
    fn name(&self) -> &'static str;
    fn run(&self, circuit: &mut Circuit, graph: &mut Graph);
}

#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn CircuitPass>>,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sync-reset lowering, continuous extraction and width reduction.
    pub fn default_pipeline() -> Self {
        let mut manager = Self::new();
        manager.add_pass(LowerSyncReset);
        manager.add_pass(ExtractContinuous);
        manager.add_pass(ReduceWidths);
        manager
    }

    pub fn add_pass<P>(&mut self, pass: P)
    where
        P: CircuitPass + 'static,
    {
        self.passes.push(Box::new(pass));
    }

    pub fn run(&self, circuit: &mut Circuit, graph: &mut Graph) {
        for pass in &self.passes {
            log::debug!("running {} on {}", pass.name(), circuit.module());
            pass.run(circuit, graph);
        }
    }
}

/// Every process block of a circuit, continuous assignments excluded.
pub(crate) fn blocks_mut(circuit: &mut Circuit) -> impl Iterator<Item = &mut Block> {
    circuit
        .combinational
        .values_mut()
        .chain(circuit.clocked.values_mut())
        .chain(circuit.sync_reset.values_mut())
        .chain(circuit.async_reset.values_mut())
        .chain(circuit.initial.values_mut())
}
