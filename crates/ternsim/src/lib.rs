mod bitvec;
mod circuit;
mod optimizer;
mod prim;
mod simulator;
mod value;

pub(crate) use fxhash::FxHashMap as HashMap;
pub(crate) use fxhash::FxHashSet as HashSet;

pub use bitvec::{BitVec, ParseBitVecError, Ternary, Values};
pub use circuit::{AccessError, AccessKind, AssignKind, Block, Circuit, Condition, Design, Statement};
pub use optimizer::{
    CircuitPass, ExtractContinuous, LowerSyncReset, PassManager, ReduceWidths,
    RemoveOverwritten,
};
pub use prim::{
    AccessSet, BinaryOp, Direction, Graph, ModuleId, ModuleInfo, NodeDisplay, NodeId,
    NotAvailable, PrimKind, PrimNode, RegisterSpec, StorageInfo, StorageKind,
};
pub use simulator::{
    ConfigError, Event, MemoryTrace, Process, RunOutcome, SimError, Simulator, SimulatorBuilder,
    SimulatorOptions, ThreadContext, ThreadId, TraceRecord, TraceSink, Wait,
};
pub use value::Value;
