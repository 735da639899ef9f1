use crate::prim::{ModuleId, NodeId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid simulator options: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum SimError {
    #[error("combinational logic did not settle after {iterations} evaluations at time {time}")]
    CombinationalLoop { iterations: usize, time: u64 },
    #[error("event scheduled at {at} is in the past (now {now})")]
    EventInPast { at: u64, now: u64 },
    #[error("delay of {delay} from time {now} overflows the time counter")]
    TimeOverflow { delay: u64, now: u64 },
    #[error("no further events but {busy} busy token(s) are still held")]
    Deadlock { busy: usize },
    #[error("done() called without a matching busy()")]
    UnbalancedDone,
    #[error("circuit of {module} has not been finalized")]
    NotFinalized { module: ModuleId },
    #[error("clock period {period} is not a positive even number")]
    InvalidClockPeriod { period: u64 },
    #[error("value of {node} is not available")]
    ValueNotAvailable { node: NodeId },
    #[error("process failed: {0}")]
    Process(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SimError {
    /// Failure raised by testbench code.
    pub fn process(message: impl Into<String>) -> Self {
        SimError::Process(message.into())
    }
}

impl From<crate::prim::NotAvailable> for SimError {
    fn from(err: crate::prim::NotAvailable) -> Self {
        SimError::ValueNotAvailable { node: err.node }
    }
}
