use crate::prim::NodeId;
use crate::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// Receives storage values whenever the simulator quiesces.
pub trait TraceSink {
    fn record(&mut self, time: u64, values: &[(NodeId, &Value)]);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    pub time: u64,
    pub values: Vec<(NodeId, Value)>,
}

impl TraceRecord {
    pub fn value(&self, storage: NodeId) -> Option<&Value> {
        self.values
            .iter()
            .find(|(id, _)| *id == storage)
            .map(|(_, value)| value)
    }
}

/// Keeps every record in memory. Clones share the same buffer, so a test
/// can hand one clone to the simulator and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryTrace {
    records: Rc<RefCell<Vec<TraceRecord>>>,
}

impl MemoryTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TraceRecord> {
        self.records.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.records.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.borrow().is_empty()
    }
}

impl TraceSink for MemoryTrace {
    fn record(&mut self, time: u64, values: &[(NodeId, &Value)]) {
        let values = values
            .iter()
            .map(|&(id, value)| (id, value.clone()))
            .collect();
        self.records.borrow_mut().push(TraceRecord { time, values });
    }
}
