use super::SimError;
use super::engine::Engine;
use crate::bitvec::{BitVec, Ternary};
use crate::prim::NodeId;
use crate::value::Value;
use indexmap::IndexSet;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub usize);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread{}", self.0)
    }
}

/// Something a suspended process can wait for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The current instant has no more activity.
    Settled,
    /// Absolute simulation time.
    At(u64),
    /// Relative to the time the process suspends.
    Delay(u64),
    /// Any change of the expression's value.
    Change(NodeId),
    /// Rising edge of `signal`, optionally only while `enable` was high
    /// just before the edge.
    Edge {
        signal: NodeId,
        enable: Option<NodeId>,
    },
}

/// What a process does after returning control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wait {
    Done,
    /// Resume on whichever event fires first.
    On(Vec<Event>),
}

impl Wait {
    pub fn on(event: Event) -> Self {
        Wait::On(vec![event])
    }

    pub fn after(delay: u64) -> Self {
        Wait::on(Event::Delay(delay))
    }
}

/// A cooperative testbench process. Each call runs until the next
/// suspension point.
pub trait Process {
    fn resume(&mut self, ctx: &mut ThreadContext<'_>) -> Result<Wait, SimError>;
}

impl<F> Process for F
where
    F: FnMut(&mut ThreadContext<'_>) -> Result<Wait, SimError>,
{
    fn resume(&mut self, ctx: &mut ThreadContext<'_>) -> Result<Wait, SimError> {
        self(ctx)
    }
}

/// Run-loop state shared with running processes.
#[derive(Default)]
pub(crate) struct Control {
    pub(crate) busy: usize,
    pub(crate) stop: bool,
    pub(crate) spawned: Vec<Box<dyn Process>>,
}

impl Control {
    pub(crate) fn done(&mut self) -> Result<(), SimError> {
        self.busy = self.busy.checked_sub(1).ok_or(SimError::UnbalancedDone)?;
        Ok(())
    }
}

/// Handle a resumed process uses to observe and drive the design.
pub struct ThreadContext<'a> {
    pub(crate) engine: &'a mut Engine,
    pub(crate) control: &'a mut Control,
}

impl ThreadContext<'_> {
    pub fn peek(&self, expr: NodeId) -> Result<Value, SimError> {
        self.engine.eval(expr)
    }

    pub fn peek_bits(&self, expr: NodeId) -> Result<BitVec, SimError> {
        self.engine.eval_bits(expr)
    }

    pub fn poke(&mut self, lvalue: NodeId, value: impl Into<Value>) -> Result<(), SimError> {
        self.engine.poke(lvalue, &value.into())
    }

    pub fn time(&self) -> u64 {
        self.engine.time
    }

    /// Marks in-flight work so the run loop does not report idle.
    pub fn busy(&mut self) {
        self.control.busy += 1;
    }

    pub fn done(&mut self) -> Result<(), SimError> {
        self.control.done()
    }

    /// Ends the current `run` once this instant quiesces.
    pub fn stop(&mut self) {
        self.control.stop = true;
    }

    /// Starts another process; it first runs later in the same instant.
    pub fn spawn(&mut self, process: impl Process + 'static) {
        self.control.spawned.push(Box::new(process));
    }
}

struct Slot {
    process: Option<Box<dyn Process>>,
    /// Bumped on every wake so stale timers and watches are ignored.
    generation: u64,
}

#[derive(Debug, PartialEq, Eq)]
struct Timer {
    time: u64,
    seq: u64,
    thread: ThreadId,
    generation: u64,
}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        // Earliest first on a max-heap; ties resolve in scheduling order.
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

enum Watch {
    Change {
        expr: NodeId,
        storages: Vec<NodeId>,
        last: Value,
    },
    Edge {
        signal: NodeId,
        enable: Option<NodeId>,
        storages: Vec<NodeId>,
        last: Ternary,
    },
}

impl Watch {
    fn storages(&self) -> &[NodeId] {
        match self {
            Watch::Change { storages, .. } | Watch::Edge { storages, .. } => storages,
        }
    }
}

/// Registered processes and what each is waiting for.
#[derive(Default)]
pub(crate) struct Threads {
    slots: Vec<Slot>,
    /// Ready to resume, in the order they became ready.
    pending: IndexSet<ThreadId>,
    settled: IndexSet<ThreadId>,
    timers: BinaryHeap<Timer>,
    watches: Vec<(ThreadId, Watch)>,
    seq: u64,
}

impl Threads {
    pub(crate) fn spawn(&mut self, process: Box<dyn Process>) -> ThreadId {
        let id = ThreadId(self.slots.len());
        self.slots.push(Slot {
            process: Some(process),
            generation: 0,
        });
        self.pending.insert(id);
        id
    }

    pub(crate) fn take_pending(&mut self) -> Vec<ThreadId> {
        self.pending.drain(..).collect()
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Takes the process out of its slot for the duration of a resume.
    pub(crate) fn checkout(&mut self, id: ThreadId) -> Option<Box<dyn Process>> {
        self.slots[id.0].process.take()
    }

    /// Puts a suspended process back and subscribes it to `events`.
    pub(crate) fn suspend(
        &mut self,
        id: ThreadId,
        process: Box<dyn Process>,
        events: Vec<Event>,
        engine: &Engine,
    ) -> Result<(), SimError> {
        self.slots[id.0].process = Some(process);
        let generation = self.slots[id.0].generation;
        let now = engine.time;
        for event in events {
            match event {
                Event::Settled => {
                    self.settled.insert(id);
                }
                Event::At(at) if at < now => return Err(SimError::EventInPast { at, now }),
                Event::At(time) => self.schedule(id, generation, time),
                Event::Delay(delay) => {
                    let at = now
                        .checked_add(delay)
                        .ok_or(SimError::TimeOverflow { delay, now })?;
                    self.schedule(id, generation, at);
                }
                Event::Change(expr) => {
                    let watch = Watch::Change {
                        expr,
                        storages: engine.graph().accessed_storage(expr).into_iter().collect(),
                        last: engine.eval(expr)?,
                    };
                    self.watches.push((id, watch));
                }
                Event::Edge { signal, enable } => {
                    let watch = Watch::Edge {
                        signal,
                        enable,
                        storages: engine.graph().accessed_storage(signal).into_iter().collect(),
                        last: engine.eval_bits(signal)?.truthiness(),
                    };
                    self.watches.push((id, watch));
                }
            }
        }
        Ok(())
    }

    fn schedule(&mut self, thread: ThreadId, generation: u64, time: u64) {
        self.seq += 1;
        self.timers.push(Timer {
            time,
            seq: self.seq,
            thread,
            generation,
        });
    }

    /// Moves `id` to the pending set and drops all its subscriptions.
    fn wake(&mut self, id: ThreadId) {
        let slot = &mut self.slots[id.0];
        slot.generation += 1;
        self.settled.shift_remove(&id);
        self.watches.retain(|(owner, _)| *owner != id);
        self.pending.insert(id);
    }

    /// Wakes watchers affected by changes to `changed`. Edge enables are
    /// sampled now, before clocked logic reacts to the edge.
    pub(crate) fn notify(&mut self, changed: &[NodeId], engine: &Engine) -> Result<(), SimError> {
        if changed.is_empty() {
            return Ok(());
        }
        let mut woken = Vec::new();
        for (owner, watch) in &mut self.watches {
            if !watch.storages().iter().any(|s| changed.contains(s)) {
                continue;
            }
            let fire = match watch {
                Watch::Change { expr, last, .. } => {
                    let value = engine.eval(*expr)?;
                    let fire = value != *last;
                    *last = value;
                    fire
                }
                Watch::Edge {
                    signal,
                    enable,
                    last,
                    ..
                } => {
                    let level = engine.eval_bits(*signal)?.truthiness();
                    let rising = *last == Ternary::False && level == Ternary::True;
                    *last = level;
                    let enabled = match enable {
                        Some(enable) => engine.eval_bits(*enable)?.truthiness().is_true(),
                        None => true,
                    };
                    rising && enabled
                }
            };
            if fire && !woken.contains(owner) {
                woken.push(*owner);
            }
        }
        for id in woken {
            self.wake(id);
        }
        Ok(())
    }

    /// Wakes every process waiting for the instant to settle.
    pub(crate) fn release_settled(&mut self) -> bool {
        let ids: Vec<ThreadId> = self.settled.iter().copied().collect();
        for &id in &ids {
            self.wake(id);
        }
        !ids.is_empty()
    }

    /// Earliest live timer.
    pub(crate) fn next_time(&mut self) -> Option<u64> {
        while let Some(timer) = self.timers.peek() {
            if self.slots[timer.thread.0].generation == timer.generation {
                return Some(timer.time);
            }
            self.timers.pop();
        }
        None
    }

    /// Wakes every live timer due at or before `time`.
    pub(crate) fn fire_timers(&mut self, time: u64) {
        while let Some(timer) = self.timers.peek() {
            if timer.time > time {
                break;
            }
            let Some(timer) = self.timers.pop() else {
                break;
            };
            if self.slots[timer.thread.0].generation == timer.generation {
                self.wake(timer.thread);
            }
        }
    }

    pub(crate) fn remove(&mut self, id: ThreadId) {
        let slot = &mut self.slots[id.0];
        slot.process = None;
        slot.generation += 1;
        self.settled.shift_remove(&id);
        self.watches.retain(|(owner, _)| *owner != id);
    }

    /// Live processes, suspended or pending.
    pub(crate) fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.process.is_some()).count()
    }
}

/// Waits on `event`, then runs `callback` once.
pub(crate) struct OnEvent<F> {
    pub(crate) event: Event,
    pub(crate) armed: bool,
    pub(crate) repeat: bool,
    pub(crate) callback: F,
}

impl<F> Process for OnEvent<F>
where
    F: FnMut(&mut ThreadContext<'_>) -> Result<(), SimError>,
{
    fn resume(&mut self, ctx: &mut ThreadContext<'_>) -> Result<Wait, SimError> {
        if self.armed {
            (self.callback)(ctx)?;
            if !self.repeat {
                return Ok(Wait::Done);
            }
        }
        self.armed = true;
        Ok(Wait::on(self.event.clone()))
    }
}

/// Toggles a one-bit target every half period, starting low.
pub(crate) struct ClockDriver {
    pub(crate) target: NodeId,
    pub(crate) half_period: u64,
    pub(crate) level: bool,
}

impl Process for ClockDriver {
    fn resume(&mut self, ctx: &mut ThreadContext<'_>) -> Result<Wait, SimError> {
        ctx.poke(self.target, BitVec::from_bool(self.level))?;
        self.level = !self.level;
        Ok(Wait::after(self.half_period))
    }
}
