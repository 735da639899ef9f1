mod builder;
mod engine;
mod error;
mod poke;
mod store;
mod thread;
mod trace;

pub use builder::{SimulatorBuilder, SimulatorOptions};
pub use error::{ConfigError, SimError};
pub use thread::{Event, Process, ThreadContext, ThreadId, Wait};
pub use trace::{MemoryTrace, TraceRecord, TraceSink};

use crate::bitvec::BitVec;
use crate::circuit::Design;
use crate::prim::{Graph, NodeId};
use crate::value::Value;
use engine::Engine;
use thread::{ClockDriver, Control, OnEvent, Threads};

/// Why [`Simulator::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The instant quiesced with no busy tokens held.
    Idle,
    /// A process or the caller requested a stop.
    Stopped,
    /// The next event lies beyond the timeout.
    TimedOut,
    /// No scheduled events remain.
    Exhausted,
}

pub struct Simulator {
    engine: Engine,
    threads: Threads,
    control: Control,
    trace: Option<Box<dyn TraceSink>>,
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("time", &self.engine.time)
            .field("threads", &self.threads.live())
            .field("busy", &self.control.busy)
            .finish()
    }
}

impl Simulator {
    pub fn builder(design: Design) -> SimulatorBuilder {
        SimulatorBuilder::new(design)
    }

    pub(crate) fn new(
        design: Design,
        options: SimulatorOptions,
        trace: Option<Box<dyn TraceSink>>,
    ) -> Self {
        Self {
            engine: Engine::new(design, options),
            threads: Threads::default(),
            control: Control::default(),
            trace,
        }
    }

    pub fn design(&self) -> &Design {
        &self.engine.design
    }

    pub fn graph(&self) -> &Graph {
        self.engine.graph()
    }

    /// Clears every storage to X, replays the initial blocks and settles.
    /// Time and registered processes are kept.
    pub fn reset(&mut self) -> Result<(), SimError> {
        self.engine.reset()
    }

    pub fn peek(&self, expr: NodeId) -> Result<Value, SimError> {
        self.engine.eval(expr)
    }

    pub fn peek_bits(&self, expr: NodeId) -> Result<BitVec, SimError> {
        self.engine.eval_bits(expr)
    }

    /// Drives `lvalue`. Dependent logic reacts on the next step.
    pub fn poke(&mut self, lvalue: NodeId, value: impl Into<Value>) -> Result<(), SimError> {
        self.engine.poke(lvalue, &value.into())
    }

    pub fn step_combinational(&mut self) -> Result<(), SimError> {
        self.engine.step_combinational()
    }

    pub fn step(&mut self) -> Result<(), SimError> {
        self.engine.step()
    }

    pub fn time(&self) -> u64 {
        self.engine.time
    }

    /// Feeds the current storage values to the trace sink, if any.
    pub fn dump(&mut self) {
        if let Some(sink) = &mut self.trace {
            sink.record(self.engine.time, &self.engine.snapshot());
        }
    }

    /// Registers a process. It first runs in the next instant of [`Simulator::run`].
    pub fn thread(&mut self, process: impl Process + 'static) -> ThreadId {
        self.threads.spawn(Box::new(process))
    }

    /// Runs `callback` once, the first time `event` fires.
    pub fn on<F>(&mut self, event: Event, callback: F) -> ThreadId
    where
        F: FnMut(&mut ThreadContext<'_>) -> Result<(), SimError> + 'static,
    {
        self.thread(OnEvent {
            event,
            armed: false,
            repeat: false,
            callback,
        })
    }

    /// Runs `callback` every time `event` fires.
    pub fn always_on<F>(&mut self, event: Event, callback: F) -> ThreadId
    where
        F: FnMut(&mut ThreadContext<'_>) -> Result<(), SimError> + 'static,
    {
        self.thread(OnEvent {
            event,
            armed: false,
            repeat: true,
            callback,
        })
    }

    /// Toggles `target` forever: low at the current time, high half a
    /// period later.
    pub fn clock(&mut self, target: NodeId, period: u64) -> Result<ThreadId, SimError> {
        if period < 2 || period % 2 != 0 {
            return Err(SimError::InvalidClockPeriod { period });
        }
        assert_eq!(
            self.graph().width(target),
            1,
            "clock target {} must be one bit wide",
            self.graph().display(target)
        );
        Ok(self.thread(ClockDriver {
            target,
            half_period: period / 2,
            level: false,
        }))
    }

    pub fn busy(&mut self) {
        self.control.busy += 1;
    }

    pub fn done(&mut self) -> Result<(), SimError> {
        self.control.done()
    }

    /// Makes the current or next [`Simulator::run`] return once its instant
    /// quiesces.
    pub fn stop(&mut self) {
        self.control.stop = true;
    }

    /// Runs instants and advances time until stopped, idle, out of events
    /// or past `timeout` time units from now. Suspended processes survive
    /// and continue on the next call.
    pub fn run(&mut self, timeout: Option<u64>, stop_on_idle: bool) -> Result<RunOutcome, SimError> {
        let deadline = timeout.map(|t| self.engine.time.saturating_add(t));
        let outcome = loop {
            self.run_instant()?;
            if std::mem::take(&mut self.control.stop) {
                break RunOutcome::Stopped;
            }
            if stop_on_idle && self.control.busy == 0 {
                break RunOutcome::Idle;
            }
            let Some(next) = self.threads.next_time() else {
                if self.control.busy > 0 {
                    return Err(SimError::Deadlock {
                        busy: self.control.busy,
                    });
                }
                break RunOutcome::Exhausted;
            };
            if let Some(deadline) = deadline {
                if next > deadline {
                    self.engine.time = deadline;
                    break RunOutcome::TimedOut;
                }
            }
            log::debug!("advancing time {} -> {}", self.engine.time, next);
            self.engine.time = next;
            self.threads.fire_timers(next);
        };
        log::debug!("run finished at time {}: {:?}", self.engine.time, outcome);
        Ok(outcome)
    }

    /// Alternates logic and process execution until the current instant
    /// has no activity left.
    fn run_instant(&mut self) -> Result<(), SimError> {
        // Settled waiters are released at most once between value changes.
        let mut active = true;
        loop {
            let changed = self.engine.take_changed();
            active |= !changed.is_empty();
            self.threads.notify(&changed, &self.engine)?;
            if self.engine.has_work() {
                self.engine.step()?;
            } else if self.threads.has_pending() {
                self.resume_pending()?;
            } else if active && self.threads.release_settled() {
                active = false;
            } else {
                break;
            }
        }
        if self.engine.options().trace_on_quiesce {
            self.dump();
        }
        Ok(())
    }

    /// Resumes every pending process in the order it became ready.
    fn resume_pending(&mut self) -> Result<(), SimError> {
        for id in self.threads.take_pending() {
            let Some(mut process) = self.threads.checkout(id) else {
                continue;
            };
            log::trace!("resuming {id} at time {}", self.engine.time);
            let mut ctx = ThreadContext {
                engine: &mut self.engine,
                control: &mut self.control,
            };
            match process.resume(&mut ctx)? {
                Wait::Done => self.threads.remove(id),
                Wait::On(events) => self.threads.suspend(id, process, events, &self.engine)?,
            }
            for spawned in std::mem::take(&mut self.control.spawned) {
                self.threads.spawn(spawned);
            }
        }
        Ok(())
    }
}
