use std::cell::{Cell, RefCell};
use std::rc::Rc;
use ternsim::{
    AssignKind, BitVec, Design, Event, MemoryTrace, NodeId, RunOutcome, SimError, Simulator,
    SimulatorOptions, StorageInfo, StorageKind, ThreadContext, Wait,
};

struct Counter {
    clk: NodeId,
    en: NodeId,
    count: NodeId,
}

/// A 4-bit counter that starts at zero and increments on every rising edge.
fn counter() -> (Design, Counter) {
    let mut design = Design::new();
    let top = design.add_module("top", None);
    let g = &mut design.graph;
    let clk = g.declare(StorageInfo::new("clk", None, StorageKind::Wire, 1));
    let en = g.declare(StorageInfo::new("en", None, StorageKind::Wire, 1));
    let count = g.declare(StorageInfo::new("count", Some(top), StorageKind::Reg, 4));
    let one = g.literal(4, 1);
    let zero = g.literal(4, 0);
    let next = g.add(count, one);
    design
        .assign(top, AssignKind::Clocked { clock: clk }, &[], count, next)
        .unwrap();
    design
        .assign(top, AssignKind::Initial, &[], count, zero)
        .unwrap();
    design.finalize();
    (design, Counter { clk, en, count })
}

fn simulator() -> (Simulator, Counter) {
    let (design, c) = counter();
    (Simulator::builder(design).build().unwrap(), c)
}

fn count(sim: &Simulator, c: &Counter) -> Option<u64> {
    sim.peek_bits(c.count).unwrap().to_u64()
}

#[test]
fn test_clock_thread_drives_counter_until_timeout() {
    let (mut sim, c) = simulator();
    sim.clock(c.clk, 10).unwrap();
    let outcome = sim.run(Some(50), false).unwrap();
    assert_eq!(outcome, RunOutcome::TimedOut);
    assert_eq!(sim.time(), 50);
    // Rising edges at 5, 15, 25, 35 and 45.
    assert_eq!(count(&sim, &c), Some(5));

    // Suspended processes resume on the next run.
    sim.run(Some(20), false).unwrap();
    assert_eq!(sim.time(), 70);
    assert_eq!(count(&sim, &c), Some(7));
}

#[test]
fn test_invalid_clock_periods_are_rejected() {
    let (mut sim, c) = simulator();
    for period in [0, 1, 3, 7] {
        assert!(matches!(
            sim.clock(c.clk, period),
            Err(SimError::InvalidClockPeriod { period: p }) if p == period
        ));
    }
}

#[test]
fn test_stop_from_a_process() {
    let (mut sim, c) = simulator();
    sim.clock(c.clk, 10).unwrap();
    let mut started = false;
    sim.thread(move |ctx: &mut ThreadContext<'_>| -> Result<Wait, SimError> {
        if started {
            ctx.stop();
            return Ok(Wait::Done);
        }
        started = true;
        Ok(Wait::after(30))
    });
    assert_eq!(sim.run(None, false).unwrap(), RunOutcome::Stopped);
    assert_eq!(sim.time(), 30);
    assert_eq!(count(&sim, &c), Some(3));
}

#[test]
fn test_idle_once_busy_work_completes() {
    let (mut sim, _) = simulator();
    let mut step = 0;
    sim.thread(move |ctx: &mut ThreadContext<'_>| -> Result<Wait, SimError> {
        step += 1;
        match step {
            1 => {
                ctx.busy();
                Ok(Wait::after(20))
            }
            _ => {
                ctx.done()?;
                Ok(Wait::Done)
            }
        }
    });
    assert_eq!(sim.run(None, true).unwrap(), RunOutcome::Idle);
    assert_eq!(sim.time(), 20);
}

#[test]
fn test_exhausted_when_no_events_remain() {
    let (mut sim, _) = simulator();
    let mut waited = false;
    sim.thread(move |_: &mut ThreadContext<'_>| -> Result<Wait, SimError> {
        if waited {
            return Ok(Wait::Done);
        }
        waited = true;
        Ok(Wait::on(Event::At(5)))
    });
    assert_eq!(sim.run(None, false).unwrap(), RunOutcome::Exhausted);
    assert_eq!(sim.time(), 5);
}

#[test]
fn test_busy_without_future_events_deadlocks() {
    let (mut sim, c) = simulator();
    let count = c.count;
    sim.thread(move |ctx: &mut ThreadContext<'_>| -> Result<Wait, SimError> {
        ctx.busy();
        Ok(Wait::on(Event::Change(count)))
    });
    let err = sim.run(None, true).unwrap_err();
    assert!(matches!(err, SimError::Deadlock { busy: 1 }));
}

#[test]
fn test_event_in_the_past_is_an_error() {
    let (mut sim, _) = simulator();
    let mut first = true;
    sim.thread(move |_: &mut ThreadContext<'_>| -> Result<Wait, SimError> {
        if std::mem::take(&mut first) {
            Ok(Wait::after(10))
        } else {
            Ok(Wait::on(Event::At(3)))
        }
    });
    let err = sim.run(None, false).unwrap_err();
    assert!(matches!(err, SimError::EventInPast { at: 3, now: 10 }));
}

#[test]
fn test_process_errors_abort_the_run() {
    let (mut sim, _) = simulator();
    sim.thread(|_: &mut ThreadContext<'_>| -> Result<Wait, SimError> {
        Err(SimError::process("scoreboard mismatch"))
    });
    let err = sim.run(None, false).unwrap_err();
    assert_eq!(err.to_string(), "process failed: scoreboard mismatch");
}

#[test]
fn test_unbalanced_done() {
    let (mut sim, _) = simulator();
    sim.busy();
    sim.done().unwrap();
    assert!(matches!(sim.done(), Err(SimError::UnbalancedDone)));
}

#[test]
fn test_edge_callbacks_respect_enable() {
    let (mut sim, c) = simulator();
    sim.clock(c.clk, 10).unwrap();
    let (clk, en) = (c.clk, c.en);
    let edges = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&edges);
    sim.always_on(
        Event::Edge {
            signal: clk,
            enable: Some(en),
        },
        move |ctx: &mut ThreadContext<'_>| {
            seen.borrow_mut().push(ctx.time());
            Ok(())
        },
    );
    let mut phase = 0;
    sim.thread(move |ctx: &mut ThreadContext<'_>| -> Result<Wait, SimError> {
        phase += 1;
        match phase {
            1 => {
                ctx.poke(en, BitVec::from_bool(true))?;
                Ok(Wait::on(Event::At(22)))
            }
            _ => {
                ctx.poke(en, BitVec::from_bool(false))?;
                Ok(Wait::Done)
            }
        }
    });
    sim.run(Some(40), false).unwrap();
    assert_eq!(*edges.borrow(), vec![5, 15]);
}

#[test]
fn test_change_fires_once() {
    let (mut sim, c) = simulator();
    sim.clock(c.clk, 10).unwrap();
    let fired = Rc::new(Cell::new(None));
    let slot = Rc::clone(&fired);
    sim.on(Event::Change(c.count), move |ctx: &mut ThreadContext<'_>| {
        assert!(slot.get().is_none());
        slot.set(Some(ctx.time()));
        Ok(())
    });
    sim.run(Some(30), false).unwrap();
    assert_eq!(fired.get(), Some(5));
}

#[test]
fn test_settled_sees_propagated_values() {
    let mut design = Design::new();
    let top = design.add_module("top", None);
    let g = &mut design.graph;
    let a = g.declare(StorageInfo::new("a", None, StorageKind::Wire, 8));
    let y = g.declare(StorageInfo::new("y", Some(top), StorageKind::Wire, 8));
    let one = g.literal(8, 1);
    let plus = g.add(a, one);
    design
        .assign(top, AssignKind::Continuous, &[], y, plus)
        .unwrap();
    design.finalize();
    let mut sim = Simulator::builder(design).build().unwrap();

    let observed = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&observed);
    let mut step = 0;
    sim.thread(move |ctx: &mut ThreadContext<'_>| -> Result<Wait, SimError> {
        step += 1;
        log.borrow_mut().push(ctx.peek_bits(y)?.to_u64());
        if step == 1 {
            ctx.poke(a, BitVec::new(8, 3u32))?;
            Ok(Wait::on(Event::Settled))
        } else {
            Ok(Wait::Done)
        }
    });
    assert_eq!(sim.run(None, true).unwrap(), RunOutcome::Idle);
    assert_eq!(*observed.borrow(), vec![None, Some(4)]);
}

#[test]
fn test_spawned_process_runs_in_same_instant() {
    let (mut sim, _) = simulator();
    let times = Rc::new(RefCell::new(Vec::new()));
    let outer = Rc::clone(&times);
    let mut spawned = false;
    sim.thread(move |ctx: &mut ThreadContext<'_>| -> Result<Wait, SimError> {
        if std::mem::replace(&mut spawned, true) {
            return Ok(Wait::Done);
        }
        let inner = Rc::clone(&outer);
        ctx.spawn(move |ctx: &mut ThreadContext<'_>| -> Result<Wait, SimError> {
            inner.borrow_mut().push(ctx.time());
            Ok(Wait::Done)
        });
        Ok(Wait::after(4))
    });
    sim.run(None, false).unwrap();
    assert_eq!(*times.borrow(), vec![0]);
}

#[test]
fn test_combinational_loop_is_reported() {
    let mut design = Design::new();
    let top = design.add_module("top", None);
    let g = &mut design.graph;
    let a = g.declare(StorageInfo::new("a", Some(top), StorageKind::Wire, 1));
    let inverted = g.not(a);
    design
        .assign(top, AssignKind::Continuous, &[], a, inverted)
        .unwrap();
    design.finalize();
    let mut sim = Simulator::builder(design)
        .max_settle_iterations(50)
        .build()
        .unwrap();
    sim.poke(a, BitVec::from_bool(false)).unwrap();
    let err = sim.step_combinational().unwrap_err();
    assert!(matches!(
        err,
        SimError::CombinationalLoop {
            iterations: 50,
            time: 0
        }
    ));
}

#[test]
fn test_trace_records_each_quiesced_instant() {
    let (design, c) = counter();
    let trace = MemoryTrace::new();
    let options = SimulatorOptions::from_toml("trace_on_quiesce = true").unwrap();
    let mut sim = Simulator::builder(design)
        .options(options)
        .trace(trace.clone())
        .build()
        .unwrap();
    sim.clock(c.clk, 10).unwrap();
    sim.run(Some(20), false).unwrap();

    let records = trace.records();
    let times: Vec<u64> = records.iter().map(|r| r.time).collect();
    assert_eq!(times, vec![0, 5, 10, 15, 20]);
    let clk: Vec<String> = records
        .iter()
        .map(|r| r.value(c.clk).unwrap().to_string())
        .collect();
    assert_eq!(clk, vec!["0", "1", "0", "1", "0"]);
    assert_eq!(records[4].value(c.count).unwrap().to_string(), "0010");
}

#[test]
fn test_trace_can_be_disabled() {
    let (design, c) = counter();
    let trace = MemoryTrace::new();
    let mut sim = Simulator::builder(design)
        .trace_on_quiesce(false)
        .trace(trace.clone())
        .build()
        .unwrap();
    sim.clock(c.clk, 10).unwrap();
    sim.run(Some(20), false).unwrap();
    assert!(trace.is_empty());
    sim.dump();
    assert_eq!(trace.len(), 1);
}

/// `y = a + 1` over 8-bit wires.
fn incrementer() -> (Simulator, NodeId, NodeId) {
    let mut design = Design::new();
    let top = design.add_module("top", None);
    let g = &mut design.graph;
    let a = g.declare(StorageInfo::new("a", None, StorageKind::Wire, 8));
    let y = g.declare(StorageInfo::new("y", Some(top), StorageKind::Wire, 8));
    let one = g.literal(8, 1);
    let plus = g.add(a, one);
    design
        .assign(top, AssignKind::Continuous, &[], y, plus)
        .unwrap();
    design.finalize();
    (Simulator::builder(design).build().unwrap(), a, y)
}

/// Sleeps for `delay`, then waits on `events` and logs `name` when woken.
fn waiter(
    log: &Rc<RefCell<Vec<&'static str>>>,
    name: &'static str,
    delay: u64,
    events: Vec<Event>,
) -> impl FnMut(&mut ThreadContext<'_>) -> Result<Wait, SimError> + 'static {
    let log = Rc::clone(log);
    let mut step = 0;
    move |_: &mut ThreadContext<'_>| -> Result<Wait, SimError> {
        step += 1;
        match step {
            1 => Ok(Wait::after(delay)),
            2 => Ok(Wait::On(events.clone())),
            _ => {
                log.borrow_mut().push(name);
                Ok(Wait::Done)
            }
        }
    }
}

fn poke_at(
    time: u64,
    target: NodeId,
    value: u64,
) -> impl FnMut(&mut ThreadContext<'_>) -> Result<Wait, SimError> + 'static {
    let mut waited = false;
    move |ctx: &mut ThreadContext<'_>| -> Result<Wait, SimError> {
        if std::mem::replace(&mut waited, true) {
            ctx.poke(target, BitVec::new(8, value))?;
            return Ok(Wait::Done);
        }
        Ok(Wait::on(Event::At(time)))
    }
}

#[test]
fn test_simultaneous_wakeups_resume_in_subscription_order() {
    let (mut sim, a, _) = incrementer();
    let log = Rc::new(RefCell::new(Vec::new()));
    // Registered first, subscribed last.
    sim.thread(waiter(&log, "first", 3, vec![Event::Change(a)]));
    sim.thread(waiter(&log, "second", 2, vec![Event::Change(a)]));
    sim.thread(waiter(&log, "third", 1, vec![Event::Change(a)]));
    sim.thread(poke_at(5, a, 7));
    assert_eq!(sim.run(None, false).unwrap(), RunOutcome::Exhausted);
    assert_eq!(*log.borrow(), vec!["third", "second", "first"]);
}

#[test]
fn test_pending_thread_keeps_its_place_when_triggered_again() {
    let (mut sim, a, y) = incrementer();
    let log = Rc::new(RefCell::new(Vec::new()));
    // `late` subscribes to `y` before `early` does, but `early` becomes
    // ready on the change of `a`, one settle round before `y` follows.
    sim.thread(waiter(&log, "late", 1, vec![Event::Change(y)]));
    sim.thread(waiter(
        &log,
        "early",
        2,
        vec![Event::Change(a), Event::Change(y)],
    ));
    sim.thread(poke_at(5, a, 7));
    sim.run(None, false).unwrap();
    assert_eq!(*log.borrow(), vec!["early", "late"]);
}

#[test]
fn test_timers_due_together_resume_in_scheduling_order() {
    let (mut sim, _, _) = incrementer();
    let log = Rc::new(RefCell::new(Vec::new()));
    sim.thread(waiter(&log, "a", 4, vec![Event::At(10)]));
    sim.thread(waiter(&log, "b", 2, vec![Event::At(10)]));
    sim.thread(waiter(&log, "c", 3, vec![Event::Delay(7)]));
    sim.run(None, false).unwrap();
    assert_eq!(*log.borrow(), vec!["b", "c", "a"]);
}

#[test]
fn test_huge_delay_is_an_error() {
    let (mut sim, _, _) = incrementer();
    let mut first = true;
    sim.thread(move |_: &mut ThreadContext<'_>| -> Result<Wait, SimError> {
        if std::mem::take(&mut first) {
            Ok(Wait::after(10))
        } else {
            Ok(Wait::after(u64::MAX))
        }
    });
    let err = sim.run(None, false).unwrap_err();
    assert!(matches!(
        err,
        SimError::TimeOverflow {
            delay: u64::MAX,
            now: 10
        }
    ));
}
