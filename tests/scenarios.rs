// End-to-end scheduling scenarios, driven through the public API with a
// clock advanced by hand in place of the timer interrupt.

use costate::config::{MAX_FAMILY_SIZE, MAX_SLICE_TICKS};
use costate::{
    Block, Call, Clock, Cofunc, ConfigError, Costate, Cx, Launch, Point, Scheduler,
    Shared, SliceOutcome, Sliced, Split32, Step, TaskState, Wfd, WfdStatus, waitfor,
};

// two statements with a yield between them, tracing what ran
#[derive(Default)]
struct Traced {
    trace: Vec<&'static str>,
}

#[derive(Default)]
struct Entries {
    n: u32,
}

impl Block for Traced {
    type Locals = Entries;
    type Output = ();

    fn resume(&mut self, at: Point, l: &mut Entries, _cx: &mut Cx<'_>) -> Step {
        l.n += 1;
        match at.get() {
            0 => {
                self.trace.push("first");
                Step::Suspend(Point::at(1))
            }
            _ => {
                self.trace.push("second");
                Step::Done(())
            }
        }
    }

    fn everytime(&mut self, _l: &mut Entries, _cx: &mut Cx<'_>) {
        self.trace.push("everytime");
    }
}

#[test]
fn one_shot_completes_then_reenable_runs_everytime_first() {
    let clock = Clock::new(1024);
    let mut sched = Scheduler::<4>::new(&clock);
    let id = sched.register("once", Launch::Off).unwrap();
    let mut once = Costate::new(id, Traced::default());

    sched.loop_head();
    sched.costate(&mut once);
    assert!(once.block().trace.is_empty());

    sched.enable(id);
    for _ in 0..3 {
        sched.loop_head();
        sched.costate(&mut once);
    }
    assert_eq!(once.block().trace, ["everytime", "first", "second"]);
    assert!(sched.is_done(id));
    assert!(!sched.is_active(id));
    assert_eq!(once.locals().n, 2);

    sched.enable(id);
    assert!(!sched.is_done(id));
    sched.loop_head();
    sched.costate(&mut once);
    assert_eq!(
        once.block().trace,
        ["everytime", "first", "second", "everytime", "first"]
    );
    // locals started over with the new enable
    assert_eq!(once.locals().n, 1);
}

// never finishes; counts entries per instance
struct Tally;

impl Block for Tally {
    type Locals = u32;
    type Output = ();

    fn resume(&mut self, at: Point, n: &mut u32, _cx: &mut Cx<'_>) -> Step {
        *n += 1;
        Step::Suspend(at)
    }
}

#[test]
fn indexed_instances_are_isolated() {
    let clock = Clock::new(1024);
    let mut sched = Scheduler::<4>::new(&clock);
    let mut family = sched
        .indexed::<_, 3>("tally", Launch::AlwaysOn, Tally)
        .unwrap();

    for pass in 1..=5 {
        if pass == 3 {
            sched.pause(family.id(1));
        }
        sched.loop_head();
        sched.run_pass(&mut [&mut family]);
    }
    let counts: Vec<u32> = (0..3).map(|i| *family.locals(i).unwrap()).collect();
    assert_eq!(counts, [5, 2, 5]);
    assert_eq!(sched.state(family.id(1)), Some(TaskState::Paused));
    assert!(sched.is_active(family.id(0)));

    sched.resume(family.id(1));
    sched.loop_head();
    sched.run_pass(&mut [&mut family]);
    let counts: Vec<u32> = (0..3).map(|i| *family.locals(i).unwrap()).collect();
    assert_eq!(counts, [6, 3, 6]);
}

#[test]
fn pause_is_idempotent_and_resume_restores() {
    let clock = Clock::new(1024);
    let mut sched = Scheduler::<4>::new(&clock);
    let id = sched.register("t", Launch::AlwaysOn).unwrap();
    let off = sched.register("off", Launch::Off).unwrap();
    let mut t = Costate::new(id, Traced::default());

    sched.loop_head();
    sched.costate(&mut t);
    let point = sched.point(id);

    sched.pause(id);
    sched.pause(id);
    assert_eq!(sched.state(id), Some(TaskState::Paused));
    for _ in 0..3 {
        sched.loop_head();
        sched.costate(&mut t);
    }
    assert_eq!(sched.point(id), point);
    assert_eq!(t.locals().n, 1);

    sched.resume(id);
    assert_eq!(sched.state(id), Some(TaskState::Ready));
    sched.resume(id);
    assert_eq!(sched.state(id), Some(TaskState::Ready));
    sched.loop_head();
    sched.costate(&mut t);
    assert_eq!(t.block().trace, ["everytime", "first", "second"]);

    // a disabled task stays disabled
    sched.pause(off);
    sched.resume(off);
    assert_eq!(sched.state(off), Some(TaskState::Disabled));
}

// busy loop: one tick of wall clock per iteration, a safe point on the
// back edge and one mid-body
struct Spin {
    loops: u32,
    entries: u32,
}

impl Spin {
    fn new() -> Self {
        Self {
            loops: 0,
            entries: 0,
        }
    }
}

impl Block for Spin {
    type Locals = ();
    type Output = ();

    fn resume(&mut self, at: Point, _: &mut (), cx: &mut Cx<'_>) -> Step {
        self.entries += 1;
        match at.get() {
            0 => {
                cx.clock().tick();
                Step::Continue(Point::at(1))
            }
            _ => {
                self.loops += 1;
                Step::Continue(Point::START)
            }
        }
    }
}

#[test]
fn slices_share_cpu_in_proportion_to_budget() {
    let clock = Clock::new(1000);
    let mut sched = Scheduler::<4>::new(&clock);
    let b1 = sched.register_sliced("b1", Launch::AlwaysOn, 25).unwrap();
    let b2 = sched.register_sliced("b2", Launch::AlwaysOn, 50).unwrap();
    let mut b1 = Sliced::<_, 128>::new(b1, Spin::new());
    let mut b2 = Sliced::<_, 128>::new(b2, Spin::new());

    for _ in 0..10 {
        sched.loop_head();
        sched.run_pass(&mut [&mut b1, &mut b2]);
    }

    assert_eq!(clock.ticks(), 750);
    // each run stops on the safe point right after its last tick
    assert_eq!(b1.block().loops, 249);
    assert_eq!(b2.block().loops, 499);
    for id in [b1.id(), b2.id()] {
        let budget = sched.descriptor(id).unwrap().slice().unwrap();
        assert_eq!(
            budget.last(),
            Some(SliceOutcome::Exhausted {
                used: budget.ticks() as u32
            })
        );
    }
    assert_eq!(clock.slice_remaining(), None);
}

#[test]
fn non_positive_budget_skips_the_block() {
    let clock = Clock::new(1000);
    let mut sched = Scheduler::<2>::new(&clock);
    let id = sched.register_sliced("bg", Launch::AlwaysOn, 10).unwrap();
    let mut bg = Sliced::<_, 128>::new(id, Spin::new());

    sched.loop_head();
    assert_eq!(sched.slice(&mut bg, 0), Ok(Some(SliceOutcome::Skipped)));
    sched.loop_head();
    assert_eq!(sched.slice(&mut bg, -5), Ok(Some(SliceOutcome::Skipped)));
    assert_eq!(bg.block().entries, 0);
    assert_eq!(clock.ticks(), 0);

    // leftover arithmetic: whatever the foreground did not use
    sched.loop_head();
    let out = sched.slice(&mut bg, 40 - 33).unwrap();
    assert_eq!(out, Some(SliceOutcome::Exhausted { used: 7 }));

    assert_eq!(
        sched.slice(&mut bg, MAX_SLICE_TICKS + 1),
        Err(ConfigError::SliceBudgetTooLarge {
            name: "bg",
            ticks: MAX_SLICE_TICKS + 1
        })
    );
}

// cofunction that needs ten entries to finish
struct Measure {
    abandons: u32,
}

#[derive(Default)]
struct Steps {
    n: u32,
}

impl Block for Measure {
    type Locals = Steps;
    type Output = u32;

    fn resume(&mut self, _at: Point, s: &mut Steps, _cx: &mut Cx<'_>) -> Step<u32> {
        s.n += 1;
        if s.n < 10 {
            Step::Suspend(Point::at(1))
        } else {
            Step::Done(s.n)
        }
    }

    fn abandon(&mut self, _s: &mut Steps) {
        self.abandons += 1;
    }
}

// caller[0] requests on passes 1..=4, caller[1] from pass 5 on
struct Callers {
    measure: Cofunc<Measure>,
    base: u16,
    busy: Vec<(u32, u16)>,
}

impl Block for Callers {
    type Locals = ();
    type Output = ();

    fn resume(&mut self, at: Point, _: &mut (), cx: &mut Cx<'_>) -> Step {
        let me = cx.task().raw() - self.base;
        let asking = if me == 0 { cx.pass() <= 4 } else { cx.pass() >= 5 };
        if !asking {
            return Step::Suspend(at);
        }
        match self.measure.call(cx) {
            Call::Busy => {
                self.busy.push((cx.pass(), me));
                Step::Suspend(at)
            }
            Call::Pending => Step::Suspend(at),
            Call::Done(_) => Step::Done(()),
            Call::Aborted => Step::Abort,
        }
    }
}

#[test]
fn deserted_cofunction_goes_to_the_next_caller() {
    let clock = Clock::new(1024);
    let mut sched = Scheduler::<4>::new(&clock);
    let mut callers = sched
        .indexed::<_, 2>(
            "caller",
            Launch::InitOn,
            Callers {
                measure: Cofunc::new("measure", Measure { abandons: 0 }),
                base: 0,
                busy: Vec::new(),
            },
        )
        .unwrap();
    let base = callers.id(0);
    callers.block_mut().base = base.raw();

    for _ in 1..=5 {
        sched.loop_head();
        sched.run_pass(&mut [&mut callers]);
    }
    let measure = &callers.block().measure;
    assert_eq!(measure.owner(), Some(base));
    assert_eq!(measure.abandoned(), 0);
    assert_eq!(measure.locals().n, 4);
    assert_eq!(callers.block().busy, [(5, 1)]);

    sched.loop_head();
    sched.run_pass(&mut [&mut callers]);
    let measure = &callers.block().measure;
    assert_eq!(measure.abandoned(), 1);
    assert_eq!(measure.block().abandons, 1);
    assert_eq!(measure.owner(), Some(base.offset(1)));
    assert_eq!(measure.locals().n, 1);

    for _ in 7..=20 {
        sched.loop_head();
        sched.run_pass(&mut [&mut callers]);
    }
    assert!(sched.is_done(base.offset(1)));
    assert_eq!(callers.block().measure.abandoned(), 1);
    assert_eq!(callers.block().measure.owner(), None);
}

// costate1: for (i = 0; i < limit; i++) { counter = i; yield; }
struct CountLoop<'a> {
    counter: &'a Shared<u32>,
    limit: u32,
}

#[derive(Default)]
struct LoopVars {
    i: u32,
}

impl Block for CountLoop<'_> {
    type Locals = LoopVars;
    type Output = ();

    fn resume(&mut self, at: Point, l: &mut LoopVars, _cx: &mut Cx<'_>) -> Step {
        const BODY: Point = Point::at(1);
        if at.is_start() {
            l.i = 0;
            return Step::Continue(BODY);
        }
        if l.i >= self.limit {
            return Step::Done(());
        }
        l.i += 1;
        self.counter.set(l.i);
        Step::Suspend(BODY)
    }
}

struct Sample<'a> {
    counter: &'a Shared<u32>,
    seen: Vec<u32>,
}

impl Block for Sample<'_> {
    type Locals = ();
    type Output = ();

    fn resume(&mut self, at: Point, _: &mut (), cx: &mut Cx<'_>) -> Step {
        const WAIT: Point = Point::at(1);
        if at.is_start() {
            return Step::Continue(WAIT);
        }
        waitfor!(cx.delay_ms(500), WAIT);
        self.seen.push(self.counter.get());
        Step::Done(())
    }
}

#[test]
fn counting_loop_advances_once_per_pass() {
    let clock = Clock::new(1000);
    let counter = Shared::new(0u32);
    let mut sched = Scheduler::<4>::new(&clock);
    let count = sched.register("count", Launch::AlwaysOn).unwrap();
    let sample = sched.register("sample", Launch::AlwaysOn).unwrap();
    let mut count = Costate::new(
        count,
        CountLoop {
            counter: &counter,
            limit: 30_000,
        },
    );
    let mut sample = Costate::new(
        sample,
        Sample {
            counter: &counter,
            seen: Vec::new(),
        },
    );

    // one tick per pass, so 500 ms is 500 passes
    for _ in 0..3000 {
        clock.tick();
        sched.loop_head();
        sched.run_pass(&mut [&mut count, &mut sample]);
    }

    assert_eq!(count.locals().i, 3000);
    assert_eq!(counter.get(), 3000);
    assert_eq!(sched.point(count.id()), Some(Point::at(1)));
    let seen = &sample.block().seen;
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    // armed on pass 1 for tick 501, then re-armed on the pass after each report
    assert_eq!(seen, &[501, 1002, 1503, 2004, 2505]);
}

// finishes after `steps` entries, or aborts there
struct Job {
    steps: u32,
    fail: bool,
}

impl Block for Job {
    type Locals = u32;
    type Output = u32;

    fn resume(&mut self, at: Point, n: &mut u32, _cx: &mut Cx<'_>) -> Step<u32> {
        *n += 1;
        match (*n >= self.steps, self.fail) {
            (false, _) => Step::Suspend(at),
            (true, false) => Step::Done(*n),
            (true, true) => Step::Abort,
        }
    }
}

struct Both {
    a: Cofunc<Job>,
    b: Cofunc<Job>,
    status: Option<WfdStatus>,
    results: Vec<u32>,
}

impl Block for Both {
    type Locals = Wfd;
    type Output = ();

    fn resume(&mut self, at: Point, wfd: &mut Wfd, cx: &mut Cx<'_>) -> Step {
        if let Some(v) = wfd.branch(0, || self.a.call(cx)) {
            self.results.push(v);
        }
        if let Some(v) = wfd.branch(1, || self.b.call(cx)) {
            self.results.push(v);
        }
        match wfd.finish(2) {
            WfdStatus::Pending => Step::Suspend(at),
            status => {
                self.status = Some(status);
                Step::Done(())
            }
        }
    }
}

fn run_both(a: Job, b: Job) -> (Option<WfdStatus>, Vec<u32>) {
    let clock = Clock::new(1024);
    let mut sched = Scheduler::<2>::new(&clock);
    let id = sched.register("both", Launch::InitOn).unwrap();
    let mut both = Costate::new(
        id,
        Both {
            a: Cofunc::new("a", a),
            b: Cofunc::new("b", b),
            status: None,
            results: Vec::new(),
        },
    );
    for _ in 0..10 {
        sched.loop_head();
        sched.costate(&mut both);
    }
    assert!(sched.is_done(id));
    let block = both.block();
    (block.status, block.results.clone())
}

#[test]
fn waitfordone_waits_for_every_branch() {
    let (status, results) = run_both(
        Job {
            steps: 2,
            fail: false,
        },
        Job {
            steps: 4,
            fail: false,
        },
    );
    assert_eq!(status, Some(WfdStatus::Done));
    assert_eq!(results, [2, 4]);
}

#[test]
fn waitfordone_reports_the_aborted_branch() {
    let (status, results) = run_both(
        Job {
            steps: 5,
            fail: false,
        },
        Job {
            steps: 3,
            fail: true,
        },
    );
    assert_eq!(status, Some(WfdStatus::Aborted(1)));
    assert!(results.is_empty());
}

// records the tick count each time a 10 tick interval fires
struct Every10 {
    fired: Vec<u32>,
}

impl Block for Every10 {
    type Locals = ();
    type Output = ();

    fn resume(&mut self, _at: Point, _: &mut (), cx: &mut Cx<'_>) -> Step {
        waitfor!(cx.interval_ticks(10), Point::at(1));
        self.fired.push(cx.ticks());
        Step::Done(())
    }
}

#[test]
fn interval_stays_on_its_grid() {
    let clock = Clock::new(1000);
    let mut sched = Scheduler::<1>::new(&clock);
    let id = sched.register("every10", Launch::AlwaysOn).unwrap();
    let mut t = Costate::new(id, Every10 { fired: Vec::new() });

    for _ in 0..22 {
        clock.advance(3);
        sched.loop_head();
        sched.costate(&mut t);
    }
    // armed at tick 3: deadlines 13, 23, 33, 43, ...
    assert_eq!(t.block().fired, [15, 24, 33, 45, 54, 63]);
}

#[test]
fn bad_configuration_is_rejected() {
    let clock = Clock::new(1024);
    let mut sched = Scheduler::<3>::new(&clock);

    assert_eq!(
        sched.register_indexed("none", 0, Launch::AlwaysOn),
        Err(ConfigError::EmptyFamily("none"))
    );
    assert_eq!(
        sched.register_indexed("huge", MAX_FAMILY_SIZE + 1, Launch::AlwaysOn),
        Err(ConfigError::FamilyTooLarge {
            name: "huge",
            count: MAX_FAMILY_SIZE + 1
        })
    );
    assert_eq!(
        sched.register_sliced("greedy", Launch::AlwaysOn, MAX_SLICE_TICKS + 1),
        Err(ConfigError::SliceBudgetTooLarge {
            name: "greedy",
            ticks: MAX_SLICE_TICKS + 1
        })
    );

    sched.register("a", Launch::AlwaysOn).unwrap();
    assert_eq!(
        sched.register("a", Launch::Off),
        Err(ConfigError::DuplicateName("a"))
    );
    let err = sched.register_indexed("pair", 3, Launch::Off).unwrap_err();
    assert_eq!(
        err,
        ConfigError::TableFull {
            name: "pair",
            capacity: 3
        }
    );
    assert!(err.to_string().contains("pair"));

    // nothing was half registered
    assert_eq!(sched.tasks().len(), 1);
    assert!(sched.find("pair").is_none());
}

// bumps a split counter and a shared one; one tick between the halves
struct Wide<'a> {
    split: &'a Split32,
    shared: &'a Shared<u32>,
}

impl Block for Wide<'_> {
    type Locals = ();
    type Output = ();

    fn resume(&mut self, at: Point, _: &mut (), cx: &mut Cx<'_>) -> Step {
        match at.get() {
            0 => {
                self.shared.update(|v| v + 1);
                self.split.bump_low();
                cx.clock().tick();
                Step::Continue(Point::at(1))
            }
            _ => {
                self.split.carry();
                Step::Done(())
            }
        }
    }
}

#[test]
fn split_counter_tears_where_shared_does_not() {
    let clock = Clock::new(1000);
    let split = Split32::new();
    let shared = Shared::new(0xffffu32);
    for _ in 0..0xffff {
        split.increment();
    }

    let mut sched = Scheduler::<1>::new(&clock);
    let id = sched.register_sliced("wide", Launch::AlwaysOn, 1).unwrap();
    let mut wide = Sliced::<_, 64>::new(
        id,
        Wide {
            split: &split,
            shared: &shared,
        },
    );

    sched.loop_head();
    sched.run_pass(&mut [&mut wide]);
    // preempted between the two halves
    assert_eq!(sched.point(id), Some(Point::at(1)));
    assert!(split.is_torn());
    assert_eq!(split.get(), 0);
    assert_eq!(shared.get(), 0x1_0000);

    sched.loop_head();
    sched.run_pass(&mut [&mut wide]);
    assert!(!split.is_torn());
    assert_eq!(split.get(), 0x1_0000);
}
