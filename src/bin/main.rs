// costate host demo
//
// A thread stands in for the periodic timer interrupt and calls
// on_tick_interrupt() about once a millisecond. The main loop plays
// three scenarios one after another on a single scheduler:
//
//   costate1  a counting loop yielding every iteration, printed every 500 ms
//   slice01   two busy loops sharing the CPU in 25 and 50 tick slices
//   cofaband  a single-user cofunction deserted by its first caller
//
// Log level comes from RUST_LOG, info when unset.

use std::error::Error;
use std::thread;
use std::time::Duration;

use log::info;
use static_cell::StaticCell;

use costate::kernel::{SYS_CLOCK, on_tick_interrupt};
use costate::{
    Block, Call, Cofunc, Costate, Cx, Launch, Point, Scheduler, Shared, Sliced, Split32,
    Step, waitfor,
};

const TICK_PERIOD: Duration = Duration::from_millis(1);
const COSTATE1_RUN_MS: u32 = 2_000;
const SLICE01_RUN_MS: u32 = 1_500;
const COFABAND_PASSES: u32 = 8;

static SCHED: StaticCell<Scheduler<'static, 16>> = StaticCell::new();

static COUNTER: Shared<u32> = Shared::new(0);
static B1_LOOPS: Shared<u32> = Shared::new(0);
static B2_LOOPS: Shared<u32> = Shared::new(0);
static WIDE: Split32 = Split32::new();

// costate1: count to 30000, yielding once per iteration
struct Count {
    limit: u32,
}

#[derive(Default)]
struct Loop {
    i: u32,
}

impl Block for Count {
    type Locals = Loop;
    type Output = ();

    fn resume(&mut self, at: Point, l: &mut Loop, _cx: &mut Cx<'_>) -> Step {
        const BODY: Point = Point::at(1);
        if at.is_start() {
            l.i = 0;
            return Step::Continue(BODY);
        }
        if l.i >= self.limit {
            return Step::Done(());
        }
        l.i += 1;
        COUNTER.set(l.i);
        Step::Suspend(BODY)
    }
}

// costate1: print the counter every half second
struct Report {
    period_ms: u32,
}

#[derive(Default)]
struct Seen {
    last: u32,
}

impl Block for Report {
    type Locals = Seen;
    type Output = ();

    fn resume(&mut self, at: Point, seen: &mut Seen, cx: &mut Cx<'_>) -> Step {
        const WAIT: Point = Point::at(1);
        if at.is_start() {
            return Step::Continue(WAIT);
        }
        waitfor!(cx.delay_ms(self.period_ms), WAIT);

        let now = COUNTER.get();
        if now < seen.last {
            // the loop ran to its limit and started over
            info!("costate1: count = {} (restarted)", now);
        } else {
            info!("costate1: count = {} (+{})", now, now - seen.last);
        }
        seen.last = now;
        Step::Done(())
    }
}

// slice01: a loop that never waits; only the slice budget stops it.
// The wide counter is bumped in two steps with a safe point between.
struct Spin {
    loops: &'static Shared<u32>,
}

impl Block for Spin {
    type Locals = ();
    type Output = ();

    fn resume(&mut self, at: Point, _: &mut (), _cx: &mut Cx<'_>) -> Step {
        match at.get() {
            0 => {
                WIDE.bump_low();
                Step::Continue(Point::at(1))
            }
            _ => {
                WIDE.carry();
                self.loops.update(|n| n.wrapping_add(1));
                Step::Continue(Point::START)
            }
        }
    }
}

// slice01: between the two slices, count how often the wide counter
// is caught half written
struct Watch {
    torn: u32,
    reads: u32,
}

impl Block for Watch {
    type Locals = ();
    type Output = ();

    fn resume(&mut self, _at: Point, _: &mut (), _cx: &mut Cx<'_>) -> Step {
        self.reads += 1;
        if WIDE.is_torn() {
            self.torn += 1;
        }
        Step::Done(())
    }
}

// cofaband: the shared block, ten steps per result
struct Measure {
    abandons: u32,
}

#[derive(Default)]
struct Progress {
    steps: u32,
}

impl Block for Measure {
    type Locals = Progress;
    type Output = u32;

    fn resume(&mut self, _at: Point, p: &mut Progress, cx: &mut Cx<'_>) -> Step<u32> {
        p.steps += 1;
        log::debug!("cofaband: measure step {} for {}", p.steps, cx.task());
        if p.steps < 10 {
            Step::Suspend(Point::at(1))
        } else {
            Step::Done(p.steps)
        }
    }

    fn abandon(&mut self, p: &mut Progress) {
        self.abandons += 1;
        info!("cofaband: abandoned after {} steps", p.steps);
    }
}

// cofaband: caller[0] asks on passes 1..=4 only, caller[1] from pass 5
struct Callers {
    measure: Cofunc<Measure>,
    first_pass: u32,
    base: u16,
}

impl Block for Callers {
    type Locals = ();
    type Output = ();

    fn resume(&mut self, at: Point, _: &mut (), cx: &mut Cx<'_>) -> Step {
        let me = cx.task().raw() - self.base;
        let pass = cx.pass().wrapping_sub(self.first_pass) + 1;
        let asking = match me {
            0 => pass <= 4,
            _ => pass >= 5,
        };
        if !asking {
            return Step::Suspend(at);
        }
        match self.measure.call(cx) {
            Call::Done(v) => {
                info!("cofaband: caller {} got {}", me, v);
                Step::Done(())
            }
            Call::Aborted => Step::Abort,
            Call::Busy => {
                info!("cofaband: caller {} waiting, bound to {:?}", me, self.measure.owner());
                Step::Suspend(at)
            }
            Call::Pending => Step::Suspend(at),
        }
    }
}

fn costate1(sched: &mut Scheduler<'static, 16>) -> Result<(), Box<dyn Error>> {
    let count = sched.register("count", Launch::AlwaysOn)?;
    let report = sched.register("report", Launch::AlwaysOn)?;
    let mut count = Costate::new(count, Count { limit: 30_000 });
    let mut report = Costate::new(report, Report { period_ms: 500 });

    let start = SYS_CLOCK.ms();
    while SYS_CLOCK.ms().wrapping_sub(start) < COSTATE1_RUN_MS {
        sched.loop_head();
        sched.run_pass(&mut [&mut count, &mut report]);
        thread::sleep(Duration::from_micros(50));
    }
    info!("costate1: {} passes, final count {}", sched.pass(), COUNTER.get());
    Ok(())
}

fn slice01(sched: &mut Scheduler<'static, 16>) -> Result<(), Box<dyn Error>> {
    let b1 = sched.register_sliced("b1", Launch::AlwaysOn, 25)?;
    let b2 = sched.register_sliced("b2", Launch::AlwaysOn, 50)?;
    let watch = sched.register("watch", Launch::AlwaysOn)?;
    let mut b1 = Sliced::<_, 256>::new(b1, Spin { loops: &B1_LOOPS });
    let mut b2 = Sliced::<_, 256>::new(b2, Spin { loops: &B2_LOOPS });
    let mut watch = Costate::new(watch, Watch { torn: 0, reads: 0 });

    let start = SYS_CLOCK.ms();
    while SYS_CLOCK.ms().wrapping_sub(start) < SLICE01_RUN_MS {
        sched.loop_head();
        sched.run_pass(&mut [&mut b1, &mut watch, &mut b2]);
    }

    for id in [b1.id(), b2.id()] {
        if let Some(last) = sched.descriptor(id).and_then(|d| d.slice()).and_then(|s| s.last()) {
            info!("slice01: {} last slice {}", id, last);
        }
    }
    let (n1, n2) = (B1_LOOPS.get(), B2_LOOPS.get());
    info!(
        "slice01: b1 {} loops, b2 {} loops, ratio {:.2}",
        n1,
        n2,
        n2 as f32 / n1.max(1) as f32
    );
    info!(
        "slice01: wide counter {} torn in {} of {} reads",
        WIDE.get(),
        watch.block().torn,
        watch.block().reads
    );
    Ok(())
}

fn cofaband(sched: &mut Scheduler<'static, 16>) -> Result<(), Box<dyn Error>> {
    let first_pass = sched.pass().wrapping_add(1);
    let mut callers = sched.indexed::<_, 2>(
        "caller",
        Launch::InitOn,
        Callers {
            measure: Cofunc::new("measure", Measure { abandons: 0 }),
            first_pass,
            base: 0,
        },
    )?;
    callers.block_mut().base = callers.id(0).raw();

    for _ in 0..COFABAND_PASSES {
        sched.loop_head();
        sched.run_pass(&mut [&mut callers]);
    }
    let measure = &callers.block().measure;
    info!(
        "cofaband: {} abandonment(s), handler ran {} time(s), bound to {:?}",
        measure.abandoned(),
        measure.block().abandons,
        measure.owner()
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    thread::spawn(|| {
        loop {
            thread::sleep(TICK_PERIOD);
            on_tick_interrupt();
        }
    });
    info!("tick source running at {} Hz", SYS_CLOCK.ticks_per_sec());

    let sched = SCHED.init(Scheduler::new(&SYS_CLOCK));
    costate1(sched)?;
    slice01(sched)?;
    cofaband(sched)?;

    info!("{} tasks registered, {}", sched.tasks().len(), sched.record());
    Ok(())
}
