// Pass-driven cooperative scheduler
// NOTE: No dynamic allocation; the task table is sized by a const generic
//
// The embedding program owns its blocks and calls loop_head() once per
// trip round its outer loop, then hands the blocks over in program
// order. Every ready descriptor is entered at most once per pass;
// disabled and paused ones are skipped without touching their state.

use core::fmt;

use crate::kernel::clock::Clock;
use crate::kernel::costate::{self, Block, Point, Step};
use crate::kernel::registry::{self, ConfigError, TaskId, TaskTable};
use crate::kernel::slice::{self, SliceBudget, SliceOutcome, Sliced};
use crate::kernel::task::{Descriptor, Launch, TaskState};
use crate::kernel::wait::Frame;

/// Bookkeeping for the current pass, reset by `loop_head`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassRecord {
    pub pass: u32,
    /// Tick count when the pass opened.
    pub started_at: u32,
    pub entered: u16,
    pub skipped: u16,
}

impl fmt::Display for PassRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pass {} @{}: {} entered, {} skipped",
            self.pass, self.started_at, self.entered, self.skipped
        )
    }
}

/// Something the scheduler can run for one pass: a costatement, an
/// indexed family or a slice.
pub trait Entry {
    fn run(&mut self, d: &mut Dispatch<'_>);
}

/// Access to the task table for the duration of one entry.
pub struct Dispatch<'a> {
    clock: &'a Clock,
    slots: &'a mut [Option<Descriptor>],
    record: &'a mut PassRecord,
}

impl Dispatch<'_> {
    pub fn pass(&self) -> u32 {
        self.record.pass
    }

    fn ready(&mut self, id: TaskId) -> Option<&mut Descriptor> {
        let pass = self.record.pass;
        let Some(desc) = self.slots.get_mut(id.raw() as usize).and_then(Option::as_mut) else {
            log::debug!("no task {}", id);
            return None;
        };
        if desc.state() != TaskState::Ready || !desc.claim_pass(pass) {
            self.record.skipped += 1;
            return None;
        }
        self.record.entered += 1;
        Some(desc)
    }

    /// Enter `block` as task `id` if it is ready and has not run this pass.
    pub fn enter<B: Block>(
        &mut self,
        id: TaskId,
        block: &mut B,
        locals: &mut B::Locals,
    ) -> Option<Step<B::Output>> {
        let clock = self.clock;
        let pass = self.record.pass;
        let desc = self.ready(id)?;
        let frame = Frame {
            clock,
            task: id,
            pass,
            sliced: false,
        };
        Some(costate::enter(desc, block, locals, frame))
    }

    /// Enter a slice-scheduled task with the budget on its descriptor.
    pub fn enter_sliced<B: Block>(
        &mut self,
        id: TaskId,
        block: &mut B,
        locals: &mut B::Locals,
    ) -> Option<SliceOutcome> {
        let clock = self.clock;
        let pass = self.record.pass;
        let desc = self.ready(id)?;
        let ticks = desc.slice().map_or(0, |s| s.ticks());
        let frame = Frame {
            clock,
            task: id,
            pass,
            sliced: false,
        };
        let outcome = slice::run(desc, block, locals, frame, ticks);
        if let Some(budget) = desc.slice_mut() {
            budget.record(outcome);
        }
        Some(outcome)
    }
}

/// A named or unnamed costatement: one descriptor, one set of locals.
pub struct Costate<B: Block> {
    id: TaskId,
    block: B,
    locals: B::Locals,
}

impl<B: Block> Costate<B> {
    pub fn new(id: TaskId, block: B) -> Self {
        Self {
            id,
            block,
            locals: B::Locals::default(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn block(&self) -> &B {
        &self.block
    }

    pub fn block_mut(&mut self) -> &mut B {
        &mut self.block
    }

    pub fn locals(&self) -> &B::Locals {
        &self.locals
    }
}

impl<B: Block> Entry for Costate<B> {
    fn run(&mut self, d: &mut Dispatch<'_>) {
        let _ = d.enter(self.id, &mut self.block, &mut self.locals);
    }
}

/// An indexed family: N descriptors sharing one block, locals per index.
/// Built by `Scheduler::indexed`, which registers exactly N instances.
pub struct Indexed<B: Block, const N: usize> {
    base: TaskId,
    block: B,
    locals: [B::Locals; N],
}

impl<B: Block, const N: usize> Indexed<B, N> {
    fn new(base: TaskId, block: B) -> Self {
        Self {
            base,
            block,
            locals: core::array::from_fn(|_| B::Locals::default()),
        }
    }

    pub fn id(&self, i: usize) -> TaskId {
        self.base.offset(i)
    }

    pub fn block(&self) -> &B {
        &self.block
    }

    pub fn block_mut(&mut self) -> &mut B {
        &mut self.block
    }

    pub fn locals(&self, i: usize) -> Option<&B::Locals> {
        self.locals.get(i)
    }
}

impl<B: Block, const N: usize> Entry for Indexed<B, N> {
    fn run(&mut self, d: &mut Dispatch<'_>) {
        for (i, locals) in self.locals.iter_mut().enumerate() {
            let _ = d.enter(self.base.offset(i), &mut self.block, locals);
        }
    }
}

impl<B: Block, const STACK: usize> Entry for Sliced<B, STACK> {
    fn run(&mut self, d: &mut Dispatch<'_>) {
        let _ = d.enter_sliced(self.id, &mut self.block, &mut self.locals);
    }
}

pub struct Scheduler<'c, const N: usize> {
    clock: &'c Clock,
    table: TaskTable<N>,
    record: PassRecord,
}

impl<'c, const N: usize> Scheduler<'c, N> {
    pub const fn new(clock: &'c Clock) -> Self {
        Self {
            clock,
            table: TaskTable::new(),
            record: PassRecord {
                pass: 0,
                started_at: 0,
                entered: 0,
                skipped: 0,
            },
        }
    }

    pub fn clock(&self) -> &'c Clock {
        self.clock
    }

    pub fn register(&mut self, name: &'static str, launch: Launch) -> Result<TaskId, ConfigError> {
        let id = self.table.register(name, launch)?;
        log::debug!("registered {} as {} ({:?})", name, id, launch);
        Ok(id)
    }

    pub fn register_indexed(
        &mut self,
        name: &'static str,
        count: usize,
        launch: Launch,
    ) -> Result<TaskId, ConfigError> {
        let base = self.table.register_indexed(name, count, launch)?;
        log::debug!("registered {}[{}] from {} ({:?})", name, count, base, launch);
        Ok(base)
    }

    /// Register `name[N]` and wrap `block` as its shared body.
    pub fn indexed<B: Block, const M: usize>(
        &mut self,
        name: &'static str,
        launch: Launch,
        block: B,
    ) -> Result<Indexed<B, M>, ConfigError> {
        let base = self.register_indexed(name, M, launch)?;
        Ok(Indexed::new(base, block))
    }

    pub fn register_sliced(
        &mut self,
        name: &'static str,
        launch: Launch,
        ticks: i32,
    ) -> Result<TaskId, ConfigError> {
        let id = self.table.register_sliced(name, launch, ticks)?;
        log::debug!("registered {} as {} with {} tick slice", name, id, ticks);
        Ok(id)
    }

    /// Change a slice task's budget, e.g. to hand a background slice
    /// whatever the foreground left. Non-positive budgets are accepted
    /// and mean the task is skipped. A plain task gains a budget here.
    pub fn set_slice_budget(&mut self, id: TaskId, ticks: i32) -> Result<(), ConfigError> {
        let Some(desc) = self.table.get_mut(id) else {
            return Ok(());
        };
        registry::check_budget(desc.name(), ticks)?;
        match desc.slice_mut() {
            Some(budget) => budget.set_ticks(ticks),
            None => desc.set_slice(SliceBudget::new(ticks)),
        }
        Ok(())
    }

    /// Open a new pass. Task state is untouched.
    pub fn loop_head(&mut self) {
        self.record = PassRecord {
            pass: self.record.pass.wrapping_add(1),
            started_at: self.clock.ticks(),
            entered: 0,
            skipped: 0,
        };
        log::trace!("loop head {}", self.record.pass);
    }

    /// Enter every group in program order.
    pub fn run_pass(&mut self, tasks: &mut [&mut dyn Entry]) {
        let mut d = self.dispatch();
        for task in tasks.iter_mut() {
            task.run(&mut d);
        }
    }

    /// Enter one group inline, for loops that interleave other code
    /// between their costatements.
    pub fn costate(&mut self, task: &mut dyn Entry) {
        task.run(&mut self.dispatch());
    }

    /// A slice statement in the main loop with an explicit budget. The
    /// budget is also stored on the descriptor.
    pub fn slice<B: Block, const STACK: usize>(
        &mut self,
        s: &mut Sliced<B, STACK>,
        ticks: i32,
    ) -> Result<Option<SliceOutcome>, ConfigError> {
        self.set_slice_budget(s.id, ticks)?;
        let mut d = self.dispatch();
        Ok(d.enter_sliced(s.id, &mut s.block, &mut s.locals))
    }

    fn dispatch(&mut self) -> Dispatch<'_> {
        Dispatch {
            clock: self.clock,
            slots: self.table.slots_mut(),
            record: &mut self.record,
        }
    }

    // CoPause
    pub fn pause(&mut self, id: TaskId) {
        match self.table.get_mut(id) {
            Some(desc) => {
                if desc.pause() {
                    log::debug!("paused {}", desc);
                }
            }
            None => log::debug!("pause: no task {}", id),
        }
    }

    // CoResume
    pub fn resume(&mut self, id: TaskId) {
        match self.table.get_mut(id) {
            Some(desc) => {
                if desc.resume() {
                    log::debug!("resumed {}", desc);
                }
            }
            None => log::debug!("resume: no task {}", id),
        }
    }

    // CoBegin: restart from the top on the next pass
    pub fn enable(&mut self, id: TaskId) {
        match self.table.get_mut(id) {
            Some(desc) => {
                desc.enable();
                log::debug!("enabled {}", desc);
            }
            None => log::debug!("enable: no task {}", id),
        }
    }

    // CoReset: stop and rewind
    pub fn reset(&mut self, id: TaskId) {
        match self.table.get_mut(id) {
            Some(desc) => {
                desc.reset();
                log::debug!("reset {}", desc);
            }
            None => log::debug!("reset: no task {}", id),
        }
    }

    pub fn is_active(&self, id: TaskId) -> bool {
        self.table.get(id).is_some_and(Descriptor::is_active)
    }

    pub fn is_done(&self, id: TaskId) -> bool {
        self.table.get(id).is_some_and(Descriptor::is_done)
    }

    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.table.get(id).map(Descriptor::state)
    }

    pub fn point(&self, id: TaskId) -> Option<Point> {
        self.table.get(id).map(Descriptor::point)
    }

    pub fn descriptor(&self, id: TaskId) -> Option<&Descriptor> {
        self.table.get(id)
    }

    pub fn find(&self, name: &str) -> Option<TaskId> {
        self.table.find(name)
    }

    pub fn tasks(&self) -> &TaskTable<N> {
        &self.table
    }

    pub fn pass(&self) -> u32 {
        self.record.pass
    }

    pub fn record(&self) -> &PassRecord {
        &self.record
    }
}
