// Tick-budgeted preemption on top of the cooperative engine
//
// A slice arms the clock's countdown, enters its block with a sliced
// frame and disarms afterwards. The tick interrupt is the only thing
// that moves the countdown. The engine checks it at every safe point
// (Step::Continue), which is where a sliced block can be cut short even
// though it never waits. Blocks put a safe point on every loop
// back-edge and around every call; that is the preemption granularity.

use core::fmt;

use crate::config::MIN_SLICE_STACK;
use crate::kernel::costate::{self, Block, Step};
use crate::kernel::registry::TaskId;
use crate::kernel::task::Descriptor;
use crate::kernel::wait::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceOutcome {
    /// Budget was zero or negative; the block was not entered.
    Skipped,
    /// Budget ran out at a safe point.
    Exhausted { used: u32 },
    /// The block waited or yielded before the budget ran out.
    Yielded { used: u32 },
    /// The block finished its cycle (or aborted) inside the budget.
    Finished { used: u32 },
}

impl SliceOutcome {
    /// Ticks consumed, for leftover arithmetic in the embedding program.
    pub fn used(&self) -> u32 {
        match *self {
            SliceOutcome::Skipped => 0,
            SliceOutcome::Exhausted { used }
            | SliceOutcome::Yielded { used }
            | SliceOutcome::Finished { used } => used,
        }
    }
}

impl fmt::Display for SliceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SliceOutcome::Skipped => write!(f, "skipped"),
            SliceOutcome::Exhausted { used } => write!(f, "exhausted after {} ticks", used),
            SliceOutcome::Yielded { used } => write!(f, "yielded after {} ticks", used),
            SliceOutcome::Finished { used } => write!(f, "finished in {} ticks", used),
        }
    }
}

/// Budget stored on a slice-scheduled descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceBudget {
    ticks: i32,
    last: Option<SliceOutcome>,
}

impl SliceBudget {
    pub const fn new(ticks: i32) -> Self {
        Self { ticks, last: None }
    }

    pub fn ticks(&self) -> i32 {
        self.ticks
    }

    pub(crate) fn set_ticks(&mut self, ticks: i32) {
        self.ticks = ticks;
    }

    /// Result of the most recent run.
    pub fn last(&self) -> Option<SliceOutcome> {
        self.last
    }

    pub(crate) fn record(&mut self, outcome: SliceOutcome) {
        self.last = Some(outcome);
    }
}

/// A block wrapped in a slice. `STACK` is the worst-case context size
/// the block was sized for; it is checked when the type is used.
pub struct Sliced<B: Block, const STACK: usize> {
    pub(crate) id: TaskId,
    pub(crate) block: B,
    pub(crate) locals: B::Locals,
}

impl<B: Block, const STACK: usize> Sliced<B, STACK> {
    pub fn new(id: TaskId, block: B) -> Self {
        const { assert!(STACK >= MIN_SLICE_STACK, "slice stack budget below minimum") };
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

    pub const fn stack_budget(&self) -> usize {
        STACK
    }
}

/// One slice run. Only one countdown exists, so slices never overlap:
/// the next one cannot start counting before this returns.
pub(crate) fn run<B: Block>(
    desc: &mut Descriptor,
    block: &mut B,
    locals: &mut B::Locals,
    frame: Frame<'_>,
    ticks: i32,
) -> SliceOutcome {
    if ticks <= 0 {
        log::trace!("{} slice skipped, budget {}", desc.name(), ticks);
        return SliceOutcome::Skipped;
    }

    let clock = frame.clock;
    clock.arm_slice(ticks);
    let step = costate::enter(
        desc,
        block,
        locals,
        Frame {
            sliced: true,
            ..frame
        },
    );
    let left = clock.disarm_slice();
    let used = (ticks as i64 - left as i64).max(0) as u32;

    match step {
        Step::Done(_) | Step::Abort => SliceOutcome::Finished { used },
        Step::Suspend(_) | Step::Continue(_) if left <= 0 => {
            if left < 0 {
                log::debug!("{} overran its slice by {} ticks", desc.name(), -left);
            }
            SliceOutcome::Exhausted { used }
        }
        Step::Suspend(_) | Step::Continue(_) => SliceOutcome::Yielded { used },
    }
}
