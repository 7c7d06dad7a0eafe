// Resumable blocks as explicit state machines
//
// A block is written as a match over its suspension points. The engine
// re-enters it at the stored point, runs it until it suspends or ends,
// and records the new point in one store afterwards. No stack is kept
// between entries; everything that must survive lives in Locals.

use core::fmt;

use crate::kernel::task::Descriptor;
use crate::kernel::wait::{Cx, Frame};

/// Where a block resumes. `START` is the top; the rest are whatever
/// numbering the block's own match uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Point(u16);

impl Point {
    pub const START: Point = Point(0);

    pub const fn at(n: u16) -> Self {
        Self(n)
    }

    pub const fn get(self) -> u16 {
        self.0
    }

    pub const fn is_start(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_start() {
            write!(f, "start")
        } else {
            write!(f, "@{}", self.0)
        }
    }
}

/// What one entry into a block produced.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step<T = ()> {
    /// Blocked or yielding; resume at the point on a later pass.
    Suspend(Point),
    /// Safe point: keep going unless a slice budget ran out.
    Continue(Point),
    /// Ran off the end.
    Done(T),
    /// `abort`: ends the cycle like Done but reports failure to a waiter.
    Abort,
}

impl<T> Step<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, Step::Done(_))
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, Step::Suspend(_))
    }
}

pub trait Block {
    /// Task-owned locals. Reset with `Default` once per enable.
    type Locals: Default;
    type Output;

    fn resume(
        &mut self,
        at: Point,
        locals: &mut Self::Locals,
        cx: &mut Cx<'_>,
    ) -> Step<Self::Output>;

    /// Prologue run on every fresh entry, before the first statement.
    fn everytime(&mut self, _locals: &mut Self::Locals, _cx: &mut Cx<'_>) {}

    /// Cleanup when a bound caller walks away mid-cycle.
    fn abandon(&mut self, _locals: &mut Self::Locals) {}
}

/// A block from a closure; state is whatever the closure captures.
pub struct FnBlock<F>(F);

pub fn from_fn<F, T>(f: F) -> FnBlock<F>
where
    F: FnMut(Point, &mut Cx<'_>) -> Step<T>,
{
    FnBlock(f)
}

impl<F, T> Block for FnBlock<F>
where
    F: FnMut(Point, &mut Cx<'_>) -> Step<T>,
{
    type Locals = ();
    type Output = T;

    fn resume(&mut self, at: Point, _locals: &mut (), cx: &mut Cx<'_>) -> Step<T> {
        (self.0)(at, cx)
    }
}

/// Run `block` from the descriptor's continuation until it suspends or
/// completes. Safe points are passed straight through unless the frame
/// is sliced and the clock says the budget is gone.
pub(crate) fn enter<B: Block>(
    desc: &mut Descriptor,
    block: &mut B,
    locals: &mut B::Locals,
    frame: Frame<'_>,
) -> Step<B::Output> {
    if desc.is_fresh() {
        if desc.open_cycle() {
            *locals = B::Locals::default();
        }
        let mut cx = Cx::new(frame, &mut desc.timers);
        block.everytime(locals, &mut cx);
    }

    loop {
        let at = desc.point();
        let step = {
            let mut cx = Cx::new(frame, &mut desc.timers);
            block.resume(at, locals, &mut cx)
        };

        match step {
            Step::Continue(p) => {
                desc.suspend_at(p);
                if frame.sliced && frame.clock.slice_expired() {
                    log::trace!("{} preempted at {}", desc.name(), p);
                    return Step::Suspend(p);
                }
            }
            Step::Suspend(p) => {
                desc.suspend_at(p);
                return Step::Suspend(p);
            }
            Step::Done(v) => {
                desc.complete();
                log::trace!("{} completed cycle {}", desc.name(), desc.cycles());
                return Step::Done(v);
            }
            Step::Abort => {
                desc.complete();
                log::debug!("{} aborted", desc.name());
                return Step::Abort;
            }
        }
    }
}
