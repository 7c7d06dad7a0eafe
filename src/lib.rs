// costatement runtime for small single-core targets
//
// Resumable blocks, a pass-driven cooperative scheduler, cofunctions
// and tick-budgeted slices. No heap, no stack per task.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod kernel;

pub use kernel::{
    Block, Call, Clock, Cofunc, CofuncArray, ConfigError, Costate, Cx, Descriptor, Dispatch,
    Entry, Indexed, Launch, PassRecord, Point, Scheduler, Shared, SliceOutcome, Sliced, Split32,
    Step, TaskId, TaskState, Wfd, WfdStatus, from_fn,
};

/// Suspend at `$at` until `$cond` holds.
///
/// Only usable inside a `Block::resume` body: it returns
/// `Step::Suspend($at)` from the enclosing function when the
/// condition is false, so the next pass re-polls at the same point.
#[macro_export]
macro_rules! waitfor {
    ($cond:expr, $at:expr) => {
        if !$cond {
            return $crate::Step::Suspend($at);
        }
    };
}
