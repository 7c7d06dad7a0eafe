// Costatement kernel
// Single core, cooperative. Preemption only inside tick-budgeted slices.
//
// Blocks are state machines re-entered at their stored point; the
// scheduler owns their descriptors and walks them once per pass in
// program order. Cofunctions are blocks bound to one caller at a time.

pub mod clock;
pub mod cofunc;
pub mod costate;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod shared;
pub mod slice;
pub mod task;
pub mod wait;

pub use clock::{Clock, SYS_CLOCK, on_tick_interrupt};
pub use cofunc::{Call, Cofunc, CofuncArray, Wfd, WfdStatus};
pub use costate::{Block, FnBlock, Point, Step, from_fn};
pub use queue::RingQueue;
pub use registry::{ConfigError, TaskId, TaskTable};
pub use scheduler::{Costate, Dispatch, Entry, Indexed, PassRecord, Scheduler};
pub use shared::{Shared, Split32};
pub use slice::{SliceBudget, SliceOutcome, Sliced};
pub use task::{Descriptor, Launch, TaskState};
pub use wait::{Cx, Timers};
