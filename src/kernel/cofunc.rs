// Cofunctions: resumable blocks shared between tasks
//
// A single-user cofunction is bound to one caller at a time. The caller
// keeps the binding by requesting it every pass; the claim records the
// last pass it did. When another task asks and the owner skipped the
// whole previous pass, the owner is abandoned: its abandon handler runs,
// the continuation is cleared and the oldest pending requester that is
// still asking gets the block. This is decided purely from request
// history, lazily, whenever the block is requested or settled.

use core::fmt;

use crate::config::MAX_PENDING_CALLERS;
use crate::kernel::costate::{self, Block, Step};
use crate::kernel::queue::RingQueue;
use crate::kernel::registry::TaskId;
use crate::kernel::task::{Descriptor, Launch};
use crate::kernel::wait::Cx;

/// Result of asking a cofunction to run.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call<T> {
    /// Running for this caller; ask again next pass.
    Pending,
    /// Bound to another caller; this one is queued.
    Busy,
    Done(T),
    Aborted,
}

impl<T> Call<T> {
    pub fn is_finished(&self) -> bool {
        matches!(self, Call::Done(_) | Call::Aborted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Claim {
    task: TaskId,
    pass: u32,
}

impl Claim {
    // not requested during the previous pass nor this one
    fn is_stale(&self, pass: u32) -> bool {
        pass.wrapping_sub(self.pass) > 1
    }
}

pub struct Cofunc<B: Block> {
    name: &'static str,
    block: B,
    locals: B::Locals,
    desc: Descriptor,
    owner: Option<Claim>,
    pending: RingQueue<Claim, MAX_PENDING_CALLERS>,
    abandoned: u32,
}

impl<B: Block> Cofunc<B> {
    pub fn new(name: &'static str, block: B) -> Self {
        Self::indexed(name, 0, block)
    }

    fn indexed(name: &'static str, index: u8, block: B) -> Self {
        Self {
            name,
            block,
            locals: B::Locals::default(),
            desc: Descriptor::new(name, index, Launch::Off),
            owner: None,
            pending: RingQueue::new(),
            abandoned: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current binding, if any.
    pub fn owner(&self) -> Option<TaskId> {
        self.owner.map(|c| c.task)
    }

    /// How many times a bound caller was abandoned.
    pub fn abandoned(&self) -> u32 {
        self.abandoned
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
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

    /// Run (or keep running) on behalf of `cx.task()`.
    pub fn call(&mut self, cx: &mut Cx<'_>) -> Call<B::Output> {
        let task = cx.task();
        let pass = cx.pass();
        self.settle(pass);

        match self.owner {
            None => self.bind(Claim { task, pass }),
            Some(claim) if claim.task == task => self.owner = Some(Claim { task, pass }),
            Some(_) => {
                self.queue(Claim { task, pass });
                return Call::Busy;
            }
        }

        let frame = cx.frame();
        match costate::enter(&mut self.desc, &mut self.block, &mut self.locals, frame) {
            Step::Done(v) => {
                self.release();
                Call::Done(v)
            }
            Step::Abort => {
                self.release();
                Call::Aborted
            }
            Step::Suspend(_) | Step::Continue(_) => Call::Pending,
        }
    }

    /// Apply the abandonment rule for `pass` without running anything.
    /// Embedding programs may call this from their loop head so a
    /// deserted block is released even if nobody asks for it.
    pub fn settle(&mut self, pass: u32) {
        self.pending.retain(|c| !c.is_stale(pass));

        let Some(owner) = self.owner else {
            return;
        };
        if !owner.is_stale(pass) {
            return;
        }

        log::info!(
            "{}: abandoning {} (last request pass {}, now {})",
            self.name,
            owner.task,
            owner.pass,
            pass
        );
        self.block.abandon(&mut self.locals);
        self.abandoned = self.abandoned.wrapping_add(1);
        self.owner = None;
        self.desc.rewind();

        if let Some(next) = self.pending.pop() {
            self.bind(next);
        }
    }

    fn bind(&mut self, claim: Claim) {
        log::debug!("{}: bound to {}", self.name, claim.task);
        self.owner = Some(claim);
        self.desc.rewind();
    }

    fn release(&mut self) {
        self.owner = None;
        // next in line starts on its own next request
        if let Some(next) = self.pending.pop() {
            self.bind(next);
        }
    }

    fn queue(&mut self, claim: Claim) {
        if let Some(waiting) = self.pending.find_mut(|c| c.task == claim.task) {
            waiting.pass = claim.pass;
            return;
        }
        if self.pending.push(claim).is_err() {
            log::warn!("{}: pending list full, {} not queued", self.name, claim.task);
        }
    }
}

/// `cofunc name[N]`: N independent instances of one block.
pub struct CofuncArray<B: Block, const N: usize> {
    slots: [Cofunc<B>; N],
}

impl<B: Block, const N: usize> CofuncArray<B, N> {
    pub fn new(name: &'static str, mut make: impl FnMut(usize) -> B) -> Self {
        Self {
            slots: core::array::from_fn(|i| Cofunc::indexed(name, i as u8, make(i))),
        }
    }

    /// `name[i](...)`; an out-of-range index is reported as an abort.
    pub fn call(&mut self, i: usize, cx: &mut Cx<'_>) -> Call<B::Output> {
        match self.slots.get_mut(i) {
            Some(slot) => slot.call(cx),
            None => {
                log::warn!("cofunction index {} out of range ({})", i, N);
                Call::Aborted
            }
        }
    }

    pub fn get(&self, i: usize) -> Option<&Cofunc<B>> {
        self.slots.get(i)
    }

    pub fn settle(&mut self, pass: u32) {
        for slot in self.slots.iter_mut() {
            slot.settle(pass);
        }
    }

    pub const fn len(&self) -> usize {
        N
    }

    pub const fn is_empty(&self) -> bool {
        N == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WfdStatus {
    Pending,
    Done,
    /// Branch that aborted first.
    Aborted(usize),
}

impl fmt::Display for WfdStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WfdStatus::Pending => write!(f, "pending"),
            WfdStatus::Done => write!(f, "done"),
            WfdStatus::Aborted(i) => write!(f, "branch {} aborted", i),
        }
    }
}

/// `waitfordone { a(); b(); ... }` over up to 32 branches.
///
/// Keep it in the caller's locals, call `branch` for each cofunction in
/// order every pass, then `finish`. Finished branches are not called
/// again. `finish` rearms the set once it reports Done or Aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Wfd {
    done: u32,
    aborted: Option<u8>,
}

impl Wfd {
    pub const fn new() -> Self {
        Self {
            done: 0,
            aborted: None,
        }
    }

    /// Poll branch `i` unless it already finished. Returns the value the
    /// branch produced on the pass it completed.
    pub fn branch<T>(&mut self, i: usize, call: impl FnOnce() -> Call<T>) -> Option<T> {
        if i >= u32::BITS as usize {
            log::warn!("waitfordone branch {} out of range", i);
            return None;
        }
        let bit = 1u32 << i;
        if self.done & bit != 0 || self.aborted.is_some() {
            return None;
        }
        match call() {
            Call::Done(v) => {
                self.done |= bit;
                Some(v)
            }
            Call::Aborted => {
                self.done |= bit;
                self.aborted = Some(i as u8);
                None
            }
            Call::Pending | Call::Busy => None,
        }
    }

    pub fn finish(&mut self, branches: usize) -> WfdStatus {
        let all = if branches >= 32 {
            u32::MAX
        } else {
            (1u32 << branches) - 1
        };
        let status = match self.aborted {
            Some(i) => WfdStatus::Aborted(i as usize),
            None if self.done & all == all => WfdStatus::Done,
            None => return WfdStatus::Pending,
        };
        *self = Self::new();
        status
    }
}
