// Suspension conditions: what a block can poll while it waits
//
// Each descriptor owns one delay timer and one interval timer, the same
// way a CoData carries a single timer slot. A delay is armed by the first
// poll at a waitfor and disarmed when it fires; an interval keeps its
// phase across cycles so it does not drift.

use crate::kernel::clock::{Clock, reached};
use crate::kernel::registry::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timers {
    delay_until: Option<u32>,
    interval_next: Option<u32>,
}

impl Timers {
    pub const fn new() -> Self {
        Self {
            delay_until: None,
            interval_next: None,
        }
    }

    pub(crate) fn clear_delay(&mut self) {
        self.delay_until = None;
    }

    pub fn delay_armed(&self) -> bool {
        self.delay_until.is_some()
    }
}

/// Who is running and on which pass; copied into every nested context.
#[derive(Clone, Copy)]
pub(crate) struct Frame<'a> {
    pub clock: &'a Clock,
    pub task: TaskId,
    pub pass: u32,
    pub sliced: bool,
}

/// Execution context handed to a block on every entry.
pub struct Cx<'a> {
    frame: Frame<'a>,
    timers: &'a mut Timers,
}

impl<'a> Cx<'a> {
    pub(crate) fn new(frame: Frame<'a>, timers: &'a mut Timers) -> Self {
        Self { frame, timers }
    }

    pub(crate) fn frame(&self) -> Frame<'a> {
        self.frame
    }

    /// Task on whose behalf the block runs. Cofunctions see their caller.
    pub fn task(&self) -> TaskId {
        self.frame.task
    }

    pub fn pass(&self) -> u32 {
        self.frame.pass
    }

    /// Running inside a slice.
    pub fn is_sliced(&self) -> bool {
        self.frame.sliced
    }

    pub fn clock(&self) -> &'a Clock {
        self.frame.clock
    }

    pub fn ticks(&self) -> u32 {
        self.frame.clock.ticks()
    }

    pub fn ms(&self) -> u32 {
        self.frame.clock.ms()
    }

    pub fn secs(&self) -> u32 {
        self.frame.clock.secs()
    }

    /// DelayTicks: false on the arming poll, true once `n` ticks passed.
    pub fn delay_ticks(&mut self, n: u32) -> bool {
        let now = self.ticks();
        match self.timers.delay_until {
            None if n == 0 => true,
            None => {
                self.timers.delay_until = Some(now.wrapping_add(n));
                false
            }
            Some(deadline) if reached(now, deadline) => {
                self.timers.delay_until = None;
                true
            }
            Some(_) => false,
        }
    }

    pub fn delay_ms(&mut self, ms: u32) -> bool {
        let n = self.frame.clock.ms_to_ticks(ms);
        self.delay_ticks(n)
    }

    pub fn delay_sec(&mut self, secs: u32) -> bool {
        let n = self.frame.clock.secs_to_ticks(secs);
        self.delay_ticks(n)
    }

    /// IntervalTicks: true once per period, phase-locked to the first poll.
    /// A late poll fires once and the next deadline stays on the grid.
    pub fn interval_ticks(&mut self, n: u32) -> bool {
        let now = self.ticks();
        match self.timers.interval_next {
            None => {
                self.timers.interval_next = Some(now.wrapping_add(n));
                n == 0
            }
            Some(next) if reached(now, next) => {
                self.timers.interval_next = Some(next.wrapping_add(n));
                true
            }
            Some(_) => false,
        }
    }

    pub fn interval_ms(&mut self, ms: u32) -> bool {
        let n = self.frame.clock.ms_to_ticks(ms);
        self.interval_ticks(n)
    }

    pub fn interval_sec(&mut self, secs: u32) -> bool {
        let n = self.frame.clock.secs_to_ticks(secs);
        self.interval_ticks(n)
    }
}
