// Task descriptor: everything a costatement keeps between passes
//
// Continuation point, lifecycle state, the CoData timers and an
// optional slice budget. Locals are typed per block and live with the
// block's owner; the descriptor only records when they must be reset.

use core::fmt;

use crate::kernel::costate::Point;
use crate::kernel::slice::SliceBudget;
use crate::kernel::wait::Timers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Disabled,
    Ready,
    Paused,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Disabled => write!(f, "disabled"),
            TaskState::Ready => write!(f, "ready"),
            TaskState::Paused => write!(f, "paused"),
        }
    }
}

/// How a task starts and what happens when it runs off its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launch {
    /// Running from the first pass; restarts from the top after completing.
    AlwaysOn,
    /// Running from the first pass; disables itself after one cycle.
    InitOn,
    /// Disabled until `enable`; one cycle per enable.
    Off,
}

impl Launch {
    pub const fn repeats(self) -> bool {
        matches!(self, Launch::AlwaysOn)
    }

    const fn initial_state(self) -> TaskState {
        match self {
            Launch::AlwaysOn | Launch::InitOn => TaskState::Ready,
            Launch::Off => TaskState::Disabled,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Descriptor {
    name: &'static str,
    index: u8,
    launch: Launch,
    state: TaskState,
    point: Point,
    // everytime already ran for the current cycle
    cycle_open: bool,
    // locals get Default::default() on the next fresh entry
    reset_pending: bool,
    pub(crate) timers: Timers,
    slice: Option<SliceBudget>,
    entered_pass: Option<u32>,
    cycles: u32,
}

impl Descriptor {
    pub const fn new(name: &'static str, index: u8, launch: Launch) -> Self {
        Self {
            name,
            index,
            launch,
            state: launch.initial_state(),
            point: Point::START,
            cycle_open: false,
            reset_pending: true,
            timers: Timers::new(),
            slice: None,
            entered_pass: None,
            cycles: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn launch(&self) -> Launch {
        self.launch
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn point(&self) -> Point {
        self.point
    }

    /// isCoRunning
    pub fn is_active(&self) -> bool {
        self.state == TaskState::Ready
    }

    /// isCoDone: stopped at the top after finishing at least one cycle.
    pub fn is_done(&self) -> bool {
        self.state == TaskState::Disabled && self.point.is_start() && self.cycles > 0
    }

    /// Completed cycles since registration.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn slice(&self) -> Option<&SliceBudget> {
        self.slice.as_ref()
    }

    pub(crate) fn slice_mut(&mut self) -> Option<&mut SliceBudget> {
        self.slice.as_mut()
    }

    pub(crate) fn set_slice(&mut self, budget: SliceBudget) {
        self.slice = Some(budget);
    }

    pub(crate) fn is_fresh(&self) -> bool {
        !self.cycle_open
    }

    /// Marks the start of a cycle; true if locals must be reinitialised.
    pub(crate) fn open_cycle(&mut self) -> bool {
        self.cycle_open = true;
        core::mem::replace(&mut self.reset_pending, false)
    }

    // once per pass
    pub(crate) fn claim_pass(&mut self, pass: u32) -> bool {
        if self.entered_pass == Some(pass) {
            return false;
        }
        self.entered_pass = Some(pass);
        true
    }

    pub(crate) fn suspend_at(&mut self, point: Point) {
        self.point = point;
    }

    pub(crate) fn complete(&mut self) {
        self.point = Point::START;
        self.cycle_open = false;
        self.timers.clear_delay();
        self.cycles = self.cycles.wrapping_add(1);
        if !self.launch.repeats() {
            self.state = TaskState::Disabled;
        }
    }

    // CoBegin
    pub(crate) fn enable(&mut self) {
        self.rewind();
        self.state = TaskState::Ready;
    }

    // CoReset
    pub(crate) fn reset(&mut self) {
        self.rewind();
        self.state = TaskState::Disabled;
    }

    /// Back to the top with fresh locals and timers, state untouched.
    pub(crate) fn rewind(&mut self) {
        self.point = Point::START;
        self.cycle_open = false;
        self.reset_pending = true;
        self.timers = Timers::new();
    }

    pub(crate) fn pause(&mut self) -> bool {
        if self.state == TaskState::Ready {
            self.state = TaskState::Paused;
            return true;
        }
        false
    }

    pub(crate) fn resume(&mut self) -> bool {
        if self.state == TaskState::Paused {
            self.state = TaskState::Ready;
            return true;
        }
        false
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}] {} at {}", self.name, self.index, self.state, self.point)
    }
}
