// Tick source shared between the timer interrupt and the main loop
//
// The ISR calls tick(); everything else only reads. The slice
// countdown lives here too so that it is decremented by the interrupt
// alone, never by scheduler bookkeeping. Critical sections guard the
// cells because small cores have no atomic read-modify-write.

use core::cell::Cell;

use critical_section::Mutex;

use crate::config::DEFAULT_TICKS_PER_SEC;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Countdown {
    armed: bool,
    remaining: i32,
}

impl Countdown {
    const IDLE: Self = Self {
        armed: false,
        remaining: 0,
    };
}

pub struct Clock {
    ticks: Mutex<Cell<u32>>,
    slice: Mutex<Cell<Countdown>>,
    ticks_per_sec: u32,
}

/// Clock fed by the board's periodic interrupt.
pub static SYS_CLOCK: Clock = Clock::new(DEFAULT_TICKS_PER_SEC);

/// Hook for the timer interrupt handler.
#[inline]
pub fn on_tick_interrupt() {
    SYS_CLOCK.tick();
}

impl Clock {
    /// A zero rate is rejected here; in a `static` that is a build error.
    pub const fn new(ticks_per_sec: u32) -> Self {
        assert!(ticks_per_sec > 0, "tick rate must be non-zero");
        Self {
            ticks: Mutex::new(Cell::new(0)),
            slice: Mutex::new(Cell::new(Countdown::IDLE)),
            ticks_per_sec,
        }
    }

    /// One timer interrupt.
    #[inline]
    pub fn tick(&self) {
        self.advance(1);
    }

    /// `n` interrupts at once, for timers that fire at a multiple of
    /// the base rate.
    pub fn advance(&self, n: u32) {
        critical_section::with(|cs| {
            let ticks = self.ticks.borrow(cs);
            ticks.set(ticks.get().wrapping_add(n));

            let slice = self.slice.borrow(cs);
            let mut cd = slice.get();
            if cd.armed {
                cd.remaining = cd.remaining.saturating_sub(n.min(i32::MAX as u32) as i32);
                slice.set(cd);
            }
        });
    }

    pub fn ticks(&self) -> u32 {
        critical_section::with(|cs| self.ticks.borrow(cs).get())
    }

    pub const fn ticks_per_sec(&self) -> u32 {
        self.ticks_per_sec
    }

    // MS_TIMER
    pub fn ms(&self) -> u32 {
        (self.ticks() as u64 * 1000 / self.ticks_per_sec as u64) as u32
    }

    // SEC_TIMER
    pub fn secs(&self) -> u32 {
        self.ticks() / self.ticks_per_sec
    }

    /// Milliseconds to ticks, rounded up so a delay never ends early.
    pub fn ms_to_ticks(&self, ms: u32) -> u32 {
        let t = (ms as u64 * self.ticks_per_sec as u64).div_ceil(1000);
        t.min(u32::MAX as u64) as u32
    }

    pub fn secs_to_ticks(&self, secs: u32) -> u32 {
        secs.saturating_mul(self.ticks_per_sec)
    }

    pub(crate) fn arm_slice(&self, budget: i32) {
        critical_section::with(|cs| {
            self.slice.borrow(cs).set(Countdown {
                armed: true,
                remaining: budget,
            })
        });
    }

    // returns what was left (negative on overrun)
    pub(crate) fn disarm_slice(&self) -> i32 {
        critical_section::with(|cs| {
            let slice = self.slice.borrow(cs);
            let left = slice.get().remaining;
            slice.set(Countdown::IDLE);
            left
        })
    }

    pub(crate) fn slice_expired(&self) -> bool {
        critical_section::with(|cs| {
            let cd = self.slice.borrow(cs).get();
            cd.armed && cd.remaining <= 0
        })
    }

    /// Ticks left in the armed slice, if any.
    pub fn slice_remaining(&self) -> Option<i32> {
        critical_section::with(|cs| {
            let cd = self.slice.borrow(cs).get();
            cd.armed.then_some(cd.remaining)
        })
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(DEFAULT_TICKS_PER_SEC)
    }
}

/// True once `now` has reached `deadline`, tolerant of counter wrap.
#[inline]
pub(crate) fn reached(now: u32, deadline: u32) -> bool {
    now.wrapping_sub(deadline) as i32 >= 0
}
