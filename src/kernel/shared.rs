// Variables shared between tasks, with and without the `shared` guarantee
//
// Shared<T> updates inside a critical section, so a tick interrupt or a
// slice boundary can never land between the read and the store.
// Split32 is what a plain 32-bit variable is on a 16-bit data path: two
// stores a slice can cut between. Readers can then see a torn value.

use core::cell::Cell;

use critical_section::Mutex;

pub struct Shared<T: Copy> {
    inner: Mutex<Cell<T>>,
}

impl<T: Copy> Shared<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(Cell::new(value)),
        }
    }

    pub fn get(&self) -> T {
        critical_section::with(|cs| self.inner.borrow(cs).get())
    }

    pub fn set(&self, value: T) {
        critical_section::with(|cs| self.inner.borrow(cs).set(value));
    }

    /// Read-modify-write as one indivisible step; returns the new value.
    pub fn update(&self, f: impl FnOnce(T) -> T) -> T {
        critical_section::with(|cs| {
            let cell = self.inner.borrow(cs);
            let next = f(cell.get());
            cell.set(next);
            next
        })
    }
}

impl<T: Copy + Default> Default for Shared<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// A 32-bit counter stored as two 16-bit words.
///
/// An increment is two steps: `bump_low` then `carry`. A block that
/// returns a safe point between them can be preempted there, leaving
/// the high word behind until its next entry. Each half is its own
/// critical section, so only the pair can be seen torn.
pub struct Split32 {
    lo: Mutex<Cell<u16>>,
    hi: Mutex<Cell<u16>>,
    carry: Mutex<Cell<bool>>,
}

impl Split32 {
    pub const fn new() -> Self {
        Self {
            lo: Mutex::new(Cell::new(0)),
            hi: Mutex::new(Cell::new(0)),
            carry: Mutex::new(Cell::new(false)),
        }
    }

    /// First half of `+= 1`.
    pub fn bump_low(&self) {
        critical_section::with(|cs| {
            let lo = self.lo.borrow(cs);
            let (next, wrapped) = lo.get().overflowing_add(1);
            lo.set(next);
            if wrapped {
                self.carry.borrow(cs).set(true);
            }
        });
    }

    /// Second half: propagate a pending carry into the high word.
    pub fn carry(&self) {
        critical_section::with(|cs| {
            if self.carry.borrow(cs).replace(false) {
                let hi = self.hi.borrow(cs);
                hi.set(hi.get().wrapping_add(1));
            }
        });
    }

    /// Both halves between increments.
    pub fn increment(&self) {
        self.bump_low();
        self.carry();
    }

    /// What a reader sees right now, torn or not.
    pub fn get(&self) -> u32 {
        critical_section::with(|cs| {
            ((self.hi.borrow(cs).get() as u32) << 16) | self.lo.borrow(cs).get() as u32
        })
    }

    pub fn is_torn(&self) -> bool {
        critical_section::with(|cs| self.carry.borrow(cs).get())
    }
}

impl Default for Split32 {
    fn default() -> Self {
        Self::new()
    }
}
