// Fixed arena of task descriptors
//
// Sized by a const generic and filled once at startup. Ids are plain
// indices handed out in registration order; an indexed family takes a
// contiguous run so instance i is base + i. Nothing is ever removed.

use core::fmt;

use crate::config::{MAX_FAMILY_SIZE, MAX_SLICE_TICKS};
use crate::kernel::slice::SliceBudget;
use crate::kernel::task::{Descriptor, Launch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u16);

impl TaskId {
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Instance `i` of the family starting at `self`.
    pub const fn offset(self, i: usize) -> Self {
        Self(self.0 + i as u16)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Rejected at setup; nothing is truncated to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    TableFull {
        name: &'static str,
        capacity: usize,
    },
    DuplicateName(&'static str),
    EmptyFamily(&'static str),
    FamilyTooLarge {
        name: &'static str,
        count: usize,
    },
    SliceBudgetTooLarge {
        name: &'static str,
        ticks: i32,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::TableFull { name, capacity } => {
                write!(f, "no slot for {} (capacity {})", name, capacity)
            }
            ConfigError::DuplicateName(name) => write!(f, "{} registered twice", name),
            ConfigError::EmptyFamily(name) => write!(f, "{} declared with zero instances", name),
            ConfigError::FamilyTooLarge { name, count } => {
                write!(f, "{}[{}] exceeds {} instances", name, count, MAX_FAMILY_SIZE)
            }
            ConfigError::SliceBudgetTooLarge { name, ticks } => {
                write!(f, "{} slice of {} ticks exceeds {}", name, ticks, MAX_SLICE_TICKS)
            }
        }
    }
}

impl core::error::Error for ConfigError {}

pub struct TaskTable<const N: usize> {
    slots: [Option<Descriptor>; N],
    len: usize,
}

impl<const N: usize> TaskTable<N> {
    pub const fn new() -> Self {
        const { assert!(N <= u16::MAX as usize, "task table larger than the id space") };
        Self {
            slots: [None; N],
            len: 0,
        }
    }

    pub fn register(&mut self, name: &'static str, launch: Launch) -> Result<TaskId, ConfigError> {
        self.register_indexed(name, 1, launch)
    }

    pub fn register_indexed(
        &mut self,
        name: &'static str,
        count: usize,
        launch: Launch,
    ) -> Result<TaskId, ConfigError> {
        if count == 0 {
            return Err(ConfigError::EmptyFamily(name));
        }
        if count > MAX_FAMILY_SIZE {
            return Err(ConfigError::FamilyTooLarge { name, count });
        }
        if self.find(name).is_some() {
            return Err(ConfigError::DuplicateName(name));
        }
        if self.len + count > N {
            return Err(ConfigError::TableFull { name, capacity: N });
        }

        let base = TaskId(self.len as u16);
        for i in 0..count {
            self.slots[self.len] = Some(Descriptor::new(name, i as u8, launch));
            self.len += 1;
        }
        Ok(base)
    }

    pub fn register_sliced(
        &mut self,
        name: &'static str,
        launch: Launch,
        ticks: i32,
    ) -> Result<TaskId, ConfigError> {
        check_budget(name, ticks)?;
        let id = self.register(name, launch)?;
        if let Some(desc) = self.get_mut(id) {
            desc.set_slice(SliceBudget::new(ticks));
        }
        Ok(id)
    }

    /// First instance registered under `name`.
    pub fn find(&self, name: &str) -> Option<TaskId> {
        self.slots[..self.len]
            .iter()
            .position(|s| s.as_ref().is_some_and(|d| d.name() == name))
            .map(|i| TaskId(i as u16))
    }

    pub fn get(&self, id: TaskId) -> Option<&Descriptor> {
        self.slots.get(id.0 as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Descriptor> {
        self.slots.get_mut(id.0 as usize)?.as_mut()
    }

    pub(crate) fn slots_mut(&mut self) -> &mut [Option<Descriptor>] {
        &mut self.slots[..self.len]
    }

    pub fn iter(&self) -> impl Iterator<Item = (TaskId, &Descriptor)> {
        self.slots[..self.len]
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|d| (TaskId(i as u16), d)))
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for TaskTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn check_budget(name: &'static str, ticks: i32) -> Result<(), ConfigError> {
    if ticks > MAX_SLICE_TICKS {
        log::warn!("rejecting {} tick slice for {}", ticks, name);
        return Err(ConfigError::SliceBudgetTooLarge { name, ticks });
    }
    Ok(())
}
