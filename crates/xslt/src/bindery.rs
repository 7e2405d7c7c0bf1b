//! Per-transformation storage for global variables and parameters.
//!
//! Each global slot moves through `Uncomputed → Busy → Done` at most once.
//! Re-entering a busy slot means the variable's definition depends on itself
//! and is reported as a circularity. Transitions happen under a per-slot
//! mutex so that at most one value is ever recorded for a slot.
use crate::error::{Result, XsltError};
use crate::types::{RoleLocator, SequenceType, convert_sequence};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use trellis_xdm::{QName, Sequence};

#[derive(Debug, Clone)]
enum SlotState {
    Uncomputed,
    Busy,
    Done(Sequence),
}

#[derive(Debug)]
pub struct Bindery {
    slots: Vec<Mutex<SlotState>>,
    supplied: HashMap<QName, Sequence>,
}

impl Bindery {
    pub fn new(size: usize, supplied: HashMap<QName, Sequence>) -> Self {
        Self {
            slots: (0..size).map(|_| Mutex::new(SlotState::Uncomputed)).collect(),
            supplied,
        }
    }

    fn slot(&self, slot: usize) -> Result<MutexGuard<'_, SlotState>> {
        let cell = self.slots.get(slot).ok_or_else(|| {
            XsltError::dynamic("XTDE0640", format!("No global variable slot {}", slot))
        })?;
        Ok(cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    /// The value of a slot, if it has been computed.
    pub fn global_variable_value(&self, slot: usize) -> Result<Option<Sequence>> {
        Ok(match &*self.slot(slot)? {
            SlotState::Done(value) => Some(value.clone()),
            _ => None,
        })
    }

    /// Binds an externally supplied value for the parameter `name`, converted
    /// to `required` by the function conversion rules. Returns whether a
    /// value was supplied.
    pub fn use_global_parameter(&self, name: &QName, slot: usize, required: &SequenceType) -> Result<bool> {
        if self.global_variable_value(slot)?.is_some() {
            return Ok(true);
        }
        let Some(value) = self.supplied.get(name) else {
            return Ok(false);
        };
        let value = convert_sequence(value.clone(), required, &RoleLocator::param(&name.display_name()))?;
        self.save_global_variable_value(slot, value)?;
        Ok(true)
    }

    /// Marks a slot as being computed. Fails with a circularity error when
    /// the slot is already busy.
    pub fn set_executing(&self, slot: usize, name: &QName) -> Result<()> {
        let mut state = self.slot(slot)?;
        match *state {
            SlotState::Busy => Err(XsltError::circularity(name.display_name())),
            SlotState::Uncomputed => {
                *state = SlotState::Busy;
                Ok(())
            }
            SlotState::Done(_) => Ok(()),
        }
    }

    /// Releases a busy slot without storing a value.
    pub fn set_not_executing(&self, slot: usize) -> Result<()> {
        let mut state = self.slot(slot)?;
        if matches!(*state, SlotState::Busy) {
            *state = SlotState::Uncomputed;
        }
        Ok(())
    }

    /// Records `value` unless another evaluation got there first, in which
    /// case the earlier value is returned and `value` is discarded.
    pub fn save_global_variable_value(&self, slot: usize, value: Sequence) -> Result<Sequence> {
        let mut state = self.slot(slot)?;
        if let SlotState::Done(existing) = &*state {
            return Ok(existing.clone());
        }
        *state = SlotState::Done(value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
