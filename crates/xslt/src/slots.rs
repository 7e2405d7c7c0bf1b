//! Local variable storage: slot layouts and stack frames.
use trellis_xdm::{QName, Sequence};

/// Describes the local variable slots a procedure (template, global variable
/// initializer) needs. Names are kept for diagnostics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotManager {
    names: Vec<QName>,
}

impl SlotManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_slot(&mut self, name: QName) -> usize {
        self.names.push(name);
        self.names.len() - 1
    }

    pub fn number_of_variables(&self) -> usize {
        self.names.len()
    }

    pub fn variable_name(&self, slot: usize) -> Option<&QName> {
        self.names.get(slot)
    }
}

/// The values of one activation's local variables.
#[derive(Debug, Clone, Default)]
pub struct StackFrame {
    slots: Vec<Option<Sequence>>,
}

impl StackFrame {
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![None; size],
        }
    }

    pub fn for_slots(map: &SlotManager) -> Self {
        Self::new(map.number_of_variables())
    }

    pub fn get(&self, slot: usize) -> Option<&Sequence> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn set(&mut self, slot: usize, value: Sequence) {
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, None);
        }
        self.slots[slot] = Some(value);
    }

    /// Drops every value so that nothing leaks into a reused frame.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|s| *s = None);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
