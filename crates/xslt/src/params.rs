//! Parameter sets passed from `xsl:with-param` to `xsl:param`.
use trellis_xdm::Sequence;

/// Compile-time alias for a parameter QName.
pub type ParamId = u32;

const INITIAL_CAPACITY: usize = 4;

/// A mapping from parameter id to `(value, type_checked)`. Keys are unique;
/// storage grows by doubling.
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    keys: Vec<ParamId>,
    values: Vec<Sequence>,
    type_checked: Vec<bool>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            keys: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            type_checked: Vec::with_capacity(capacity),
        }
    }

    /// A copy of `existing` with room for `extra` further entries.
    pub fn extend_from(existing: &ParameterSet, extra: usize) -> Self {
        let mut set = Self::with_capacity(existing.len() + extra);
        set.keys.extend_from_slice(&existing.keys);
        set.values.extend_from_slice(&existing.values);
        set.type_checked.extend_from_slice(&existing.type_checked);
        set
    }

    /// Adds a parameter, replacing any existing value for the same id.
    pub fn put(&mut self, id: ParamId, value: Sequence, checked: bool) {
        if let Some(index) = self.index_of(id) {
            self.values[index] = value;
            self.type_checked[index] = checked;
            return;
        }
        if self.keys.len() == self.keys.capacity() {
            let grow = self.keys.capacity().max(INITIAL_CAPACITY);
            self.keys.reserve_exact(grow);
            self.values.reserve_exact(grow);
            self.type_checked.reserve_exact(grow);
        }
        self.keys.push(id);
        self.values.push(value);
        self.type_checked.push(checked);
    }

    pub fn index_of(&self, id: ParamId) -> Option<usize> {
        self.keys.iter().position(|&k| k == id)
    }

    pub fn value(&self, index: usize) -> &Sequence {
        &self.values[index]
    }

    pub fn is_type_checked(&self, index: usize) -> bool {
        self.type_checked[index]
    }

    pub fn get(&self, id: ParamId) -> Option<&Sequence> {
        self.index_of(id).map(|i| &self.values[i])
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.values.clear();
        self.type_checked.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_xdm::AtomicValue;

    fn text(s: &str) -> Sequence {
        Sequence::singleton(AtomicValue::from(s))
    }

    #[test]
    fn test_put_replaces_existing() {
        let mut ps = ParameterSet::new();
        ps.put(7, text("a"), false);
        ps.put(7, text("b"), true);
        assert_eq!(ps.len(), 1);
        let i = ps.index_of(7).unwrap();
        assert_eq!(ps.value(i).string_join(""), "b");
        assert!(ps.is_type_checked(i));
    }

    #[test]
    fn test_grows_past_initial_capacity() {
        let mut ps = ParameterSet::with_capacity(1);
        for id in 0..20 {
            ps.put(id, text(&id.to_string()), false);
        }
        assert_eq!(ps.len(), 20);
        assert_eq!(ps.get(13).unwrap().string_join(""), "13");
        assert!(ps.get(21).is_none());
    }

    #[test]
    fn test_extend_from_copies_entries() {
        let mut base = ParameterSet::new();
        base.put(1, text("one"), true);
        let mut merged = ParameterSet::extend_from(&base, 1);
        merged.put(1, text("override"), false);
        merged.put(2, text("two"), false);
        assert_eq!(base.get(1).unwrap().string_join(""), "one");
        assert_eq!(merged.get(1).unwrap().string_join(""), "override");
        assert_eq!(merged.len(), 2);
    }
}
