//! Variable values captured at a block boundary.

use std::collections::BTreeMap;

use adjoint_core::{Variable, VariableId};

/// Values of variables needed to replay forward from the start of a block.
///
/// Entries are keyed by variable identity. The first value inserted for
/// an identity wins.
///
/// # Example
///
/// ```
/// use adjoint_checkpoint::Snapshot;
/// use adjoint_core::Variable;
///
/// let u = Variable::with_values("u", vec![1.0, 2.0]);
/// let mut snapshot = Snapshot::new(3);
/// assert!(snapshot.capture(&u));
/// u.scale(2.0);
/// assert!(!snapshot.capture(&u));
/// assert_eq!(snapshot.get(u.id()), Some(&[1.0, 2.0][..]));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    block: usize,
    values: BTreeMap<VariableId, Vec<f64>>,
}

impl Snapshot {
    /// Creates an empty snapshot for `block`.
    pub fn new(block: usize) -> Self {
        Self {
            block,
            values: BTreeMap::new(),
        }
    }

    /// Block at whose start the values were taken.
    #[inline]
    pub fn block(&self) -> usize {
        self.block
    }

    /// Records the current value of `variable` unless one is already held.
    ///
    /// Returns `true` if a value was recorded.
    pub fn capture(&mut self, variable: &Variable) -> bool {
        self.insert(variable.id(), variable.to_vec())
    }

    /// Records `values` for `id` unless one is already held.
    pub fn insert(&mut self, id: VariableId, values: Vec<f64>) -> bool {
        match self.values.entry(id) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(entry) => {
                entry.insert(values);
                true
            }
        }
    }

    /// Stored values of `id`.
    pub fn get(&self, id: VariableId) -> Option<&[f64]> {
        self.values.get(&id).map(Vec::as_slice)
    }

    /// Returns `true` if `id` has a stored value.
    #[inline]
    pub fn contains(&self, id: VariableId) -> bool {
        self.values.contains_key(&id)
    }

    /// Number of stored variables.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing is stored.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Stored entries in identity order.
    pub fn iter(&self) -> impl Iterator<Item = (VariableId, &[f64])> + '_ {
        self.values.iter().map(|(&id, v)| (id, v.as_slice()))
    }

    /// Approximate payload size in bytes.
    pub fn memory_size(&self) -> usize {
        self.values
            .values()
            .map(|v| v.len() * std::mem::size_of::<f64>() + std::mem::size_of::<VariableId>())
            .sum::<usize>()
            + std::mem::size_of::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_value_wins() {
        let mut snapshot = Snapshot::new(0);
        let id = VariableId::from_raw(7);
        assert!(snapshot.insert(id, vec![1.0]));
        assert!(!snapshot.insert(id, vec![2.0]));
        assert_eq!(snapshot.get(id), Some(&[1.0][..]));
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn test_iter_in_identity_order() {
        let mut snapshot = Snapshot::new(2);
        snapshot.insert(VariableId::from_raw(9), vec![0.0]);
        snapshot.insert(VariableId::from_raw(3), vec![1.0, 1.0]);
        let ids: Vec<u64> = snapshot.iter().map(|(id, _)| id.as_u64()).collect();
        assert_eq!(ids, vec![3, 9]);
        assert!(snapshot.memory_size() > 3 * std::mem::size_of::<f64>());
    }
}
