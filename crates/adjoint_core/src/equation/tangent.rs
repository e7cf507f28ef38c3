//! Map from variables to their tangent-linear companions.

use std::collections::HashMap;

use crate::reference::VariableRef;
use crate::variable::{Variable, VariableId};

/// Tangent-linear companions, keyed by primal identity.
///
/// A variable with no entry has a zero tangent. Entries are created only
/// for solutions of tangent-linear equations. Companions can also be looked
/// up by their own identity, which is how a tangent-linear equation's
/// dependencies are told apart from the primal values it reads.
#[derive(Clone, Debug, Default)]
pub struct TangentLinearMap {
    tangents: HashMap<VariableId, Variable>,
    companions: HashMap<VariableId, Variable>,
}

impl TangentLinearMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Companion of `id`, if any.
    #[inline]
    pub fn get(&self, id: VariableId) -> Option<&Variable> {
        self.tangents.get(&id)
    }

    /// Companion of `primal`, created zero-valued on first request.
    pub fn get_or_create(&mut self, primal: &VariableRef) -> Variable {
        if let Some(tau) = self.tangents.get(&primal.id()) {
            return tau.clone();
        }
        let tau = primal.tangent_linear();
        self.companions.insert(tau.id(), tau.clone());
        self.tangents.insert(primal.id(), tau.clone());
        tau
    }

    /// Companion whose own identity is `id`.
    #[inline]
    pub fn companion(&self, id: VariableId) -> Option<&Variable> {
        self.companions.get(&id)
    }

    /// Returns `true` if `id` has a companion.
    #[inline]
    pub fn contains(&self, id: VariableId) -> bool {
        self.tangents.contains_key(&id)
    }

    /// Number of companions.
    pub fn len(&self) -> usize {
        self.tangents.len()
    }

    /// Returns `true` if no companion exists.
    pub fn is_empty(&self) -> bool {
        self.tangents.is_empty()
    }

    /// Drops every companion.
    pub fn clear(&mut self) {
        self.tangents.clear();
        self.companions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_is_stable() {
        let x = Variable::new("x", 3);
        let mut map = TangentLinearMap::new();
        assert!(map.get(x.id()).is_none());

        let tau = map.get_or_create(&VariableRef::from(&x));
        let again = map.get_or_create(&VariableRef::from(&x));
        assert_eq!(tau.id(), again.id());
        assert_eq!(tau.len(), 3);
        assert!(map.contains(x.id()));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_companion_lookup_by_own_identity() {
        let x = Variable::new("x", 1);
        let mut map = TangentLinearMap::new();
        let tau = map.get_or_create(&VariableRef::from(&x));

        assert_eq!(map.companion(tau.id()).map(Variable::id), Some(tau.id()));
        // The primal identity is not a companion.
        assert!(map.companion(x.id()).is_none());
        // Nor is the companion a primal key.
        assert!(map.get(tau.id()).is_none());

        map.clear();
        assert!(map.companion(tau.id()).is_none());
    }
}
