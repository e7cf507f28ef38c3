//! Live handles and identity-only placeholders.
//!
//! Equations refer to their variables through [`VariableRef`]. Once an
//! equation is replaced, every reference becomes a [`Replacement`] carrying
//! only identity, name, length and flags. The transition is one-way.

use crate::error::{EquationError, EquationResult};
use crate::variable::{Variable, VariableFlags, VariableId};

/// Identity-only stand-in for a variable whose payload has been released.
#[derive(Clone, Debug, PartialEq)]
pub struct Replacement {
    id: VariableId,
    name: String,
    len: usize,
    flags: VariableFlags,
}

impl Replacement {
    /// Captures the identity of `variable`.
    pub fn of(variable: &Variable) -> Self {
        Self {
            id: variable.id(),
            name: variable.name().to_string(),
            len: variable.len(),
            flags: variable.flags(),
        }
    }
}

/// Reference held by an equation: either a live handle or a placeholder.
#[derive(Clone, Debug)]
pub enum VariableRef {
    /// Live handle onto the variable.
    Live(Variable),
    /// Placeholder left after replacement.
    Replaced(Replacement),
}

impl VariableRef {
    /// Returns the identity.
    #[inline]
    pub fn id(&self) -> VariableId {
        match self {
            VariableRef::Live(v) => v.id(),
            VariableRef::Replaced(r) => r.id,
        }
    }

    /// Returns the name.
    pub fn name(&self) -> &str {
        match self {
            VariableRef::Live(v) => v.name(),
            VariableRef::Replaced(r) => &r.name,
        }
    }

    /// Returns the number of components.
    pub fn len(&self) -> usize {
        match self {
            VariableRef::Live(v) => v.len(),
            VariableRef::Replaced(r) => r.len,
        }
    }

    /// Returns `true` if the referenced variable has no components.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the flags.
    pub fn flags(&self) -> VariableFlags {
        match self {
            VariableRef::Live(v) => v.flags(),
            VariableRef::Replaced(r) => r.flags,
        }
    }

    /// Returns `true` once the reference has been replaced.
    #[inline]
    pub fn is_replaced(&self) -> bool {
        matches!(self, VariableRef::Replaced(_))
    }

    /// Returns the live handle, if still held.
    pub fn as_live(&self) -> Option<&Variable> {
        match self {
            VariableRef::Live(v) => Some(v),
            VariableRef::Replaced(_) => None,
        }
    }

    /// Returns the live handle or an error naming `operation`.
    pub fn live(&self, operation: &'static str) -> EquationResult<&Variable> {
        self.as_live()
            .ok_or(EquationError::Replaced { operation })
    }

    /// Swaps a live handle for its placeholder.
    pub fn replace(&mut self) {
        if let VariableRef::Live(v) = self {
            *self = VariableRef::Replaced(Replacement::of(v));
        }
    }

    /// Creates a zero-valued variable shaped like the referenced one.
    pub fn new_like(&self) -> Variable {
        Variable::new(self.name(), self.len())
    }

    /// Creates the zero-valued tangent-linear companion.
    pub fn tangent_linear(&self) -> Variable {
        Variable::new(format!("tlm_{}", self.name()), self.len())
    }
}

impl From<&Variable> for VariableRef {
    fn from(variable: &Variable) -> Self {
        VariableRef::Live(variable.clone())
    }
}

impl From<Variable> for VariableRef {
    fn from(variable: Variable) -> Self {
        VariableRef::Live(variable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_keeps_identity() {
        let x = Variable::with_values("x", vec![1.0, 2.0, 3.0]);
        let mut r = VariableRef::from(&x);
        assert!(!r.is_replaced());

        r.replace();
        assert!(r.is_replaced());
        assert_eq!(r.id(), x.id());
        assert_eq!(r.name(), "x");
        assert_eq!(r.len(), 3);
        assert!(r.as_live().is_none());
        assert!(matches!(
            r.live("forward_solve"),
            Err(EquationError::Replaced { .. })
        ));
    }

    #[test]
    fn test_replace_is_idempotent() {
        let x = Variable::new("x", 1);
        let mut r = VariableRef::from(x);
        r.replace();
        r.replace();
        assert!(r.is_replaced());
    }

    #[test]
    fn test_replacement_tangent_shape() {
        let x = Variable::new("u", 4);
        let mut r = VariableRef::from(&x);
        r.replace();
        let tau = r.tangent_linear();
        assert_eq!(tau.len(), 4);
        assert_eq!(tau.name(), "tlm_u");
    }
}
