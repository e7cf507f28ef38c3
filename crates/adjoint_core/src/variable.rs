//! Mutable numeric state with identity and a mutation counter.
//!
//! A [`Variable`] is a cheap-to-clone handle onto a dense `f64` payload.
//! Clones share the payload and the identity; every in-place mutation
//! increments the variable's `state`, which caches use to detect stale
//! entries.

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{EquationError, EquationResult};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`Variable`].
///
/// Identities are never reused, so a placeholder left behind by a
/// replaced equation still compares equal to the variable it stood for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariableId(u64);

impl VariableId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Reconstructs an identity from its raw representation.
    ///
    /// Used when reading checkpoint data back from slow storage.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw integer representation.
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for VariableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Independent flags controlling how a variable is treated by the engine.
///
/// # Examples
///
/// ```
/// use adjoint_core::VariableFlags;
///
/// let flags = VariableFlags::constant();
/// assert!(flags.is_static);
/// assert!(flags.cached);
/// assert!(!flags.checkpointed);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VariableFlags {
    /// Value never changes after creation; never legally a solution.
    pub is_static: bool,
    /// Operators depending only on this variable may be cached.
    pub cached: bool,
    /// May be stored in and restored from a checkpoint.
    pub checkpointed: bool,
}

impl VariableFlags {
    /// Flags for ordinary mutable state.
    pub const fn dynamic() -> Self {
        Self {
            is_static: false,
            cached: false,
            checkpointed: true,
        }
    }

    /// Flags for a static variable: cached and never checkpointed.
    pub const fn constant() -> Self {
        Self {
            is_static: true,
            cached: true,
            checkpointed: false,
        }
    }

    /// Overrides the `cached` flag.
    #[inline]
    pub const fn with_cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }

    /// Overrides the `checkpointed` flag.
    #[inline]
    pub const fn with_checkpointed(mut self, checkpointed: bool) -> Self {
        self.checkpointed = checkpointed;
        self
    }
}

impl Default for VariableFlags {
    fn default() -> Self {
        Self::dynamic()
    }
}

struct VariableInner {
    id: VariableId,
    name: String,
    flags: VariableFlags,
    values: RefCell<Vec<f64>>,
    state: Cell<u64>,
}

/// Shared handle onto mutable numeric state.
///
/// # Examples
///
/// ```
/// use adjoint_core::Variable;
///
/// let x = Variable::with_values("x", vec![1.0, 2.0]);
/// let alias = x.clone();
/// alias.scale(2.0);
///
/// assert_eq!(x.to_vec(), vec![2.0, 4.0]);
/// assert_eq!(x.state(), 1);
/// assert_eq!(x.id(), alias.id());
/// ```
#[derive(Clone)]
pub struct Variable {
    inner: Rc<VariableInner>,
}

impl Variable {
    /// Creates a zero-valued variable of length `len`.
    pub fn new(name: impl Into<String>, len: usize) -> Self {
        Self::with_flags(name, vec![0.0; len], VariableFlags::dynamic())
    }

    /// Creates a variable holding `values`.
    pub fn with_values(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::with_flags(name, values, VariableFlags::dynamic())
    }

    /// Creates a length-one variable holding `value`.
    pub fn scalar(name: impl Into<String>, value: f64) -> Self {
        Self::with_values(name, vec![value])
    }

    /// Creates a static variable holding `values`.
    pub fn new_static(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::with_flags(name, values, VariableFlags::constant())
    }

    /// Creates a variable with explicit flags.
    pub fn with_flags(name: impl Into<String>, values: Vec<f64>, flags: VariableFlags) -> Self {
        Self {
            inner: Rc::new(VariableInner {
                id: VariableId::next(),
                name: name.into(),
                flags,
                values: RefCell::new(values),
                state: Cell::new(0),
            }),
        }
    }

    /// Returns the identity.
    #[inline]
    pub fn id(&self) -> VariableId {
        self.inner.id
    }

    /// Returns the name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the flags.
    #[inline]
    pub fn flags(&self) -> VariableFlags {
        self.inner.flags
    }

    /// Returns `true` for static variables.
    #[inline]
    pub fn is_static(&self) -> bool {
        self.inner.flags.is_static
    }

    /// Returns `true` if operators depending on this variable may be cached.
    #[inline]
    pub fn is_cached(&self) -> bool {
        self.inner.flags.cached
    }

    /// Returns `true` if this variable may be checkpointed.
    #[inline]
    pub fn is_checkpointed(&self) -> bool {
        self.inner.flags.checkpointed
    }

    /// Returns the mutation counter.
    #[inline]
    pub fn state(&self) -> u64 {
        self.inner.state.get()
    }

    /// Returns the number of components.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.values.borrow().len()
    }

    /// Returns `true` if the payload has no components.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `other` is a handle onto the same variable.
    #[inline]
    pub fn same(&self, other: &Variable) -> bool {
        self.id() == other.id()
    }

    /// Borrows the payload.
    pub fn values(&self) -> Ref<'_, [f64]> {
        Ref::map(self.inner.values.borrow(), |v| v.as_slice())
    }

    /// Copies the payload out.
    pub fn to_vec(&self) -> Vec<f64> {
        self.inner.values.borrow().clone()
    }

    /// Returns the first component, or zero for an empty payload.
    pub fn value(&self) -> f64 {
        self.inner.values.borrow().first().copied().unwrap_or(0.0)
    }

    /// Creates a zero-valued dynamic variable of the same length and name.
    pub fn new_like(&self) -> Variable {
        Variable::new(self.name(), self.len())
    }

    /// Creates a dynamic variable with a copy of this payload.
    pub fn copy(&self) -> Variable {
        Variable::with_values(self.name(), self.to_vec())
    }

    /// Creates the zero-valued tangent-linear companion of this variable.
    pub fn tangent_linear(&self) -> Variable {
        Variable::new(format!("tlm_{}", self.name()), self.len())
    }

    fn bump(&self) {
        self.inner.state.set(self.inner.state.get() + 1);
    }

    fn check_len(&self, other: &Variable) -> EquationResult<()> {
        let (expected, found) = (self.len(), other.len());
        if expected != found {
            return Err(EquationError::DimensionMismatch { expected, found });
        }
        Ok(())
    }

    /// Sets every component to zero.
    pub fn zero(&self) {
        self.inner.values.borrow_mut().iter_mut().for_each(|v| *v = 0.0);
        self.bump();
    }

    /// Multiplies every component by `alpha`.
    pub fn scale(&self, alpha: f64) {
        self.inner
            .values
            .borrow_mut()
            .iter_mut()
            .for_each(|v| *v *= alpha);
        self.bump();
    }

    /// Copies the payload of `other` into this variable.
    pub fn assign(&self, other: &Variable) -> EquationResult<()> {
        self.check_len(other)?;
        if !self.same(other) {
            let source = other.values();
            self.inner.values.borrow_mut().copy_from_slice(&source);
        }
        self.bump();
        Ok(())
    }

    /// Adds `alpha * other` to this variable.
    pub fn axpy(&self, alpha: f64, other: &Variable) -> EquationResult<()> {
        self.check_len(other)?;
        if self.same(other) {
            self.inner
                .values
                .borrow_mut()
                .iter_mut()
                .for_each(|v| *v += alpha * *v);
        } else {
            let source = other.values();
            let mut target = self.inner.values.borrow_mut();
            for (t, s) in target.iter_mut().zip(source.iter()) {
                *t += alpha * s;
            }
        }
        self.bump();
        Ok(())
    }

    /// Overwrites the payload with `values`.
    pub fn set_values(&self, values: &[f64]) -> EquationResult<()> {
        let expected = self.len();
        if values.len() != expected {
            return Err(EquationError::DimensionMismatch {
                expected,
                found: values.len(),
            });
        }
        self.inner.values.borrow_mut().copy_from_slice(values);
        self.bump();
        Ok(())
    }

    /// Applies `f` to the payload in place and records the mutation.
    pub fn modify<R>(&self, f: impl FnOnce(&mut [f64]) -> R) -> R {
        let result = f(self.inner.values.borrow_mut().as_mut_slice());
        self.bump();
        result
    }

    /// Returns the Euclidean inner product with `other`.
    pub fn inner(&self, other: &Variable) -> EquationResult<f64> {
        self.check_len(other)?;
        let (a, b) = (self.values(), other.values());
        Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
    }

    /// Returns the sum of all components.
    pub fn sum(&self) -> f64 {
        self.values().iter().sum()
    }

    /// Returns the squared Euclidean norm.
    pub fn norm_sq(&self) -> f64 {
        self.values().iter().map(|v| v * v).sum()
    }

    /// Returns the maximum absolute component.
    pub fn linf_norm(&self) -> f64 {
        self.values().iter().fold(0.0_f64, |m, v| m.max(v.abs()))
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Variable")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("len", &self.len())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // ========================================
    // Identity and flags
    // ========================================

    #[test]
    fn test_ids_are_unique() {
        let a = Variable::new("a", 2);
        let b = Variable::new("a", 2);
        assert_ne!(a.id(), b.id());
        assert!(a.same(&a.clone()));
        assert!(!a.same(&b));
    }

    #[test]
    fn test_default_flags() {
        let x = Variable::new("x", 1);
        assert!(!x.is_static());
        assert!(!x.is_cached());
        assert!(x.is_checkpointed());

        let c = Variable::new_static("c", vec![1.0]);
        assert!(c.is_static());
        assert!(c.is_cached());
        assert!(!c.is_checkpointed());
    }

    #[test]
    fn test_flag_overrides() {
        let flags = VariableFlags::dynamic().with_cached(true);
        let x = Variable::with_flags("x", vec![0.0], flags);
        assert!(x.is_cached());
        assert!(x.is_checkpointed());
    }

    // ========================================
    // Mutation counter
    // ========================================

    #[test]
    fn test_every_mutation_bumps_state() {
        let x = Variable::with_values("x", vec![1.0, 2.0]);
        let y = Variable::with_values("y", vec![3.0, 4.0]);
        assert_eq!(x.state(), 0);

        x.zero();
        x.assign(&y).unwrap();
        x.axpy(2.0, &y).unwrap();
        x.scale(0.5);
        x.set_values(&[1.0, 1.0]).unwrap();
        x.modify(|v| v[0] = 5.0);

        assert_eq!(x.state(), 6);
        assert_eq!(y.state(), 0);
    }

    #[test]
    fn test_reads_do_not_bump_state() {
        let x = Variable::with_values("x", vec![1.0, -3.0]);
        let _ = x.sum();
        let _ = x.norm_sq();
        let _ = x.linf_norm();
        let _ = x.to_vec();
        assert_eq!(x.state(), 0);
    }

    // ========================================
    // Arithmetic
    // ========================================

    #[test]
    fn test_axpy_and_inner() {
        let x = Variable::with_values("x", vec![1.0, 2.0, 3.0]);
        let y = Variable::with_values("y", vec![1.0, 1.0, 1.0]);
        x.axpy(-1.0, &y).unwrap();
        assert_eq!(x.to_vec(), vec![0.0, 1.0, 2.0]);
        assert_relative_eq!(x.inner(&y).unwrap(), 3.0);
        assert_relative_eq!(x.norm_sq(), 5.0);
        assert_relative_eq!(x.linf_norm(), 2.0);
    }

    #[test]
    fn test_self_aliasing_operations() {
        let x = Variable::with_values("x", vec![1.0, 2.0]);
        x.axpy(1.0, &x.clone()).unwrap();
        assert_eq!(x.to_vec(), vec![2.0, 4.0]);
        x.assign(&x.clone()).unwrap();
        assert_eq!(x.to_vec(), vec![2.0, 4.0]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let x = Variable::new("x", 2);
        let y = Variable::new("y", 3);
        assert!(matches!(
            x.assign(&y),
            Err(EquationError::DimensionMismatch {
                expected: 2,
                found: 3
            })
        ));
        assert!(x.set_values(&[1.0]).is_err());
    }

    #[test]
    fn test_copy_is_independent() {
        let x = Variable::with_values("x", vec![1.0]);
        let c = x.copy();
        c.scale(3.0);
        assert_eq!(x.value(), 1.0);
        assert_eq!(c.value(), 3.0);
        assert_ne!(x.id(), c.id());
    }

    #[test]
    fn test_tangent_linear_companion() {
        let x = Variable::with_values("u", vec![1.0, 2.0]);
        let tau = x.tangent_linear();
        assert_eq!(tau.name(), "tlm_u");
        assert_eq!(tau.to_vec(), vec![0.0, 0.0]);
    }
}
