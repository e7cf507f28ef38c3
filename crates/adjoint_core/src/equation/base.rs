//! Shared bookkeeping for every equation: solutions, dependencies,
//! non-linear dependencies and initial-condition flags.

use std::collections::{HashMap, HashSet};

use super::tangent::TangentLinearMap;
use crate::error::{EquationError, EquationResult};
use crate::reference::VariableRef;
use crate::variable::{Variable, VariableId};

/// De-duplicating dependency list used while building composite equations.
#[derive(Clone, Debug, Default)]
pub struct DependencyList {
    deps: Vec<VariableRef>,
    index: HashMap<VariableId, usize>,
}

impl DependencyList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `dep` unless already present; returns its index.
    pub fn push(&mut self, dep: VariableRef) -> usize {
        if let Some(&i) = self.index.get(&dep.id()) {
            return i;
        }
        let i = self.deps.len();
        self.index.insert(dep.id(), i);
        self.deps.push(dep);
        i
    }

    /// Index of `id`, if present.
    pub fn position(&self, id: VariableId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.deps.len()
    }

    /// Returns `true` if empty.
    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }

    /// Consumes the list.
    pub fn into_vec(self) -> Vec<VariableRef> {
        self.deps
    }
}

/// Solutions, dependencies and derived index maps of an equation.
///
/// Solutions are stored as indices into `deps`, so an equation holds each
/// variable reference exactly once. Replacement swaps every reference for
/// a placeholder at once.
#[derive(Clone, Debug)]
pub struct EquationCore {
    deps: Vec<VariableRef>,
    x_indices: Vec<usize>,
    nl_deps_map: Vec<usize>,
    checkpoint_ic: Vec<bool>,
    replaced: bool,
}

impl EquationCore {
    /// Validates and builds the bookkeeping for an equation.
    ///
    /// # Arguments
    ///
    /// * `x` - Solution references, in order
    /// * `deps` - All dependencies; must contain every solution
    /// * `nl_deps` - Non-linear dependencies; `None` means all of `deps`
    ///
    /// # Errors
    ///
    /// Definition errors for duplicate dependencies, static or
    /// non-checkpointed solutions, solutions missing from `deps` and
    /// non-linear dependencies missing from `deps`.
    pub fn new(
        x: &[VariableRef],
        deps: Vec<VariableRef>,
        nl_deps: Option<&[VariableRef]>,
    ) -> EquationResult<Self> {
        let mut index = HashMap::with_capacity(deps.len());
        for (i, dep) in deps.iter().enumerate() {
            if index.insert(dep.id(), i).is_some() {
                return Err(EquationError::DuplicateDependency {
                    name: dep.name().to_string(),
                    id: dep.id(),
                });
            }
        }

        let mut x_indices = Vec::with_capacity(x.len());
        let mut seen = HashSet::with_capacity(x.len());
        for xi in x {
            if xi.flags().is_static {
                return Err(EquationError::StaticSolution {
                    name: xi.name().to_string(),
                });
            }
            if !xi.flags().checkpointed {
                return Err(EquationError::NonCheckpointedSolution {
                    name: xi.name().to_string(),
                });
            }
            if !seen.insert(xi.id()) {
                return Err(EquationError::DuplicateSolution {
                    name: xi.name().to_string(),
                });
            }
            let j = index
                .get(&xi.id())
                .copied()
                .ok_or_else(|| EquationError::SolutionNotDependency {
                    name: xi.name().to_string(),
                })?;
            x_indices.push(j);
        }

        let nl_deps_map = match nl_deps {
            None => (0..deps.len()).collect(),
            Some(nl) => {
                let mut map = Vec::with_capacity(nl.len());
                let mut nl_seen = HashSet::with_capacity(nl.len());
                for dep in nl {
                    if !nl_seen.insert(dep.id()) {
                        return Err(EquationError::DuplicateDependency {
                            name: dep.name().to_string(),
                            id: dep.id(),
                        });
                    }
                    let j = index.get(&dep.id()).copied().ok_or_else(|| {
                        EquationError::NonLinearDependencyNotInDeps {
                            name: dep.name().to_string(),
                        }
                    })?;
                    map.push(j);
                }
                map
            }
        };

        let nl_set: HashSet<usize> = nl_deps_map.iter().copied().collect();
        let checkpoint_ic = x_indices.iter().map(|j| !nl_set.contains(j)).collect();

        Ok(Self {
            deps,
            x_indices,
            nl_deps_map,
            checkpoint_ic,
            replaced: false,
        })
    }

    /// Overrides the per-solution initial-condition flags.
    pub fn with_initial_conditions(mut self, checkpoint_ic: Vec<bool>) -> EquationResult<Self> {
        if checkpoint_ic.len() != self.x_indices.len() {
            return Err(EquationError::DimensionMismatch {
                expected: self.x_indices.len(),
                found: checkpoint_ic.len(),
            });
        }
        self.checkpoint_ic = checkpoint_ic;
        Ok(self)
    }

    /// All dependencies.
    #[inline]
    pub fn deps(&self) -> &[VariableRef] {
        &self.deps
    }

    /// Solution references, in order.
    pub fn x(&self) -> impl Iterator<Item = &VariableRef> + '_ {
        self.x_indices.iter().map(move |&j| &self.deps[j])
    }

    /// Solution identities, in order.
    pub fn x_ids(&self) -> Vec<VariableId> {
        self.x().map(VariableRef::id).collect()
    }

    /// Positions of the solutions within `deps`.
    #[inline]
    pub fn x_indices(&self) -> &[usize] {
        &self.x_indices
    }

    /// Number of solution variables.
    #[inline]
    pub fn solution_count(&self) -> usize {
        self.x_indices.len()
    }

    /// Positions of the non-linear dependencies within `deps`.
    #[inline]
    pub fn nl_deps_map(&self) -> &[usize] {
        &self.nl_deps_map
    }

    /// Non-linear dependency references, in order.
    pub fn nl_deps(&self) -> impl Iterator<Item = &VariableRef> + '_ {
        self.nl_deps_map.iter().map(move |&j| &self.deps[j])
    }

    /// Position of dependency `dep_index` in the non-linear list.
    pub fn nl_position(&self, dep_index: usize) -> Option<usize> {
        self.nl_deps_map.iter().position(|&j| j == dep_index)
    }

    /// Initial-condition flags, one per solution.
    #[inline]
    pub fn checkpoint_ic(&self) -> &[bool] {
        &self.checkpoint_ic
    }

    /// Index of dependency `id`.
    pub fn dep_index(&self, id: VariableId) -> Option<usize> {
        self.deps.iter().position(|d| d.id() == id)
    }

    /// Returns `true` if `dep_index` refers to a solution.
    pub fn is_solution_index(&self, dep_index: usize) -> bool {
        self.x_indices.contains(&dep_index)
    }

    /// Returns `true` once references have been replaced.
    #[inline]
    pub fn is_replaced(&self) -> bool {
        self.replaced
    }

    /// Swaps every reference for a placeholder.
    pub fn replace(&mut self) {
        self.deps.iter_mut().for_each(VariableRef::replace);
        self.replaced = true;
    }

    /// Live dependency handles.
    pub fn live_deps(&self) -> EquationResult<Vec<Variable>> {
        self.deps
            .iter()
            .map(|d| d.live("forward_solve").cloned())
            .collect()
    }

    /// Live solution handles.
    pub fn live_x(&self) -> EquationResult<Vec<Variable>> {
        self.x().map(|d| d.live("forward_solve").cloned()).collect()
    }

    /// Live non-linear dependency handles.
    pub fn live_nl_deps(&self) -> EquationResult<Vec<Variable>> {
        self.nl_deps()
            .map(|d| d.live("adjoint_derivative_action").cloned())
            .collect()
    }

    /// Returns `deps` if supplied, otherwise the live handles.
    pub fn resolve_deps(&self, deps: Option<&[Variable]>) -> EquationResult<Vec<Variable>> {
        match deps {
            Some(d) => {
                if d.len() != self.deps.len() {
                    return Err(EquationError::DimensionMismatch {
                        expected: self.deps.len(),
                        found: d.len(),
                    });
                }
                Ok(d.to_vec())
            }
            None => self.live_deps(),
        }
    }

    /// Fails if any solution is among the parameters `m`.
    pub fn check_tangent_parameters(&self, m: &[VariableId]) -> EquationResult<()> {
        match self.x().find(|x| m.contains(&x.id())) {
            Some(x) => Err(EquationError::InvalidTangentLinearParameter {
                name: x.name().to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Tangent-linear companion of dependency `dep_index`: the direction if
    /// it is a parameter, otherwise its entry in `tlm_map`.
    pub fn tangent_of(
        &self,
        dep_index: usize,
        m: &[VariableId],
        dm: &[Variable],
        tlm_map: &TangentLinearMap,
    ) -> Option<Variable> {
        let id = self.deps.get(dep_index)?.id();
        match m.iter().position(|&mi| mi == id) {
            Some(i) => dm.get(i).cloned(),
            None => tlm_map.get(id).cloned(),
        }
    }
}

/// Returns the single solution handle of `x`.
pub(crate) fn single(x: &[Variable]) -> EquationResult<&Variable> {
    match x {
        [only] => Ok(only),
        _ => Err(EquationError::DimensionMismatch {
            expected: 1,
            found: x.len(),
        }),
    }
}

/// Returns `deps[index]` or a range error.
pub(crate) fn dep_at(deps: &[Variable], index: usize) -> EquationResult<&Variable> {
    deps.get(index).ok_or(EquationError::DependencyIndex {
        index,
        count: deps.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::VariableFlags;

    fn refs(vars: &[&Variable]) -> Vec<VariableRef> {
        vars.iter().map(|v| VariableRef::from(*v)).collect()
    }

    // ========================================
    // Validation
    // ========================================

    #[test]
    fn test_duplicate_dependency_rejected() {
        let x = Variable::new("x", 1);
        let y = Variable::new("y", 1);
        let result = EquationCore::new(&refs(&[&x]), refs(&[&x, &y, &y]), None);
        assert!(matches!(
            result,
            Err(EquationError::DuplicateDependency { .. })
        ));
    }

    #[test]
    fn test_solution_must_be_dependency() {
        let x = Variable::new("x", 1);
        let y = Variable::new("y", 1);
        let result = EquationCore::new(&refs(&[&x]), refs(&[&y]), None);
        assert!(matches!(
            result,
            Err(EquationError::SolutionNotDependency { .. })
        ));
    }

    #[test]
    fn test_static_solution_rejected() {
        let c = Variable::new_static("c", vec![1.0]);
        let result = EquationCore::new(&refs(&[&c]), refs(&[&c]), None);
        assert!(matches!(result, Err(EquationError::StaticSolution { .. })));
    }

    #[test]
    fn test_non_checkpointed_solution_rejected() {
        let flags = VariableFlags::dynamic().with_checkpointed(false);
        let x = Variable::with_flags("x", vec![0.0], flags);
        let m = Variable::scalar("m", 1.0);
        let result = EquationCore::new(&refs(&[&x]), refs(&[&x, &m]), None);
        assert!(matches!(
            result,
            Err(EquationError::NonCheckpointedSolution { .. })
        ));

        // Still usable as a dependency.
        let y = Variable::new("y", 1);
        assert!(EquationCore::new(&refs(&[&y]), refs(&[&y, &x]), None).is_ok());
    }

    #[test]
    fn test_nl_deps_must_be_subset() {
        let x = Variable::new("x", 1);
        let z = Variable::new("z", 1);
        let result = EquationCore::new(&refs(&[&x]), refs(&[&x]), Some(&refs(&[&z])));
        assert!(matches!(
            result,
            Err(EquationError::NonLinearDependencyNotInDeps { .. })
        ));
    }

    // ========================================
    // Derived maps
    // ========================================

    #[test]
    fn test_checkpoint_ic_defaults() {
        let x = Variable::new("x", 1);
        let y = Variable::new("y", 1);

        let linear = EquationCore::new(&refs(&[&x]), refs(&[&x, &y]), Some(&[])).unwrap();
        assert_eq!(linear.checkpoint_ic(), &[true]);
        assert!(linear.nl_deps_map().is_empty());

        let nonlinear = EquationCore::new(&refs(&[&x]), refs(&[&x, &y]), None).unwrap();
        assert_eq!(nonlinear.checkpoint_ic(), &[false]);
        assert_eq!(nonlinear.nl_deps_map(), &[0, 1]);
    }

    #[test]
    fn test_nl_position() {
        let x = Variable::new("x", 1);
        let y = Variable::new("y", 1);
        let z = Variable::new("z", 1);
        let core =
            EquationCore::new(&refs(&[&x]), refs(&[&x, &y, &z]), Some(&refs(&[&z]))).unwrap();
        assert_eq!(core.nl_position(2), Some(0));
        assert_eq!(core.nl_position(1), None);
    }

    #[test]
    fn test_replace_and_resolve() {
        let x = Variable::new("x", 1);
        let y = Variable::new("y", 1);
        let mut core = EquationCore::new(&refs(&[&x]), refs(&[&x, &y]), None).unwrap();
        assert_eq!(core.live_deps().unwrap().len(), 2);

        core.replace();
        assert!(core.is_replaced());
        assert!(core.resolve_deps(None).is_err());
        let explicit = vec![x.copy(), y.copy()];
        assert_eq!(core.resolve_deps(Some(&explicit)).unwrap().len(), 2);
        assert_eq!(core.x_ids(), vec![x.id()]);
    }

    #[test]
    fn test_tangent_parameters() {
        let x = Variable::new("x", 1);
        let y = Variable::new("y", 1);
        let dy = Variable::new("dy", 1);
        let core = EquationCore::new(&refs(&[&x]), refs(&[&x, &y]), None).unwrap();

        assert!(core.check_tangent_parameters(&[x.id()]).is_err());
        assert!(core.check_tangent_parameters(&[y.id()]).is_ok());

        let map = TangentLinearMap::new();
        let tau = core.tangent_of(1, &[y.id()], std::slice::from_ref(&dy), &map);
        assert_eq!(tau.map(|v| v.id()), Some(dy.id()));
        assert!(core.tangent_of(1, &[], &[], &map).is_none());
    }

    #[test]
    fn test_dependency_list_dedup() {
        let a = Variable::new("a", 1);
        let b = Variable::new("b", 1);
        let mut list = DependencyList::new();
        assert_eq!(list.push(VariableRef::from(&a)), 0);
        assert_eq!(list.push(VariableRef::from(&b)), 1);
        assert_eq!(list.push(VariableRef::from(&a)), 0);
        assert_eq!(list.len(), 2);
        assert_eq!(list.position(b.id()), Some(1));
    }
}
