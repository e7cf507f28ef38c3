//! The equation manager: annotation, checkpointed replay and
//! differentiation.
//!
//! An [`EquationManager`] records every equation solved through it into an
//! ordered list of blocks. Variables read by the trace are snapshotted on
//! first use, at block 0 and at the block boundaries chosen by the
//! [`CheckpointSchedule`]. Differentiation replays the trace from those
//! snapshots:
//!
//! - [`EquationManager::compute_gradient`] runs the reverse sweep driven by
//!   the schedule's [`Action`](adjoint_checkpoint::Action) stream
//! - [`EquationManager::compute_tangent_linear`] replays forward once,
//!   solving the tangent-linear equations alongside
//! - [`EquationManager::add_tlm`] registers directions solved online, while
//!   the forward model runs
//!
//! # Lifecycle
//!
//! ```text
//! stopped --start--> annotating --stop--> stopped
//!                        |
//!                    finalize / compute_gradient
//!                        v
//!                      final
//! ```

mod annotation;
mod replay;
mod reverse;
mod tangent;

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use adjoint_checkpoint::{
    CheckpointSchedule, MemorySchedule, Snapshot, StorageTier, TieredStorage,
};
use adjoint_core::{Equation, TangentLinearMap, Variable, VariableId};
use tracing::debug;

use crate::config::ManagerConfig;
use crate::error::{AdjointResult, AnnotationState, ManagerError};

pub use reverse::GradientCallback;

/// Snapshot under construction for the segment opened at a block boundary.
#[derive(Debug)]
struct Segment {
    snapshot: Snapshot,
    tier: StorageTier,
    seen: HashSet<VariableId>,
}

/// A registered tangent-linear direction.
#[derive(Debug)]
struct TangentDirection {
    m: Vec<VariableId>,
    dm: Vec<Variable>,
    map: TangentLinearMap,
}

/// Records equations and differentiates the recorded trace.
///
/// # Example
///
/// ```
/// use adjoint_core::{InnerProductSolver, LinearCombinationSolver, Variable};
/// use adjoint_engine::EquationManager;
///
/// let m = Variable::with_values("m", vec![1.0, 2.0]);
/// let u = Variable::new("u", 2);
/// let j = Variable::new("j", 1);
///
/// let mut manager = EquationManager::new();
/// manager.start().unwrap();
/// manager.solve(LinearCombinationSolver::scale(&u, 3.0, &m).unwrap()).unwrap();
/// manager.solve(InnerProductSolver::norm_sq(&j, &u).unwrap()).unwrap();
/// manager.stop();
///
/// // J = 9 |m|^2, dJ/dm = 18 m
/// let gradient = manager.compute_gradient(&[&j], &[&m]).unwrap();
/// assert_eq!(gradient[0][0].to_vec(), vec![18.0, 36.0]);
/// ```
#[derive(Debug)]
pub struct EquationManager {
    config: ManagerConfig,
    schedule: Box<dyn CheckpointSchedule>,
    storage: TieredStorage,
    state: AnnotationState,
    tlm_enabled: bool,
    blocks: Vec<Vec<Box<dyn Equation>>>,
    block_solutions: HashSet<VariableId>,
    origin: Snapshot,
    origin_seen: HashSet<VariableId>,
    segment: Option<Segment>,
    references: HashMap<VariableId, Variable>,
    data: BTreeMap<usize, Vec<Vec<Variable>>>,
    directions: Vec<TangentDirection>,
}

impl EquationManager {
    /// Creates a manager that keeps everything in memory.
    pub fn new() -> Self {
        Self::with_schedule(ManagerConfig::default(), Box::new(MemorySchedule::new()))
    }

    /// Creates a manager from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured schedule or fixed-point
    /// parameters are invalid.
    pub fn from_config(config: ManagerConfig) -> AdjointResult<Self> {
        config.validate()?;
        let schedule = config.schedule.build()?;
        Ok(Self::with_schedule(config, schedule))
    }

    /// Creates a manager driven by an explicit schedule. The schedule in
    /// `config` is ignored.
    pub fn with_schedule(config: ManagerConfig, schedule: Box<dyn CheckpointSchedule>) -> Self {
        let storage = config.build_storage(|tier| schedule.capacity(tier));
        Self {
            config,
            schedule,
            storage,
            state: AnnotationState::Stopped,
            tlm_enabled: false,
            blocks: vec![Vec::new()],
            block_solutions: HashSet::new(),
            origin: Snapshot::new(0),
            origin_seen: HashSet::new(),
            segment: None,
            references: HashMap::new(),
            data: BTreeMap::new(),
            directions: Vec::new(),
        }
    }

    /// Configuration in use.
    #[inline]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Checkpoint schedule in use.
    pub fn schedule(&self) -> &dyn CheckpointSchedule {
        self.schedule.as_ref()
    }

    /// Current annotation state.
    #[inline]
    pub fn state(&self) -> AnnotationState {
        self.state
    }

    /// Returns `true` while equations are being recorded.
    #[inline]
    pub fn annotation_enabled(&self) -> bool {
        self.state == AnnotationState::Annotating
    }

    /// Returns `true` while registered tangent-linear directions are solved
    /// alongside the forward model.
    #[inline]
    pub fn tlm_enabled(&self) -> bool {
        self.tlm_enabled
    }

    /// Starts annotation and tangent-linear propagation.
    ///
    /// # Errors
    ///
    /// [`ManagerError::InvalidTransition`] once the trace is final.
    pub fn start(&mut self) -> AdjointResult<()> {
        self.start_with(true, true)
    }

    /// Enables annotation and tangent-linear propagation independently.
    pub fn start_with(&mut self, annotate: bool, tlm: bool) -> AdjointResult<()> {
        if annotate {
            if self.state == AnnotationState::Final {
                return Err(ManagerError::InvalidTransition {
                    from: self.state,
                    to: AnnotationState::Annotating,
                }
                .into());
            }
            self.state = AnnotationState::Annotating;
        }
        self.tlm_enabled = tlm;
        Ok(())
    }

    /// Stops annotation and tangent-linear propagation.
    ///
    /// Returns the previous `(annotating, tlm)` flags.
    pub fn stop(&mut self) -> (bool, bool) {
        let previous = (self.annotation_enabled(), self.tlm_enabled);
        if self.state == AnnotationState::Annotating {
            self.state = AnnotationState::Stopped;
        }
        self.tlm_enabled = false;
        previous
    }

    /// Drops the trace, all snapshots and all tangent-linear directions.
    ///
    /// Recorded equations have their caches cleared first.
    pub fn reset(&mut self) {
        for eq in self.blocks.iter_mut().flatten() {
            eq.reset_forward_solve();
            eq.reset_adjoint_derivative_action();
            eq.reset_adjoint_jacobian_solve();
        }
        self.storage = self.config.build_storage(|tier| self.schedule.capacity(tier));
        self.state = AnnotationState::Stopped;
        self.tlm_enabled = false;
        self.blocks = vec![Vec::new()];
        self.block_solutions.clear();
        self.origin = Snapshot::new(0);
        self.origin_seen.clear();
        self.segment = None;
        self.references.clear();
        self.data.clear();
        self.directions.clear();
        debug!("Manager reset");
    }

    /// Number of blocks, counting the open one.
    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Equations recorded in `block`.
    pub fn block(&self, block: usize) -> Option<&[Box<dyn Equation>]> {
        self.blocks.get(block).map(Vec::as_slice)
    }

    /// Summary of the trace.
    pub fn info(&self) -> ManagerInfo {
        ManagerInfo {
            state: self.state,
            schedule: self.schedule.name(),
            blocks: self.blocks.len(),
            equations: self.blocks.iter().map(Vec::len).sum(),
            snapshots: self.storage.stored().len(),
            snapshot_values: self.origin.len(),
            retained_blocks: self.data.len(),
            tangent_directions: self.directions.len(),
        }
    }
}

impl Default for EquationManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary returned by [`EquationManager::info`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerInfo {
    /// Annotation state
    pub state: AnnotationState,
    /// Schedule name
    pub schedule: &'static str,
    /// Number of blocks
    pub blocks: usize,
    /// Number of recorded equations
    pub equations: usize,
    /// Snapshots held in storage, excluding block 0
    pub snapshots: usize,
    /// Variables in the block-0 snapshot
    pub snapshot_values: usize,
    /// Blocks with retained non-linear dependency data
    pub retained_blocks: usize,
    /// Registered tangent-linear directions
    pub tangent_directions: usize,
}

impl fmt::Display for ManagerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Equation manager ({}, {} schedule)", self.state, self.schedule)?;
        writeln!(f, "  blocks:           {}", self.blocks)?;
        writeln!(f, "  equations:        {}", self.equations)?;
        writeln!(f, "  snapshots:        {}", self.snapshots)?;
        writeln!(f, "  block 0 values:   {}", self.snapshot_values)?;
        writeln!(f, "  retained blocks:  {}", self.retained_blocks)?;
        write!(f, "  tlm directions:   {}", self.tangent_directions)
    }
}

thread_local! {
    static DEFAULT_MANAGER: RefCell<EquationManager> = RefCell::new(EquationManager::new());
}

/// Runs `f` with this thread's default manager.
///
/// # Panics
///
/// Panics if called re-entrantly from inside `f`.
///
/// # Example
///
/// ```
/// use adjoint_engine::with_default_manager;
///
/// with_default_manager(|manager| manager.reset());
/// let blocks = with_default_manager(|manager| manager.block_count());
/// assert_eq!(blocks, 1);
/// ```
pub fn with_default_manager<R>(f: impl FnOnce(&mut EquationManager) -> R) -> R {
    DEFAULT_MANAGER.with(|manager| f(&mut manager.borrow_mut()))
}
