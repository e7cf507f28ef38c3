//! Recording equations into blocks.

use std::collections::HashSet;

use adjoint_checkpoint::{Action, CheckpointError, Snapshot, StorageTier};
use adjoint_core::{Equation, NullSolver, Variable, VariableRef};
use tracing::debug;

use super::{EquationManager, Segment};
use crate::error::{AdjointResult, AnnotationState, ManagerError};

impl EquationManager {
    /// Solves `eq`, recording it when annotating and solving its
    /// tangent-linear equations when tangent-linear propagation is on.
    ///
    /// # Errors
    ///
    /// - [`ManagerError::DuplicateSolve`] if a solution of `eq` was already
    ///   solved in the current block; raised before the forward solve
    /// - [`CheckpointError::BlockCountExceeded`] if the schedule supports
    ///   fewer blocks
    /// - Any error from the forward solve
    pub fn solve<E: Equation + 'static>(&mut self, eq: E) -> AdjointResult<()> {
        self.solve_boxed(Box::new(eq))
    }

    /// Boxed form of [`solve`](Self::solve).
    pub fn solve_boxed(&mut self, eq: Box<dyn Equation>) -> AdjointResult<()> {
        self.process(eq, true)
    }

    /// Records `eq`, whose solutions have already been computed.
    ///
    /// Initial conditions are read from the current solution values, so
    /// equations that read their own solutions must go through
    /// [`solve`](Self::solve) instead.
    ///
    /// # Errors
    ///
    /// [`ManagerError::NotAnnotating`] when not annotating, and the
    /// duplicate-solve and block-count errors of [`solve`](Self::solve).
    pub fn add_equation(&mut self, eq: Box<dyn Equation>) -> AdjointResult<()> {
        if !self.annotation_enabled() {
            return Err(ManagerError::NotAnnotating { kind: eq.kind() }.into());
        }
        self.pre_annotate(eq.as_ref())?;
        self.record(eq)
    }

    pub(super) fn process(&mut self, mut eq: Box<dyn Equation>, derive: bool) -> AdjointResult<()> {
        let annotate = self.annotation_enabled();
        if annotate {
            self.pre_annotate(eq.as_ref())?;
        }
        eq.solve_in_place()?;

        let tangents = if derive && self.tlm_enabled {
            self.derive_tangents(eq.as_ref())?
        } else {
            Vec::new()
        };
        if annotate {
            self.record(eq)?;
        }
        for tangent in tangents {
            self.process(tangent, false)?;
        }
        Ok(())
    }

    /// Tangent-linear equations of `eq` for every registered direction.
    fn derive_tangents(&mut self, eq: &dyn Equation) -> AdjointResult<Vec<Box<dyn Equation>>> {
        let mut tangents = Vec::new();
        for direction in &mut self.directions {
            match eq.tangent_linear(&direction.m, &direction.dm, &mut direction.map)? {
                Some(tangent) => tangents.push(tangent),
                None => {
                    // Overwritten without reaching the direction: stale
                    // companions must be zeroed.
                    let stale: Vec<Variable> = eq
                        .core()
                        .x()
                        .filter_map(|x| direction.map.get(x.id()).cloned())
                        .collect();
                    if !stale.is_empty() {
                        tangents.push(Box::new(NullSolver::for_many(&stale)?));
                    }
                }
            }
        }
        Ok(tangents)
    }

    /// Duplicate and block-count checks, then initial-condition snapshots.
    fn pre_annotate(&mut self, eq: &dyn Equation) -> AdjointResult<()> {
        let block = self.blocks.len() - 1;
        if let Some(max) = self.schedule.max_blocks() {
            if block >= max {
                return Err(CheckpointError::BlockCountExceeded { block, max }.into());
            }
        }
        let core = eq.core();
        if let Some(x) = core.x().find(|x| self.block_solutions.contains(&x.id())) {
            return Err(ManagerError::DuplicateSolve {
                name: x.name().to_string(),
                block,
            }
            .into());
        }
        for (x, &ic) in core.x().zip(core.checkpoint_ic()) {
            if ic {
                self.capture(x)?;
            }
        }
        Ok(())
    }

    /// Appends a solved equation to the open block.
    fn record(&mut self, eq: Box<dyn Equation>) -> AdjointResult<()> {
        let block = self.blocks.len() - 1;
        let core = eq.core();
        for (j, dep) in core.deps().iter().enumerate() {
            if !core.is_solution_index(j) {
                self.capture(dep)?;
            }
        }
        for x in core.x() {
            self.origin_seen.insert(x.id());
            if let Some(segment) = &mut self.segment {
                segment.seen.insert(x.id());
            }
            self.block_solutions.insert(x.id());
        }
        if self.schedule.retains_annotation_data() {
            let nl: Vec<Variable> = core.live_nl_deps()?.iter().map(Variable::copy).collect();
            self.data.entry(block).or_default().push(nl);
        }
        self.blocks[block].push(eq);
        Ok(())
    }

    /// Snapshots `dep` on its first read since block 0 and since the open
    /// segment started. Variables that are not checkpointed are held by
    /// handle instead.
    fn capture(&mut self, dep: &VariableRef) -> AdjointResult<()> {
        let id = dep.id();
        if !dep.flags().checkpointed {
            if let Some(live) = dep.as_live() {
                self.references.entry(id).or_insert_with(|| live.clone());
            }
            return Ok(());
        }
        let live = dep.live("annotation")?;
        if self.origin_seen.insert(id) {
            self.origin.capture(live);
        }
        if let Some(segment) = &mut self.segment {
            if segment.seen.insert(id) {
                segment.snapshot.capture(live);
            }
        }
        Ok(())
    }

    /// Closes the current block and opens the next. Does nothing unless
    /// annotating.
    ///
    /// # Errors
    ///
    /// [`ManagerError::EmptyBlock`] if the closed block has no equation and
    /// empty blocks are not allowed; storage errors when the schedule
    /// snapshots the new block.
    pub fn new_block(&mut self) -> AdjointResult<()> {
        if !self.annotation_enabled() {
            return Ok(());
        }
        let closed = self.blocks.len() - 1;
        if self.blocks[closed].is_empty() && !self.config.allow_empty_blocks {
            return Err(ManagerError::EmptyBlock { block: closed }.into());
        }
        if self.config.replace_on_new_block {
            self.replace_block(closed);
        }
        self.blocks.push(Vec::new());
        self.block_solutions.clear();

        let block = closed + 1;
        debug!(block, "Opened block");
        if let Some(Action::Store { block, tier }) = self.schedule.annotation_action(block) {
            self.open_segment(block, tier)?;
        }
        Ok(())
    }

    fn open_segment(&mut self, block: usize, tier: StorageTier) -> AdjointResult<()> {
        self.flush_segment()?;
        debug!(block, %tier, "Snapshot segment opened");
        self.segment = Some(Segment {
            snapshot: Snapshot::new(block),
            tier,
            seen: HashSet::new(),
        });
        Ok(())
    }

    fn flush_segment(&mut self) -> AdjointResult<()> {
        if let Some(segment) = self.segment.take() {
            self.storage.store(segment.snapshot, segment.tier)?;
        }
        Ok(())
    }

    /// Swaps the references of every equation in `block` for placeholders.
    pub fn replace_block(&mut self, block: usize) {
        if let Some(eqs) = self.blocks.get_mut(block) {
            eqs.iter_mut().for_each(|eq| eq.replace());
        }
    }

    /// Closes the trace: stops annotation, stores the open snapshot,
    /// drops a trailing empty block and replaces every equation.
    ///
    /// Idempotent.
    pub fn finalize(&mut self) -> AdjointResult<()> {
        if self.state == AnnotationState::Final {
            return Ok(());
        }
        self.flush_segment()?;
        if self.blocks.last().is_some_and(Vec::is_empty) {
            self.blocks.pop();
        }
        for block in 0..self.blocks.len() {
            self.replace_block(block);
        }
        self.state = AnnotationState::Final;
        self.tlm_enabled = false;
        debug!(
            blocks = self.blocks.len(),
            snapshots = self.storage.stored().len(),
            "Trace finalized"
        );
        Ok(())
    }
}
