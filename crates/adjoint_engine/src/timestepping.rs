//! Time-stepping helpers.
//!
//! A [`TimeSystem`] groups equations into an initial, a timestep and a
//! final stage. Each stage is ordered so that every equation runs after
//! the equations producing its inputs. Between timesteps the
//! [`TimeFunction`]s registered with the system cycle their time levels by
//! assignment, and a new block is started, so one timestep is one block of
//! the trace.
//!
//! ```text
//! initialise: initial stage, new_block
//! timestep:   (timestep stage, cycle levels, new_block) x steps
//! finalise:   final stage
//! ```

use std::collections::HashMap;
use std::ops::Index;

use adjoint_core::{AssignmentSolver, Equation, Variable, VariableId};
use tracing::debug;

use crate::error::{AdjointResult, ManagerError};
use crate::manager::EquationManager;

/// One variable per time level, `n`, `n + 1`, ..., plus the assignments
/// that advance them.
///
/// # Example
///
/// ```
/// use adjoint_engine::TimeFunction;
///
/// let u = TimeFunction::new("u", 3, 2);
/// assert_eq!(u.levels().len(), 2);
/// assert_eq!(u[1].name(), "u_n+1");
/// assert_eq!(u.cycle_map(), &[(0, 1)]);
/// ```
#[derive(Clone, Debug)]
pub struct TimeFunction {
    levels: Vec<Variable>,
    cycle: Vec<(usize, usize)>,
}

impl TimeFunction {
    /// Creates `levels` zero variables of length `len`.
    ///
    /// The default cycle assigns level `k + 1` to level `k`.
    pub fn new(name: &str, len: usize, levels: usize) -> Self {
        let levels: Vec<Variable> = (0..levels)
            .map(|k| match k {
                0 => Variable::new(format!("{}_n", name), len),
                k => Variable::new(format!("{}_n+{}", name, k), len),
            })
            .collect();
        let cycle = (1..levels.len()).map(|k| (k - 1, k)).collect();
        Self { levels, cycle }
    }

    /// Replaces the cycle with `(target, source)` assignments, applied in
    /// order.
    pub fn with_cycle(mut self, cycle: Vec<(usize, usize)>) -> Self {
        self.cycle = cycle;
        self
    }

    /// Variables, by level.
    #[inline]
    pub fn levels(&self) -> &[Variable] {
        &self.levels
    }

    /// `(target, source)` level assignments.
    #[inline]
    pub fn cycle_map(&self) -> &[(usize, usize)] {
        &self.cycle
    }

    /// Advances the levels through `manager`.
    pub fn cycle(&self, manager: &mut EquationManager) -> AdjointResult<()> {
        for &(target, source) in &self.cycle {
            manager.solve(AssignmentSolver::new(&self.levels[target], &self.levels[source])?)?;
        }
        Ok(())
    }
}

impl Index<usize> for TimeFunction {
    type Output = Variable;

    fn index(&self, level: usize) -> &Variable {
        &self.levels[level]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SystemState {
    Assembling,
    Initialised,
    Timestepping,
    Final,
}

impl SystemState {
    fn name(self) -> &'static str {
        match self {
            SystemState::Assembling => "assembling",
            SystemState::Initialised => "initialised",
            SystemState::Timestepping => "timestepping",
            SystemState::Final => "final",
        }
    }
}

/// Equations of a time-dependent model, grouped by stage.
///
/// # Example
///
/// ```
/// use adjoint_core::{AssignmentSolver, LinearCombinationSolver, Variable};
/// use adjoint_engine::{EquationManager, TimeFunction, TimeSystem};
///
/// let u0 = Variable::scalar("u0", 8.0);
/// let u = TimeFunction::new("u", 1, 2);
///
/// let mut system = TimeSystem::new();
/// system.add_initial(AssignmentSolver::new(&u[0], &u0).unwrap()).unwrap();
/// system.add_timestep(LinearCombinationSolver::scale(&u[1], 0.5, &u[0]).unwrap()).unwrap();
/// system.add_time_function(u.clone()).unwrap();
///
/// let mut manager = EquationManager::new();
/// system.timestep(&mut manager, 3).unwrap();
/// assert_eq!(u[0].value(), 1.0);
/// ```
#[derive(Debug)]
pub struct TimeSystem {
    state: SystemState,
    initial: Vec<Box<dyn Equation>>,
    timestep: Vec<Box<dyn Equation>>,
    finals: Vec<Box<dyn Equation>>,
    functions: Vec<TimeFunction>,
    steps: usize,
}

impl TimeSystem {
    /// Creates an empty system.
    pub fn new() -> Self {
        Self {
            state: SystemState::Assembling,
            initial: Vec::new(),
            timestep: Vec::new(),
            finals: Vec::new(),
            functions: Vec::new(),
            steps: 0,
        }
    }

    fn check_assembling(&self, stage: &'static str) -> AdjointResult<()> {
        if self.state != SystemState::Assembling {
            return Err(ManagerError::InvalidStage {
                stage,
                state: self.state.name(),
            }
            .into());
        }
        Ok(())
    }

    /// Adds an equation solved once, before the first timestep.
    pub fn add_initial<E: Equation + 'static>(&mut self, eq: E) -> AdjointResult<()> {
        self.check_assembling("initial")?;
        self.initial.push(Box::new(eq));
        Ok(())
    }

    /// Adds an equation solved every timestep.
    pub fn add_timestep<E: Equation + 'static>(&mut self, eq: E) -> AdjointResult<()> {
        self.check_assembling("timestep")?;
        self.timestep.push(Box::new(eq));
        Ok(())
    }

    /// Adds an equation solved once, after the last timestep.
    pub fn add_final<E: Equation + 'static>(&mut self, eq: E) -> AdjointResult<()> {
        self.check_assembling("final")?;
        self.finals.push(Box::new(eq));
        Ok(())
    }

    /// Registers a time function cycled after every timestep.
    pub fn add_time_function(&mut self, function: TimeFunction) -> AdjointResult<()> {
        self.check_assembling("timestep")?;
        self.functions.push(function);
        Ok(())
    }

    /// Timesteps taken so far.
    #[inline]
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Orders every stage by dependency.
    ///
    /// # Errors
    ///
    /// - [`ManagerError::DuplicateStageSolve`] if two equations of a stage
    ///   solve the same variable
    /// - [`ManagerError::CircularDependency`] if a stage has a cycle
    pub fn assemble(&mut self) -> AdjointResult<()> {
        self.check_assembling("initial")?;
        self.initial = order_stage("initial", std::mem::take(&mut self.initial))?;
        self.timestep = order_stage("timestep", std::mem::take(&mut self.timestep))?;
        self.finals = order_stage("final", std::mem::take(&mut self.finals))?;
        debug!(
            initial = self.initial.len(),
            timestep = self.timestep.len(),
            finals = self.finals.len(),
            "Time system assembled"
        );
        Ok(())
    }

    /// Assembles the system and solves the initial stage.
    pub fn initialise(&mut self, manager: &mut EquationManager) -> AdjointResult<()> {
        self.assemble()?;
        for eq in &self.initial {
            manager.solve_boxed(eq.clone())?;
        }
        if !self.initial.is_empty() {
            manager.new_block()?;
        }
        self.state = SystemState::Initialised;
        Ok(())
    }

    /// Takes `steps` timesteps, initialising first if needed.
    pub fn timestep(&mut self, manager: &mut EquationManager, steps: usize) -> AdjointResult<()> {
        match self.state {
            SystemState::Assembling => self.initialise(manager)?,
            SystemState::Final => {
                return Err(ManagerError::InvalidStage {
                    stage: "timestep",
                    state: self.state.name(),
                }
                .into())
            }
            SystemState::Initialised | SystemState::Timestepping => {}
        }
        self.state = SystemState::Timestepping;
        for _ in 0..steps {
            for eq in &self.timestep {
                manager.solve_boxed(eq.clone())?;
            }
            for function in &self.functions {
                function.cycle(manager)?;
            }
            manager.new_block()?;
            self.steps += 1;
        }
        Ok(())
    }

    /// Solves the final stage. No stage can run afterwards.
    pub fn finalise(&mut self, manager: &mut EquationManager) -> AdjointResult<()> {
        match self.state {
            SystemState::Assembling => self.initialise(manager)?,
            SystemState::Final => {
                return Err(ManagerError::InvalidStage {
                    stage: "final",
                    state: self.state.name(),
                }
                .into())
            }
            SystemState::Initialised | SystemState::Timestepping => {}
        }
        for eq in &self.finals {
            manager.solve_boxed(eq.clone())?;
        }
        self.state = SystemState::Final;
        debug!(steps = self.steps, "Time system finalised");
        Ok(())
    }
}

impl Default for TimeSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Depth-first ordering of one stage, producers first, keeping insertion
/// order otherwise.
fn order_stage(
    stage: &'static str,
    eqs: Vec<Box<dyn Equation>>,
) -> AdjointResult<Vec<Box<dyn Equation>>> {
    let mut producer: HashMap<VariableId, usize> = HashMap::new();
    for (i, eq) in eqs.iter().enumerate() {
        for x in eq.core().x() {
            if producer.insert(x.id(), i).is_some() {
                return Err(ManagerError::DuplicateStageSolve {
                    name: x.name().to_string(),
                    stage,
                }
                .into());
            }
        }
    }

    let inputs: Vec<Vec<usize>> = eqs
        .iter()
        .enumerate()
        .map(|(i, eq)| {
            let core = eq.core();
            core.deps()
                .iter()
                .enumerate()
                .filter(|&(j, _)| !core.is_solution_index(j))
                .filter_map(|(_, dep)| producer.get(&dep.id()).copied())
                .filter(|&p| p != i)
                .collect()
        })
        .collect();

    let mut marks = vec![Mark::Unvisited; eqs.len()];
    let mut stack = Vec::new();
    let mut order = Vec::with_capacity(eqs.len());
    for i in 0..eqs.len() {
        visit(i, &inputs, &mut marks, &mut stack, &mut order).map_err(|cycle| {
            ManagerError::CircularDependency {
                names: cycle
                    .iter()
                    .flat_map(|&k| eqs[k].core().x().map(|x| x.name().to_string()))
                    .collect(),
            }
        })?;
    }

    let mut slots: Vec<Option<Box<dyn Equation>>> = eqs.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Active,
    Done,
}

/// Returns the equations on a cycle as the error.
fn visit(
    i: usize,
    inputs: &[Vec<usize>],
    marks: &mut [Mark],
    stack: &mut Vec<usize>,
    order: &mut Vec<usize>,
) -> Result<(), Vec<usize>> {
    match marks[i] {
        Mark::Done => return Ok(()),
        Mark::Active => {
            let start = stack.iter().position(|&k| k == i).unwrap_or(0);
            return Err(stack[start..].to_vec());
        }
        Mark::Unvisited => {}
    }
    marks[i] = Mark::Active;
    stack.push(i);
    for &p in &inputs[i] {
        visit(p, inputs, marks, stack, order)?;
    }
    stack.pop();
    marks[i] = Mark::Done;
    order.push(i);
    Ok(())
}
