//! Demo command: differentiate the diffusion model under a chosen schedule.
//!
//! The gradient is computed twice, once under the requested schedule and
//! once keeping everything in memory, and the two are compared.

use adjoint_checkpoint::{ScheduleConfig, StorageTier};
use adjoint_core::Variable;
use adjoint_engine::{EquationManager, ManagerConfig};
use tracing::info;

use super::ScheduleKind;
use crate::config::CliConfig;
use crate::model::DiffusionModel;
use crate::{CliError, Result};

/// Options of the demo command.
#[derive(Clone, Debug)]
pub struct DemoOptions {
    /// Timesteps, overriding the configuration
    pub steps: Option<usize>,
    /// Schedule, overriding the configuration
    pub schedule: Option<ScheduleKind>,
    /// Fast-tier snapshots for the binomial schedule, or the period
    pub ram: usize,
    /// Slow-tier snapshots for the binomial schedule
    pub disk: usize,
}

/// Chooses the schedule from the flags, falling back to the configuration.
fn schedule_for(
    options: &DemoOptions,
    blocks: usize,
    configured: &ScheduleConfig,
) -> Result<ScheduleConfig> {
    Ok(match options.schedule {
        None => configured.clone(),
        Some(ScheduleKind::Memory) => ScheduleConfig::Memory,
        Some(ScheduleKind::Periodic) => {
            if options.ram == 0 {
                return Err(CliError::InvalidArgument(
                    "periodic schedule needs --ram as the period".to_string(),
                )
                .into());
            }
            ScheduleConfig::Periodic {
                period: options.ram,
                tier: if options.disk > 0 {
                    StorageTier::Slow
                } else {
                    StorageTier::Fast
                },
            }
        }
        Some(ScheduleKind::Binomial) => ScheduleConfig::Binomial {
            blocks,
            snapshots_in_ram: options.ram,
            snapshots_on_disk: options.disk,
        },
    })
}

fn gradient(
    model: &DiffusionModel,
    config: ManagerConfig,
) -> Result<(f64, Variable, EquationManager)> {
    let m = model.parameter();
    let mut manager = EquationManager::from_config(config)?;
    manager.start()?;
    let j = model.run(&mut manager, &m)?;
    manager.stop();
    let info = manager.info();
    info!(
        schedule = info.schedule,
        blocks = info.blocks,
        equations = info.equations,
        snapshots = info.snapshots,
        "Forward run recorded"
    );
    let mut dj = manager.compute_gradient(&[&j], &[&m])?;
    let dj = dj.swap_remove(0).swap_remove(0);
    Ok((j.value(), dj, manager))
}

/// Runs the demo command.
pub fn run(config: &CliConfig, options: &DemoOptions) -> Result<()> {
    let mut model_config = config.model.clone();
    if let Some(steps) = options.steps {
        model_config.steps = steps;
    }
    model_config.validate()?;
    let model = DiffusionModel::new(&model_config);

    let schedule = schedule_for(options, model.blocks(), &config.manager.schedule)?;
    let manager_config = config.manager.clone().with_schedule(schedule);

    let (j, dj, manager) = gradient(&model, manager_config)?;
    let reference = config.manager.clone().with_schedule(ScheduleConfig::Memory);
    let (_, dj_ref, _) = gradient(&model, reference)?;

    let deviation = dj
        .to_vec()
        .iter()
        .zip(dj_ref.to_vec())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);

    println!("========================================");
    println!("Adjoint Diffusion Demo");
    println!("========================================");
    println!("Schedule:        {}", manager.schedule().name());
    println!("Grid points:     {}", model_config.size);
    println!("Timesteps:       {}", model_config.steps);
    println!("Blocks:          {}", manager.info().blocks);
    println!("J(m):            {:.12e}", j);
    println!("|dJ/dm|:         {:.12e}", dj.norm_sq().sqrt());
    println!("Deviation from in-memory gradient: {:.3e}", deviation);
    println!("----------------------------------------");
    println!("{:<6} {:>20}", "i", "dJ/dm_i");
    for (i, g) in dj.to_vec().iter().enumerate() {
        println!("{:<6} {:>20.12e}", i, g);
    }
    Ok(())
}
