//! Parallel iteration driver
//!
//! Each rayon worker builds its own simulation once and resets it between
//! iterations. Iteration `i` always runs with seed `base_seed + i` and
//! results are folded in index order, so the outcome does not depend on
//! how iterations were spread over threads.

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::metrics::{IterationResult, SimulationResult};
use crate::sim::Simulation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub iterations: u32,
    pub base_seed: u64,
    /// Worker threads; `None` uses the global rayon pool
    pub threads: Option<usize>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            iterations: 1000,
            base_seed: 0,
            threads: None,
        }
    }
}

/// Build with `builder` and run every iteration. The builder must return a
/// finalized simulation; it is called once up front so setup errors are
/// reported before any worker starts.
pub fn run_iterations<F>(builder: F, options: &RunOptions) -> Result<SimulationResult, ConfigError>
where
    F: Fn() -> Result<Simulation, ConfigError> + Send + Sync,
{
    let first = builder()?;
    if !first.is_finalized() {
        return Err(ConfigError::NotFinalized);
    }
    drop(first);

    let run = || -> Result<Vec<IterationResult>, ConfigError> {
        (0..options.iterations)
            .into_par_iter()
            .map_init(&builder, |sim, i| {
                let seed = options.base_seed.wrapping_add(u64::from(i));
                match sim {
                    Ok(sim) => sim.run_iteration(seed),
                    Err(e) => Err(ConfigError::Validation(e.to_string())),
                }
            })
            .collect()
    };

    let iterations = match options.threads {
        Some(threads) => {
            let pool = ThreadPoolBuilder::new()
                .num_threads(threads.max(1))
                .build()
                .map_err(|e| ConfigError::Validation(format!("thread pool: {e}")))?;
            debug!(threads, "running on dedicated pool");
            pool.install(run)?
        }
        None => run()?,
    };

    let result = SimulationResult::from_iterations(&iterations);
    info!(iterations = result.iterations, "iterations complete");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConstants;
    use crate::outcome::OutcomeApplier;
    use crate::spell::SpellConfig;
    use crate::types::{ActionId, ProcMask, SpellSchool};
    use crate::unit::UnitConfig;
    use std::time::Duration;

    fn build() -> Result<Simulation, ConfigError> {
        let mut sim = Simulation::new(EngineConstants::default(), Duration::from_secs(20));
        let player = sim.add_unit(UnitConfig::player("p", 60))?;
        sim.add_unit(UnitConfig::target("boss", 63))?;
        let nuke = sim.register_spell(
            player,
            SpellConfig::damage(ActionId::spell(1), SpellSchool::FIRE, ProcMask::SPELL_DAMAGE)
                .with_apply_effects(|sim, target, spell| {
                    sim.calc_and_deal_damage(spell, target, 100.0, OutcomeApplier::MagicHitAndCrit);
                }),
        )?;
        sim.set_rotation(player, move |sim, unit| {
            sim.cast(nuke, None);
            let next = sim.current_time() + Duration::from_secs(2);
            sim.wait_until(unit, next);
        });
        sim.finalize()?;
        Ok(sim)
    }

    #[test]
    fn test_results_independent_of_thread_count() {
        let single = run_iterations(
            build,
            &RunOptions {
                iterations: 16,
                base_seed: 42,
                threads: Some(1),
            },
        )
        .unwrap();
        let many = run_iterations(
            build,
            &RunOptions {
                iterations: 16,
                base_seed: 42,
                threads: Some(4),
            },
        )
        .unwrap();
        assert_eq!(single.iterations, 16);
        assert_eq!(single.units[0].dps.mean, many.units[0].dps.mean);
        assert_eq!(single.units[0].dps.max, many.units[0].dps.max);
    }

    #[test]
    fn test_unfinalized_builder_rejected() {
        let result = run_iterations(
            || Ok(Simulation::new(EngineConstants::default(), Duration::from_secs(1))),
            &RunOptions::default(),
        );
        assert!(matches!(result, Err(ConfigError::NotFinalized)));
    }
}
