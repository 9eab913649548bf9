use crate::helpers::seeded_rng;
use crate::randomize::{FillError, Randomizer, WorldConfig};
use crate::settings::RandomizerSettings;
use crate::spoiler_log::{check_names, get_checks};
use anyhow::{Context, Result};
use log::info;
use orando_game::{GameData, ItemName, SlotName};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::mpsc;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RouteSummary {
    pub seed: usize,
    pub attempts: usize,
    pub checks: BTreeMap<SlotName, ItemName>,
    pub world: WorldConfig,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SeedStats {
    pub routes: Vec<RouteSummary>,
    pub total_attempts: usize,
    pub success_rate: f64,
    /// Item -> slot -> number of routes with that placement.
    pub placements: BTreeMap<ItemName, BTreeMap<SlotName, usize>>,
}

impl SeedStats {
    fn from_routes(mut routes: Vec<RouteSummary>) -> Self {
        routes.sort_by_key(|r| r.seed);
        let total_attempts: usize = routes.iter().map(|r| r.attempts).sum();
        let success_rate = if total_attempts == 0 {
            0.0
        } else {
            routes.len() as f64 / total_attempts as f64
        };
        let mut placements: BTreeMap<ItemName, BTreeMap<SlotName, usize>> = BTreeMap::new();
        for route in &routes {
            for (slot, item) in &route.checks {
                *placements
                    .entry(item.clone())
                    .or_default()
                    .entry(slot.clone())
                    .or_default() += 1;
            }
        }
        SeedStats {
            routes,
            total_attempts,
            success_rate,
            placements,
        }
    }
}

pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

// Route search for one route, drawing fresh seeds until one finds a route or
// `max_seeds` of them have failed.
fn find_summary<R: Rng>(
    randomizer: &Randomizer,
    rng: &mut R,
) -> Result<RouteSummary, FillError> {
    let mut failed_attempts = 0;
    for _ in 0..randomizer.settings.max_seeds.max(1) {
        let seed = rng.gen_range(0..u32::MAX as usize);
        match randomizer.find_route(seed) {
            Ok(route) => {
                let checks = get_checks(&route, randomizer.game_data)?;
                return Ok(RouteSummary {
                    seed,
                    attempts: failed_attempts + route.attempt_count,
                    checks: check_names(&route.graph, &checks),
                    world: route.world,
                });
            }
            Err(FillError::RouteNotFound(n)) => {
                info!("Seed {seed} failed after {n} attempts");
                failed_attempts += n;
            }
            Err(e) => return Err(e),
        }
    }
    Err(FillError::RouteNotFound(failed_attempts))
}

/// Generates `count` routes on `threads` workers. Worker `w` draws its seeds
/// from its own RNG seeded with `base_seed + w`, so a run is reproducible for
/// a fixed thread count.
pub fn generate_seeds(
    game_data: &GameData,
    settings: &RandomizerSettings,
    count: usize,
    base_seed: usize,
    threads: usize,
) -> Result<SeedStats> {
    let threads = threads.clamp(1, count.max(1));
    let (tx, rx) = mpsc::channel::<Result<RouteSummary, FillError>>();

    let routes = std::thread::scope(|s| -> Result<Vec<RouteSummary>> {
        for worker in 0..threads {
            let tx = tx.clone();
            let num_routes = count / threads + usize::from(worker < count % threads);
            s.spawn(move || {
                let randomizer = Randomizer::new(game_data, settings);
                let mut rng = seeded_rng(base_seed.wrapping_add(worker));
                for _ in 0..num_routes {
                    let result = find_summary(&randomizer, &mut rng);
                    let failed = result.is_err();
                    if tx.send(result).is_err() || failed {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let mut routes = Vec::with_capacity(count);
        for result in rx {
            let summary = result.context("Seed generation failed")?;
            routes.push(summary);
            info!("{} routes found", routes.len());
        }
        Ok(routes)
    })?;

    let stats = SeedStats::from_routes(routes);
    info!(
        "{:.1}% of attempts succeeded",
        100.0 * stats.success_rate
    );
    Ok(stats)
}
