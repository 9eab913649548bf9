use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use orando::hints::generate_hints;
use orando::multiworld::{find_multiworld, MultiCheck};
use orando::randomize::{Randomizer, WorldConfig};
use orando::settings::{load_randomizer_settings, Difficulty, RandomizerSettings};
use orando::spoiler_log::{check_names, get_checks, get_spoiler_log};
use orando_game::{GameData, ItemName, SlotName};
use rand::{RngCore, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Parser)]
struct Args {
    #[arg(long, default_value = "data/sample")]
    data: PathBuf,

    #[arg(long)]
    settings: Option<PathBuf>,

    #[arg(long)]
    random_seed: Option<usize>,

    #[arg(long)]
    difficulty: Option<Difficulty>,

    #[arg(long)]
    max_attempts: Option<usize>,

    /// Number of players; more than one makes a multiworld seed.
    #[arg(long, default_value_t = 1)]
    players: usize,

    #[arg(long)]
    output_checks: Option<PathBuf>,

    #[arg(long)]
    output_spoiler_log: Option<PathBuf>,
}

// What a patcher needs to build the seed.
#[derive(Serialize)]
struct SeedOutput {
    seed: usize,
    checks: BTreeMap<SlotName, ItemName>,
    #[serde(flatten)]
    world: WorldConfig,
}

#[derive(Serialize)]
struct PlayerOutput {
    player: usize,
    checks: BTreeMap<SlotName, MultiCheck>,
    #[serde(flatten)]
    world: WorldConfig,
}

#[derive(Serialize)]
struct MultiSeedOutput {
    seed: usize,
    swaps: usize,
    players: Vec<PlayerOutput>,
}

fn run_multiworld(
    args: &Args,
    game_data: &GameData,
    settings: &RandomizerSettings,
    seed: usize,
) -> Result<()> {
    let world = find_multiworld(game_data, settings, seed, args.players)
        .with_context(|| format!("Multiworld randomization failed for seed {seed}"))?;
    if args.output_spoiler_log.is_some() {
        warn!("Spoiler logs are not written for multiworld seeds");
    }
    if let Some(output_checks_path) = &args.output_checks {
        println!("Writing checks to {}", output_checks_path.display());
        let players = world
            .player_checks()
            .into_iter()
            .zip(&world.players)
            .enumerate()
            .map(|(i, (checks, player_world))| PlayerOutput {
                player: i + 1,
                checks,
                world: player_world.route.world.clone(),
            })
            .collect();
        let output = MultiSeedOutput {
            seed,
            swaps: world.swaps,
            players,
        };
        write_json(output_checks_path, &output)?;
    }
    Ok(())
}

fn get_settings(args: &Args) -> Result<RandomizerSettings> {
    let mut settings = match &args.settings {
        Some(path) => load_randomizer_settings(path)?,
        None => RandomizerSettings::default(),
    };
    if let Some(difficulty) = args.difficulty {
        settings.difficulty = difficulty;
    }
    if let Some(max_attempts) = args.max_attempts {
        settings.max_attempts = max_attempts;
    }
    Ok(settings)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Unable to write {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let game_data = GameData::load(&args.data)?;
    let settings = get_settings(&args)?;
    let seed = match args.random_seed {
        Some(s) => s,
        None => (rand::rngs::StdRng::from_entropy().next_u64() & 0xFFFFFFFF) as usize,
    };

    if args.players > 1 {
        return run_multiworld(&args, &game_data, &settings, seed);
    }

    let randomizer = Randomizer::new(&game_data, &settings);
    let mut route = randomizer
        .find_route(seed)
        .with_context(|| format!("Randomization failed for seed {seed}"))?;
    info!(
        "Seed {seed}: route found after {} attempts",
        route.attempt_count
    );

    let checks = get_checks(&route, &game_data)?;
    let hints = generate_hints(
        &mut route.graph,
        &checks,
        &game_data.hint_locations,
        &game_data,
        &settings.plan.hints,
        &mut route.rng,
    )?;

    if let Some(output_checks_path) = &args.output_checks {
        println!("Writing checks to {}", output_checks_path.display());
        let output = SeedOutput {
            seed,
            checks: check_names(&route.graph, &checks),
            world: route.world.clone(),
        };
        write_json(output_checks_path, &output)?;
    }

    if let Some(output_spoiler_log_path) = &args.output_spoiler_log {
        println!(
            "Writing spoiler log to {}",
            output_spoiler_log_path.display()
        );
        let spoiler_log = get_spoiler_log(&mut route, &game_data, settings.difficulty, &hints)?;
        write_json(output_spoiler_log_path, &spoiler_log)?;
    }

    Ok(())
}
