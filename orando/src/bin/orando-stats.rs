use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use orando::settings::{load_randomizer_settings, Difficulty, RandomizerSettings};
use orando::stats::{default_threads, generate_seeds};
use orando_game::GameData;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use strum::VariantNames;

#[derive(Parser)]
struct Args {
    #[arg(long, default_value = "data/sample")]
    data: PathBuf,

    #[arg(long)]
    settings: Option<PathBuf>,

    #[arg(long, default_value_t = 100)]
    num_seeds: usize,

    #[arg(long, default_value_t = 0)]
    base_seed: usize,

    #[arg(long)]
    threads: Option<usize>,

    /// Seeds to try for each route before giving up.
    #[arg(long)]
    max_seeds: Option<usize>,

    /// Generate seeds for every difficulty instead of the one in the settings.
    #[arg(long)]
    all_difficulties: bool,

    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    let game_data = GameData::load(&args.data)?;
    let mut settings = match &args.settings {
        Some(path) => load_randomizer_settings(path)?,
        None => RandomizerSettings::default(),
    };
    if let Some(max_seeds) = args.max_seeds {
        settings.max_seeds = max_seeds;
    }
    let threads = args.threads.unwrap_or_else(default_threads);

    let difficulties: Vec<Difficulty> = if args.all_difficulties {
        Difficulty::VARIANTS
            .iter()
            .map(|name| Difficulty::from_str(name))
            .collect::<Result<_, _>>()?
    } else {
        vec![settings.difficulty]
    };

    let mut all_stats = BTreeMap::new();
    for difficulty in difficulties {
        info!("Generating {} {difficulty} seeds on {threads} threads", args.num_seeds);
        let settings = RandomizerSettings {
            difficulty,
            ..settings.clone()
        };
        let stats = generate_seeds(&game_data, &settings, args.num_seeds, args.base_seed, threads)
            .with_context(|| format!("Failed to generate {difficulty} seeds"))?;
        all_stats.insert(difficulty.to_string(), stats);
    }

    let json = serde_json::to_string_pretty(&all_stats)?;
    match &args.output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("Unable to write {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}
