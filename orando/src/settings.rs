use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use orando_game::{ItemName, SlotName};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, VariantNames};

pub const DEFAULT_MAX_ATTEMPTS: usize = 200;
pub const DEFAULT_MAX_SEEDS: usize = 10;

#[derive(
    Clone,
    Copy,
    Serialize,
    Deserialize,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Default,
    Display,
    EnumString,
    VariantNames,
)]
pub enum Difficulty {
    #[default]
    Normal,
    Hard,
}

/// User-pinned parts of a seed. Anything not named here is randomized.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Plan {
    pub items: BTreeMap<SlotName, ItemName>,
    pub dungeons: BTreeMap<String, String>, // entrance -> dungeon behind it
    pub portals: BTreeMap<String, String>,  // outer portal -> inner portal
    pub seasons: BTreeMap<String, String>,  // area -> default season
    pub hints: BTreeMap<String, SlotName>,  // hint location -> hinted slot
    pub companion: Option<String>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self == &Plan::default()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct RandomizerSettings {
    pub difficulty: Difficulty,
    pub shuffle_dungeons: bool,
    pub shuffle_portals: bool,
    pub max_attempts: usize,
    // Seeds tried per route in bulk generation before giving up.
    pub max_seeds: usize,
    pub plan: Plan,
}

impl Default for RandomizerSettings {
    fn default() -> Self {
        Self {
            difficulty: Difficulty::Normal,
            shuffle_dungeons: false,
            shuffle_portals: false,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_seeds: DEFAULT_MAX_SEEDS,
            plan: Plan::default(),
        }
    }
}

impl RandomizerSettings {
    pub fn is_hard(&self) -> bool {
        self.difficulty == Difficulty::Hard
    }
}

pub fn parse_randomizer_settings(settings_json: &str) -> Result<RandomizerSettings> {
    let mut des = serde_json::Deserializer::from_str(settings_json);
    let settings = serde_path_to_error::deserialize(&mut des)?;
    Ok(settings)
}

pub fn load_randomizer_settings(path: &Path) -> Result<RandomizerSettings> {
    let settings_json = std::fs::read_to_string(path)
        .with_context(|| format!("Unable to read settings file at {}", path.display()))?;
    parse_randomizer_settings(&settings_json)
        .with_context(|| format!("Unable to parse settings file at {}", path.display()))
}
