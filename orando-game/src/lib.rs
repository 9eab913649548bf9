pub mod logic;

use anyhow::{bail, Context, Result};
use hashbrown::HashSet;
use log::info;
use orando_logic::{Graph, GraphError, NodeType, PlayerIdx, RupeeValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub use logic::{LogicError, LogicValue, PreNode};

pub type ItemName = String;
pub type SlotName = String;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInfo {
    // Never needed for progression; placed after every other item.
    #[serde(default)]
    pub inert: bool,
    // Dungeon keys stay attached during sphere analysis.
    #[serde(default)]
    pub key: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInfo {
    pub item: ItemName,
    #[serde(default)]
    pub fixed: bool,
    // Keeps an item of its own player in multiworld seeds.
    #[serde(default)]
    pub local: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalPair {
    pub outer: String,
    pub inner: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Companion {
    pub name: String,
    pub flute: ItemName,
    pub region: String,
}

fn default_start_node() -> String {
    "start".to_string()
}

fn default_done_node() -> String {
    "done".to_string()
}

fn default_hard_node() -> String {
    "hard".to_string()
}

/// Static description of a game world, as stored in `game.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GameDescription {
    #[serde(default = "default_start_node")]
    pub start_node: String,
    #[serde(default = "default_done_node")]
    pub done_node: String,
    #[serde(default = "default_hard_node")]
    pub hard_node: String,
    pub items: BTreeMap<ItemName, ItemInfo>,
    pub item_slots: BTreeMap<SlotName, SlotInfo>,
    #[serde(default)]
    pub extra_items: Vec<ItemName>,
    #[serde(default)]
    pub seed_items: Vec<ItemName>,
    #[serde(default)]
    pub seed_trees: Vec<SlotName>,
    #[serde(default)]
    pub dungeons: Vec<String>,
    #[serde(default)]
    pub dungeon_aliases: BTreeMap<String, String>, // slot or item name -> dungeon
    #[serde(default)]
    pub restricted_slots: BTreeMap<SlotName, ItemName>, // slot -> only item it may hold
    #[serde(default)]
    pub restricted_items: BTreeMap<ItemName, SlotName>, // item -> only slot it may occupy
    #[serde(default)]
    pub forbidden_placements: BTreeMap<ItemName, Vec<SlotName>>,
    #[serde(default)]
    pub rupee_values: BTreeMap<String, RupeeValue>,
    #[serde(default)]
    pub seasons: Vec<String>,
    #[serde(default)]
    pub season_areas: Vec<String>,
    #[serde(default)]
    pub dungeon_entrances: Vec<String>,
    #[serde(default)]
    pub vanilla_entrance_nodes: Vec<String>, // parented to start when entrances stay vanilla
    #[serde(default)]
    pub portals: Vec<PortalPair>,
    #[serde(default)]
    pub companions: Vec<Companion>,
    #[serde(default)]
    pub flute_placeholder: Option<ItemName>,
    #[serde(default)]
    pub hint_locations: Vec<String>,
    #[serde(default)]
    pub unhintable_slots: Vec<SlotName>,
}

/// Validated game description plus flattened logic, shared read-only by every
/// randomization attempt.
#[derive(Clone, Debug)]
pub struct GameData {
    pub logic: BTreeMap<String, PreNode>,
    pub start_node: String,
    pub done_node: String,
    pub hard_node: String,
    pub items: BTreeMap<ItemName, ItemInfo>,
    pub item_slots: BTreeMap<SlotName, SlotInfo>,
    pub extra_items: Vec<ItemName>,
    pub seed_items: HashSet<ItemName>,
    pub seed_trees: HashSet<SlotName>,
    pub dungeons: Vec<String>,
    pub dungeon_aliases: BTreeMap<String, String>,
    pub restricted_slots: BTreeMap<SlotName, ItemName>,
    pub restricted_items: BTreeMap<ItemName, SlotName>,
    pub forbidden_placements: BTreeMap<ItemName, Vec<SlotName>>,
    pub rupee_values: BTreeMap<String, RupeeValue>,
    pub seasons: Vec<String>,
    pub season_areas: Vec<String>,
    pub dungeon_entrances: Vec<String>,
    pub vanilla_entrance_nodes: Vec<String>,
    pub portals: Vec<PortalPair>,
    pub companions: Vec<Companion>,
    pub flute_placeholder: Option<ItemName>,
    pub hint_locations: Vec<String>,
    pub unhintable_slots: HashSet<SlotName>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("unable to read {}", path.display()))?;
    let data =
        serde_json::from_str(&text).with_context(|| format!("unable to parse {}", path.display()))?;
    Ok(data)
}

pub fn season_node(area: &str, season: &str) -> String {
    format!("{area} default {season}")
}

pub fn entrance_node(dungeon: &str) -> String {
    format!("{dungeon} entrance")
}

pub fn enter_dungeon_node(dungeon: &str) -> String {
    format!("enter {dungeon}")
}

pub fn enter_portal_node(portal: &str) -> String {
    format!("enter {portal} portal")
}

pub fn exit_portal_node(portal: &str) -> String {
    format!("exit {portal} portal")
}

impl GameData {
    /// Loads `<base_path>/game.json` and the logic files in `<base_path>/logic`.
    pub fn load(base_path: &Path) -> Result<GameData> {
        let game_path: PathBuf = base_path.join("game.json");
        let logic_path: PathBuf = base_path.join("logic");
        info!("Loading game data from {}", base_path.display());
        let description: GameDescription = read_json(&game_path)?;
        let entries = logic::load_logic_dir(&logic_path)?;
        Self::new(description, entries)
            .with_context(|| format!("Invalid game data in {}", base_path.display()))
    }

    pub fn new(description: GameDescription, entries: Vec<(String, LogicValue)>) -> Result<GameData> {
        let logic = logic::flatten_logic(entries)?;
        let game_data = GameData {
            logic,
            start_node: description.start_node,
            done_node: description.done_node,
            hard_node: description.hard_node,
            items: description.items,
            item_slots: description.item_slots,
            extra_items: description.extra_items,
            seed_items: description.seed_items.into_iter().collect(),
            seed_trees: description.seed_trees.into_iter().collect(),
            dungeons: description.dungeons,
            dungeon_aliases: description.dungeon_aliases,
            restricted_slots: description.restricted_slots,
            restricted_items: description.restricted_items,
            forbidden_placements: description.forbidden_placements,
            rupee_values: description.rupee_values,
            seasons: description.seasons,
            season_areas: description.season_areas,
            dungeon_entrances: description.dungeon_entrances,
            vanilla_entrance_nodes: description.vanilla_entrance_nodes,
            portals: description.portals,
            companions: description.companions,
            flute_placeholder: description.flute_placeholder,
            hint_locations: description.hint_locations,
            unhintable_slots: description.unhintable_slots.into_iter().collect(),
        };
        game_data.validate()?;
        info!(
            "Loaded {} logic nodes, {} items, {} item slots",
            game_data.logic.len(),
            game_data.items.len(),
            game_data.item_slots.len()
        );
        Ok(game_data)
    }

    /// Builds a fresh graph owned by `player`: logic nodes, one Root node per
    /// item, static edges, rupee weights and fixed slot contents.
    pub fn build_graph(&self, player: PlayerIdx) -> Result<Graph, GraphError> {
        let mut graph = Graph::new();
        for (name, prenode) in &self.logic {
            graph.add_player_node(name, prenode.node_type, player)?;
        }
        for name in self.items.keys() {
            graph.add_player_node(name, NodeType::Root, player)?;
        }
        for (name, prenode) in &self.logic {
            for parent in &prenode.parents {
                graph.link(name, parent)?;
            }
        }
        for (name, &value) in &self.rupee_values {
            let idx = graph.idx(name)?;
            graph.set_rupee_value(idx, value);
        }
        for (slot, info) in &self.item_slots {
            if info.fixed {
                graph.link(&info.item, slot)?;
            }
        }
        Ok(graph)
    }

    pub fn is_inert(&self, item: &str) -> bool {
        self.items.get(item).is_some_and(|info| info.inert)
    }

    pub fn is_key(&self, item: &str) -> bool {
        self.items.get(item).is_some_and(|info| info.key)
    }

    pub fn is_seed(&self, item: &str) -> bool {
        self.seed_items.contains(item)
    }

    pub fn is_seed_tree(&self, slot: &str) -> bool {
        self.seed_trees.contains(slot)
    }

    /// Dungeon that an item or slot belongs to: an explicit alias, or else the
    /// longest dungeon name that the name starts with as a whole word.
    pub fn dungeon_of(&self, name: &str) -> Option<&str> {
        if let Some(dungeon) = self.dungeon_aliases.get(name) {
            return Some(dungeon.as_str());
        }
        self.dungeons
            .iter()
            .filter(|d| {
                name.strip_prefix(d.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with(' '))
            })
            .max_by_key(|d| d.len())
            .map(|d| d.as_str())
    }

    fn validate(&self) -> Result<()> {
        let graph = self.build_graph(0).context("Unable to build logic graph")?;
        let require_node = |name: &str, what: &str| -> Result<()> {
            if !graph.contains(name) {
                bail!("{what} {name:?} has no logic node");
            }
            Ok(())
        };
        let require_item = |name: &str, what: &str| -> Result<()> {
            if !self.items.contains_key(name) {
                bail!("{what} {name:?} is not a known item");
            }
            Ok(())
        };
        let require_slot = |name: &str, what: &str| -> Result<()> {
            if !self.item_slots.contains_key(name) {
                bail!("{what} {name:?} is not a known item slot");
            }
            Ok(())
        };

        require_node(&self.start_node, "start node")?;
        require_node(&self.done_node, "done node")?;
        require_node(&self.hard_node, "hard node")?;
        for (slot, info) in &self.item_slots {
            require_node(slot, "item slot")?;
            require_item(&info.item, &format!("default item of {slot:?}"))?;
        }
        for item in &self.extra_items {
            require_item(item, "extra item")?;
        }
        for item in &self.seed_items {
            require_item(item, "seed item")?;
        }
        for slot in &self.seed_trees {
            require_slot(slot, "seed tree")?;
        }
        for (slot, item) in &self.restricted_slots {
            require_slot(slot, "restricted slot")?;
            require_item(item, "restricted slot item")?;
        }
        for (item, slot) in &self.restricted_items {
            require_item(item, "restricted item")?;
            require_slot(slot, "restricted item slot")?;
        }
        for (item, slots) in &self.forbidden_placements {
            require_item(item, "forbidden item")?;
            for slot in slots {
                require_slot(slot, "forbidden slot")?;
            }
        }
        for (name, dungeon) in &self.dungeon_aliases {
            if !self.dungeons.contains(dungeon) {
                bail!("alias {name:?} names unknown dungeon {dungeon:?}");
            }
        }
        for area in &self.season_areas {
            for season in &self.seasons {
                require_node(&season_node(area, season), "default season")?;
            }
        }
        for dungeon in &self.dungeon_entrances {
            require_node(&entrance_node(dungeon), "dungeon entrance")?;
            require_node(&enter_dungeon_node(dungeon), "dungeon interior")?;
        }
        for name in &self.vanilla_entrance_nodes {
            require_node(name, "vanilla entrance node")?;
        }
        for pair in &self.portals {
            for portal in [&pair.outer, &pair.inner] {
                require_node(&enter_portal_node(portal), "portal")?;
                require_node(&exit_portal_node(portal), "portal")?;
            }
        }
        for companion in &self.companions {
            require_item(&companion.flute, "companion flute")?;
            require_node(&companion.region, "companion region")?;
        }
        if let Some(placeholder) = &self.flute_placeholder {
            require_item(placeholder, "flute placeholder")?;
            if self.companions.is_empty() {
                bail!("flute placeholder {placeholder:?} given without companions");
            }
        }
        for name in &self.hint_locations {
            require_node(name, "hint location")?;
        }
        for slot in &self.unhintable_slots {
            require_slot(slot, "unhintable slot")?;
        }
        Ok(())
    }
}
