pub mod world;

use crate::helpers::{seeded_rng, sorted_shuffle};
use crate::settings::RandomizerSettings;
use log::{debug, info};
use orando_game::{Companion, GameData, ItemName};
use orando_logic::{Graph, GraphError, NodeIdx, PlayerIdx};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use self::world::{roll_companion, roll_seasons, set_dungeon_entrances, set_portals};

#[derive(Debug, thiserror::Error)]
pub enum FillError {
    #[error("could not find route after {0} attempts")]
    RouteNotFound(usize),
    #[error("impossible plan: done is unreachable before any item is placed")]
    ImpossiblePlan,
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Randomized parts of the world other than item placement.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldConfig {
    pub seasons: BTreeMap<String, String>,   // area -> default season
    pub entrances: BTreeMap<String, String>, // entrance -> dungeon behind it
    pub portals: BTreeMap<String, String>,   // outer portal -> inner portal
    pub companion: Option<String>,
}

/// A completed attempt: the graph with its check edges in place, and the
/// placements as parallel lists (`used_items[i]` sits in `used_slots[i]`).
pub struct RouteInfo {
    pub graph: Graph,
    pub seed: usize,
    pub attempt_count: usize,
    pub used_items: Vec<NodeIdx>,
    pub used_slots: Vec<NodeIdx>,
    pub world: WorldConfig,
    // Continues the seed's stream for hints and anything else after the fill.
    pub rng: StdRng,
}

/// Unplaced items and unfilled slots, in shuffled order, plus what has been placed so far.
#[derive(Clone, Debug, Default)]
pub struct Pools {
    pub items: Vec<NodeIdx>,
    pub slots: Vec<NodeIdx>,
    pub used_items: Vec<NodeIdx>,
    pub used_slots: Vec<NodeIdx>,
}

pub struct Randomizer<'a> {
    pub game_data: &'a GameData,
    pub settings: &'a RandomizerSettings,
    pub player: PlayerIdx,
}

impl<'a> Randomizer<'a> {
    pub fn new(game_data: &'a GameData, settings: &'a RandomizerSettings) -> Self {
        Randomizer {
            game_data,
            settings,
            player: 0,
        }
    }

    /// Stamps the graphs this randomizer builds with `player`, for multiworld.
    pub fn with_player(mut self, player: PlayerIdx) -> Self {
        self.player = player;
        self
    }

    /// Runs attempts until one places every item with `done` still reachable.
    /// The RNG stream carries over from one attempt to the next.
    pub fn find_route(&self, seed: usize) -> Result<RouteInfo, FillError> {
        let mut rng = seeded_rng(seed);
        let max_attempts = self.settings.max_attempts;
        for attempt_num_rando in 1..=max_attempts {
            debug!("[attempt {attempt_num_rando}] Starting (seed {seed})");
            if let Some((graph, pools, world)) = self.attempt(attempt_num_rando, &mut rng)? {
                info!("[attempt {attempt_num_rando}] Found route for seed {seed}");
                return Ok(RouteInfo {
                    graph,
                    seed,
                    attempt_count: attempt_num_rando,
                    used_items: pools.used_items,
                    used_slots: pools.used_slots,
                    world,
                    rng,
                });
            }
        }
        Err(FillError::RouteNotFound(max_attempts))
    }

    fn attempt(
        &self,
        attempt_num_rando: usize,
        rng: &mut StdRng,
    ) -> Result<Option<(Graph, Pools, WorldConfig)>, FillError> {
        let game_data = self.game_data;
        let plan = &self.settings.plan;
        let mut graph = game_data.build_graph(self.player)?;
        let start = graph.idx(&game_data.start_node)?;
        let done = graph.idx(&game_data.done_node)?;
        if self.settings.is_hard() {
            let hard = graph.idx(&game_data.hard_node)?;
            graph.add_parent(hard, start);
        }

        let companion = roll_companion(&mut graph, game_data, plan, start, rng)?;
        let mut pools = self.init_pools(&graph, companion, rng)?;

        // Free items stay attached to start until they are placed.
        for &item in &pools.items {
            graph.add_parent(item, start);
        }

        let world = WorldConfig {
            seasons: roll_seasons(&mut graph, game_data, &plan.seasons, start, rng)?,
            portals: set_portals(
                &mut graph,
                game_data,
                self.settings.shuffle_portals,
                &plan.portals,
                rng,
            )?,
            entrances: set_dungeon_entrances(
                &mut graph,
                game_data,
                self.settings.shuffle_dungeons,
                &plan.dungeons,
                start,
                rng,
            )?,
            companion: companion.map(|c| c.name.clone()),
        };

        self.apply_planned_items(&mut graph, &mut pools, start)?;
        graph.reset();
        graph.explore(start);
        if !graph.is_reached(done) {
            if !plan.is_empty() {
                return Err(FillError::ImpossiblePlan);
            }
            info!("[attempt {attempt_num_rando}] Attempt failed: world configuration is not completable");
            return Ok(None);
        }

        if !self.try_place_items(attempt_num_rando, &mut graph, &mut pools, start, done) {
            return Ok(None);
        }

        // Items left over once every slot is filled are not in the game.
        for &item in &pools.items {
            graph.remove_parent(item, start);
        }
        graph.reset();
        graph.explore(start);
        if !graph.is_reached(done) {
            info!("[attempt {attempt_num_rando}] Attempt failed: all items placed but seed not completable");
            return Ok(None);
        }
        Ok(Some((graph, pools, world)))
    }

    /// Collects item and slot names, sorts and shuffles them. Seed trees get a
    /// balanced random choice of seeds; the flute placeholder becomes the
    /// rolled companion's flute.
    pub fn init_pools(
        &self,
        graph: &Graph,
        companion: Option<&Companion>,
        rng: &mut StdRng,
    ) -> Result<Pools, FillError> {
        let game_data = self.game_data;
        let slot_names: Vec<&String> = game_data
            .item_slots
            .iter()
            .filter(|(_, info)| !info.fixed)
            .map(|(name, _)| name)
            .collect();
        let num_trees = slot_names
            .iter()
            .filter(|s| game_data.is_seed_tree(s))
            .count();
        let mut tree_seeds = self.roll_tree_seeds(num_trees, rng).into_iter();

        let mut item_names: Vec<ItemName> = vec![];
        for &slot in &slot_names {
            if game_data.is_seed_tree(slot) {
                if let Some(seed) = tree_seeds.next() {
                    item_names.push(seed);
                }
                continue;
            }
            let item = &game_data.item_slots[slot].item;
            match companion {
                Some(c) if game_data.flute_placeholder.as_ref() == Some(item) => {
                    item_names.push(c.flute.clone())
                }
                _ => item_names.push(item.clone()),
            }
        }
        item_names.extend(game_data.extra_items.iter().cloned());

        let item_names = sorted_shuffle(item_names, rng);
        let slot_names = sorted_shuffle(slot_names, rng);
        let mut pools = Pools::default();
        for name in &item_names {
            pools.items.push(graph.idx(name)?);
        }
        for name in slot_names {
            pools.slots.push(graph.idx(name)?);
        }
        Ok(pools)
    }

    // Planned seeds count first; each further tree gets one of the least used seeds.
    fn roll_tree_seeds(&self, num_trees: usize, rng: &mut StdRng) -> Vec<ItemName> {
        let game_data = self.game_data;
        let mut counts: BTreeMap<&str, usize> = game_data
            .seed_items
            .iter()
            .map(|s| (s.as_str(), 0))
            .collect();
        let mut seeds: Vec<ItemName> = vec![];
        for item in self.settings.plan.items.values() {
            if let Some(count) = counts.get_mut(item.as_str()) {
                *count += 1;
                seeds.push(item.clone());
            }
        }
        while seeds.len() < num_trees {
            let Some(&min_count) = counts.values().min() else {
                break;
            };
            let candidates: Vec<&str> = counts
                .iter()
                .filter(|&(_, &count)| count == min_count)
                .map(|(&seed, _)| seed)
                .collect();
            let Some(&seed) = candidates.choose(rng) else {
                break;
            };
            *counts.entry(seed).or_default() += 1;
            seeds.push(seed.to_string());
        }
        seeds
    }

    /// Moves planned placements out of the pools and into the graph. A planned
    /// item that is not in the pool is added as an extra copy.
    pub fn apply_planned_items(
        &self,
        graph: &mut Graph,
        pools: &mut Pools,
        start: NodeIdx,
    ) -> Result<(), FillError> {
        for (slot_name, item_name) in &self.settings.plan.items {
            let Some(slot_pos) = pools.slots.iter().position(|&s| graph.name(s) == slot_name.as_str())
            else {
                return Err(FillError::InvalidPlan(format!(
                    "unknown plan slot: {slot_name:?}"
                )));
            };
            let item = match pools.items.iter().position(|&i| graph.name(i) == item_name.as_str()) {
                Some(item_pos) => {
                    let item = pools.items.remove(item_pos);
                    graph.remove_parent(item, start);
                    item
                }
                None if self.game_data.items.contains_key(item_name) => graph.idx(item_name)?,
                None => {
                    return Err(FillError::InvalidPlan(format!(
                        "unknown plan item: {item_name:?}"
                    )))
                }
            };
            let slot = pools.slots.remove(slot_pos);
            graph.add_parent(item, slot);
            pools.used_items.push(item);
            pools.used_slots.push(slot);
        }
        Ok(())
    }

    /// Places items one at a time until either pool runs out. Returns false if
    /// some remaining item could not be placed anywhere.
    pub fn try_place_items(
        &self,
        attempt_num_rando: usize,
        graph: &mut Graph,
        pools: &mut Pools,
        start: NodeIdx,
        done: NodeIdx,
    ) -> bool {
        while !pools.items.is_empty() && !pools.slots.is_empty() {
            debug!(
                "[attempt {attempt_num_rando}] Filling {} more slots ({} more items)",
                pools.slots.len(),
                pools.items.len()
            );
            match self.try_slot_random_item(graph, pools, start, done) {
                Some((item_pos, slot_pos)) => {
                    let item = pools.items.remove(item_pos);
                    let slot = pools.slots.remove(slot_pos);
                    debug!(
                        "[attempt {attempt_num_rando}] Placing {} <- {}",
                        graph.name(slot),
                        graph.name(item)
                    );
                    pools.used_items.push(item);
                    pools.used_slots.push(slot);
                }
                None => {
                    let unplaced: Vec<&str> = pools.items.iter().map(|&i| graph.name(i)).collect();
                    let unfilled: Vec<&str> = pools.slots.iter().map(|&s| graph.name(s)).collect();
                    info!(
                        "[attempt {attempt_num_rando}] Attempt failed: unplaced items {:?}, unfilled slots {:?}",
                        unplaced, unfilled
                    );
                    return false;
                }
            }
        }
        true
    }

    /// Finds the first item (in pool order) that fits some slot without
    /// breaking completability. Progression items go first; inert items are
    /// only tried once no progression item is left. On success the check edge
    /// is in the graph and the pool positions are returned.
    pub fn try_slot_random_item(
        &self,
        graph: &mut Graph,
        pools: &Pools,
        start: NodeIdx,
        done: NodeIdx,
    ) -> Option<(usize, usize)> {
        let mut tried_progression = false;
        for progression_only in [true, false] {
            if !progression_only && tried_progression {
                return None;
            }
            for item_pos in 0..pools.items.len() {
                let item = pools.items[item_pos];
                if progression_only && self.item_is_inert(graph.name(item)) {
                    continue;
                }
                graph.remove_parent(item, start);
                tried_progression = true;

                for slot_pos in 0..pools.slots.len() {
                    let slot = pools.slots[slot_pos];
                    if !self.item_fits_in_slot(graph.name(item), graph.name(slot)) {
                        continue;
                    }
                    if self.dungeons_overfilled(graph, pools, item_pos, slot_pos) {
                        continue;
                    }

                    graph.add_parent(item, slot);
                    graph.reset();
                    graph.explore(start);
                    if !graph.is_reached(done) {
                        graph.remove_parent(item, slot);
                        continue;
                    }
                    if self.is_dead_end(graph, pools, item_pos, slot_pos, start) {
                        graph.remove_parent(item, slot);
                        continue;
                    }
                    return Some((item_pos, slot_pos));
                }

                graph.add_parent(item, start);
            }
        }
        None
    }

    pub fn item_is_inert(&self, item: &str) -> bool {
        self.game_data.is_inert(item)
    }

    /// Static placement rules, checked before touching the graph.
    pub fn item_fits_in_slot(&self, item: &str, slot: &str) -> bool {
        let game_data = self.game_data;
        if game_data
            .restricted_slots
            .get(slot)
            .is_some_and(|only| only != item)
        {
            return false;
        }
        if game_data
            .restricted_items
            .get(item)
            .is_some_and(|only| only != slot)
        {
            return false;
        }
        if game_data
            .forbidden_placements
            .get(item)
            .is_some_and(|slots| slots.iter().any(|s| s == slot))
        {
            return false;
        }

        // Dungeon items stay in their dungeon (or a sub-area of it, like "d6 past").
        if let Some(dungeon) = game_data.dungeon_of(item) {
            let fits = game_data.dungeon_of(slot).is_some_and(|slot_dungeon| {
                slot_dungeon
                    .strip_prefix(dungeon)
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with(' '))
            });
            if !fits {
                return false;
            }
        }

        game_data.is_seed(item) == game_data.is_seed_tree(slot)
    }

    /// True if some dungeon would have more of its own items left than slots
    /// left, not counting the item and slot under consideration.
    pub fn dungeons_overfilled(
        &self,
        graph: &Graph,
        pools: &Pools,
        item_pos: usize,
        slot_pos: usize,
    ) -> bool {
        let game_data = self.game_data;
        game_data.dungeons.iter().any(|dungeon| {
            let in_dungeon = |idx: NodeIdx| game_data.dungeon_of(graph.name(idx)) == Some(dungeon.as_str());
            let num_items = pools
                .items
                .iter()
                .enumerate()
                .filter(|&(i, &item)| i != item_pos && in_dungeon(item))
                .count();
            let num_slots = pools
                .slots
                .iter()
                .enumerate()
                .filter(|&(i, &slot)| i != slot_pos && in_dungeon(slot))
                .count();
            num_items > num_slots
        })
    }

    /// True if, with every other unplaced item taken away, no unfilled slot
    /// besides the current one is reachable. The last slot is never a dead end.
    pub fn is_dead_end(
        &self,
        graph: &mut Graph,
        pools: &Pools,
        item_pos: usize,
        slot_pos: usize,
        start: NodeIdx,
    ) -> bool {
        if pools.slots.len() == 1 {
            return false;
        }
        for (i, &item) in pools.items.iter().enumerate() {
            if i != item_pos {
                graph.remove_parent(item, start);
            }
        }
        graph.reset();
        graph.explore(start);
        let dead = !pools
            .slots
            .iter()
            .enumerate()
            .any(|(i, &slot)| i != slot_pos && graph.is_reached(slot));
        for (i, &item) in pools.items.iter().enumerate() {
            if i != item_pos {
                graph.add_parent(item, start);
            }
        }
        dead
    }
}
