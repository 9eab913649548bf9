use crate::randomize::{FillError, Randomizer, RouteInfo};
use crate::settings::RandomizerSettings;
use crate::spoiler_log::{explore_from, spheres_from, Checks};
use hashbrown::{HashMap, HashSet};
use log::{debug, info};
use orando_game::{GameData, ItemName, SlotName};
use orando_logic::{Graph, NodeIdx, PlayerIdx};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// Draws in a row without a successful swap involving a fresh slot.
const MAX_CONSECUTIVE_MISSES: usize = 1000;
// Spheres in a row a player may go without a new check before finishing.
const MAX_DROUGHT: usize = 2;

/// An item and the player it belongs to.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MultiCheck {
    pub player: PlayerIdx,
    pub item: ItemName,
}

/// One player's part of a multiworld seed. Node indices point into the shared
/// graph; `route.graph` keeps the player's own layout from before swapping.
pub struct PlayerWorld {
    pub route: RouteInfo,
    pub offset: NodeIdx,
    pub start: NodeIdx,
    pub done: NodeIdx,
    pub checks: Checks,
    // Slots open to swapping, sorted by name.
    eligible: Vec<NodeIdx>,
}

/// Routes of several players joined into one graph, so that an item of one
/// player can sit in a slot of another. Players are numbered from 1.
pub struct MultiWorld<'a> {
    randomizer: Randomizer<'a>,
    pub graph: Graph,
    pub players: Vec<PlayerWorld>,
    pub swaps: usize,
}

impl<'a> MultiWorld<'a> {
    /// Joins `routes`; route `i` must have been built for player `i + 1`.
    pub fn new(randomizer: Randomizer<'a>, routes: Vec<RouteInfo>) -> Result<Self, FillError> {
        let game_data = randomizer.game_data;
        let mut graph = Graph::new();
        let mut players = Vec::with_capacity(routes.len());
        for (i, route) in routes.into_iter().enumerate() {
            let player = i + 1;
            if route.graph.nodes().iter().any(|node| node.player != player) {
                return Err(FillError::InvalidPlan(format!(
                    "route {player} was not built for player {player}"
                )));
            }
            let offset = graph.append(&route.graph, &format!("p{player} "))?;
            let start = offset + route.graph.idx(&game_data.start_node)?;
            let done = offset + route.graph.idx(&game_data.done_node)?;
            let checks: Checks = route
                .used_slots
                .iter()
                .zip(&route.used_items)
                .map(|(&slot, &item)| (offset + slot, offset + item))
                .collect();
            players.push(PlayerWorld {
                route,
                offset,
                start,
                done,
                checks,
                eligible: vec![],
            });
        }

        let mut world = MultiWorld {
            randomizer,
            graph,
            players,
            swaps: 0,
        };
        for p in 0..world.players.len() {
            let mut eligible: Vec<NodeIdx> = world.players[p]
                .checks
                .iter()
                .filter(|&(&slot, &item)| world.is_eligible(slot, item))
                .map(|(&slot, _)| slot)
                .collect();
            eligible.sort_by(|&a, &b| world.graph.name(a).cmp(world.graph.name(b)));
            world.players[p].eligible = eligible;
        }
        Ok(world)
    }

    /// Name of a shared-graph node in its player's own graph.
    pub fn base_name(&self, idx: NodeIdx) -> &str {
        let world = &self.players[self.graph.node(idx).player - 1];
        world.route.graph.name(idx - world.offset)
    }

    // Local slots and dungeon items stay with their player.
    fn is_eligible(&self, slot: NodeIdx, item: NodeIdx) -> bool {
        let game_data = self.randomizer.game_data;
        let item = self.base_name(item);
        !game_data
            .item_slots
            .get(self.base_name(slot))
            .is_some_and(|info| info.local)
            && game_data.dungeon_of(item).is_none()
            && !game_data.is_key(item)
    }

    fn fits(&self, item: NodeIdx, slot: NodeIdx) -> bool {
        self.randomizer
            .item_fits_in_slot(self.base_name(item), self.base_name(slot))
    }

    fn starts(&self) -> Vec<NodeIdx> {
        self.players.iter().map(|p| p.start).collect()
    }

    /// True if every player can finish.
    pub fn is_completable(&mut self) -> bool {
        let starts = self.starts();
        explore_from(&mut self.graph, &starts);
        self.players.iter().all(|p| self.graph.is_reached(p.done))
    }

    /// True if some player goes `limit` spheres in a row without a check of
    /// their own before reaching their last one.
    pub fn player_has_drought(&mut self, limit: usize) -> bool {
        let game_data = self.randomizer.game_data;
        let starts = self.starts();
        let mut checks = Checks::new();
        for world in &self.players {
            checks.extend(&world.checks);
        }
        let keys: HashSet<NodeIdx> = checks
            .iter()
            .filter(|&(_, &item)| game_data.is_key(self.base_name(item)))
            .map(|(&slot, _)| slot)
            .collect();
        let spheres = spheres_from(&mut self.graph, &starts, &checks, &keys);

        let num_players = self.players.len();
        let mut final_sphere = vec![0; num_players];
        for (i, sphere) in spheres.spheres.iter().enumerate() {
            for &slot in sphere {
                let p = self.graph.node(slot).player - 1;
                final_sphere[p] = final_sphere[p].max(i);
            }
        }
        let mut drought = vec![0; num_players];
        for (i, sphere) in spheres.spheres.iter().enumerate() {
            for p in 0..num_players {
                if i > final_sphere[p] {
                    continue;
                }
                if sphere.iter().any(|&slot| self.graph.node(slot).player == p + 1) {
                    drought[p] = 0;
                } else {
                    drought[p] += 1;
                    if drought[p] >= limit {
                        return true;
                    }
                }
            }
        }
        false
    }

    // Exchanges the items in two slots, edges and check maps both.
    fn swap(&mut self, p1: usize, slot1: NodeIdx, p2: usize, slot2: NodeIdx) {
        let item1 = self.players[p1].checks[&slot1];
        let item2 = self.players[p2].checks[&slot2];
        self.graph.remove_parent(item1, slot1);
        self.graph.remove_parent(item2, slot2);
        self.graph.add_parent(item1, slot2);
        self.graph.add_parent(item2, slot1);
        self.players[p1].checks.insert(slot1, item2);
        self.players[p2].checks.insert(slot2, item1);
    }

    /// Swaps random checks between players as long as every player can still
    /// finish without a long wait on the others. Stops once a run of draws
    /// finds nothing new to swap. Returns the number of swaps made.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) -> usize {
        let candidates: Vec<usize> = (0..self.players.len())
            .filter(|&p| !self.players[p].eligible.is_empty())
            .collect();
        if candidates.len() < 2 {
            info!("Multiworld: fewer than two players with swappable checks");
            return 0;
        }

        let mut swap_counts: HashMap<NodeIdx, usize> = HashMap::new();
        let mut swaps = 0;
        let mut misses = 0;
        while misses < MAX_CONSECUTIVE_MISSES {
            let Some(&p1) = candidates.choose(rng) else {
                break;
            };
            let others: Vec<usize> = candidates.iter().copied().filter(|&p| p != p1).collect();
            let Some(&p2) = others.choose(rng) else {
                break;
            };
            let (Some(&slot1), Some(&slot2)) = (
                self.players[p1].eligible.choose(rng),
                self.players[p2].eligible.choose(rng),
            ) else {
                break;
            };
            let item1 = self.players[p1].checks[&slot1];
            let item2 = self.players[p2].checks[&slot2];

            misses += 1;
            if !self.fits(item2, slot1) || !self.fits(item1, slot2) {
                continue;
            }
            let swapped = |slot: NodeIdx| swap_counts.get(&slot).is_some_and(|&n| n > 0);
            if swapped(slot1) && swapped(slot2) {
                continue;
            }

            debug!(
                "Swapping {} <- p{} {} with {} <- p{} {}",
                self.graph.name(slot1),
                self.graph.node(item1).player,
                self.base_name(item1),
                self.graph.name(slot2),
                self.graph.node(item2).player,
                self.base_name(item2)
            );
            self.swap(p1, slot1, p2, slot2);
            if self.is_completable() && !self.player_has_drought(MAX_DROUGHT) {
                misses = 0;
                swaps += 1;
                *swap_counts.entry(slot1).or_default() += 1;
                *swap_counts.entry(slot2).or_default() += 1;
            } else {
                self.swap(p1, slot1, p2, slot2);
                debug!("Swap undone");
            }
        }

        let starts = self.starts();
        explore_from(&mut self.graph, &starts);
        info!("Multiworld: made {swaps} swaps");
        self.swaps += swaps;
        swaps
    }

    /// Slot -> item for each player (index 0 is player 1), fixed slots included.
    pub fn player_checks(&self) -> Vec<BTreeMap<SlotName, MultiCheck>> {
        let game_data = self.randomizer.game_data;
        self.players
            .iter()
            .enumerate()
            .map(|(i, world)| {
                let mut checks: BTreeMap<SlotName, MultiCheck> = world
                    .checks
                    .iter()
                    .map(|(&slot, &item)| {
                        let check = MultiCheck {
                            player: self.graph.node(item).player,
                            item: self.base_name(item).to_string(),
                        };
                        (self.base_name(slot).to_string(), check)
                    })
                    .collect();
                for (slot, info) in &game_data.item_slots {
                    if info.fixed {
                        let check = MultiCheck {
                            player: i + 1,
                            item: info.item.clone(),
                        };
                        checks.insert(slot.clone(), check);
                    }
                }
                checks
            })
            .collect()
    }
}

/// Finds a route for each player (player `p` uses seed `seed + p - 1`), then
/// swaps checks between them. The swaps continue player 1's RNG stream.
pub fn find_multiworld<'a>(
    game_data: &'a GameData,
    settings: &'a RandomizerSettings,
    seed: usize,
    num_players: usize,
) -> Result<MultiWorld<'a>, FillError> {
    if num_players == 0 {
        return Err(FillError::InvalidPlan(
            "multiworld needs at least one player".to_string(),
        ));
    }
    let mut routes = Vec::with_capacity(num_players);
    for player in 1..=num_players {
        let route = Randomizer::new(game_data, settings)
            .with_player(player)
            .find_route(seed.wrapping_add(player - 1))?;
        info!(
            "Player {player}: route found after {} attempts",
            route.attempt_count
        );
        routes.push(route);
    }

    let mut world = MultiWorld::new(Randomizer::new(game_data, settings), routes)?;
    let mut rng = world.players[0].route.rng.clone();
    world.shuffle(&mut rng);
    world.players[0].route.rng = rng;
    Ok(world)
}
