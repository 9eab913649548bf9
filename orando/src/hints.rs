use crate::helpers::sorted_shuffle;
use crate::randomize::FillError;
use crate::spoiler_log::Checks;
use hashbrown::HashSet;
use log::{debug, warn};
use orando_game::{GameData, ItemName, SlotName};
use orando_logic::{Graph, NodeIdx};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Hint {
    pub slot: SlotName,
    pub item: ItemName,
}

/// Hint location -> the check it talks about.
pub type Hints = BTreeMap<String, Hint>;

/// True if `target` can't be reached without the item in `slot`. The check
/// edge is always put back.
pub fn is_check_required(
    graph: &mut Graph,
    start: NodeIdx,
    slot: NodeIdx,
    item: NodeIdx,
    target: NodeIdx,
) -> bool {
    graph.remove_parent(item, slot);
    graph.reset();
    graph.explore(start);
    let required = !graph.is_reached(target);
    graph.add_parent(item, slot);
    required
}

// Dungeon items and unhintable slots make poor hints.
fn hintable_slots<R: Rng + ?Sized>(
    graph: &Graph,
    checks: &Checks,
    game_data: &GameData,
    rng: &mut R,
) -> Vec<NodeIdx> {
    let names: Vec<&str> = checks
        .iter()
        .filter(|&(_, &item)| game_data.dungeon_of(graph.name(item)).is_none())
        .map(|(&slot, _)| graph.name(slot))
        .filter(|&slot| !game_data.unhintable_slots.contains(slot))
        .collect();
    let names = sorted_shuffle(names, rng);
    let by_name: BTreeMap<&str, NodeIdx> = checks.keys().map(|&s| (graph.name(s), s)).collect();
    names.iter().filter_map(|name| by_name.get(name).copied()).collect()
}

/// Picks a check to hint at each hint location. A hint never names a check
/// that is needed to reach its own location, unless the location can't be
/// reached at all. Planned hints (location -> slot) are used as given.
pub fn generate_hints<R: Rng + ?Sized>(
    graph: &mut Graph,
    checks: &Checks,
    hint_locations: &[String],
    game_data: &GameData,
    planned: &BTreeMap<String, SlotName>,
    rng: &mut R,
) -> Result<Hints, FillError> {
    let start = graph.idx(&game_data.start_node)?;
    let mut hints = Hints::new();
    let mut hinted: HashSet<NodeIdx> = HashSet::new();

    for (location, slot_name) in planned {
        if !hint_locations.contains(location) {
            return Err(FillError::InvalidPlan(format!(
                "unknown hint location: {location:?}"
            )));
        }
        let Some((&slot, &item)) = checks.iter().find(|&(&s, _)| graph.name(s) == slot_name.as_str())
        else {
            return Err(FillError::InvalidPlan(format!(
                "hint names unknown slot: {slot_name:?}"
            )));
        };
        hinted.insert(slot);
        hints.insert(
            location.clone(),
            Hint {
                slot: slot_name.clone(),
                item: graph.name(item).to_string(),
            },
        );
    }

    let slots = hintable_slots(graph, checks, game_data, rng);
    let mut locations: Vec<&String> = hint_locations.iter().collect();
    locations.sort();
    let mut i = 0;
    for location in locations {
        if hints.contains_key(location.as_str()) {
            continue;
        }
        let target = graph.idx(location)?;
        graph.reset();
        graph.explore(start);
        let unreachable = !graph.is_reached(target);

        let mut chosen = None;
        for _ in 0..slots.len() {
            let slot = slots[i];
            i = (i + 1) % slots.len();
            if hinted.contains(&slot) {
                continue;
            }
            let item = checks[&slot];
            if unreachable || !is_check_required(graph, start, slot, item, target) {
                chosen = Some((slot, item));
                break;
            }
        }

        match chosen {
            Some((slot, item)) => {
                debug!("Hint at {location}: {} holds {}", graph.name(slot), graph.name(item));
                hinted.insert(slot);
                hints.insert(
                    location.clone(),
                    Hint {
                        slot: graph.name(slot).to_string(),
                        item: graph.name(item).to_string(),
                    },
                );
            }
            None => warn!("No hint available for {location}"),
        }
    }
    Ok(hints)
}
