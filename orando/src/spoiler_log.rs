use crate::hints::Hints;
use crate::randomize::RouteInfo;
use crate::settings::Difficulty;
use hashbrown::HashSet;
use log::debug;
use orando_game::{GameData, ItemName, SlotName};
use orando_logic::{Graph, GraphError, NodeIdx};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Slot -> item placements of a finished route.
pub type Checks = BTreeMap<NodeIdx, NodeIdx>;

const RUPEE_CLASS: &str = "rupees";

/// Every check of the route, including the fixed slots of the game description.
pub fn get_checks(route: &RouteInfo, game_data: &GameData) -> Result<Checks, GraphError> {
    let graph = &route.graph;
    let mut checks: Checks = route
        .used_slots
        .iter()
        .copied()
        .zip(route.used_items.iter().copied())
        .collect();
    for (slot, info) in &game_data.item_slots {
        if info.fixed {
            checks.insert(graph.idx(slot)?, graph.idx(&info.item)?);
        }
    }
    Ok(checks)
}

pub fn check_names(graph: &Graph, checks: &Checks) -> BTreeMap<SlotName, ItemName> {
    checks
        .iter()
        .map(|(&slot, &item)| (graph.name(slot).to_string(), graph.name(item).to_string()))
        .collect()
}

#[derive(Clone, Debug, Default)]
pub struct Spheres {
    /// Slots first reachable in each sphere, sorted by name.
    pub spheres: Vec<Vec<NodeIdx>>,
    /// Every node first reached in each sphere.
    pub nodes: Vec<Vec<NodeIdx>>,
    /// Slots that are never reached.
    pub inaccessible: Vec<NodeIdx>,
}

impl Spheres {
    pub fn sphere_of(&self, slot: NodeIdx) -> Option<usize> {
        self.spheres.iter().position(|sphere| sphere.contains(&slot))
    }
}

fn sort_by_name(graph: &Graph, nodes: &mut [NodeIdx]) {
    nodes.sort_by(|&a, &b| graph.name(a).cmp(graph.name(b)));
}

/// Splits the checks into spheres: sphere 0 is what can be reached with no
/// items, sphere 1 what the items of sphere 0 open up, and so on. Dungeon keys
/// stay attached throughout so they don't split spheres. Every check edge is
/// in place again on return.
pub fn get_spheres(
    graph: &mut Graph,
    checks: &Checks,
    game_data: &GameData,
) -> Result<Spheres, GraphError> {
    let start = graph.idx(&game_data.start_node)?;
    let keys: HashSet<NodeIdx> = checks
        .iter()
        .filter(|&(_, &item)| game_data.is_key(graph.name(item)))
        .map(|(&slot, _)| slot)
        .collect();
    Ok(spheres_from(graph, &[start], checks, &keys))
}

/// Sphere analysis from several start nodes at once. Checks in `attached`
/// keep their edge the whole time.
pub fn spheres_from(
    graph: &mut Graph,
    starts: &[NodeIdx],
    checks: &Checks,
    attached: &HashSet<NodeIdx>,
) -> Spheres {
    let mut detached: BTreeMap<NodeIdx, NodeIdx> = BTreeMap::new();
    for (&slot, &item) in checks {
        if !attached.contains(&slot) {
            graph.remove_parent(item, slot);
            detached.insert(slot, item);
        }
    }

    let mut result = Spheres::default();
    let mut slots_seen: HashSet<NodeIdx> = HashSet::new();
    let mut nodes_seen = vec![false; graph.len()];
    loop {
        explore_from(graph, starts);
        let mut sphere: Vec<NodeIdx> = checks
            .keys()
            .copied()
            .filter(|&slot| !slots_seen.contains(&slot) && graph.is_reached(slot))
            .collect();
        if sphere.is_empty() {
            break;
        }
        let mut nodes = vec![];
        for idx in 0..graph.len() {
            if graph.is_reached(idx) && !nodes_seen[idx] {
                nodes_seen[idx] = true;
                nodes.push(idx);
            }
        }
        for &slot in &sphere {
            slots_seen.insert(slot);
            if let Some(item) = detached.remove(&slot) {
                graph.add_parent(item, slot);
            }
        }
        sort_by_name(graph, &mut sphere);
        sort_by_name(graph, &mut nodes);
        debug!("Sphere {}: {} slots", result.spheres.len(), sphere.len());
        result.spheres.push(sphere);
        result.nodes.push(nodes);
    }

    for (slot, item) in detached {
        graph.add_parent(item, slot);
    }
    result.inaccessible = checks
        .keys()
        .copied()
        .filter(|slot| !slots_seen.contains(slot))
        .collect();
    sort_by_name(graph, &mut result.inaccessible);

    explore_from(graph, starts);
    result
}

/// Fresh pass exploring from every node in `starts`.
pub fn explore_from(graph: &mut Graph, starts: &[NodeIdx]) {
    graph.reset();
    graph.explore_all(starts);
}

// All rupee items count as one class, so a pile of small rupees can be
// progression together.
fn item_class<'a>(game_data: &GameData, item: &'a str) -> &'a str {
    if game_data.rupee_values.get(item).is_some_and(|&v| v > 0) && game_data.items.contains_key(item)
    {
        RUPEE_CLASS
    } else {
        item
    }
}

/// Splits checks into progression and junk. For each item class, every
/// instance is taken out and then put back in sphere order until `done` is
/// reachable again; the instances put back are progression. Rupees that turn
/// out not to matter individually are demoted to junk. The graph is left with
/// every check edge in place.
pub fn filter_junk(
    graph: &mut Graph,
    checks: &Checks,
    game_data: &GameData,
) -> Result<(Checks, Checks), GraphError> {
    let start = graph.idx(&game_data.start_node)?;
    let done = graph.idx(&game_data.done_node)?;
    let spheres = get_spheres(graph, checks, game_data)?;
    let sphere_order: Vec<NodeIdx> = spheres.spheres.iter().flatten().copied().collect();

    let mut classes: Vec<&str> = checks
        .values()
        .map(|&item| item_class(game_data, graph.name(item)))
        .collect();
    classes.sort();
    classes.dedup();
    let classes: Vec<String> = classes.into_iter().map(|c| c.to_string()).collect();

    let mut prog = Checks::new();
    for class in &classes {
        if class != RUPEE_CLASS && game_data.is_inert(class) {
            continue;
        }
        let mut removed: BTreeMap<NodeIdx, NodeIdx> = BTreeMap::new();
        for (&slot, &item) in checks {
            if item_class(game_data, graph.name(item)) == class {
                graph.remove_parent(item, slot);
                removed.insert(slot, item);
            }
        }

        graph.reset();
        graph.explore(start);
        while !graph.is_reached(done) {
            let Some(slot) = sphere_order.iter().copied().find(|s| removed.contains_key(s)) else {
                break;
            };
            if let Some(item) = removed.remove(&slot) {
                graph.add_parent(item, slot);
                prog.insert(slot, item);
            }
            graph.reset();
            graph.explore(start);
        }

        for (slot, item) in removed {
            graph.add_parent(item, slot);
        }
    }

    // Rupees can only be judged once every other class is settled.
    let is_rupee = |graph: &Graph, item: NodeIdx| item_class(game_data, graph.name(item)) == RUPEE_CLASS;
    let junk_rupees: Vec<(NodeIdx, NodeIdx)> = checks
        .iter()
        .filter(|&(slot, &item)| is_rupee(graph, item) && !prog.contains_key(slot))
        .map(|(&slot, &item)| (slot, item))
        .collect();
    for &(slot, item) in &junk_rupees {
        graph.remove_parent(item, slot);
    }
    let prog_rupees: Vec<(NodeIdx, NodeIdx)> = prog
        .iter()
        .filter(|&(_, &item)| is_rupee(graph, item))
        .map(|(&slot, &item)| (slot, item))
        .collect();
    let mut trivial = vec![];
    for (slot, item) in prog_rupees {
        graph.remove_parent(item, slot);
        graph.reset();
        graph.explore(start);
        if graph.is_reached(done) {
            debug!("{} in {} is not needed", graph.name(item), graph.name(slot));
            trivial.push(slot);
        }
        graph.add_parent(item, slot);
    }
    for slot in trivial {
        prog.remove(&slot);
    }
    for (slot, item) in junk_rupees {
        graph.add_parent(item, slot);
    }

    let junk: Checks = checks
        .iter()
        .filter(|(slot, _)| !prog.contains_key(*slot))
        .map(|(&slot, &item)| (slot, item))
        .collect();
    graph.reset();
    graph.explore(start);
    Ok((prog, junk))
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SpoilerSphere {
    pub sphere: usize,
    pub checks: BTreeMap<SlotName, ItemName>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SpoilerChecks {
    pub spheres: Vec<SpoilerSphere>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub inaccessible: BTreeMap<SlotName, ItemName>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SpoilerLog {
    pub seed: usize,
    pub attempts: usize,
    pub difficulty: Difficulty,
    pub progression: SpoilerChecks,
    pub keys: SpoilerChecks,
    pub other: SpoilerChecks,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub dungeon_entrances: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub portals: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub seasons: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub companion: Option<String>,
    pub hints: Hints,
}

// Lays out a subset of the checks by sphere, leaving out empty spheres.
fn group_by_sphere(graph: &Graph, checks: &Checks, spheres: &Spheres) -> SpoilerChecks {
    let mut out = SpoilerChecks::default();
    for (i, sphere) in spheres.spheres.iter().enumerate() {
        let group: BTreeMap<SlotName, ItemName> = sphere
            .iter()
            .filter_map(|slot| checks.get(slot).map(|&item| (*slot, item)))
            .map(|(slot, item)| (graph.name(slot).to_string(), graph.name(item).to_string()))
            .collect();
        if !group.is_empty() {
            out.spheres.push(SpoilerSphere {
                sphere: i,
                checks: group,
            });
        }
    }
    out.inaccessible = spheres
        .inaccessible
        .iter()
        .filter_map(|slot| checks.get(slot).map(|&item| (*slot, item)))
        .map(|(slot, item)| (graph.name(slot).to_string(), graph.name(item).to_string()))
        .collect();
    out
}

pub fn get_spoiler_log(
    route: &mut RouteInfo,
    game_data: &GameData,
    difficulty: Difficulty,
    hints: &Hints,
) -> Result<SpoilerLog, GraphError> {
    let checks = get_checks(route, game_data)?;
    let graph = &mut route.graph;
    let spheres = get_spheres(graph, &checks, game_data)?;

    let (key_checks, non_key_checks): (Checks, Checks) = checks
        .iter()
        .map(|(&slot, &item)| (slot, item))
        .partition(|&(_, item)| game_data.is_key(graph.name(item)));
    let (prog, junk) = filter_junk(graph, &non_key_checks, game_data)?;

    Ok(SpoilerLog {
        seed: route.seed,
        attempts: route.attempt_count,
        difficulty,
        progression: group_by_sphere(graph, &prog, &spheres),
        keys: group_by_sphere(graph, &key_checks, &spheres),
        other: group_by_sphere(graph, &junk, &spheres),
        dungeon_entrances: route.world.entrances.clone(),
        portals: route.world.portals.clone(),
        seasons: route.world.seasons.clone(),
        companion: route.world.companion.clone(),
        hints: hints.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use orando_game::{GameDescription, LogicValue};
    use serde_json::json;

    fn game_data(description: serde_json::Value, logic: serde_json::Value) -> GameData {
        let description: GameDescription = serde_json::from_value(description).unwrap();
        let entries: orando_game::logic::LogicEntries = serde_json::from_value(logic).unwrap();
        let entries: Vec<(String, LogicValue)> = entries.0;
        GameData::new(description, entries).unwrap()
    }

    // start -> chest (sword) -> cave (bombs) -> d1 chest (d1 key) -> d1 boss;
    // the heart sits next to the start and the vault is never reachable.
    fn chain_world() -> GameData {
        game_data(
            json!({
                "items": {
                    "sword": {},
                    "bombs": {},
                    "d1 small key": {"key": true},
                    "heart": {"inert": true},
                    "feather": {},
                    "rupees, 20": {},
                    "rupees, 50": {},
                    "rupees, 1": {}
                },
                "item_slots": {
                    "chest": {"item": "sword"},
                    "field": {"item": "heart"},
                    "cave": {"item": "bombs"},
                    "d1 chest": {"item": "d1 small key"},
                    "d1 boss chest": {"item": "rupees, 20"},
                    "shore": {"item": "rupees, 50"},
                    "pond": {"item": "rupees, 1"},
                    "vault": {"item": "feather"}
                },
                "dungeons": ["d1"],
                "rupee_values": {"rupees, 20": 20, "rupees, 50": 50, "rupees, 1": 1}
            }),
            json!({
                "start": [],
                "hard": {"or": []},
                "chest": ["start"],
                "field": ["start"],
                "shore": ["start"],
                "pond": ["start"],
                "cave": ["sword"],
                "d1 chest": ["bombs"],
                "d1 boss chest": ["d1 chest", "d1 small key"],
                "shop": {"rupees": [60, ["rupees, 20", "rupees, 50", "rupees, 1"]]},
                "vault": ["feather"],
                "done": ["d1 boss chest", "shop"]
            }),
        )
    }

    fn placed(game_data: &GameData) -> (Graph, Checks) {
        let mut graph = game_data.build_graph(0).unwrap();
        let mut checks = Checks::new();
        for (slot, info) in &game_data.item_slots {
            let (slot, item) = (graph.idx(slot).unwrap(), graph.idx(&info.item).unwrap());
            graph.add_parent(item, slot);
            checks.insert(slot, item);
        }
        (graph, checks)
    }

    fn names(graph: &Graph, nodes: &[NodeIdx]) -> Vec<String> {
        nodes.iter().map(|&n| graph.name(n).to_string()).collect()
    }

    #[test]
    fn spheres_follow_item_order() {
        let game_data = chain_world();
        let (mut graph, checks) = placed(&game_data);
        let edges_before = graph.num_edges();
        let spheres = get_spheres(&mut graph, &checks, &game_data).unwrap();
        assert_eq!(
            names(&graph, &spheres.spheres[0]),
            vec!["chest", "field", "pond", "shore"]
        );
        assert_eq!(names(&graph, &spheres.spheres[1]), vec!["cave"]);
        // The key stays attached, so the boss chest shares a sphere with it.
        assert_eq!(
            names(&graph, &spheres.spheres[2]),
            vec!["d1 boss chest", "d1 chest"]
        );
        assert_eq!(spheres.spheres.len(), 3);
        assert_eq!(names(&graph, &spheres.inaccessible), vec!["vault"]);
        assert_eq!(spheres.sphere_of(graph.idx("cave").unwrap()), Some(1));

        let sword = graph.idx("sword").unwrap();
        assert!(spheres.nodes[1].contains(&sword));
        assert!(!spheres.nodes[0].contains(&sword));

        assert_eq!(graph.num_edges(), edges_before);
        for (&slot, &item) in &checks {
            assert!(graph.has_parent(item, slot));
        }
    }

    #[test]
    fn junk_is_everything_done_can_skip() {
        let game_data = chain_world();
        let (mut graph, checks) = placed(&game_data);
        let edges_before = graph.num_edges();
        let (prog, junk) = filter_junk(&mut graph, &checks, &game_data).unwrap();
        let mut prog_names: Vec<String> = prog.keys().map(|&s| graph.name(s).to_string()).collect();
        prog_names.sort();
        // 20 + 50 covers the 60 rupee price; the single rupee is not needed.
        assert_eq!(
            prog_names,
            vec!["cave", "chest", "d1 boss chest", "d1 chest", "shore"]
        );
        assert!(junk.contains_key(&graph.idx("pond").unwrap()));
        assert!(junk.contains_key(&graph.idx("field").unwrap()));
        assert!(junk.contains_key(&graph.idx("vault").unwrap()));
        assert_eq!(prog.len() + junk.len(), checks.len());
        assert_eq!(graph.num_edges(), edges_before);
        assert!(graph.is_reached(graph.idx("done").unwrap()));
    }

    #[test]
    fn check_names_are_by_slot() {
        let game_data = chain_world();
        let (graph, checks) = placed(&game_data);
        let named = check_names(&graph, &checks);
        assert_eq!(named["cave"], "bombs");
        assert_eq!(named.len(), game_data.item_slots.len());
    }
}
