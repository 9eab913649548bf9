use super::FillError;
use crate::settings::Plan;
use log::debug;
use orando_game::{
    enter_dungeon_node, enter_portal_node, entrance_node, exit_portal_node, season_node, Companion,
    GameData,
};
use orando_logic::{Graph, NodeIdx};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;

fn move_to_back(values: &mut Vec<String>, value: &str) {
    if let Some(pos) = values.iter().position(|v| v == value) {
        let v = values.remove(pos);
        values.push(v);
    }
}

// Checks that a planned mapping is a partial one-to-one pairing of `keys` with `values`.
fn check_pairing(
    what: &str,
    plan: &BTreeMap<String, String>,
    keys: &[String],
    values: &[String],
) -> Result<(), FillError> {
    let mut seen: Vec<&String> = vec![];
    for (k, v) in plan {
        if !keys.contains(k) {
            return Err(FillError::InvalidPlan(format!("invalid {what}: {k:?}")));
        }
        if !values.contains(v) {
            return Err(FillError::InvalidPlan(format!("invalid {what}: {v:?}")));
        }
        if seen.contains(&v) {
            return Err(FillError::InvalidPlan(format!("{what} {v:?} is planned twice")));
        }
        seen.push(v);
    }
    Ok(())
}

/// Rolls the animal companion, unless the plan names one directly or places
/// one of the flutes. The companion's region is opened from start.
pub fn roll_companion<'g>(
    graph: &mut Graph,
    game_data: &'g GameData,
    plan: &Plan,
    start: NodeIdx,
    rng: &mut StdRng,
) -> Result<Option<&'g Companion>, FillError> {
    let companions = &game_data.companions;
    if companions.is_empty() {
        return Ok(None);
    }
    let mut choice = rng.gen_range(0..companions.len());
    for item in plan.items.values() {
        if let Some(i) = companions.iter().position(|c| &c.flute == item) {
            choice = i;
        }
    }
    if let Some(name) = &plan.companion {
        choice = companions
            .iter()
            .position(|c| &c.name == name)
            .ok_or_else(|| FillError::InvalidPlan(format!("unknown companion: {name:?}")))?;
    }
    let companion = &companions[choice];
    let region = graph.idx(&companion.region)?;
    graph.add_parent(region, start);
    debug!("Companion: {}", companion.name);
    Ok(Some(companion))
}

/// Picks a default season for every season area. The RNG is drawn for every
/// area, including planned ones, so a plan does not shift later rolls.
pub fn roll_seasons(
    graph: &mut Graph,
    game_data: &GameData,
    plan: &BTreeMap<String, String>,
    start: NodeIdx,
    rng: &mut StdRng,
) -> Result<BTreeMap<String, String>, FillError> {
    for (area, season) in plan {
        if !game_data.season_areas.contains(area) {
            return Err(FillError::InvalidPlan(format!("invalid season area: {area:?}")));
        }
        if !game_data.seasons.contains(season) {
            return Err(FillError::InvalidPlan(format!("invalid season: {season:?}")));
        }
    }

    let mut season_map = BTreeMap::new();
    if game_data.seasons.is_empty() {
        return Ok(season_map);
    }
    for area in &game_data.season_areas {
        let rolled = &game_data.seasons[rng.gen_range(0..game_data.seasons.len())];
        let season = plan.get(area).unwrap_or(rolled);
        let node = graph.idx(&season_node(area, season))?;
        graph.add_parent(node, start);
        season_map.insert(area.clone(), season.clone());
    }
    Ok(season_map)
}

/// Connects each dungeon entrance to a dungeon interior, shuffled or vanilla.
/// Planned pairs are moved to the back of both lists so they line up.
pub fn set_dungeon_entrances(
    graph: &mut Graph,
    game_data: &GameData,
    shuffle: bool,
    plan: &BTreeMap<String, String>,
    start: NodeIdx,
    rng: &mut StdRng,
) -> Result<BTreeMap<String, String>, FillError> {
    let mut dungeons = game_data.dungeon_entrances.clone();
    if !shuffle {
        for name in &game_data.vanilla_entrance_nodes {
            let node = graph.idx(name)?;
            graph.add_parent(node, start);
        }
    }

    let plan: BTreeMap<String, String> = plan
        .iter()
        .map(|(k, v)| (k.strip_suffix(" entrance").unwrap_or(k).to_string(), v.clone()))
        .collect();
    check_pairing("dungeon entrance", &plan, &dungeons, &dungeons)?;

    let mut entrances = dungeons.clone();
    if shuffle {
        entrances.shuffle(rng);
    }
    for (entrance, dungeon) in &plan {
        move_to_back(&mut entrances, entrance);
        move_to_back(&mut dungeons, dungeon);
    }

    let mut entrance_map = BTreeMap::new();
    for (entrance, dungeon) in entrances.iter().zip(&dungeons) {
        graph.link(&enter_dungeon_node(dungeon), &entrance_node(entrance))?;
        entrance_map.insert(entrance.clone(), dungeon.clone());
    }
    Ok(entrance_map)
}

/// Connects outer portals with inner portals in both directions, shuffled or vanilla.
pub fn set_portals(
    graph: &mut Graph,
    game_data: &GameData,
    shuffle: bool,
    plan: &BTreeMap<String, String>,
    rng: &mut StdRng,
) -> Result<BTreeMap<String, String>, FillError> {
    let mut outers: Vec<String> = game_data.portals.iter().map(|p| p.outer.clone()).collect();
    let mut inners: Vec<String> = game_data.portals.iter().map(|p| p.inner.clone()).collect();
    check_pairing("portal", plan, &outers, &inners)?;

    if shuffle {
        inners.shuffle(rng);
    }
    for (outer, inner) in plan {
        move_to_back(&mut outers, outer);
        move_to_back(&mut inners, inner);
    }

    let mut portal_map = BTreeMap::new();
    for (outer, inner) in outers.iter().zip(&inners) {
        graph.link(&exit_portal_node(inner), &enter_portal_node(outer))?;
        graph.link(&exit_portal_node(outer), &enter_portal_node(inner))?;
        portal_map.insert(outer.clone(), inner.clone());
    }
    Ok(portal_map)
}
