use anyhow::{Context, Result};
use hashbrown::HashSet;
use orando_logic::NodeType;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// One value in a logic file: a parent name, an implicit And over a list, or a
/// typed node such as `{"or": [...]}`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum LogicValue {
    Name(String),
    All(Vec<LogicValue>),
    Typed(TypedLogic),
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypedLogic {
    Or(OneOrMany),
    Not(OneOrMany),
    Nor(OneOrMany),
    Count(usize, String),
    Rupees(RupeeLogic),
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    Many(Vec<LogicValue>),
    One(Box<LogicValue>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<LogicValue> {
        match self {
            OneOrMany::Many(values) => values,
            OneOrMany::One(value) => vec![*value],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RupeeLogic {
    Priced(u32, Vec<LogicValue>),
    Free(Vec<LogicValue>),
}

/// A node with its type and parent names, after nested values are hoisted out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreNode {
    pub node_type: NodeType,
    pub parents: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogicError {
    #[error("duplicate logic key {name:?} in {source_name}")]
    DuplicateKey { name: String, source_name: String },
    #[error("nested node name {0:?} collides with an existing key")]
    HoistCollision(String),
}

/// Entries of one logic object in file order. Unlike a map, repeated keys are
/// kept so that they can be reported.
#[derive(Clone, Debug, Default)]
pub struct LogicEntries(pub Vec<(String, LogicValue)>);

impl<'de> Deserialize<'de> for LogicEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = LogicEntries;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of logic nodes")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<LogicEntries, A::Error> {
                let mut entries = vec![];
                while let Some(entry) = map.next_entry::<String, LogicValue>()? {
                    entries.push(entry);
                }
                Ok(LogicEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

/// Merges logic objects, failing on any key defined twice.
pub fn merge_logic(
    sources: Vec<(String, LogicEntries)>,
) -> Result<Vec<(String, LogicValue)>, LogicError> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = vec![];
    for (source_name, entries) in sources {
        for (name, value) in entries.0 {
            if !seen.insert(name.clone()) {
                return Err(LogicError::DuplicateKey { name, source_name });
            }
            merged.push((name, value));
        }
    }
    Ok(merged)
}

/// Reads every `*.json` file in `dir`, in file name order.
pub fn load_logic_dir(dir: &Path) -> Result<Vec<(String, LogicValue)>> {
    let mut paths = vec![];
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Unable to read logic directory {}", dir.display()))?
    {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();
    let mut sources = vec![];
    for path in paths {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("unable to read {}", path.display()))?;
        let entries: LogicEntries = serde_json::from_str(&text)
            .with_context(|| format!("unable to parse {}", path.display()))?;
        sources.push((path.display().to_string(), entries));
    }
    Ok(merge_logic(sources)?)
}

fn split_value(value: LogicValue) -> (NodeType, Vec<LogicValue>) {
    match value {
        LogicValue::Name(name) => (NodeType::And, vec![LogicValue::Name(name)]),
        LogicValue::All(values) => (NodeType::And, values),
        LogicValue::Typed(TypedLogic::Or(values)) => (NodeType::Or, values.into_vec()),
        LogicValue::Typed(TypedLogic::Not(values)) => (NodeType::Not, values.into_vec()),
        LogicValue::Typed(TypedLogic::Nor(values)) => (NodeType::Nor, values.into_vec()),
        LogicValue::Typed(TypedLogic::Count(min, name)) => {
            (NodeType::Count(min), vec![LogicValue::Name(name)])
        }
        LogicValue::Typed(TypedLogic::Rupees(RupeeLogic::Priced(cost, values))) => {
            (NodeType::Rupees(cost), values)
        }
        LogicValue::Typed(TypedLogic::Rupees(RupeeLogic::Free(values))) => {
            (NodeType::Rupees(0), values)
        }
    }
}

/// Hoists nested values into their own nodes named `"<parent> <n>"`, one
/// nesting level per pass, until a pass produces nothing new.
pub fn flatten_logic(
    entries: Vec<(String, LogicValue)>,
) -> Result<BTreeMap<String, PreNode>, LogicError> {
    let mut prenodes: BTreeMap<String, PreNode> = BTreeMap::new();
    let mut pending = entries;
    let mut top_level = true;
    while !pending.is_empty() {
        let mut hoisted = vec![];
        for (name, value) in pending {
            let (node_type, values) = split_value(value);
            let mut parents = Vec::with_capacity(values.len());
            let mut nested_count = 0;
            for value in values {
                match value {
                    LogicValue::Name(parent) => parents.push(parent),
                    nested => {
                        nested_count += 1;
                        let sub_name = format!("{name} {nested_count}");
                        parents.push(sub_name.clone());
                        hoisted.push((sub_name, nested));
                    }
                }
            }
            if prenodes.contains_key(&name) {
                return Err(if top_level {
                    LogicError::DuplicateKey {
                        name,
                        source_name: "logic".to_string(),
                    }
                } else {
                    LogicError::HoistCollision(name)
                });
            }
            prenodes.insert(name, PreNode { node_type, parents });
        }
        pending = hoisted;
        top_level = false;
    }
    Ok(prenodes)
}
