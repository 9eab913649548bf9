use crate::explore::ReachState;
use hashbrown::HashMap;

pub type NodeIdx = usize; // Index into `Graph::nodes`
pub type PlayerIdx = usize; // Owning participant of a node (0 outside of multiworld)
pub type RupeeValue = u32;

/// How a node combines its incoming edges into a reached/unreached outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// Reached once every declared parent edge is satisfied (vacuously true with no parents).
    And,
    /// Reached once any parent edge is satisfied.
    Or,
    /// Behaves like `Or`; marks items, which have no static requirements.
    Root,
    /// Reached once this many edges into its parents are satisfied.
    Count(usize),
    /// Reached once the rupee weight pushed by its parents reaches the cost (at least 1).
    Rupees(RupeeValue),
    /// Reached when not all parents are reached, once everything upstream has settled.
    Not,
    /// Reached when no parent is reached, once everything upstream has settled.
    Nor,
}

impl NodeType {
    pub fn is_negation(self) -> bool {
        matches!(self, NodeType::Not | NodeType::Nor)
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    pub name: String,
    pub node_type: NodeType,
    pub player: PlayerIdx,
    pub parents: Vec<NodeIdx>,
    pub children: Vec<NodeIdx>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("unknown node {0:?}")]
    UnknownNode(String),
    #[error("node {child:?} references unknown parent {parent:?}")]
    UnknownParent { child: String, parent: String },
    #[error("duplicate node {0:?}")]
    DuplicateNode(String),
}

/// Arena of logic nodes. Edges are stored on both endpoints so that the
/// evaluator can push along `children` and the fill can edit `parents`.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    pub(crate) nodes: Vec<Node>,
    index_by_name: HashMap<String, NodeIdx>,
    pub(crate) rupee_values: Vec<RupeeValue>,
    pub(crate) state: ReachState,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: &str, node_type: NodeType) -> Result<NodeIdx, GraphError> {
        self.add_player_node(name, node_type, 0)
    }

    pub fn add_player_node(
        &mut self,
        name: &str,
        node_type: NodeType,
        player: PlayerIdx,
    ) -> Result<NodeIdx, GraphError> {
        if self.index_by_name.contains_key(name) {
            return Err(GraphError::DuplicateNode(name.to_string()));
        }
        let idx = self.nodes.len();
        self.nodes.push(Node {
            name: name.to_string(),
            node_type,
            player,
            parents: vec![],
            children: vec![],
        });
        self.index_by_name.insert(name.to_string(), idx);
        self.rupee_values.push(0);
        self.state.grow(self.nodes.len());
        Ok(idx)
    }

    pub fn idx(&self, name: &str) -> Result<NodeIdx, GraphError> {
        self.get_idx(name)
            .ok_or_else(|| GraphError::UnknownNode(name.to_string()))
    }

    pub fn get_idx(&self, name: &str) -> Option<NodeIdx> {
        self.index_by_name.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_by_name.contains_key(name)
    }

    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx]
    }

    pub fn name(&self, idx: NodeIdx) -> &str {
        &self.nodes[idx].name
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds one `parent -> child` edge. Repeated edges are kept, since Count and
    /// Rupees nodes weigh each of them separately.
    pub fn add_parent(&mut self, child: NodeIdx, parent: NodeIdx) {
        self.nodes[child].parents.push(parent);
        self.nodes[parent].children.push(child);
    }

    /// Removes exactly one `parent -> child` edge.
    ///
    /// Panics if no such edge exists: callers only remove edges they added.
    pub fn remove_parent(&mut self, child: NodeIdx, parent: NodeIdx) {
        let Some(pos) = self.nodes[child].parents.iter().position(|&p| p == parent) else {
            panic!(
                "no edge from {:?} to {:?}",
                self.nodes[parent].name, self.nodes[child].name
            );
        };
        self.nodes[child].parents.remove(pos);
        let children = &mut self.nodes[parent].children;
        if let Some(pos) = children.iter().position(|&c| c == child) {
            children.remove(pos);
        }
    }

    pub fn has_parent(&self, child: NodeIdx, parent: NodeIdx) -> bool {
        self.nodes[child].parents.contains(&parent)
    }

    pub fn clear_parents(&mut self, node: NodeIdx) {
        let parents = std::mem::take(&mut self.nodes[node].parents);
        for parent in parents {
            let children = &mut self.nodes[parent].children;
            if let Some(pos) = children.iter().position(|&c| c == node) {
                children.remove(pos);
            }
        }
    }

    /// Name-based `add_parent`, for wiring static data.
    pub fn link(&mut self, child: &str, parent: &str) -> Result<(), GraphError> {
        let child_idx = self.idx(child)?;
        let parent_idx = self
            .get_idx(parent)
            .ok_or_else(|| GraphError::UnknownParent {
                child: child.to_string(),
                parent: parent.to_string(),
            })?;
        self.add_parent(child_idx, parent_idx);
        Ok(())
    }

    /// Name-based `remove_parent`. Unknown names are errors; a missing edge still panics.
    pub fn unlink(&mut self, child: &str, parent: &str) -> Result<(), GraphError> {
        let child_idx = self.idx(child)?;
        let parent_idx = self.idx(parent)?;
        self.remove_parent(child_idx, parent_idx);
        Ok(())
    }

    pub fn set_rupee_value(&mut self, idx: NodeIdx, value: RupeeValue) {
        self.rupee_values[idx] = value;
    }

    pub fn rupee_value(&self, idx: NodeIdx) -> RupeeValue {
        self.rupee_values[idx]
    }

    /// Copies every node and edge of `other` into this graph, with names
    /// prefixed by `prefix`. Nodes keep their player. Returns the index of the
    /// first copied node; `other`'s node `i` becomes `offset + i`.
    pub fn append(&mut self, other: &Graph, prefix: &str) -> Result<NodeIdx, GraphError> {
        let offset = self.nodes.len();
        for (i, node) in other.nodes.iter().enumerate() {
            let idx = self.add_player_node(
                &format!("{prefix}{}", node.name),
                node.node_type,
                node.player,
            )?;
            self.rupee_values[idx] = other.rupee_values[i];
        }
        for (i, node) in other.nodes.iter().enumerate() {
            for &parent in &node.parents {
                self.add_parent(offset + i, offset + parent);
            }
        }
        Ok(offset)
    }

    pub fn num_edges(&self) -> usize {
        self.nodes.iter().map(|n| n.parents.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_graph() -> Graph {
        let mut graph = Graph::new();
        graph.add_node("start", NodeType::And).unwrap();
        graph.add_node("a", NodeType::Or).unwrap();
        graph.add_node("b", NodeType::And).unwrap();
        graph
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut graph = small_graph();
        assert_eq!(
            graph.add_node("a", NodeType::Root),
            Err(GraphError::DuplicateNode("a".to_string()))
        );
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn link_requires_existing_endpoints() {
        let mut graph = small_graph();
        assert_eq!(
            graph.link("b", "missing"),
            Err(GraphError::UnknownParent {
                child: "b".to_string(),
                parent: "missing".to_string()
            })
        );
        assert_eq!(
            graph.link("missing", "a"),
            Err(GraphError::UnknownNode("missing".to_string()))
        );
        assert_eq!(graph.num_edges(), 0);
    }

    #[test]
    fn duplicate_edges_are_kept_and_removed_one_at_a_time() {
        let mut graph = small_graph();
        let a = graph.idx("a").unwrap();
        let b = graph.idx("b").unwrap();
        graph.add_parent(b, a);
        graph.add_parent(b, a);
        assert_eq!(graph.node(b).parents, vec![a, a]);
        assert_eq!(graph.node(a).children, vec![b, b]);

        graph.remove_parent(b, a);
        assert_eq!(graph.node(b).parents, vec![a]);
        assert_eq!(graph.node(a).children, vec![b]);
        assert!(graph.has_parent(b, a));

        graph.remove_parent(b, a);
        assert!(!graph.has_parent(b, a));
        assert!(graph.node(a).children.is_empty());
    }

    #[test]
    #[should_panic(expected = "no edge")]
    fn removing_a_missing_edge_panics() {
        let mut graph = small_graph();
        let a = graph.idx("a").unwrap();
        let b = graph.idx("b").unwrap();
        graph.remove_parent(b, a);
    }

    #[test]
    fn append_offsets_nodes_and_edges() {
        let mut first = small_graph();
        first.link("b", "a").unwrap();
        let mut second = Graph::new();
        second.add_player_node("start", NodeType::And, 2).unwrap();
        second.add_player_node("coin", NodeType::Root, 2).unwrap();
        second.link("coin", "start").unwrap();
        second.link("coin", "start").unwrap();
        second.set_rupee_value(1, 5);

        let offset = first.append(&second, "p2 ").unwrap();
        assert_eq!(offset, 3);
        assert_eq!(first.len(), 5);
        let coin = first.idx("p2 coin").unwrap();
        assert_eq!(coin, offset + 1);
        assert_eq!(first.node(coin).player, 2);
        assert_eq!(first.node(coin).parents, vec![offset, offset]);
        assert_eq!(first.rupee_value(coin), 5);
        assert_eq!(first.node(first.idx("a").unwrap()).player, 0);
        assert_eq!(first.num_edges(), 3);

        assert_eq!(
            first.append(&second, "p2 "),
            Err(GraphError::DuplicateNode("p2 start".to_string()))
        );
    }

    #[test]
    fn clear_parents_detaches_both_sides() {
        let mut graph = small_graph();
        graph.link("b", "a").unwrap();
        graph.link("b", "start").unwrap();
        graph.link("a", "start").unwrap();
        let b = graph.idx("b").unwrap();
        graph.clear_parents(b);
        assert!(graph.node(b).parents.is_empty());
        assert_eq!(graph.node(graph.idx("start").unwrap()).children, vec![1]);
        assert!(graph.node(graph.idx("a").unwrap()).children.is_empty());
    }
}
