use crate::graph::{Graph, NodeIdx, NodeType};

/// Scratch state of one reachability pass, indexed by node.
///
/// Kept apart from the nodes so that one graph topology can be evaluated
/// repeatedly while the fill edits its check edges.
#[derive(Clone, Debug, Default)]
pub struct ReachState {
    reached: Vec<bool>,
    indegree: Vec<usize>,
    // Edge count for Count nodes, rupee total for Rupees nodes.
    accumulated: Vec<u64>,
    baseline_pushed: bool,
}

impl ReachState {
    pub(crate) fn grow(&mut self, len: usize) {
        self.reached.resize(len, false);
        self.indegree.resize(len, 0);
        self.accumulated.resize(len, 0);
    }

    pub fn is_reached(&self, idx: NodeIdx) -> bool {
        self.reached[idx]
    }

    pub fn indegree(&self, idx: NodeIdx) -> usize {
        self.indegree[idx]
    }

    pub fn accumulated(&self, idx: NodeIdx) -> u64 {
        self.accumulated[idx]
    }
}

impl Graph {
    /// Clears the scratch state. Nodes whose threshold is met with no input
    /// (And without parents, `Count(0)`) start out reached.
    pub fn reset(&mut self) {
        let n = self.nodes.len();
        let state = &mut self.state;
        state.reached.clear();
        state.indegree.clear();
        state.accumulated.clear();
        state.grow(n);
        for (idx, node) in self.nodes.iter().enumerate() {
            state.reached[idx] = match node.node_type {
                NodeType::And => node.parents.is_empty(),
                NodeType::Count(min) => min == 0,
                _ => false,
            };
        }
        state.baseline_pushed = false;
    }

    /// Propagates reachability forward from `start`, on top of whatever the
    /// current pass has already settled. Call `reset` first for a fresh pass.
    pub fn explore(&mut self, start: NodeIdx) {
        self.explore_all(&[start]);
    }

    /// `explore` from several start nodes at once. Negations are resolved
    /// only after every start has been pushed.
    pub fn explore_all(&mut self, starts: &[NodeIdx]) {
        let mut stack: Vec<NodeIdx> = vec![];
        if !self.state.baseline_pushed {
            self.state.baseline_pushed = true;
            stack.extend((0..self.nodes.len()).filter(|&i| self.state.reached[i]));
        }
        for &start in starts {
            if !self.state.reached[start] {
                self.state.reached[start] = true;
                stack.push(start);
            }
        }
        self.settle(&mut stack);
        self.resolve_negations(&mut stack);
    }

    pub fn is_reached(&self, idx: NodeIdx) -> bool {
        self.state.is_reached(idx)
    }

    pub fn reach_state(&self) -> &ReachState {
        &self.state
    }

    pub fn reached_nodes(&self) -> Vec<NodeIdx> {
        (0..self.nodes.len())
            .filter(|&i| self.state.reached[i])
            .collect()
    }

    pub fn num_reached(&self) -> usize {
        self.state.reached.iter().filter(|&&r| r).count()
    }

    fn settle(&mut self, stack: &mut Vec<NodeIdx>) {
        while let Some(src) = stack.pop() {
            for i in 0..self.nodes[src].children.len() {
                let dst = self.nodes[src].children[i];
                self.satisfy_edge(src, dst, stack);
            }
        }
    }

    fn satisfy_edge(&mut self, src: NodeIdx, dst: NodeIdx, stack: &mut Vec<NodeIdx>) {
        match self.nodes[dst].node_type {
            NodeType::Rupees(_) => {
                self.state.accumulated[dst] += self.rupee_values[src] as u64;
                self.try_reach(dst, stack);
            }
            NodeType::Not | NodeType::Nor => {
                self.state.indegree[dst] += 1;
            }
            NodeType::And | NodeType::Or | NodeType::Root | NodeType::Count(_) => {
                self.state.indegree[dst] += 1;
                // Count nodes tally edges into their parents, whether or not
                // the parent itself is reached yet.
                for j in 0..self.nodes[dst].children.len() {
                    let counter = self.nodes[dst].children[j];
                    if let NodeType::Count(_) = self.nodes[counter].node_type {
                        self.state.accumulated[counter] += 1;
                        self.try_reach(counter, stack);
                    }
                }
                if !self.state.reached[dst] {
                    self.try_reach(dst, stack);
                } else if self.nodes[dst].node_type == NodeType::Root {
                    // Each satisfied edge into a reached item is another copy of it.
                    self.push_rupees(dst, stack);
                }
            }
        }
    }

    fn push_rupees(&mut self, src: NodeIdx, stack: &mut Vec<NodeIdx>) {
        let weight = self.rupee_values[src] as u64;
        for j in 0..self.nodes[src].children.len() {
            let dst = self.nodes[src].children[j];
            if let NodeType::Rupees(_) = self.nodes[dst].node_type {
                self.state.accumulated[dst] += weight;
                self.try_reach(dst, stack);
            }
        }
    }

    fn try_reach(&mut self, idx: NodeIdx, stack: &mut Vec<NodeIdx>) {
        if !self.state.reached[idx] && self.threshold_met(idx) {
            self.state.reached[idx] = true;
            stack.push(idx);
        }
    }

    fn threshold_met(&self, idx: NodeIdx) -> bool {
        let state = &self.state;
        match self.nodes[idx].node_type {
            NodeType::And => state.indegree[idx] >= self.nodes[idx].parents.len(),
            NodeType::Or | NodeType::Root => state.indegree[idx] >= 1,
            NodeType::Count(min) => state.accumulated[idx] >= min as u64,
            NodeType::Rupees(cost) => state.accumulated[idx] >= cost.max(1) as u64,
            NodeType::Not | NodeType::Nor => false,
        }
    }

    // Each negation is evaluated once every negation feeding it has been
    // resolved and settled, then feeds back into the positive pass. They are
    // not re-evaluated afterwards.
    fn resolve_negations(&mut self, stack: &mut Vec<NodeIdx>) {
        for idx in self.negation_order() {
            if self.state.reached[idx] {
                continue;
            }
            let parents = &self.nodes[idx].parents;
            let value = match self.nodes[idx].node_type {
                NodeType::Not => !parents.iter().all(|&p| self.state.reached[p]),
                NodeType::Nor => !parents.iter().any(|&p| self.state.reached[p]),
                _ => continue,
            };
            if value {
                self.state.reached[idx] = true;
                stack.push(idx);
                self.settle(stack);
            }
        }
    }

    /// Negation nodes ordered so that a negation comes after every negation
    /// upstream of it (through positive nodes only). Negations on a cycle of
    /// negations go last, in index order.
    pub fn negation_order(&self) -> Vec<NodeIdx> {
        let n = self.nodes.len();
        let negations: Vec<NodeIdx> = (0..n)
            .filter(|&i| self.nodes[i].node_type.is_negation())
            .collect();
        if negations.len() < 2 {
            return negations;
        }

        let mut position = vec![None; n];
        for (k, &idx) in negations.iter().enumerate() {
            position[idx] = Some(k);
        }
        let mut waiting_on = vec![0usize; negations.len()];
        let mut feeds: Vec<Vec<usize>> = vec![vec![]; negations.len()];
        let mut seen = vec![usize::MAX; n];
        for (k, &idx) in negations.iter().enumerate() {
            let mut work = self.nodes[idx].parents.clone();
            while let Some(p) = work.pop() {
                if seen[p] == k {
                    continue;
                }
                seen[p] = k;
                match position[p] {
                    Some(upstream) => {
                        feeds[upstream].push(k);
                        waiting_on[k] += 1;
                    }
                    None => work.extend_from_slice(&self.nodes[p].parents),
                }
            }
        }

        let mut order = Vec::with_capacity(negations.len());
        let mut resolved = vec![false; negations.len()];
        let mut ready: Vec<usize> = (0..negations.len())
            .rev()
            .filter(|&k| waiting_on[k] == 0)
            .collect();
        while let Some(k) = ready.pop() {
            resolved[k] = true;
            order.push(negations[k]);
            for &j in &feeds[k] {
                waiting_on[j] -= 1;
                if waiting_on[j] == 0 {
                    ready.push(j);
                }
            }
        }
        order.extend(
            (0..negations.len())
                .filter(|&k| !resolved[k])
                .map(|k| negations[k]),
        );
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn graph_with(nodes: &[(&str, NodeType)]) -> Graph {
        let mut graph = Graph::new();
        for &(name, node_type) in nodes {
            graph.add_node(name, node_type).unwrap();
        }
        graph
    }

    fn reached_names(graph: &Graph) -> Vec<String> {
        let mut names: Vec<String> = graph
            .reached_nodes()
            .into_iter()
            .map(|i| graph.name(i).to_string())
            .collect();
        names.sort();
        names
    }

    fn run(graph: &mut Graph) {
        let start = graph.idx("start").unwrap();
        graph.reset();
        graph.explore(start);
    }

    #[test]
    fn and_without_parents_is_vacuously_reached() {
        let mut graph = graph_with(&[("start", NodeType::Or), ("free", NodeType::And)]);
        run(&mut graph);
        assert!(graph.is_reached(graph.idx("free").unwrap()));
    }

    #[test]
    fn and_requires_every_parent() {
        let mut graph = graph_with(&[
            ("start", NodeType::And),
            ("x", NodeType::Or),
            ("y", NodeType::Or),
            ("both", NodeType::And),
        ]);
        graph.link("x", "start").unwrap();
        graph.link("both", "x").unwrap();
        graph.link("both", "y").unwrap();
        run(&mut graph);
        assert!(!graph.is_reached(graph.idx("both").unwrap()));

        graph.link("y", "x").unwrap();
        run(&mut graph);
        assert!(graph.is_reached(graph.idx("both").unwrap()));
    }

    #[test]
    fn or_without_parents_is_never_reached() {
        let mut graph = graph_with(&[("start", NodeType::And), ("lonely", NodeType::Or)]);
        run(&mut graph);
        assert!(!graph.is_reached(graph.idx("lonely").unwrap()));
    }

    #[test]
    fn or_requires_any_parent() {
        let mut graph = graph_with(&[
            ("start", NodeType::And),
            ("x", NodeType::Or),
            ("y", NodeType::Or),
            ("either", NodeType::Or),
        ]);
        graph.link("x", "start").unwrap();
        graph.link("either", "x").unwrap();
        graph.link("either", "y").unwrap();
        run(&mut graph);
        assert!(graph.is_reached(graph.idx("either").unwrap()));
        assert!(!graph.is_reached(graph.idx("y").unwrap()));
    }

    #[test]
    fn unanchored_cycles_stay_unreached() {
        for node_type in [NodeType::And, NodeType::Or] {
            let mut graph = graph_with(&[
                ("start", NodeType::And),
                ("p", node_type),
                ("q", node_type),
            ]);
            graph.link("p", "q").unwrap();
            graph.link("q", "p").unwrap();
            run(&mut graph);
            assert_eq!(reached_names(&graph), vec!["start"]);
        }
    }

    #[test]
    fn anchored_or_cycle_is_reached() {
        let mut graph = graph_with(&[
            ("start", NodeType::And),
            ("p", NodeType::Or),
            ("q", NodeType::Or),
        ]);
        graph.link("p", "q").unwrap();
        graph.link("q", "p").unwrap();
        graph.link("p", "start").unwrap();
        run(&mut graph);
        assert_eq!(reached_names(&graph), vec!["p", "q", "start"]);
    }

    #[test]
    fn count_tallies_edges_into_the_aggregator() {
        let mut graph = graph_with(&[
            ("start", NodeType::And),
            ("key", NodeType::Root),
            ("keys", NodeType::Or),
            ("two keys", NodeType::Count(2)),
        ]);
        graph.link("key", "start").unwrap();
        graph.link("keys", "key").unwrap();
        graph.link("two keys", "keys").unwrap();
        run(&mut graph);
        assert!(graph.is_reached(graph.idx("keys").unwrap()));
        assert!(!graph.is_reached(graph.idx("two keys").unwrap()));

        graph.link("keys", "key").unwrap();
        run(&mut graph);
        assert!(graph.is_reached(graph.idx("two keys").unwrap()));
        assert_eq!(graph.reach_state().accumulated(graph.idx("two keys").unwrap()), 2);
    }

    #[test]
    fn count_on_an_and_aggregator_counts_its_satisfied_edges() {
        let mut graph = graph_with(&[
            ("start", NodeType::And),
            ("x", NodeType::Root),
            ("y", NodeType::Root),
            ("agg", NodeType::And),
            ("one", NodeType::Count(1)),
        ]);
        graph.link("x", "start").unwrap();
        graph.link("agg", "x").unwrap();
        graph.link("agg", "y").unwrap();
        graph.link("one", "agg").unwrap();
        run(&mut graph);
        assert!(!graph.is_reached(graph.idx("agg").unwrap()));
        assert!(graph.is_reached(graph.idx("one").unwrap()));
    }

    #[test]
    fn count_zero_is_reached_without_input() {
        let mut graph = graph_with(&[
            ("start", NodeType::And),
            ("agg", NodeType::Or),
            ("none needed", NodeType::Count(0)),
            ("after", NodeType::And),
        ]);
        graph.link("none needed", "agg").unwrap();
        graph.link("after", "none needed").unwrap();
        run(&mut graph);
        assert!(graph.is_reached(graph.idx("after").unwrap()));
    }

    #[test]
    fn rupees_accumulate_per_edge() {
        let mut graph = graph_with(&[
            ("start", NodeType::And),
            ("rupees, 20", NodeType::Root),
            ("shop", NodeType::Rupees(30)),
            ("anything", NodeType::Rupees(0)),
        ]);
        let rupees = graph.idx("rupees, 20").unwrap();
        graph.set_rupee_value(rupees, 20);
        graph.link("rupees, 20", "start").unwrap();
        graph.link("shop", "rupees, 20").unwrap();
        graph.link("anything", "rupees, 20").unwrap();
        run(&mut graph);
        assert!(graph.is_reached(graph.idx("anything").unwrap()));
        assert!(!graph.is_reached(graph.idx("shop").unwrap()));

        // A second copy of the same item is worth 20 more.
        graph.link("rupees, 20", "start").unwrap();
        run(&mut graph);
        let shop = graph.idx("shop").unwrap();
        assert!(graph.is_reached(shop));
        assert_eq!(graph.reach_state().accumulated(shop), 40);
    }

    #[test]
    fn rupees_without_weight_never_reach() {
        let mut graph = graph_with(&[
            ("start", NodeType::And),
            ("worthless", NodeType::Root),
            ("wallet", NodeType::Rupees(0)),
        ]);
        graph.link("worthless", "start").unwrap();
        graph.link("wallet", "worthless").unwrap();
        run(&mut graph);
        assert!(!graph.is_reached(graph.idx("wallet").unwrap()));
    }

    #[test]
    fn negations_read_the_settled_positive_pass() {
        let mut graph = graph_with(&[
            ("start", NodeType::And),
            ("x", NodeType::Or),
            ("y", NodeType::Or),
            ("not x", NodeType::Not),
            ("not y", NodeType::Not),
            ("neither", NodeType::Nor),
            ("after not y", NodeType::And),
        ]);
        graph.link("x", "start").unwrap();
        graph.link("not x", "x").unwrap();
        graph.link("not y", "y").unwrap();
        graph.link("neither", "x").unwrap();
        graph.link("neither", "y").unwrap();
        graph.link("after not y", "not y").unwrap();
        run(&mut graph);
        assert_eq!(
            reached_names(&graph),
            vec!["after not y", "not y", "start", "x"]
        );
    }

    #[test]
    fn rupees_from_a_location_count_once() {
        let mut graph = graph_with(&[
            ("start", NodeType::And),
            ("village", NodeType::Or),
            ("old man", NodeType::Or),
            ("shop", NodeType::Rupees(60)),
        ]);
        let old_man = graph.idx("old man").unwrap();
        graph.set_rupee_value(old_man, 30);
        graph.link("village", "start").unwrap();
        graph.link("old man", "start").unwrap();
        graph.link("old man", "village").unwrap();
        graph.link("shop", "old man").unwrap();
        run(&mut graph);
        let shop = graph.idx("shop").unwrap();
        assert!(graph.is_reached(old_man));
        assert_eq!(graph.reach_state().accumulated(shop), 30);
        assert!(!graph.is_reached(shop));
    }

    #[test]
    fn nested_negations_see_each_other() {
        let mut graph = graph_with(&[
            ("nor not x", NodeType::Nor),
            ("not not x", NodeType::Not),
            ("after", NodeType::And),
            ("not x", NodeType::Not),
            ("start", NodeType::And),
            ("x", NodeType::Or),
        ]);
        graph.link("not x", "x").unwrap();
        graph.link("after", "not x").unwrap();
        graph.link("nor not x", "after").unwrap();
        graph.link("not not x", "not x").unwrap();
        run(&mut graph);
        assert_eq!(reached_names(&graph), vec!["after", "not x", "start"]);

        // With x reached the outcome flips all the way down.
        graph.link("x", "start").unwrap();
        run(&mut graph);
        assert_eq!(
            reached_names(&graph),
            vec!["nor not x", "not not x", "start", "x"]
        );
    }

    #[test]
    fn negation_order_puts_upstream_negations_first() {
        let mut graph = graph_with(&[
            ("outer", NodeType::Nor),
            ("middle", NodeType::And),
            ("inner", NodeType::Not),
            ("x", NodeType::Or),
            ("loop a", NodeType::Not),
            ("loop b", NodeType::Not),
        ]);
        graph.link("inner", "x").unwrap();
        graph.link("middle", "inner").unwrap();
        graph.link("outer", "middle").unwrap();
        graph.link("loop a", "loop b").unwrap();
        graph.link("loop b", "loop a").unwrap();
        let order: Vec<&str> = graph
            .negation_order()
            .into_iter()
            .map(|i| graph.name(i))
            .collect();
        assert_eq!(order, vec!["inner", "outer", "loop a", "loop b"]);
    }

    #[test]
    fn negations_wait_for_every_start() {
        let mut graph = graph_with(&[
            ("start 1", NodeType::Or),
            ("start 2", NodeType::Or),
            ("gate", NodeType::Or),
            ("gate closed", NodeType::Not),
        ]);
        graph.link("gate", "start 2").unwrap();
        graph.link("gate closed", "gate").unwrap();
        let starts = [graph.idx("start 1").unwrap(), graph.idx("start 2").unwrap()];
        graph.reset();
        graph.explore_all(&starts);
        assert!(graph.is_reached(graph.idx("gate").unwrap()));
        assert!(!graph.is_reached(graph.idx("gate closed").unwrap()));
    }

    #[test]
    fn explore_twice_is_idempotent() {
        let mut graph = graph_with(&[
            ("start", NodeType::And),
            ("x", NodeType::Root),
            ("y", NodeType::Or),
        ]);
        graph.link("x", "start").unwrap();
        graph.link("y", "x").unwrap();
        run(&mut graph);
        let first = reached_names(&graph);
        run(&mut graph);
        assert_eq!(first, reached_names(&graph));
    }

    // Placement scenario: B needs A and C; C starts out free, then is moved to
    // a slot reachable from start.
    #[test]
    fn moving_a_free_item_into_a_reachable_slot() {
        let mut graph = graph_with(&[
            ("start", NodeType::And),
            ("a", NodeType::Or),
            ("b", NodeType::And),
            ("c", NodeType::Root),
            ("slot", NodeType::And),
        ]);
        graph.link("a", "start").unwrap();
        graph.link("b", "a").unwrap();
        graph.link("b", "c").unwrap();
        graph.link("slot", "start").unwrap();
        graph.link("c", "start").unwrap();
        run(&mut graph);
        assert!(graph.is_reached(graph.idx("b").unwrap()));

        graph.unlink("c", "start").unwrap();
        run(&mut graph);
        assert!(!graph.is_reached(graph.idx("b").unwrap()));

        graph.link("c", "slot").unwrap();
        run(&mut graph);
        assert!(graph.is_reached(graph.idx("a").unwrap()));
        assert!(graph.is_reached(graph.idx("b").unwrap()));
    }

    #[derive(Clone, Debug)]
    struct RandomGraph {
        types: Vec<NodeType>,
        edges: Vec<(usize, usize)>,
    }

    fn positive_node_type() -> impl Strategy<Value = NodeType> {
        prop_oneof![
            Just(NodeType::And),
            Just(NodeType::Or),
            Just(NodeType::Root),
            (0usize..3).prop_map(NodeType::Count),
            (0u32..40).prop_map(NodeType::Rupees),
        ]
    }

    fn random_graph() -> impl Strategy<Value = RandomGraph> {
        (2usize..14).prop_flat_map(|n| {
            (
                prop::collection::vec(positive_node_type(), n),
                prop::collection::vec((0..n, 0..n), 0..(3 * n)),
            )
                .prop_map(|(types, edges)| RandomGraph { types, edges })
        })
    }

    fn build(random: &RandomGraph) -> Graph {
        let mut graph = Graph::new();
        for (i, &node_type) in random.types.iter().enumerate() {
            // Node 0 is always the start node.
            let node_type = if i == 0 { NodeType::And } else { node_type };
            let idx = graph.add_node(&format!("n{i}"), node_type).unwrap();
            graph.set_rupee_value(idx, (i as u32 * 7) % 25);
        }
        for &(child, parent) in &random.edges {
            if child != 0 {
                graph.add_parent(child, parent);
            }
        }
        graph
    }

    fn reached_set(graph: &mut Graph) -> Vec<bool> {
        graph.reset();
        graph.explore(0);
        (0..graph.len()).map(|i| graph.is_reached(i)).collect()
    }

    proptest! {
        #[test]
        fn passes_are_idempotent(random in random_graph()) {
            let mut graph = build(&random);
            let first = reached_set(&mut graph);
            let second = reached_set(&mut graph);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn and_and_or_match_their_parents(random in random_graph()) {
            let mut graph = build(&random);
            let reached = reached_set(&mut graph);
            for (idx, node) in graph.nodes().iter().enumerate() {
                if idx == 0 {
                    continue;
                }
                match node.node_type {
                    NodeType::And => prop_assert_eq!(
                        reached[idx],
                        node.parents.iter().all(|&p| reached[p])
                    ),
                    NodeType::Or | NodeType::Root => prop_assert_eq!(
                        reached[idx],
                        node.parents.iter().any(|&p| reached[p])
                    ),
                    _ => {}
                }
            }
        }

        #[test]
        fn adding_an_edge_to_a_non_and_node_only_adds(
            random in random_graph(),
            child in 1usize..14,
            parent in 0usize..14,
        ) {
            let mut graph = build(&random);
            let n = graph.len();
            let (child, parent) = (1 + child % (n - 1), parent % n);
            prop_assume!(graph.node(child).node_type != NodeType::And);
            let before = reached_set(&mut graph);
            graph.add_parent(child, parent);
            let after = reached_set(&mut graph);
            for i in 0..n {
                prop_assert!(!before[i] || after[i]);
            }

            // Removing it again can only take nodes away.
            graph.remove_parent(child, parent);
            let removed = reached_set(&mut graph);
            for i in 0..n {
                prop_assert!(!removed[i] || after[i]);
            }
            prop_assert_eq!(removed, before);
        }
    }
}
