use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use plancore::{HolderId, WorkplanInstance};
use std::collections::{HashMap, HashSet};

/// Places no token injected at a start place can ever reach.
///
/// Builds a bipartite graph (place -> transition for inputs, transition ->
/// place for outputs) and walks it from every start place.
pub fn unreachable_places(instance: &WorkplanInstance) -> Vec<HolderId> {
    let mut graph: DiGraph<HolderId, ()> = DiGraph::new();
    let mut index: HashMap<HolderId, NodeIndex> = HashMap::new();

    for place in instance.places() {
        index.insert(place.id(), graph.add_node(place.id()));
    }
    for transition in instance.transitions() {
        let node = graph.add_node(transition.id());
        index.insert(transition.id(), node);
        for input in transition.inputs() {
            if let Some(place) = index.get(input) {
                graph.add_edge(*place, node, ());
            }
        }
        for output in transition.outputs() {
            if let Some(place) = index.get(output) {
                graph.add_edge(node, *place, ());
            }
        }
    }

    let mut reached = HashSet::new();
    for start in instance.start_places() {
        let Some(&root) = index.get(&start.id()) else {
            continue;
        };
        let mut bfs = Bfs::new(&graph, root);
        while let Some(node) = bfs.next(&graph) {
            reached.insert(graph[node]);
        }
    }

    instance
        .places()
        .iter()
        .map(|p| p.id())
        .filter(|id| !reached.contains(id))
        .collect()
}
