//! Experience graph
//!
//! Demonstrated trajectories stored as an undirected graph of continuous
//! states, independent of any lattice discretization.

use std::collections::VecDeque;

use crate::common::{LatticeError, LatticeResult, RobotState};

/// Handle of an experience-graph node, stable once inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Handle of an experience-graph edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub usize);

#[derive(Debug, Clone)]
struct Node {
    state: RobotState,
    adjacency: Vec<(NodeId, EdgeId)>,
}

#[derive(Debug, Clone)]
struct Edge {
    source: NodeId,
    target: NodeId,
    /// Intermediate states from `source` to `target`, endpoints excluded
    waypoints: Vec<RobotState>,
}

/// Undirected graph of demonstration states
#[derive(Debug, Clone, Default)]
pub struct ExperienceGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl ExperienceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_node(&mut self, state: RobotState) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            state,
            adjacency: Vec::new(),
        });
        id
    }

    /// Connect two nodes; `waypoints` run from `a` to `b`
    pub fn insert_edge(&mut self, a: NodeId, b: NodeId, waypoints: Vec<RobotState>) -> LatticeResult<EdgeId> {
        for node in [a, b] {
            if node.0 >= self.nodes.len() {
                return Err(LatticeError::Lookup(format!("experience graph node {} does not exist", node.0)));
            }
        }
        let id = EdgeId(self.edges.len());
        self.edges.push(Edge {
            source: a,
            target: b,
            waypoints,
        });
        self.nodes[a.0].adjacency.push((b, id));
        if a != b {
            self.nodes[b.0].adjacency.push((a, id));
        }
        Ok(id)
    }

    /// Append one demonstration, linking consecutive states
    pub fn add_path(&mut self, path: &[RobotState]) -> Vec<NodeId> {
        let ids: Vec<NodeId> = path.iter().map(|s| self.insert_node(s.clone())).collect();
        for pair in ids.windows(2) {
            let id = EdgeId(self.edges.len());
            self.edges.push(Edge {
                source: pair[0],
                target: pair[1],
                waypoints: Vec::new(),
            });
            self.nodes[pair[0].0].adjacency.push((pair[1], id));
            self.nodes[pair[1].0].adjacency.push((pair[0], id));
        }
        ids
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Edges incident to a node; empty for an unknown node
    pub fn edges(&self, node: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        self.adjacency(node).iter().map(|&(_, e)| e)
    }

    pub fn adjacent_nodes(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.adjacency(node).iter().map(|&(n, _)| n)
    }

    fn adjacency(&self, node: NodeId) -> &[(NodeId, EdgeId)] {
        self.nodes.get(node.0).map(|n| n.adjacency.as_slice()).unwrap_or(&[])
    }

    pub fn state(&self, node: NodeId) -> Option<&RobotState> {
        self.nodes.get(node.0).map(|n| &n.state)
    }

    pub fn edge_nodes(&self, edge: EdgeId) -> Option<(NodeId, NodeId)> {
        self.edges.get(edge.0).map(|e| (e.source, e.target))
    }

    pub fn edge_waypoints(&self, edge: EdgeId) -> Option<&[RobotState]> {
        self.edges.get(edge.0).map(|e| e.waypoints.as_slice())
    }

    pub fn find_edge(&self, a: NodeId, b: NodeId) -> Option<EdgeId> {
        self.adjacency(a).iter().find(|&&(n, _)| n == b).map(|&(_, e)| e)
    }

    /// Intermediate states of the edge between two nodes, ordered from `from` to `to`
    pub fn waypoints_between(&self, from: NodeId, to: NodeId) -> Option<Vec<RobotState>> {
        let edge = &self.edges[self.find_edge(from, to)?.0];
        let mut waypoints = edge.waypoints.clone();
        if edge.source != from {
            waypoints.reverse();
        }
        Some(waypoints)
    }
}

/// Fewest-hop route between two nodes, both endpoints included
pub fn find_shortest_experience_graph_path(
    egraph: &ExperienceGraph,
    start: NodeId,
    goal: NodeId,
) -> Option<Vec<NodeId>> {
    let n = egraph.num_nodes();
    if start.0 >= n || goal.0 >= n {
        return None;
    }

    let mut parent: Vec<Option<NodeId>> = vec![None; n];
    let mut visited = vec![false; n];
    let mut queue = VecDeque::new();
    visited[start.0] = true;
    queue.push_back(start);

    while let Some(current) = queue.pop_front() {
        if current == goal {
            let mut path = vec![goal];
            let mut node = goal;
            while let Some(prev) = parent[node.0] {
                path.push(prev);
                node = prev;
            }
            path.reverse();
            return Some(path);
        }
        for next in egraph.adjacent_nodes(current) {
            if !visited[next.0] {
                visited[next.0] = true;
                parent[next.0] = Some(current);
                queue.push_back(next);
            }
        }
    }
    None
}
