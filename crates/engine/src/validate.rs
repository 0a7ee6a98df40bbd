//! Graph validation — run this before persisting or activating an automation.
//!
//! Rules enforced:
//! 1. Node IDs must be unique within the graph.
//! 2. Every edge must reference valid node IDs (both `from` and `to`).
//! 3. Exactly one trigger node.
//! 4. Trigger, branch and action nodes have at most one outgoing edge.
//! 5. A condition node has exactly one edge per declared branch plus one for
//!    the implicit `none` branch, each landing on a branch node.
//! 6. Condition operators are supported for their field; action configs
//!    are well-formed.
//! 7. The directed graph must be acyclic (topological sort must succeed).
//! 8. Every node is reachable from the trigger.
//!
//! Returns a topologically-sorted list of node IDs on success.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::condition::check_condition;
use crate::models::{NodeKind, WorkflowGraph, WorkflowNode, NONE_BRANCH};
use crate::EngineError;

/// Validate the automation graph and return nodes in topological order.
///
/// # Errors
/// - [`EngineError::DuplicateNodeId`] if two nodes share an ID.
/// - [`EngineError::UnknownNodeReference`] if an edge references a missing node.
/// - [`EngineError::MissingTrigger`] / [`EngineError::MultipleTriggers`].
/// - Edge-shape, condition and action errors for the node that breaks them.
/// - [`EngineError::CycleDetected`] if the graph is not acyclic.
/// - [`EngineError::UnreachableNode`] for nodes the trigger can't reach.
pub fn validate_graph(graph: &WorkflowGraph) -> Result<Vec<String>, EngineError> {
    // -----------------------------------------------------------------------
    // 1. Ensure node IDs are unique
    // -----------------------------------------------------------------------
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &graph.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            return Err(EngineError::DuplicateNodeId(node.id.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Validate edge endpoints
    // -----------------------------------------------------------------------
    for edge in &graph.edges {
        if !seen_ids.contains(edge.from.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: edge.from.clone(),
                side: "from",
            });
        }
        if !seen_ids.contains(edge.to.as_str()) {
            return Err(EngineError::UnknownNodeReference {
                node_id: edge.to.clone(),
                side: "to",
            });
        }
    }

    // -----------------------------------------------------------------------
    // 3. Exactly one trigger
    // -----------------------------------------------------------------------
    let triggers: Vec<&WorkflowNode> = graph
        .nodes
        .iter()
        .filter(|n| matches!(n.kind, NodeKind::Trigger(_)))
        .collect();
    let trigger = match triggers.as_slice() {
        [] => return Err(EngineError::MissingTrigger),
        [only] => *only,
        many => return Err(EngineError::MultipleTriggers(many.len())),
    };

    // -----------------------------------------------------------------------
    // 4-6. Per-node shape
    // -----------------------------------------------------------------------
    for node in &graph.nodes {
        check_node(graph, node)?;
    }

    // -----------------------------------------------------------------------
    // 7. Topological sort (Kahn's algorithm)
    // -----------------------------------------------------------------------
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();

    for node in &graph.nodes {
        adjacency.entry(node.id.as_str()).or_default();
        in_degree.entry(node.id.as_str()).or_insert(0);
    }

    for edge in &graph.edges {
        adjacency
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
        *in_degree.entry(edge.to.as_str()).or_insert(0) += 1;
    }

    // Seed in declaration order so the result is stable.
    let mut queue: VecDeque<&str> = graph
        .nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();

    let mut sorted: Vec<String> = Vec::with_capacity(graph.nodes.len());

    while let Some(node_id) = queue.pop_front() {
        sorted.push(node_id.to_owned());

        if let Some(neighbours) = adjacency.get(node_id) {
            for &neighbour in neighbours {
                let deg = in_degree.entry(neighbour).or_insert(0);
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(neighbour);
                }
            }
        }
    }

    if sorted.len() != graph.nodes.len() {
        return Err(EngineError::CycleDetected);
    }

    // -----------------------------------------------------------------------
    // 8. Reachability from the trigger
    // -----------------------------------------------------------------------
    let mut reached: HashSet<&str> = HashSet::from([trigger.id.as_str()]);
    let mut frontier = vec![trigger.id.as_str()];
    while let Some(node_id) = frontier.pop() {
        for &next in adjacency.get(node_id).into_iter().flatten() {
            if reached.insert(next) {
                frontier.push(next);
            }
        }
    }

    if let Some(orphan) = graph.nodes.iter().find(|n| !reached.contains(n.id.as_str())) {
        return Err(EngineError::UnreachableNode(orphan.id.clone()));
    }

    Ok(sorted)
}

fn check_node(graph: &WorkflowGraph, node: &WorkflowNode) -> Result<(), EngineError> {
    let outgoing: Vec<_> = graph.outgoing(&node.id).collect();

    match &node.kind {
        NodeKind::Trigger(_) | NodeKind::Branch | NodeKind::Action(_) if outgoing.len() > 1 => {
            return Err(EngineError::TooManyOutgoingEdges {
                node_id: node.id.clone(),
                count: outgoing.len(),
            });
        }

        NodeKind::Action(action) => {
            action.validate().map_err(|message| EngineError::InvalidAction {
                node_id: node.id.clone(),
                message,
            })?;
        }

        NodeKind::Condition(spec) => {
            let mut declared: HashSet<&str> = HashSet::from([NONE_BRANCH]);
            for branch in spec.branches() {
                if !declared.insert(branch.id.as_str()) {
                    return Err(EngineError::DuplicateBranchId {
                        node_id: node.id.clone(),
                        branch_id: branch.id.clone(),
                    });
                }
                if branch.conditions.is_empty() {
                    return Err(EngineError::EmptyBranch {
                        node_id: node.id.clone(),
                        branch_id: branch.id.clone(),
                    });
                }
                for condition in &branch.conditions {
                    check_condition(condition)?;
                }
            }

            for edge in &outgoing {
                let branch_id = edge.branch_id.as_deref().unwrap_or_default();
                if !declared.contains(branch_id) {
                    return Err(EngineError::DanglingBranchEdge {
                        node_id: node.id.clone(),
                        branch_id: branch_id.to_owned(),
                    });
                }
            }

            let branch_ids = spec
                .branches()
                .iter()
                .map(|b| b.id.as_str())
                .chain(std::iter::once(NONE_BRANCH));
            for branch_id in branch_ids {
                let edges: Vec<_> = outgoing
                    .iter()
                    .filter(|e| e.branch_id.as_deref() == Some(branch_id))
                    .collect();
                if edges.len() != 1 {
                    return Err(EngineError::BranchEdgeCount {
                        node_id: node.id.clone(),
                        branch_id: branch_id.to_owned(),
                        count: edges.len(),
                    });
                }
                let lands_on_branch = graph
                    .node(&edges[0].to)
                    .is_some_and(|target| matches!(target.kind, NodeKind::Branch));
                if !lands_on_branch {
                    return Err(EngineError::BranchTargetNotBranch {
                        node_id: node.id.clone(),
                        branch_id: branch_id.to_owned(),
                    });
                }
            }
        }

        NodeKind::Trigger(_) | NodeKind::Branch => {}
    }

    Ok(())
}
