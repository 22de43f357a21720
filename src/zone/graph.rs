use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

use super::store::ZoneRepository;
use crate::error::{Result, ZoneError};
use crate::model::{IncludeEdge, ZoneId, ZoneKind, ZoneNode};

/// Decision returned by a traversal callback for each reached node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Keep the node and walk its children
    Expand,
    /// Do not walk below this node
    Prune,
}

#[derive(Debug, Default)]
struct GraphState {
    /// Outgoing edges per parent, kept sorted by position
    children: HashMap<ZoneId, Vec<IncludeEdge>>,
    /// Incoming parents per include
    parents: HashMap<ZoneId, BTreeSet<ZoneId>>,
}

impl GraphState {
    fn edge(&self, parent: ZoneId, include: ZoneId) -> Option<&IncludeEdge> {
        self.children
            .get(&parent)
            .and_then(|edges| edges.iter().find(|e| e.include_id == include))
    }

    fn insert(&mut self, edge: IncludeEdge) {
        let edges = self.children.entry(edge.parent_id).or_default();
        edges.retain(|e| e.include_id != edge.include_id);
        edges.push(edge);
        edges.sort_by_key(|e| (e.position, e.include_id));
        self.parents
            .entry(edge.include_id)
            .or_default()
            .insert(edge.parent_id);
    }

    fn remove(&mut self, parent: ZoneId, include: ZoneId) -> bool {
        let removed = match self.children.get_mut(&parent) {
            Some(edges) => {
                let before = edges.len();
                edges.retain(|e| e.include_id != include);
                let removed = edges.len() != before;
                if edges.is_empty() {
                    self.children.remove(&parent);
                }
                removed
            }
            None => false,
        };

        if removed {
            if let Some(parents) = self.parents.get_mut(&include) {
                parents.remove(&parent);
                if parents.is_empty() {
                    self.parents.remove(&include);
                }
            }
        }
        removed
    }

    /// Is `target` reachable from `start` by following edges downward
    fn reaches(&self, start: ZoneId, target: ZoneId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![start];

        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(edges) = self.children.get(&current) {
                stack.extend(edges.iter().map(|e| e.include_id));
            }
        }
        false
    }
}

/// Ordered include attachments between zones.
///
/// Traversals carry their own visited set, so concurrent readers never
/// share mutable state. Cycles are refused at attach time; traversal still
/// tolerates them in data loaded from elsewhere.
#[derive(Debug, Default)]
pub struct IncludeGraph {
    state: RwLock<GraphState>,
}

impl IncludeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from stored edges as-is.
    ///
    /// Stored data may legitimately share one include between several
    /// parents, so no single-parent policy is applied here.
    pub fn from_edges(edges: impl IntoIterator<Item = IncludeEdge>) -> Self {
        let mut state = GraphState::default();
        for edge in edges {
            state.insert(edge);
        }
        Self {
            state: RwLock::new(state),
        }
    }

    /// Every edge, grouped by parent and ordered by position
    pub fn edges(&self) -> Vec<IncludeEdge> {
        let state = self.state.read();
        let mut parents: Vec<_> = state.children.keys().copied().collect();
        parents.sort_unstable();
        parents
            .into_iter()
            .flat_map(|p| state.children[&p].clone())
            .collect()
    }

    /// Direct children of `zone_id` in emission order
    pub fn children(&self, zone_id: ZoneId) -> Vec<IncludeEdge> {
        self.state
            .read()
            .children
            .get(&zone_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn parents(&self, zone_id: ZoneId) -> Vec<ZoneId> {
        self.state
            .read()
            .parents
            .get(&zone_id)
            .map(|p| p.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of direct children
    pub fn include_count(&self, zone_id: ZoneId) -> usize {
        self.state
            .read()
            .children
            .get(&zone_id)
            .map_or(0, Vec::len)
    }

    /// True when attaching `include_id` under `parent_id` would make the
    /// parent its own descendant.
    pub fn would_create_cycle(&self, parent_id: ZoneId, include_id: ZoneId) -> bool {
        parent_id == include_id || self.state.read().reaches(include_id, parent_id)
    }

    /// Attach an include under a parent at `position`.
    ///
    /// An include has one parent at a time: attaching it elsewhere moves the
    /// edge. Re-attaching the same pair at the same position is a no-op; at a
    /// different position it is refused in favour of [`Self::reposition`].
    pub fn attach(
        &self,
        zones: &dyn ZoneRepository,
        parent_id: ZoneId,
        include_id: ZoneId,
        position: i32,
    ) -> Result<()> {
        zones.zone(parent_id).ok_or(ZoneError::NotFound(parent_id))?;
        let include = zones
            .zone(include_id)
            .ok_or(ZoneError::NotFound(include_id))?;

        if include.kind != ZoneKind::Include {
            return Err(ZoneError::InvalidEdge(format!(
                "zone {} is a {} and cannot be attached as an include",
                include_id, include.kind
            )));
        }

        let mut state = self.state.write();

        if let Some(existing) = state.edge(parent_id, include_id) {
            if existing.position == position {
                debug!(parent_id, include_id, position, "Include already attached");
                return Ok(());
            }
            return Err(ZoneError::InvalidEdge(format!(
                "include {} is already attached to {} at position {}; reposition it instead",
                include_id, parent_id, existing.position
            )));
        }

        if parent_id == include_id || state.reaches(include_id, parent_id) {
            return Err(ZoneError::Cycle {
                parent: parent_id,
                include: include_id,
            });
        }

        let previous: Vec<ZoneId> = state
            .parents
            .get(&include_id)
            .map(|p| p.iter().copied().collect())
            .unwrap_or_default();
        for old_parent in previous {
            info!(
                include_id,
                old_parent, new_parent = parent_id, "Moving include to new parent"
            );
            state.remove(old_parent, include_id);
        }

        state.insert(IncludeEdge::new(parent_id, include_id, position));
        info!(parent_id, include_id, position, "Include attached");
        Ok(())
    }

    /// Move an existing edge to a new sibling position
    pub fn reposition(&self, parent_id: ZoneId, include_id: ZoneId, position: i32) -> Result<()> {
        let mut state = self.state.write();
        if state.edge(parent_id, include_id).is_none() {
            return Err(ZoneError::InvalidEdge(format!(
                "include {} is not attached to {}",
                include_id, parent_id
            )));
        }
        state.insert(IncludeEdge::new(parent_id, include_id, position));
        debug!(parent_id, include_id, position, "Include repositioned");
        Ok(())
    }

    /// Remove an edge; returns false when it did not exist
    pub fn detach(&self, parent_id: ZoneId, include_id: ZoneId) -> bool {
        let removed = self.state.write().remove(parent_id, include_id);
        if removed {
            info!(parent_id, include_id, "Include detached");
        } else {
            debug!(parent_id, include_id, "Detach requested for missing edge");
        }
        removed
    }

    /// Depth-first, pre-order walk below `root`.
    ///
    /// `visit` sees every reachable node once, first occurrence wins, along
    /// with its depth (direct children are depth 1). The root itself is not
    /// passed to `visit` but counts as visited.
    pub fn traverse<F>(&self, root: ZoneId, mut visit: F)
    where
        F: FnMut(ZoneId, usize) -> Visit,
    {
        let mut visited = HashSet::from([root]);
        let mut stack: Vec<(ZoneId, usize)> = self
            .children(root)
            .iter()
            .rev()
            .map(|e| (e.include_id, 1))
            .collect();

        while let Some((current, depth)) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if visit(current, depth) == Visit::Prune {
                continue;
            }
            stack.extend(
                self.children(current)
                    .iter()
                    .rev()
                    .map(|e| (e.include_id, depth + 1)),
            );
        }
    }

    /// Active nodes reachable from `zone_id`, in concatenation order.
    ///
    /// Missing or inactive nodes are left out along with everything only
    /// reachable through them.
    pub fn descendants(&self, zones: &dyn ZoneRepository, zone_id: ZoneId) -> Vec<ZoneNode> {
        let mut nodes = Vec::new();
        self.traverse(zone_id, |id, _| match zones.zone(id) {
            Some(node) if node.is_active() => {
                nodes.push(node);
                Visit::Expand
            }
            _ => Visit::Prune,
        });
        nodes
    }

    /// Active direct children in position order
    pub fn active_children(&self, zones: &dyn ZoneRepository, zone_id: ZoneId) -> Vec<ZoneNode> {
        self.children(zone_id)
            .iter()
            .filter_map(|e| zones.zone(e.include_id))
            .filter(ZoneNode::is_active)
            .collect()
    }
}
