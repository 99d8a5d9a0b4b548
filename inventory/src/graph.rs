//! Group nesting graph.
//!
//! Edges run from a group to each of its declared children. The graph must be
//! acyclic; ancestor chains are computed once per group, nearest first.

use std::collections::{HashMap, VecDeque};

use tracing::warn;

use crate::{
    error::{InventoryError, InventoryResult},
    parser::InventoryDocument,
};

/// Name of the implicit group containing every host.
pub const ALL_GROUP: &str = "all";

/// An ancestor of a group together with its distance (1 = direct parent).
///
/// When a group is reachable along several paths, the shortest one is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ancestor {
    pub group: usize,
    pub depth: usize,
}

#[derive(Debug, Clone)]
pub struct GroupGraph {
    names: Vec<String>,
    index: HashMap<String, usize>,
    children: Vec<Vec<usize>>,
    parents: Vec<Vec<usize>>,
    ancestors: Vec<Vec<Ancestor>>,
}

impl GroupGraph {
    /// Build the graph for `doc`.
    ///
    /// Groups referenced as children but never declared are added to the
    /// document as empty groups, and `all` is added when missing. Every other
    /// group without a parent becomes a child of `all`. Group indices follow
    /// the document's declaration order.
    pub fn build(doc: &mut InventoryDocument) -> InventoryResult<Self> {
        let undeclared: Vec<String> = doc
            .groups()
            .flat_map(|g| g.children.iter())
            .filter(|child| doc.group(child).is_none())
            .cloned()
            .collect();
        for name in undeclared {
            if doc.group(&name).is_none() {
                warn!(
                    group = %name,
                    "Child group referenced but never declared, treating as empty"
                );
                doc.group_entry(&name);
            }
        }
        doc.group_entry(ALL_GROUP);

        let names: Vec<String> = doc.groups().map(|g| g.name.clone()).collect();
        let index: HashMap<String, usize> = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        let mut children = vec![Vec::new(); names.len()];
        let mut parents = vec![Vec::new(); names.len()];
        for (from, group) in doc.groups().enumerate() {
            for child in &group.children {
                let to = index[child.as_str()];
                children[from].push(to);
                parents[to].push(from);
            }
        }

        let all = index[ALL_GROUP];
        for group in 0..names.len() {
            if group != all && parents[group].is_empty() {
                children[all].push(group);
                parents[group].push(all);
            }
        }

        let mut graph = Self {
            names,
            index,
            children,
            parents,
            ancestors: Vec::new(),
        };
        graph.check_acyclic()?;
        graph.ancestors = (0..graph.len()).map(|g| graph.walk_ancestors(g)).collect();
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name(&self, group: usize) -> &str {
        &self.names[group]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn children(&self, group: usize) -> &[usize] {
        &self.children[group]
    }

    pub fn parents(&self, group: usize) -> &[usize] {
        &self.parents[group]
    }

    /// Ancestors of `group`, nearest first; equal depths keep declaration order.
    pub fn ancestors(&self, group: usize) -> &[Ancestor] {
        &self.ancestors[group]
    }

    /// `group` and every group nested below it, each once.
    pub fn with_descendants(&self, group: usize) -> Vec<usize> {
        let mut seen = vec![false; self.len()];
        let mut out = Vec::new();
        let mut stack = vec![group];
        while let Some(g) = stack.pop() {
            if std::mem::replace(&mut seen[g], true) {
                continue;
            }
            out.push(g);
            stack.extend(self.children[g].iter().rev());
        }
        out
    }

    fn walk_ancestors(&self, group: usize) -> Vec<Ancestor> {
        let mut depth_of: Vec<Option<usize>> = vec![None; self.len()];
        let mut queue = VecDeque::from([(group, 0usize)]);
        let mut found = Vec::new();
        while let Some((g, depth)) = queue.pop_front() {
            for &parent in &self.parents[g] {
                if parent == group || depth_of[parent].is_some() {
                    continue;
                }
                depth_of[parent] = Some(depth + 1);
                found.push(Ancestor {
                    group: parent,
                    depth: depth + 1,
                });
                queue.push_back((parent, depth + 1));
            }
        }
        found.sort_by_key(|a| (a.depth, a.group));
        found
    }

    fn check_acyclic(&self) -> InventoryResult<()> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Done,
        }

        fn visit(
            graph: &GroupGraph,
            group: usize,
            marks: &mut [Mark],
            path: &mut Vec<usize>,
        ) -> Result<(), Vec<usize>> {
            marks[group] = Mark::Active;
            path.push(group);
            for &child in &graph.children[group] {
                match marks[child] {
                    Mark::Active => {
                        let start = path.iter().position(|&g| g == child).unwrap_or(0);
                        let mut cycle = path[start..].to_vec();
                        cycle.push(child);
                        return Err(cycle);
                    }
                    Mark::New => visit(graph, child, marks, path)?,
                    Mark::Done => {}
                }
            }
            path.pop();
            marks[group] = Mark::Done;
            Ok(())
        }

        let mut marks = vec![Mark::New; self.len()];
        for group in 0..self.len() {
            if marks[group] == Mark::New {
                let mut path = Vec::new();
                visit(self, group, &mut marks, &mut path).map_err(|cycle| {
                    InventoryError::CycleError {
                        cycle: cycle.into_iter().map(|g| self.names[g].clone()).collect(),
                    }
                })?;
            }
        }
        Ok(())
    }
}
