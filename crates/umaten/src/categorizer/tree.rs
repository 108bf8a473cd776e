//! Backend category tree, loaded once per session and swapped wholesale on reload.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

pub type CategoryId = u64;

/// Flat category record as listed by the content backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: CategoryId,
    pub name: String,
    /// `None` or `Some(0)` marks a top-level category.
    #[serde(default)]
    pub parent: Option<CategoryId>,
    #[serde(default)]
    pub count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryNode {
    pub id: CategoryId,
    pub name: String,
    /// Back-reference used for path lookup only.
    pub parent: Option<CategoryId>,
    pub children: Vec<CategoryId>,
    pub count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryTree {
    nodes: HashMap<CategoryId, CategoryNode>,
    roots: Vec<CategoryId>,
    by_name: HashMap<String, CategoryId>,
}

impl CategoryTree {
    /// Builds the tree from a flat list. Children keep input order; records whose
    /// parent is unknown become roots. Duplicate ids keep the first record.
    pub fn from_records(records: Vec<CategoryRecord>) -> Self {
        let mut nodes: HashMap<CategoryId, CategoryNode> = HashMap::with_capacity(records.len());
        let mut order = Vec::with_capacity(records.len());
        let mut by_name = HashMap::new();

        for record in records {
            if nodes.contains_key(&record.id) {
                log::warn!("Duplicate category id {} ignored", record.id);
                continue;
            }
            by_name.entry(record.name.clone()).or_insert(record.id);
            order.push(record.id);
            nodes.insert(
                record.id,
                CategoryNode {
                    id: record.id,
                    name: record.name,
                    parent: record.parent.filter(|p| *p != 0),
                    children: Vec::new(),
                    count: record.count,
                },
            );
        }

        let mut roots = Vec::new();
        for id in order {
            let parent = nodes.get(&id).and_then(|n| n.parent);
            match parent {
                Some(parent_id) if parent_id != id && nodes.contains_key(&parent_id) => {
                    if let Some(parent_node) = nodes.get_mut(&parent_id) {
                        parent_node.children.push(id);
                    }
                }
                _ => {
                    if let Some(node) = nodes.get_mut(&id) {
                        node.parent = None;
                    }
                    roots.push(id);
                }
            }
        }

        Self {
            nodes,
            roots,
            by_name,
        }
    }

    pub fn get(&self, id: CategoryId) -> Option<&CategoryNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: CategoryId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Case-sensitive exact lookup by display name.
    pub fn find_by_name(&self, name: &str) -> Option<&CategoryNode> {
        self.by_name.get(name).and_then(|id| self.nodes.get(id))
    }

    pub fn roots(&self) -> impl Iterator<Item = &CategoryNode> {
        self.roots.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Parents of `id`, nearest first. Stops on a cycle.
    pub fn ancestors(&self, id: CategoryId) -> Vec<&CategoryNode> {
        let mut result = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut current = self.nodes.get(&id).and_then(|n| n.parent);

        while let Some(parent_id) = current {
            if !seen.insert(parent_id) {
                break;
            }
            match self.nodes.get(&parent_id) {
                Some(node) => {
                    result.push(node);
                    current = node.parent;
                }
                None => break,
            }
        }

        result
    }

    /// Pre-order walk of the tree as `(depth, node)` pairs.
    pub fn depth_first(&self) -> Vec<(usize, &CategoryNode)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, CategoryId)> =
            self.roots.iter().rev().map(|id| (0, *id)).collect();

        while let Some((depth, id)) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            out.push((depth, node));
            for child in node.children.iter().rev() {
                stack.push((depth + 1, *child));
            }
        }

        out
    }
}

/// The active category tree. Readers take an `Arc` snapshot that stays valid
/// across a concurrent reload.
pub struct CategoryCatalog {
    current: RwLock<Arc<CategoryTree>>,
}

impl CategoryCatalog {
    pub fn new(tree: CategoryTree) -> Self {
        Self {
            current: RwLock::new(Arc::new(tree)),
        }
    }

    pub fn current(&self) -> Arc<CategoryTree> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => {
                log::warn!("Category catalog lock was poisoned, recovering");
                Arc::clone(&poisoned.into_inner())
            }
        }
    }

    pub fn reload(&self, tree: CategoryTree) {
        let count = tree.len();
        let mut guard = match self.current.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Category catalog lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        *guard = Arc::new(tree);
        log::info!("Category tree reloaded ({} categories)", count);
    }
}

impl Default for CategoryCatalog {
    fn default() -> Self {
        Self::new(CategoryTree::default())
    }
}
