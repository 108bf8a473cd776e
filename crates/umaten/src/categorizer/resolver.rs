use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::schema::CategoryConfig;

use super::tree::{CategoryId, CategoryTree};

/// How a job chooses its backend categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "ids")]
pub enum CategoryDirective {
    /// Use exactly these categories (unknown ids are dropped).
    Explicit(Vec<CategoryId>),
    /// Match the category names found while scraping.
    AutoDetect,
}

pub struct CategoryResolver {
    aliases: HashMap<String, String>,
    uncategorized_id: CategoryId,
    include_ancestors: bool,
}

impl CategoryResolver {
    pub fn new(config: &CategoryConfig) -> Self {
        Self {
            aliases: config.aliases.clone(),
            uncategorized_id: config.uncategorized_id,
            include_ancestors: config.include_ancestors,
        }
    }

    /// Resolves a directive against `tree`. Never fails: explicit ids missing
    /// from the tree are dropped, and auto-detection with no match falls back to
    /// the uncategorized id. Result is deduplicated and keeps first-seen order.
    pub fn resolve(
        &self,
        directive: &CategoryDirective,
        detected_names: &[String],
        tree: &CategoryTree,
    ) -> Vec<CategoryId> {
        match directive {
            CategoryDirective::Explicit(ids) => {
                let mut resolved = Vec::with_capacity(ids.len());
                for id in ids {
                    if !tree.contains(*id) {
                        log::debug!("Dropping unknown category id {}", id);
                        continue;
                    }
                    push_unique(&mut resolved, *id);
                }
                resolved
            }
            CategoryDirective::AutoDetect => self.detect(detected_names, tree),
        }
    }

    fn detect(&self, names: &[String], tree: &CategoryTree) -> Vec<CategoryId> {
        let mut resolved = Vec::new();

        for name in names {
            let node = tree.find_by_name(name).or_else(|| {
                self.aliases
                    .get(name)
                    .and_then(|target| tree.find_by_name(target))
            });

            let Some(node) = node else {
                log::debug!("No category matches '{}'", name);
                continue;
            };

            push_unique(&mut resolved, node.id);
            if self.include_ancestors {
                for ancestor in tree.ancestors(node.id) {
                    push_unique(&mut resolved, ancestor.id);
                }
            }
        }

        if resolved.is_empty() {
            resolved.push(self.uncategorized_id);
        }
        resolved
    }
}

fn push_unique(ids: &mut Vec<CategoryId>, id: CategoryId) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}
