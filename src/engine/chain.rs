use std::collections::HashMap;

use crate::engine::error::RoutingError;
use crate::engine::models::{Position, PositionKey};

/// Parent links of one leg. Each position is linked to the parent it was first reached from.
#[derive(Debug, Clone)]
pub struct ParentChain {
    entries: HashMap<PositionKey, (Position, Option<PositionKey>)>,
}

impl ParentChain {
    pub fn with_root(root: Position) -> Self {
        let mut entries = HashMap::new();
        entries.insert(root.key(), (root, None));
        Self { entries }
    }

    /// Links `child` to `parent` unless `child` already has an entry. Returns true when inserted.
    pub fn record(&mut self, child: Position, parent: &Position) -> bool {
        let key = child.key();
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, (child, Some(parent.key())));
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Path from the root to `position`, both included.
    pub fn backtrace(&self, position: &Position) -> Result<Vec<Position>, RoutingError> {
        let mut path = Vec::new();
        let mut cursor = Some(position.key());

        while let Some(key) = cursor {
            if path.len() > self.entries.len() {
                return Err(RoutingError::BrokenChain(format!(
                    "cycle while walking back from ({}, {})",
                    position.lat, position.lon
                )));
            }
            let (stored, parent) = self.entries.get(&key).ok_or_else(|| {
                RoutingError::BrokenChain(format!("no entry for {:?} reached from ({}, {})", key, position.lat, position.lon))
            })?;
            path.push(*stored);
            cursor = *parent;
        }

        path.reverse();
        Ok(path)
    }
}
