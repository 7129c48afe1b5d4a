//! In-memory reference store.

use std::collections::HashMap;
use std::sync::RwLock;

use sheets_types::ObjectId;
use tracing::debug;

use crate::error::{RefError, RefResult};
use crate::traits::RefStore;

/// A `HashMap`-backed [`RefStore`]. Data is lost when the store is dropped.
#[derive(Debug, Default)]
pub struct InMemoryRefStore {
    refs: RwLock<HashMap<String, ObjectId>>,
}

impl InMemoryRefStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> RefError {
    RefError::LockPoisoned(e.to_string())
}

impl RefStore for InMemoryRefStore {
    fn read_ref(&self, name: &str) -> RefResult<Option<ObjectId>> {
        let refs = self.refs.read().map_err(poisoned)?;
        Ok(refs.get(name).copied())
    }

    fn update_ref(
        &self,
        name: &str,
        new: ObjectId,
        expected_old: Option<ObjectId>,
    ) -> RefResult<()> {
        let mut refs = self.refs.write().map_err(poisoned)?;
        if let Some(expected) = expected_old {
            let actual = refs.get(name).copied();
            if actual != Some(expected) {
                return Err(RefError::Conflict {
                    name: name.to_string(),
                    expected,
                    actual,
                });
            }
        }
        refs.insert(name.to_string(), new);
        debug!(name, to = %new.short_hex(), "updated ref");
        Ok(())
    }

    fn delete_ref(&self, name: &str) -> RefResult<bool> {
        let mut refs = self.refs.write().map_err(poisoned)?;
        let existed = refs.remove(name).is_some();
        if existed {
            debug!(name, "deleted ref");
        }
        Ok(existed)
    }

    fn list_refs(&self, prefix: &str) -> RefResult<Vec<(String, ObjectId)>> {
        let refs = self.refs.read().map_err(poisoned)?;
        let mut result: Vec<(String, ObjectId)> = refs
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        result.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(result)
    }
}
