//! Capacity-bounded ledger of entities spawned as zone side effects.
//!
//! Entities are grouped by (zone, category). A reverse index maps each
//! handle back to its group so a single entity can be dropped in O(1) when
//! the host destroys it independently (a buff expiring, a structure
//! decaying). Both indexes live behind one mutex, so every call is atomic
//! with respect to the others and they can never disagree.
//!
//! The registry never touches the world: clearing returns the handles and
//! the caller destroys them.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use hashbrown::{HashMap, HashSet};
use serde::Serialize;
use zonekeeper_types::RegistryConfig;

use super::RegistryError;
use crate::ids::{EntityHandle, fold_key};
use crate::spatial::Position;

/// Describes the spawn that produced a category's current entities.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpawnMetadata {
    pub spawned_at: DateTime<Utc>,
    pub count: usize,
    pub origin: Position,
    pub source_name: String,
}

/// Capacity ceilings, fixed for the lifetime of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryLimits {
    pub max_per_zone: usize,
    pub max_per_category: usize,
}

impl RegistryLimits {
    pub fn from_config(config: &RegistryConfig) -> Self {
        Self {
            max_per_zone: config.max_entities_per_zone.max(1),
            max_per_category: config.max_entities_per_category.max(1),
        }
    }
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self::from_config(&RegistryConfig::default())
    }
}

/// Count row for operational visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub zone_id: String,
    pub category: String,
    pub count: usize,
}

#[derive(Debug, Default)]
struct CategoryEntry {
    /// Category name as first registered (keys are case-folded).
    name: String,
    entities: Vec<EntityHandle>,
    metadata: Option<SpawnMetadata>,
}

#[derive(Debug, Default)]
struct ZoneEntry {
    name: String,
    categories: HashMap<String, CategoryEntry>,
    total: usize,
}

#[derive(Debug, Default)]
struct Owner {
    zone_key: String,
    category_key: String,
}

#[derive(Debug, Default)]
struct Inner {
    zones: HashMap<String, ZoneEntry>,
    owners: HashMap<EntityHandle, Owner>,
}

impl Inner {
    /// Drop a category and its reverse entries; prunes the zone if empty.
    fn remove_category(&mut self, zone_key: &str, category_key: &str) -> Vec<EntityHandle> {
        let Some(zone) = self.zones.get_mut(zone_key) else {
            return Vec::new();
        };
        let Some(entry) = zone.categories.remove(category_key) else {
            return Vec::new();
        };

        zone.total -= entry.entities.len();
        if zone.categories.is_empty() {
            self.zones.remove(zone_key);
        }
        for handle in &entry.entities {
            self.owners.remove(handle);
        }
        entry.entities
    }
}

/// Ledger of spawned entities per (zone, category) under hard ceilings.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    limits: RegistryLimits,
    inner: Mutex<Inner>,
}

impl EntityRegistry {
    pub fn new(limits: RegistryLimits) -> Self {
        Self {
            limits,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn limits(&self) -> RegistryLimits {
        self.limits
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // No code path panics while holding the lock, so a poisoned mutex
        // still guards consistent maps.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Admit all of `handles` under (zone, category), or none of them.
    ///
    /// On refusal nothing changes and the caller must destroy the entities
    /// it already created. `metadata`, when given, replaces the category's
    /// previous metadata.
    pub fn register(
        &self,
        zone_id: &str,
        category: &str,
        handles: &[EntityHandle],
        metadata: Option<SpawnMetadata>,
    ) -> Result<(), RegistryError> {
        let zone_key = fold_key(zone_id);
        let category_key = fold_key(category);
        if zone_key.is_empty() {
            return Err(RegistryError::EmptyZone);
        }
        if category_key.is_empty() {
            return Err(RegistryError::EmptyCategory);
        }
        if handles.is_empty() {
            return Err(RegistryError::NoHandles);
        }

        let mut batch = HashSet::with_capacity(handles.len());
        for handle in handles {
            if !batch.insert(*handle) {
                return Err(RegistryError::DuplicateHandle { handle: *handle });
            }
        }

        let mut inner = self.lock();

        if let Some(owner) = handles.iter().find_map(|h| inner.owners.get(h).map(|o| (h, o))) {
            let (handle, owner) = owner;
            return Err(RegistryError::AlreadyTracked {
                handle: *handle,
                zone_id: owner.zone_key.clone(),
                category: owner.category_key.clone(),
            });
        }

        let zone_total = inner.zones.get(&zone_key).map_or(0, |z| z.total);
        if zone_total + handles.len() > self.limits.max_per_zone {
            return Err(RegistryError::ZoneCapacity {
                zone_id: zone_id.trim().to_string(),
                current: zone_total,
                adding: handles.len(),
                limit: self.limits.max_per_zone,
            });
        }

        let category_total = inner
            .zones
            .get(&zone_key)
            .and_then(|z| z.categories.get(&category_key))
            .map_or(0, |c| c.entities.len());
        if category_total + handles.len() > self.limits.max_per_category {
            return Err(RegistryError::CategoryCapacity {
                zone_id: zone_id.trim().to_string(),
                category: category.trim().to_string(),
                current: category_total,
                adding: handles.len(),
                limit: self.limits.max_per_category,
            });
        }

        // All checks passed; commit forward and reverse entries together.
        let zone = inner.zones.entry(zone_key.clone()).or_insert_with(|| ZoneEntry {
            name: zone_id.trim().to_string(),
            ..Default::default()
        });
        let entry = zone
            .categories
            .entry(category_key.clone())
            .or_insert_with(|| CategoryEntry {
                name: category.trim().to_string(),
                ..Default::default()
            });
        entry.entities.extend_from_slice(handles);
        if metadata.is_some() {
            entry.metadata = metadata;
        }
        zone.total += handles.len();

        for handle in handles {
            inner.owners.insert(
                *handle,
                Owner {
                    zone_key: zone_key.clone(),
                    category_key: category_key.clone(),
                },
            );
        }

        tracing::debug!(
            zone = %zone_id,
            category = %category,
            added = handles.len(),
            zone_total = zone_total + handles.len(),
            "Registered spawned entities"
        );
        Ok(())
    }

    /// Handles tracked for (zone, category), or `None` if there are none.
    pub fn try_get_entities(&self, zone_id: &str, category: &str) -> Option<Vec<EntityHandle>> {
        let inner = self.lock();
        inner
            .zones
            .get(&fold_key(zone_id))?
            .categories
            .get(&fold_key(category))
            .filter(|c| !c.entities.is_empty())
            .map(|c| c.entities.clone())
    }

    pub fn metadata(&self, zone_id: &str, category: &str) -> Option<SpawnMetadata> {
        let inner = self.lock();
        inner
            .zones
            .get(&fold_key(zone_id))?
            .categories
            .get(&fold_key(category))?
            .metadata
            .clone()
    }

    /// Stop tracking (zone, category). Returns the handles that were tracked
    /// so the caller can destroy them.
    pub fn clear_category(&self, zone_id: &str, category: &str) -> Vec<EntityHandle> {
        let removed = self
            .lock()
            .remove_category(&fold_key(zone_id), &fold_key(category));
        if !removed.is_empty() {
            tracing::debug!(zone = %zone_id, category = %category, removed = removed.len(), "Cleared category");
        }
        removed
    }

    /// Stop tracking every category in `zone_id`.
    pub fn clear_zone(&self, zone_id: &str) -> Vec<EntityHandle> {
        let zone_key = fold_key(zone_id);
        let mut inner = self.lock();
        let category_keys: Vec<String> = match inner.zones.get(&zone_key) {
            Some(zone) => zone.categories.keys().cloned().collect(),
            None => return Vec::new(),
        };

        let mut removed = Vec::new();
        for category_key in category_keys {
            removed.extend(inner.remove_category(&zone_key, &category_key));
        }
        tracing::debug!(zone = %zone_id, removed = removed.len(), "Cleared zone");
        removed
    }

    /// Forget a single handle destroyed elsewhere. Returns false if unknown.
    pub fn remove_handle(&self, handle: EntityHandle) -> bool {
        let mut inner = self.lock();
        let Some(owner) = inner.owners.remove(&handle) else {
            return false;
        };

        let Some(zone) = inner.zones.get_mut(&owner.zone_key) else {
            return true;
        };
        if let Some(entry) = zone.categories.get_mut(&owner.category_key)
            && let Some(pos) = entry.entities.iter().position(|h| *h == handle)
        {
            entry.entities.remove(pos);
            zone.total -= 1;
            if entry.entities.is_empty() {
                zone.categories.remove(&owner.category_key);
            }
        }
        if zone.categories.is_empty() {
            inner.zones.remove(&owner.zone_key);
        }
        true
    }

    /// Drop everything (shutdown). Returns every handle that was tracked.
    pub fn clear_all(&self) -> Vec<EntityHandle> {
        let mut inner = self.lock();
        inner.owners.clear();
        inner
            .zones
            .drain()
            .flat_map(|(_, zone)| zone.categories.into_values())
            .flat_map(|entry| entry.entities)
            .collect()
    }

    pub fn count(&self, zone_id: &str, category: &str) -> usize {
        let inner = self.lock();
        inner
            .zones
            .get(&fold_key(zone_id))
            .and_then(|z| z.categories.get(&fold_key(category)))
            .map_or(0, |c| c.entities.len())
    }

    pub fn is_non_empty(&self, zone_id: &str, category: &str) -> bool {
        self.count(zone_id, category) > 0
    }

    pub fn zone_total(&self, zone_id: &str) -> usize {
        self.lock().zones.get(&fold_key(zone_id)).map_or(0, |z| z.total)
    }

    /// (zone, category) that owns `handle`, as originally named.
    pub fn owner_of(&self, handle: EntityHandle) -> Option<(String, String)> {
        let inner = self.lock();
        let owner = inner.owners.get(&handle)?;
        let zone = inner.zones.get(&owner.zone_key)?;
        let entry = zone.categories.get(&owner.category_key)?;
        Some((zone.name.clone(), entry.name.clone()))
    }

    pub fn tracked_handles(&self) -> usize {
        self.lock().owners.len()
    }

    pub fn spawned_zones(&self) -> Vec<String> {
        let mut zones: Vec<String> = self.lock().zones.values().map(|z| z.name.clone()).collect();
        zones.sort();
        zones
    }

    pub fn categories(&self, zone_id: &str) -> Vec<String> {
        let inner = self.lock();
        let mut names: Vec<String> = inner
            .zones
            .get(&fold_key(zone_id))
            .map(|z| z.categories.values().map(|c| c.name.clone()).collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Counts for every tracked (zone, category), sorted.
    pub fn snapshot(&self) -> Vec<CategoryCount> {
        let inner = self.lock();
        let mut rows: Vec<CategoryCount> = inner
            .zones
            .values()
            .flat_map(|zone| {
                zone.categories.values().map(|entry| CategoryCount {
                    zone_id: zone.name.clone(),
                    category: entry.name.clone(),
                    count: entry.entities.len(),
                })
            })
            .collect();
        rows.sort_by(|a, b| (&a.zone_id, &a.category).cmp(&(&b.zone_id, &b.category)));
        rows
    }

    /// Check forward/reverse agreement and both ceilings.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let inner = self.lock();
        let mut forward = 0;
        for (zone_key, zone) in &inner.zones {
            assert!(!zone.categories.is_empty(), "empty zone {} left behind", zone_key);
            let sum: usize = zone.categories.values().map(|c| c.entities.len()).sum();
            assert_eq!(sum, zone.total, "zone {} total drifted", zone_key);
            assert!(zone.total <= self.limits.max_per_zone);
            for (category_key, entry) in &zone.categories {
                assert!(!entry.entities.is_empty());
                assert!(entry.entities.len() <= self.limits.max_per_category);
                for handle in &entry.entities {
                    let owner = inner.owners.get(handle).expect("handle missing from reverse index");
                    assert_eq!(&owner.zone_key, zone_key);
                    assert_eq!(&owner.category_key, category_key);
                }
            }
            forward += zone.total;
        }
        assert_eq!(forward, inner.owners.len(), "reverse index has orphans");
    }
}
