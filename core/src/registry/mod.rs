//! Bookkeeping for entities spawned as zone side effects.

pub mod entity_registry;


pub use entity_registry::{CategoryCount, EntityRegistry, RegistryLimits, SpawnMetadata};

use thiserror::Error;

use crate::ids::EntityHandle;

/// Why a registration was refused. Nothing was recorded; the caller still
/// owns (and must destroy) the entities it created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("zone id is empty")]
    EmptyZone,

    #[error("category is empty")]
    EmptyCategory,

    #[error("no entity handles given")]
    NoHandles,

    #[error("handle {handle} appears twice in one registration")]
    DuplicateHandle { handle: EntityHandle },

    #[error("handle {handle} is already tracked under {zone_id}/{category}")]
    AlreadyTracked {
        handle: EntityHandle,
        zone_id: String,
        category: String,
    },

    #[error("zone {zone_id} would exceed its limit ({current} + {adding} > {limit})")]
    ZoneCapacity {
        zone_id: String,
        current: usize,
        adding: usize,
        limit: usize,
    },

    #[error("category {zone_id}/{category} would exceed its limit ({current} + {adding} > {limit})")]
    CategoryCapacity {
        zone_id: String,
        category: String,
        current: usize,
        adding: usize,
        limit: usize,
    },
}
