//! Turns a zone's configured mapping into the ordered action list to run.

use hashbrown::HashSet;
use serde::Serialize;
use zonekeeper_types::{LifecycleConfig, WILDCARD_ZONE};

use super::action::{Direction, LifecycleAction, default_actions};

/// Where a resolved list came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum ResolutionSource {
    /// Lifecycle disabled, no mapping, or the mapping has no override for
    /// this direction.
    Defaults,
    /// A zone-specific mapping (the key as written in configuration).
    ZoneOverride(String),
    Wildcard,
    /// The override produced nothing usable, so the defaults ran instead.
    FallbackEmpty,
}

/// An action whose prerequisite is missing or runs after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyWarning {
    pub action: LifecycleAction,
    pub requires: LifecycleAction,
    /// True when the prerequisite is present but scheduled later.
    pub misordered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedActions {
    pub direction: Direction,
    pub actions: Vec<LifecycleAction>,
    pub source: ResolutionSource,
    pub warnings: Vec<DependencyWarning>,
}

/// Resolve the action list for `zone_id` in `direction`.
///
/// Defaults apply unless a mapping (exact zone key, else `"*"`) carries a
/// non-empty override for the direction. Overrides replace the defaults, or
/// follow them when `use_global_defaults` is set. Tokens are de-duplicated
/// keeping the first occurrence. The list is never reordered; prerequisite
/// problems are only reported.
pub fn resolve_actions(
    config: &LifecycleConfig,
    zone_id: &str,
    direction: Direction,
) -> ResolvedActions {
    let defaults = default_actions(direction);

    let mapping = config.enabled.then(|| config.mapping_for(zone_id)).flatten();

    let (actions, source) = match mapping {
        None => (defaults.to_vec(), ResolutionSource::Defaults),
        Some((key, mapping)) => {
            let tokens = match direction {
                Direction::Enter => &mapping.on_enter,
                Direction::Exit => &mapping.on_exit,
            };

            if tokens.iter().all(|t| t.trim().is_empty()) {
                (defaults.to_vec(), ResolutionSource::Defaults)
            } else {
                let mut working: Vec<LifecycleAction> = Vec::new();
                if mapping.use_global_defaults {
                    working.extend_from_slice(defaults);
                }
                working.extend(tokens.iter().filter_map(|t| LifecycleAction::parse(t, direction)));

                let working = dedupe(working);
                if working.is_empty() {
                    (defaults.to_vec(), ResolutionSource::FallbackEmpty)
                } else if key == WILDCARD_ZONE {
                    (working, ResolutionSource::Wildcard)
                } else {
                    (working, ResolutionSource::ZoneOverride(key.to_string()))
                }
            }
        }
    };

    let warnings = check_dependencies(&actions);
    for warning in &warnings {
        // Overrides often drop prerequisites on purpose; running one too
        // late is the real mistake.
        if warning.misordered {
            tracing::warn!(
                zone = %zone_id,
                direction = %direction,
                action = %warning.action,
                requires = %warning.requires,
                "Lifecycle action runs before its prerequisite"
            );
        } else {
            tracing::debug!(
                zone = %zone_id,
                direction = %direction,
                action = %warning.action,
                requires = %warning.requires,
                "Lifecycle action prerequisite not in pipeline"
            );
        }
    }

    ResolvedActions {
        direction,
        actions,
        source,
        warnings,
    }
}

fn dedupe(actions: Vec<LifecycleAction>) -> Vec<LifecycleAction> {
    let mut seen = HashSet::new();
    actions
        .into_iter()
        .filter(|action| seen.insert(action.token().to_string()))
        .collect()
}

/// Report every prerequisite that is absent or scheduled after its dependent.
pub fn check_dependencies(actions: &[LifecycleAction]) -> Vec<DependencyWarning> {
    let mut warnings = Vec::new();
    for (i, action) in actions.iter().enumerate() {
        for required in action.requires() {
            if actions[..i].contains(required) {
                continue;
            }
            warnings.push(DependencyWarning {
                action: action.clone(),
                requires: required.clone(),
                misordered: actions[i + 1..].contains(required),
            });
        }
    }
    warnings
}
