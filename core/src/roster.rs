//! Roster index: the HR/presence spreadsheet keyed by technician code.
//!
//! Built once per data refresh and treated as an immutable snapshot.
//! A technician may appear under a primary `TR` code and a secondary `TT`
//! alias; both keys resolve to the same attributes. When a code is claimed
//! twice the configured `CollisionPolicy` decides the outcome.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
    config::{CollisionPolicy, RosterConfig},
    error::{KpiError, KpiResult},
};

/// One row of the roster export, as read from the spreadsheet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RosterRow {
    pub primary_code: Option<String>,
    pub alias_code: Option<String>,
    pub display_name: Option<String>,
    pub supervisor: Option<String>,
    pub coordinator: Option<String>,
    pub city: Option<String>,
    pub employment_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// The primary code of the roster row this entry came from.
    pub primary_code: String,
    pub display_name: String,
    pub supervisor: String,
    pub coordinator: String,
    pub city: String,
    pub employment_status: String,
    unallocated: bool,
}

impl RosterEntry {
    fn unallocated(config: &RosterConfig) -> Self {
        Self {
            primary_code: String::new(),
            display_name: String::new(),
            supervisor: config.unallocated_supervisor.clone(),
            coordinator: config.unknown_coordinator.clone(),
            city: config.unknown_city.clone(),
            employment_status: config.not_found_status.clone(),
            unallocated: true,
        }
    }

    /// True for the sentinel returned when a code is not on the roster.
    pub fn is_unallocated(&self) -> bool {
        self.unallocated
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterCollision {
    pub code: String,
    /// Primary code of the row that owns `code` after the build.
    pub kept: String,
    /// Primary code of the row whose claim was discarded.
    pub discarded: String,
}

#[derive(Debug, Clone)]
pub struct RosterIndex {
    entries: HashMap<String, RosterEntry>,
    /// Codes inserted as a primary code. A later alias never displaces these.
    primaries: HashSet<String>,
    collisions: Vec<RosterCollision>,
    sentinel: RosterEntry,
}

impl RosterIndex {
    pub fn build(rows: &[RosterRow], config: &RosterConfig) -> KpiResult<Self> {
        let mut index = Self {
            entries: HashMap::new(),
            primaries: HashSet::new(),
            collisions: Vec::new(),
            sentinel: RosterEntry::unallocated(config),
        };

        for row in rows {
            let primary = normalize_code(row.primary_code.as_deref(), config);
            let alias = normalize_code(row.alias_code.as_deref(), config);
            let Some(primary) = primary else {
                continue;
            };

            let entry = RosterEntry {
                primary_code: primary.clone(),
                display_name: text_or(row.display_name.as_deref(), "", config),
                supervisor: text_or(
                    row.supervisor.as_deref(),
                    &config.unallocated_supervisor,
                    config,
                ),
                coordinator: text_or(
                    row.coordinator.as_deref(),
                    &config.unknown_coordinator,
                    config,
                ),
                city: text_or(row.city.as_deref(), &config.unknown_city, config),
                employment_status: text_or(
                    row.employment_status.as_deref(),
                    &config.default_status,
                    config,
                ),
                unallocated: false,
            };

            index.insert(&primary, &entry, true, config.collision_policy)?;
            if let Some(alias) = alias.filter(|a| *a != primary) {
                index.insert(&alias, &entry, false, config.collision_policy)?;
            }
        }

        if !index.collisions.is_empty() {
            log::warn!(
                "roster: {} code collision(s) resolved by {:?}",
                index.collisions.len(),
                config.collision_policy
            );
        }
        log::info!(
            "roster: indexed {} code(s) from {} row(s)",
            index.entries.len(),
            rows.len()
        );
        Ok(index)
    }

    fn insert(
        &mut self,
        code: &str,
        entry: &RosterEntry,
        is_primary: bool,
        policy: CollisionPolicy,
    ) -> KpiResult<()> {
        let Some(existing) = self.entries.get(code) else {
            self.entries.insert(code.to_string(), entry.clone());
            if is_primary {
                self.primaries.insert(code.to_string());
            }
            return Ok(());
        };

        // The same row re-listing its own code is not a collision.
        if existing.primary_code == entry.primary_code {
            return Ok(());
        }

        let existing_is_primary = self.primaries.contains(code);
        // A primary code always carries its own row's attributes, so a primary
        // claim displaces an alias under either ordering policy, and an alias
        // never displaces a primary.
        let replace = match policy {
            CollisionPolicy::FirstWriteWins => is_primary && !existing_is_primary,
            CollisionPolicy::LastWriteWins => is_primary || !existing_is_primary,
            CollisionPolicy::Reject => {
                return Err(KpiError::RosterCollision {
                    code: code.to_string(),
                    existing: existing.primary_code.clone(),
                    incoming: entry.primary_code.clone(),
                });
            }
        };

        let (kept, discarded) = if replace {
            (entry.primary_code.clone(), existing.primary_code.clone())
        } else {
            (existing.primary_code.clone(), entry.primary_code.clone())
        };
        log::warn!("roster: code {code} claimed by {discarded} and {kept}; keeping {kept}");
        self.collisions.push(RosterCollision {
            code: code.to_string(),
            kept,
            discarded,
        });

        if replace {
            self.entries.insert(code.to_string(), entry.clone());
            if is_primary {
                self.primaries.insert(code.to_string());
            } else {
                self.primaries.remove(code);
            }
        }
        Ok(())
    }

    /// Never fails: unknown codes resolve to the unallocated sentinel.
    pub fn lookup(&self, code: &str) -> &RosterEntry {
        self.entries.get(code).unwrap_or(&self.sentinel)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn collisions(&self) -> &[RosterCollision] {
        &self.collisions
    }
}

fn normalize_code(raw: Option<&str>, config: &RosterConfig) -> Option<String> {
    let raw = raw?.trim();
    if config.is_placeholder(raw) {
        return None;
    }
    Some(raw.to_uppercase())
}

fn text_or(raw: Option<&str>, fallback: &str, config: &RosterConfig) -> String {
    match raw.map(str::trim) {
        Some(value) if !config.is_placeholder(value) => value.to_string(),
        _ => fallback.to_string(),
    }
}
