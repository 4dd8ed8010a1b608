//! Group and preset catalogs for role administration screens

use crate::store::RoleFilter;
use crate::types::RoleMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Sort index used when a descriptor does not set one
pub const DEFAULT_SORT: i32 = 100;

fn default_sort() -> i32 {
    DEFAULT_SORT
}

/// Named group roles can be placed in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDescriptor {
    pub name: String,
    pub title: String,
    #[serde(default = "default_sort")]
    pub sort: i32,
}

impl GroupDescriptor {
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            sort: DEFAULT_SORT,
        }
    }

    pub fn with_sort(mut self, sort: i32) -> Self {
        self.sort = sort;
        self
    }
}

/// Named bundle of roles selectable in one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetDescriptor {
    pub name: String,
    pub title: String,
    #[serde(default = "default_sort")]
    pub sort: i32,
    /// Member role names, filled by [`RoleCatalogView::build`]
    #[serde(default)]
    pub items: Vec<String>,
}

impl PresetDescriptor {
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            sort: DEFAULT_SORT,
            items: Vec::new(),
        }
    }

    pub fn with_sort(mut self, sort: i32) -> Self {
        self.sort = sort;
        self
    }
}

/// Keyed registry of group or preset descriptors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessCatalog<T> {
    items: BTreeMap<String, T>,
}

impl<T> Default for AccessCatalog<T> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }
}

impl<T> AccessCatalog<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> &BTreeMap<String, T> {
        &self.items
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.items.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    /// Insert or replace the entry under `key`
    pub fn set(&mut self, key: impl Into<String>, value: T) -> &mut Self {
        self.items.insert(key.into(), value);
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl AccessCatalog<GroupDescriptor> {
    /// Build a group catalog keyed by group name
    pub fn groups<I: IntoIterator<Item = GroupDescriptor>>(groups: I) -> Self {
        let mut catalog = Self::new();
        for group in groups {
            catalog.set(group.name.clone(), group);
        }
        catalog
    }
}

impl AccessCatalog<PresetDescriptor> {
    /// Build a preset catalog keyed by preset name
    pub fn presets<I: IntoIterator<Item = PresetDescriptor>>(presets: I) -> Self {
        let mut catalog = Self::new();
        for preset in presets {
            catalog.set(preset.name.clone(), preset);
        }
        catalog
    }
}

/// A group with its member role names
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogGroup {
    pub name: String,
    pub title: String,
    pub sort: i32,
    pub items: Vec<String>,
}

/// Roles arranged by group and preset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleCatalogView {
    /// Non-empty groups ordered by sort index, then name
    pub groups: Vec<CatalogGroup>,
    /// Non-empty presets ordered by sort index, then name
    pub presets: Vec<PresetDescriptor>,
    /// Roles without a group or with a group missing from the catalog
    pub ungrouped: Vec<String>,
}

impl RoleCatalogView {
    /// Arrange `roles` into the given groups and presets
    ///
    /// Roles reference groups and presets by catalog key; the key is also the
    /// name reported in the view.
    pub fn build(
        roles: &RoleMap,
        groups: &AccessCatalog<GroupDescriptor>,
        presets: &AccessCatalog<PresetDescriptor>,
    ) -> Self {
        let mut group_items: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        let mut preset_items: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        let mut ungrouped = Vec::new();

        for role in roles.values() {
            match role.group.as_deref() {
                Some(group) if groups.has(group) => {
                    group_items.entry(group).or_default().push(role.name.clone());
                }
                _ => ungrouped.push(role.name.clone()),
            }

            for preset in &role.presets {
                if presets.has(preset) {
                    preset_items.entry(preset.as_str()).or_default().push(role.name.clone());
                }
            }
        }

        let mut view_groups: Vec<CatalogGroup> = groups
            .all()
            .iter()
            .filter_map(|(key, group)| {
                let items = group_items.remove(key.as_str())?;
                Some(CatalogGroup {
                    name: key.clone(),
                    title: group.title.clone(),
                    sort: group.sort,
                    items,
                })
            })
            .collect();
        view_groups.sort_by(|a, b| a.sort.cmp(&b.sort).then_with(|| a.name.cmp(&b.name)));

        let mut view_presets: Vec<PresetDescriptor> = presets
            .all()
            .iter()
            .filter_map(|(key, preset)| {
                let items = preset_items.remove(key.as_str())?;
                Some(PresetDescriptor {
                    name: key.clone(),
                    items,
                    ..preset.clone()
                })
            })
            .collect();
        view_presets.sort_by(|a, b| a.sort.cmp(&b.sort).then_with(|| a.name.cmp(&b.name)));

        Self {
            groups: view_groups,
            presets: view_presets,
            ungrouped,
        }
    }

    /// Presets whose members are exactly the selected roles
    pub fn active_presets<S: AsRef<str>>(&self, selected: &[S]) -> Vec<&PresetDescriptor> {
        let selected: BTreeSet<&str> = selected.iter().map(AsRef::as_ref).collect();

        self.presets
            .iter()
            .filter(|preset| {
                let items: BTreeSet<&str> = preset.items.iter().map(String::as_str).collect();
                items == selected
            })
            .collect()
    }

    /// Filter for the roles ticked in a name-to-flag form submission
    pub fn selection_filter(flags: &BTreeMap<String, bool>) -> RoleFilter {
        RoleFilter::new().names(flags.iter().filter(|(_, on)| **on).map(|(name, _)| name.clone()))
    }
}
