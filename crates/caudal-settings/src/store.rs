//! The staged settings store.
//!
//! Consumers stage changes at any time with [`SettingsStore::set`]; the
//! owning block applies everything staged at the top of its next `work` call
//! via [`SettingsStore::apply_staged`]. The store never synchronises across
//! threads itself — it belongs to one block, and the runtime's only
//! obligation is the apply-at-work-start ordering.

use std::collections::BTreeSet;

use crate::value::{SettingsCtx, SettingsMap, SettingsValue};

/// Result of applying staged changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    /// Key/value pairs that became active in this application.
    pub applied: SettingsMap,
    /// Subset of `applied` that should be forwarded to downstream blocks.
    pub forward: SettingsMap,
}

/// Per-block settings storage with staging semantics.
#[derive(Debug, Clone, Default)]
pub struct SettingsStore {
    known: BTreeSet<String>,
    active: SettingsMap,
    staged: Vec<(SettingsCtx, SettingsMap)>,
    auto_update: BTreeSet<String>,
    auto_forward: BTreeSet<String>,
}

impl SettingsStore {
    /// A store recognising exactly the given keys, all initially unset.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: keys.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// A store whose recognised keys and initial values come from `defaults`.
    pub fn with_defaults(defaults: SettingsMap) -> Self {
        Self {
            known: defaults.keys().cloned().collect(),
            active: defaults,
            ..Self::default()
        }
    }

    /// Stages every recognised key of `values` under `ctx` and returns the
    /// unrecognised remainder.
    pub fn set(&mut self, values: SettingsMap, ctx: SettingsCtx) -> SettingsMap {
        let mut recognised = SettingsMap::new();
        let mut unrecognised = SettingsMap::new();
        for (key, value) in values {
            if self.known.contains(&key) {
                recognised.insert(key, value);
            } else {
                unrecognised.insert(key, value);
            }
        }
        if !recognised.is_empty() {
            self.staged.push((ctx, recognised));
        }
        unrecognised
    }

    /// Applies all staged changes in staging order.
    ///
    /// Later stagings win per key. Keys in the auto-forward set are echoed in
    /// [`Applied::forward`] for propagation to downstream blocks.
    pub fn apply_staged(&mut self) -> Applied {
        let mut result = Applied::default();
        for (_ctx, values) in self.staged.drain(..) {
            for (key, value) in values {
                if self.auto_forward.contains(&key) {
                    result.forward.insert(key.clone(), value.clone());
                }
                self.active.insert(key.clone(), value.clone());
                result.applied.insert(key, value);
            }
        }
        result
    }

    /// Number of staged change sets not yet applied.
    pub fn n_staged(&self) -> usize {
        self.staged.len()
    }

    /// Active values for `keys`, or all active values when `keys` is `None`.
    /// Unknown and unset keys are silently absent from the result.
    pub fn get(&self, keys: Option<&[&str]>) -> SettingsMap {
        match keys {
            None => self.active.clone(),
            Some(keys) => keys
                .iter()
                .filter_map(|&key| {
                    self.active
                        .get(key)
                        .map(|value| (key.to_string(), value.clone()))
                })
                .collect(),
        }
    }

    /// Active value for one key.
    pub fn get_one(&self, key: &str) -> Option<&SettingsValue> {
        self.active.get(key)
    }

    /// Marks `key` for automatic staging when upstream metadata carries it.
    pub fn enable_auto_update<S: Into<String>>(&mut self, key: S) {
        self.auto_update.insert(key.into());
    }

    /// Marks `key` for forwarding to downstream blocks on apply.
    pub fn enable_auto_forward<S: Into<String>>(&mut self, key: S) {
        self.auto_forward.insert(key.into());
    }

    /// Keys staged automatically from upstream metadata.
    pub fn auto_update_keys(&self) -> &BTreeSet<String> {
        &self.auto_update
    }

    /// Keys forwarded downstream on apply.
    pub fn auto_forward_keys(&self) -> &BTreeSet<String> {
        &self.auto_forward
    }
}
