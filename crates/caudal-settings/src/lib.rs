//! Caudal Settings — the staged parameter facility caudal blocks consume.
//!
//! Settings flow in three steps: callers [`set`](SettingsStore::set) a map of
//! changes under a [`SettingsCtx`], the owning block
//! [`apply_staged`](SettingsStore::apply_staged)s them at the top of its next
//! `work` call, and auto-forward keys propagate to downstream blocks via the
//! returned [`Applied`] record. The runtime core never inspects settings; it
//! only guarantees the apply-at-work-start ordering.
//!
//! ## Example
//!
//! ```rust
//! use caudal_settings::{SettingsCtx, SettingsStore, SettingsValue};
//!
//! let mut store = SettingsStore::new(["sample_rate", "gain"]);
//! let rejected = store.set(
//!     [("gain".to_string(), SettingsValue::Float(0.5))].into(),
//!     SettingsCtx::default(),
//! );
//! assert!(rejected.is_empty());
//!
//! // inside the block, at the top of work():
//! let applied = store.apply_staged();
//! assert_eq!(applied.applied.len(), 1);
//! assert_eq!(store.get_one("gain"), Some(&SettingsValue::Float(0.5)));
//! ```

pub mod store;
pub mod value;

pub use store::{Applied, SettingsStore};
pub use value::{SettingsCtx, SettingsMap, SettingsValue};
