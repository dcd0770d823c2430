//! Settings values and the application context.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A single settings value.
///
/// Floats compare and hash by bit pattern so the type can satisfy `Eq` and
/// `Hash` (contexts are used as map keys by settings consumers).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SettingsValue {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Double-precision float.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Homogeneous integer list.
    IntList(Vec<i64>),
    /// Homogeneous float list.
    FloatList(Vec<f64>),
    /// Homogeneous string list.
    StrList(Vec<String>),
}

impl PartialEq for SettingsValue {
    fn eq(&self, other: &Self) -> bool {
        use SettingsValue::*;
        match (self, other) {
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Str(a), Str(b)) => a == b,
            (IntList(a), IntList(b)) => a == b,
            (FloatList(a), FloatList(b)) => {
                a.len() == b.len()
                    && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (StrList(a), StrList(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for SettingsValue {}

impl Hash for SettingsValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use SettingsValue::*;
        std::mem::discriminant(self).hash(state);
        match self {
            Bool(v) => v.hash(state),
            Int(v) => v.hash(state),
            Float(v) => v.to_bits().hash(state),
            Str(v) => v.hash(state),
            IntList(v) => v.hash(state),
            FloatList(v) => {
                for item in v {
                    item.to_bits().hash(state);
                }
            }
            StrList(v) => v.hash(state),
        }
    }
}

macro_rules! from_impl {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for SettingsValue {
            fn from(value: $ty) -> Self {
                SettingsValue::$variant(value.into())
            }
        }
    };
}

from_impl!(bool, Bool);
from_impl!(i64, Int);
from_impl!(i32, Int);
from_impl!(f64, Float);
from_impl!(String, Str);
from_impl!(&str, Str);

/// A keyed collection of settings values.
pub type SettingsMap = BTreeMap<String, SettingsValue>;

/// Context accompanying a staged settings change.
///
/// Carries an optional UTC timestamp (microseconds since the epoch) and an
/// opaque attribute multiplexer that consumers may key dispatch on. Equality
/// and hashing cover both fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SettingsCtx {
    /// Time the change should notionally take effect, µs UTC.
    pub time: Option<u64>,
    /// Opaque key/value attributes.
    pub attributes: BTreeMap<String, SettingsValue>,
}

impl SettingsCtx {
    /// A context stamped `time` µs UTC with no attributes.
    pub fn at(time: u64) -> Self {
        Self {
            time: Some(time),
            attributes: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn float_values_are_hashable_and_eq() {
        let mut set = HashSet::new();
        set.insert(SettingsValue::Float(1.5));
        set.insert(SettingsValue::Float(1.5));
        assert_eq!(set.len(), 1);
        assert_ne!(SettingsValue::Float(0.0), SettingsValue::Float(-0.0));
    }

    #[test]
    fn contexts_key_on_time_and_attributes() {
        let mut set = HashSet::new();
        set.insert(SettingsCtx::at(10));
        set.insert(SettingsCtx::at(10));
        let mut with_attr = SettingsCtx::at(10);
        with_attr
            .attributes
            .insert("channel".into(), "a".into());
        set.insert(with_attr);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn conversions_cover_the_common_scalars() {
        assert_eq!(SettingsValue::from(3i32), SettingsValue::Int(3));
        assert_eq!(SettingsValue::from("x"), SettingsValue::Str("x".into()));
        assert_eq!(SettingsValue::from(true), SettingsValue::Bool(true));
    }
}
