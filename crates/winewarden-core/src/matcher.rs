//! Value matchers used by policy rules: `any`, an exact value, or a set.
//!
//! In TOML a matcher is written as the keyword `"any"`, a single value
//! (`"write"`) or a list (`["read", "execute"]`).

use std::collections::BTreeSet;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const ANY: &str = "any";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher<T: Ord> {
    Any,
    Exact(T),
    OneOf(BTreeSet<T>),
}

impl<T: Ord> Default for Matcher<T> {
    fn default() -> Self {
        Matcher::Any
    }
}

impl<T: Ord> Matcher<T> {
    pub fn one_of(values: impl IntoIterator<Item = T>) -> Self {
        let mut set: BTreeSet<T> = values.into_iter().collect();
        if set.len() == 1 {
            if let Some(only) = set.pop_first() {
                return Matcher::Exact(only);
            }
        }
        Matcher::OneOf(set)
    }

    pub fn accepts(&self, value: &T) -> bool {
        match self {
            Matcher::Any => true,
            Matcher::Exact(expected) => expected == value,
            Matcher::OneOf(set) => set.contains(value),
        }
    }

    /// Exact beats set beats any.
    pub fn specificity(&self) -> u32 {
        match self {
            Matcher::Any => 0,
            Matcher::OneOf(_) => 1,
            Matcher::Exact(_) => 2,
        }
    }

    /// True when every value `other` accepts is also accepted by `self`.
    pub fn covers(&self, other: &Matcher<T>) -> bool {
        match (self, other) {
            (Matcher::Any, _) => true,
            (_, Matcher::Any) => false,
            (Matcher::Exact(a), Matcher::Exact(b)) => a == b,
            (Matcher::Exact(a), Matcher::OneOf(set)) => set.iter().all(|value| value == a),
            (Matcher::OneOf(set), Matcher::Exact(b)) => set.contains(b),
            (Matcher::OneOf(outer), Matcher::OneOf(inner)) => inner.is_subset(outer),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Matcher::OneOf(set) if set.is_empty())
    }
}

impl<T: Ord + fmt::Display> fmt::Display for Matcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Any => f.write_str(ANY),
            Matcher::Exact(value) => write!(f, "{value}"),
            Matcher::OneOf(set) => {
                let joined = set.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
                write!(f, "[{joined}]")
            }
        }
    }
}

impl<T: Ord + Serialize> Serialize for Matcher<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Matcher::Any => serializer.serialize_str(ANY),
            Matcher::Exact(value) => value.serialize(serializer),
            Matcher::OneOf(set) => set.serialize(serializer),
        }
    }
}

impl<'de, T: Ord + Deserialize<'de>> Deserialize<'de> for Matcher<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        enum Keyword {
            #[serde(rename = "any")]
            Any,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr<T> {
            Keyword(Keyword),
            One(T),
            Many(Vec<T>),
        }

        match Repr::<T>::deserialize(deserializer)? {
            Repr::Keyword(Keyword::Any) => Ok(Matcher::Any),
            Repr::One(value) => Ok(Matcher::Exact(value)),
            Repr::Many(values) if values.is_empty() => {
                Err(D::Error::custom("matcher list must not be empty"))
            }
            Repr::Many(values) => Ok(Matcher::one_of(values)),
        }
    }
}
