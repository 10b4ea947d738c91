use serde::{Deserialize, Serialize};

use crate::KeyValue;

/// Ordered environment variables of a container.
///
/// Entries keep insertion order and serialize as a plain array of `{name, value}` objects.
/// A later entry with the same name shadows an earlier one, matching how the cluster resolves duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvVars(Vec<KeyValue>);

impl EnvVars {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyValue> {
        self.0.iter()
    }

    /// Value for `name`, taking the last matching entry.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|kv| kv.key() == name)
            .map(|kv| kv.value())
    }

    pub fn push<K, V>(&mut self, name: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.push(KeyValue::new(name, value));
    }

    /// Concatenate `other` after `self`; entries of `other` win on lookup.
    pub fn merged(&self, other: &EnvVars) -> EnvVars {
        let mut out = self.0.clone();
        out.extend(other.0.iter().cloned());
        EnvVars(out)
    }
}

impl<K, V> FromIterator<(K, V)> for EnvVars
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| KeyValue::new(k, v)).collect())
    }
}
