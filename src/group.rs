use crate::packet::{IPAddress, Packet};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;


/// Ordered (source, destination) pair identifying one conversation bucket.
///
/// Swapped pairs are distinct keys: `a → b` and `b → a` land in different
/// groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub source: IPAddress,
    pub destination: IPAddress,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GroupKeyParseError {
    #[error("group key {0:?} is missing the ',' separator")]
    MissingSeparator(String),
    #[error("invalid address {0:?} in group key")]
    InvalidAddress(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupSummary {
    pub key: GroupKey,
    pub packets: usize,
}

/// Group key → arena indices into the log the index was built from.
#[derive(Debug, Default, Clone)]
pub struct GroupIndex {
    groups: HashMap<GroupKey, Vec<usize>>,
}

impl GroupKey {
    pub fn new(source: IPAddress, destination: IPAddress) -> Self {
        Self {
            source,
            destination,
        }
    }

    pub fn of(packet: &Packet) -> Option<Self> {
        packet
            .endpoints()
            .map(|(source, destination)| Self::new(source, destination))
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.source, self.destination)
    }
}

impl FromStr for GroupKey {
    type Err = GroupKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (source, destination) = s
            .split_once(',')
            .ok_or_else(|| GroupKeyParseError::MissingSeparator(s.to_string()))?;
        let source = source
            .parse()
            .map_err(|_| GroupKeyParseError::InvalidAddress(source.to_string()))?;
        let destination = destination
            .parse()
            .map_err(|_| GroupKeyParseError::InvalidAddress(destination.to_string()))?;
        Ok(Self::new(source, destination))
    }
}

impl GroupIndex {
    /// Buckets `arena` by endpoint pair. Packets without a network layer are
    /// skipped. Indices within a bucket ascend in arena order.
    pub fn build(arena: &[Arc<Packet>]) -> Self {
        let mut groups: HashMap<GroupKey, Vec<usize>> = HashMap::new();
        for (idx, packet) in arena.iter().enumerate() {
            if let Some(key) = GroupKey::of(packet) {
                groups.entry(key).or_default().push(idx);
            }
        }
        Self { groups }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn contains(&self, key: &GroupKey) -> bool {
        self.groups.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &GroupKey> {
        self.groups.keys()
    }

    pub fn indices(&self, key: &GroupKey) -> Option<&[usize]> {
        self.groups.get(key).map(Vec::as_slice)
    }

    /// Resolves a bucket against the arena it was built from, newest first.
    pub fn members(&self, key: &GroupKey, arena: &[Arc<Packet>]) -> Option<Vec<Arc<Packet>>> {
        let indices = self.groups.get(key)?;
        Some(
            indices
                .iter()
                .rev()
                .filter_map(|&idx| arena.get(idx).cloned())
                .collect(),
        )
    }

    /// Sorted by key so rendering is stable between frames.
    pub fn summaries(&self) -> Vec<GroupSummary> {
        let mut summaries: Vec<GroupSummary> = self
            .groups
            .iter()
            .map(|(key, indices)| GroupSummary {
                key: *key,
                packets: indices.len(),
            })
            .collect();
        summaries.sort_unstable_by(|a, b| a.key.cmp(&b.key));
        summaries
    }
}
