//! Source keys - hierarchical usage identifiers
//!
//! A source key names a usage dimension as `query:zone:tenant:namespace[:class]`.
//! Product and discount records are stored under source strings that may be a
//! prefix of such a key and may contain `*` wildcard segments. Resolving a
//! record means walking [`SourceKey::lookup_keys`] and taking the first match,
//! so the order of that list decides which record wins.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SourceKeyError;

/// Separator between key segments
pub const ELEMENT_SEPARATOR: &str = ":";

/// Segment value matching any value at that position
pub const WILDCARD: &str = "*";

/// Parsed source key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceKey {
    pub query: String,
    pub zone: String,
    pub tenant: String,
    pub namespace: String,
    /// Optional storage/instance class, empty when absent
    pub class: String,
}

impl SourceKey {
    /// Parse a key of 4 or 5 colon separated segments
    pub fn parse(raw: &str) -> Result<Self, SourceKeyError> {
        let parts: Vec<&str> = raw.split(ELEMENT_SEPARATOR).collect();
        match parts.as_slice() {
            [query, zone, tenant, namespace] => Ok(Self {
                query: query.to_string(),
                zone: zone.to_string(),
                tenant: tenant.to_string(),
                namespace: namespace.to_string(),
                class: String::new(),
            }),
            [query, zone, tenant, namespace, class] => Ok(Self {
                query: query.to_string(),
                zone: zone.to_string(),
                tenant: tenant.to_string(),
                namespace: namespace.to_string(),
                class: class.to_string(),
            }),
            _ => Err(SourceKeyError::SegmentCount {
                raw: raw.to_string(),
                count: parts.len(),
            }),
        }
    }

    /// Candidate lookup strings, most specific first.
    ///
    /// For every prefix length from the full key down to the query name alone,
    /// the exact prefix comes first, followed by every way of replacing the
    /// wildcardable positions with `*`: fewer wildcards first, and within the
    /// same count the combination with the higher positions first. Zone and
    /// tenant are wildcardable; namespace only while the class is part of the
    /// prefix. Each time the prefix shrinks (while it is longer than two
    /// segments) the highest wildcardable position is dropped.
    pub fn lookup_keys(&self) -> Vec<String> {
        let mut base = vec![
            self.query.as_str(),
            self.zone.as_str(),
            self.tenant.as_str(),
            self.namespace.as_str(),
        ];
        let mut wildcard_positions = vec![1usize, 2];

        if !self.class.is_empty() {
            wildcard_positions.push(3);
            base.push(self.class.as_str());
        }

        let mut keys = Vec::new();
        for len in (1..=base.len()).rev() {
            keys.push(base[..len].join(ELEMENT_SEPARATOR));

            for size in 1..=wildcard_positions.len() {
                for positions in combinations(&wildcard_positions, size).iter().rev() {
                    let mut elements = base[..len].to_vec();
                    for &p in positions {
                        elements[p] = WILDCARD;
                    }
                    keys.push(elements.join(ELEMENT_SEPARATOR));
                }
            }

            if len > 2 {
                wildcard_positions.pop();
            }
        }

        keys
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}{sep}{}",
            self.query,
            self.zone,
            self.tenant,
            self.namespace,
            sep = ELEMENT_SEPARATOR
        )?;
        if !self.class.is_empty() {
            write!(f, "{}{}", ELEMENT_SEPARATOR, self.class)?;
        }
        Ok(())
    }
}

impl FromStr for SourceKey {
    type Err = SourceKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// All `size`-element combinations of `items` in lexicographic order
fn combinations(items: &[usize], size: usize) -> Vec<Vec<usize>> {
    fn collect(items: &[usize], size: usize, start: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if current.len() == size {
            out.push(current.clone());
            return;
        }
        for i in start..items.len() {
            current.push(items[i]);
            collect(items, size, i + 1, current, out);
            current.pop();
        }
    }

    let mut out = Vec::new();
    if size <= items.len() {
        collect(items, size, 0, &mut Vec::with_capacity(size), &mut out);
    }
    out
}
