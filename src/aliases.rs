// 🗺️ Region Alias Table - Abbreviated → official region names
//
// Statistics tables use short names ("서울"), the boundary dataset uses the
// full official name ("서울특별시"). The table is fixed for the process
// lifetime; names it does not know pass through unchanged.

use crate::observation::Observation;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// ALIAS TABLE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasTable {
    entries: BTreeMap<String, String>,
}

impl AliasTable {
    /// The 17 first-level administrative divisions of Korea
    pub fn korean_provinces() -> Self {
        let pairs = [
            ("서울", "서울특별시"),
            ("부산", "부산광역시"),
            ("대구", "대구광역시"),
            ("인천", "인천광역시"),
            ("광주", "광주광역시"),
            ("대전", "대전광역시"),
            ("울산", "울산광역시"),
            ("세종", "세종특별자치시"),
            ("경기", "경기도"),
            ("강원", "강원특별자치도"),
            ("충북", "충청북도"),
            ("충남", "충청남도"),
            ("전북", "전라북도"),
            ("전남", "전라남도"),
            ("경북", "경상북도"),
            ("경남", "경상남도"),
            ("제주", "제주특별자치도"),
        ];

        AliasTable::from_pairs(pairs)
    }

    pub fn from_pairs<I, A, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (A, C)>,
        A: Into<String>,
        C: Into<String>,
    {
        AliasTable {
            entries: pairs
                .into_iter()
                .map(|(alias, canonical)| (alias.into(), canonical.into()))
                .collect(),
        }
    }

    /// Canonical name for `name`, or `name` itself when it has no alias
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.entries.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(a, c)| (a.as_str(), c.as_str()))
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::korean_provinces()
    }
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Rewrite every observation's region name through the alias table.
///
/// Total: unmapped names are kept as they are. They are only reported at
/// debug level, since a name that is already official is also "unmapped".
pub fn normalize_region_names(observations: &[Observation], aliases: &AliasTable) -> Vec<Observation> {
    let mut unmapped = BTreeSet::new();

    let normalized: Vec<Observation> = observations
        .iter()
        .map(|obs| {
            if !aliases.contains(&obs.region_name) {
                unmapped.insert(obs.region_name.as_str());
            }
            Observation {
                region_name: aliases.resolve(&obs.region_name).to_string(),
                ..obs.clone()
            }
        })
        .collect();

    if !unmapped.is_empty() {
        tracing::debug!(
            count = unmapped.len(),
            names = ?unmapped,
            "region names passed through without alias"
        );
    }

    normalized
}

// ============================================================================
// TESTS
// ============================================================================
