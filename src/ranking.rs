// 🏆 Rankings - Top regions and the population vs crime comparison
//
// Rankings sort descending with a stable sort, so ties keep input order.

use crate::observation::Observation;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

// ============================================================================
// TOP-K
// ============================================================================

/// Region and value of the `k` largest observations.
///
/// A region is ranked once, by its first observation, the same one the map
/// join shows.
pub fn top_k<'a>(observations: &'a [Observation], k: usize) -> Vec<(&'a str, f64)> {
    let mut seen = HashSet::new();
    let mut ranked: Vec<&Observation> = observations
        .iter()
        .filter(|o| seen.insert(o.region_name.as_str()))
        .collect();
    ranked.sort_by(|a, b| b.value.total_cmp(&a.value));

    ranked
        .into_iter()
        .take(k)
        .map(|o| (o.region_name.as_str(), o.value))
        .collect()
}

// ============================================================================
// COMPARISON
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Membership {
    /// In both top-k lists
    Both,
    PopulationOnly,
    CrimeOnly,
}

impl Membership {
    pub fn label(&self) -> &'static str {
        match self {
            Membership::Both => "일치",
            Membership::PopulationOnly => "인구 수만 상위",
            Membership::CrimeOnly => "범죄 건수만 상위",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub region_name: String,

    /// Present only when the region is in the population top-k
    pub population: Option<f64>,

    /// Present only when the region is in the crime top-k
    pub crime_count: Option<f64>,

    pub membership: Membership,
}

/// Outer-join the population top-k and the crime top-k by region name.
///
/// Rows come in population order; crime-only rows follow in crime order.
pub fn top_k_comparison(
    population: &[Observation],
    crime: &[Observation],
    k: usize,
) -> Vec<ComparisonRow> {
    let top_population = top_k(population, k);
    let top_crime = top_k(crime, k);

    let crime_by_region: HashMap<&str, f64> = top_crime.iter().copied().collect();
    let population_by_region: HashMap<&str, f64> = top_population.iter().copied().collect();

    let mut rows: Vec<ComparisonRow> = top_population
        .iter()
        .map(|&(region, pop)| {
            let crime_count = crime_by_region.get(region).copied();
            ComparisonRow {
                region_name: region.to_string(),
                population: Some(pop),
                crime_count,
                membership: if crime_count.is_some() {
                    Membership::Both
                } else {
                    Membership::PopulationOnly
                },
            }
        })
        .collect();

    rows.extend(
        top_crime
            .iter()
            .filter(|(region, _)| !population_by_region.contains_key(region))
            .map(|&(region, count)| ComparisonRow {
                region_name: region.to_string(),
                population: None,
                crime_count: Some(count),
                membership: Membership::CrimeOnly,
            }),
    );

    rows
}

/// Share of comparison rows found in both lists (0.0 - 1.0)
pub fn overlap_ratio(rows: &[ComparisonRow]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }

    let both = rows.iter().filter(|r| r.membership == Membership::Both).count();
    both as f64 / rows.len() as f64
}

// ============================================================================
// TESTS
// ============================================================================
