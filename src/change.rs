// 📈 Year-over-year change
//
// pct_change = (value - previous) / previous * 100, per (region, category)
// series ordered by year. The first year of a series has no change, and a
// zero previous value gives no change instead of inf/NaN.

use crate::observation::Observation;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedObservation {
    #[serde(flatten)]
    pub observation: Observation,

    /// None for the first year of a series or a zero baseline
    pub pct_change_from_prior_year: Option<f64>,
}

impl EnrichedObservation {
    pub fn region_name(&self) -> &str {
        &self.observation.region_name
    }

    pub fn category(&self) -> &str {
        &self.observation.category
    }

    pub fn year(&self) -> i32 {
        self.observation.year
    }

    pub fn value(&self) -> f64 {
        self.observation.value
    }
}

/// Percentage change from `previous` to `current`
pub fn pct_change(previous: f64, current: f64) -> Option<f64> {
    if previous == 0.0 {
        return None;
    }

    let change = (current - previous) / previous * 100.0;
    change.is_finite().then_some(change)
}

/// Attach the year-over-year change to every observation.
///
/// Output order matches input order. The "previous" observation is the
/// preceding one in year order within the series, even across gap years.
pub fn compute_change(observations: &[Observation]) -> Vec<EnrichedObservation> {
    let mut groups: HashMap<(&str, &str), Vec<usize>> = HashMap::new();
    for (i, obs) in observations.iter().enumerate() {
        groups
            .entry((obs.region_name.as_str(), obs.category.as_str()))
            .or_default()
            .push(i);
    }

    let mut changes: Vec<Option<f64>> = vec![None; observations.len()];

    for indices in groups.values_mut() {
        // Stable: duplicate years keep input order
        indices.sort_by_key(|&i| observations[i].year);

        for pair in indices.windows(2) {
            let previous = &observations[pair[0]];
            let current = &observations[pair[1]];
            changes[pair[1]] = pct_change(previous.value, current.value);
        }
    }

    observations
        .iter()
        .cloned()
        .zip(changes)
        .map(|(observation, pct_change_from_prior_year)| EnrichedObservation {
            observation,
            pct_change_from_prior_year,
        })
        .collect()
}

// ============================================================================
// CHANGE MATRIX (heatmap data)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeCell {
    pub year: i32,
    pub region_name: String,
    pub pct_change: Option<f64>,
}

/// Year × region grid of changes for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeMatrix {
    pub category: String,
    pub years: Vec<i32>,
    pub regions: Vec<String>,
    pub cells: Vec<ChangeCell>,
}

impl ChangeMatrix {
    pub fn cell(&self, year: i32, region_name: &str) -> Option<&ChangeCell> {
        self.cells
            .iter()
            .find(|c| c.year == year && c.region_name == region_name)
    }
}

pub fn change_matrix(observations: &[EnrichedObservation], category: &str) -> ChangeMatrix {
    let selected: Vec<&EnrichedObservation> = observations
        .iter()
        .filter(|o| o.category() == category)
        .collect();

    let years: BTreeSet<i32> = selected.iter().map(|o| o.year()).collect();
    let regions: BTreeSet<&str> = selected.iter().map(|o| o.region_name()).collect();

    let mut cells: Vec<ChangeCell> = selected
        .iter()
        .map(|o| ChangeCell {
            year: o.year(),
            region_name: o.region_name().to_string(),
            pct_change: o.pct_change_from_prior_year,
        })
        .collect();
    cells.sort_by(|a, b| a.year.cmp(&b.year).then_with(|| a.region_name.cmp(&b.region_name)));

    ChangeMatrix {
        category: category.to_string(),
        years: years.into_iter().collect(),
        regions: regions.into_iter().map(str::to_string).collect(),
        cells,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(region: &str, category: &str, year: i32, value: f64) -> Observation {
        Observation::new(region, category, year, value)
    }

    #[test]
    fn test_seoul_example() {
        let input = vec![
            obs("Seoul", "crime", 2020, 100.0),
            obs("Seoul", "crime", 2021, 150.0),
        ];

        let out = compute_change(&input);

        assert_eq!(out[0].pct_change_from_prior_year, None);
        assert_eq!(out[1].pct_change_from_prior_year, Some(50.0));
    }

    #[test]
    fn test_single_observation_groups_have_no_change() {
        let input = vec![
            obs("서울특별시", "crime", 2020, 100.0),
            obs("부산광역시", "crime", 2020, 80.0),
            obs("서울특별시", "population", 2020, 9_500_000.0),
        ];

        let out = compute_change(&input);

        assert!(out.iter().all(|o| o.pct_change_from_prior_year.is_none()));
    }

    #[test]
    fn test_unsorted_input_is_ordered_by_year() {
        let input = vec![
            obs("A", "c", 2022, 120.0),
            obs("A", "c", 2020, 100.0),
            obs("A", "c", 2021, 80.0),
        ];

        let out = compute_change(&input);

        // input order kept
        assert_eq!(out[0].year(), 2022);
        assert_eq!(out[0].pct_change_from_prior_year, Some(50.0));
        assert_eq!(out[1].pct_change_from_prior_year, None);
        assert_eq!(out[2].pct_change_from_prior_year, Some(-20.0));
    }

    #[test]
    fn test_groups_are_independent() {
        let input = vec![
            obs("A", "c", 2020, 100.0),
            obs("B", "c", 2021, 300.0),
            obs("A", "d", 2021, 10.0),
            obs("A", "c", 2021, 110.0),
        ];

        let out = compute_change(&input);

        assert_eq!(out[1].pct_change_from_prior_year, None);
        assert_eq!(out[2].pct_change_from_prior_year, None);
        let a_c_2021 = out[3].pct_change_from_prior_year.unwrap();
        assert!((a_c_2021 - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_baseline_gives_none() {
        let input = vec![obs("A", "c", 2020, 0.0), obs("A", "c", 2021, 5.0)];

        let out = compute_change(&input);

        assert_eq!(out[1].pct_change_from_prior_year, None);
    }

    #[test]
    fn test_gap_years_use_previous_observation() {
        let input = vec![obs("A", "c", 2018, 50.0), obs("A", "c", 2021, 100.0)];
        let out = compute_change(&input);
        assert_eq!(out[1].pct_change_from_prior_year, Some(100.0));
    }

    #[test]
    fn test_rerun_on_own_output_is_stable() {
        let input = vec![
            obs("A", "c", 2021, 90.0),
            obs("A", "c", 2020, 60.0),
            obs("B", "c", 2020, 0.0),
            obs("B", "c", 2021, 7.0),
            obs("A", "c", 2022, 45.0),
        ];

        let first = compute_change(&input);
        let stripped: Vec<Observation> = first.iter().map(|e| e.observation.clone()).collect();
        let second = compute_change(&stripped);

        assert_eq!(first, second);
    }

    #[test]
    fn test_pct_change_negative_baseline() {
        assert_eq!(pct_change(-50.0, -25.0), Some(-50.0));
        assert_eq!(pct_change(0.0, 0.0), None);
    }

    #[test]
    fn test_change_matrix_for_category() {
        let enriched = compute_change(&[
            obs("B", "crime", 2020, 10.0),
            obs("A", "crime", 2020, 100.0),
            obs("A", "crime", 2021, 150.0),
            obs("A", "population", 2021, 1.0),
        ]);

        let matrix = change_matrix(&enriched, "crime");

        assert_eq!(matrix.years, vec![2020, 2021]);
        assert_eq!(matrix.regions, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(matrix.cells.len(), 3);
        assert_eq!(matrix.cell(2021, "A").unwrap().pct_change, Some(50.0));
        assert!(matrix.cell(2021, "B").is_none());
    }
}
