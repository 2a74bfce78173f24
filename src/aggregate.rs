use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use tracing::info;

use crate::identity::PersonId;
use crate::models::{
    category_label, AnalyticRow, Gender, LocationRecord, NormalizedMention, Occupation,
    PersonLocations, Summary,
};

/// Summaries of one per-person measure, split three ways. Groups with no
/// members are absent rather than zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupedSummaries {
    pub by_gender: BTreeMap<Gender, Summary>,
    pub by_occupation: BTreeMap<Occupation, Summary>,
    pub by_category: BTreeMap<(Gender, Occupation), Summary>,
}

impl GroupedSummaries {
    pub fn from_people<I>(people: I) -> Self
    where
        I: IntoIterator<Item = (Gender, Occupation, f64)>,
    {
        let mut by_gender: BTreeMap<Gender, Vec<f64>> = BTreeMap::new();
        let mut by_occupation: BTreeMap<Occupation, Vec<f64>> = BTreeMap::new();
        let mut by_category: BTreeMap<(Gender, Occupation), Vec<f64>> = BTreeMap::new();

        for (gender, occupation, value) in people {
            by_gender.entry(gender).or_default().push(value);
            by_occupation.entry(occupation).or_default().push(value);
            by_category
                .entry((gender, occupation))
                .or_default()
                .push(value);
        }

        Self {
            by_gender: summarize_groups(by_gender),
            by_occupation: summarize_groups(by_occupation),
            by_category: summarize_groups(by_category),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_gender.is_empty()
    }

    /// String-keyed copy for JSON output.
    pub fn labelled(&self) -> LabelledSummaries {
        LabelledSummaries {
            by_gender: self
                .by_gender
                .iter()
                .map(|(gender, summary)| (gender.to_string(), summary.clone()))
                .collect(),
            by_occupation: self
                .by_occupation
                .iter()
                .map(|(occupation, summary)| (occupation.to_string(), summary.clone()))
                .collect(),
            by_category: self
                .by_category
                .iter()
                .map(|((gender, occupation), summary)| {
                    (category_label(*gender, *occupation), summary.clone())
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LabelledSummaries {
    pub by_gender: BTreeMap<String, Summary>,
    pub by_occupation: BTreeMap<String, Summary>,
    pub by_category: BTreeMap<String, Summary>,
}

fn summarize_groups<K: Ord>(groups: BTreeMap<K, Vec<f64>>) -> BTreeMap<K, Summary> {
    groups
        .into_iter()
        .filter_map(|(key, values)| describe(&values).map(|summary| (key, summary)))
        .collect()
}

/// Everything the aggregation stage derives from the joined table.
#[derive(Debug, Clone, Default)]
pub struct Aggregates {
    /// Analytic subpopulation after per-person deduplication.
    pub records: Vec<LocationRecord>,
    pub loc_by_name: BTreeMap<PersonId, PersonLocations>,
    pub loc_total: BTreeMap<String, usize>,
    pub locations: GroupedSummaries,
    pub camp_share: GroupedSummaries,
}

pub fn aggregate(rows: &[AnalyticRow]) -> Aggregates {
    let records = analytic_subpopulation(rows);
    let loc_by_name = loc_by_name(&records);
    let loc_total = loc_total(&records);

    let locations = GroupedSummaries::from_people(
        loc_by_name
            .values()
            .map(|person| (person.gender, person.occupation, person.locations as f64)),
    );
    let camp_share = GroupedSummaries::from_people(
        loc_by_name
            .values()
            .map(|person| (person.gender, person.occupation, person.camp_share())),
    );

    info!(
        joined = rows.len(),
        analytic = records.len(),
        people = loc_by_name.len(),
        locations = loc_total.len(),
        "aggregated analytic subpopulation"
    );

    Aggregates {
        records,
        loc_by_name,
        loc_total,
        locations,
        camp_share,
    }
}

/// Rows eligible for analysis: resolved, not an admin area, with an address,
/// and occupation other than `No`. A person's repeated resolved location
/// collapses to its first occurrence, keeping that row's coordinates and
/// flags.
pub fn analytic_subpopulation(rows: &[AnalyticRow]) -> Vec<LocationRecord> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter(|row| row.mention.occupation != Occupation::No)
        .filter(|row| !row.mention.address.is_empty())
        .filter_map(|row| {
            let resolved = row.resolved.as_ref().filter(|resolved| !resolved.admin)?;
            Some(LocationRecord {
                person_id: row.mention.person_id.clone(),
                gender: row.mention.gender,
                occupation: row.mention.occupation,
                location: resolved.resolved_location.clone(),
                coordinates: resolved.coordinates(),
                known: resolved.known,
                camp: resolved.camp,
            })
        })
        .filter(|record| seen.insert(record.dedup_key()))
        .collect()
}

pub fn loc_by_name(records: &[LocationRecord]) -> BTreeMap<PersonId, PersonLocations> {
    let mut people: BTreeMap<PersonId, PersonLocations> = BTreeMap::new();
    for record in records {
        let entry = people
            .entry(record.person_id.clone())
            .or_insert_with(|| PersonLocations {
                gender: record.gender,
                occupation: record.occupation,
                locations: 0,
                camps: 0,
            });
        entry.locations += 1;
        if record.camp {
            entry.camps += 1;
        }
    }
    people
}

/// Number of people whose deduplicated set contains each location.
pub fn loc_total(records: &[LocationRecord]) -> BTreeMap<String, usize> {
    let pairs: HashSet<(&PersonId, &str)> = records
        .iter()
        .map(|record| (&record.person_id, record.location.as_str()))
        .collect();

    let mut totals: BTreeMap<String, usize> = BTreeMap::new();
    for (_, location) in pairs {
        *totals.entry(location.to_string()).or_insert(0) += 1;
    }
    totals
}

/// Locations ordered by mention total, busiest first, ties alphabetical.
pub fn ranked_locations(loc_total: &BTreeMap<String, usize>) -> Vec<(&str, usize)> {
    let mut ranked: Vec<(&str, usize)> = loc_total
        .iter()
        .map(|(location, count)| (location.as_str(), *count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
}

/// People per migration route, busiest first. Routes with an empty endpoint
/// are skipped.
pub fn migration_routes(rows: &[NormalizedMention]) -> Vec<((String, String), usize)> {
    let people: HashSet<(&PersonId, &str, &str)> = rows
        .iter()
        .filter(|row| !row.migrated_from.is_empty() && !row.migrated_to.is_empty())
        .map(|row| {
            (
                &row.person_id,
                row.migrated_from.as_str(),
                row.migrated_to.as_str(),
            )
        })
        .collect();

    let mut routes: BTreeMap<(String, String), usize> = BTreeMap::new();
    for (_, from, to) in people {
        *routes
            .entry((from.to_string(), to.to_string()))
            .or_insert(0) += 1;
    }

    let mut ranked: Vec<((String, String), usize)> = routes.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}

pub fn describe(values: &[f64]) -> Option<Summary> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let count = sorted.len();
    let mean = sorted.iter().sum::<f64>() / count as f64;

    Some(Summary {
        count,
        mean,
        std: sample_variance(&sorted).map(f64::sqrt),
        min: sorted[0],
        q25: quantile(&sorted, 0.25),
        median: quantile(&sorted, 0.5),
        q75: quantile(&sorted, 0.75),
        max: sorted[count - 1],
    })
}

/// Linear-interpolation quantile over already sorted, non-empty values.
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean(values)?;
    let squares: f64 = values.iter().map(|value| (value - mean).powi(2)).sum();
    Some(squares / (values.len() - 1) as f64)
}
