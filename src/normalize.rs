use std::collections::{BTreeSet, HashSet};

use tracing::info;

use crate::config::Prefixes;
use crate::identity::PersonId;
use crate::models::{LocationMention, NormalizedMention};

pub const ADDRESS_SEPARATOR: &str = ", ";

/// Joins the non-empty fragments with [`ADDRESS_SEPARATOR`].
///
/// All-empty input yields an empty string rather than nothing, so a mention
/// without a place still has an address.
pub fn build_address(location: &str, city: &str, country: &str) -> String {
    [location, city, country]
        .iter()
        .map(|fragment| fragment.trim())
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join(ADDRESS_SEPARATOR)
}

/// Removes `prefix` once if present; otherwise returns `value` as-is.
///
/// Surrounding whitespace on either side is not significant: the CSV reader
/// trims cells, so a cell holding only the label arrives without the space
/// the label ends in.
pub fn strip_annotation<'a>(value: &'a str, prefix: &str) -> &'a str {
    let label = prefix.trim();
    if label.is_empty() {
        return value;
    }
    match value.trim_start().strip_prefix(label) {
        Some(rest) => rest.trim(),
        None => value,
    }
}

pub fn normalize_mentions(
    mentions: &[LocationMention],
    prefixes: &Prefixes,
) -> Vec<NormalizedMention> {
    let rows: Vec<NormalizedMention> = mentions
        .iter()
        .map(|mention| NormalizedMention {
            person_id: PersonId::derive(&mention.person_name, mention.age),
            gender: mention.gender,
            occupation: mention.occupation,
            address: build_address(&mention.location, &mention.city, &mention.country),
            migrated_from: strip_annotation(&mention.migrated_from, &prefixes.migrated_from)
                .trim()
                .to_string(),
            migrated_to: strip_annotation(&mention.migrated_to, &prefixes.migrated_to)
                .trim()
                .to_string(),
        })
        .collect();

    let deduped = dedupe_per_person(rows);
    info!(
        mentions = mentions.len(),
        distinct = deduped.len(),
        "normalized location mentions"
    );
    deduped
}

/// Keeps the first row for each `(person, address)` pair.
pub fn dedupe_per_person(rows: Vec<NormalizedMention>) -> Vec<NormalizedMention> {
    let mut seen: HashSet<(PersonId, String)> = HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert((row.person_id.clone(), row.address.clone())))
        .collect()
}

/// Sorted non-empty addresses across everyone: the geocoder's worklist.
pub fn distinct_addresses(rows: &[NormalizedMention]) -> Vec<String> {
    rows.iter()
        .filter(|row| !row.address.is_empty())
        .map(|row| row.address.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn distinct_address_count(rows: &[NormalizedMention], person: &PersonId) -> usize {
    rows.iter()
        .filter(|row| &row.person_id == person && !row.address.is_empty())
        .map(|row| row.address.as_str())
        .collect::<HashSet<_>>()
        .len()
}
