use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Prefixes;
use crate::error::{PipelineError, Result};
use crate::identity::PersonId;
use crate::models::{Coordinates, Gender, LocationMention, Occupation, ResolvedLocation};
use crate::normalize::strip_annotation;

pub const MENTION_COLUMNS: &[&str] = &[
    "name",
    "age",
    "migrated_from",
    "migrated_to",
    "gender",
    "occupation",
    "location",
    "city",
    "country",
];
pub const LOOKUP_COLUMNS: &[&str] = &["address", "latitude", "longitude"];
pub const RESOLVED_COLUMNS: &[&str] = &[
    "address",
    "latitude",
    "longitude",
    "known",
    "camp",
    "resolved_location",
    "admin",
];
pub const DISTANCE_COLUMNS: &[&str] = &["PersonID", "location", "distance_km"];
pub const COUNTRY_COLUMNS: &[&str] = &["PersonID", "CNTRY_NAME"];

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| PipelineError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Deserializes every row after checking the header contract. Rows come back
/// paired with their 1-based data row number.
fn load<T, R>(reader: R, source: &str, required: &[&'static str]) -> Result<Vec<(usize, T)>>
where
    T: DeserializeOwned,
    R: Read,
{
    let csv_error = |err: csv::Error| PipelineError::Csv {
        path: source.to_string(),
        source: err,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = reader.headers().map_err(csv_error)?.clone();
    for &column in required {
        if !headers.iter().any(|header| header == column) {
            return Err(PipelineError::MissingColumn {
                path: source.to_string(),
                column,
            });
        }
    }

    let mut rows = Vec::new();
    for (index, result) in reader.deserialize::<T>().enumerate() {
        rows.push((index + 1, result.map_err(csv_error)?));
    }
    debug!(source, rows = rows.len(), "loaded table");
    Ok(rows)
}

/// Accepts `true/false`, `yes/no` and `1/0`; an empty cell is false.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" | "" => Some(false),
        _ => None,
    }
}

#[derive(Deserialize)]
struct MentionRow {
    name: String,
    age: String,
    migrated_from: String,
    migrated_to: String,
    gender: String,
    occupation: String,
    location: String,
    city: String,
    country: String,
}

pub fn read_mentions(path: &Path, prefixes: &Prefixes) -> Result<Vec<LocationMention>> {
    parse_mentions(open(path)?, &path.display().to_string(), prefixes)
}

pub fn parse_mentions<R: Read>(
    reader: R,
    source: &str,
    prefixes: &Prefixes,
) -> Result<Vec<LocationMention>> {
    let rows = load::<MentionRow, _>(reader, source, MENTION_COLUMNS)?;
    let mut mentions = Vec::with_capacity(rows.len());

    for (row_number, row) in rows {
        if row.name.is_empty() {
            return Err(PipelineError::invalid(source, row_number, "name", &row.name));
        }
        let age = strip_annotation(&row.age, &prefixes.age)
            .trim()
            .parse::<u32>()
            .map_err(|_| PipelineError::invalid(source, row_number, "age", &row.age))?;
        let gender = Gender::parse(&row.gender)
            .ok_or_else(|| PipelineError::invalid(source, row_number, "gender", &row.gender))?;
        let occupation = Occupation::parse(&row.occupation).ok_or_else(|| {
            PipelineError::invalid(source, row_number, "occupation", &row.occupation)
        })?;

        mentions.push(LocationMention {
            person_name: row.name,
            age,
            gender,
            occupation,
            location: row.location,
            city: row.city,
            country: row.country,
            migrated_from: row.migrated_from,
            migrated_to: row.migrated_to,
        });
    }

    Ok(mentions)
}

#[derive(Deserialize)]
struct LookupRow {
    address: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

/// Address to coordinates. Rows with a blank coordinate are kept as `None`.
pub fn read_geocode_lookup(path: &Path) -> Result<BTreeMap<String, Option<Coordinates>>> {
    parse_geocode_lookup(open(path)?, &path.display().to_string())
}

pub fn parse_geocode_lookup<R: Read>(
    reader: R,
    source: &str,
) -> Result<BTreeMap<String, Option<Coordinates>>> {
    let rows = load::<LookupRow, _>(reader, source, LOOKUP_COLUMNS)?;
    let mut lookup = BTreeMap::new();

    for (row_number, row) in rows {
        let coordinates = match (row.latitude, row.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        };
        if lookup.contains_key(&row.address) {
            return Err(duplicate(source, row_number, &row.address));
        }
        lookup.insert(row.address, coordinates);
    }

    Ok(lookup)
}

#[derive(Deserialize)]
struct ResolvedRow {
    address: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    known: String,
    camp: String,
    resolved_location: String,
    admin: String,
}

pub fn read_resolved(path: &Path) -> Result<Vec<ResolvedLocation>> {
    parse_resolved(open(path)?, &path.display().to_string())
}

/// Parses the manually corrected table. A blank `resolved_location` falls
/// back to the address itself.
pub fn parse_resolved<R: Read>(reader: R, source: &str) -> Result<Vec<ResolvedLocation>> {
    let rows = load::<ResolvedRow, _>(reader, source, RESOLVED_COLUMNS)?;
    let mut seen = BTreeMap::new();
    let mut resolved = Vec::with_capacity(rows.len());

    for (row_number, row) in rows {
        if seen.insert(row.address.clone(), row_number).is_some() {
            return Err(duplicate(source, row_number, &row.address));
        }
        let flag = |column: &'static str, raw: &str| {
            parse_flag(raw).ok_or_else(|| PipelineError::invalid(source, row_number, column, raw))
        };
        let known = flag("known", &row.known)?;
        let camp = flag("camp", &row.camp)?;
        let admin = flag("admin", &row.admin)?;
        let resolved_location = if row.resolved_location.is_empty() {
            row.address.clone()
        } else {
            row.resolved_location
        };

        resolved.push(ResolvedLocation {
            address: row.address,
            latitude: row.latitude,
            longitude: row.longitude,
            known,
            camp,
            resolved_location,
            admin,
        });
    }

    Ok(resolved)
}

#[derive(Deserialize)]
struct DistanceRow {
    #[serde(rename = "PersonID")]
    person_id: String,
    location: String,
    distance_km: f64,
}

pub fn read_distances(path: &Path) -> Result<BTreeMap<(PersonId, String), f64>> {
    parse_distances(open(path)?, &path.display().to_string())
}

pub fn parse_distances<R: Read>(
    reader: R,
    source: &str,
) -> Result<BTreeMap<(PersonId, String), f64>> {
    let rows = load::<DistanceRow, _>(reader, source, DISTANCE_COLUMNS)?;
    let mut distances = BTreeMap::new();

    for (row_number, row) in rows {
        let key = (PersonId::external(row.person_id), row.location);
        if distances.contains_key(&key) {
            return Err(duplicate(source, row_number, &format!("{} / {}", key.0, key.1)));
        }
        distances.insert(key, row.distance_km);
    }

    Ok(distances)
}

#[derive(Deserialize)]
struct CountryRow {
    #[serde(rename = "PersonID")]
    person_id: String,
    #[serde(rename = "CNTRY_NAME")]
    country: String,
}

pub fn read_countries(path: &Path) -> Result<Vec<(PersonId, String)>> {
    parse_countries(open(path)?, &path.display().to_string())
}

/// One row per spatial point; a person usually appears several times.
pub fn parse_countries<R: Read>(reader: R, source: &str) -> Result<Vec<(PersonId, String)>> {
    Ok(load::<CountryRow, _>(reader, source, COUNTRY_COLUMNS)?
        .into_iter()
        .map(|(_, row)| (PersonId::external(row.person_id), row.country))
        .collect())
}

fn duplicate(source: &str, row: usize, key: &str) -> PipelineError {
    PipelineError::DuplicateKey {
        path: source.to_string(),
        row,
        key: key.to_string(),
    }
}

#[derive(Serialize)]
struct AddressRow<'a> {
    address: &'a str,
}

pub fn write_addresses(path: &Path, addresses: &[String]) -> Result<()> {
    write_rows(
        path,
        addresses
            .iter()
            .map(|address| AddressRow { address: address.as_str() }),
    )
}

/// Writes serializable rows with a header taken from the field names.
pub fn write_rows<T, I>(path: &Path, rows: I) -> Result<()>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let source = path.display().to_string();
    let csv_error = |err: csv::Error| PipelineError::Csv {
        path: source.clone(),
        source: err,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
    let mut written = 0usize;
    for row in rows {
        writer.serialize(row).map_err(csv_error)?;
        written += 1;
    }
    writer.flush().map_err(|source| PipelineError::Io {
        path: path.display().to_string(),
        source,
    })?;
    debug!(path = %path.display(), rows = written, "wrote table");
    Ok(())
}
