use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::PersonId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Gender {
    Female,
    Male,
}

impl Gender {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "female" | "f" => Some(Self::Female),
            "male" | "m" => Some(Self::Male),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Female => "Female",
            Self::Male => "Male",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether the narrative mentions the narrator's occupation.
///
/// `No` and `NotMentioned` are distinct source categories and are kept apart.
/// Only `No` is excluded from analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Occupation {
    No,
    NotMentioned,
    Yes,
}

impl Occupation {
    pub fn parse(raw: &str) -> Option<Self> {
        let folded: String = raw
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match folded.as_str() {
            "no" => Some(Self::No),
            "notmentioned" => Some(Self::NotMentioned),
            "yes" => Some(Self::Yes),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::No => "No",
            Self::NotMentioned => "Not Mentioned",
            Self::Yes => "Yes",
        }
    }
}

impl fmt::Display for Occupation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub fn category_label(gender: Gender, occupation: Occupation) -> String {
    format!("{gender} / {occupation}")
}

/// One place as narrated by one person, straight from the raw table.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationMention {
    pub person_name: String,
    pub age: u32,
    pub gender: Gender,
    pub occupation: Occupation,
    pub location: String,
    pub city: String,
    pub country: String,
    pub migrated_from: String,
    pub migrated_to: String,
}

/// A mention after address construction and per-person deduplication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedMention {
    pub person_id: PersonId,
    pub gender: Gender,
    pub occupation: Occupation,
    pub address: String,
    pub migrated_from: String,
    pub migrated_to: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A distinct address with whatever the geocoder returned for it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeolocatedAddress {
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// A manually corrected geocode for one address.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// False when the coordinates are a best-effort guess.
    pub known: bool,
    pub camp: bool,
    pub resolved_location: String,
    /// Administrative regions and rivers; never analysed.
    pub admin: bool,
}

impl ResolvedLocation {
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }
}

/// A normalized mention left-joined to the resolved-location table.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticRow {
    pub mention: NormalizedMention,
    pub resolved: Option<ResolvedLocation>,
}

/// The projection of an analytic row that aggregation works on.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationRecord {
    pub person_id: PersonId,
    pub gender: Gender,
    pub occupation: Occupation,
    pub location: String,
    pub coordinates: Option<Coordinates>,
    pub known: bool,
    pub camp: bool,
}

impl LocationRecord {
    /// A place counts once per person, whichever address it was reached
    /// through.
    pub fn dedup_key(&self) -> (PersonId, String) {
        (self.person_id.clone(), self.location.clone())
    }
}

/// Per-person counts within the analytic subpopulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonLocations {
    pub gender: Gender,
    pub occupation: Occupation,
    pub locations: usize,
    pub camps: usize,
}

impl PersonLocations {
    pub fn camp_share(&self) -> f64 {
        self.camps as f64 / self.locations as f64
    }
}

/// Descriptive statistics for one group, kept at full precision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; undefined below two observations.
    pub std: Option<f64>,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}
