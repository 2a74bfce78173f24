//! Hub-and-spoke geometry and the distances measured along it.
//!
//! Every analytic location becomes a line to the fixed destination. Lines are
//! exported for an external GIS tool, and the distances it computes come back
//! keyed by person and location. A [`DistanceComputer`] abstracts over that
//! round trip so it can also be done in-process.

use std::collections::BTreeMap;
use std::path::Path;

use geo::{coord, Coord, Distance, Haversine, Line, Point};
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregate::GroupedSummaries;
use crate::config::Destination;
use crate::error::Result;
use crate::identity::PersonId;
use crate::models::{Gender, LocationRecord, Occupation, PersonLocations};
use crate::tables;

#[derive(Debug, Clone, PartialEq)]
pub struct SpatialEdge {
    pub person_id: PersonId,
    pub gender: Gender,
    pub occupation: Occupation,
    pub location: String,
    /// `start` is the mentioned location, `end` the destination; x is
    /// longitude.
    pub line: Line<f64>,
}

impl SpatialEdge {
    pub fn wkt(&self) -> String {
        format!(
            "LINESTRING ({} {}, {} {})",
            self.line.start.x, self.line.start.y, self.line.end.x, self.line.end.y
        )
    }
}

fn is_destination(record: &LocationRecord, origin: Coord<f64>, destination: &Destination) -> bool {
    record.location == destination.name
        || (origin.x == destination.longitude && origin.y == destination.latitude)
}

pub fn build_edges(records: &[LocationRecord], destination: &Destination) -> Vec<SpatialEdge> {
    let hub = coord! { x: destination.longitude, y: destination.latitude };
    let mut without_coordinates = 0usize;

    let edges: Vec<SpatialEdge> = records
        .iter()
        .filter_map(|record| {
            let Some(coordinates) = record.coordinates else {
                without_coordinates += 1;
                return None;
            };
            let origin = coord! { x: coordinates.longitude, y: coordinates.latitude };
            if is_destination(record, origin, destination) {
                return None;
            }
            Some(SpatialEdge {
                person_id: record.person_id.clone(),
                gender: record.gender,
                occupation: record.occupation,
                location: record.location.clone(),
                line: Line::new(origin, hub),
            })
        })
        .collect();

    if without_coordinates > 0 {
        warn!(without_coordinates, "analytic locations without coordinates get no edge");
    }
    info!(edges = edges.len(), destination = %destination.name, "built hub-and-spoke edges");
    edges
}

#[derive(Debug, Serialize)]
pub struct EdgeRow<'a> {
    #[serde(rename = "PersonID")]
    pub person_id: &'a str,
    pub location: &'a str,
    pub origin_lon: f64,
    pub origin_lat: f64,
    pub dest_lon: f64,
    pub dest_lat: f64,
    pub wkt: String,
}

impl<'a> From<&'a SpatialEdge> for EdgeRow<'a> {
    fn from(edge: &'a SpatialEdge) -> Self {
        Self {
            person_id: edge.person_id.as_str(),
            location: &edge.location,
            origin_lon: edge.line.start.x,
            origin_lat: edge.line.start.y,
            dest_lon: edge.line.end.x,
            dest_lat: edge.line.end.y,
            wkt: edge.wkt(),
        }
    }
}

pub fn write_edges(path: &Path, edges: &[SpatialEdge]) -> Result<()> {
    tables::write_rows(path, edges.iter().map(EdgeRow::from))
}

/// Measures an edge. `None` means no distance is known for it.
pub trait DistanceComputer {
    fn distance_km(&self, edge: &SpatialEdge) -> Option<f64>;
}

/// Great-circle length of the edge on a spherical earth.
#[derive(Debug, Clone, Copy, Default)]
pub struct HaversineDistanceComputer;

impl DistanceComputer for HaversineDistanceComputer {
    fn distance_km(&self, edge: &SpatialEdge) -> Option<f64> {
        Some(haversine_km(edge.line.start, edge.line.end))
    }
}

pub fn haversine_km(a: Coord<f64>, b: Coord<f64>) -> f64 {
    Haversine.distance(Point::from(a), Point::from(b)) / 1000.0
}

/// Distances re-imported from the external GIS tool.
#[derive(Debug, Clone, Default)]
pub struct ImportedDistances {
    by_key: BTreeMap<(PersonId, String), f64>,
}

impl ImportedDistances {
    pub fn new(by_key: BTreeMap<(PersonId, String), f64>) -> Self {
        Self { by_key }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self::new(tables::read_distances(path)?))
    }
}

impl DistanceComputer for ImportedDistances {
    fn distance_km(&self, edge: &SpatialEdge) -> Option<f64> {
        self.by_key
            .get(&(edge.person_id.clone(), edge.location.clone()))
            .copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeDistance {
    pub person_id: PersonId,
    pub gender: Gender,
    pub occupation: Occupation,
    pub location: String,
    pub distance_km: f64,
}

/// Keeps only the edges the computer could measure.
pub fn attach_distances(
    edges: &[SpatialEdge],
    computer: &dyn DistanceComputer,
) -> Vec<EdgeDistance> {
    let measured: Vec<EdgeDistance> = edges
        .iter()
        .filter_map(|edge| {
            computer.distance_km(edge).map(|distance_km| EdgeDistance {
                person_id: edge.person_id.clone(),
                gender: edge.gender,
                occupation: edge.occupation,
                location: edge.location.clone(),
                distance_km,
            })
        })
        .collect();

    let missing = edges.len() - measured.len();
    if missing > 0 {
        warn!(missing, "edges without a distance are left out of distance summaries");
    }
    measured
}

/// Mean distance per person, then summarized across groups.
pub fn distance_summaries(distances: &[EdgeDistance]) -> GroupedSummaries {
    let mut per_person: BTreeMap<&PersonId, (Gender, Occupation, f64, usize)> = BTreeMap::new();
    for distance in distances {
        let entry = per_person
            .entry(&distance.person_id)
            .or_insert((distance.gender, distance.occupation, 0.0, 0));
        entry.2 += distance.distance_km;
        entry.3 += 1;
    }

    GroupedSummaries::from_people(
        per_person
            .into_values()
            .map(|(gender, occupation, total, count)| (gender, occupation, total / count as f64)),
    )
}

/// Country of every spatial point, from the external classification.
#[derive(Debug, Clone, Default)]
pub struct CountryTable {
    rows: Vec<(PersonId, String)>,
}

impl CountryTable {
    pub fn new(rows: Vec<(PersonId, String)>) -> Self {
        Self { rows }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self::new(tables::read_countries(path)?))
    }
}

/// Share of each person's points lying outside `home_country`. People absent
/// from `people` are ignored.
pub fn international_share(
    countries: &CountryTable,
    people: &BTreeMap<PersonId, PersonLocations>,
    home_country: &str,
) -> BTreeMap<PersonId, f64> {
    let mut tallies: BTreeMap<&PersonId, (usize, usize)> = BTreeMap::new();
    for (person_id, country) in &countries.rows {
        if !people.contains_key(person_id) {
            continue;
        }
        let entry = tallies.entry(person_id).or_insert((0, 0));
        entry.1 += 1;
        if !country.eq_ignore_ascii_case(home_country) {
            entry.0 += 1;
        }
    }

    tallies
        .into_iter()
        .map(|(person_id, (abroad, total))| (person_id.clone(), abroad as f64 / total as f64))
        .collect()
}

pub fn international_summaries(
    shares: &BTreeMap<PersonId, f64>,
    people: &BTreeMap<PersonId, PersonLocations>,
) -> GroupedSummaries {
    GroupedSummaries::from_people(shares.iter().filter_map(|(person_id, share)| {
        people
            .get(person_id)
            .map(|person| (person.gender, person.occupation, *share))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Coordinates;
    use approx::assert_relative_eq;

    fn record(name: &str, location: &str, coordinates: Option<(f64, f64)>) -> LocationRecord {
        LocationRecord {
            person_id: PersonId::derive(name, 30),
            gender: Gender::Male,
            occupation: Occupation::Yes,
            location: location.to_string(),
            coordinates: coordinates.map(|(latitude, longitude)| Coordinates {
                latitude,
                longitude,
            }),
            known: true,
            camp: false,
        }
    }

    #[test]
    fn edges_point_at_the_destination() {
        let destination = Destination::default();
        let records = vec![
            record("Amir", "Lahore", Some((31.5204, 74.3587))),
            record("Amir", "Delhi", Some((28.6517178, 77.2219388))),
            record("Amir", "Nowhere", None),
        ];
        let edges = build_edges(&records, &destination);

        assert_eq!(edges.len(), 1);
        let edge = &edges[0];
        assert_eq!(edge.location, "Lahore");
        assert_eq!(edge.line.start, coord! { x: 74.3587, y: 31.5204 });
        assert_eq!(edge.line.end, coord! { x: 77.2219388, y: 28.6517178 });
        assert_eq!(edge.wkt(), "LINESTRING (74.3587 31.5204, 77.2219388 28.6517178)");
    }

    #[test]
    fn destination_matches_by_coordinates_too() {
        let destination = Destination::default();
        let records = vec![record("Amir", "Old Delhi", Some((28.6517178, 77.2219388)))];
        assert!(build_edges(&records, &destination).is_empty());
    }

    #[test]
    fn haversine_lahore_to_delhi() {
        let lahore = coord! { x: 74.3587, y: 31.5204 };
        let delhi = coord! { x: 77.2219388, y: 28.6517178 };
        let km = haversine_km(lahore, delhi);
        assert!((km - 424.0).abs() < 10.0, "got {km}");
        assert_relative_eq!(haversine_km(delhi, delhi), 0.0);
        assert_relative_eq!(haversine_km(lahore, delhi), haversine_km(delhi, lahore));
    }

    #[test]
    fn haversine_computer_measures_in_kilometres() {
        let equator = coord! { x: 0.0, y: 0.0 };
        let one_degree_east = coord! { x: 1.0, y: 0.0 };
        assert_relative_eq!(haversine_km(equator, one_degree_east), 111.195, epsilon = 0.01);

        let edges = build_edges(
            &[record("Amir", "Lahore", Some((31.5204, 74.3587)))],
            &Destination::default(),
        );
        let measured = attach_distances(&edges, &HaversineDistanceComputer);
        assert_eq!(measured.len(), 1);
        assert_relative_eq!(
            measured[0].distance_km,
            haversine_km(edges[0].line.start, edges[0].line.end)
        );
    }

    #[test]
    fn missing_distances_are_excluded_not_zero() {
        let destination = Destination::default();
        let records = vec![
            record("Amir", "Lahore", Some((31.5204, 74.3587))),
            record("Amir", "Amritsar", Some((31.634, 74.8723))),
        ];
        let edges = build_edges(&records, &destination);

        let mut known = BTreeMap::new();
        known.insert((PersonId::derive("Amir", 30), "Lahore".to_string()), 423.0);
        let measured = attach_distances(&edges, &ImportedDistances::new(known));

        assert_eq!(measured.len(), 1);
        assert_eq!(measured[0].distance_km, 423.0);
        let summaries = distance_summaries(&measured);
        assert_eq!(summaries.by_gender[&Gender::Male].mean, 423.0);
    }

    #[test]
    fn distance_summary_averages_per_person_first() {
        let distances = vec![
            EdgeDistance {
                person_id: PersonId::derive("Amir", 30),
                gender: Gender::Male,
                occupation: Occupation::Yes,
                location: "Lahore".to_string(),
                distance_km: 400.0,
            },
            EdgeDistance {
                person_id: PersonId::derive("Amir", 30),
                gender: Gender::Male,
                occupation: Occupation::Yes,
                location: "Karachi".to_string(),
                distance_km: 1000.0,
            },
            EdgeDistance {
                person_id: PersonId::derive("Dev", 45),
                gender: Gender::Male,
                occupation: Occupation::Yes,
                location: "Amritsar".to_string(),
                distance_km: 100.0,
            },
        ];
        let summaries = distance_summaries(&distances);
        let male = &summaries.by_gender[&Gender::Male];

        assert_eq!(male.count, 2);
        assert_relative_eq!(male.mean, 400.0);
    }

    #[test]
    fn international_share_ignores_unknown_people() {
        let amir = PersonId::derive("Amir", 30);
        let mut people = BTreeMap::new();
        people.insert(
            amir.clone(),
            PersonLocations {
                gender: Gender::Male,
                occupation: Occupation::Yes,
                locations: 4,
                camps: 0,
            },
        );
        let countries = CountryTable::new(vec![
            (amir.clone(), "Pakistan".to_string()),
            (amir.clone(), "India".to_string()),
            (amir.clone(), "INDIA".to_string()),
            (amir.clone(), "Bangladesh".to_string()),
            (PersonId::derive("Bibi", 28), "Pakistan".to_string()),
        ]);

        let shares = international_share(&countries, &people, "India");
        assert_eq!(shares.len(), 1);
        assert_relative_eq!(shares[&amir], 0.5);

        let summaries = international_summaries(&shares, &people);
        assert_relative_eq!(summaries.by_gender[&Gender::Male].mean, 0.5);
    }

    #[test]
    fn writes_edges_for_the_gis_tool() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edges.csv");
        let edges = build_edges(
            &[record("Amir", "Lahore", Some((31.5, 74.25)))],
            &Destination::default(),
        );
        write_edges(&path, &edges).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let mut lines = written.lines();
        assert_eq!(
            lines.next(),
            Some("PersonID,location,origin_lon,origin_lat,dest_lon,dest_lat,wkt")
        );
        assert_eq!(
            lines.next(),
            Some("Amir_30,Lahore,74.25,31.5,77.2219388,28.6517178,\"LINESTRING (74.25 31.5, 77.2219388 28.6517178)\"")
        );
    }
}
