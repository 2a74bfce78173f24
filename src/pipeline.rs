use tracing::info;

use crate::aggregate::{self, Aggregates, GroupedSummaries};
use crate::config::Config;
use crate::geocode::{self, GeocodingProvider, ResolvedLocationTable};
use crate::models::{AnalyticRow, GeolocatedAddress, LocationMention, NormalizedMention};
use crate::normalize;
use crate::spatial::{self, CountryTable, DistanceComputer, EdgeDistance, HaversineDistanceComputer, SpatialEdge};
use crate::stats::{self, TestReport};

/// Inputs for one analysis run, already loaded.
pub struct Inputs {
    pub mentions: Vec<LocationMention>,
    pub resolved: ResolvedLocationTable,
    pub countries: Option<CountryTable>,
}

/// Every intermediate table of a run, kept for export and reporting.
pub struct PipelineRun {
    pub normalized: Vec<NormalizedMention>,
    pub geolocated: Vec<GeolocatedAddress>,
    pub joined: Vec<AnalyticRow>,
    pub aggregates: Aggregates,
    pub tests: TestReport,
    pub edges: Vec<SpatialEdge>,
    pub distances: Vec<EdgeDistance>,
    pub distance_summaries: GroupedSummaries,
    pub international: Option<GroupedSummaries>,
}

/// Steps 1 through 7 as a sequence of pure stages with injected
/// collaborators. The geocoder is optional because the resolved table
/// already carries corrected coordinates.
pub struct Pipeline {
    config: Config,
    geocoder: Option<Box<dyn GeocodingProvider>>,
    distances: Box<dyn DistanceComputer>,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            geocoder: None,
            distances: Box::new(HaversineDistanceComputer),
        }
    }

    pub fn with_geocoder(mut self, geocoder: Box<dyn GeocodingProvider>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    pub fn with_distance_computer(mut self, distances: Box<dyn DistanceComputer>) -> Self {
        self.distances = distances;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn normalize(&self, mentions: &[LocationMention]) -> Vec<NormalizedMention> {
        normalize::normalize_mentions(mentions, &self.config.prefixes)
    }

    pub fn geocode(&self, normalized: &[NormalizedMention]) -> Vec<GeolocatedAddress> {
        match &self.geocoder {
            Some(geocoder) => {
                geocode::geocode_addresses(&normalize::distinct_addresses(normalized), geocoder.as_ref())
            }
            None => Vec::new(),
        }
    }

    pub fn edges(&self, aggregates: &Aggregates) -> Vec<SpatialEdge> {
        spatial::build_edges(&aggregates.records, &self.config.destination)
    }

    pub fn run(&self, inputs: &Inputs) -> PipelineRun {
        let normalized = self.normalize(&inputs.mentions);
        let geolocated = self.geocode(&normalized);
        let joined = geocode::join_resolved(&normalized, &inputs.resolved);
        let aggregates = aggregate::aggregate(&joined);
        let tests = stats::run_tests(&aggregates);
        let edges = self.edges(&aggregates);
        let distances = spatial::attach_distances(&edges, self.distances.as_ref());
        let distance_summaries = spatial::distance_summaries(&distances);
        let international = inputs.countries.as_ref().map(|countries| {
            let shares = spatial::international_share(
                countries,
                &aggregates.loc_by_name,
                &self.config.home_country,
            );
            spatial::international_summaries(&shares, &aggregates.loc_by_name)
        });

        info!(
            people = aggregates.loc_by_name.len(),
            edges = edges.len(),
            measured = distances.len(),
            "pipeline run complete"
        );

        PipelineRun {
            normalized,
            geolocated,
            joined,
            aggregates,
            tests,
            edges,
            distances,
            distance_summaries,
            international,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PersonId;
    use crate::models::{Coordinates, Gender, Occupation, ResolvedLocation};
    use crate::stats::StatsError;
    use crate::tables;

    const MENTIONS: &str = "\
name,age,migrated_from,migrated_to,gender,occupation,location,city,country
Amir,30,Lahore,Delhi,Male,Yes,,Lahore,
Amir,30,Lahore,Delhi,Male,Yes,,Delhi,
Bibi,28,Lahore,Amritsar,Female,No,,Lahore,
";

    const RESOLVED: &str = "\
address,latitude,longitude,known,camp,resolved_location,admin
Lahore,31.5204,74.3587,true,false,Lahore,false
Delhi,28.6517178,77.2219388,true,false,Delhi,false
";

    struct FakeGeocoder;

    impl GeocodingProvider for FakeGeocoder {
        fn lookup(&self, address: &str) -> Option<Coordinates> {
            (address == "Lahore").then_some(Coordinates {
                latitude: 31.5204,
                longitude: 74.3587,
            })
        }
    }

    struct FixedDistance(f64);

    impl DistanceComputer for FixedDistance {
        fn distance_km(&self, _edge: &SpatialEdge) -> Option<f64> {
            Some(self.0)
        }
    }

    fn inputs() -> Inputs {
        let config = Config::default();
        Inputs {
            mentions: tables::parse_mentions(MENTIONS.as_bytes(), "mentions.csv", &config.prefixes)
                .unwrap(),
            resolved: ResolvedLocationTable::new(
                tables::parse_resolved(RESOLVED.as_bytes(), "resolved.csv").unwrap(),
            ),
            countries: None,
        }
    }

    #[test]
    fn two_narrators_end_to_end() {
        let run = Pipeline::new(Config::default()).run(&inputs());
        let amir = PersonId::derive("Amir", 30);

        assert_eq!(run.aggregates.loc_by_name.len(), 1);
        assert_eq!(run.aggregates.loc_by_name[&amir].locations, 2);
        assert_eq!(run.aggregates.loc_total["Lahore"], 1);
        assert_eq!(run.aggregates.loc_total["Delhi"], 1);
        assert_eq!(run.aggregates.locations.by_gender[&Gender::Male].mean, 2.0);
        assert!(!run
            .aggregates
            .locations
            .by_gender
            .contains_key(&Gender::Female));
    }

    #[test]
    fn tiny_population_reports_test_preconditions() {
        let run = Pipeline::new(Config::default()).run(&inputs());
        assert!(matches!(
            run.tests.by_gender,
            Err(StatsError::InsufficientObservations { .. })
        ));
        assert!(run.tests.by_category.is_err());
    }

    #[test]
    fn join_keeps_every_normalized_row() {
        let run = Pipeline::new(Config::default()).run(&inputs());
        assert_eq!(run.joined.len(), run.normalized.len());
        assert_eq!(run.normalized.len(), 3);
    }

    #[test]
    fn edges_skip_the_destination() {
        let run = Pipeline::new(Config::default()).run(&inputs());
        assert_eq!(run.edges.len(), 1);
        assert_eq!(run.edges[0].location, "Lahore");
        assert_eq!(run.distances.len(), 1);
    }

    #[test]
    fn injected_collaborators_are_used() {
        let pipeline = Pipeline::new(Config::default())
            .with_geocoder(Box::new(FakeGeocoder))
            .with_distance_computer(Box::new(FixedDistance(500.0)));
        let run = pipeline.run(&inputs());

        assert_eq!(run.geolocated.len(), 2);
        let delhi = run
            .geolocated
            .iter()
            .find(|row| row.address == "Delhi")
            .unwrap();
        assert_eq!(delhi.latitude, None);
        assert_eq!(run.distance_summaries.by_gender[&Gender::Male].mean, 500.0);
    }

    #[test]
    fn countries_feed_international_share() {
        let mut inputs = inputs();
        inputs.countries = Some(CountryTable::new(vec![
            (PersonId::derive("Amir", 30), "Pakistan".to_string()),
            (PersonId::derive("Amir", 30), "India".to_string()),
        ]));
        let run = Pipeline::new(Config::default()).run(&inputs);

        let international = run.international.unwrap();
        assert_eq!(
            international.by_category[&(Gender::Male, Occupation::Yes)].mean,
            0.5
        );
    }

    #[test]
    fn admin_areas_never_reach_aggregates() {
        let mut inputs = inputs();
        inputs.resolved = ResolvedLocationTable::new(vec![ResolvedLocation {
            address: "Lahore".to_string(),
            latitude: Some(31.5),
            longitude: Some(74.3),
            known: true,
            camp: false,
            resolved_location: "Lahore".to_string(),
            admin: true,
        }]);
        let run = Pipeline::new(Config::default()).run(&inputs);

        assert!(!run.aggregates.loc_total.contains_key("Lahore"));
        assert!(run.edges.is_empty());
    }

    #[test]
    fn addresses_sharing_a_place_give_one_edge_and_reimport_cleanly() {
        let config = Config::default();
        let mentions = "\
name,age,migrated_from,migrated_to,gender,occupation,location,city,country
Amir,30,Lahore,Delhi,Male,Yes,,Lahore,
Amir,30,Lahore,Delhi,Male,Yes,Anarkali,Lahore,
";
        let resolved = "\
address,latitude,longitude,known,camp,resolved_location,admin
Lahore,31.5204,74.3587,true,false,Lahore,false
\"Anarkali, Lahore\",31.5670,74.3100,true,false,Lahore,false
";
        let inputs = Inputs {
            mentions: tables::parse_mentions(mentions.as_bytes(), "mentions.csv", &config.prefixes)
                .unwrap(),
            resolved: ResolvedLocationTable::new(
                tables::parse_resolved(resolved.as_bytes(), "resolved.csv").unwrap(),
            ),
            countries: None,
        };
        let run = Pipeline::new(config).run(&inputs);
        let amir = PersonId::derive("Amir", 30);

        assert_eq!(run.normalized.len(), 2);
        assert_eq!(run.aggregates.loc_by_name[&amir].locations, 1);
        assert_eq!(run.aggregates.loc_total["Lahore"], 1);
        assert_eq!(run.edges.len(), 1);

        let dir = tempfile::tempdir().unwrap();
        let edges_path = dir.path().join("edges.csv");
        spatial::write_edges(&edges_path, &run.edges).unwrap();

        let mut measured = String::from("PersonID,location,distance_km\n");
        let mut reader = csv::Reader::from_path(&edges_path).unwrap();
        for record in reader.records() {
            let record = record.unwrap();
            measured.push_str(&format!("{},{},424.5\n", &record[0], &record[1]));
        }
        let imported = tables::parse_distances(measured.as_bytes(), "distances.csv").unwrap();
        let distances =
            spatial::attach_distances(&run.edges, &spatial::ImportedDistances::new(imported));

        assert_eq!(distances.len(), 1);
        assert_eq!(distances[0].distance_km, 424.5);
    }
}
