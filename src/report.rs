use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::{migration_routes, ranked_locations, GroupedSummaries, LabelledSummaries};
use crate::models::{category_label, Summary};
use crate::pipeline::PipelineRun;
use crate::stats::{AnovaResult, StatsError, TTestResult};

const TOP_LOCATIONS: usize = 10;
const TOP_ROUTES: usize = 5;

fn write_summary_line(output: &mut String, label: &str, summary: &Summary) {
    let _ = writeln!(
        output,
        "- {}: n={} mean {:.2} median {:.2} (q25 {:.2}, q75 {:.2}, max {:.2})",
        label, summary.count, summary.mean, summary.median, summary.q25, summary.q75, summary.max
    );
}

fn write_grouped(output: &mut String, title: &str, grouped: &GroupedSummaries) {
    let _ = writeln!(output, "## {title}");
    if grouped.is_empty() {
        let _ = writeln!(output, "No people in the analytic subpopulation.");
        let _ = writeln!(output);
        return;
    }

    let _ = writeln!(output, "### By gender");
    for (gender, summary) in &grouped.by_gender {
        write_summary_line(output, gender.label(), summary);
    }
    let _ = writeln!(output, "### By occupation");
    for (occupation, summary) in &grouped.by_occupation {
        write_summary_line(output, occupation.label(), summary);
    }
    let _ = writeln!(output, "### By gender and occupation");
    for ((gender, occupation), summary) in &grouped.by_category {
        write_summary_line(output, &category_label(*gender, *occupation), summary);
    }
    let _ = writeln!(output);
}

pub fn t_test_line(name: &str, result: &Result<TTestResult, StatsError>) -> String {
    match result {
        Ok(test) => format!(
            "{name}: {} mean {:.2} vs {} mean {:.2}, t = {:.3}, df = {:.1}, p = {:.4}",
            test.group_a, test.mean_a, test.group_b, test.mean_b, test.t, test.df, test.p_value
        ),
        Err(err) => format!("{name}: not computed ({err})"),
    }
}

pub fn anova_line(name: &str, result: &Result<AnovaResult, StatsError>) -> String {
    match result {
        Ok(test) => format!(
            "{name}: F({:.0}, {:.0}) = {:.3}, p = {:.4} across {}",
            test.df_between,
            test.df_within,
            test.f,
            test.p_value,
            test.groups.join(", ")
        ),
        Err(err) => format!("{name}: not computed ({err})"),
    }
}

pub fn build_report(run: &PipelineRun, destination: &str, generated_at: DateTime<Utc>) -> String {
    let aggregates = &run.aggregates;
    let mut output = String::new();

    let _ = writeln!(output, "# Narrative Geography Report");
    let _ = writeln!(
        output,
        "Generated {} from {} normalized mentions ({} in the analytic subpopulation, {} people)",
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        run.normalized.len(),
        aggregates.records.len(),
        aggregates.loc_by_name.len()
    );
    let unresolved = run
        .joined
        .iter()
        .filter(|row| row.resolved.is_none() && !row.mention.address.is_empty())
        .count();
    if unresolved > 0 {
        let _ = writeln!(
            output,
            "{unresolved} mentions are missing from the resolved-location table and were left out."
        );
    }
    if !run.geolocated.is_empty() {
        let matched = run
            .geolocated
            .iter()
            .filter(|row| row.latitude.is_some())
            .count();
        let _ = writeln!(
            output,
            "Geocode lookup matched {} of {} distinct addresses.",
            matched,
            run.geolocated.len()
        );
    }
    let _ = writeln!(output);

    write_grouped(&mut output, "Locations per Person", &aggregates.locations);
    write_grouped(&mut output, "Share of Locations that are Camps", &aggregates.camp_share);

    let _ = writeln!(output, "## Most Mentioned Locations");
    let ranked = ranked_locations(&aggregates.loc_total);
    if ranked.is_empty() {
        let _ = writeln!(output, "No locations in the analytic subpopulation.");
    } else {
        for (location, total) in ranked.iter().take(TOP_LOCATIONS) {
            let _ = writeln!(output, "- {location}: {total} people");
        }
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "## Migration Routes");
    let routes = migration_routes(&run.normalized);
    if routes.is_empty() {
        let _ = writeln!(output, "No migration endpoints recorded.");
    } else {
        for ((from, to), people) in routes.iter().take(TOP_ROUTES) {
            let _ = writeln!(output, "- {from} -> {to}: {people} people");
        }
    }
    let _ = writeln!(output);

    let _ = writeln!(output, "## Statistical Tests");
    let _ = writeln!(output, "- {}", t_test_line("Welch t-test by gender", &run.tests.by_gender));
    let _ = writeln!(
        output,
        "- {}",
        t_test_line("Welch t-test by occupation", &run.tests.by_occupation)
    );
    let _ = writeln!(
        output,
        "- {}",
        anova_line("ANOVA by gender and occupation", &run.tests.by_category)
    );
    let _ = writeln!(output);

    write_grouped(
        &mut output,
        &format!("Mean Distance to {destination} (km)"),
        &run.distance_summaries,
    );

    if let Some(international) = &run.international {
        write_grouped(&mut output, "Share of International Locations", international);
    }

    output
}

/// Machine-readable form of a run for `stats --json`.
#[derive(Debug, Serialize)]
pub struct StatsDocument {
    pub people: usize,
    pub analytic_rows: usize,
    pub loc_by_name: BTreeMap<String, usize>,
    pub loc_total: BTreeMap<String, usize>,
    pub locations: LabelledSummaries,
    pub camp_share: LabelledSummaries,
    pub distances: LabelledSummaries,
    pub international: Option<LabelledSummaries>,
    pub tests: BTreeMap<&'static str, serde_json::Value>,
}

fn outcome<T: Serialize>(result: &Result<T, StatsError>) -> serde_json::Value {
    match result {
        Ok(value) => serde_json::to_value(value)
            .unwrap_or_else(|err| serde_json::json!({ "error": err.to_string() })),
        Err(err) => serde_json::json!({ "error": err.to_string() }),
    }
}

impl StatsDocument {
    pub fn from_run(run: &PipelineRun) -> Self {
        let aggregates = &run.aggregates;
        let mut tests = BTreeMap::new();
        tests.insert("t_test_by_gender", outcome(&run.tests.by_gender));
        tests.insert("t_test_by_occupation", outcome(&run.tests.by_occupation));
        tests.insert("anova_by_category", outcome(&run.tests.by_category));

        Self {
            people: aggregates.loc_by_name.len(),
            analytic_rows: aggregates.records.len(),
            loc_by_name: aggregates
                .loc_by_name
                .iter()
                .map(|(person_id, person)| (person_id.to_string(), person.locations))
                .collect(),
            loc_total: aggregates.loc_total.clone(),
            locations: aggregates.locations.labelled(),
            camp_share: aggregates.camp_share.labelled(),
            distances: run.distance_summaries.labelled(),
            international: run.international.as_ref().map(GroupedSummaries::labelled),
            tests,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::config::Config;
    use crate::geocode::ResolvedLocationTable;
    use crate::models::ResolvedLocation;
    use crate::pipeline::{Inputs, Pipeline};
    use crate::tables;

    const MENTIONS: &str = "\
name,age,migrated_from,migrated_to,gender,occupation,location,city,country
Amir,30,Lahore,Delhi,Male,Yes,,Lahore,
Amir,30,Lahore,Delhi,Male,Yes,,Delhi,
Bibi,28,Lahore,Amritsar,Female,No,,Lahore,
";

    fn resolved(address: &str, latitude: f64, longitude: f64) -> ResolvedLocation {
        ResolvedLocation {
            address: address.to_string(),
            latitude: Some(latitude),
            longitude: Some(longitude),
            known: true,
            camp: false,
            resolved_location: address.to_string(),
            admin: false,
        }
    }

    fn run() -> PipelineRun {
        let config = Config::default();
        let inputs = Inputs {
            mentions: tables::parse_mentions(MENTIONS.as_bytes(), "mentions.csv", &config.prefixes)
                .unwrap(),
            resolved: ResolvedLocationTable::new(vec![
                resolved("Lahore", 31.5204, 74.3587),
                resolved("Delhi", 28.6517178, 77.2219388),
            ]),
            countries: None,
        };
        Pipeline::new(config).run(&inputs)
    }

    #[test]
    fn report_rounds_means_and_omits_empty_groups() {
        let generated_at = Utc.with_ymd_and_hms(2026, 2, 8, 12, 0, 0).unwrap();
        let report = build_report(&run(), "Delhi", generated_at);

        assert!(report.starts_with("# Narrative Geography Report"));
        assert!(report.contains("Generated 2026-02-08 12:00 UTC from 3 normalized mentions"));
        assert!(report.contains("- Male: n=1 mean 2.00 median 2.00"));
        assert!(!report.contains("- Female:"));
        assert!(report.contains("- Delhi: 1 people"));
        assert!(report.contains("- Lahore -> Delhi: 1 people"));
        assert!(report.contains("- Lahore -> Amritsar: 1 people"));
        assert!(report.contains("Welch t-test by gender: not computed"));
        assert!(!report.contains("Share of International Locations"));
    }

    #[test]
    fn json_document_keeps_failures_visible() {
        let document = StatsDocument::from_run(&run());
        let json = serde_json::to_value(&document).unwrap();

        assert_eq!(json["people"], 1);
        assert_eq!(json["loc_by_name"]["Amir_30"], 2);
        assert_eq!(json["locations"]["by_gender"]["Male"]["mean"], 2.0);
        assert!(json["locations"]["by_gender"].get("Female").is_none());
        assert!(json["tests"]["t_test_by_gender"]["error"]
            .as_str()
            .unwrap()
            .contains("at least 2"));
    }

    #[test]
    fn t_test_line_formats_success() {
        let line = t_test_line(
            "Welch",
            &Ok(TTestResult {
                group_a: "Female".to_string(),
                group_b: "Male".to_string(),
                mean_a: 2.0,
                mean_b: 3.456,
                t: -1.23456,
                df: 7.9,
                p_value: 0.25,
            }),
        );
        assert_eq!(
            line,
            "Welch: Female mean 2.00 vs Male mean 3.46, t = -1.235, df = 7.9, p = 0.2500"
        );
    }
}
