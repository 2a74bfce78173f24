//! Comparison tests over per-person location counts.
//!
//! Results are terminal diagnostics; nothing here feeds back into the
//! pipeline. A test whose preconditions fail returns a [`StatsError`] that the
//! caller must surface.

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};
use thiserror::Error;

use crate::aggregate::{mean, sample_variance, Aggregates};
use crate::models::{category_label, Gender, Occupation};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatsError {
    #[error("group `{group}` has {count} observation(s); at least 2 are required")]
    InsufficientObservations { group: String, count: usize },

    #[error("analysis of variance needs at least 2 groups, found {0}")]
    TooFewGroups(usize),

    #[error("every group has zero variance; the test statistic is undefined")]
    ZeroVariance,

    #[error("distribution error: {0}")]
    Distribution(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TTestResult {
    pub group_a: String,
    pub group_b: String,
    pub mean_a: f64,
    pub mean_b: f64,
    pub t: f64,
    pub df: f64,
    pub p_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnovaResult {
    pub groups: Vec<String>,
    pub f: f64,
    pub df_between: f64,
    pub df_within: f64,
    pub p_value: f64,
}

fn require_observations(group: &str, values: &[f64]) -> Result<(), StatsError> {
    if values.len() < 2 {
        return Err(StatsError::InsufficientObservations {
            group: group.to_string(),
            count: values.len(),
        });
    }
    Ok(())
}

/// Two-sided unequal-variance t-test with Welch–Satterthwaite degrees of
/// freedom.
pub fn welch_t_test(a: (&str, &[f64]), b: (&str, &[f64])) -> Result<TTestResult, StatsError> {
    let (label_a, values_a) = a;
    let (label_b, values_b) = b;
    require_observations(label_a, values_a)?;
    require_observations(label_b, values_b)?;

    let n_a = values_a.len() as f64;
    let n_b = values_b.len() as f64;
    let mean_a = mean(values_a).unwrap_or_default();
    let mean_b = mean(values_b).unwrap_or_default();
    let se_a = sample_variance(values_a).unwrap_or_default() / n_a;
    let se_b = sample_variance(values_b).unwrap_or_default() / n_b;
    let se = se_a + se_b;
    if se == 0.0 {
        return Err(StatsError::ZeroVariance);
    }

    let t = (mean_a - mean_b) / se.sqrt();
    let df = se.powi(2) / (se_a.powi(2) / (n_a - 1.0) + se_b.powi(2) / (n_b - 1.0));
    let distribution = StudentsT::new(0.0, 1.0, df)
        .map_err(|err| StatsError::Distribution(err.to_string()))?;
    let p_value = (2.0 * (1.0 - distribution.cdf(t.abs()))).clamp(0.0, 1.0);

    Ok(TTestResult {
        group_a: label_a.to_string(),
        group_b: label_b.to_string(),
        mean_a,
        mean_b,
        t,
        df,
        p_value,
    })
}

/// One-way analysis of variance across labelled groups.
pub fn one_way_anova(groups: &[(String, Vec<f64>)]) -> Result<AnovaResult, StatsError> {
    if groups.len() < 2 {
        return Err(StatsError::TooFewGroups(groups.len()));
    }
    for (label, values) in groups {
        require_observations(label, values)?;
    }

    let total: usize = groups.iter().map(|(_, values)| values.len()).sum();
    let grand_mean =
        groups.iter().flat_map(|(_, values)| values).sum::<f64>() / total as f64;

    let mut between = 0.0;
    let mut within = 0.0;
    for (_, values) in groups {
        let group_mean = mean(values).unwrap_or_default();
        between += values.len() as f64 * (group_mean - grand_mean).powi(2);
        within += values
            .iter()
            .map(|value| (value - group_mean).powi(2))
            .sum::<f64>();
    }
    if within == 0.0 {
        return Err(StatsError::ZeroVariance);
    }

    let df_between = (groups.len() - 1) as f64;
    let df_within = (total - groups.len()) as f64;
    let f = (between / df_between) / (within / df_within);
    let distribution = FisherSnedecor::new(df_between, df_within)
        .map_err(|err| StatsError::Distribution(err.to_string()))?;
    let p_value = (1.0 - distribution.cdf(f)).clamp(0.0, 1.0);

    Ok(AnovaResult {
        groups: groups.iter().map(|(label, _)| label.clone()).collect(),
        f,
        df_between,
        df_within,
        p_value,
    })
}

/// Outcomes of the three standard comparisons. Each is kept independently so
/// one failed precondition does not hide the others.
#[derive(Debug, Clone, PartialEq)]
pub struct TestReport {
    pub by_gender: Result<TTestResult, StatsError>,
    pub by_occupation: Result<TTestResult, StatsError>,
    pub by_category: Result<AnovaResult, StatsError>,
}

pub fn run_tests(aggregates: &Aggregates) -> TestReport {
    let counts_where = |keep: &dyn Fn(Gender, Occupation) -> bool| -> Vec<f64> {
        aggregates
            .loc_by_name
            .values()
            .filter(|person| keep(person.gender, person.occupation))
            .map(|person| person.locations as f64)
            .collect()
    };

    let female = counts_where(&|gender, _| gender == Gender::Female);
    let male = counts_where(&|gender, _| gender == Gender::Male);
    let employed = counts_where(&|_, occupation| occupation == Occupation::Yes);
    let unmentioned = counts_where(&|_, occupation| occupation == Occupation::NotMentioned);

    let categories: Vec<(String, Vec<f64>)> = [Gender::Female, Gender::Male]
        .into_iter()
        .flat_map(|gender| {
            [Occupation::NotMentioned, Occupation::Yes]
                .into_iter()
                .map(move |occupation| (gender, occupation))
        })
        .map(|(gender, occupation)| {
            (
                category_label(gender, occupation),
                counts_where(&|g, o| g == gender && o == occupation),
            )
        })
        .filter(|(_, values)| !values.is_empty())
        .collect();

    TestReport {
        by_gender: welch_t_test(
            (Gender::Female.label(), &female),
            (Gender::Male.label(), &male),
        ),
        by_occupation: welch_t_test(
            (Occupation::Yes.label(), &employed),
            (Occupation::NotMentioned.label(), &unmentioned),
        ),
        by_category: one_way_anova(&categories),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::PersonId;
    use crate::models::PersonLocations;
    use approx::assert_relative_eq;

    const A: &[f64] = &[1.0, 2.0, 3.0, 4.0, 5.0];
    const B: &[f64] = &[3.0, 4.0, 5.0, 6.0, 7.0];

    #[test]
    fn identical_groups_are_not_significant() {
        let result = welch_t_test(("a", A), ("b", A)).unwrap();
        assert_relative_eq!(result.t, 0.0);
        assert!(result.p_value > 0.5);
    }

    #[test]
    fn welch_matches_hand_computation() {
        let result = welch_t_test(("a", A), ("b", B)).unwrap();

        assert_relative_eq!(result.t, -2.0, epsilon = 1e-12);
        assert_relative_eq!(result.df, 8.0, epsilon = 1e-9);
        assert_relative_eq!(result.p_value, 0.080516, epsilon = 1e-4);
        assert_eq!(result.mean_a, 3.0);
        assert_eq!(result.mean_b, 5.0);
    }

    #[test]
    fn welch_df_shrinks_with_unequal_variance() {
        let wide = [2.0, 4.0, 6.0, 8.0, 10.0];
        let result = welch_t_test(("a", A), ("b", &wide)).unwrap();

        assert!(result.df < 8.0);
        assert!(result.p_value > 0.0 && result.p_value < 1.0);
    }

    #[test]
    fn tiny_group_is_a_precondition_failure() {
        let err = welch_t_test(("Female", &[3.0]), ("Male", A)).unwrap_err();
        assert_eq!(
            err,
            StatsError::InsufficientObservations {
                group: "Female".to_string(),
                count: 1,
            }
        );
    }

    #[test]
    fn constant_groups_have_no_test_statistic() {
        let err = welch_t_test(("a", &[2.0, 2.0]), ("b", &[2.0, 2.0, 2.0])).unwrap_err();
        assert_eq!(err, StatsError::ZeroVariance);
    }

    #[test]
    fn two_group_anova_agrees_with_t_test() {
        let groups = vec![("a".to_string(), A.to_vec()), ("b".to_string(), B.to_vec())];
        let anova = one_way_anova(&groups).unwrap();
        let t_test = welch_t_test(("a", A), ("b", B)).unwrap();

        assert_relative_eq!(anova.f, 4.0, epsilon = 1e-12);
        assert_relative_eq!(anova.f, t_test.t.powi(2), epsilon = 1e-12);
        assert_eq!(anova.df_between, 1.0);
        assert_eq!(anova.df_within, 8.0);
        assert_relative_eq!(anova.p_value, t_test.p_value, epsilon = 1e-6);
    }

    #[test]
    fn anova_needs_two_groups() {
        let groups = vec![("a".to_string(), A.to_vec())];
        assert_eq!(one_way_anova(&groups), Err(StatsError::TooFewGroups(1)));
    }

    #[test]
    fn anova_rejects_singleton_group() {
        let groups = vec![
            ("a".to_string(), A.to_vec()),
            ("b".to_string(), vec![4.0]),
        ];
        assert!(matches!(
            one_way_anova(&groups),
            Err(StatsError::InsufficientObservations { count: 1, .. })
        ));
    }

    fn person(gender: Gender, occupation: Occupation, locations: usize) -> PersonLocations {
        PersonLocations {
            gender,
            occupation,
            locations,
            camps: 0,
        }
    }

    #[test]
    fn run_tests_reports_each_outcome() {
        let mut aggregates = Aggregates::default();
        let people = [
            ("A", Gender::Male, Occupation::Yes, 2),
            ("B", Gender::Male, Occupation::Yes, 4),
            ("C", Gender::Female, Occupation::Yes, 1),
            ("D", Gender::Female, Occupation::Yes, 3),
            ("E", Gender::Female, Occupation::NotMentioned, 2),
        ];
        for (name, gender, occupation, locations) in people {
            aggregates.loc_by_name.insert(
                PersonId::derive(name, 40),
                person(gender, occupation, locations),
            );
        }

        let report = run_tests(&aggregates);

        let by_gender = report.by_gender.unwrap();
        assert_eq!(by_gender.group_a, "Female");
        assert_relative_eq!(by_gender.mean_a, 2.0);
        assert_relative_eq!(by_gender.mean_b, 3.0);
        assert_eq!(
            report.by_occupation,
            Err(StatsError::InsufficientObservations {
                group: "Not Mentioned".to_string(),
                count: 1,
            })
        );
        assert!(matches!(
            report.by_category,
            Err(StatsError::InsufficientObservations { .. })
        ));
    }
}
