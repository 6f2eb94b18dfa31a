use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::detect::Detection;
use crate::models::{is_extra_credit, AggregateResult, CategoryDetail, Layout, LetterGrade, Value};
use crate::registry::{MaximumSource, SessionConfig};
use crate::table::RawTable;

/// Points earned in one category: `raw / maximum * weight`, or 0 when the
/// maximum is zero or either score is missing.
pub fn weighted_score(raw: Option<f64>, maximum: Option<f64>, weight: f64) -> f64 {
    match (raw, maximum) {
        (Some(raw), Some(maximum)) if maximum != 0.0 => raw / maximum * weight,
        _ => 0.0,
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradingBasis {
    #[default]
    Percent,
    Points,
}

/// Letter-grade bands, inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grading {
    #[serde(default)]
    pub basis: GradingBasis,
    #[serde(default = "default_bands")]
    pub bands: BTreeMap<LetterGrade, (f64, f64)>,
}

impl Default for Grading {
    fn default() -> Self {
        Self {
            basis: GradingBasis::Percent,
            bands: default_bands(),
        }
    }
}

fn default_bands() -> BTreeMap<LetterGrade, (f64, f64)> {
    BTreeMap::from([
        (LetterGrade::A, (90.0, 100.0)),
        (LetterGrade::BPlus, (85.0, 89.99)),
        (LetterGrade::B, (80.0, 84.99)),
        (LetterGrade::CPlus, (75.0, 79.99)),
        (LetterGrade::C, (70.0, 74.99)),
        (LetterGrade::F, (0.0, 69.99)),
    ])
}

impl Grading {
    /// First letter, in `A, B+, B, C+, C, F` order, whose band holds `value`.
    pub fn assign(&self, value: f64) -> Option<LetterGrade> {
        LetterGrade::PRIORITY.into_iter().find(|letter| {
            self.bands
                .get(letter)
                .is_some_and(|&(min, max)| value >= min && value <= max)
        })
    }
}

struct ResolvedCategory<'a> {
    name: &'a str,
    weight: f64,
    maximum: MaximumSource,
    extra_credit: bool,
}

#[derive(Default)]
struct Tally {
    core: f64,
    extra_credit: f64,
    details: Vec<CategoryDetail>,
}

impl Tally {
    fn record(&mut self, category: &ResolvedCategory<'_>, row: &[Value], raw: &Value) {
        let raw = raw.as_number();
        let maximum = match category.maximum {
            MaximumSource::FixedValue(value) => Some(value),
            MaximumSource::FromRecordField(column) => row[column].as_number(),
        };
        let points = weighted_score(raw, maximum, category.weight);
        if category.extra_credit {
            self.extra_credit += points;
        } else {
            self.core += points;
        }
        self.details.push(CategoryDetail {
            category: category.name.to_string(),
            raw,
            maximum,
            weight: category.weight,
            points: round2(points),
        });
    }
}

/// Folds the table into one result per student for the current session.
pub fn aggregate(
    table: &RawTable,
    detection: &Detection,
    session: &SessionConfig,
) -> Vec<AggregateResult> {
    let categories: Vec<ResolvedCategory<'_>> = session
        .active_categories()
        .into_iter()
        .map(|name| ResolvedCategory {
            name,
            weight: session.weight(name),
            maximum: session.maximum_source(name, detection),
            extra_credit: is_extra_credit(name),
        })
        .collect();
    for category in &categories {
        debug!(
            category = category.name,
            weight = category.weight,
            maximum = ?category.maximum,
            "resolved category"
        );
    }

    let total_possible_points = session.total_possible_points();
    let roles = &detection.roles;

    let students: Vec<(String, Option<String>, Tally)> = match detection.layout {
        Layout::Long => {
            let mut groups: BTreeMap<String, Vec<&Vec<Value>>> = BTreeMap::new();
            for row in &table.rows {
                groups.entry(row[roles.name].to_string()).or_default().push(row);
            }

            groups
                .into_iter()
                .map(|(name, rows)| {
                    let net_id = roles.net_id.and_then(|idx| {
                        rows.iter()
                            .map(|row| &row[idx])
                            .find(|value| !value.is_missing())
                            .map(Value::to_string)
                    });
                    let mut tally = Tally::default();
                    if let (Some(category_col), Some(raw_col)) = (roles.category, roles.raw) {
                        for category in &categories {
                            for row in rows
                                .iter()
                                .filter(|row| row[category_col].to_string() == category.name)
                            {
                                tally.record(category, row, &row[raw_col]);
                            }
                        }
                    }
                    (name, net_id, tally)
                })
                .collect()
        }
        Layout::Wide | Layout::RawOnly => table
            .rows
            .iter()
            .map(|row| {
                let name = row[roles.name].to_string();
                let net_id = roles
                    .net_id
                    .map(|idx| &row[idx])
                    .filter(|value| !value.is_missing())
                    .map(Value::to_string);
                let mut tally = Tally::default();
                for category in &categories {
                    if let Some(fields) = detection.fields_for(category.name) {
                        tally.record(category, row, &row[fields.raw]);
                    }
                }
                (name, net_id, tally)
            })
            .collect(),
    };

    students
        .into_iter()
        .map(|(name, net_id, tally)| {
            let overall_percent = if total_possible_points != 0.0 {
                tally.core / total_possible_points * 100.0
            } else {
                0.0
            };
            let points_achieved = if session.include_extra_credit {
                tally.core + tally.extra_credit
            } else {
                tally.core
            };
            let letter_grade = session.grading.as_ref().and_then(|grading| {
                grading.assign(match grading.basis {
                    GradingBasis::Percent => overall_percent,
                    GradingBasis::Points => points_achieved,
                })
            });

            AggregateResult {
                name,
                net_id,
                points_achieved,
                extra_credit: tally.extra_credit,
                total_possible_points,
                overall_percent,
                letter_grade,
                details: tally.details,
            }
        })
        .collect()
}

/// Moves students whose name contains `term` (case-insensitive) to the
/// front, keeping relative order within both groups.
pub fn partition_by_search(results: Vec<AggregateResult>, term: &str) -> Vec<AggregateResult> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return results;
    }
    let (mut matches, rest): (Vec<_>, Vec<_>) = results
        .into_iter()
        .partition(|result| result.name.to_lowercase().contains(&term));
    matches.extend(rest);
    matches
}
