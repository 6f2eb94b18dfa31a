use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::detect::Detection;
use crate::error::{GradeError, Result};
use crate::models::Layout;
use crate::registry::{SessionConfig, ADDED_CATEGORY_WEIGHT, DEFAULT_MAXIMUM, FILE_CATEGORY_WEIGHT};
use crate::score::Grading;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedCategory {
    pub name: String,
    #[serde(default = "added_weight")]
    pub weight: f64,
}

fn added_weight() -> f64 {
    ADDED_CATEGORY_WEIGHT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingSettings {
    #[serde(default = "enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub grading: Grading,
}

fn enabled() -> bool {
    true
}

/// Everything an operator can set before a computation pass, as read from
/// a JSON settings file and then adjusted by command-line flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorSettings {
    pub added_categories: Vec<AddedCategory>,
    pub active: Option<Vec<String>>,
    pub weights: BTreeMap<String, f64>,
    pub maximums: BTreeMap<String, f64>,
    pub include_extra_credit: bool,
    pub long_record_maximum: bool,
    pub strict: bool,
    pub grading: Option<GradingSettings>,
}

impl OperatorSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// A starting point for a freshly uploaded file: every file category at
    /// its default weight, and a fixed maximum unless a wide file carries
    /// `<category>_maximum`.
    pub fn template(detection: &Detection) -> Self {
        let weights = detection
            .file_categories
            .iter()
            .map(|category| (category.clone(), FILE_CATEGORY_WEIGHT))
            .collect();
        let maximums = detection
            .file_categories
            .iter()
            .filter(|category| {
                detection.layout != Layout::Wide || !detection.has_record_maximum(category)
            })
            .map(|category| (category.clone(), DEFAULT_MAXIMUM))
            .collect();
        Self {
            weights,
            maximums,
            grading: Some(GradingSettings {
                enabled: false,
                grading: Grading::default(),
            }),
            ..Self::default()
        }
    }

    /// Resets `session` for the file behind `detection` and applies these
    /// settings, returning the rejected edits.
    ///
    /// Rejected edits leave the session as it was; they are reported, not
    /// fatal.
    pub fn build_session(&self, session: &mut SessionConfig, detection: &Detection) -> Vec<GradeError> {
        session.reset(detection.file_categories.clone());
        self.apply(session)
    }

    pub fn apply(&self, session: &mut SessionConfig) -> Vec<GradeError> {
        let mut rejected = Vec::new();

        for added in &self.added_categories {
            if let Err(err) = session.add_category(&added.name, added.weight) {
                rejected.push(err);
            }
        }
        if let Some(active) = &self.active {
            if let Err(err) = session.set_active(active.as_slice()) {
                rejected.push(err);
            }
        }
        for (category, weight) in &self.weights {
            if let Err(err) = session.set_weight(category, *weight) {
                rejected.push(err);
            }
        }
        for (category, maximum) in &self.maximums {
            if let Err(err) = session.set_maximum(category, *maximum) {
                rejected.push(err);
            }
        }

        session.include_extra_credit = self.include_extra_credit;
        session.long_record_maximum = self.long_record_maximum;
        session.grading = self
            .grading
            .as_ref()
            .filter(|settings| settings.enabled)
            .map(|settings| settings.grading.clone());

        for err in &rejected {
            warn!(error = %err, "rejected settings edit");
        }
        rejected
    }
}

/// Parses a `NAME=VALUE` flag.
pub fn parse_override(input: &str) -> Result<(String, f64)> {
    let invalid = || GradeError::InvalidOverride {
        input: input.to_string(),
    };
    let (name, value) = input.rsplit_once('=').ok_or_else(invalid)?;
    let value = value.trim().parse::<f64>().map_err(|_| invalid())?;
    Ok((name.trim().to_string(), value))
}

/// Parses a `NAME[=WEIGHT]` flag for a new category.
pub fn parse_added(input: &str) -> Result<AddedCategory> {
    if input.contains('=') {
        let (name, weight) = parse_override(input)?;
        Ok(AddedCategory { name, weight })
    } else {
        Ok(AddedCategory {
            name: input.trim().to_string(),
            weight: ADDED_CATEGORY_WEIGHT,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LetterGrade;
    use crate::score::GradingBasis;
    use crate::table::RawTable;

    fn detection(csv: &str) -> Detection {
        let table = RawTable::from_reader(csv.as_bytes()).unwrap();
        Detection::analyze(&table, "Name", false).unwrap()
    }

    #[test]
    fn parses_settings_file_with_defaults() {
        let json = r#"{
            "added_categories": [{"name": "Participation"}],
            "weights": {"HW": 40},
            "grading": {"basis": "points", "bands": {"A": [90, 100], "B+": [80, 89.99]}}
        }"#;
        let settings: OperatorSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.added_categories[0].weight, ADDED_CATEGORY_WEIGHT);
        assert!(!settings.include_extra_credit);
        let grading = settings.grading.unwrap();
        assert!(grading.enabled);
        assert_eq!(grading.grading.basis, GradingBasis::Points);
        assert_eq!(
            grading.grading.bands.get(&LetterGrade::BPlus),
            Some(&(80.0, 89.99))
        );
    }

    #[test]
    fn apply_reports_rejected_edits() {
        let detection = detection("Name,HW_raw\nAnn,1\n");
        let settings = OperatorSettings {
            added_categories: vec![
                AddedCategory {
                    name: "HW".to_string(),
                    weight: 40.0,
                },
                AddedCategory {
                    name: "Lab".to_string(),
                    weight: 15.0,
                },
            ],
            weights: BTreeMap::from([("HW".to_string(), 30.0), ("Nope".to_string(), 1.0)]),
            ..OperatorSettings::default()
        };
        let mut session = SessionConfig::default();
        let rejected = settings.build_session(&mut session, &detection);
        assert_eq!(rejected.len(), 2);
        assert!(rejected.iter().all(|err| !err.is_fatal()));
        assert_eq!(session.weight("HW"), 30.0);
        assert_eq!(session.weight("Lab"), 15.0);
        assert_eq!(session.active_categories(), vec!["HW", "Lab"]);
    }

    #[test]
    fn non_finite_maximum_flag_is_rejected_not_applied() {
        let detection = detection("Name,HW_raw\nAnn,1\n");
        let (category, maximum) = parse_override("HW=NaN").unwrap();
        let settings = OperatorSettings {
            maximums: BTreeMap::from([(category, maximum), ("Quiz".to_string(), -1.0)]),
            ..OperatorSettings::default()
        };
        let mut session = SessionConfig::default();
        let rejected = settings.build_session(&mut session, &detection);
        assert!(rejected
            .iter()
            .any(|err| matches!(err, GradeError::InvalidMaximum { .. })));
        assert_eq!(session.config("HW").maximum, None);
    }

    #[test]
    fn disabled_grading_is_not_applied() {
        let detection = detection("Name,HW_raw\nAnn,1\n");
        let settings = OperatorSettings::template(&detection);
        let mut session = SessionConfig::default();
        let rejected = settings.build_session(&mut session, &detection);
        assert!(rejected.is_empty());
        assert!(session.grading.is_none());
    }

    #[test]
    fn template_only_fixes_maximums_the_file_lacks() {
        let detection = detection("Name,HW_raw,HW_maximum,Quiz_raw\nAnn,1,2,3\n");
        let settings = OperatorSettings::template(&detection);
        assert_eq!(settings.weights.len(), 2);
        assert_eq!(
            settings.maximums,
            BTreeMap::from([("Quiz".to_string(), DEFAULT_MAXIMUM)])
        );
    }

    #[test]
    fn round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let detection = detection("Name,HW_raw\nAnn,1\n");
        let settings = OperatorSettings::template(&detection);
        settings.save(&path).unwrap();
        assert_eq!(OperatorSettings::load(&path).unwrap(), settings);
    }

    #[test]
    fn parses_override_flags() {
        assert_eq!(
            parse_override("Midterm I=90").unwrap(),
            ("Midterm I".to_string(), 90.0)
        );
        assert!(parse_override("HW").is_err());
        assert!(parse_override("HW=abc").is_err());
        assert_eq!(parse_added("Lab").unwrap().weight, ADDED_CATEGORY_WEIGHT);
        assert_eq!(parse_added("Lab=12").unwrap().weight, 12.0);
    }
}
