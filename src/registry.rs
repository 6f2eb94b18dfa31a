use std::collections::HashMap;

use tracing::debug;

use crate::detect::Detection;
use crate::error::{GradeError, Result};
use crate::models::{is_extra_credit, Layout};
use crate::score::Grading;

pub const FILE_CATEGORY_WEIGHT: f64 = 0.0;
pub const ADDED_CATEGORY_WEIGHT: f64 = 40.0;
pub const DEFAULT_MAXIMUM: f64 = 100.0;

/// Where a category's maximum score comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaximumSource {
    FixedValue(f64),
    /// Read per record from the column at this index.
    FromRecordField(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryConfig {
    pub weight: f64,
    /// Operator-supplied fixed maximum, if any.
    pub maximum: Option<f64>,
}

/// Operator state for one loaded file: categories, weights, maximums and
/// display toggles. Survives every recomputation until the file changes.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    file_categories: Vec<String>,
    added_categories: Vec<String>,
    active: Option<Vec<String>>,
    configs: HashMap<String, CategoryConfig>,
    pub include_extra_credit: bool,
    /// Read the `maximum` column of long tables instead of fixed values.
    pub long_record_maximum: bool,
    pub grading: Option<Grading>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl SessionConfig {
    pub fn new(file_categories: Vec<String>) -> Self {
        Self {
            file_categories,
            added_categories: Vec::new(),
            active: None,
            configs: HashMap::new(),
            include_extra_credit: false,
            long_record_maximum: false,
            grading: None,
        }
    }

    /// Discards all operator edits; called whenever a new file is loaded.
    pub fn reset(&mut self, file_categories: Vec<String>) {
        *self = Self::new(file_categories);
    }

    fn is_file_category(&self, name: &str) -> bool {
        self.file_categories.iter().any(|c| c == name)
    }

    fn is_known(&self, name: &str) -> bool {
        self.is_file_category(name) || self.added_categories.iter().any(|c| c == name)
    }

    pub fn add_category(&mut self, name: &str, default_weight: f64) -> Result<()> {
        if name.is_empty() {
            return Err(GradeError::EmptyCategoryName);
        }
        if self.is_known(name) {
            return Err(GradeError::DuplicateCategory {
                name: name.to_string(),
            });
        }
        check_weight(name, default_weight)?;

        self.added_categories.push(name.to_string());
        self.configs.insert(
            name.to_string(),
            CategoryConfig {
                weight: default_weight,
                maximum: None,
            },
        );
        if let Some(active) = self.active.as_mut() {
            active.push(name.to_string());
        }
        debug!(category = name, weight = default_weight, "added category");
        Ok(())
    }

    /// File categories in detected order, then added ones in insertion order.
    pub fn all_categories(&self) -> impl Iterator<Item = &str> + '_ {
        self.file_categories
            .iter()
            .chain(self.added_categories.iter())
            .map(String::as_str)
    }

    pub fn set_active<S: AsRef<str>>(&mut self, subset: &[S]) -> Result<()> {
        if let Some(unknown) = subset.iter().find(|name| !self.is_known(name.as_ref())) {
            return Err(GradeError::UnknownCategory {
                name: unknown.as_ref().to_string(),
            });
        }
        let active: Vec<String> = self
            .all_categories()
            .filter(|category| subset.iter().any(|name| name.as_ref() == *category))
            .map(str::to_string)
            .collect();
        for category in &active {
            self.config_mut(category);
        }
        self.active = Some(active);
        Ok(())
    }

    pub fn active_categories(&self) -> Vec<&str> {
        match &self.active {
            Some(active) => active.iter().map(String::as_str).collect(),
            None => self.all_categories().collect(),
        }
    }

    fn default_config(&self, category: &str) -> CategoryConfig {
        let weight = if self.is_file_category(category) {
            FILE_CATEGORY_WEIGHT
        } else {
            ADDED_CATEGORY_WEIGHT
        };
        CategoryConfig {
            weight,
            maximum: None,
        }
    }

    fn config_mut(&mut self, category: &str) -> &mut CategoryConfig {
        let default = self.default_config(category);
        self.configs
            .entry(category.to_string())
            .or_insert(default)
    }

    pub fn config(&self, category: &str) -> CategoryConfig {
        self.configs
            .get(category)
            .cloned()
            .unwrap_or_else(|| self.default_config(category))
    }

    pub fn weight(&self, category: &str) -> f64 {
        self.config(category).weight
    }

    pub fn set_weight(&mut self, category: &str, weight: f64) -> Result<()> {
        self.require_known(category)?;
        check_weight(category, weight)?;
        self.config_mut(category).weight = weight;
        Ok(())
    }

    pub fn set_maximum(&mut self, category: &str, maximum: f64) -> Result<()> {
        self.require_known(category)?;
        check_maximum(category, maximum)?;
        self.config_mut(category).maximum = Some(maximum);
        Ok(())
    }

    fn require_known(&self, category: &str) -> Result<()> {
        if self.is_known(category) {
            Ok(())
        } else {
            Err(GradeError::UnknownCategory {
                name: category.to_string(),
            })
        }
    }

    /// Resolves the maximum for `category` against the loaded file.
    ///
    /// An explicit fixed maximum always wins. Otherwise wide tables read
    /// `<category>_maximum` when present, long tables read the `maximum`
    /// column only when `long_record_maximum` is set, and everything else
    /// falls back to a fixed 100.
    pub fn maximum_source(&self, category: &str, detection: &Detection) -> MaximumSource {
        if let Some(maximum) = self.config(category).maximum {
            return MaximumSource::FixedValue(maximum);
        }
        let record_field = match detection.layout {
            Layout::Wide => detection
                .fields_for(category)
                .and_then(|fields| fields.maximum),
            Layout::Long if self.long_record_maximum => detection.roles.maximum,
            _ => None,
        };
        match record_field {
            Some(column) => MaximumSource::FromRecordField(column),
            None => MaximumSource::FixedValue(DEFAULT_MAXIMUM),
        }
    }

    /// Grading denominator: active weights, extra credit excluded.
    pub fn total_possible_points(&self) -> f64 {
        self.active_categories()
            .into_iter()
            .filter(|category| !is_extra_credit(category))
            .map(|category| self.weight(category))
            .sum()
    }
}

fn check_weight(category: &str, weight: f64) -> Result<()> {
    if weight.is_finite() && weight >= 0.0 {
        Ok(())
    } else {
        Err(GradeError::InvalidWeight {
            category: category.to_string(),
            value: weight,
        })
    }
}

fn check_maximum(category: &str, maximum: f64) -> Result<()> {
    if maximum.is_finite() && maximum >= 0.0 {
        Ok(())
    } else {
        Err(GradeError::InvalidMaximum {
            category: category.to_string(),
            value: maximum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::RawTable;

    fn session() -> SessionConfig {
        SessionConfig::new(vec!["HW".to_string(), "Quiz".to_string()])
    }

    #[test]
    fn defaults_follow_category_origin() {
        let mut session = session();
        session.add_category("Project", ADDED_CATEGORY_WEIGHT).unwrap();
        assert_eq!(session.weight("HW"), 0.0);
        assert_eq!(session.weight("Project"), 40.0);
    }

    #[test]
    fn add_category_rejects_empty_and_duplicates() {
        let mut session = session();
        assert!(matches!(
            session.add_category("", 40.0),
            Err(GradeError::EmptyCategoryName)
        ));
        assert!(matches!(
            session.add_category("HW", 40.0),
            Err(GradeError::DuplicateCategory { .. })
        ));
        session.add_category("Lab", 10.0).unwrap();
        assert!(session.add_category("Lab", 10.0).is_err());
        // Case-sensitive: a differently cased name is a new category.
        session.add_category("hw", 5.0).unwrap();
        assert_eq!(
            session.all_categories().collect::<Vec<_>>(),
            vec!["HW", "Quiz", "Lab", "hw"]
        );
    }

    #[test]
    fn active_set_preserves_display_order() {
        let mut session = session();
        session.add_category("Lab", 10.0).unwrap();
        session.set_active(&["Lab", "HW"]).unwrap();
        assert_eq!(session.active_categories(), vec!["HW", "Lab"]);
        assert!(session.set_active(&["Nope"]).is_err());
        assert_eq!(session.active_categories(), vec!["HW", "Lab"]);
    }

    #[test]
    fn weights_are_remembered_across_active_changes() {
        let mut session = session();
        session.set_weight("HW", 55.0).unwrap();
        session.set_active(&["Quiz"]).unwrap();
        session.set_active(&["HW", "Quiz"]).unwrap();
        assert_eq!(session.weight("HW"), 55.0);
        assert!(session.set_weight("HW", -1.0).is_err());
        assert_eq!(session.weight("HW"), 55.0);
    }

    #[test]
    fn non_finite_or_negative_maximums_are_rejected() {
        let mut session = session();
        session.set_maximum("HW", 10.0).unwrap();
        for bad in [f64::NAN, f64::INFINITY, -5.0] {
            let err = session.set_maximum("HW", bad).unwrap_err();
            assert!(matches!(err, GradeError::InvalidMaximum { .. }));
            assert!(!err.is_fatal());
        }
        assert_eq!(session.config("HW").maximum, Some(10.0));
        // Zero stays allowed; it scores 0 points.
        session.set_maximum("Quiz", 0.0).unwrap();
    }

    #[test]
    fn reset_discards_edits() {
        let mut session = session();
        session.set_weight("HW", 55.0).unwrap();
        session.add_category("Lab", 10.0).unwrap();
        session.reset(vec!["Final".to_string()]);
        assert_eq!(session.all_categories().collect::<Vec<_>>(), vec!["Final"]);
        assert_eq!(session.weight("HW"), ADDED_CATEGORY_WEIGHT);
        assert_eq!(session.active_categories(), vec!["Final"]);
    }

    #[test]
    fn denominator_excludes_extra_credit() {
        let mut session =
            SessionConfig::new(vec!["HW".to_string(), "extra credit".to_string()]);
        session.set_weight("HW", 60.0).unwrap();
        session.set_weight("extra credit", 20.0).unwrap();
        assert_eq!(session.total_possible_points(), 60.0);
    }

    #[test]
    fn maximum_source_per_layout() {
        let wide = RawTable::from_reader("Name,HW_raw,HW_maximum,Quiz_raw\nAnn,9,10,1\n".as_bytes())
            .unwrap();
        let detection = Detection::analyze(&wide, "Name", false).unwrap();
        let mut session = SessionConfig::new(detection.file_categories.clone());
        assert_eq!(
            session.maximum_source("HW", &detection),
            MaximumSource::FromRecordField(2)
        );
        assert_eq!(
            session.maximum_source("Quiz", &detection),
            MaximumSource::FixedValue(DEFAULT_MAXIMUM)
        );
        session.set_maximum("HW", 20.0).unwrap();
        assert_eq!(
            session.maximum_source("HW", &detection),
            MaximumSource::FixedValue(20.0)
        );

        let long =
            RawTable::from_reader("Name,Category,raw,maximum\nAnn,HW,8,10\n".as_bytes()).unwrap();
        let detection = Detection::analyze(&long, "Name", false).unwrap();
        let mut session = SessionConfig::new(detection.file_categories.clone());
        assert_eq!(
            session.maximum_source("HW", &detection),
            MaximumSource::FixedValue(DEFAULT_MAXIMUM)
        );
        session.long_record_maximum = true;
        assert_eq!(
            session.maximum_source("HW", &detection),
            MaximumSource::FromRecordField(3)
        );
    }
}
