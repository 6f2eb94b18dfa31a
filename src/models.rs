use std::fmt;

use serde::{Deserialize, Serialize};

pub const EXTRA_CREDIT: &str = "Extra Credit";

/// Whether a category name is the reserved extra-credit category.
pub fn is_extra_credit(category: &str) -> bool {
    category.eq_ignore_ascii_case(EXTRA_CREDIT)
}

/// A single cell of the uploaded table.
///
/// Numeric cells keep the text they were parsed from, so identifiers such
/// as `00123` render exactly as the file wrote them.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64, String),
    Text(String),
    Missing,
}

impl Value {
    pub fn parse(field: &str) -> Self {
        let trimmed = field.trim();
        if trimmed.is_empty() {
            return Value::Missing;
        }
        match trimmed.parse::<f64>() {
            Ok(number) if number.is_finite() => Value::Number(number, trimmed.to_string()),
            _ => Value::Text(field.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n, _) => Some(*n),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(_, text) => f.write_str(text),
            Value::Text(text) => f.write_str(text),
            Value::Missing => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Long,
    Wide,
    RawOnly,
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Layout::Long => "long",
            Layout::Wide => "wide",
            Layout::RawOnly => "raw-only",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LetterGrade {
    A,
    #[serde(rename = "B+")]
    BPlus,
    B,
    #[serde(rename = "C+")]
    CPlus,
    C,
    F,
}

impl LetterGrade {
    /// Letters in the order bands are evaluated.
    pub const PRIORITY: [LetterGrade; 6] = [
        LetterGrade::A,
        LetterGrade::BPlus,
        LetterGrade::B,
        LetterGrade::CPlus,
        LetterGrade::C,
        LetterGrade::F,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LetterGrade::A => "A",
            LetterGrade::BPlus => "B+",
            LetterGrade::B => "B",
            LetterGrade::CPlus => "C+",
            LetterGrade::C => "C",
            LetterGrade::F => "F",
        }
    }
}

impl fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryDetail {
    pub category: String,
    pub raw: Option<f64>,
    pub maximum: Option<f64>,
    pub weight: f64,
    /// Rounded to 2 decimals.
    pub points: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateResult {
    pub name: String,
    pub net_id: Option<String>,
    /// Includes extra credit only when the operator opted in.
    pub points_achieved: f64,
    pub extra_credit: f64,
    pub total_possible_points: f64,
    pub overall_percent: f64,
    pub letter_grade: Option<LetterGrade>,
    pub details: Vec<CategoryDetail>,
}
