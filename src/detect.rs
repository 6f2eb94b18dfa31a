use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info};

use crate::error::{GradeError, Result};
use crate::models::Layout;
use crate::table::RawTable;

pub const NAME_COLUMN: &str = "Name";
pub const CATEGORY_COLUMN: &str = "Category";
pub const RAW_COLUMN: &str = "raw";
pub const MAXIMUM_COLUMN: &str = "maximum";
pub const RAW_SUFFIX: &str = "_raw";
pub const MAXIMUM_SUFFIX: &str = "_maximum";

/// Classifies a set of column names into one of the three layouts.
///
/// `name_column` is the operator's chosen student-name column, `Name` by
/// default; it stands in for `Name` in the long-layout triple.
pub fn detect<'a, I>(columns: I, name_column: &str) -> Layout
where
    I: IntoIterator<Item = &'a str>,
{
    let mut has_name = false;
    let mut has_category = false;
    let mut has_raw = false;
    let mut has_raw_suffix = false;

    for column in columns {
        if column == name_column {
            has_name = true;
        }
        match column {
            CATEGORY_COLUMN => has_category = true,
            RAW_COLUMN => has_raw = true,
            _ => {}
        }
        if column.ends_with(RAW_SUFFIX) {
            has_raw_suffix = true;
        }
    }

    if has_name && has_category && has_raw {
        Layout::Long
    } else if has_raw_suffix {
        Layout::Wide
    } else {
        Layout::RawOnly
    }
}

/// Table columns playing a fixed role for the whole pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRoles {
    pub name: usize,
    pub net_id: Option<usize>,
    /// Long layout only.
    pub category: Option<usize>,
    /// Long layout only.
    pub raw: Option<usize>,
    /// Long layout only: per-record maximum, if the file has one.
    pub maximum: Option<usize>,
}

/// Where a wide/raw-only category's scores live in each row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryFields {
    pub raw: usize,
    pub maximum: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Detection {
    pub layout: Layout,
    pub roles: ColumnRoles,
    pub file_categories: Vec<String>,
    pub fields: HashMap<String, CategoryFields>,
}

impl Detection {
    /// Detects the layout of `table` and resolves category columns once.
    ///
    /// In strict mode a table matching neither the long nor the wide shape
    /// is rejected instead of falling back to raw-only.
    pub fn analyze(table: &RawTable, name_column: &str, strict: bool) -> Result<Self> {
        let name = table.require_column(name_column)?;
        let layout = detect(table.headers.iter().map(String::as_str), name_column);
        if strict && layout == Layout::RawOnly {
            return Err(GradeError::UnrecognizedLayout);
        }

        let net_id = table.net_id_index();
        let mut roles = ColumnRoles {
            name,
            net_id,
            category: None,
            raw: None,
            maximum: None,
        };
        let mut fields = HashMap::new();

        let file_categories = match layout {
            Layout::Long => {
                let category = table.column_index(CATEGORY_COLUMN);
                roles.category = category;
                roles.raw = table.column_index(RAW_COLUMN);
                roles.maximum = table.column_index(MAXIMUM_COLUMN);

                let distinct: BTreeSet<String> = category
                    .into_iter()
                    .flat_map(|idx| table.column(idx))
                    .filter(|value| !value.is_missing())
                    .map(|value| value.to_string())
                    .collect();
                distinct.into_iter().collect()
            }
            Layout::Wide => {
                let categories: BTreeSet<String> = table
                    .headers
                    .iter()
                    .filter_map(|header| header.strip_suffix(RAW_SUFFIX))
                    .filter(|category| !category.is_empty())
                    .map(str::to_string)
                    .collect();
                for category in &categories {
                    let raw = table.column_index(&format!("{category}{RAW_SUFFIX}"));
                    let maximum = table.column_index(&format!("{category}{MAXIMUM_SUFFIX}"));
                    if let Some(raw) = raw {
                        fields.insert(category.clone(), CategoryFields { raw, maximum });
                    }
                }
                categories.into_iter().collect()
            }
            Layout::RawOnly => {
                let mut categories = Vec::new();
                for (idx, header) in table.headers.iter().enumerate() {
                    if idx == name || Some(idx) == net_id {
                        continue;
                    }
                    table.warn_non_numeric(idx);
                    fields.insert(
                        header.clone(),
                        CategoryFields {
                            raw: idx,
                            maximum: None,
                        },
                    );
                    categories.push(header.clone());
                }
                categories
            }
        };

        info!(%layout, categories = file_categories.len(), "detected table layout");
        debug!(?file_categories, "file categories");

        Ok(Self {
            layout,
            roles,
            file_categories,
            fields,
        })
    }

    pub fn fields_for(&self, category: &str) -> Option<CategoryFields> {
        self.fields.get(category).copied()
    }

    /// Whether the file itself supplies a maximum for `category`.
    pub fn has_record_maximum(&self, category: &str) -> bool {
        match self.layout {
            Layout::Wide => self
                .fields
                .get(category)
                .is_some_and(|fields| fields.maximum.is_some()),
            Layout::Long => self.roles.maximum.is_some(),
            Layout::RawOnly => false,
        }
    }
}
