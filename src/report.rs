use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::Result;
use crate::models::{AggregateResult, CategoryDetail, Layout, LetterGrade};
use crate::score::round2;

fn fixed2(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.2}")).unwrap_or_default()
}

pub fn format_percent(percent: f64) -> String {
    format!("{percent:.2}%")
}

/// One line per student; the category breakdown is left out.
pub fn summary_table(results: &[AggregateResult]) -> String {
    let show_net_id = results.iter().any(|r| r.net_id.is_some());
    let show_grade = results.iter().any(|r| r.letter_grade.is_some());

    let mut header = vec!["Name"];
    if show_net_id {
        header.push("NetID");
    }
    header.extend(["Points Achieved", "Extra Credit", "Total Possible", "Overall %"]);
    if show_grade {
        header.push("Grade");
    }

    let rows: Vec<Vec<String>> = results
        .iter()
        .map(|result| {
            let mut row = vec![result.name.clone()];
            if show_net_id {
                row.push(result.net_id.clone().unwrap_or_default());
            }
            row.push(format!("{:.2}", result.points_achieved));
            row.push(format!("{:.2}", result.extra_credit));
            row.push(format!("{:.2}", result.total_possible_points));
            row.push(format_percent(result.overall_percent));
            if show_grade {
                row.push(
                    result
                        .letter_grade
                        .map(|grade| grade.to_string())
                        .unwrap_or_default(),
                );
            }
            row
        })
        .collect();

    render_columns(&header, &rows)
}

/// The per-student category view, values to 2 decimal places.
pub fn student_breakdown(result: &AggregateResult) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "--- {}'s Breakdown ---", result.name);

    if result.details.is_empty() {
        let _ = writeln!(output, "No detail rows to display.");
        return output;
    }

    let rows: Vec<Vec<String>> = result
        .details
        .iter()
        .map(|detail| {
            vec![
                detail.category.clone(),
                fixed2(detail.raw),
                fixed2(detail.maximum),
                format!("{:.2}", detail.weight),
                format!("{:.2}", detail.points),
            ]
        })
        .collect();
    output.push_str(&render_columns(
        &["Category", "Raw", "Max", "Weight", "Points Earned"],
        &rows,
    ));
    output
}

fn render_columns(header: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }

    let mut output = String::new();
    let line = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };
    let _ = writeln!(output, "{}", line(header.to_vec()));
    for row in rows {
        let _ = writeln!(output, "{}", line(row.iter().map(String::as_str).collect()));
    }
    output
}

#[derive(Serialize)]
struct DetailRow<'a> {
    #[serde(rename = "Category")]
    category: &'a str,
    #[serde(rename = "Raw")]
    raw: Option<f64>,
    #[serde(rename = "Max")]
    max: Option<f64>,
    #[serde(rename = "Weight")]
    weight: f64,
    #[serde(rename = "Points Earned")]
    points: f64,
}

impl<'a> From<&'a CategoryDetail> for DetailRow<'a> {
    fn from(detail: &'a CategoryDetail) -> Self {
        Self {
            category: &detail.category,
            raw: detail.raw,
            max: detail.maximum,
            weight: detail.weight,
            points: detail.points,
        }
    }
}

#[derive(Serialize)]
struct NamedDetailRow<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Category")]
    category: &'a str,
    #[serde(rename = "Raw")]
    raw: Option<f64>,
    #[serde(rename = "Max")]
    max: Option<f64>,
    #[serde(rename = "Weight")]
    weight: f64,
    #[serde(rename = "Points Earned")]
    points: f64,
}

#[derive(Serialize)]
struct SummaryRow<'a> {
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "NetID")]
    net_id: Option<&'a str>,
    #[serde(rename = "Points Achieved")]
    points_achieved: f64,
    #[serde(rename = "Extra Credit")]
    extra_credit: f64,
    #[serde(rename = "Total Possible")]
    total_possible: f64,
    #[serde(rename = "Overall %")]
    overall_percent: f64,
    #[serde(rename = "Grade")]
    grade: Option<&'static str>,
}

/// Every student's detail rows, flattened, with a `Name` column.
pub fn write_all_details<W: Write>(results: &[AggregateResult], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for result in results {
        for detail in &result.details {
            writer.serialize(NamedDetailRow {
                name: &result.name,
                category: &detail.category,
                raw: detail.raw,
                max: detail.maximum,
                weight: detail.weight,
                points: detail.points,
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn write_student_details<W: Write>(result: &AggregateResult, out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for detail in &result.details {
        writer.serialize(DetailRow::from(detail))?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_summary<W: Write>(results: &[AggregateResult], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    for result in results {
        writer.serialize(SummaryRow {
            name: &result.name,
            net_id: result.net_id.as_deref(),
            points_achieved: round2(result.points_achieved),
            extra_credit: round2(result.extra_credit),
            total_possible: round2(result.total_possible_points),
            overall_percent: round2(result.overall_percent),
            grade: result.letter_grade.map(|grade| grade.as_str()),
        })?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategorySummary {
    pub category: String,
    pub students: usize,
    pub avg_points: f64,
}

pub fn summarize_by_category(results: &[AggregateResult]) -> Vec<CategorySummary> {
    // Keyed by first appearance so the report follows display order.
    let mut order: Vec<String> = Vec::new();
    let mut totals: BTreeMap<String, (usize, f64)> = BTreeMap::new();

    for detail in results.iter().flat_map(|result| &result.details) {
        let entry = totals.entry(detail.category.clone()).or_insert_with(|| {
            order.push(detail.category.clone());
            (0, 0.0)
        });
        entry.0 += 1;
        entry.1 += detail.points;
    }

    order
        .into_iter()
        .map(|category| {
            let (students, total) = totals.get(&category).copied().unwrap_or((0, 0.0));
            CategorySummary {
                category,
                students,
                avg_points: if students == 0 {
                    0.0
                } else {
                    total / students as f64
                },
            }
        })
        .collect()
}

pub fn build_report(
    source: &str,
    layout: Layout,
    generated_on: NaiveDate,
    results: &[AggregateResult],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Grade Report");
    let _ = writeln!(
        output,
        "Generated from {} ({} layout) on {}",
        source, layout, generated_on
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Class Summary");

    if results.is_empty() {
        let _ = writeln!(output, "No students found in this file.");
        return output;
    }

    let count = results.len() as f64;
    let mean = results.iter().map(|r| r.overall_percent).sum::<f64>() / count;
    let min = results
        .iter()
        .map(|r| r.overall_percent)
        .fold(f64::INFINITY, f64::min);
    let max = results
        .iter()
        .map(|r| r.overall_percent)
        .fold(f64::NEG_INFINITY, f64::max);
    let _ = writeln!(output, "- Students: {}", results.len());
    let _ = writeln!(output, "- Total possible points: {:.2}", results[0].total_possible_points);
    let _ = writeln!(
        output,
        "- Overall %: mean {}, min {}, max {}",
        format_percent(mean),
        format_percent(min),
        format_percent(max)
    );

    let mut distribution: BTreeMap<LetterGrade, usize> = BTreeMap::new();
    for grade in results.iter().filter_map(|r| r.letter_grade) {
        *distribution.entry(grade).or_default() += 1;
    }
    if !distribution.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Grade Distribution");
        for (grade, students) in &distribution {
            let _ = writeln!(output, "- {grade}: {students}");
        }
        let ungraded = results.iter().filter(|r| r.letter_grade.is_none()).count();
        if ungraded > 0 {
            let _ = writeln!(output, "- no grade: {ungraded}");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Category Averages");
    let categories = summarize_by_category(results);
    if categories.is_empty() {
        let _ = writeln!(output, "No category scores recorded.");
    } else {
        for summary in &categories {
            let _ = writeln!(
                output,
                "- {}: {:.2} points on average across {} students",
                summary.category, summary.avg_points, summary.students
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students");
    for result in results {
        let mut line = format!("- {}", result.name);
        if let Some(net_id) = &result.net_id {
            let _ = write!(line, " ({net_id})");
        }
        let _ = write!(
            line,
            ": {:.2} / {:.2} points ({})",
            result.points_achieved,
            result.total_possible_points,
            format_percent(result.overall_percent)
        );
        if result.extra_credit != 0.0 {
            let _ = write!(line, ", {:.2} extra credit", result.extra_credit);
        }
        if let Some(grade) = result.letter_grade {
            let _ = write!(line, ", grade {grade}");
        }
        let _ = writeln!(output, "{line}");
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(category: &str, raw: Option<f64>, points: f64) -> CategoryDetail {
        CategoryDetail {
            category: category.to_string(),
            raw,
            maximum: Some(10.0),
            weight: 50.0,
            points,
        }
    }

    fn result(name: &str, percent: f64, details: Vec<CategoryDetail>) -> AggregateResult {
        AggregateResult {
            name: name.to_string(),
            net_id: None,
            points_achieved: percent,
            extra_credit: 0.0,
            total_possible_points: 100.0,
            overall_percent: percent,
            letter_grade: None,
            details,
        }
    }

    #[test]
    fn all_students_export_injects_name() {
        let results = vec![
            result("Ann", 45.0, vec![detail("HW", Some(9.0), 45.0)]),
            result("Bob", 0.0, vec![detail("HW", None, 0.0)]),
        ];
        let mut out = Vec::new();
        write_all_details(&results, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Name,Category,Raw,Max,Weight,Points Earned");
        assert_eq!(lines[1], "Ann,HW,9.0,10.0,50.0,45.0");
        assert_eq!(lines[2], "Bob,HW,,10.0,50.0,0.0");
    }

    #[test]
    fn single_student_export_has_no_name_column() {
        let ann = result("Ann", 45.0, vec![detail("HW", Some(9.0), 45.0)]);
        let mut out = Vec::new();
        write_student_details(&ann, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Category,Raw,Max,Weight,Points Earned\n"));
    }

    #[test]
    fn summary_export_includes_grade() {
        let mut ann = result("Ann", 86.0, vec![]);
        ann.letter_grade = Some(LetterGrade::BPlus);
        ann.net_id = Some("ann1".to_string());
        let mut out = Vec::new();
        write_summary(&[ann], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text.lines().nth(1),
            Some("Ann,ann1,86.0,0.0,100.0,86.0,B+")
        );
    }

    #[test]
    fn breakdown_formats_two_decimals() {
        let ann = result("Ann", 45.0, vec![detail("HW", Some(9.0), 45.0)]);
        let text = student_breakdown(&ann);
        assert!(text.contains("9.00"));
        assert!(text.contains("45.00"));

        let empty = result("Bob", 0.0, vec![]);
        assert!(student_breakdown(&empty).contains("No detail rows to display."));
    }

    #[test]
    fn summary_table_shows_percent() {
        let table = summary_table(&[result("Ann", 86.0, vec![])]);
        assert!(table.starts_with("Name"));
        assert!(table.contains("86.00%"));
        assert!(!table.contains("NetID"));
    }

    #[test]
    fn category_summary_averages_points() {
        let results = vec![
            result("Ann", 0.0, vec![detail("Quiz", None, 10.0), detail("HW", None, 40.0)]),
            result("Bob", 0.0, vec![detail("Quiz", None, 20.0)]),
        ];
        let summaries = summarize_by_category(&results);
        assert_eq!(summaries[0].category, "Quiz");
        assert_eq!(summaries[0].students, 2);
        assert!((summaries[0].avg_points - 15.0).abs() < 1e-9);
        assert_eq!(summaries[1].category, "HW");
    }

    #[test]
    fn report_lists_students_and_distribution() {
        let mut ann = result("Ann", 92.0, vec![detail("HW", Some(9.0), 45.0)]);
        ann.letter_grade = Some(LetterGrade::A);
        let bob = result("Bob", 40.0, vec![]);
        let generated = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();
        let report = build_report("grades.csv", Layout::Wide, generated, &[ann, bob]);
        assert!(report.contains("Generated from grades.csv (wide layout) on 2026-02-02"));
        assert!(report.contains("- A: 1"));
        assert!(report.contains("- no grade: 1"));
        assert!(report.contains("- Ann: 92.00 / 100.00 points (92.00%), grade A"));
        assert!(report.contains("mean 66.00%"));
    }

    #[test]
    fn empty_report() {
        let generated = NaiveDate::from_ymd_opt(2026, 2, 2).unwrap();
        let report = build_report("grades.csv", Layout::Long, generated, &[]);
        assert!(report.contains("No students found"));
    }
}
