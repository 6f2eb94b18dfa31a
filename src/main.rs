use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};

mod detect;
mod error;
mod logging;
mod models;
mod registry;
mod report;
mod score;
mod settings;
mod table;

use detect::Detection;
use error::GradeError;
use models::{AggregateResult, Layout};
use registry::SessionConfig;
use settings::{AddedCategory, GradingSettings, OperatorSettings};
use table::RawTable;

#[derive(Parser)]
#[command(name = "grade-calculator")]
#[command(about = "Weighted grade calculator for gradebook CSV files", long_about = None)]
struct Cli {
    /// Log pipeline decisions to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Input {
    /// Grades file (long, wide or raw-only CSV)
    #[arg(long)]
    csv: PathBuf,
    /// Column holding student names
    #[arg(long, default_value = detect::NAME_COLUMN)]
    name_column: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum Basis {
    Percent,
    Points,
}

impl From<Basis> for score::GradingBasis {
    fn from(basis: Basis) -> Self {
        match basis {
            Basis::Percent => score::GradingBasis::Percent,
            Basis::Points => score::GradingBasis::Points,
        }
    }
}

#[derive(Args)]
struct Scoring {
    /// JSON settings file with weights, maximums and grade bands
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Add a category that is not in the file
    #[arg(long = "add", value_name = "NAME[=WEIGHT]", value_parser = settings::parse_added)]
    added: Vec<AddedCategory>,
    /// Restrict scoring to these categories
    #[arg(long = "active", value_name = "NAME")]
    active: Vec<String>,
    #[arg(long = "weight", value_name = "NAME=VALUE", value_parser = settings::parse_override)]
    weights: Vec<(String, f64)>,
    /// Fixed maximum score for a category
    #[arg(long = "max", value_name = "NAME=VALUE", value_parser = settings::parse_override)]
    maximums: Vec<(String, f64)>,
    /// Add extra credit into the reported points achieved
    #[arg(long)]
    include_extra_credit: bool,
    /// Read per-row maximums from a long file's `maximum` column
    #[arg(long)]
    long_record_maximum: bool,
    /// Reject files that are neither long nor wide
    #[arg(long)]
    strict: bool,
    /// Assign letter grades
    #[arg(long)]
    grades: bool,
    #[arg(long, value_enum)]
    grade_basis: Option<Basis>,
}

impl Scoring {
    fn operator_settings(&self) -> anyhow::Result<OperatorSettings> {
        let mut settings = match &self.settings {
            Some(path) => OperatorSettings::load(path)
                .with_context(|| format!("failed to read settings from {}", path.display()))?,
            None => OperatorSettings::default(),
        };

        settings.added_categories.extend(self.added.iter().cloned());
        if !self.active.is_empty() {
            settings.active = Some(self.active.clone());
        }
        settings.weights.extend(self.weights.iter().cloned());
        settings.maximums.extend(self.maximums.iter().cloned());
        settings.include_extra_credit |= self.include_extra_credit;
        settings.long_record_maximum |= self.long_record_maximum;
        settings.strict |= self.strict;

        if self.grades || self.grade_basis.is_some() {
            let grading = settings.grading.get_or_insert_with(|| GradingSettings {
                enabled: true,
                grading: score::Grading::default(),
            });
            grading.enabled = true;
            if let Some(basis) = self.grade_basis {
                grading.grading.basis = basis.into();
            }
        }
        Ok(settings)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show the detected layout and categories of a file
    Detect {
        #[command(flatten)]
        input: Input,
    },
    /// Write a settings template for a file
    InitSettings {
        #[command(flatten)]
        input: Input,
        #[arg(long, default_value = "settings.json")]
        out: PathBuf,
    },
    /// Compute weighted totals per student
    Compute {
        #[command(flatten)]
        input: Input,
        #[command(flatten)]
        scoring: Scoring,
        /// Print each student's category breakdown
        #[arg(long)]
        details: bool,
        /// List students whose name contains this first
        #[arg(long)]
        search: Option<String>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export results as CSV
    #[command(group(
        ArgGroup::new("scope")
            .args(["student", "summary"])
            .multiple(false)
    ))]
    Export {
        #[command(flatten)]
        input: Input,
        #[command(flatten)]
        scoring: Scoring,
        /// Export a single student's breakdown
        #[arg(long)]
        student: Option<String>,
        /// Export the summary table instead of breakdowns
        #[arg(long)]
        summary: bool,
        #[arg(long, default_value = "grades_export.csv")]
        out: PathBuf,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        input: Input,
        #[command(flatten)]
        scoring: Scoring,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn load_table(input: &Input) -> anyhow::Result<RawTable> {
    RawTable::from_path(&input.csv)
        .with_context(|| format!("failed to read grades from {}", input.csv.display()))
}

/// Runs detection and aggregation once over the uploaded file.
fn compute(input: &Input, scoring: &Scoring) -> anyhow::Result<(Detection, Vec<AggregateResult>)> {
    let settings = scoring.operator_settings()?;
    let table = load_table(input)?;
    let detection = Detection::analyze(&table, &input.name_column, settings.strict)?;

    // Rejected edits are already logged as warnings; only fatal ones stop the pass.
    let mut session = SessionConfig::default();
    if let Some(err) = settings
        .build_session(&mut session, &detection)
        .into_iter()
        .find(GradeError::is_fatal)
    {
        return Err(err.into());
    }

    let results = score::aggregate(&table, &detection, &session);
    Ok((detection, results))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Commands::Detect { input } => {
            let table = load_table(&input)?;
            let detection = Detection::analyze(&table, &input.name_column, false)?;
            println!("Layout: {}", detection.layout);
            println!("Name column: {}", table.headers[detection.roles.name]);
            if let Some(idx) = detection.roles.net_id {
                println!("NetID column: {}", table.headers[idx]);
            }
            println!("Students: {}", table.rows.len());
            if detection.layout == Layout::Long {
                if let Some(idx) = detection.roles.maximum {
                    println!(
                        "Per-row maximum column: {} (used with --long-record-maximum)",
                        table.headers[idx]
                    );
                }
            }
            println!("Categories:");
            for category in &detection.file_categories {
                let maximum = if detection.layout == Layout::Wide
                    && detection.has_record_maximum(category)
                {
                    "maximum from file"
                } else {
                    "fixed maximum"
                };
                println!("- {category} ({maximum})");
            }
        }
        Commands::InitSettings { input, out } => {
            let table = load_table(&input)?;
            let detection = Detection::analyze(&table, &input.name_column, false)?;
            OperatorSettings::template(&detection).save(&out)?;
            println!(
                "Settings for {} categories written to {}.",
                detection.file_categories.len(),
                out.display()
            );
        }
        Commands::Compute {
            input,
            scoring,
            details,
            search,
            json,
        } => {
            let (_, mut results) = compute(&input, &scoring)?;
            if let Some(term) = search.as_deref() {
                results = score::partition_by_search(results, term);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
                return Ok(());
            }
            if results.is_empty() {
                println!("No students found in this file.");
                return Ok(());
            }

            print!("{}", report::summary_table(&results));
            if details {
                for result in &results {
                    println!();
                    print!("{}", report::student_breakdown(result));
                }
            }
        }
        Commands::Export {
            input,
            scoring,
            student,
            summary,
            out,
        } => {
            let (_, results) = compute(&input, &scoring)?;
            let selected = match student.as_deref() {
                Some(name) => match results.iter().find(|result| result.name == name) {
                    Some(result) => Some(result),
                    None => bail!("no student named `{name}` in {}", input.csv.display()),
                },
                None => None,
            };
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;

            if let Some(result) = selected {
                report::write_student_details(result, file)?;
                let name = &result.name;
                println!("Breakdown for {name} written to {}.", out.display());
            } else if summary {
                report::write_summary(&results, file)?;
                println!("Summary for {} students written to {}.", results.len(), out.display());
            } else {
                report::write_all_details(&results, file)?;
                println!("Breakdowns for {} students written to {}.", results.len(), out.display());
            }
        }
        Commands::Report {
            input,
            scoring,
            out,
        } => {
            let (detection, results) = compute(&input, &scoring)?;
            let source = input.csv.display().to_string();
            let report = report::build_report(
                &source,
                detection.layout,
                chrono::Local::now().date_naive(),
                &results,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
