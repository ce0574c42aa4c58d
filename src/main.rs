use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::warn;

use opportunity_explorer::config::ExplorerConfig;
use opportunity_explorer::data::export::{export_dataset, export_view};
use opportunity_explorer::data::model::NumericField;
use opportunity_explorer::data::report::render_summary;
use opportunity_explorer::data::stats::{choices, display_rows, format_usd, summarize};
use opportunity_explorer::{
    merge, query, BatchSource, Dataset, DeadlineWindow, Dimension, DuplicatePolicy, FilterSpec,
    QueryContext, Range,
};

#[derive(Debug, Parser)]
#[command(name = "opportunity-explorer")]
#[command(about = "Merge and explore research funding opportunity batches")]
struct Cli {
    /// TOML config file; built-in defaults apply without one.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Merge batch files into one validated CSV.
    Merge(MergeArgs),
    /// Filter a merged CSV and print a summary.
    Query(QueryArgs),
    /// List the selectable values of every categorical filter.
    Choices {
        #[arg(long)]
        input: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DedupArg {
    KeepAll,
    FirstOccurrence,
}

impl From<DedupArg> for DuplicatePolicy {
    fn from(arg: DedupArg) -> Self {
        match arg {
            DedupArg::KeepAll => DuplicatePolicy::KeepAll,
            DedupArg::FirstOccurrence => DuplicatePolicy::FirstOccurrence,
        }
    }
}

#[derive(Debug, Args)]
struct MergeArgs {
    /// Batch files in submission order; overrides the configured list.
    batches: Vec<PathBuf>,

    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long, value_enum)]
    dedup: Option<DedupArg>,

    /// Print the validation report as JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct QueryArgs {
    /// Merged CSV to query.
    #[arg(long)]
    input: PathBuf,

    #[arg(long)]
    country: Option<String>,
    #[arg(long)]
    region: Option<String>,
    #[arg(long = "field")]
    field_of_study: Option<String>,
    #[arg(long)]
    career_stage: Option<String>,
    #[arg(long = "type")]
    opportunity_type: Option<String>,

    #[arg(long)]
    funding_min: Option<f64>,
    #[arg(long)]
    funding_max: Option<f64>,
    #[arg(long)]
    duration_min: Option<f64>,
    #[arg(long)]
    duration_max: Option<f64>,

    /// all, upcoming, past or unknown.
    #[arg(long, default_value = "all")]
    deadline: DeadlineWindow,
    #[arg(long)]
    target_year: Option<i32>,

    /// Write the matching rows to this CSV file.
    #[arg(long)]
    export: Option<PathBuf>,

    /// Rows to print.
    #[arg(long, default_value_t = 20)]
    limit: usize,

    #[arg(long)]
    json: bool,
}

impl QueryArgs {
    fn spec(&self) -> FilterSpec {
        let mut spec = FilterSpec::new().with_deadline(self.deadline);
        let selections = [
            (Dimension::Country, &self.country),
            (Dimension::Region, &self.region),
            (Dimension::FieldOfStudy, &self.field_of_study),
            (Dimension::CareerStage, &self.career_stage),
            (Dimension::OpportunityType, &self.opportunity_type),
        ];
        for (dim, value) in selections {
            if let Some(v) = value {
                spec = spec.with_category(dim, v.clone());
            }
        }
        if let Some(r) = range(self.funding_min, self.funding_max) {
            spec = spec.with_funding(r);
        }
        if let Some(r) = range(self.duration_min, self.duration_max) {
            spec = spec.with_duration(r);
        }
        spec
    }
}

fn range(min: Option<f64>, max: Option<f64>) -> Option<Range> {
    if min.is_none() && max.is_none() {
        return None;
    }
    Some(Range::new(
        min.unwrap_or(f64::NEG_INFINITY),
        max.unwrap_or(f64::INFINITY),
    ))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ExplorerConfig::load(path)?,
        None => ExplorerConfig::default(),
    };

    match cli.command {
        Commands::Merge(args) => run_merge(&config, args),
        Commands::Query(args) => run_query(&config, args),
        Commands::Choices { input } => {
            let dataset = load_merged(&config, &input)?;
            for (dim, values) in choices(&dataset) {
                println!("{}:", dim.label());
                for (value, count) in values {
                    println!("  {value} ({count})");
                }
            }
            Ok(())
        }
    }
}

fn run_merge(config: &ExplorerConfig, args: MergeArgs) -> Result<()> {
    let sources = if args.batches.is_empty() {
        config.merge.sources()
    } else {
        args.batches.into_iter().map(BatchSource::File).collect()
    };
    let mut options = config.merge.options();
    if let Some(dedup) = args.dedup {
        options.duplicate_policy = dedup.into();
    }
    let output = args.output.unwrap_or_else(|| config.merge.output_path());

    let (dataset, report) = merge(&sources, &options)?;
    export_dataset(&output, &dataset)?;
    if report.has_duplicates() && options.duplicate_policy == DuplicatePolicy::KeepAll {
        warn!("duplicate ids were kept; rerun with --dedup first-occurrence to drop them");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_summary(&dataset, &report));
        println!("\n✓ Merged file saved: {}", output.display());
    }
    Ok(())
}

/// Re-run the merged file through the pipeline so derived fields come from source.
fn load_merged(config: &ExplorerConfig, input: &Path) -> Result<Dataset> {
    let (dataset, _) = merge(&[BatchSource::File(input.to_path_buf())], &config.merge.options())
        .with_context(|| format!("loading {}", input.display()))?;
    Ok(dataset)
}

fn run_query(config: &ExplorerConfig, args: QueryArgs) -> Result<()> {
    let dataset = load_merged(config, &args.input)?;

    let now = Local::now().naive_local();
    let mut ctx = QueryContext::at(now);
    if let Some(year) = args.target_year.or(config.query.target_year) {
        ctx = ctx.with_target_year(year);
    }

    let spec = args.spec();
    let view = query(&dataset, &spec, &ctx);
    let summary = summarize(&view, config.query.median_field);

    if let Some(path) = &args.export {
        export_view(path, &view)?;
    }

    let rows = display_rows(&view);
    if args.json {
        let shown: Vec<_> = rows.iter().take(args.limit).collect();
        let out = serde_json::json!({
            "active_filters": view.active_filters(),
            "summary": summary,
            "rows": shown,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if spec.is_empty() {
        println!("No filters applied | {} opportunities", view.len());
    } else {
        println!(
            "{} active filters | {} opportunities match",
            view.active_filters(),
            view.len()
        );
    }
    let median = match summary.median_field {
        NumericField::DurationMonths => summary
            .median
            .map_or_else(|| "N/A".to_string(), |m| format!("{m:.1} months")),
        _ => format_usd(summary.median),
    };
    println!(
        "Countries: {} | Opportunity types: {} | Median {:?}: {median}",
        summary.countries, summary.opportunity_types, summary.median_field,
    );
    if view.is_empty() {
        println!("No opportunities match the current filters.");
        return Ok(());
    }

    println!();
    for row in rows.iter().take(args.limit) {
        println!(
            "{:>6}  {:<40}  {:<16}  {:<14}  {:>12}  {}",
            row.id,
            truncate(&row.name, 40),
            truncate(&row.country, 16),
            truncate(&row.opportunity_type, 14),
            row.funding,
            row.deadline
        );
    }
    if rows.len() > args.limit {
        println!("… {} more", rows.len() - args.limit);
    }
    Ok(())
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}
