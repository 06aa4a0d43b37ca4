use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use regional_stats::{overlap_ratio, DashboardReport, Reconciler, ReconcilerConfig};

#[derive(Parser)]
#[command(name = "regional-stats", about = "Regional crime statistics reconciled with boundary maps", version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the observations CSV path
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Override the boundary archive path
    #[arg(long, global = true)]
    boundaries: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the available years and categories
    Selections,

    /// Summary, tables and change matrix for one year and category
    Dashboard {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        category: Option<String>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Joined map as GeoJSON on stdout
    Map {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        category: Option<String>,
    },

    /// Population vs crime top-k comparison
    Compare {
        #[arg(long)]
        year: Option<i32>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let reconciler = Reconciler::new(load_config(&cli)?);

    match cli.command {
        Command::Selections => run_selections(&reconciler),
        Command::Dashboard { year, category, json } => run_dashboard(&reconciler, year, category.as_deref(), json),
        Command::Map { year, category } => run_map(&reconciler, year, category.as_deref()),
        Command::Compare { year } => run_compare(&reconciler, year),
    }
}

fn load_config(cli: &Cli) -> Result<ReconcilerConfig> {
    let mut config = match &cli.config {
        Some(path) => ReconcilerConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => ReconcilerConfig::default(),
    };

    if let Some(data) = &cli.data {
        config.data_path = data.clone();
    }
    if let Some(boundaries) = &cli.boundaries {
        config.boundary_archive_path = boundaries.clone();
    }

    Ok(config)
}

fn run_selections(reconciler: &Reconciler) -> Result<()> {
    let snapshot = reconciler.load_snapshot().context("Failed to load input data")?;
    let selections = snapshot.selections();

    println!("📅 Years:");
    for year in &selections.years {
        println!("   {}", year);
    }

    println!("\n🏷️  Categories:");
    for category in &selections.categories {
        println!("   {}", category);
    }

    Ok(())
}

fn run_dashboard(reconciler: &Reconciler, year: Option<i32>, category: Option<&str>, json: bool) -> Result<()> {
    let report = reconciler
        .run(year, category)
        .context("Failed to build dashboard")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_dashboard(&report);
    Ok(())
}

fn print_dashboard(report: &DashboardReport) {
    println!("📊 {}년 {}", report.selection.year, report.selection.category);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", report.summary());
    println!("평균: {:.2}", report.mean_value);

    println!("\n🔗 범죄 건수와 인구 수 연관성");
    for row in &report.comparison {
        println!(
            "   {} | 총인구수: {} | 범죄 발생총건수: {} | {}",
            row.region_name,
            format_optional(row.population),
            format_optional(row.crime_count),
            row.membership.label()
        );
    }

    println!("\n🗺️  지역별 데이터");
    for entry in &report.table {
        println!(
            "   {:<12} {:>14.1} {:>10}",
            entry.region_name,
            entry.value,
            format_change(entry.pct_change)
        );
    }

    println!("\n🏆 Top {}", report.top_regions.len());
    for (rank, entry) in report.top_regions.iter().enumerate() {
        println!("   {}. {} ({:.1})", rank + 1, entry.region_name, entry.value);
    }

    if !report.unmatched_regions.is_empty() {
        println!("\n⚠️  No boundary for: {}", report.unmatched_regions.join(", "));
    }

    let matrix = &report.change_matrix;
    println!("\n📈 연도별 증감률 ({} years × {} regions)", matrix.years.len(), matrix.regions.len());
    for year in &matrix.years {
        let cells: Vec<String> = matrix
            .regions
            .iter()
            .map(|region| {
                let change = matrix.cell(*year, region).and_then(|c| c.pct_change);
                format!("{}={}", region, format_change(change))
            })
            .collect();
        println!("   {}: {}", year, cells.join("  "));
    }
}

fn run_map(reconciler: &Reconciler, year: Option<i32>, category: Option<&str>) -> Result<()> {
    let snapshot = reconciler.load_snapshot().context("Failed to load input data")?;
    let selection = snapshot.resolve_selection(year, category)?;

    let geojson = reconciler.map_geojson(&snapshot, &selection);
    println!("{}", serde_json::to_string(&geojson)?);

    Ok(())
}

fn run_compare(reconciler: &Reconciler, year: Option<i32>) -> Result<()> {
    let snapshot = reconciler.load_snapshot().context("Failed to load input data")?;
    let selection = snapshot.resolve_selection(year, None)?;
    let rows = reconciler.comparison(&snapshot, selection.year);
    let settings = &reconciler.config().comparison;

    println!(
        "🔗 Top {} {} vs {} ({})",
        settings.top_k, settings.population_category, settings.crime_category, selection.year
    );
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for row in &rows {
        println!("   {:<12} {}", row.region_name, row.membership.label());
    }
    println!("\n✓ Overlap: {:.0}%", overlap_ratio(&rows) * 100.0);

    Ok(())
}

fn format_optional(value: Option<f64>) -> String {
    value.map(|v| format!("{:.0}", v)).unwrap_or_else(|| "N/A".to_string())
}

fn format_change(change: Option<f64>) -> String {
    change.map(|c| format!("{:+.1}%", c)).unwrap_or_else(|| "-".to_string())
}
