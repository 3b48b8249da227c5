//! kpireport CLI - 3G KPI reports from counter exports
//!
//! # Commands
//!
//! ```bash
//! kpireport report bbh.xlsx                         # BBH preset: site level, daily
//! kpireport report raw.csv --preset continue        # cell level, daily, hour 00 only
//! kpireport report raw.csv --granularity hour -o out.xlsx
//! kpireport columns raw.csv                         # show headers and missing counters
//! kpireport kpis                                    # list the KPI catalog
//! kpireport serve                                   # HTTP server (port 3000)
//! ```

use clap::{Parser, Subcommand};
use kpireport::{
    build_report, check_columns, export, kpi::catalog_description, load_catalog, parse_file_auto,
    ExportFormat, Granularity, KpiListResponse, Preset, ReportLevel, ReportOptions, ServerConfig,
    SheetSelection,
};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "kpireport")]
#[command(about = "Compute and pivot 3G KPIs from raw counter spreadsheets", long_about = None)]
struct Cli {
    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a pivoted KPI report
    Report {
        /// Input spreadsheet (.csv or .xlsx)
        input: PathBuf,

        /// Option preset: bbh (site, daily) or continue (cell, daily, hour 0)
        #[arg(short, long)]
        preset: Option<Preset>,

        /// Element level: site or cell (overrides the preset)
        #[arg(short, long)]
        level: Option<ReportLevel>,

        /// Column granularity: day or hour (overrides the preset)
        #[arg(short, long)]
        granularity: Option<Granularity>,

        /// Keep only intervals starting in this hour
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=23), conflicts_with = "all_hours")]
        hour: Option<u8>,

        /// Disable the preset's hour filter
        #[arg(long)]
        all_hours: bool,

        #[command(flatten)]
        sheets: SheetArgs,

        /// Output format (default: from the output extension, else csv)
        #[arg(short, long)]
        format: Option<ExportFormat>,

        /// Custom KPI catalog (JSON)
        #[arg(short, long)]
        catalog: Option<PathBuf>,

        /// Output file, `-` for stdout (default: 3G_<Day|Hour>_<Site|Cell>_Level_KPIs_output.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show input columns and which KPIs they support
    Columns {
        /// Input spreadsheet (.csv or .xlsx)
        input: PathBuf,

        /// Element level to check key columns for
        #[arg(short, long, default_value = "site")]
        level: ReportLevel,

        #[command(flatten)]
        sheets: SheetArgs,

        /// Custom KPI catalog (JSON)
        #[arg(short, long)]
        catalog: Option<PathBuf>,
    },

    /// List the KPI catalog
    Kpis {
        /// Custom KPI catalog (JSON)
        #[arg(short, long)]
        catalog: Option<PathBuf>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on (default: KPIREPORT_PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Custom KPI catalog (default: KPIREPORT_CATALOG or built-in)
        #[arg(short, long)]
        catalog: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct SheetArgs {
    /// Workbook sheet to read (default: first)
    #[arg(short, long, conflicts_with = "all_sheets")]
    sheet: Option<String>,

    /// Read every sheet and concatenate rows
    #[arg(long)]
    all_sheets: bool,
}

impl SheetArgs {
    fn selection(&self) -> SheetSelection {
        match (&self.sheet, self.all_sheets) {
            (_, true) => SheetSelection::All,
            (Some(name), false) => SheetSelection::Named(name.clone()),
            (None, false) => SheetSelection::First,
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    if cli.quiet {
        kpireport::api::LOG_BROADCASTER.set_echo(false);
    }

    let result = match cli.command {
        Commands::Report {
            input,
            preset,
            level,
            granularity,
            hour,
            all_hours,
            sheets,
            format,
            catalog,
            output,
        } => {
            let mut options = ReportOptions::preset(preset.unwrap_or(Preset::Bbh));
            if let Some(level) = level {
                options.level = level;
            }
            if let Some(granularity) = granularity {
                options.granularity = granularity;
            }
            if hour.is_some() || all_hours {
                options.hour = hour;
            }
            options.sheet = sheets.selection();

            cmd_report(&input, &options, format, catalog.as_deref(), output.as_deref(), cli.quiet)
        }

        Commands::Columns {
            input,
            level,
            sheets,
            catalog,
        } => cmd_columns(&input, level, &sheets.selection(), catalog.as_deref()),

        Commands::Kpis { catalog, json } => cmd_kpis(catalog.as_deref(), json),

        Commands::Serve { port, catalog } => cmd_serve(port, catalog).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_report(
    input: &Path,
    options: &ReportOptions,
    format: Option<ExportFormat>,
    catalog_path: Option<&Path>,
    output: Option<&Path>,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let to_stdout = output.is_some_and(|p| p == Path::new("-"));
    let format = format
        .or_else(|| output.filter(|_| !to_stdout).and_then(ExportFormat::from_path))
        .unwrap_or_default();

    let catalog = load_catalog(catalog_path)?;
    let result = build_report(input, options, &catalog)?;
    let bytes = export(&result.report, format)?;

    if !quiet {
        eprintln!("\n📊 Report:");
        eprintln!("   Level:        {}", options.level.label());
        eprintln!("   Granularity:  {}", options.granularity.label());
        if let Some(h) = options.hour {
            eprintln!("   Hour:         {:02}:00", h);
        }
        eprintln!("   Elements:     {}", result.report.group_count());
        eprintln!("   Time columns: {}", result.report.buckets.len());
        eprintln!("   Rows:         {}", result.report.rows.len());
        if !result.skipped.is_empty() {
            eprintln!("   Skipped:      {} input rows", result.skipped.len());
        }
    }

    if to_stdout {
        std::io::stdout().write_all(&bytes)?;
        return Ok(());
    }

    let path = match output {
        Some(p) => p.to_path_buf(),
        None => PathBuf::from(result.file_name(format)),
    };
    fs::write(&path, &bytes)?;
    if !quiet {
        eprintln!("\n💾 Output written to: {}", path.display());
        eprintln!("✨ Done!");
    }

    Ok(())
}

fn cmd_columns(
    input: &Path,
    level: ReportLevel,
    selection: &SheetSelection,
    catalog_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = load_catalog(catalog_path)?;
    let parsed = parse_file_auto(input, selection)?;

    eprintln!("📄 {}", input.display());
    if !parsed.sheets.is_empty() {
        eprintln!("   Sheets: {}", parsed.sheets.join(", "));
    }
    eprintln!("   Rows:   {}", parsed.table.len());
    eprintln!("\n📋 Columns:");
    for (i, col) in parsed.table.headers.iter().enumerate() {
        println!("  [{:2}] {}", i + 1, col);
    }

    let key_columns = level.key_columns();
    let report = check_columns(&parsed.table.headers, &catalog, &key_columns);

    eprintln!("\n🧮 KPIs ({} level):", level.label());
    for name in &report.active_kpis {
        eprintln!("   ✅ {}", name);
    }
    for name in &report.disabled_kpis {
        eprintln!("   ⚠️  {} (skipped)", name);
    }
    for column in &report.missing_structural {
        eprintln!("   ❌ Missing required column '{}'", column);
    }
    for warning in report.warnings() {
        eprintln!("   ⚠️  {}", warning);
    }

    if report.is_fatal() {
        return Err(format!("cannot build a {} level report from this file", level.label()).into());
    }
    Ok(())
}

fn cmd_kpis(catalog_path: Option<&Path>, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = load_catalog(catalog_path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&KpiListResponse::from(&catalog))?);
    } else {
        eprintln!("📋 KPI catalog v{} ({} KPIs)", catalog.version, catalog.len());
        print!("{}", catalog_description(&catalog));
    }
    Ok(())
}

async fn cmd_serve(port: Option<u16>, catalog: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ServerConfig::from_env()?;
    if let Some(port) = port {
        config = config.with_port(port);
    }
    if let Some(path) = catalog {
        config = config.with_catalog(path);
    }
    kpireport::server::start_server(config).await
}
