//! teachmap CLI - Map teacher CSV exports onto the canonical profile schema
//!
//! # Main Commands
//!
//! ```bash
//! teachmap transform teachers.csv --mapping mapping.tsv -o out.csv   # Full run
//! teachmap serve                                                     # HTTP server (port 3000)
//! ```
//!
//! # Inspection Commands
//!
//! ```bash
//! teachmap parse teachers.csv          # Just parse CSV to JSON
//! teachmap parse-spec mapping.tsv      # Show the parsed mapping rules
//! teachmap validate out.csv            # Check a canonical CSV against the contract
//! teachmap contract                    # Show the content contract
//! ```

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use teachmap::config::parse_run_timestamp;
use teachmap::parser::{output_csv_string, parse_output_records};
use teachmap::{
    backend_for, parse_csv_file_auto, parse_mapping, transform_csv, validate, ContentContract,
    InferenceBackend, RetentionPolicy, RunConfig, RunSummary, ValueAliases,
};

#[derive(Parser)]
#[command(name = "teachmap")]
#[command(about = "Map teacher CSV exports onto the canonical teacher profile schema", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a CSV file and output JSON
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Full pipeline: CSV + mapping sheet -> canonical CSV
    Transform {
        /// Input CSV file
        input: PathBuf,

        /// Mapping sheet (tab- or pipe-separated)
        #[arg(short, long)]
        mapping: PathBuf,

        /// Output CSV file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write a JSON report (summary + per-record diagnostics)
        #[arg(long)]
        report: Option<PathBuf>,

        /// Withhold records that fail validation
        #[arg(long)]
        drop_invalid: bool,

        /// Resolve nothing by inference
        #[arg(long)]
        offline: bool,

        /// Records in flight (overrides TEACHMAP_CONCURRENCY)
        #[arg(short, long)]
        concurrency: Option<usize>,

        /// JSON file of extra value aliases: {"field": {"raw": "canonical"}}
        #[arg(long)]
        aliases: Option<PathBuf>,

        /// Run timestamp for created_at (RFC 3339, default: now)
        #[arg(long)]
        created_at: Option<String>,
    },

    /// Parse a mapping sheet and print its rules as JSON
    ParseSpec {
        /// Mapping sheet
        mapping: PathBuf,
    },

    /// Validate a canonical CSV against the content contract
    Validate {
        /// Canonical CSV file
        input: PathBuf,
    },

    /// Show the content contract
    Contract,

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Resolve nothing by inference
        #[arg(long)]
        offline: bool,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Parse { input, output } => cmd_parse(&input, output.as_deref()),

        Commands::Transform {
            input,
            mapping,
            output,
            report,
            drop_invalid,
            offline,
            concurrency,
            aliases,
            created_at,
        } => {
            let options = TransformArgs {
                drop_invalid,
                offline,
                concurrency,
                aliases,
                created_at,
            };
            cmd_transform(&input, &mapping, output.as_deref(), report.as_deref(), options).await
        }

        Commands::ParseSpec { mapping } => cmd_parse_spec(&mapping),

        Commands::Validate { input } => cmd_validate(&input),

        Commands::Contract => cmd_contract(),

        Commands::Serve { port, offline } => cmd_serve(port, offline).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_parse(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing CSV: {}", input.display());

    let result = parse_csv_file_auto(input)?;

    eprintln!("   Encoding: {}", result.encoding);
    eprintln!("   Delimiter: '{}' (auto-detected)", format_delimiter(result.delimiter));
    eprintln!("   Columns: {}", result.headers.join(", "));
    eprintln!("✅ Parsed {} records", result.records.len());

    let json = serde_json::to_string_pretty(&result.records)?;
    write_output(&json, output)?;

    Ok(())
}

struct TransformArgs {
    drop_invalid: bool,
    offline: bool,
    concurrency: Option<usize>,
    aliases: Option<PathBuf>,
    created_at: Option<String>,
}

fn build_config(args: &TransformArgs) -> Result<RunConfig, Box<dyn std::error::Error>> {
    let mut config = RunConfig::from_env()?;

    if let Some(concurrency) = args.concurrency {
        config = config.with_concurrency(concurrency);
    }
    if let Some(path) = &args.aliases {
        let mut aliases = ValueAliases::default();
        aliases.merge_file(path)?;
        config = config.with_aliases(aliases);
    }
    if let Some(ts) = &args.created_at {
        config = config.with_run_timestamp(parse_run_timestamp(ts)?);
    }
    if args.drop_invalid {
        config = config.with_retention(RetentionPolicy::DropFailing);
    }

    config.check()?;
    Ok(config)
}

async fn cmd_transform(
    input: &Path,
    mapping: &Path,
    output: Option<&Path>,
    report: Option<&Path>,
    args: TransformArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Processing: {}", input.display());

    let config = build_config(&args)?;
    let sheet = fs::read_to_string(mapping)?;
    let backend = prepare_run(&sheet, &config, args.offline)?;

    let outcome = transform_csv(input, &sheet, &config, backend).await?;

    eprintln!("   Encoding: {}", outcome.csv_info.encoding);
    eprintln!("   Delimiter: '{}'", format_delimiter(outcome.csv_info.delimiter));
    eprintln!("   Rows: {}", outcome.csv_info.row_count);

    print_summary(&outcome.summary);

    let csv = output_csv_string(&outcome.emitted())?;
    write_output(&csv, output)?;

    if let Some(report_path) = report {
        fs::write(report_path, outcome.report_json()?)?;
        eprintln!("   💾 Report saved to: {}", report_path.display());
    }

    eprintln!("\n✨ Done!");
    Ok(())
}

/// Reject a malformed mapping sheet before asking for inference credentials.
fn prepare_run(
    sheet: &str,
    config: &RunConfig,
    offline: bool,
) -> Result<Arc<dyn InferenceBackend>, Box<dyn std::error::Error>> {
    parse_mapping(sheet)?;
    Ok(backend_for(config, offline)?)
}

fn print_summary(summary: &RunSummary) {
    eprintln!("\n✔️  Validation:");
    eprintln!("   ✅ Passed: {}", summary.passed);
    if summary.failed > 0 {
        eprintln!("   ❌ Failed: {}", summary.failed);
        for (field, counts) in &summary.fields {
            if counts.missing > 0 || counts.malformed > 0 {
                eprintln!(
                    "     - {}: {} missing, {} malformed",
                    field, counts.missing, counts.malformed
                );
            }
        }
    }
    if summary.dropped > 0 {
        eprintln!("   🗑️  Dropped: {}", summary.dropped);
    }
    let stats = &summary.inference;
    eprintln!(
        "   🤖 Inference: {} calls, {} cache hits, {} retries, {} failures",
        stats.calls, stats.cache_hits, stats.retries, stats.failures
    );
}

fn cmd_parse_spec(mapping: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let sheet = fs::read_to_string(mapping)?;
    let spec = parse_mapping(&sheet)?;
    eprintln!("✅ {} rules", spec.len());
    println!("{}", serde_json::to_string_pretty(spec.rules())?);
    Ok(())
}

fn cmd_validate(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("✔️  Validating: {}", input.display());

    let bytes = fs::read(input)?;
    let records = parse_output_records(&bytes)?;
    let contract = ContentContract::teacher_profile();

    let mut summary = RunSummary::default();
    for (i, record) in records.iter().enumerate() {
        let result = validate(record, &contract);
        summary.add(&result);
        if !result.passed && summary.failed <= 5 {
            eprintln!("\n❌ Record {} invalid:", i);
            for err in result.errors.iter().take(3) {
                eprintln!("   - {}", err);
            }
        }
    }

    eprintln!("\n📊 Results: {} valid, {} invalid", summary.passed, summary.failed);

    if !summary.all_passed() {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_contract() -> Result<(), Box<dyn std::error::Error>> {
    let contract = ContentContract::teacher_profile();
    println!("{:<34} {:<9} {:<11} {}", "field", "required", "type", "format");
    for spec in contract.fields() {
        println!(
            "{:<34} {:<9} {:<11} {}",
            spec.field.name(),
            if spec.required { "yes" } else { "no" },
            format!("{:?}", spec.semantic_type).to_lowercase(),
            spec.predicate.map(|p| p.expected()).unwrap_or("-"),
        );
    }
    Ok(())
}

async fn cmd_serve(port: u16, offline: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = RunConfig::from_env()?;
    let backend = backend_for(&config, offline)?;
    teachmap::server::start_server(port, config, backend).await?;
    Ok(())
}

fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use teachmap::error::{InferenceError, SpecParseError};

    const SHEET: &str = "Input\tOutput\nID\tteacher_id\n-\tNationality\n";

    fn keyless() -> RunConfig {
        RunConfig {
            api_key: None,
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_malformed_sheet_reported_before_missing_key() {
        let sheet = format!("{}-\tteacher_id\n", SHEET);
        let err = prepare_run(&sheet, &keyless(), false).err().unwrap();
        assert!(err.downcast_ref::<SpecParseError>().is_some(), "{err}");
    }

    #[test]
    fn test_missing_key_reported_for_valid_sheet() {
        let err = prepare_run(SHEET, &keyless(), false).err().unwrap();
        assert!(err.downcast_ref::<InferenceError>().is_some(), "{err}");

        let backend = prepare_run(SHEET, &keyless(), true).unwrap();
        assert_eq!(backend.name(), "offline");
    }
}
