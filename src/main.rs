use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tabular_loader::runner::{
    run_analysis, run_import, AnalysisReport, IfExistsPolicy, ImportArgs, ImportPolicy,
};

#[derive(Parser, Clone)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Subcommand)]
enum Command {
    Load {
        /// Path to the CSV or Excel source file
        #[arg(short, long)]
        file: PathBuf,

        /// Destination table name (workbook sheets get a per-sheet suffix)
        #[arg(short, long)]
        table: String,

        /// PostgreSQL connection string
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,

        /// Behavior when the destination table exists (replace, append, fail)
        #[arg(long, default_value = "replace")]
        if_exists: String,

        /// Require the column set to match any existing destination table
        #[arg(long)]
        strict_schema: bool,

        /// Rows per chunk when streaming large delimited files
        #[arg(long, default_value = "50000")]
        chunk_size: usize,

        /// Size threshold in MiB above which delimited files stream in chunks
        #[arg(long, default_value = "200")]
        chunk_threshold_mb: u64,

        /// Analyze the file and report the plan without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Emit the dry-run report as JSON
        #[arg(long)]
        json: bool,

        /// Quiet mode - minimal output, only show summary
        #[arg(short, long)]
        quiet: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Load {
            file,
            table,
            database_url,
            if_exists,
            strict_schema,
            chunk_size,
            chunk_threshold_mb,
            dry_run,
            json,
            quiet,
        } => {
            run_loader(
                file,
                table,
                database_url,
                if_exists,
                strict_schema,
                chunk_size,
                chunk_threshold_mb,
                dry_run,
                json,
                quiet,
            )
            .await?;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_loader(
    file: PathBuf,
    table: String,
    database_url: Option<String>,
    if_exists: String,
    strict_schema: bool,
    chunk_size: usize,
    chunk_threshold_mb: u64,
    dry_run: bool,
    json: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    // Initialize tracing based on quiet mode
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let filter = if quiet {
        EnvFilter::new("tabular_loader=warn,sqlx=off")
    } else {
        EnvFilter::new("tabular_loader=info,sqlx=off")
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    if chunk_size == 0 {
        anyhow::bail!("--chunk-size must be greater than zero");
    }
    if chunk_threshold_mb == 0 {
        anyhow::bail!("--chunk-threshold-mb must be greater than zero");
    }

    let policy = ImportPolicy {
        if_exists: IfExistsPolicy::parse(&if_exists)?,
        strict_schema,
        chunk_size,
        chunk_threshold_bytes: chunk_threshold_mb * 1024 * 1024,
    };

    // Handle dry-run mode
    if dry_run {
        let report = run_analysis(&file, &table, &policy);

        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_analysis(&file, &table, &policy, &report);
        }

        if !report.is_success() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let database_url = database_url.ok_or_else(|| {
        anyhow::anyhow!(
            "no database URL configured. Pass --database-url or set the DATABASE_URL \
             environment variable"
        )
    })?;

    let report = run_import(ImportArgs {
        database_url,
        file,
        table,
        policy,
        quiet,
    })
    .await?;

    println!();
    println!("Import Summary");
    println!("==============");
    println!("Tables imported: {}", report.imported.len());
    for import in &report.imported {
        println!(
            "  {} ({} rows) [{}]",
            import.table, import.rows_imported, import.schema
        );
        for warning in &import.warnings {
            println!("    warning: {warning}");
        }
    }
    if !report.skipped.is_empty() {
        println!("Sheets skipped: {}", report.skipped.len());
        for skipped in &report.skipped {
            println!("  {} ({})", skipped.sheet, skipped.reason);
        }
    }
    if !report.failed.is_empty() {
        println!("Sheets failed: {}", report.failed.len());
        for failed in &report.failed {
            println!("  {} -> {}: {}", failed.sheet, failed.table, failed.error);
        }
    }

    Ok(())
}

fn print_analysis(
    file: &std::path::Path,
    table: &str,
    policy: &ImportPolicy,
    report: &AnalysisReport,
) {
    println!("DRY RUN - no data will be written");
    println!("=================================");
    println!("File: {}", file.display());
    println!("Target table: {table}");
    println!("If exists: {}", policy.if_exists.as_str());
    println!("Strict schema: {}", policy.strict_schema);
    println!();

    match report {
        AnalysisReport::Success { tables, skipped } => {
            for analysis in tables {
                println!("  {} -> {}", analysis.source, analysis.table);
                println!(
                    "      rows: {}, columns: {}, chunking: {}",
                    analysis.rows,
                    analysis.columns,
                    if analysis.chunked { "yes" } else { "no" }
                );
                println!("      schema: {}", analysis.schema);
                for warning in &analysis.warnings {
                    println!("      warning: {warning}");
                }
            }
            for skipped in skipped {
                println!("  {} -> skipped ({})", skipped.sheet, skipped.reason);
            }
        }
        AnalysisReport::Failure { reason } => {
            println!("Import would fail: {reason}");
        }
    }
}
