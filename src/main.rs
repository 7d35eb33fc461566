use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use policy_merge::{
    audit_store, read_export, write_records, Catalog, CodeGenerator, EngineConfig, MergeResolver,
    PipelineSummary, PolicyRecord, RecordNormalizer, Session,
};

#[derive(Parser)]
#[command(name = "policy-merge")]
#[command(version, about = "Consolidate firewall policy exports from several devices", long_about = None)]
struct Cli {
    /// Engine configuration (JSON); defaults apply to missing keys
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print per-origin record counts and duplicate/similarity group counts.
    Summary {
        /// Policy export CSV files.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Object definition sources used for name resolution.
        #[arg(long)]
        catalog: Vec<PathBuf>,
    },
    /// Run the default-decision pipeline and write the consolidated outputs.
    Merge {
        /// Policy export CSV files.
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Consolidated record set (CSV).
        #[arg(long)]
        out: PathBuf,
        /// Device configuration script.
        #[arg(long)]
        script: Option<PathBuf>,
        /// Object definition sources used for resolution and validation.
        #[arg(long)]
        catalog: Vec<PathBuf>,
        /// SQLite database receiving the audit log.
        #[arg(long)]
        audit_db: Option<PathBuf>,
        /// JSON session snapshot of records and audit log.
        #[arg(long)]
        session: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Logs go to stderr so stdout stays clean
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("policy_merge=info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Summary { files, catalog } => run_summary(&files, &catalog, &config),
        Commands::Merge {
            files,
            out,
            script,
            catalog,
            audit_db,
            session,
        } => run_merge(
            &files,
            &out,
            script.as_deref(),
            &catalog,
            audit_db.as_deref(),
            session.as_deref(),
            &config,
        ),
    }
}

fn load_records(files: &[PathBuf], config: &EngineConfig) -> Result<Vec<PolicyRecord>> {
    let exports = files
        .iter()
        .map(read_export)
        .collect::<Result<Vec<_>>>()?;

    let normalized = RecordNormalizer::new(config).normalize_all(&exports)?;
    Ok(normalized.into_iter().flat_map(|e| e.records).collect())
}

fn load_catalog(sources: &[PathBuf], config: &EngineConfig) -> Result<Catalog> {
    let texts = sources
        .iter()
        .map(|p| fs::read_to_string(p).with_context(|| format!("Failed to read catalog source: {:?}", p)))
        .collect::<Result<Vec<_>>>()?;

    Ok(Catalog::build_with(texts.as_slice(), config.tie_break)?)
}

fn run_summary(files: &[PathBuf], sources: &[PathBuf], config: &EngineConfig) -> Result<()> {
    let records = load_records(files, config)?;
    let catalog = load_catalog(sources, config)?;

    let summary = PipelineSummary::compute(&records, &catalog, config);
    println!("{}", summary.report());
    Ok(())
}

fn run_merge(
    files: &[PathBuf],
    out: &Path,
    script: Option<&Path>,
    sources: &[PathBuf],
    audit_db: Option<&Path>,
    session: Option<&Path>,
    config: &EngineConfig,
) -> Result<()> {
    let records = load_records(files, config)?;
    let catalog = load_catalog(sources, config)?;

    println!("{}", PipelineSummary::compute(&records, &catalog, config).report());

    let mut resolver = MergeResolver::new(records, &catalog, config).with_actor("policy-merge");
    let touched = resolver.apply_defaults();
    let renamed = resolver.finalize();
    println!("✓ Default decisions applied to {} group(s), {} name(s) made unique", touched, renamed.len());

    let merged: Vec<PolicyRecord> = resolver.records().cloned().collect();
    write_records(out, &merged)?;
    println!("✓ Wrote {} records to {:?}", merged.len(), out);

    if let Some(path) = session {
        Session::capture(&resolver).save(path)?;
        println!("✓ Session saved to {:?}", path);
    }

    if let Some(path) = audit_db {
        let mut conn = audit_store::open(path)?;
        let inserted = audit_store::insert_audit_entries(&mut conn, resolver.audit_log())?;
        println!("✓ Exported {} audit entries to {:?}", inserted, path);
    }

    // Records are already written; a validation failure only blocks the script
    if let Some(path) = script {
        let generated = CodeGenerator::new(&catalog, config).generate(&merged)?;
        fs::write(path, generated.render())
            .with_context(|| format!("Failed to write script: {:?}", path))?;
        println!(
            "✓ Script with {} policies and {} objects written to {:?}",
            generated.policy_count, generated.object_count, path
        );
    }

    Ok(())
}
