//! Command-line runner for the reconciliation engine.
//!
//! Usage:
//!   reconcile config.json --input records.ndjson --db store.db
//!   cat records.ndjson | reconcile config.json --csv-root ./exports
//!
//! The config is one JSON object of operation options. Records are read one
//! JSON object per line; blank lines are ignored.

use std::{
    fs,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

use anyhow::{bail, ensure, Context, Result};
use clap::Parser;
use reconcile_core::record::{from_json_str, Record};
use reconcile_engine::{resolve_backend, OperationConfig, Processor};
use reconcile_storage::{BackendKind, Registry, StoreSettings};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "reconcile")]
#[command(about = "Reconcile NDJSON records into a document or CSV collection")]
struct Args {
    /// Operation config (JSON object)
    config: PathBuf,

    /// NDJSON records; stdin when absent or `-`
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// JSON object merged into every record's log entry
    #[arg(long)]
    job_log: Option<PathBuf>,

    /// Root directory for CSV collections
    #[arg(long, default_value = ".")]
    csv_root: PathBuf,

    /// SQLite file for document collections (in-memory when unset)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Decide everything but write nothing
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();

    let text = fs::read_to_string(&args.config)
        .with_context(|| format!("reading config {}", args.config.display()))?;
    let mut config = OperationConfig::from_json_str(&text)
        .with_context(|| format!("invalid config {}", args.config.display()))?;
    if args.dry_run {
        config.dry_run = true;
    }

    let job_log = match &args.job_log {
        Some(path) => read_job_log(path)?,
        None => Record::new(),
    };

    let records = match args.input.as_deref() {
        Some(path) if path != Path::new("-") => {
            let file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
            read_records(BufReader::new(file))?
        }
        _ => read_records(io::stdin().lock())?,
    };

    let settings = StoreSettings {
        csv_root: args.csv_root,
        document_db: args.db,
    };
    if settings.document_db.is_none() && config.backend == BackendKind::Documents {
        warn!("no --db given, documents are kept in memory only");
    }

    let mut registry = Registry::new();
    let backend = resolve_backend(&mut registry, &config, &settings)?;
    info!(collection = %backend.name(), op = %config.op, records = records.len(), "starting run");

    let summary = Processor::new(config, backend)?
        .with_job_log(job_log)
        .process_many(records)?;
    println!("{summary}");

    ensure!(
        summary.failed == 0,
        "{} of {} records failed",
        summary.failed,
        summary.processed
    );
    Ok(())
}

fn read_job_log(path: &Path) -> Result<Record> {
    let text = fs::read_to_string(path).with_context(|| format!("reading job log {}", path.display()))?;
    from_json_str(&text).with_context(|| format!("invalid job log {}", path.display()))
}

/// One record per non-blank line.
fn read_records(reader: impl BufRead) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match from_json_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => bail!("line {}: {e}", index + 1),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn reads_ndjson_skipping_blank_lines() -> Result<()> {
        let input = "{\"sku\": \"A\"}\n\n  \n{\"sku\": \"B\", \"qty\": 2}\n";
        let records = read_records(Cursor::new(input))?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("qty").and_then(|v| v.as_i64()), Some(2));
        Ok(())
    }

    #[test]
    fn reports_the_offending_line() {
        let input = "{\"sku\": \"A\"}\n[1, 2]\n";
        let err = read_records(Cursor::new(input)).err().map(|e| e.to_string());
        assert!(err.is_some_and(|msg| msg.starts_with("line 2:")));
    }

    #[test]
    fn job_log_must_be_an_object() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let good = dir.path().join("good.json");
        fs::write(&good, "{\"job\": \"nightly\"}")?;
        assert_eq!(read_job_log(&good)?.get("job").and_then(|v| v.as_str()), Some("nightly"));

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "\"nightly\"")?;
        assert!(read_job_log(&bad).is_err());
        Ok(())
    }

    #[test]
    fn parses_flags() {
        let args = Args::parse_from(["reconcile", "cfg.json", "--db", "x.db", "--dry-run", "-v"]);
        assert_eq!(args.config, PathBuf::from("cfg.json"));
        assert_eq!(args.db, Some(PathBuf::from("x.db")));
        assert!(args.dry_run && args.verbose);
        assert_eq!(args.csv_root, PathBuf::from("."));
    }
}
