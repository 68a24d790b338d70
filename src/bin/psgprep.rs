use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;

use psgprep::{
    detect, edf_files_in, run_batch, BaselineAnalyzer, ChannelRole, EdfReader, PipelineConfig,
    RoleMap, RunOutcome,
};

#[derive(Parser)]
#[command(
    name = "psgprep",
    about = "Condition PSG recordings (EDF) and normalize annotations for RBD analysis"
)]
struct Args {
    /// An EDF file, or a directory processed as a batch.
    input: PathBuf,

    /// Only detect and print the dialect/channel inventory, then exit.
    #[arg(long)]
    inspect: bool,

    /// Run the built-in baseline analyzer after conditioning.
    #[arg(long)]
    analyze: bool,

    /// Local power-line frequency in Hz.
    #[arg(long, default_value_t = 60.0)]
    line_freq: f64,

    /// Analyzer reference sample rate in Hz.
    #[arg(long, default_value_t = 256.0)]
    analyzer_sfreq: f64,

    /// Reconstruct even EDF+C inputs, re-deriving physical ranges from the
    /// data (for files whose declared ranges clip).
    #[arg(long)]
    fix_ranges: bool,

    /// Extra role patterns as PATTERN=ROLE (role: chin | left-leg | right-leg),
    /// comma-separated.
    #[arg(long, default_value = "")]
    role_patterns: String,

    /// Write the batch summary JSON to this path instead of stdout.
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let roles = parse_role_patterns(&args.role_patterns)?;
    let cfg = PipelineConfig {
        roles,
        line_freq_hz: args.line_freq,
        analyzer_sfreq: args.analyzer_sfreq,
        force_reconstruct: args.fix_ranges,
        ..PipelineConfig::default()
    };

    if args.inspect {
        return inspect(&args.input, &cfg);
    }

    let paths = if args.input.is_dir() {
        let found = edf_files_in(&args.input)?;
        if found.is_empty() {
            bail!("no EDF files in {}", args.input.display());
        }
        found
    } else {
        vec![args.input.clone()]
    };

    let analyzer = BaselineAnalyzer::new();
    let analyzer_ref = args.analyze.then_some(&analyzer as &dyn psgprep::AtoniaAnalyzer);
    let reports = run_batch(&paths, &cfg, analyzer_ref);

    for r in &reports {
        match &r.outcome {
            RunOutcome::Success => println!(
                "ok   {} ({} skipped rows, {} unresolved roles)",
                r.input.display(),
                r.skipped_rows,
                r.unresolved_roles
            ),
            RunOutcome::Failed { stage, reason } => {
                println!("FAIL {} at {stage}: {reason}", r.input.display())
            }
        }
    }

    let json = serde_json::to_string_pretty(&reports)?;
    match &args.report {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{json}"),
    }

    let failed = reports.iter().filter(|r| !r.succeeded()).count();
    if failed > 0 {
        bail!("{failed}/{} recordings failed", reports.len());
    }
    Ok(())
}

/// Print dialect and channel inventory for one file.
fn inspect(path: &PathBuf, cfg: &PipelineConfig) -> Result<()> {
    let det = detect(path, &cfg.roles)?;
    let reader = EdfReader::open(path)?;

    println!("{}", path.display());
    println!("  dialect:      {:?}", det.dialect);
    println!("  start:        {}", reader.header.start);
    println!("  records:      {} x {} s", reader.header.n_records, reader.header.record_duration);
    println!("  annotations:  {}", if det.has_embedded_annotations { "embedded" } else { "external" });
    if let Some(sheet) = &det.sheet_path {
        println!("  sheet:        {}", sheet.display());
    }
    println!("  channels:");
    for (idx, sig) in reader.header.signals.iter().enumerate() {
        if sig.is_annotation() {
            continue;
        }
        let role = cfg
            .roles
            .resolve(&sig.label)
            .map(|r| format!(" [{}]", r.as_str()))
            .unwrap_or_default();
        println!("    [{idx}] {} @ {} Hz{role}", sig.label, reader.header.sfreq(idx));
    }
    Ok(())
}

fn parse_role_patterns(spec: &str) -> Result<RoleMap> {
    let mut roles = RoleMap::default();
    for part in spec.split(',').filter(|s| !s.is_empty()) {
        let Some((pattern, role)) = part.split_once('=') else {
            bail!("malformed role pattern {part:?}, expected PATTERN=ROLE");
        };
        let role = match role.trim() {
            "chin" => ChannelRole::ChinEmg,
            "left-leg" => ChannelRole::LeftLegEmg,
            "right-leg" => ChannelRole::RightLegEmg,
            other => bail!("unknown role {other:?}"),
        };
        roles = roles.with_pattern(pattern.trim(), role);
    }
    Ok(roles)
}
