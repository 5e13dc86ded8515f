#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::Parser;
use nf_conformance::{E2eConfig, HarnessConfig, run_e2e_suite};

/// Run the dropna fixture packets and check their parity gates.
#[derive(Debug, Parser)]
#[command(name = "nf-conformance-cli", version)]
struct Cli {
    /// Only run fixtures for this packet (e.g. NF-P001).
    #[arg(long)]
    packet_id: Option<String>,
    /// Write parity reports, digests, gate results, and mismatch corpora.
    #[arg(long)]
    write_artifacts: bool,
    /// Fail unless every packet is green and passes its gate.
    #[arg(long)]
    require_green: bool,
    /// Write forensic events as JSONL to this path.
    #[arg(long)]
    forensic_log: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let config = E2eConfig {
        harness: HarnessConfig::default_paths(),
        packet_filter: cli.packet_id,
        write_artifacts: cli.write_artifacts,
        enforce_gates: cli.require_green,
        forensic_log_path: cli.forensic_log,
    };
    let report = run_e2e_suite(&config)?;

    for (packet, gate) in report.packet_reports.iter().zip(&report.gate_results) {
        println!(
            "packet={} suite={} fixtures={} passed={} failed={} green={} gate={}",
            packet.packet_id.as_deref().unwrap_or("<all>"),
            packet.suite,
            packet.fixture_count,
            packet.passed,
            packet.failed,
            packet.is_green(),
            gate.pass
        );
    }
    for artifact in &report.artifacts_written {
        println!(
            "wrote packet={} parity={} digest={} gate={} mismatch_corpus={}",
            artifact.packet_id,
            artifact.parity_report_path.display(),
            artifact.digest_path.display(),
            artifact.gate_result_path.display(),
            artifact.mismatch_corpus_path.display()
        );
    }
    if let Some(path) = &config.forensic_log_path {
        println!(
            "wrote forensic_log={} events={}",
            path.display(),
            report.forensic_log.len()
        );
    }
    Ok(())
}
