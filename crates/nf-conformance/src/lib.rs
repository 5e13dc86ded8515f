#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use nf_columnar::Column;
use nf_frame::{DataFrame, DropNaArgs, DropNaErrorKind, FrameError, Row};
use nf_index::{Index, IndexLabel};
use nf_runtime::{
    BackendOp, BackendOpKind, ExecutionCounts, ExecutionLedger, RuntimeMode, RuntimePolicy,
};
use nf_types::Scalar;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const SUITE_ID: &str = "dropna_packets";
const DEFAULT_FALLBACK_ROW_CAP: usize = 100_000;

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub repo_root: PathBuf,
    pub fixture_root: PathBuf,
    /// Non-critical drift also fails a case.
    pub strict_mode: bool,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        let repo_root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..");
        Self {
            fixture_root: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures"),
            strict_mode: true,
            repo_root,
        }
    }

    #[must_use]
    pub fn packet_fixture_root(&self) -> PathBuf {
        self.fixture_root.join("packets")
    }

    #[must_use]
    pub fn parity_gate_path(&self, packet_id: &str) -> PathBuf {
        self.fixture_root
            .join("gates")
            .join(format!("{packet_id}.yaml"))
    }

    #[must_use]
    pub fn packet_artifact_root(&self, packet_id: &str) -> PathBuf {
        self.repo_root.join("artifacts/conformance").join(packet_id)
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

/// Table as written in a fixture. An empty `column_order` means the
/// observable order is not part of the case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureFrame {
    pub index: Vec<IndexLabel>,
    pub columns: BTreeMap<String, Vec<Scalar>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub column_order: Vec<String>,
}

impl FixtureFrame {
    pub fn to_frame(&self) -> Result<DataFrame, FrameError> {
        let mut columns = BTreeMap::new();
        for (name, values) in &self.columns {
            columns.insert(name.clone(), Column::from_values(values.clone())?);
        }
        DataFrame::new_with_column_order(
            Index::new(self.index.clone()),
            columns,
            self.column_order.clone(),
        )
    }
}

/// Applied to the input before `dropna`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PreStep {
    SetIndex {
        column: String,
        #[serde(default = "default_true")]
        drop: bool,
    },
    SortValues {
        by: String,
        #[serde(default = "default_true")]
        ascending: bool,
    },
}

/// Applied to the `dropna` result. `iloc_row` ends the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PostStep {
    Iloc { positions: Vec<i64> },
    IlocRow { position: i64 },
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureExpectedError {
    /// `None` for errors outside the argument taxonomy (policy rejections).
    #[serde(default)]
    pub kind: Option<DropNaErrorKind>,
    pub contains: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketFixture {
    pub packet_id: String,
    pub case_id: String,
    pub mode: RuntimeMode,
    #[serde(default)]
    pub fallback_row_cap: Option<usize>,
    pub frame: FixtureFrame,
    #[serde(default)]
    pub pre: Vec<PreStep>,
    #[serde(default)]
    pub dropna: DropNaArgs,
    #[serde(default)]
    pub post: Vec<PostStep>,
    #[serde(default)]
    pub expected_frame: Option<FixtureFrame>,
    #[serde(default)]
    pub expected_row: Option<Row>,
    #[serde(default)]
    pub expected_error: Option<FixtureExpectedError>,
    #[serde(default)]
    pub expected_counts: Option<ExecutionCounts>,
}

enum Expectation<'a> {
    Frame(&'a FixtureFrame),
    Row(&'a Row),
    Error(&'a FixtureExpectedError),
}

impl PacketFixture {
    fn expectation(&self) -> Result<Expectation<'_>, HarnessError> {
        match (&self.expected_frame, &self.expected_row, &self.expected_error) {
            (Some(frame), None, None) => Ok(Expectation::Frame(frame)),
            (None, Some(row), None) => Ok(Expectation::Row(row)),
            (None, None, Some(error)) => Ok(Expectation::Error(error)),
            _ => Err(HarnessError::FixtureFormat(format!(
                "{}/{}: exactly one of expected_frame, expected_row, expected_error is required",
                self.packet_id, self.case_id
            ))),
        }
    }

    fn validate(&self) -> Result<(), HarnessError> {
        self.expectation()?;
        let row_step = self
            .post
            .iter()
            .position(|step| matches!(step, PostStep::IlocRow { .. }));
        if let Some(at) = row_step
            && at + 1 != self.post.len()
        {
            return Err(HarnessError::FixtureFormat(format!(
                "{}/{}: iloc_row must be the last post step",
                self.packet_id, self.case_id
            )));
        }
        Ok(())
    }

    fn policy(&self) -> RuntimePolicy {
        match self.mode {
            RuntimeMode::Strict => RuntimePolicy::strict(),
            RuntimeMode::Hardened => RuntimePolicy::hardened(
                self.fallback_row_cap.or(Some(DEFAULT_FALLBACK_ROW_CAP)),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftLevel {
    /// Hard parity failure.
    Critical,
    /// Within tolerance; fails the case only in strict harness mode.
    NonCritical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonCategory {
    Value,
    Shape,
    Index,
    Nullness,
    Error,
    Counts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftRecord {
    pub category: ComparisonCategory,
    pub level: DriftLevel,
    pub mismatch_class: String,
    pub location: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub packet_id: String,
    pub case_id: String,
    pub mode: RuntimeMode,
    pub status: CaseStatus,
    pub mismatch: Option<String>,
    #[serde(default)]
    pub mismatch_class: Option<String>,
    #[serde(default)]
    pub drift_records: Vec<DriftRecord>,
    #[serde(default)]
    pub elapsed_us: u64,
    #[serde(default)]
    pub counts: ExecutionCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketParityReport {
    pub suite: String,
    pub packet_id: Option<String>,
    pub fixture_count: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<CaseResult>,
}

impl PacketParityReport {
    #[must_use]
    pub fn is_green(&self) -> bool {
        self.failed == 0 && self.fixture_count > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketGateResult {
    pub packet_id: String,
    pub pass: bool,
    pub fixture_count: usize,
    pub strict_total: usize,
    pub strict_failed: usize,
    pub hardened_total: usize,
    pub hardened_failed: usize,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrittenPacketArtifacts {
    pub packet_id: String,
    pub parity_report_path: PathBuf,
    pub digest_path: PathBuf,
    pub gate_result_path: PathBuf,
    pub mismatch_corpus_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("fixture format error: {0}")]
    FixtureFormat(String),
    #[error("parity gates failed: {0}")]
    GateFailed(String),
}

#[derive(Debug, Deserialize)]
struct ParityGateConfig {
    packet_id: String,
    strict: StrictGateConfig,
    hardened: HardenedGateConfig,
    machine_check: MachineCheckConfig,
}

#[derive(Debug, Deserialize)]
struct StrictGateConfig {
    critical_drift_budget: usize,
    non_critical_drift_budget_percent: f64,
}

#[derive(Debug, Deserialize)]
struct HardenedGateConfig {
    divergence_budget_percent: f64,
}

#[derive(Debug, Deserialize)]
struct MachineCheckConfig {
    suite: String,
    require_fixture_count_at_least: usize,
    require_failed: usize,
}

fn comparison_category_slug(category: ComparisonCategory) -> &'static str {
    match category {
        ComparisonCategory::Value => "value",
        ComparisonCategory::Shape => "shape",
        ComparisonCategory::Index => "index",
        ComparisonCategory::Nullness => "nullness",
        ComparisonCategory::Error => "error",
        ComparisonCategory::Counts => "counts",
    }
}

fn drift_level_slug(level: DriftLevel) -> &'static str {
    match level {
        DriftLevel::Critical => "critical",
        DriftLevel::NonCritical => "non_critical",
    }
}

fn describe_ops(ops: &[BackendOp]) -> String {
    let ops = ops
        .iter()
        .map(|op| {
            let kind = match op.kind {
                BackendOpKind::Query => "query",
                BackendOpKind::Join => "join",
                BackendOpKind::Fallback => "fallback",
            };
            format!("{kind}:{}", op.operation)
        })
        .collect::<Vec<_>>();
    format!("[{}]", ops.join(", "))
}

fn make_drift_record(
    category: ComparisonCategory,
    level: DriftLevel,
    location: impl Into<String>,
    message: impl Into<String>,
) -> DriftRecord {
    DriftRecord {
        category,
        level,
        mismatch_class: format!(
            "{}_{}",
            comparison_category_slug(category),
            drift_level_slug(level)
        ),
        location: location.into(),
        message: message.into(),
    }
}

pub fn run_packet_suite(config: &HarnessConfig) -> Result<PacketParityReport, HarnessError> {
    let fixtures = load_fixtures(config, None)?;
    build_report(config, SUITE_ID.to_owned(), None, &fixtures)
}

pub fn run_packet_by_id(
    config: &HarnessConfig,
    packet_id: &str,
) -> Result<PacketParityReport, HarnessError> {
    let fixtures = load_fixtures(config, Some(packet_id))?;
    build_report(
        config,
        format!("{SUITE_ID}:{packet_id}"),
        Some(packet_id.to_owned()),
        &fixtures,
    )
}

pub fn run_packets_grouped(
    config: &HarnessConfig,
    packet_filter: Option<&str>,
) -> Result<Vec<PacketParityReport>, HarnessError> {
    let fixtures = load_fixtures(config, packet_filter)?;
    let mut grouped = BTreeMap::<String, Vec<PacketFixture>>::new();
    for fixture in fixtures {
        grouped
            .entry(fixture.packet_id.clone())
            .or_default()
            .push(fixture);
    }

    let mut reports = Vec::with_capacity(grouped.len());
    for (packet_id, packet_fixtures) in grouped {
        reports.push(build_report(
            config,
            format!("{SUITE_ID}:{packet_id}"),
            Some(packet_id),
            &packet_fixtures,
        )?);
    }
    Ok(reports)
}

pub fn enforce_packet_gates(
    config: &HarnessConfig,
    reports: &[PacketParityReport],
) -> Result<(), HarnessError> {
    let mut failures = Vec::new();
    for report in reports {
        let packet_id = report.packet_id.as_deref().unwrap_or("<unknown>");
        if !report.is_green() {
            failures.push(format!(
                "{packet_id}: parity report failed fixtures={}",
                report.failed
            ));
        }
        let gate = evaluate_parity_gate(config, report)?;
        if !gate.pass {
            failures.push(format!(
                "{packet_id}: gate failed reasons={}",
                gate.reasons.join("; ")
            ));
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(HarnessError::GateFailed(failures.join(" | ")))
    }
}

pub fn evaluate_parity_gate(
    config: &HarnessConfig,
    report: &PacketParityReport,
) -> Result<PacketGateResult, HarnessError> {
    let packet_id = report
        .packet_id
        .clone()
        .ok_or_else(|| HarnessError::FixtureFormat("report has no packet_id".to_owned()))?;
    let gate: ParityGateConfig =
        serde_yaml::from_str(&fs::read_to_string(config.parity_gate_path(&packet_id))?)?;

    let in_mode = |mode: RuntimeMode| {
        let total = report.results.iter().filter(|r| r.mode == mode).count();
        let failed = report
            .results
            .iter()
            .filter(|r| r.mode == mode && r.status == CaseStatus::Fail)
            .count();
        (total, failed)
    };
    let (strict_total, strict_failed) = in_mode(RuntimeMode::Strict);
    let (hardened_total, hardened_failed) = in_mode(RuntimeMode::Hardened);

    let mut reasons = Vec::new();
    if gate.packet_id != packet_id {
        reasons.push(format!(
            "packet_id mismatch between gate ({}) and report ({packet_id})",
            gate.packet_id
        ));
    }
    if gate.machine_check.suite != report.suite
        && !report.suite.starts_with(&gate.machine_check.suite)
    {
        reasons.push(format!(
            "suite mismatch: gate={}, report={}",
            gate.machine_check.suite, report.suite
        ));
    }
    if report.fixture_count < gate.machine_check.require_fixture_count_at_least {
        reasons.push(format!(
            "fixture_count={} below required {}",
            report.fixture_count, gate.machine_check.require_fixture_count_at_least
        ));
    }
    if report.failed != gate.machine_check.require_failed {
        reasons.push(format!(
            "failed={} but gate requires {}",
            report.failed, gate.machine_check.require_failed
        ));
    }
    if strict_failed > gate.strict.critical_drift_budget {
        reasons.push(format!(
            "strict_failed={strict_failed} exceeds critical_drift_budget={}",
            gate.strict.critical_drift_budget
        ));
    }
    let strict_failure_percent = percent(strict_failed, strict_total);
    if strict_failure_percent > gate.strict.non_critical_drift_budget_percent {
        reasons.push(format!(
            "strict failure percent {strict_failure_percent:.3}% exceeds {:.3}%",
            gate.strict.non_critical_drift_budget_percent
        ));
    }
    let hardened_failure_percent = percent(hardened_failed, hardened_total);
    if hardened_failure_percent > gate.hardened.divergence_budget_percent {
        reasons.push(format!(
            "hardened failure percent {hardened_failure_percent:.3}% exceeds {:.3}%",
            gate.hardened.divergence_budget_percent
        ));
    }

    Ok(PacketGateResult {
        packet_id,
        pass: reasons.is_empty(),
        fixture_count: report.fixture_count,
        strict_total,
        strict_failed,
        hardened_total,
        hardened_failed,
        reasons,
    })
}

/// Write the report, its SHA-256 digest, the gate verdict, and the failing
/// cases under `packet_artifact_root`.
pub fn write_packet_artifacts(
    config: &HarnessConfig,
    report: &PacketParityReport,
) -> Result<WrittenPacketArtifacts, HarnessError> {
    let packet_id = report
        .packet_id
        .as_deref()
        .ok_or_else(|| HarnessError::FixtureFormat("packet_id is required".to_owned()))?;

    let root = config.packet_artifact_root(packet_id);
    fs::create_dir_all(&root)?;

    let parity_report_path = root.join("parity_report.json");
    let report_json = serde_json::to_string_pretty(report)?;
    fs::write(&parity_report_path, &report_json)?;

    let digest_path = root.join("parity_report.sha256");
    fs::write(
        &digest_path,
        format!("{}  parity_report.json\n", hash_bytes(report_json.as_bytes())),
    )?;

    let gate_result = evaluate_parity_gate(config, report)?;
    let gate_result_path = root.join("parity_gate_result.json");
    fs::write(
        &gate_result_path,
        serde_json::to_string_pretty(&gate_result)?,
    )?;

    let mismatch_corpus_path = root.join("parity_mismatch_corpus.json");
    let mismatches = report
        .results
        .iter()
        .filter(|result| result.status == CaseStatus::Fail)
        .cloned()
        .collect::<Vec<_>>();
    let mismatch_payload = serde_json::json!({
        "packet_id": packet_id,
        "mismatch_count": mismatches.len(),
        "mismatches": mismatches,
    });
    fs::write(
        &mismatch_corpus_path,
        serde_json::to_string_pretty(&mismatch_payload)?,
    )?;

    info!("wrote conformance artifacts for {packet_id} to {}", root.display());
    Ok(WrittenPacketArtifacts {
        packet_id: packet_id.to_owned(),
        parity_report_path,
        digest_path,
        gate_result_path,
        mismatch_corpus_path,
    })
}

fn build_report(
    config: &HarnessConfig,
    suite: String,
    packet_id: Option<String>,
    fixtures: &[PacketFixture],
) -> Result<PacketParityReport, HarnessError> {
    let results = fixtures
        .iter()
        .map(|fixture| run_fixture(config, fixture))
        .collect::<Vec<_>>();

    let failed = results
        .iter()
        .filter(|result| result.status == CaseStatus::Fail)
        .count();
    let passed = results.len().saturating_sub(failed);

    Ok(PacketParityReport {
        suite,
        packet_id,
        fixture_count: results.len(),
        passed,
        failed,
        results,
    })
}

fn load_fixtures(
    config: &HarnessConfig,
    packet_filter: Option<&str>,
) -> Result<Vec<PacketFixture>, HarnessError> {
    let fixture_files = list_fixture_files(&config.packet_fixture_root())?;
    let mut fixtures = Vec::with_capacity(fixture_files.len());

    for fixture_path in fixture_files {
        let fixture = load_fixture(&fixture_path)?;
        if packet_filter.is_none_or(|packet| fixture.packet_id == packet) {
            fixtures.push(fixture);
        }
    }
    fixtures.sort_by(|a, b| a.case_id.cmp(&b.case_id));
    debug!(
        "loaded {} fixtures filter={}",
        fixtures.len(),
        packet_filter.unwrap_or("<all>")
    );
    Ok(fixtures)
}

fn load_fixture(path: &Path) -> Result<PacketFixture, HarnessError> {
    let body = fs::read_to_string(path)?;
    let fixture: PacketFixture = serde_json::from_str(&body)?;
    fixture.validate()?;
    Ok(fixture)
}

fn list_fixture_files(root: &Path) -> Result<Vec<PathBuf>, HarnessError> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(current)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

enum Outcome {
    Frame(DataFrame),
    Row(Row),
}

/// Run one fixture. Fixtures are validated at load time, so every failure
/// here is a parity drift rather than a harness error.
pub fn run_fixture(config: &HarnessConfig, fixture: &PacketFixture) -> CaseResult {
    let policy = fixture.policy();
    let mut ledger = ExecutionLedger::new();
    let started = Instant::now();
    let outcome = execute_fixture(fixture, &policy, &mut ledger);
    let elapsed_us = (started.elapsed().as_micros() as u64).max(1);

    let mut drifts = Vec::new();
    match fixture.expectation() {
        Ok(expected) => diff_outcome(&outcome, &expected, &mut drifts),
        Err(err) => drifts.push(make_drift_record(
            ComparisonCategory::Shape,
            DriftLevel::Critical,
            "fixture",
            err.to_string(),
        )),
    }

    let counts = ledger.counts();
    if let Some(expected_counts) = fixture.expected_counts
        && counts != expected_counts
    {
        drifts.push(make_drift_record(
            ComparisonCategory::Counts,
            DriftLevel::Critical,
            "ledger.counts",
            format!(
                "count mismatch: actual={counts:?}, expected={expected_counts:?}, ops={}",
                describe_ops(ledger.ops())
            ),
        ));
    }

    let failing = drifts
        .iter()
        .any(|d| d.level == DriftLevel::Critical || config.strict_mode);
    let mismatch = (!drifts.is_empty()).then(|| {
        drifts
            .iter()
            .map(|d| format!("[{:?}/{:?}] {}: {}", d.category, d.level, d.location, d.message))
            .collect::<Vec<_>>()
            .join("; ")
    });
    let mismatch_class = drifts
        .iter()
        .find(|d| d.level == DriftLevel::Critical)
        .or_else(|| drifts.first())
        .map(|d| d.mismatch_class.clone());

    if failing {
        warn!(
            "case {}/{} failed: {}",
            fixture.packet_id,
            fixture.case_id,
            mismatch.as_deref().unwrap_or_default()
        );
    }

    CaseResult {
        packet_id: fixture.packet_id.clone(),
        case_id: fixture.case_id.clone(),
        mode: fixture.mode,
        status: if failing {
            CaseStatus::Fail
        } else {
            CaseStatus::Pass
        },
        mismatch,
        mismatch_class,
        drift_records: drifts,
        elapsed_us,
        counts,
    }
}

fn execute_fixture(
    fixture: &PacketFixture,
    policy: &RuntimePolicy,
    ledger: &mut ExecutionLedger,
) -> Result<Outcome, FrameError> {
    let mut frame = fixture.frame.to_frame()?;
    for step in &fixture.pre {
        frame = match step {
            PreStep::SetIndex { column, drop } => frame.set_index(column, *drop)?,
            PreStep::SortValues { by, ascending } => frame.sort_values(by, *ascending)?,
        };
    }

    let mut frame = frame.dropna_with_policy(&fixture.dropna, policy, ledger)?;
    for step in &fixture.post {
        match step {
            PostStep::Iloc { positions } => {
                frame = frame.iloc_with_ledger(positions, ledger)?;
            }
            PostStep::IlocRow { position } => {
                return Ok(Outcome::Row(
                    frame.iloc_row_with_ledger(*position, ledger)?,
                ));
            }
        }
    }
    Ok(Outcome::Frame(frame))
}

fn diff_outcome(
    outcome: &Result<Outcome, FrameError>,
    expected: &Expectation<'_>,
    drifts: &mut Vec<DriftRecord>,
) {
    match (outcome, expected) {
        (Err(err), Expectation::Error(expected)) => diff_error(err, expected, drifts),
        (Ok(_), Expectation::Error(expected)) => drifts.push(make_drift_record(
            ComparisonCategory::Error,
            DriftLevel::Critical,
            "error",
            format!(
                "expected error containing {:?} but operation succeeded",
                expected.contains
            ),
        )),
        (Err(err), _) => drifts.push(make_drift_record(
            ComparisonCategory::Error,
            DriftLevel::Critical,
            "error",
            format!("unexpected error: {err}"),
        )),
        (Ok(Outcome::Frame(actual)), Expectation::Frame(expected)) => {
            diff_dataframe(actual, expected, drifts);
        }
        (Ok(Outcome::Row(actual)), Expectation::Row(expected)) => {
            diff_row(actual, expected, drifts);
        }
        (Ok(Outcome::Row(_)), Expectation::Frame(_)) => drifts.push(make_drift_record(
            ComparisonCategory::Shape,
            DriftLevel::Critical,
            "result",
            "expected a frame but the pipeline produced a row",
        )),
        (Ok(Outcome::Frame(_)), Expectation::Row(_)) => drifts.push(make_drift_record(
            ComparisonCategory::Shape,
            DriftLevel::Critical,
            "result",
            "expected a row but the pipeline produced a frame",
        )),
    }
}

fn diff_error(actual: &FrameError, expected: &FixtureExpectedError, drifts: &mut Vec<DriftRecord>) {
    let message = actual.to_string();
    if !message.contains(&expected.contains) {
        drifts.push(make_drift_record(
            ComparisonCategory::Error,
            DriftLevel::Critical,
            "error.message",
            format!(
                "message mismatch: actual={message:?}, expected to contain {:?}",
                expected.contains
            ),
        ));
    }

    if let Some(kind) = expected.kind {
        let actual_kind = match actual {
            FrameError::DropNa(err) => Some(err.kind()),
            _ => None,
        };
        if actual_kind != Some(kind) {
            drifts.push(make_drift_record(
                ComparisonCategory::Error,
                DriftLevel::Critical,
                "error.kind",
                format!("kind mismatch: actual={actual_kind:?}, expected={kind:?}"),
            ));
        }
    }
}

fn diff_dataframe(actual: &DataFrame, expected: &FixtureFrame, drifts: &mut Vec<DriftRecord>) {
    if actual.index().labels() != expected.index {
        drifts.push(make_drift_record(
            ComparisonCategory::Index,
            DriftLevel::Critical,
            "dataframe.index",
            format!(
                "index mismatch: actual={:?}, expected={:?}",
                actual.index().labels(),
                expected.index
            ),
        ));
    }

    if actual.positions().len() != actual.len() {
        drifts.push(make_drift_record(
            ComparisonCategory::Index,
            DriftLevel::Critical,
            "dataframe.positions",
            format!(
                "position index is not dense: len={}, rows={}",
                actual.positions().len(),
                actual.len()
            ),
        ));
    }

    let mut actual_names = actual.column_names().into_iter().cloned().collect::<Vec<_>>();
    let expected_names = if expected.column_order.is_empty() {
        actual_names.sort();
        expected.columns.keys().cloned().collect::<Vec<_>>()
    } else {
        expected.column_order.clone()
    };
    if actual_names != expected_names {
        drifts.push(make_drift_record(
            ComparisonCategory::Shape,
            DriftLevel::Critical,
            "dataframe.columns",
            format!("column mismatch: actual={actual_names:?}, expected={expected_names:?}"),
        ));
    }

    for (name, expected_values) in &expected.columns {
        let Some(column) = actual.column(name) else {
            drifts.push(make_drift_record(
                ComparisonCategory::Shape,
                DriftLevel::Critical,
                format!("dataframe.columns.{name}"),
                "column missing in actual result",
            ));
            continue;
        };

        let actual_values = column.values();
        if actual_values.len() != expected_values.len() {
            drifts.push(make_drift_record(
                ComparisonCategory::Shape,
                DriftLevel::Critical,
                format!("dataframe.columns.{name}.len"),
                format!(
                    "length mismatch: actual={}, expected={}",
                    actual_values.len(),
                    expected_values.len()
                ),
            ));
            continue;
        }

        diff_value_vectors(
            actual_values,
            expected_values,
            &format!("dataframe.columns.{name}.values"),
            drifts,
        );
    }
}

fn diff_row(actual: &Row, expected: &Row, drifts: &mut Vec<DriftRecord>) {
    if actual.label != expected.label {
        drifts.push(make_drift_record(
            ComparisonCategory::Index,
            DriftLevel::Critical,
            "row.label",
            format!(
                "label mismatch: actual={:?}, expected={:?}",
                actual.label, expected.label
            ),
        ));
    }

    let actual_names = actual.cells.iter().map(|(name, _)| name).collect::<Vec<_>>();
    let expected_names = expected.cells.iter().map(|(name, _)| name).collect::<Vec<_>>();
    if actual_names != expected_names {
        drifts.push(make_drift_record(
            ComparisonCategory::Shape,
            DriftLevel::Critical,
            "row.cells",
            format!("cell mismatch: actual={actual_names:?}, expected={expected_names:?}"),
        ));
        return;
    }

    let actual_values = actual.cells.iter().map(|(_, v)| v.clone()).collect::<Vec<_>>();
    let expected_values = expected.cells.iter().map(|(_, v)| v.clone()).collect::<Vec<_>>();
    diff_value_vectors(&actual_values, &expected_values, "row.values", drifts);
}

fn diff_value_vectors(
    actual: &[Scalar],
    expected: &[Scalar],
    prefix: &str,
    drifts: &mut Vec<DriftRecord>,
) {
    for (idx, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        if a.semantic_eq(e) {
            continue;
        }
        let location = format!("{prefix}[{idx}]");
        if a.is_missing() != e.is_missing() {
            drifts.push(make_drift_record(
                ComparisonCategory::Nullness,
                DriftLevel::Critical,
                location,
                format!("nullness mismatch: actual={a:?}, expected={e:?}"),
            ));
        } else {
            drifts.push(make_drift_record(
                ComparisonCategory::Value,
                classify_value_drift(a, e),
                location,
                format!("value mismatch: actual={a:?}, expected={e:?}"),
            ));
        }
    }
}

fn classify_value_drift(actual: &Scalar, expected: &Scalar) -> DriftLevel {
    match (actual, expected) {
        (Scalar::Float64(a), Scalar::Float64(e)) => {
            let max_abs = a.abs().max(e.abs()).max(1.0);
            if (a - e).abs() / max_abs < 1e-10 {
                DriftLevel::NonCritical
            } else {
                DriftLevel::Critical
            }
        }
        _ => DriftLevel::Critical,
    }
}

fn percent(failed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (failed as f64 / total as f64) * 100.0
    }
}

fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or(0)
}

// === Suite orchestration + forensic log ===

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ForensicEventKind {
    SuiteStart {
        suite: String,
        packet_filter: Option<String>,
    },
    SuiteEnd {
        suite: String,
        total_fixtures: usize,
        passed: usize,
        failed: usize,
    },
    PacketStart {
        packet_id: String,
    },
    PacketEnd {
        packet_id: String,
        fixtures: usize,
        passed: usize,
        failed: usize,
        gate_pass: bool,
    },
    CaseEnd {
        packet_id: String,
        case_id: String,
        mode: RuntimeMode,
        status: CaseStatus,
        mismatch_class: Option<String>,
        counts: ExecutionCounts,
        elapsed_us: u64,
    },
    GateEvaluated {
        packet_id: String,
        pass: bool,
        reasons: Vec<String>,
    },
    ArtifactWritten {
        packet_id: String,
        artifact_kind: String,
        path: String,
    },
    Error {
        phase: String,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForensicEvent {
    pub ts_unix_ms: u64,
    pub event: ForensicEventKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForensicLog {
    pub events: Vec<ForensicEvent>,
}

impl ForensicLog {
    #[must_use]
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn record(&mut self, event: ForensicEventKind) {
        self.events.push(ForensicEvent {
            ts_unix_ms: now_unix_ms(),
            event,
        });
    }

    /// Write the log as JSONL, one event per line.
    pub fn write_jsonl(&self, path: &Path) -> Result<(), HarnessError> {
        let mut file = fs::File::create(path)?;
        for entry in &self.events {
            let line = serde_json::to_string(entry)?;
            writeln!(file, "{line}")?;
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct E2eConfig {
    pub harness: HarnessConfig,
    pub packet_filter: Option<String>,
    pub write_artifacts: bool,
    pub enforce_gates: bool,
    pub forensic_log_path: Option<PathBuf>,
}

impl E2eConfig {
    #[must_use]
    pub fn new(harness: HarnessConfig) -> Self {
        Self {
            harness,
            packet_filter: None,
            write_artifacts: false,
            enforce_gates: false,
            forensic_log_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct E2eReport {
    pub suite: String,
    pub packet_reports: Vec<PacketParityReport>,
    pub artifacts_written: Vec<WrittenPacketArtifacts>,
    pub gate_results: Vec<PacketGateResult>,
    pub gates_pass: bool,
    pub forensic_log: ForensicLog,
    pub total_fixtures: usize,
    pub total_passed: usize,
    pub total_failed: usize,
}

impl E2eReport {
    #[must_use]
    pub fn is_green(&self) -> bool {
        self.total_failed == 0 && self.total_fixtures > 0 && self.gates_pass
    }
}

/// Run every packet, evaluate its gate, optionally write artifacts, and
/// collect forensic events. The log is written before gate enforcement can
/// fail the run.
pub fn run_e2e_suite(config: &E2eConfig) -> Result<E2eReport, HarnessError> {
    let mut forensic = ForensicLog::new();
    let suite = config
        .packet_filter
        .as_deref()
        .map_or_else(|| SUITE_ID.to_owned(), |packet| format!("{SUITE_ID}:{packet}"));

    forensic.record(ForensicEventKind::SuiteStart {
        suite: suite.clone(),
        packet_filter: config.packet_filter.clone(),
    });

    let reports = run_packets_grouped(&config.harness, config.packet_filter.as_deref())?;

    let mut gate_results = Vec::with_capacity(reports.len());
    for report in &reports {
        let packet_id = report
            .packet_id
            .clone()
            .unwrap_or_else(|| "unknown".to_owned());
        forensic.record(ForensicEventKind::PacketStart {
            packet_id: packet_id.clone(),
        });

        for result in &report.results {
            forensic.record(ForensicEventKind::CaseEnd {
                packet_id: result.packet_id.clone(),
                case_id: result.case_id.clone(),
                mode: result.mode,
                status: result.status.clone(),
                mismatch_class: result.mismatch_class.clone(),
                counts: result.counts,
                elapsed_us: result.elapsed_us,
            });
        }

        let gate = evaluate_parity_gate(&config.harness, report)?;
        forensic.record(ForensicEventKind::GateEvaluated {
            packet_id: packet_id.clone(),
            pass: gate.pass,
            reasons: gate.reasons.clone(),
        });
        forensic.record(ForensicEventKind::PacketEnd {
            packet_id,
            fixtures: report.fixture_count,
            passed: report.passed,
            failed: report.failed,
            gate_pass: gate.pass,
        });
        gate_results.push(gate);
    }

    let mut artifacts_written = Vec::new();
    if config.write_artifacts {
        for report in &reports {
            let written = write_packet_artifacts(&config.harness, report)?;
            for (kind, path) in [
                ("parity_report", &written.parity_report_path),
                ("digest", &written.digest_path),
                ("gate_result", &written.gate_result_path),
                ("mismatch_corpus", &written.mismatch_corpus_path),
            ] {
                forensic.record(ForensicEventKind::ArtifactWritten {
                    packet_id: written.packet_id.clone(),
                    artifact_kind: kind.to_owned(),
                    path: path.display().to_string(),
                });
            }
            artifacts_written.push(written);
        }
    }

    let gates_pass = gate_results.iter().all(|gate| gate.pass);
    let enforcement = if config.enforce_gates {
        enforce_packet_gates(&config.harness, &reports)
    } else {
        Ok(())
    };
    if let Err(err) = &enforcement {
        forensic.record(ForensicEventKind::Error {
            phase: "gate_enforcement".to_owned(),
            message: err.to_string(),
        });
    }

    let total_fixtures = reports.iter().map(|r| r.fixture_count).sum();
    let total_passed = reports.iter().map(|r| r.passed).sum();
    let total_failed = reports.iter().map(|r| r.failed).sum();
    forensic.record(ForensicEventKind::SuiteEnd {
        suite: suite.clone(),
        total_fixtures,
        passed: total_passed,
        failed: total_failed,
    });

    if let Some(path) = &config.forensic_log_path {
        forensic.write_jsonl(path)?;
    }
    enforcement?;

    Ok(E2eReport {
        suite,
        packet_reports: reports,
        artifacts_written,
        gate_results,
        gates_pass,
        forensic_log: forensic,
        total_fixtures,
        total_passed,
        total_failed,
    })
}
