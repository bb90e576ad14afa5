//! Report Emitter.
//!
//! Rendering is pure: the same [`WorkflowResult`] always renders to the same
//! bytes (timestamps come from the result, never from the clock). Writing
//! overwrites previous reports and never fails the run; a destination that
//! cannot be written is logged and reported back to the caller.

use crate::config::{ActorSet, RunConfig};
use crate::result::VerificaResult;
use crate::scenario::Scenario;
use crate::step::StepOutcome;
use crate::workflow::{StepRecord, StepStatus, WorkflowResult};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Glyph for a step status
#[must_use]
pub const fn glyph(status: &StepStatus) -> &'static str {
    match status {
        StepStatus::Executed(outcome) => match outcome.outcome {
            crate::classifier::Outcome::Success => "✅",
            crate::classifier::Outcome::Failure => "❌",
            crate::classifier::Outcome::Indeterminate => "⚠️",
        },
        StepStatus::Skipped(_) => "⏭️",
    }
}

/// `passed/total (rate%)`
#[must_use]
pub fn pass_rate_line(result: &WorkflowResult) -> String {
    format!(
        "{}/{} ({:.1}%)",
        result.passed(),
        result.total(),
        result.pass_rate()
    )
}

fn title(result: &WorkflowResult) -> String {
    match result.workflow.parse::<Scenario>() {
        Ok(Scenario::Assignment | Scenario::Existing) => "티켓 자동 할당 테스트 결과".to_string(),
        Ok(scenario) => format!("{} 결과", scenario.description()),
        Err(_) => format!("{} 결과", result.workflow),
    }
}

fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\n', '\r'], " ")
}

fn executed(record: &StepRecord) -> Option<&StepOutcome> {
    match &record.status {
        StepStatus::Executed(outcome) => Some(outcome),
        StepStatus::Skipped(_) => None,
    }
}

/// Render the markdown report
#[must_use]
pub fn render_markdown(result: &WorkflowResult) -> String {
    let mut out = String::new();
    // writing to a String cannot fail
    let _ = write_markdown(&mut out, result);
    out
}

fn write_markdown(out: &mut String, result: &WorkflowResult) -> std::fmt::Result {
    writeln!(out, "# {}\n", title(result))?;
    writeln!(
        out,
        "**테스트 일시:** {}  ",
        result.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    )?;
    writeln!(out, "**실행 ID:** `{}`  ", result.run_id)?;
    writeln!(out, "**대상:** {}  ", result.base_url)?;
    writeln!(out, "**시나리오:** {}\n", result.workflow)?;

    if let Some(reason) = &result.aborted {
        writeln!(
            out,
            "> **실행 중단:** {reason}\n> 이후 단계는 SKIPPED로 기록되었습니다.\n"
        )?;
    }

    writeln!(out, "## 테스트 시나리오\n")?;
    for (i, record) in result.entries.iter().enumerate() {
        writeln!(out, "{}. {}", i + 1, record.description)?;
    }

    writeln!(out, "\n## 테스트 결과\n")?;
    for record in &result.entries {
        writeln!(
            out,
            "- {} {}: {}",
            glyph(&record.status),
            record.status.label(),
            record.description
        )?;
    }
    writeln!(out, "\n**성공률:** {}  ", pass_rate_line(result))?;
    writeln!(
        out,
        "**필수 단계 통과:** {}\n",
        if result.all_mandatory_passed() { "예" } else { "아니오" }
    )?;

    writeln!(out, "## 증거\n")?;
    writeln!(out, "| 단계 | 결과 | 규칙 | URL | 스크린샷 | 내용 |")?;
    writeln!(out, "|------|------|------|-----|----------|------|")?;
    for record in &result.entries {
        match executed(record) {
            Some(outcome) => {
                let ev = &outcome.evidence;
                let shot = ev
                    .screenshot
                    .as_ref()
                    .map(|p| format!("`{}`", p.display()))
                    .unwrap_or_default();
                let mut content = ev.snippet.clone();
                if let Some(note) = &ev.note {
                    if !content.is_empty() {
                        content.push_str(" / ");
                    }
                    content.push_str(note);
                }
                writeln!(
                    out,
                    "| {} | {} | {} | {} | {} | {} |",
                    record.name,
                    outcome.outcome,
                    cell(&outcome.rule),
                    cell(&ev.url),
                    shot,
                    cell(&content)
                )?;
            }
            None => writeln!(out, "| {} | SKIPPED | | | | |", record.name)?,
        }
    }

    if result.workflow == Scenario::Credentials.as_str() {
        writeln!(out, "\n## 사용 가능한 계정\n")?;
        let working: Vec<&StepRecord> = result
            .entries
            .iter()
            .filter(|r| r.name.as_str().starts_with("login#") && r.status.is_success())
            .collect();
        if working.is_empty() {
            writeln!(out, "로그인에 성공한 계정이 없습니다.")?;
        }
        for record in working {
            writeln!(out, "- {}", record.description)?;
        }
    }

    writeln!(out, "\n## 검증 사항\n")?;
    for record in &result.entries {
        let mark = if record.status.is_success() { "x" } else { " " };
        writeln!(out, "- [{mark}] {}", record.description)?;
    }
    for item in &result.manual_checks {
        writeln!(out, "- [ ] {item}")?;
    }

    if let Some(sql) = &result.follow_up_sql {
        writeln!(out, "\n## 추가 확인 필요\n")?;
        writeln!(out, "다음 항목은 DB에서 직접 확인이 필요합니다:\n")?;
        writeln!(out, "```sql\n{sql}\n```")?;
    }
    Ok(())
}

/// Render the machine-readable summary.
///
/// # Errors
///
/// Returns a JSON error if serialization fails.
pub fn render_summary_json(result: &WorkflowResult) -> VerificaResult<String> {
    let mut value = serde_json::to_value(result)?;
    if let Some(map) = value.as_object_mut() {
        map.insert("passed".into(), result.passed().into());
        map.insert("total".into(), result.total().into());
        map.insert("pass_rate".into(), result.pass_rate().into());
        map.insert(
            "all_mandatory_passed".into(),
            result.all_mandatory_passed().into(),
        );
    }
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Render the accounts sheet written after provisioning
#[must_use]
pub fn render_accounts(actors: &ActorSet, result: &WorkflowResult) -> String {
    let status = |step: &str| {
        result
            .get(step)
            .map_or("NOT RUN", StepStatus::label)
            .to_string()
    };
    let mut out = String::from("=== Test Accounts ===\n");
    for (heading, actor, step) in [
        ("Customer", &actors.customer, "registerCustomer"),
        ("Agent", &actors.agent, "createAgent"),
    ] {
        let _ = write!(
            out,
            "\n{heading}:\n  Email: {}\n  Password: {}\n  Name: {}\n  Status: {}\n",
            actor.email,
            actor.password,
            actor.display_name,
            status(step)
        );
    }
    out
}

/// Where reports go
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEmitter {
    report_path: PathBuf,
    summary_path: Option<PathBuf>,
    accounts: Option<(PathBuf, ActorSet)>,
}

/// What [`ReportEmitter::emit`] managed to write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmitSummary {
    /// Files written
    pub written: Vec<PathBuf>,
    /// Files that could not be written, with the error
    pub failed: Vec<(PathBuf, String)>,
}

impl EmitSummary {
    /// Whether every file was written
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl ReportEmitter {
    /// Emit the markdown report to `report_path`
    #[must_use]
    pub fn new(report_path: impl Into<PathBuf>) -> Self {
        Self {
            report_path: report_path.into(),
            summary_path: None,
            accounts: None,
        }
    }

    /// Everything a run of `scenario` under `config` produces
    #[must_use]
    pub fn for_run(config: &RunConfig, scenario: Scenario) -> Self {
        let emitter = Self::new(&config.report_path).with_summary(config.summary_path());
        if scenario.writes_accounts() {
            emitter.with_accounts(&config.accounts_path, config.actors.clone())
        } else {
            emitter
        }
    }

    /// Also emit the JSON summary
    #[must_use]
    pub fn with_summary(mut self, path: impl Into<PathBuf>) -> Self {
        self.summary_path = Some(path.into());
        self
    }

    /// Also emit the accounts sheet
    #[must_use]
    pub fn with_accounts(mut self, path: impl Into<PathBuf>, actors: ActorSet) -> Self {
        self.accounts = Some((path.into(), actors));
        self
    }

    /// Write every configured artifact. Never fails; see [`EmitSummary`].
    pub fn emit(&self, result: &WorkflowResult) -> EmitSummary {
        let mut summary = EmitSummary::default();
        write_artifact(&mut summary, &self.report_path, Ok(render_markdown(result)));
        if let Some(path) = &self.summary_path {
            write_artifact(&mut summary, path, render_summary_json(result));
        }
        if let Some((path, actors)) = &self.accounts {
            write_artifact(&mut summary, path, Ok(render_accounts(actors, result)));
        }
        summary
    }
}

fn write_artifact(summary: &mut EmitSummary, path: &Path, content: VerificaResult<String>) {
    let written = content.and_then(|content| {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    });
    match written {
        Ok(()) => {
            info!(path = %path.display(), "report written");
            summary.written.push(path.to_path_buf());
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not write report");
            summary.failed.push((path.to_path_buf(), e.to_string()));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::classifier::Outcome;
    use crate::step::{Evidence, StepName};
    use crate::workflow::SkipReason;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn record(name: &str, description: &str, mandatory: bool, status: StepStatus) -> StepRecord {
        StepRecord {
            name: StepName::from(name),
            description: description.to_string(),
            mandatory,
            status,
        }
    }

    fn executed(outcome: Outcome, url: &str, snippet: &str) -> StepStatus {
        StepStatus::Executed(StepOutcome {
            outcome,
            rule: "rule".to_string(),
            evidence: Evidence {
                url: url.to_string(),
                snippet: snippet.to_string(),
                screenshot: Some(PathBuf::from("test-screenshots/01_x.png")),
                note: None,
            },
        })
    }

    fn sample() -> WorkflowResult {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap();
        WorkflowResult {
            run_id: Uuid::nil(),
            workflow: "assignment".to_string(),
            base_url: "http://localhost:3002/".to_string(),
            started_at: at,
            finished_at: at,
            entries: vec![
                record(
                    "loginCustomer",
                    "Customer 로그인",
                    true,
                    executed(Outcome::Success, "http://localhost:3002/dashboard", "대시보드"),
                ),
                record(
                    "createTicket",
                    "새 티켓 생성",
                    true,
                    executed(Outcome::Failure, "http://localhost:3002/tickets/new", "제목 | 필수"),
                ),
                record(
                    "checkAssignment",
                    "자동 할당 확인",
                    false,
                    StepStatus::Skipped(SkipReason::Unmet {
                        steps: vec!["createTicket".into()],
                    }),
                ),
                record("logout", "Customer 로그아웃", true, executed(Outcome::Indeterminate, "", "")),
            ],
            manual_checks: vec!["SLA 마감 시간 설정됨 (수동 확인 필요)".to_string()],
            follow_up_sql: Some("SELECT 1;".to_string()),
            aborted: None,
        }
    }

    mod markdown_tests {
        use super::*;

        #[test]
        fn test_step_lines_use_glyphs() {
            let md = render_markdown(&sample());
            assert!(md.starts_with("# 티켓 자동 할당 테스트 결과\n"));
            assert!(md.contains("- ✅ SUCCESS: Customer 로그인"));
            assert!(md.contains("- ❌ FAILURE: 새 티켓 생성"));
            assert!(md.contains("- ⏭️ SKIPPED: 자동 할당 확인"));
            assert!(md.contains("- ⚠️ INDETERMINATE: Customer 로그아웃"));
        }

        #[test]
        fn test_pass_rate_and_status() {
            let md = render_markdown(&sample());
            assert!(md.contains("**성공률:** 1/4 (25.0%)"));
            assert!(md.contains("**필수 단계 통과:** 아니오"));
        }

        #[test]
        fn test_checklist_and_sql() {
            let md = render_markdown(&sample());
            assert!(md.contains("- [x] Customer 로그인"));
            assert!(md.contains("- [ ] 새 티켓 생성"));
            assert!(md.contains("- [ ] SLA 마감 시간 설정됨 (수동 확인 필요)"));
            assert!(md.contains("```sql\nSELECT 1;\n```"));
        }

        #[test]
        fn test_evidence_cells_are_escaped() {
            let md = render_markdown(&sample());
            assert!(md.contains("제목 \\| 필수"));
            assert!(md.contains("| checkAssignment | SKIPPED | | | | |"));
            assert!(md.contains("`test-screenshots/01_x.png`"));
        }

        #[test]
        fn test_rendering_is_deterministic() {
            let result = sample();
            assert_eq!(render_markdown(&result), render_markdown(&result));
            assert!(render_markdown(&result).contains("2026-10-16 09:30:00 UTC"));
        }

        #[test]
        fn test_abort_note() {
            let mut result = sample();
            result.aborted = Some("Browser driver fault: crashed".to_string());
            let md = render_markdown(&result);
            assert!(md.contains("**실행 중단:** Browser driver fault: crashed"));
        }

        #[test]
        fn test_credentials_section() {
            let mut result = sample();
            result.workflow = "credentials".to_string();
            result.entries = vec![
                record("login#1", "a@x / pw (customer)", false, executed(Outcome::Success, "", "")),
                record("login#2", "b@x / pw (agent)", false, executed(Outcome::Failure, "", "")),
            ];
            let md = render_markdown(&result);
            assert!(md.starts_with("# 테스트 계정 로그인 확인 결과"));
            let start = md.find("## 사용 가능한 계정").unwrap();
            let end = md.find("## 검증 사항").unwrap();
            let section = &md[start..end];
            assert!(section.contains("- a@x / pw (customer)"));
            assert!(!section.contains("b@x"));
        }
    }

    mod summary_tests {
        use super::*;

        #[test]
        fn test_summary_json_fields() {
            let json: serde_json::Value =
                serde_json::from_str(&render_summary_json(&sample()).unwrap()).unwrap();
            assert_eq!(json["passed"], 1);
            assert_eq!(json["total"], 4);
            assert_eq!(json["all_mandatory_passed"], false);
            assert_eq!(json["entries"][1]["outcome"], "FAILURE");
        }

        #[test]
        fn test_accounts_sheet() {
            let sheet = render_accounts(&ActorSet::default(), &sample());
            assert!(sheet.starts_with("=== Test Accounts ===\n"));
            assert!(sheet.contains("  Email: agent1@example.com\n"));
            assert!(sheet.contains("  Status: NOT RUN\n"));
        }
    }

    mod emitter_tests {
        use super::*;

        #[test]
        fn test_emit_overwrites() {
            let dir = tempfile::tempdir().unwrap();
            let report = dir.path().join("docs/report.md");
            std::fs::create_dir_all(report.parent().unwrap()).unwrap();
            std::fs::write(&report, "old report").unwrap();

            let summary = ReportEmitter::new(&report)
                .with_summary(dir.path().join("docs/report.json"))
                .emit(&sample());
            assert!(summary.is_complete());
            assert_eq!(summary.written.len(), 2);
            let content = std::fs::read_to_string(&report).unwrap();
            assert!(!content.contains("old report"));
        }

        #[test]
        fn test_for_run_adds_accounts_only_when_provisioning() {
            let config = RunConfig::default();
            let plain = ReportEmitter::for_run(&config, Scenario::Assignment);
            assert!(plain.accounts.is_none());
            assert_eq!(plain.summary_path, Some(config.summary_path()));
            let provision = ReportEmitter::for_run(&config, Scenario::Provision);
            assert_eq!(
                provision.accounts.map(|(p, _)| p),
                Some(config.accounts_path.clone())
            );
        }

        #[test]
        fn test_unwritable_destination_is_reported_not_raised() {
            let dir = tempfile::tempdir().unwrap();
            // a file where a directory is expected
            let blocker = dir.path().join("blocker");
            std::fs::write(&blocker, "x").unwrap();
            let summary = ReportEmitter::new(blocker.join("report.md"))
                .with_accounts(dir.path().join("accounts.txt"), ActorSet::default())
                .emit(&sample());
            assert_eq!(summary.failed.len(), 1);
            assert_eq!(summary.written, vec![dir.path().join("accounts.txt")]);
        }
    }
}
