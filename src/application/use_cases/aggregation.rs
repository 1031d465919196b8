use crate::domain::test_case::{TestCase, TestCaseStatus};
use crate::domain::test_session::{SessionStatus, SessionSummary, TestSession};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

// ============================================================
// PER-SESSION SUMMARY
// ============================================================

/// Reduces a session's test cases into status counts.
///
/// Always recomputed from the full collection. A case carrying an unrecognized
/// status counts toward `total` but lands in no bucket.
pub fn summarize(cases: &[TestCase]) -> SessionSummary {
    let mut summary = SessionSummary {
        total: cases.len() as u32,
        ..Default::default()
    };

    for case in cases {
        match &case.status {
            TestCaseStatus::Pass => summary.pass += 1,
            TestCaseStatus::Fail => summary.fail += 1,
            TestCaseStatus::FailKnown => summary.fail_known += 1,
            TestCaseStatus::NotApplicable => summary.na += 1,
            TestCaseStatus::Untested => summary.untested += 1,
            TestCaseStatus::Unrecognized(label) => {
                warn!(
                    test_case_id = %case.id,
                    status = %label,
                    "Test case carries an unrecognized status; excluded from summary buckets"
                );
            }
        }
    }

    summary
}

impl SessionSummary {
    pub fn completed_count(&self) -> u32 {
        self.pass + self.fail + self.na + self.fail_known
    }

    /// Rounded percentage of test cases with a terminal status; 0 for an empty session.
    pub fn completion_percent(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((self.completed_count() as f64 / self.total as f64) * 100.0).round() as u32
    }
}

// ============================================================
// CROSS-SESSION OVERVIEW
// ============================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct OverviewStats {
    pub pass: u64,
    pub fail: u64,
    pub fail_known: u64,
    pub na: u64,
    pub untested: u64,
}

impl OverviewStats {
    fn absorb(&mut self, summary: &SessionSummary) {
        self.pass += u64::from(summary.pass);
        self.fail += u64::from(summary.fail);
        self.fail_known += u64::from(summary.fail_known);
        self.na += u64::from(summary.na);
        self.untested += u64::from(summary.untested);
    }
}

/// Sums bucket counts across sessions. A session without a summary contributes nothing.
pub fn overview<'a, I>(sessions: I) -> OverviewStats
where
    I: IntoIterator<Item = &'a TestSession>,
{
    let mut stats = OverviewStats::default();
    for session in sessions {
        if let Some(summary) = &session.summary {
            stats.absorb(summary);
        }
    }
    stats
}

// ============================================================
// DASHBOARD PARTITION
// ============================================================

pub struct SessionGroups<'a> {
    pub active: Vec<&'a TestSession>,
    pub completed: Vec<&'a TestSession>,
}

/// Splits sessions into active (In Progress, Aborted) and completed, keeping input order.
pub fn partition(sessions: &[TestSession]) -> SessionGroups<'_> {
    let (active, completed): (Vec<&TestSession>, Vec<&TestSession>) = sessions
        .iter()
        .partition(|session| session.status.is_active());
    SessionGroups { active, completed }
}

// ============================================================
// PER-PLATFORM ROLLUP
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlatformHealth {
    pub platform_name: String,
    pub total: u64,
    pub pass: u64,
    pub fail: u64,
    pub fail_known: u64,
    pub na: u64,
    /// `pass / (pass + fail + failKnown)`; absent when nothing has been executed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_rate: Option<f64>,
}

pub fn platform_rollup(sessions: &[TestSession]) -> Vec<PlatformHealth> {
    let mut groups: BTreeMap<&'static str, PlatformHealth> = BTreeMap::new();

    for session in sessions {
        let name = session.platform_details.platform_name.label();
        let entry = groups.entry(name).or_insert_with(|| PlatformHealth {
            platform_name: name.to_string(),
            total: 0,
            pass: 0,
            fail: 0,
            fail_known: 0,
            na: 0,
            pass_rate: None,
        });
        if let Some(summary) = &session.summary {
            entry.total += u64::from(summary.total);
            entry.pass += u64::from(summary.pass);
            entry.fail += u64::from(summary.fail);
            entry.fail_known += u64::from(summary.fail_known);
            entry.na += u64::from(summary.na);
        }
    }

    let mut rollup: Vec<PlatformHealth> = groups
        .into_values()
        .filter(|group| group.total > 0)
        .map(|mut group| {
            let executed = group.pass + group.fail + group.fail_known;
            group.pass_rate = if executed > 0 {
                Some(group.pass as f64 / executed as f64)
            } else {
                None
            };
            group
        })
        .collect();

    // Stable sort keeps the alphabetical order from the map for equal totals.
    rollup.sort_by(|a, b| b.total.cmp(&a.total));
    rollup
}

// ============================================================
// DASHBOARD VIEW
// ============================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionCard {
    pub id: String,
    pub platform_name: String,
    pub status: SessionStatus,
    pub created_at: i64,
    pub completion: u32,
    pub summary: SessionSummary,
}

impl SessionCard {
    fn from_session(session: &TestSession) -> Self {
        let summary = session.summary.unwrap_or_default();
        Self {
            id: session.id.clone(),
            platform_name: session
                .platform_details
                .custom_platform_name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| session.platform_details.platform_name.label().to_string()),
            status: session.status,
            created_at: session.created_at,
            completion: summary.completion_percent(),
            summary,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub active: Vec<SessionCard>,
    pub completed: Vec<SessionCard>,
    pub overview: OverviewStats,
    pub platforms: Vec<PlatformHealth>,
}

/// Everything the dashboard renders, derived from one snapshot of the owner's sessions.
pub fn dashboard_view(sessions: &[TestSession]) -> DashboardView {
    let groups = partition(sessions);
    DashboardView {
        active: groups.active.into_iter().map(SessionCard::from_session).collect(),
        completed: groups
            .completed
            .into_iter()
            .map(SessionCard::from_session)
            .collect(),
        overview: overview(sessions),
        platforms: platform_rollup(sessions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_session::{Platform, PlatformDetails};

    fn case(index: u32, status: TestCaseStatus) -> TestCase {
        TestCase {
            id: format!("tc-{}", index),
            order_index: index,
            test_bed: String::new(),
            test_case_title: format!("Case {}", index),
            test_steps: String::new(),
            expected_result: String::new(),
            actual_result: None,
            notes: None,
            status,
            bug_id: None,
            na_reason: None,
            attachments: None,
            last_modified: 0,
        }
    }

    fn cases(statuses: &[TestCaseStatus]) -> Vec<TestCase> {
        statuses
            .iter()
            .enumerate()
            .map(|(index, status)| case(index as u32, status.clone()))
            .collect()
    }

    fn session(
        id: &str,
        platform: Platform,
        status: SessionStatus,
        summary: Option<SessionSummary>,
    ) -> TestSession {
        TestSession {
            id: id.to_string(),
            user_id: "owner".to_string(),
            user_name: "Tester".to_string(),
            platform_details: PlatformDetails {
                platform_name: platform,
                device_model: None,
                os_version: None,
                app_version: None,
                browser_name: None,
                browser_version: None,
                custom_platform_name: None,
            },
            test_cases: Vec::new(),
            status,
            created_at: 0,
            updated_at: 0,
            completed_at: None,
            summary,
            reason_for_incompletion: None,
        }
    }

    fn summary(pass: u32, fail: u32, fail_known: u32, na: u32, untested: u32) -> SessionSummary {
        SessionSummary {
            total: pass + fail + fail_known + na + untested,
            pass,
            fail,
            fail_known,
            na,
            untested,
        }
    }

    #[test]
    fn test_summarize_reference_scenario() {
        use TestCaseStatus::*;
        let summary = summarize(&cases(&[Pass, Pass, Fail, NotApplicable, Untested]));

        assert_eq!(
            summary,
            SessionSummary {
                total: 5,
                pass: 2,
                fail: 1,
                fail_known: 0,
                na: 1,
                untested: 1,
            }
        );
        assert_eq!(summary.completion_percent(), 80);
    }

    #[test]
    fn test_summarize_buckets_partition_total() {
        use TestCaseStatus::*;
        let collections = [
            vec![],
            vec![Untested],
            vec![FailKnown, FailKnown, Pass],
            vec![Pass, Fail, FailKnown, NotApplicable, Untested, Untested, Pass],
        ];
        for statuses in collections.iter() {
            let summary = summarize(&cases(statuses));
            assert_eq!(summary.total as usize, statuses.len());
            assert_eq!(
                summary.pass + summary.fail + summary.fail_known + summary.na + summary.untested,
                summary.total
            );
        }
    }

    #[test]
    fn test_summarize_is_idempotent() {
        use TestCaseStatus::*;
        let collection = cases(&[Pass, FailKnown, Untested, NotApplicable]);
        assert_eq!(summarize(&collection), summarize(&collection));
    }

    #[test]
    fn test_unrecognized_status_counts_in_no_bucket() {
        use TestCaseStatus::*;
        let summary = summarize(&cases(&[Pass, Unrecognized("Blocked".to_string())]));
        assert_eq!(summary.total, 2);
        assert_eq!(summary.pass, 1);
        assert_eq!(summary.untested, 0);
        assert_eq!(summary.completion_percent(), 50);
    }

    #[test]
    fn test_completion_zero_for_empty_session() {
        assert_eq!(SessionSummary::default().completion_percent(), 0);
    }

    #[test]
    fn test_completion_rounds_to_nearest() {
        // 2 of 3 completed -> 66.67 -> 67
        assert_eq!(summary(1, 1, 0, 0, 1).completion_percent(), 67);
        // 1 of 8 completed -> 12.5 -> 13
        assert_eq!(summary(0, 0, 1, 0, 7).completion_percent(), 13);
    }

    #[test]
    fn test_overview_of_empty_set_is_zero() {
        let stats = overview(&Vec::<TestSession>::new());
        assert_eq!(stats, OverviewStats::default());
    }

    #[test]
    fn test_overview_treats_missing_summary_as_zero() {
        let sessions = vec![
            session("a", Platform::Web, SessionStatus::InProgress, Some(summary(2, 1, 0, 1, 1))),
            session("b", Platform::Web, SessionStatus::InProgress, None),
            session("c", Platform::Roku, SessionStatus::Completed, Some(summary(3, 0, 2, 0, 0))),
        ];
        let stats = overview(&sessions);
        assert_eq!(
            stats,
            OverviewStats {
                pass: 5,
                fail: 1,
                fail_known: 2,
                na: 1,
                untested: 1,
            }
        );
    }

    #[test]
    fn test_overview_is_order_independent() {
        let mut sessions = vec![
            session("a", Platform::Web, SessionStatus::InProgress, Some(summary(2, 1, 0, 1, 1))),
            session("b", Platform::Roku, SessionStatus::Aborted, Some(summary(0, 4, 1, 0, 9))),
            session("c", Platform::FireTv, SessionStatus::Completed, Some(summary(7, 0, 0, 2, 0))),
        ];
        let forward = overview(&sessions);
        sessions.reverse();
        assert_eq!(overview(&sessions), forward);
        sessions.swap(0, 1);
        assert_eq!(overview(&sessions), forward);
    }

    #[test]
    fn test_partition_is_disjoint_and_complete() {
        let sessions = vec![
            session("a", Platform::Web, SessionStatus::InProgress, None),
            session("b", Platform::Web, SessionStatus::Completed, None),
            session("c", Platform::Web, SessionStatus::Aborted, None),
        ];
        let groups = partition(&sessions);
        let active: Vec<&str> = groups.active.iter().map(|s| s.id.as_str()).collect();
        let completed: Vec<&str> = groups.completed.iter().map(|s| s.id.as_str()).collect();

        assert_eq!(active, vec!["a", "c"]);
        assert_eq!(completed, vec!["b"]);
    }

    #[test]
    fn test_platform_rollup_excludes_empty_and_sorts_by_total() {
        let sessions = vec![
            session("a", Platform::Web, SessionStatus::Completed, Some(summary(2, 0, 0, 0, 0))),
            session("b", Platform::Roku, SessionStatus::InProgress, Some(summary(1, 1, 1, 1, 6))),
            session("c", Platform::Web, SessionStatus::InProgress, Some(summary(1, 1, 0, 0, 0))),
            session("d", Platform::AppleTv, SessionStatus::InProgress, None),
            session("e", Platform::FireTv, SessionStatus::InProgress, Some(SessionSummary::default())),
        ];
        let rollup = platform_rollup(&sessions);
        let names: Vec<&str> = rollup.iter().map(|p| p.platform_name.as_str()).collect();

        assert_eq!(names, vec!["Roku", "Web"]);
        assert_eq!(rollup[0].total, 10);
        assert_eq!(rollup[1].total, 4);
        assert_eq!(rollup[1].pass, 3);
        assert_eq!(rollup[1].fail, 1);
        assert_eq!(rollup[1].pass_rate, Some(0.75));
        assert!(rollup.windows(2).all(|pair| pair[0].total >= pair[1].total));
    }

    #[test]
    fn test_platform_rollup_pass_rate_absent_without_executions() {
        let sessions = vec![session(
            "a",
            Platform::MobileIos,
            SessionStatus::InProgress,
            Some(summary(0, 0, 0, 3, 2)),
        )];
        let rollup = platform_rollup(&sessions);

        assert_eq!(rollup.len(), 1);
        assert_eq!(rollup[0].pass_rate, None);
        let value = serde_json::to_value(&rollup[0]).unwrap();
        assert!(value.get("passRate").is_none());
    }

    #[test]
    fn test_dashboard_view_combines_reductions() {
        let sessions = vec![
            session("a", Platform::Web, SessionStatus::InProgress, Some(summary(2, 1, 0, 1, 1))),
            session("b", Platform::Roku, SessionStatus::Completed, Some(summary(3, 0, 0, 0, 0))),
        ];
        let view = dashboard_view(&sessions);

        assert_eq!(view.active.len(), 1);
        assert_eq!(view.active[0].completion, 80);
        assert_eq!(view.completed.len(), 1);
        assert_eq!(view.completed[0].completion, 100);
        assert_eq!(view.overview.pass, 5);
        assert_eq!(view.platforms.len(), 2);
    }
}
