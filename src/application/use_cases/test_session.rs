use crate::application::use_cases::aggregation::{dashboard_view, summarize, DashboardView};
use crate::domain::error::{AppError, Result};
use crate::domain::test_case::{NewTestCase, TestCase, TestCaseStatus, TestCaseUpdate};
use crate::domain::test_session::{
    NewSessionInput, SessionFieldUpdate, SessionStatus, TestSession,
};
use crate::domain::user::UserProfile;
use crate::infrastructure::csv::CsvParser;
use crate::infrastructure::db::sessions::SessionStore;
use crate::infrastructure::live_query::{SessionFeed, SessionSubscription};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;
use validator::Validate;

/// Session lifecycle. Every write recomputes the summary cache and wakes the live feed.
pub struct TestSessionUseCase {
    store: Arc<dyn SessionStore>,
    feed: SessionFeed,
}

impl TestSessionUseCase {
    pub fn new(store: Arc<dyn SessionStore>, feed: SessionFeed) -> Self {
        Self { store, feed }
    }

    /// Parses an uploaded test plan into drafts for the new-session form.
    /// `delimiter` overrides detection.
    pub fn import_test_cases(&self, bytes: &[u8], delimiter: Option<&str>) -> Result<Vec<NewTestCase>> {
        let parser = match delimiter {
            None => CsvParser::new(),
            Some(raw) => match raw.as_bytes() {
                [byte] if !byte.is_ascii_alphanumeric() && *byte != b'"' => {
                    CsvParser::new().with_delimiter(*byte)
                }
                _ => {
                    return Err(AppError::ValidationError(format!(
                        "Unsupported CSV delimiter: {:?}",
                        raw
                    )))
                }
            },
        };

        let drafts = parser.parse_bytes(bytes)?;
        info!(count = drafts.len(), "Test plan imported");
        Ok(drafts)
    }

    pub async fn start_session(
        &self,
        user: &UserProfile,
        input: NewSessionInput,
    ) -> Result<TestSession> {
        input.validate()?;

        let mut drafts = input.test_cases;
        if let Some(csv) = input.test_cases_csv.as_deref() {
            if !csv.trim().is_empty() {
                drafts.extend(CsvParser::new().parse_content(csv)?);
            }
        }

        let now = now_millis();
        let test_cases = drafts
            .into_iter()
            .enumerate()
            .map(|(index, draft)| build_test_case(index, draft, now))
            .collect::<Result<Vec<_>>>()?;

        let session = TestSession {
            id: Uuid::new_v4().to_string(),
            user_id: user.uid.clone(),
            user_name: user.tester_name(),
            platform_details: input.platform_details,
            summary: Some(summarize(&test_cases)),
            test_cases,
            status: SessionStatus::InProgress,
            created_at: now,
            updated_at: now,
            completed_at: None,
            reason_for_incompletion: None,
        };

        self.store.create_session(&session).await.map_err(|e| {
            error!(error = %e, owner_id = %user.uid, "Failed to create test session");
            e
        })?;
        info!(
            session_id = %session.id,
            owner_id = %user.uid,
            test_cases = session.test_cases.len(),
            "Test session started"
        );
        self.feed.notify(&user.uid);
        Ok(session)
    }

    /// Sessions owned by someone else read as missing.
    pub async fn get_session(&self, owner_id: &str, session_id: &str) -> Result<TestSession> {
        let session = self.store.get_session(session_id).await?;
        if session.user_id != owner_id {
            return Err(AppError::NotFound(format!(
                "Test session not found: {}",
                session_id
            )));
        }
        Ok(session)
    }

    pub async fn list_sessions(&self, owner_id: &str) -> Result<Vec<TestSession>> {
        self.store.list_for_owner(owner_id).await
    }

    pub async fn dashboard(&self, owner_id: &str) -> Result<DashboardView> {
        let sessions = self.store.list_for_owner(owner_id).await?;
        Ok(dashboard_view(&sessions))
    }

    pub fn subscribe(&self, owner_id: &str) -> SessionSubscription {
        self.feed.subscribe(owner_id)
    }

    pub fn live_subscriptions(&self) -> usize {
        self.feed.active_subscriptions()
    }

    pub async fn update_test_case(
        &self,
        owner_id: &str,
        session_id: &str,
        case_id: &str,
        update: TestCaseUpdate,
    ) -> Result<TestSession> {
        if update.is_empty() {
            return Err(AppError::ValidationError("Nothing to update.".to_string()));
        }
        if let Some(status) = &update.status {
            ensure_recognized(status)?;
        }

        let mut session = self.get_session(owner_id, session_id).await?;
        if session.status == SessionStatus::Completed {
            return Err(AppError::Conflict(
                "Completed sessions can no longer be edited.".to_string(),
            ));
        }

        let now = now_millis();
        let case = session
            .test_cases
            .iter_mut()
            .find(|case| case.id == case_id)
            .ok_or_else(|| AppError::NotFound(format!("Test case not found: {}", case_id)))?;
        update.apply_to(case, now);

        let summary = summarize(&session.test_cases);
        let fields = SessionFieldUpdate {
            test_cases: Some(session.test_cases.clone()),
            summary: Some(summary),
            updated_at: Some(now),
            ..Default::default()
        };
        self.store.update_fields(session_id, &fields).await?;
        self.feed.notify(owner_id);

        session.summary = Some(summary);
        session.updated_at = now;
        Ok(session)
    }

    pub async fn complete_session(&self, owner_id: &str, session_id: &str) -> Result<TestSession> {
        let mut session = self.get_session(owner_id, session_id).await?;
        ensure_transition(&session, SessionStatus::Completed)?;

        let untested = session
            .test_cases
            .iter()
            .filter(|case| !case.status.is_terminal())
            .count();
        if untested > 0 {
            return Err(AppError::ValidationError(format!(
                "{} test case(s) are still untested.",
                untested
            )));
        }

        let now = now_millis();
        let summary = summarize(&session.test_cases);
        let fields = SessionFieldUpdate {
            summary: Some(summary),
            status: Some(SessionStatus::Completed),
            completed_at: Some(now),
            updated_at: Some(now),
            ..Default::default()
        };
        self.store.update_fields(session_id, &fields).await?;
        info!(session_id = %session_id, owner_id = %owner_id, "Test session completed");
        self.feed.notify(owner_id);

        session.summary = Some(summary);
        session.status = SessionStatus::Completed;
        session.completed_at = Some(now);
        session.updated_at = now;
        Ok(session)
    }

    pub async fn abort_session(
        &self,
        owner_id: &str,
        session_id: &str,
        reason: &str,
    ) -> Result<TestSession> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::ValidationError(
                "A reason is required to abort a session.".to_string(),
            ));
        }

        let mut session = self.get_session(owner_id, session_id).await?;
        ensure_transition(&session, SessionStatus::Aborted)?;

        let now = now_millis();
        let summary = summarize(&session.test_cases);
        let fields = SessionFieldUpdate {
            summary: Some(summary),
            status: Some(SessionStatus::Aborted),
            reason_for_incompletion: Some(reason.to_string()),
            updated_at: Some(now),
            ..Default::default()
        };
        self.store.update_fields(session_id, &fields).await?;
        info!(session_id = %session_id, owner_id = %owner_id, "Test session aborted");
        self.feed.notify(owner_id);

        session.summary = Some(summary);
        session.status = SessionStatus::Aborted;
        session.reason_for_incompletion = Some(reason.to_string());
        session.updated_at = now;
        Ok(session)
    }

    /// Keeps the tester name on existing sessions in step with the profile.
    pub async fn rename_tester(&self, owner_id: &str, user_name: &str) -> Result<usize> {
        let sessions = self.store.list_for_owner(owner_id).await?;
        let now = now_millis();
        let mut renamed = 0;
        for session in sessions.iter().filter(|s| s.user_name != user_name) {
            let fields = SessionFieldUpdate {
                user_name: Some(user_name.to_string()),
                updated_at: Some(now),
                ..Default::default()
            };
            self.store.update_fields(&session.id, &fields).await?;
            renamed += 1;
        }
        if renamed > 0 {
            self.feed.notify(owner_id);
        }
        Ok(renamed)
    }
}

fn build_test_case(index: usize, draft: NewTestCase, now: i64) -> Result<TestCase> {
    let status = draft.status.unwrap_or_default();
    ensure_recognized(&status)?;
    let order_index = u32::try_from(index)
        .map_err(|_| AppError::ValidationError("Too many test cases.".to_string()))?;

    Ok(TestCase {
        id: Uuid::new_v4().to_string(),
        order_index,
        test_bed: draft.test_bed.trim().to_string(),
        test_case_title: draft.test_case_title.trim().to_string(),
        test_steps: draft.test_steps.trim().to_string(),
        expected_result: draft.expected_result.trim().to_string(),
        actual_result: None,
        notes: draft
            .notes
            .map(|notes| notes.trim().to_string())
            .filter(|notes| !notes.is_empty()),
        status,
        bug_id: None,
        na_reason: None,
        attachments: None,
        last_modified: now,
    })
}

fn ensure_recognized(status: &TestCaseStatus) -> Result<()> {
    if status.is_recognized() {
        Ok(())
    } else {
        Err(AppError::ValidationError(format!(
            "Unrecognized test case status: {}",
            status
        )))
    }
}

fn ensure_transition(session: &TestSession, next: SessionStatus) -> Result<()> {
    if session.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(AppError::Conflict(format!(
            "Cannot move a session from {} to {}.",
            session.status.label(),
            next.label()
        )))
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
