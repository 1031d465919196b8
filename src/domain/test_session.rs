use crate::domain::test_case::{NewTestCase, TestCase};
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::{Validate, ValidationError};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    #[serde(rename = "Android TV")]
    AndroidTv,
    #[serde(rename = "Apple TV")]
    AppleTv,
    #[serde(rename = "Fire TV")]
    FireTv,
    Roku,
    Web,
    #[serde(rename = "Mobile (Android)")]
    MobileAndroid,
    #[serde(rename = "Mobile (iOS)")]
    MobileIos,
    Other,
}

impl Platform {
    pub fn label(&self) -> &'static str {
        match self {
            Platform::AndroidTv => "Android TV",
            Platform::AppleTv => "Apple TV",
            Platform::FireTv => "Fire TV",
            Platform::Roku => "Roku",
            Platform::Web => "Web",
            Platform::MobileAndroid => "Mobile (Android)",
            Platform::MobileIos => "Mobile (iOS)",
            Platform::Other => "Other",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_platform_details"))]
pub struct PlatformDetails {
    pub platform_name: Platform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_platform_name: Option<String>,
}

fn validate_platform_details(details: &PlatformDetails) -> Result<(), ValidationError> {
    if details.platform_name != Platform::Other {
        return Ok(());
    }
    let has_name = details
        .custom_platform_name
        .as_deref()
        .map(|name| !name.trim().is_empty())
        .unwrap_or(false);
    if has_name {
        Ok(())
    } else {
        let mut err = ValidationError::new("custom_platform_name");
        err.message = Some("A platform name is required when the platform is Other.".into());
        Err(err)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
    Aborted,
}

impl SessionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "In Progress",
            SessionStatus::Completed => "Completed",
            SessionStatus::Aborted => "Aborted",
        }
    }

    /// Completed and Aborted are final; only In Progress may move.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::InProgress, SessionStatus::Completed)
                | (SessionStatus::InProgress, SessionStatus::Aborted)
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::InProgress | SessionStatus::Aborted)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub total: u32,
    pub pass: u32,
    pub fail: u32,
    pub fail_known: u32,
    pub na: u32,
    pub untested: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestSession {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub platform_details: PlatformDetails,
    pub test_cases: Vec<TestCase>,
    pub status: SessionStatus,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SessionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_for_incompletion: Option<String>,
}

/// Partial write against a stored session. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct SessionFieldUpdate {
    pub test_cases: Option<Vec<TestCase>>,
    pub summary: Option<SessionSummary>,
    pub status: Option<SessionStatus>,
    pub completed_at: Option<i64>,
    pub reason_for_incompletion: Option<String>,
    pub user_name: Option<String>,
    pub updated_at: Option<i64>,
}

impl SessionFieldUpdate {
    pub fn is_empty(&self) -> bool {
        self.test_cases.is_none()
            && self.summary.is_none()
            && self.status.is_none()
            && self.completed_at.is_none()
            && self.reason_for_incompletion.is_none()
            && self.user_name.is_none()
            && self.updated_at.is_none()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionInput {
    #[validate(nested)]
    pub platform_details: PlatformDetails,
    #[serde(default)]
    #[validate(nested)]
    pub test_cases: Vec<NewTestCase>,
    /// Raw CSV export of test cases, appended after `test_cases`.
    #[serde(default)]
    pub test_cases_csv: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(platform: Platform, custom: Option<&str>) -> PlatformDetails {
        PlatformDetails {
            platform_name: platform,
            device_model: None,
            os_version: None,
            app_version: None,
            browser_name: None,
            browser_version: None,
            custom_platform_name: custom.map(str::to_string),
        }
    }

    #[test]
    fn test_status_transitions() {
        assert!(SessionStatus::InProgress.can_transition_to(SessionStatus::Completed));
        assert!(SessionStatus::InProgress.can_transition_to(SessionStatus::Aborted));
        assert!(!SessionStatus::Completed.can_transition_to(SessionStatus::InProgress));
        assert!(!SessionStatus::Aborted.can_transition_to(SessionStatus::Completed));
        assert!(!SessionStatus::Completed.can_transition_to(SessionStatus::Aborted));
    }

    #[test]
    fn test_other_platform_requires_custom_name() {
        assert!(details(Platform::Other, None).validate().is_err());
        assert!(details(Platform::Other, Some("  ")).validate().is_err());
        assert!(details(Platform::Other, Some("Smart Fridge")).validate().is_ok());
        assert!(details(Platform::Roku, None).validate().is_ok());
    }

    #[test]
    fn test_platform_wire_names() {
        let encoded = serde_json::to_string(&Platform::MobileIos).unwrap();
        assert_eq!(encoded, "\"Mobile (iOS)\"");
        let status: SessionStatus = serde_json::from_str("\"In Progress\"").unwrap();
        assert_eq!(status, SessionStatus::InProgress);
    }

    #[test]
    fn test_summary_uses_camel_case() {
        let summary = SessionSummary {
            total: 2,
            fail_known: 1,
            ..Default::default()
        };
        let value = serde_json::to_value(summary).unwrap();
        assert_eq!(value["failKnown"], 1);
        assert_eq!(value["total"], 2);
    }
}
