use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use validator::Validate;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum TestCaseStatus {
    Pass,
    Fail,
    FailKnown,
    NotApplicable,
    #[default]
    Untested,
    /// Stored value outside the known status set, kept verbatim. Never accepted as input.
    Unrecognized(String),
}

impl TestCaseStatus {
    pub fn label(&self) -> &str {
        match self {
            TestCaseStatus::Pass => "Pass",
            TestCaseStatus::Fail => "Fail",
            TestCaseStatus::FailKnown => "Fail (Known)",
            TestCaseStatus::NotApplicable => "N/A",
            TestCaseStatus::Untested => "Untested",
            TestCaseStatus::Unrecognized(raw) => raw,
        }
    }

    /// Exact wire label. Anything else is carried as `Unrecognized`.
    pub fn from_label(label: &str) -> Self {
        match label {
            "Pass" => TestCaseStatus::Pass,
            "Fail" => TestCaseStatus::Fail,
            "Fail (Known)" => TestCaseStatus::FailKnown,
            "N/A" => TestCaseStatus::NotApplicable,
            "Untested" => TestCaseStatus::Untested,
            other => TestCaseStatus::Unrecognized(other.to_string()),
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, TestCaseStatus::Unrecognized(_))
    }

    /// A status that counts toward completion.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TestCaseStatus::Pass
                | TestCaseStatus::Fail
                | TestCaseStatus::FailKnown
                | TestCaseStatus::NotApplicable
        )
    }

    /// Lenient parse used by the CSV importer ("pass", "n/a", "fail known", ...).
    pub fn parse_loose(value: &str) -> Option<Self> {
        let normalized: String = value
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        match normalized.as_str() {
            "pass" | "passed" => Some(TestCaseStatus::Pass),
            "fail" | "failed" | "failnew" => Some(TestCaseStatus::Fail),
            "failknown" | "knownfail" => Some(TestCaseStatus::FailKnown),
            "na" | "notapplicable" => Some(TestCaseStatus::NotApplicable),
            "" | "untested" | "nottested" => Some(TestCaseStatus::Untested),
            _ => None,
        }
    }
}

impl fmt::Display for TestCaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for TestCaseStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for TestCaseStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(TestCaseStatus::from_label(&label))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    pub order_index: u32,
    #[serde(default)]
    pub test_bed: String,
    pub test_case_title: String,
    #[serde(default)]
    pub test_steps: String,
    #[serde(default)]
    pub expected_result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: TestCaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bug_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub na_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<String>>,
    pub last_modified: i64,
}

/// A test case as authored by hand or read from an import, before it joins a session.
#[derive(Debug, Serialize, Deserialize, Clone, Validate, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewTestCase {
    #[serde(default)]
    pub test_bed: String,
    #[validate(length(min = 1, message = "Test case title is required."))]
    pub test_case_title: String,
    #[serde(default)]
    pub test_steps: String,
    #[serde(default)]
    pub expected_result: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: Option<TestCaseStatus>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseUpdate {
    pub status: Option<TestCaseStatus>,
    pub actual_result: Option<String>,
    pub notes: Option<String>,
    pub bug_id: Option<String>,
    pub na_reason: Option<String>,
    pub attachments: Option<Vec<String>>,
}

impl TestCaseUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.actual_result.is_none()
            && self.notes.is_none()
            && self.bug_id.is_none()
            && self.na_reason.is_none()
            && self.attachments.is_none()
    }

    /// Applies the update in place. Blank strings clear the field.
    pub fn apply_to(&self, case: &mut TestCase, now: i64) {
        if let Some(status) = &self.status {
            case.status = status.clone();
        }
        if let Some(value) = &self.actual_result {
            case.actual_result = normalize_optional(value);
        }
        if let Some(value) = &self.notes {
            case.notes = normalize_optional(value);
        }
        if let Some(value) = &self.bug_id {
            case.bug_id = normalize_optional(value);
        }
        if let Some(value) = &self.na_reason {
            case.na_reason = normalize_optional(value);
        }
        if let Some(attachments) = &self.attachments {
            let cleaned: Vec<String> = attachments
                .iter()
                .filter_map(|item| normalize_optional(item))
                .collect();
            case.attachments = if cleaned.is_empty() { None } else { Some(cleaned) };
        }
        case.last_modified = now;
    }
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
