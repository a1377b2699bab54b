use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Selection-process stage of an entry, in the order a process advances.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    SubmissionInProgress,
    SubmissionComplete,
    FirstInterview,
    SecondInterview,
    ThirdInterview,
    FinalInterview,
    /// A label found in stored data that is not one of the six stages.
    Other(String),
}

pub static STAGES: [Status; 6] = [
    Status::SubmissionInProgress,
    Status::SubmissionComplete,
    Status::FirstInterview,
    Status::SecondInterview,
    Status::ThirdInterview,
    Status::FinalInterview,
];

impl Status {
    /// Position in the stage enumeration. Unknown labels have no position and
    /// therefore order before every known stage.
    pub fn position(&self) -> Option<usize> {
        STAGES.iter().position(|s| s == self)
    }

    /// Label written to storage. These are the labels existing collections
    /// were saved with, so they stay the on-disk form.
    pub fn label(&self) -> &str {
        match self {
            Status::SubmissionInProgress => "書類提出中",
            Status::SubmissionComplete => "書類提出済",
            Status::FirstInterview => "一次面接",
            Status::SecondInterview => "二次面接",
            Status::ThirdInterview => "三次面接",
            Status::FinalInterview => "最終面接",
            Status::Other(raw) => raw.as_str(),
        }
    }

    pub fn slug(&self) -> &str {
        match self {
            Status::SubmissionInProgress => "submission-in-progress",
            Status::SubmissionComplete => "submission-complete",
            Status::FirstInterview => "first-interview",
            Status::SecondInterview => "second-interview",
            Status::ThirdInterview => "third-interview",
            Status::FinalInterview => "final-interview",
            Status::Other(raw) => raw.as_str(),
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Status::SubmissionInProgress => "Submission in progress",
            Status::SubmissionComplete => "Submission complete",
            Status::FirstInterview => "First interview",
            Status::SecondInterview => "Second interview",
            Status::ThirdInterview => "Third interview",
            Status::FinalInterview => "Final interview",
            Status::Other(raw) => raw.as_str(),
        }
    }

    /// Maps a stored label (or slug) to a status, keeping anything else
    /// verbatim. Stage numbers and display names are user input only.
    pub fn from_label(label: &str) -> Self {
        STAGES
            .iter()
            .find(|stage| stage.label() == label || stage.slug() == label)
            .cloned()
            .unwrap_or_else(|| Status::Other(label.to_string()))
    }

    pub fn next(&self) -> Self {
        match self.position() {
            Some(i) if i + 1 < STAGES.len() => STAGES[i + 1].clone(),
            Some(i) => STAGES[i].clone(),
            None => Status::default(),
        }
    }

    pub fn prev(&self) -> Self {
        match self.position() {
            Some(i) if i > 0 => STAGES[i - 1].clone(),
            _ => Status::default(),
        }
    }
}

impl FromStr for Status {
    type Err = anyhow::Error;

    /// Accepts the stored label, the slug, the display name (any case) or
    /// the 1-based stage number.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if let Ok(n) = trimmed.parse::<usize>() {
            return n
                .checked_sub(1)
                .and_then(|i| STAGES.get(i))
                .cloned()
                .ok_or_else(|| anyhow!("Stage number must be 1-{}", STAGES.len()));
        }
        let lower = trimmed.to_lowercase();
        STAGES
            .iter()
            .find(|stage| {
                stage.label() == trimmed
                    || stage.slug() == lower
                    || stage.display_name().to_lowercase() == lower
            })
            .cloned()
            .ok_or_else(|| {
                anyhow!(
                    "Unknown status '{}'. Available: {}",
                    s,
                    STAGES.iter().map(|st| st.slug()).collect::<Vec<_>>().join(", ")
                )
            })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(match raw.as_deref() {
            None | Some("") => Status::default(),
            Some(label) => Status::from_label(label),
        })
    }
}

/// One tracked application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyEntry {
    /// Empty only for legacy records that have not been backfilled yet.
    #[serde(default, deserialize_with = "string_or_null")]
    pub id: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub name: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default, deserialize_with = "string_or_null")]
    pub note: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub interview_date: String,
    /// Only set for entries mirrored from the remote collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

fn string_or_null<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Field values collected from the add form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewEntry {
    pub name: String,
    pub note: String,
    pub interview_date: String,
}

impl NewEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    pub fn with_interview_date(mut self, date: impl Into<String>) -> Self {
        self.interview_date = date.into();
        self
    }

    pub fn is_blank(&self) -> bool {
        self.name.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added(String),
    Blank,
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Field {
    Name,
    Status,
    Note,
    InterviewDate,
}

impl Field {
    /// Field name in locally stored records.
    pub fn key(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Status => "status",
            Field::Note => "note",
            Field::InterviewDate => "interviewDate",
        }
    }

    /// Field name in remote documents.
    pub fn remote_key(self) -> &'static str {
        match self {
            Field::InterviewDate => "date",
            other => other.key(),
        }
    }
}

/// A replacement value for exactly one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Name(String),
    Status(Status),
    Note(String),
    InterviewDate(String),
}

impl FieldUpdate {
    /// Builds an update from user input, validating status labels and dates.
    pub fn parse(field: Field, value: &str) -> Result<Self> {
        Ok(match field {
            Field::Name => FieldUpdate::Name(value.to_string()),
            Field::Status => FieldUpdate::Status(value.parse()?),
            Field::Note => FieldUpdate::Note(value.to_string()),
            Field::InterviewDate => FieldUpdate::InterviewDate(parse_date(value)?),
        })
    }

    pub fn field(&self) -> Field {
        match self {
            FieldUpdate::Name(_) => Field::Name,
            FieldUpdate::Status(_) => Field::Status,
            FieldUpdate::Note(_) => Field::Note,
            FieldUpdate::InterviewDate(_) => Field::InterviewDate,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            FieldUpdate::Name(v) | FieldUpdate::Note(v) | FieldUpdate::InterviewDate(v) => v,
            FieldUpdate::Status(s) => s.label(),
        }
    }

    pub fn apply(&self, entry: &mut CompanyEntry) {
        match self {
            FieldUpdate::Name(v) => entry.name = v.clone(),
            FieldUpdate::Status(s) => entry.status = s.clone(),
            FieldUpdate::Note(v) => entry.note = v.clone(),
            FieldUpdate::InterviewDate(v) => entry.interview_date = v.clone(),
        }
    }
}

/// Interview dates are either empty or an ISO calendar date.
pub fn parse_date(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", value))?;
    Ok(date.format("%Y-%m-%d").to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SortKey {
    #[default]
    Name,
    InterviewDate,
    Status,
}

impl SortKey {
    pub fn cycle(self) -> Self {
        match self {
            SortKey::Name => SortKey::InterviewDate,
            SortKey::InterviewDate => SortKey::Status,
            SortKey::Status => SortKey::Name,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortKey::Name => "name",
            SortKey::InterviewDate => "interview date",
            SortKey::Status => "status",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn toggle(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parses_every_spelling() {
        assert_eq!("一次面接".parse::<Status>().unwrap(), Status::FirstInterview);
        assert_eq!("second-interview".parse::<Status>().unwrap(), Status::SecondInterview);
        assert_eq!("Final Interview".parse::<Status>().unwrap(), Status::FinalInterview);
        assert_eq!("2".parse::<Status>().unwrap(), Status::SubmissionComplete);
        assert!("7".parse::<Status>().is_err());
        assert!("0".parse::<Status>().is_err());
        assert!("offer".parse::<Status>().is_err());
    }

    #[test]
    fn test_unknown_status_orders_before_stages() {
        let other = Status::from_label("内定");
        assert_eq!(other, Status::Other("内定".to_string()));
        assert!(other.position() < Status::SubmissionInProgress.position());
    }

    #[test]
    fn test_stored_labels_accept_only_labels_and_slugs() {
        assert_eq!(Status::from_label("最終面接"), Status::FinalInterview);
        assert_eq!(Status::from_label("third-interview"), Status::ThirdInterview);
        assert_eq!(Status::from_label("3"), Status::Other("3".to_string()));
        assert_eq!(
            Status::from_label("First interview"),
            Status::Other("First interview".to_string())
        );

        let entry: CompanyEntry = serde_json::from_str(r#"{"name":"Acme Co.","status":"3"}"#).unwrap();
        assert_eq!(entry.status, Status::Other("3".to_string()));
        assert_eq!(entry.status.position(), None);
    }

    #[test]
    fn test_status_next_and_prev_saturate() {
        assert_eq!(Status::FinalInterview.next(), Status::FinalInterview);
        assert_eq!(Status::SubmissionInProgress.prev(), Status::SubmissionInProgress);
        assert_eq!(Status::FirstInterview.next(), Status::SecondInterview);
        assert_eq!(Status::FirstInterview.prev(), Status::SubmissionComplete);
    }

    #[test]
    fn test_legacy_record_deserializes_with_defaults() {
        let raw = r#"{"name":"Acme Co.","status":"三次面接","note":null}"#;
        let entry: CompanyEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(entry.id, "");
        assert_eq!(entry.name, "Acme Co.");
        assert_eq!(entry.status, Status::ThirdInterview);
        assert_eq!(entry.note, "");
        assert_eq!(entry.interview_date, "");
        assert_eq!(entry.created_at, None);
    }

    #[test]
    fn test_entry_serializes_with_stored_field_names() {
        let entry = CompanyEntry {
            id: "a".to_string(),
            name: "Acme Co.".to_string(),
            status: Status::default(),
            note: String::new(),
            interview_date: "2025-04-01".to_string(),
            created_at: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["interviewDate"], "2025-04-01");
        assert_eq!(json["status"], "書類提出中");
        assert!(json.get("createdAt").is_none());
    }

    #[test]
    fn test_field_update_validates_dates() {
        assert_eq!(
            FieldUpdate::parse(Field::InterviewDate, "2025-06-30").unwrap(),
            FieldUpdate::InterviewDate("2025-06-30".to_string())
        );
        assert_eq!(
            FieldUpdate::parse(Field::InterviewDate, "  ").unwrap(),
            FieldUpdate::InterviewDate(String::new())
        );
        assert!(FieldUpdate::parse(Field::InterviewDate, "2025-13-01").is_err());
        assert!(FieldUpdate::parse(Field::InterviewDate, "tomorrow").is_err());
    }

    #[test]
    fn test_interview_date_maps_to_remote_date() {
        assert_eq!(Field::InterviewDate.key(), "interviewDate");
        assert_eq!(Field::InterviewDate.remote_key(), "date");
        assert_eq!(Field::Note.remote_key(), "note");
    }
}
