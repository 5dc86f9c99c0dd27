use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_NOTES_LEN: usize = 500;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

/// Where an application stands. Rows written before the status list was
/// closed may hold anything, so unknown values survive as `Legacy`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    #[default]
    Applied,
    GotInterview,
    Interviewed,
    Rejected,
    GotOffer,
    Legacy(String),
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Applied,
        Status::GotInterview,
        Status::Interviewed,
        Status::Rejected,
        Status::GotOffer,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Status::Applied => "applied",
            Status::GotInterview => "got interview",
            Status::Interviewed => "interviewed",
            Status::Rejected => "rejected",
            Status::GotOffer => "got offer",
            Status::Legacy(raw) => raw,
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Status::Legacy(_))
    }

    /// Next enumerated status, wrapping around. Legacy values step to the first.
    pub fn next(&self) -> Status {
        let idx = Self::ALL.iter().position(|s| s == self);
        match idx {
            Some(i) => Self::ALL[(i + 1) % Self::ALL.len()].clone(),
            None => Status::Applied,
        }
    }

    pub fn prev(&self) -> Status {
        let idx = Self::ALL.iter().position(|s| s == self);
        match idx {
            Some(0) | None => Self::ALL[Self::ALL.len() - 1].clone(),
            Some(i) => Self::ALL[i - 1].clone(),
        }
    }
}

impl From<String> for Status {
    fn from(raw: String) -> Self {
        let normalized = raw.trim().to_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "applied" => Status::Applied,
            "got interview" => Status::GotInterview,
            "interviewed" => Status::Interviewed,
            "rejected" => Status::Rejected,
            "got offer" => Status::GotOffer,
            _ => Status::Legacy(raw),
        }
    }
}

impl From<Status> for String {
    fn from(status: Status) -> Self {
        match status {
            Status::Legacy(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

impl FromStr for Status {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Status::from(s.to_string()))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobApplication {
    /// Assigned by the store on create; `None` only for unsaved drafts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub company_name: String,
    pub job_title: String,
    pub status: Status,
    #[serde(with = "iso_date")]
    pub applied_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl JobApplication {
    /// Checks the rules every write must satisfy.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();
        check_name(&mut errors, "companyName", &self.company_name);
        check_name(&mut errors, "jobTitle", &self.job_title);
        if self.status.is_legacy() {
            errors.push(FieldError::new(
                "status",
                format!(
                    "status must be one of: {}",
                    Status::ALL.iter().map(Status::as_str).collect::<Vec<_>>().join(", ")
                ),
            ));
        }
        if let Some(notes) = &self.notes
            && notes.chars().count() > MAX_NOTES_LEN
        {
            errors.push(FieldError::new(
                "notes",
                format!("notes must be at most {MAX_NOTES_LEN} characters"),
            ));
        }
        ValidationError::from_fields(errors)
    }
}

fn check_name(errors: &mut Vec<FieldError>, field: &'static str, value: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, format!("{field} is required")));
    } else if value.chars().count() > MAX_NAME_LEN {
        errors.push(FieldError::new(
            field,
            format!("{field} must be at most {MAX_NAME_LEN} characters"),
        ));
    }
}

/// Form-side copy of an application. Holds raw text so half-typed input
/// (like a partial date) can live here until submit.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Draft {
    pub id: Option<i64>,
    pub company_name: String,
    pub job_title: String,
    pub status: Status,
    pub applied_date: String,
    pub notes: String,
}

impl Draft {
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }

    pub fn to_application(&self) -> Result<JobApplication, ValidationError> {
        let applied_date = iso_date::parse(&self.applied_date);
        let notes = self.notes.trim();
        let application = JobApplication {
            id: self.id,
            company_name: self.company_name.trim().to_string(),
            job_title: self.job_title.trim().to_string(),
            status: self.status.clone(),
            applied_date: applied_date.unwrap_or_default(),
            notes: (!notes.is_empty()).then(|| notes.to_string()),
        };

        let mut errors = match application.validate() {
            Ok(()) => Vec::new(),
            Err(e) => e.fields,
        };
        if applied_date.is_none() {
            let message = if self.applied_date.trim().is_empty() {
                "appliedDate is required".to_string()
            } else {
                format!("appliedDate `{}` is not a YYYY-MM-DD date", self.applied_date.trim())
            };
            errors.push(FieldError::new("appliedDate", message));
        }
        ValidationError::from_fields(errors)?;
        Ok(application)
    }
}

impl From<&JobApplication> for Draft {
    fn from(job: &JobApplication) -> Self {
        Self {
            id: job.id,
            company_name: job.company_name.clone(),
            job_title: job.job_title.clone(),
            status: job.status.clone(),
            applied_date: job.applied_date.format("%Y-%m-%d").to_string(),
            notes: job.notes.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub message: String,
}

impl ContactMessage {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "name is required"));
        }
        if self.email.trim().is_empty() {
            errors.push(FieldError::new("email", "email is required"));
        } else if !EMAIL_RE.is_match(self.email.trim()) {
            errors.push(FieldError::new("email", "email is not a valid address"));
        }
        if self.message.trim().is_empty() {
            errors.push(FieldError::new("message", "message is required"));
        }
        ValidationError::from_fields(errors)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredContactMessage {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub message: String,
    pub submitted_at: DateTime<Utc>,
    pub delivered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactReceipt {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", join_messages(.fields))]
pub struct ValidationError {
    pub fields: Vec<FieldError>,
}

impl ValidationError {
    fn from_fields(fields: Vec<FieldError>) -> Result<(), Self> {
        if fields.is_empty() {
            Ok(())
        } else {
            Err(Self { fields })
        }
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f.field == field)
    }
}

fn join_messages(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| f.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// `appliedDate` travels as `YYYY-MM-DD`. Older clients sent full
/// timestamps; those are accepted when the time part is itself valid and
/// only the date is kept.
pub mod iso_date {
    use chrono::{DateTime, NaiveDate, NaiveDateTime};
    use serde::{Deserialize, Deserializer, Serializer, de};

    const TIMESTAMP_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];

    pub fn parse(raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Some(date);
        }
        if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
            return Some(stamp.date_naive());
        }
        TIMESTAMP_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|stamp| stamp.date())
    }

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format("%Y-%m-%d"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| {
            de::Error::custom(format!("invalid date `{raw}`, expected YYYY-MM-DD"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> JobApplication {
        JobApplication {
            id: Some(1),
            company_name: "Acme".to_string(),
            job_title: "Engineer".to_string(),
            status: Status::Applied,
            applied_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            notes: None,
        }
    }

    #[test]
    fn status_parses_loosely_and_keeps_unknown_values() {
        assert_eq!(Status::from("Got Interview".to_string()), Status::GotInterview);
        assert_eq!(Status::from("got_offer".to_string()), Status::GotOffer);
        assert_eq!(
            Status::from("Phone screen".to_string()),
            Status::Legacy("Phone screen".to_string())
        );
        assert_eq!(String::from(Status::Legacy("Phone screen".into())), "Phone screen");
    }

    #[test]
    fn status_cycles_through_enumeration() {
        assert_eq!(Status::Applied.next(), Status::GotInterview);
        assert_eq!(Status::GotOffer.next(), Status::Applied);
        assert_eq!(Status::Applied.prev(), Status::GotOffer);
        assert_eq!(Status::Legacy("x".into()).next(), Status::Applied);
    }

    #[test]
    fn json_shape_uses_camel_case_and_plain_dates() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["companyName"], "Acme");
        assert_eq!(json["appliedDate"], "2025-01-01");
        assert_eq!(json["status"], "applied");
        assert!(json.get("notes").is_none());
    }

    #[test]
    fn accepts_timestamps_for_applied_date() {
        let job: JobApplication = serde_json::from_str(
            r#"{"companyName":"Acme","jobTitle":"Dev","status":"Interviewed","appliedDate":"2025-02-03T00:00:00"}"#,
        )
        .unwrap();
        assert_eq!(job.id, None);
        assert_eq!(job.applied_date, NaiveDate::from_ymd_opt(2025, 2, 3).unwrap());
        assert_eq!(job.status, Status::Interviewed);
    }

    #[test]
    fn date_input_must_be_a_whole_date_or_timestamp() {
        let day = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert_eq!(iso_date::parse("2025-01-01"), Some(day));
        assert_eq!(iso_date::parse(" 2025-01-01 "), Some(day));
        assert_eq!(iso_date::parse("2025-01-01T00:00:00"), Some(day));
        assert_eq!(iso_date::parse("2025-01-01 09:30"), Some(day));
        assert_eq!(iso_date::parse("2025-01-01T23:59:59.123Z"), Some(day));

        for bad in ["2025-01-011", "2025-01-01xyz", "2025-01-01T99:99", "2025-01-01T", ""] {
            assert_eq!(iso_date::parse(bad), None, "{bad:?}");
        }
    }

    #[test]
    fn trailing_digits_on_applied_date_are_rejected() {
        let err = serde_json::from_str::<JobApplication>(
            r#"{"companyName":"Acme","jobTitle":"Dev","status":"Applied","appliedDate":"2025-01-019"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("2025-01-019"));
    }

    #[test]
    fn validation_reports_every_bad_field() {
        let mut job = sample();
        job.company_name = "  ".to_string();
        job.job_title = "x".repeat(101);
        job.status = Status::Legacy("ghosted".into());
        job.notes = Some("n".repeat(501));

        let err = job.validate().unwrap_err();
        assert!(err.has_field("companyName"));
        assert!(err.has_field("jobTitle"));
        assert!(err.has_field("status"));
        assert!(err.has_field("notes"));
    }

    #[test]
    fn draft_requires_a_date() {
        let draft = Draft {
            company_name: "Acme".into(),
            job_title: "Dev".into(),
            ..Draft::default()
        };
        let err = draft.to_application().unwrap_err();
        assert_eq!(err.fields.len(), 1);
        assert!(err.has_field("appliedDate"));
    }

    #[test]
    fn draft_round_trips_through_application() {
        let mut job = sample();
        job.notes = Some("referral".into());
        let draft = Draft::from(&job);
        assert_eq!(draft.applied_date, "2025-01-01");
        assert_eq!(draft.to_application().unwrap(), job);
    }

    #[test]
    fn contact_message_checks_email_shape() {
        let msg = ContactMessage {
            name: "Ann".into(),
            email: "not-an-address".into(),
            message: "hi".into(),
        };
        assert!(msg.validate().unwrap_err().has_field("email"));

        let ok = ContactMessage {
            email: "ann@example.com".into(),
            ..msg
        };
        assert!(ok.validate().is_ok());
    }
}
