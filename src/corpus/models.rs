//! Data models for historical issue records

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Value of a free-form custom field or task context entry
///
/// JSON numbers become `Number`, ISO `YYYY-MM-DD` strings become `Date`,
/// every other string is `Text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl FieldValue {
    /// Numeric view of the value; text is parsed leniently
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok(),
            FieldValue::Date(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Equality used by context similarity
    ///
    /// Same-variant values are compared by value (text case-insensitively,
    /// ignoring surrounding whitespace). Mixed variants fall back to their
    /// canonical string forms, compared the same way.
    pub fn matches(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Number(a), FieldValue::Number(b)) => (a - b).abs() <= 1e-9,
            (FieldValue::Date(a), FieldValue::Date(b)) => a == b,
            (FieldValue::Text(a), FieldValue::Text(b)) => {
                a.trim().to_lowercase() == b.trim().to_lowercase()
            }
            (a, b) => a.to_string().trim().to_lowercase() == b.to_string().trim().to_lowercase(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value as f64)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        FieldValue::Date(value)
    }
}

/// Ordered map of custom fields, keyed by field name
pub type FieldMap = IndexMap<String, FieldValue>;

/// Issue state as persisted by the tracker sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    #[serde(alias = "completed", alias = "done")]
    Closed,
}

/// A persisted issue-tracker record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    #[serde(default)]
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub state: IssueState,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub custom_fields: FieldMap,
}

impl IssueRecord {
    pub fn is_closed(&self) -> bool {
        self.state == IssueState::Closed
    }
}

/// T-shirt size category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Size {
    #[serde(rename = "XS")]
    Xs,
    #[serde(rename = "S")]
    S,
    #[serde(rename = "M")]
    M,
    #[serde(rename = "L")]
    L,
    #[serde(rename = "XL")]
    Xl,
}

impl Size {
    /// All sizes, smallest first
    pub const ALL: [Size; 5] = [Size::Xs, Size::S, Size::M, Size::L, Size::Xl];

    pub fn as_str(&self) -> &'static str {
        match self {
            Size::Xs => "XS",
            Size::S => "S",
            Size::M => "M",
            Size::L => "L",
            Size::Xl => "XL",
        }
    }

    /// Approximate hour range (min, max) for the size
    pub fn hour_range(&self) -> (f64, f64) {
        match self {
            Size::Xs => (0.5, 2.0),
            Size::S => (2.0, 4.0),
            Size::M => (4.0, 8.0),
            Size::L => (8.0, 16.0),
            Size::Xl => (16.0, 40.0),
        }
    }

    pub fn from_hours(hours: f64) -> Self {
        if hours < 2.0 {
            Size::Xs
        } else if hours < 4.0 {
            Size::S
        } else if hours < 8.0 {
            Size::M
        } else if hours < 16.0 {
            Size::L
        } else {
            Size::Xl
        }
    }

    /// Fibonacci story points conventionally attached to the size
    pub fn story_points(&self) -> f64 {
        match self {
            Size::Xs => 1.0,
            Size::S => 2.0,
            Size::M => 5.0,
            Size::L => 8.0,
            Size::Xl => 13.0,
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Size {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "XS" => Ok(Size::Xs),
            "S" => Ok(Size::S),
            "M" => Ok(Size::M),
            "L" => Ok(Size::L),
            "XL" => Ok(Size::Xl),
            other => Err(format!("unknown size '{}', expected one of XS, S, M, L, XL", other)),
        }
    }
}

/// A completed unit of work drawn from the corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalTask {
    /// Source record; `None` when the corpus entry has no backing data
    pub issue: Option<IssueRecord>,
    pub actual_hours: f64,
    pub size: Option<Size>,
    pub story_points: f64,
}

impl HistoricalTask {
    pub fn title(&self) -> &str {
        self.issue.as_ref().map(|i| i.title.as_str()).unwrap_or_default()
    }

    pub fn labels(&self) -> &[String] {
        self.issue.as_ref().map(|i| i.labels.as_slice()).unwrap_or_default()
    }

    pub fn has_hours(&self) -> bool {
        self.actual_hours > 0.0
    }
}
