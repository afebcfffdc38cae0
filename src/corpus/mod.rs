//! Historical corpus: persisted issue records and the completed tasks derived from them

pub mod loader;
pub mod models;
pub mod store;

pub use loader::{historical_from_issue, historical_from_issues};
pub use models::{FieldMap, FieldValue, HistoricalTask, IssueRecord, IssueState, Size};
pub use store::{InMemoryIssueStore, IssueStore, JsonIssueStore, SeedDataStore};
