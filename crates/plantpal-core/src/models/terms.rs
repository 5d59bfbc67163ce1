use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TermsVersion {
    pub version: String,
    pub content: String,
    pub effective_date: NaiveDate,
    #[serde(default)]
    pub is_active: bool,
}
