use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Marketplace category of a posting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobCategory {
    WebDev,
    DataScience,
    Design,
    Marketing,
    /// Anything a source platform reports that we don't map.
    #[default]
    #[serde(other)]
    Other,
}

/// Lifecycle of a posting. Driven by the proposal and persistence layers;
/// the evaluation core only reads it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    New,
    Analyzed,
    Applied,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    /// 0.0 – 1.0
    #[serde(default)]
    pub proficiency: f64,
    #[serde(default)]
    pub years_experience: u32,
}

impl Skill {
    pub fn new(name: impl Into<String>, proficiency: f64, years_experience: u32) -> Self {
        Self {
            name: name.into(),
            proficiency,
            years_experience,
        }
    }
}

/// A scraped job posting as handed over by ingestion.
///
/// Every field except `id` defaults when absent so that a partial posting
/// still reaches scoring, where missing data degrades to a zero term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Null or unreadable amounts (`"negotiable"`) read as 0.
    #[serde(default, deserialize_with = "lenient_amount")]
    pub budget: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default, deserialize_with = "lenient_category")]
    pub category: JobCategory,
    #[serde(default)]
    pub required_skills: Vec<Skill>,
    #[serde(default = "Utc::now")]
    pub posted_at: DateTime<Utc>,
    #[serde(default)]
    pub source_platform: String,
    #[serde(default)]
    pub status: JobStatus,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn lenient_amount<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

fn lenient_category<'de, D: Deserializer<'de>>(deserializer: D) -> Result<JobCategory, D::Error> {
    let raw = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(raw).unwrap_or_default())
}

impl JobPosting {
    /// Whitespace-delimited word count of the description.
    pub fn word_count(&self) -> usize {
        self.description.split_whitespace().count()
    }
}
