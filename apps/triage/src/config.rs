use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::warn;

use crate::errors::AppError;
use crate::models::{JobPosting, UserProfile};
use crate::pipeline::DEFAULT_WORKERS;
use crate::proposals::{DEFAULT_HIGHEND_THRESHOLD, DEFAULT_MAX_PROPOSALS};
use crate::routing::ModelCatalog;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub profile_path: PathBuf,
    pub jobs_path: PathBuf,
    /// Built-in catalog when unset.
    pub catalog_path: Option<PathBuf>,
    pub workers: usize,
    pub deadline: Option<Duration>,
    pub daily_limit: f64,
    pub monthly_limit: f64,
    /// Descriptions longer than this many characters get a high-end model
    /// for proposal generation.
    pub highend_threshold: usize,
    pub max_proposals: usize,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. `from_env` passes the process
    /// environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let config = Config {
            profile_path: require(&lookup, "TRIAGE_PROFILE_PATH")?.into(),
            jobs_path: require(&lookup, "TRIAGE_JOBS_PATH")?.into(),
            catalog_path: lookup("TRIAGE_CATALOG_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            workers: parse_or(&lookup, "TRIAGE_WORKERS", DEFAULT_WORKERS)?,
            deadline: lookup("TRIAGE_DEADLINE_SECS")
                .map(|v| {
                    v.parse::<u64>()
                        .context("TRIAGE_DEADLINE_SECS must be a whole number of seconds")
                })
                .transpose()?
                .map(Duration::from_secs),
            daily_limit: parse_or(&lookup, "TRIAGE_DAILY_LIMIT", 20.0)?,
            monthly_limit: parse_or(&lookup, "TRIAGE_MONTHLY_LIMIT", 300.0)?,
            highend_threshold: parse_or(
                &lookup,
                "TRIAGE_HIGHEND_THRESHOLD",
                DEFAULT_HIGHEND_THRESHOLD,
            )?,
            max_proposals: parse_or(&lookup, "TRIAGE_MAX_PROPOSALS", DEFAULT_MAX_PROPOSALS)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        };

        if config.workers == 0 {
            anyhow::bail!("TRIAGE_WORKERS must be at least 1");
        }
        Ok(config)
    }
}

fn require(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("'{key}' has an invalid value: {raw}")),
        None => Ok(default),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Input files
// ────────────────────────────────────────────────────────────────────────────

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T, AppError> {
    let raw = fs::read_to_string(path).map_err(|e| {
        AppError::Configuration(format!("cannot read {what} {}: {e}", path.display()))
    })?;
    serde_json::from_str(&raw)
        .map_err(|e| AppError::Configuration(format!("invalid {what} {}: {e}", path.display())))
}

/// Loads and validates the user profile.
pub fn load_profile(path: &Path) -> Result<UserProfile, AppError> {
    let profile: UserProfile = read_json(path, "profile")?;
    profile.validate()?;
    Ok(profile)
}

/// Loads the job list. The file itself must be a JSON array; a posting
/// inside it that can't be read is logged and skipped so one bad entry
/// doesn't cost the rest of the batch.
pub fn load_jobs(path: &Path) -> Result<Vec<JobPosting>, AppError> {
    let entries: Vec<Value> = read_json(path, "job list")?;
    let total = entries.len();

    let jobs: Vec<JobPosting> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let id = entry
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("<no id>")
                .to_string();
            match serde_json::from_value(entry) {
                Ok(job) => Some(job),
                Err(e) => {
                    warn!("Skipping malformed posting #{index} ({id}): {e}");
                    None
                }
            }
        })
        .collect();

    if jobs.len() < total {
        warn!(
            "Loaded {} of {total} posting(s) from {}",
            jobs.len(),
            path.display()
        );
    }
    Ok(jobs)
}

pub fn load_catalog(path: Option<&Path>) -> Result<ModelCatalog, AppError> {
    match path {
        Some(path) => ModelCatalog::from_path(path),
        None => Ok(ModelCatalog::default_catalog()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("TRIAGE_PROFILE_PATH", "profile.json"),
        ("TRIAGE_JOBS_PATH", "jobs.json"),
    ];

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.daily_limit, 20.0);
        assert_eq!(config.monthly_limit, 300.0);
        assert_eq!(config.highend_threshold, 100);
        assert_eq!(config.max_proposals, 5);
        assert_eq!(config.deadline, None);
        assert_eq!(config.catalog_path, None);
        assert_eq!(config.rust_log, "info");
    }

    #[test]
    fn test_overrides_parsed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("TRIAGE_WORKERS", "8"),
            ("TRIAGE_DEADLINE_SECS", "30"),
            ("TRIAGE_DAILY_LIMIT", "2.5"),
            ("TRIAGE_CATALOG_PATH", "models.json"),
        ]);
        let config = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.deadline, Some(Duration::from_secs(30)));
        assert_eq!(config.daily_limit, 2.5);
        assert_eq!(config.catalog_path, Some(PathBuf::from("models.json")));
    }

    #[test]
    fn test_missing_required_variable() {
        let err = Config::from_lookup(lookup(&REQUIRED[..1])).unwrap_err();
        assert!(err.to_string().contains("TRIAGE_JOBS_PATH"));
    }

    #[test]
    fn test_malformed_values_rejected() {
        for (key, value) in [
            ("TRIAGE_WORKERS", "four"),
            ("TRIAGE_WORKERS", "0"),
            ("TRIAGE_DAILY_LIMIT", "lots"),
            ("TRIAGE_DEADLINE_SECS", "-1"),
        ] {
            let mut pairs = REQUIRED.to_vec();
            pairs.push((key, value));
            assert!(
                Config::from_lookup(lookup(&pairs)).is_err(),
                "{key}={value} should be rejected"
            );
        }
    }

    #[test]
    fn test_load_profile_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"name":"Ada","skills":[{{"name":"Rust","proficiency":1.5}}],"hourly_rate":50}}"#
        )
        .unwrap();
        let err = load_profile(file.path()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_load_jobs_reads_partial_postings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"id":"a"}},{{"id":"b","budget":100}}]"#).unwrap();
        let jobs = load_jobs(file.path()).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1].budget, 100.0);
    }

    #[test]
    fn test_load_jobs_skips_malformed_posting() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"id":"good","budget":500,"category":"WEB_DEV"}},
                {{"title":"no id","budget":100}},
                {{"id":"null-budget","budget":null,"category":7}},
                {{"id":42}}
            ]"#
        )
        .unwrap();

        let jobs = load_jobs(file.path()).unwrap();

        let ids: Vec<&str> = jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["good", "null-budget"]);
        assert_eq!(jobs[0].budget, 500.0);
        assert_eq!(jobs[1].budget, 0.0);
    }

    #[test]
    fn test_load_jobs_requires_array() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"id":"a"}}"#).unwrap();
        let err = load_jobs(file.path()).unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_unreadable_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_jobs(&dir.path().join("missing.json")).unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_default_catalog_when_unset() {
        let catalog = load_catalog(None).unwrap();
        assert!(!catalog.models().is_empty());
    }
}
