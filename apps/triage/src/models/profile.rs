use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::job::{JobCategory, Skill};

/// The freelancer we triage postings for. Loaded once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    #[serde(default)]
    pub skills: Vec<Skill>,
    pub hourly_rate: f64,
    #[serde(default)]
    pub preferred_categories: HashSet<JobCategory>,
}

impl UserProfile {
    /// Rejects profiles the pipeline cannot work with. A bad profile is a
    /// startup configuration error, not a per-job input error.
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.hourly_rate.is_finite() || self.hourly_rate <= 0.0 {
            return Err(AppError::Configuration(format!(
                "profile '{}' has invalid hourly_rate {}",
                self.name, self.hourly_rate
            )));
        }
        if let Some(skill) = self
            .skills
            .iter()
            .find(|s| !(0.0..=1.0).contains(&s.proficiency))
        {
            return Err(AppError::Configuration(format!(
                "skill '{}' has proficiency {} outside 0..=1",
                skill.name, skill.proficiency
            )));
        }
        Ok(())
    }

    /// Skill names joined by spaces, the text side of skill matching.
    pub fn skill_text(&self) -> String {
        self.skills
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn prefers(&self, category: JobCategory) -> bool {
        self.preferred_categories.contains(&category)
    }
}
