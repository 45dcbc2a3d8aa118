//! Manual session selection
//!
//! The selection UI looks a user up and hands the result here; only a
//! validated selection reaches the tracker.

use anyhow::{Context, Result};
use regex::Regex;

use super::SessionDetails;
use crate::config::LookupConfig;
use crate::error::SelectionError;

/// Role implied by the shape of a user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityKind {
    Lecturer,
    Learner,
}

/// Identifier patterns from configuration, anchored to the whole identifier
#[derive(Debug, Clone)]
pub struct IdentityPatterns {
    lecturer: Regex,
    learner: Regex,
}

impl IdentityPatterns {
    pub fn from_config(config: &LookupConfig) -> Result<Self> {
        Ok(Self {
            lecturer: anchored(&config.lecturer_pattern).context("Invalid lecturer pattern")?,
            learner: anchored(&config.learner_pattern).context("Invalid learner pattern")?,
        })
    }

    pub fn classify(&self, identifier: &str) -> Option<IdentityKind> {
        if self.lecturer.is_match(identifier) {
            Some(IdentityKind::Lecturer)
        } else if self.learner.is_match(identifier) {
            Some(IdentityKind::Learner)
        } else {
            None
        }
    }
}

fn anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{})$", pattern))
}

/// A user picked in the selection UI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualSelection {
    pub user_id: String,
    pub name: String,
    pub email: String,
    /// Personal series, empty when the user has none yet
    pub series_id: String,
    pub series_title: String,
}

impl ManualSelection {
    /// Check the selection and turn it into session details
    pub fn validate(
        &self,
        patterns: &IdentityPatterns,
    ) -> Result<(IdentityKind, SessionDetails), SelectionError> {
        let user_id = self.user_id.trim();
        if user_id.is_empty() {
            return Err(SelectionError::EmptyIdentifier);
        }

        let kind = patterns
            .classify(user_id)
            .ok_or_else(|| SelectionError::UnrecognizedIdentifier(user_id.to_string()))?;

        let name = self.name.trim();
        if name.is_empty() {
            return Err(SelectionError::MissingName);
        }

        let details = SessionDetails {
            series: self.series_id.clone(),
            series_title: self.series_title.clone(),
            title: name.to_string(),
            organizer: name.to_string(),
            organizer_email: self.email.trim().to_lowercase(),
            take: 0,
        };
        Ok((kind, details))
    }
}
