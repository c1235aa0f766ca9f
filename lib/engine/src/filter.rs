//! Structured predicate over postings. Evaluated before any vector work:
//! the matching ids become the candidate pool for similarity ranking.

use crate::model::{Posting, PostingStatus};
use serde::{Deserialize, Serialize};

/// Conjunction of optional structured conditions; unset fields match
/// everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostingFilter {
    pub status: Option<PostingStatus>,
    /// Case-insensitive substring match on location
    pub location_contains: Option<String>,
    pub remote: Option<bool>,
    pub paid: Option<bool>,
    pub min_salary: Option<f64>,
    pub max_salary: Option<f64>,
}

impl PostingFilter {
    /// The baseline filter for everything user-facing: published postings
    /// only
    pub fn published() -> Self {
        Self {
            status: Some(PostingStatus::Published),
            ..Self::default()
        }
    }

    pub fn matches(&self, posting: &Posting) -> bool {
        if let Some(status) = self.status {
            if posting.status != status {
                return false;
            }
        }
        if let Some(needle) = &self.location_contains {
            if !posting
                .location
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        if let Some(remote) = self.remote {
            if posting.remote != remote {
                return false;
            }
        }
        if let Some(paid) = self.paid {
            if posting.paid != paid {
                return false;
            }
        }
        if let Some(min) = self.min_salary {
            match posting.salary {
                Some(salary) if salary >= min => {}
                _ => return false,
            }
        }
        if let Some(max) = self.max_salary {
            match posting.salary {
                Some(salary) if salary <= max => {}
                _ => return false,
            }
        }
        true
    }
}
