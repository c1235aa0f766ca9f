//! Domain records for the marketplace entities the engine ranks.
//!
//! Only the text fields listed by `semantic_fields` feed the embedding;
//! everything else (status, location, salary, deadlines) is structured
//! metadata that filters but never re-embeds.

use chrono::{DateTime, NaiveDate, Utc};
use matchx_core::EntityId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostingStatus {
    #[default]
    Draft,
    Published,
    Closed,
}

/// An internship posting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Posting {
    pub id: EntityId,
    pub company: String,
    pub title: String,
    pub description: String,
    pub requirements: String,
    pub location: String,
    #[serde(default)]
    pub remote: bool,
    #[serde(default)]
    pub paid: bool,
    pub salary: Option<f64>,
    #[serde(default)]
    pub status: PostingStatus,
    pub created_at: DateTime<Utc>,
    pub application_deadline: Option<NaiveDate>,
}

impl Posting {
    /// The designated semantic fields, in stable order. Any change to one
    /// of these warrants re-embedding; changes elsewhere do not.
    pub fn semantic_fields(&self) -> Vec<String> {
        vec![
            self.title.clone(),
            self.description.clone(),
            self.requirements.clone(),
        ]
    }

    /// Text fed to the encoder
    pub fn search_text(&self) -> String {
        format!("{} {} {}", self.title, self.description, self.requirements)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Education {
    pub degree: String,
    pub institution: String,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub role: String,
    pub company: String,
    #[serde(default)]
    pub description: String,
}

/// A student CV. A student may keep several; the default one drives their
/// recommendations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cv {
    pub id: EntityId,
    /// Owning student
    pub owner: EntityId,
    pub title: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub experience: Vec<Experience>,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

impl Cv {
    fn education_text(&self) -> String {
        self.education
            .iter()
            .map(|e| format!("{} {}", e.degree, e.institution))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn experience_text(&self) -> String {
        self.experience
            .iter()
            .map(|e| format!("{} {} {}", e.role, e.company, e.description))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn semantic_fields(&self) -> Vec<String> {
        vec![
            self.title.clone(),
            self.skills.join(" "),
            self.education_text(),
            self.experience_text(),
        ]
    }

    pub fn search_text(&self) -> String {
        self.semantic_fields().join(" ")
    }
}

/// A student's application linking one of their CVs to a posting.
/// Applications define the candidate pool for per-posting candidate
/// recommendations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: EntityId,
    pub posting: EntityId,
    pub cv: EntityId,
    pub applicant: EntityId,
    pub submitted_at: DateTime<Utc>,
}
