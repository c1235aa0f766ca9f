//! Recommendations on top of the vector indexes.
//!
//! Two directions: postings for a student (their default CV against the
//! published posting pool) and candidates for a posting (the posting
//! against the CVs of its applicants only - never the whole CV index).

use crate::filter::PostingFilter;
use crate::model::Posting;
use crate::ranker::relevance_score;
use crate::store::MatchStore;
use matchx_core::{EntityId, Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// A posting recommended to a student
#[derive(Debug, Clone)]
pub struct PostingMatch {
    pub posting: Posting,
    pub score: f32,
    pub distance: f32,
}

/// An applicant recommended for a posting
#[derive(Debug, Clone)]
pub struct CandidateMatch {
    pub application: EntityId,
    pub cv: EntityId,
    pub applicant: EntityId,
    pub score: f32,
    pub distance: f32,
}

pub struct RecommendationEngine {
    store: Arc<MatchStore>,
}

impl RecommendationEngine {
    pub fn new(store: Arc<MatchStore>) -> Self {
        Self { store }
    }

    /// Published postings ranked against the student's default CV.
    ///
    /// Ordered by score descending, then newest first, then id. A student
    /// with no default CV, or whose CV has no embedding yet, gets an empty
    /// list - an answerable question with zero matches, not an error. A
    /// student with no CVs at all is unknown to the engine and fails with
    /// [`Error::EntityNotFound`].
    pub fn recommend_for_student(
        &self,
        student: EntityId,
        top_k: usize,
        deadline: Option<Instant>,
    ) -> Result<Vec<PostingMatch>> {
        if self.store.cvs_for(student).is_empty() {
            return Err(Error::EntityNotFound(format!("student {}", student)));
        }
        let cv = match self.store.default_cv_for(student) {
            Some(cv) => cv,
            None => return Ok(Vec::new()),
        };
        let cv_vector = match self.store.cv_index().get(cv.id) {
            Some(v) => v,
            None => return Ok(Vec::new()),
        };

        let index = self.store.posting_index();
        let pool: HashSet<EntityId> = self
            .store
            .filter_postings(&PostingFilter::published())
            .into_iter()
            .filter(|id| index.contains(*id))
            .collect();

        let hits = index.nearest(&cv_vector, top_k, Some(&pool), deadline)?;
        let mut matches: Vec<PostingMatch> = hits
            .into_iter()
            .filter_map(|(id, distance)| {
                self.store.get_posting(id).map(|posting| PostingMatch {
                    posting,
                    score: relevance_score(distance),
                    distance,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.posting.created_at.cmp(&a.posting.created_at))
                .then(a.posting.id.cmp(&b.posting.id))
        });
        Ok(matches)
    }

    /// Applicants to a posting, ranked by their submitted CV's similarity
    /// to the posting.
    ///
    /// Fails with [`Error::EntityNotFound`] for an unknown posting. A
    /// posting without an embedding, or with no applicants, yields an
    /// empty list.
    pub fn recommend_candidates(
        &self,
        posting: EntityId,
        top_k: usize,
        deadline: Option<Instant>,
    ) -> Result<Vec<CandidateMatch>> {
        if self.store.get_posting(posting).is_none() {
            return Err(Error::EntityNotFound(format!("posting {}", posting)));
        }
        let posting_vector = match self.store.posting_index().get(posting) {
            Some(v) => v,
            None => return Ok(Vec::new()),
        };

        let applications = self.store.applications_for_posting(posting);
        // An applicant may have applied with a CV that later lost its
        // embedding; restrict the pool to rankable CVs.
        let cv_index = self.store.cv_index();
        let mut by_cv: HashMap<EntityId, &crate::model::Application> = HashMap::new();
        for app in &applications {
            by_cv.entry(app.cv).or_insert(app);
        }
        let pool: HashSet<EntityId> = by_cv
            .keys()
            .copied()
            .filter(|id| cv_index.contains(*id))
            .collect();

        let hits = cv_index.nearest(&posting_vector, top_k, Some(&pool), deadline)?;
        let mut matches: Vec<CandidateMatch> = hits
            .into_iter()
            .filter_map(|(cv_id, distance)| {
                by_cv.get(&cv_id).map(|app| CandidateMatch {
                    application: app.id,
                    cv: cv_id,
                    applicant: app.applicant,
                    score: relevance_score(distance),
                    distance,
                })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.application.cmp(&b.application))
        });
        Ok(matches)
    }
}
