use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer, Result as ActixResult};
use chrono::{NaiveDate, Utc};
use matchx_core::{EntityId, Error};
use matchx_embed::EmbeddingProvider;
use matchx_engine::{
    Application, Cv, Education, Experience, HybridRanker, MatchStore, Posting, PostingFilter,
    PostingStatus, Query, RecommendationEngine,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-request budget for anything that touches the model or an index scan
const SEARCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared handles the handlers work against
pub struct AppState {
    pub store: Arc<MatchStore>,
    pub provider: Arc<EmbeddingProvider>,
    pub ranker: HybridRanker,
    pub recommender: RecommendationEngine,
}

impl AppState {
    pub fn new(store: Arc<MatchStore>, provider: Arc<EmbeddingProvider>) -> Self {
        Self {
            ranker: HybridRanker::new(provider.clone()),
            recommender: RecommendationEngine::new(store.clone()),
            store,
            provider,
        }
    }
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    limit: Option<usize>,
    location: Option<String>,
    remote: Option<bool>,
    paid: Option<bool>,
    min_salary: Option<f64>,
    max_salary: Option<f64>,
}

#[derive(Serialize)]
struct SearchHit {
    id: u64,
    title: String,
    company: String,
    location: String,
    score: f32,
}

#[derive(Deserialize)]
struct PostingRequest {
    id: u64,
    company: String,
    title: String,
    description: String,
    requirements: String,
    location: String,
    #[serde(default)]
    remote: bool,
    #[serde(default)]
    paid: bool,
    salary: Option<f64>,
    #[serde(default)]
    status: PostingStatus,
    application_deadline: Option<NaiveDate>,
}

#[derive(Deserialize)]
struct CvRequest {
    id: u64,
    owner: u64,
    title: String,
    #[serde(default)]
    skills: Vec<String>,
    #[serde(default)]
    education: Vec<Education>,
    #[serde(default)]
    experience: Vec<Experience>,
    #[serde(default)]
    is_default: bool,
}

#[derive(Deserialize)]
struct ApplicationRequest {
    id: u64,
    posting: u64,
    cv: u64,
    applicant: u64,
}

#[derive(Deserialize)]
struct EmbedRequest {
    q: String,
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Serialize)]
struct RecommendedPosting {
    id: u64,
    title: String,
    company: String,
    location: String,
    score: f32,
    application_deadline: Option<NaiveDate>,
}

#[derive(Serialize)]
struct RecommendedCandidate {
    application: u64,
    applicant: u64,
    cv: u64,
    cv_title: String,
    skills: Vec<String>,
    score: f32,
}

fn ok_results<T: Serialize>(results: Vec<T>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "count": results.len(),
        "results": results,
    }))
}

fn bad_request(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(serde_json::json!({
        "success": false,
        "error": message,
    }))
}

fn error_response(e: Error) -> HttpResponse {
    let body = serde_json::json!({
        "success": false,
        "error": e.to_string(),
    });
    match e {
        Error::EntityNotFound(_) => HttpResponse::NotFound().json(body),
        Error::Timeout => HttpResponse::GatewayTimeout().json(body),
        // Everything else, dimension mismatches included, is an internal
        // failure rather than a client mistake
        e => {
            tracing::warn!(error = %e, "request failed");
            HttpResponse::InternalServerError().json(body)
        }
    }
}

pub struct RestApi;

impl RestApi {
    pub async fn start(state: Arc<AppState>, port: u16) -> std::io::Result<()> {
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(cors)
                .app_data(web::Data::new(state.clone()))
                .configure(configure)
        })
        .bind(("0.0.0.0", port))?
        .run()
        .await
    }
}

/// Route table, shared by the server and the handler tests
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/search", web::post().to(search))
        .route("/embeddings", web::post().to(embed_text))
        .route("/postings", web::put().to(upsert_posting))
        .route("/postings/{id}", web::get().to(get_posting))
        .route("/postings/{id}", web::delete().to(delete_posting))
        .route("/postings/{id}/candidates", web::get().to(candidates))
        .route("/cvs", web::put().to(upsert_cv))
        .route("/applications", web::post().to(create_application))
        .route(
            "/students/{id}/recommendations",
            web::get().to(student_recommendations),
        );
}

async fn search(
    state: web::Data<Arc<AppState>>,
    req: web::Json<SearchRequest>,
) -> ActixResult<HttpResponse> {
    if req.query.trim().is_empty() {
        return Ok(bad_request("'query' must not be empty"));
    }
    let limit = req.limit.unwrap_or(20);
    let filter = PostingFilter {
        location_contains: req.location.clone(),
        remote: req.remote,
        paid: req.paid,
        min_salary: req.min_salary,
        max_salary: req.max_salary,
        ..PostingFilter::published()
    };

    let deadline = Instant::now() + SEARCH_TIMEOUT;
    let hits = match state.ranker.search(
        &state.store,
        &filter,
        Query::Text(&req.query),
        limit,
        Some(deadline),
    ) {
        Ok(hits) => hits,
        Err(e) => return Ok(error_response(e)),
    };

    let results: Vec<SearchHit> = hits
        .into_iter()
        .filter_map(|hit| {
            state.store.get_posting(hit.entity_id).map(|p| SearchHit {
                id: p.id.0,
                title: p.title,
                company: p.company,
                location: p.location,
                score: hit.score,
            })
        })
        .collect();
    Ok(ok_results(results))
}

async fn embed_text(
    state: web::Data<Arc<AppState>>,
    req: web::Json<EmbedRequest>,
) -> ActixResult<HttpResponse> {
    if req.q.trim().is_empty() {
        return Ok(bad_request("'q' must not be empty"));
    }
    let deadline = Instant::now() + SEARCH_TIMEOUT;
    match state.provider.embed(&req.q, Some(deadline)) {
        Ok(vector) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "length": vector.dim(),
            "embedding": vector.as_slice(),
        }))),
        Err(e) => Ok(error_response(e)),
    }
}

async fn upsert_posting(
    state: web::Data<Arc<AppState>>,
    req: web::Json<PostingRequest>,
) -> ActixResult<HttpResponse> {
    let req = req.into_inner();
    let id = EntityId(req.id);
    // Updates keep the original creation time
    let created_at = state
        .store
        .get_posting(id)
        .map(|p| p.created_at)
        .unwrap_or_else(Utc::now);

    let posting = Posting {
        id,
        company: req.company,
        title: req.title,
        description: req.description,
        requirements: req.requirements,
        location: req.location,
        remote: req.remote,
        paid: req.paid,
        salary: req.salary,
        status: req.status,
        created_at,
        application_deadline: req.application_deadline,
    };

    match state.store.transaction(|tx| {
        tx.upsert_posting(posting);
        Ok(())
    }) {
        Ok(()) => Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true }))),
        Err(e) => Ok(error_response(e)),
    }
}

async fn get_posting(
    state: web::Data<Arc<AppState>>,
    path: web::Path<u64>,
) -> ActixResult<HttpResponse> {
    let id = EntityId(path.into_inner());
    match state.store.get_posting(id) {
        Some(posting) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "result": posting,
        }))),
        None => Ok(error_response(Error::EntityNotFound(format!(
            "posting {}",
            id
        )))),
    }
}

async fn delete_posting(
    state: web::Data<Arc<AppState>>,
    path: web::Path<u64>,
) -> ActixResult<HttpResponse> {
    let id = EntityId(path.into_inner());
    if state.store.get_posting(id).is_none() {
        return Ok(error_response(Error::EntityNotFound(format!(
            "posting {}",
            id
        ))));
    }
    match state.store.transaction(|tx| {
        tx.delete_posting(id);
        Ok(())
    }) {
        Ok(()) => Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true }))),
        Err(e) => Ok(error_response(e)),
    }
}

async fn upsert_cv(
    state: web::Data<Arc<AppState>>,
    req: web::Json<CvRequest>,
) -> ActixResult<HttpResponse> {
    let req = req.into_inner();
    let id = EntityId(req.id);
    let created_at = state
        .store
        .get_cv(id)
        .map(|c| c.created_at)
        .unwrap_or_else(Utc::now);

    let cv = Cv {
        id,
        owner: EntityId(req.owner),
        title: req.title,
        skills: req.skills,
        education: req.education,
        experience: req.experience,
        is_default: req.is_default,
        created_at,
    };

    match state.store.transaction(|tx| {
        tx.upsert_cv(cv);
        Ok(())
    }) {
        Ok(()) => Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true }))),
        Err(e) => Ok(error_response(e)),
    }
}

async fn create_application(
    state: web::Data<Arc<AppState>>,
    req: web::Json<ApplicationRequest>,
) -> ActixResult<HttpResponse> {
    let req = req.into_inner();
    let application = Application {
        id: EntityId(req.id),
        posting: EntityId(req.posting),
        cv: EntityId(req.cv),
        applicant: EntityId(req.applicant),
        submitted_at: Utc::now(),
    };
    match state
        .store
        .transaction(|tx| tx.upsert_application(application))
    {
        Ok(()) => Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true }))),
        Err(e) => Ok(error_response(e)),
    }
}

async fn student_recommendations(
    state: web::Data<Arc<AppState>>,
    path: web::Path<u64>,
    query: web::Query<LimitQuery>,
) -> ActixResult<HttpResponse> {
    let student = EntityId(path.into_inner());
    let limit = query.limit.unwrap_or(20);
    let deadline = Instant::now() + SEARCH_TIMEOUT;

    match state
        .recommender
        .recommend_for_student(student, limit, Some(deadline))
    {
        Ok(matches) => {
            let results: Vec<RecommendedPosting> = matches
                .into_iter()
                .map(|m| RecommendedPosting {
                    id: m.posting.id.0,
                    title: m.posting.title,
                    company: m.posting.company,
                    location: m.posting.location,
                    score: m.score,
                    application_deadline: m.posting.application_deadline,
                })
                .collect();
            Ok(ok_results(results))
        }
        Err(e) => Ok(error_response(e)),
    }
}

async fn candidates(
    state: web::Data<Arc<AppState>>,
    path: web::Path<u64>,
    query: web::Query<LimitQuery>,
) -> ActixResult<HttpResponse> {
    let posting = EntityId(path.into_inner());
    let limit = query.limit.unwrap_or(20);
    let deadline = Instant::now() + SEARCH_TIMEOUT;

    match state
        .recommender
        .recommend_candidates(posting, limit, Some(deadline))
    {
        Ok(matches) => {
            let results: Vec<RecommendedCandidate> = matches
                .into_iter()
                .map(|m| {
                    let cv = state.store.get_cv(m.cv);
                    RecommendedCandidate {
                        application: m.application.0,
                        applicant: m.applicant.0,
                        cv: m.cv.0,
                        cv_title: cv.as_ref().map(|c| c.title.clone()).unwrap_or_default(),
                        skills: cv
                            .map(|c| c.skills.into_iter().take(5).collect())
                            .unwrap_or_default(),
                        score: m.score,
                    }
                })
                .collect();
            Ok(ok_results(results))
        }
        Err(e) => Ok(error_response(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{body::to_bytes, test};
    use matchx_engine::EmbedPipeline;

    struct TestApp {
        state: Arc<AppState>,
        pipeline: EmbedPipeline,
    }

    fn test_app() -> TestApp {
        let store = MatchStore::with_defaults();
        let provider = Arc::new(EmbeddingProvider::hashing());
        let pipeline = EmbedPipeline::attach(&store, provider.clone());
        TestApp {
            state: Arc::new(AppState::new(store, provider)),
            pipeline,
        }
    }

    async fn body_json(resp: actix_web::dev::ServiceResponse) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn posting_body(id: u64, title: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "company": "Acme",
            "title": title,
            "description": "building backend services",
            "requirements": "rust experience",
            "location": "Berlin",
            "remote": false,
            "paid": true,
            "salary": 1500.0,
            "status": "published",
        })
    }

    #[actix_web::test]
    async fn test_search_envelope() {
        let app = test_app();
        let service = test::init_service(
            App::new()
                .app_data(web::Data::new(app.state.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/postings")
            .set_json(posting_body(1, "rust backend internship"))
            .to_request();
        let resp = test::call_service(&service, req).await;
        assert!(resp.status().is_success());
        assert!(app.pipeline.wait_idle(Duration::from_secs(5)));

        let req = test::TestRequest::post()
            .uri("/search")
            .set_json(serde_json::json!({ "query": "rust backend" }))
            .to_request();
        let resp = test::call_service(&service, req).await;
        assert!(resp.status().is_success());

        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["count"], 1);
        assert_eq!(body["results"][0]["id"], 1);
        assert_eq!(body["results"][0]["title"], "rust backend internship");
        let score = body["results"][0]["score"].as_f64().unwrap();
        assert!(score > 0.0 && score <= 1.0);
    }

    #[actix_web::test]
    async fn test_search_empty_query_is_bad_request() {
        let app = test_app();
        let service = test::init_service(
            App::new()
                .app_data(web::Data::new(app.state.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/search")
            .set_json(serde_json::json!({ "query": "   " }))
            .to_request();
        let resp = test::call_service(&service, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);

        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
    }

    #[actix_web::test]
    async fn test_unknown_posting_candidates_is_not_found() {
        let app = test_app();
        let service = test::init_service(
            App::new()
                .app_data(web::Data::new(app.state.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/postings/99/candidates")
            .to_request();
        let resp = test::call_service(&service, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_application_with_missing_links_is_not_found() {
        let app = test_app();
        let service = test::init_service(
            App::new()
                .app_data(web::Data::new(app.state.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/applications")
            .set_json(serde_json::json!({
                "id": 1, "posting": 5, "cv": 6, "applicant": 7
            }))
            .to_request();
        let resp = test::call_service(&service, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_update_preserves_created_at() {
        let app = test_app();
        let service = test::init_service(
            App::new()
                .app_data(web::Data::new(app.state.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/postings")
            .set_json(posting_body(1, "first title"))
            .to_request();
        test::call_service(&service, req).await;
        let created = app.state.store.get_posting(EntityId(1)).unwrap().created_at;

        let req = test::TestRequest::put()
            .uri("/postings")
            .set_json(posting_body(1, "second title"))
            .to_request();
        test::call_service(&service, req).await;
        assert_eq!(
            app.state.store.get_posting(EntityId(1)).unwrap().created_at,
            created
        );
    }

    #[::core::prelude::v1::test]
    fn test_dimension_mismatch_maps_to_internal_error() {
        let resp = error_response(Error::InvalidDimension {
            expected: 384,
            actual: 3,
        });
        assert_eq!(
            resp.status(),
            actix_web::http::StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[actix_web::test]
    async fn test_unavailable_encoder_is_internal_error() {
        use matchx_embed::fingerprint;
        use matchx_engine::EntityKind;

        // One embedded posting, so the search reaches the encoder instead
        // of short-circuiting on an empty pool
        let store = MatchStore::with_defaults();
        let posting = Posting {
            id: EntityId(1),
            company: "Acme".to_string(),
            title: "rust backend internship".to_string(),
            description: "building backend services".to_string(),
            requirements: "rust experience".to_string(),
            location: "Berlin".to_string(),
            remote: false,
            paid: true,
            salary: Some(1500.0),
            status: PostingStatus::Published,
            created_at: Utc::now(),
            application_deadline: None,
        };
        store
            .transaction(|tx| {
                tx.upsert_posting(posting.clone());
                Ok(())
            })
            .unwrap();
        let vector = EmbeddingProvider::hashing()
            .embed(&posting.search_text(), None)
            .unwrap();
        store
            .apply_embedding(
                (EntityKind::Posting, posting.id),
                vector,
                fingerprint(&posting.semantic_fields()),
            )
            .unwrap();

        let failing = Arc::new(EmbeddingProvider::new(matchx_embed::EMBEDDING_DIM, || {
            Err(Error::ModelUnavailable("model file missing".into()))
        }));
        let state = Arc::new(AppState::new(store, failing));
        let service = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/search")
            .set_json(serde_json::json!({ "query": "rust backend" }))
            .to_request();
        let resp = test::call_service(&service, req).await;
        assert_eq!(
            resp.status(),
            actix_web::http::StatusCode::INTERNAL_SERVER_ERROR
        );

        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
    }

    #[actix_web::test]
    async fn test_embeddings_endpoint() {
        let app = test_app();
        let service = test::init_service(
            App::new()
                .app_data(web::Data::new(app.state.clone()))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/embeddings")
            .set_json(serde_json::json!({ "q": "rust internship" }))
            .to_request();
        let resp = test::call_service(&service, req).await;
        assert!(resp.status().is_success());

        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["length"], 384);
        assert_eq!(body["embedding"].as_array().unwrap().len(), 384);
    }
}
