//! Thin HTTP surface over the services.
//!
//! Every handler resolves the user, builds the per-request services, and
//! delegates; no insight logic lives here. Errors map onto status codes by
//! category — credential problems are 401 with an explicit re-authenticate
//! signal, collaborator outages are 502, bad input is 400.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::{DbTaskInsight, EmailSource, EnergyLevel, FocusQuality, Quadrant};
use crate::email::{self, IncomingEmail};
use crate::error::AppError;
use crate::state::AppState;
use crate::ticktick::{NewTask, TaskServiceError, TickTask};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/auth/status", get(auth_status))
        .route("/auth/login", get(auth_login))
        .route("/callback", get(oauth_callback))
        .route("/email/{provider}/callback", get(email_oauth_callback))
        .route("/tasks", post(create_task).get(list_tasks))
        .route("/tasks/top", get(top_tasks))
        .route("/tasks/prioritize", post(prioritize_tasks))
        .route("/tasks/analyze/vague", get(vague_tasks))
        .route("/tasks/analyze/stale", get(stale_tasks))
        .route("/tasks/analyze-all", post(analyze_all))
        .route("/tasks/backfill-project-refs", post(backfill_project_refs))
        .route("/tasks/{task_id}", get(task_details))
        .route("/tasks/{task_id}/complete", post(complete_task))
        .route(
            "/tasks/{task_id}/clarifications",
            get(get_clarifications).post(save_clarifications),
        )
        .route("/energy/log", post(log_energy))
        .route("/energy/current", get(current_energy))
        .route("/energy/suggest", get(suggest_by_energy))
        .route("/energy/patterns", get(energy_patterns))
        .route("/daily", get(daily_review))
        .route("/email/receive", post(receive_email))
        .route("/email/parse-raw", post(receive_raw_email))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    App(AppError),
    BadRequest(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError::App(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, reauth) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, false),
            ApiError::App(err) => {
                let status = match &err {
                    AppError::Auth(_) => StatusCode::UNAUTHORIZED,
                    AppError::NotFound(_) => StatusCode::NOT_FOUND,
                    AppError::Email(_) => StatusCode::BAD_REQUEST,
                    AppError::TaskService(_) | AppError::Ai(_) => StatusCode::BAD_GATEWAY,
                    AppError::Db(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let reauth = err.requires_reauth();
                (status, err.to_string(), reauth)
            }
        };
        let body = Json(json!({ "error": message, "requiresReauth": reauth }));
        (status, body).into_response()
    }
}

fn bad_request(msg: impl Into<String>) -> ApiError {
    ApiError::BadRequest(msg.into())
}

fn parse_energy(raw: Option<&str>) -> Result<Option<EnergyLevel>, ApiError> {
    match raw {
        None => Ok(None),
        Some(s) => EnergyLevel::parse(s)
            .map(Some)
            .ok_or_else(|| bad_request(format!("unknown energy level {:?}", s))),
    }
}

// ─────────────────────────────────────────────────────────────────────
// Health & auth
// ─────────────────────────────────────────────────────────────────────

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn auth_status(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state.default_user()?;
    Ok(Json(json!({
        "ticktick": {
            "authenticated": user.access_token.as_deref().is_some_and(|t| !t.is_empty()),
        },
        "gmail": {
            "authenticated": user.gmail_access_token.is_some(),
            "email": user.gmail_email,
        },
        "outlook": {
            "authenticated": user.outlook_access_token.is_some(),
            "email": user.outlook_email,
        },
    })))
}

async fn auth_login(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let url = state.ticktick_oauth().authorize_url("focusdeck");
    Json(json!({ "authorizeUrl": url }))
}

#[derive(Deserialize)]
struct CallbackQuery {
    code: String,
}

async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state.default_user()?;
    let tokens = state
        .ticktick_oauth()
        .exchange_code_for_token(&query.code)
        .await
        .map_err(AppError::from)?;

    let expires_at = tokens
        .expires_in
        .map(|secs| (Utc::now() + chrono::Duration::seconds(secs)).to_rfc3339());
    let db = state.db();
    let store = db
        .lock()
        .map_err(|_| AppError::Internal("insight store lock poisoned".into()))?;
    store
        .update_ticktick_tokens(
            user.id,
            &tokens.access_token,
            tokens.refresh_token.as_deref(),
            expires_at.as_deref(),
        )
        .map_err(AppError::from)?;

    Ok(Json(json!({ "message": "TickTick connected" })))
}

async fn email_oauth_callback(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let source = EmailSource::parse(&provider)
        .ok_or_else(|| bad_request(format!("unknown email provider {:?}", provider)))?;
    let app = match source {
        EmailSource::Gmail => state.config.gmail_oauth.clone(),
        EmailSource::Outlook => state.config.outlook_oauth.clone(),
    }
    .ok_or_else(|| bad_request(format!("{} OAuth is not configured", source.as_str())))?;

    let user = state.default_user()?;
    let oauth = crate::email::MailOAuth::new(source, app, &state.config.email_redirect_uri);
    let tokens = oauth.exchange_code_for_token(&query.code).await?;
    let expiry = tokens
        .expires_in
        .map(|secs| (Utc::now() + chrono::Duration::seconds(secs)).to_rfc3339());

    let db = state.db();
    let store = db
        .lock()
        .map_err(|_| AppError::Internal("insight store lock poisoned".into()))?;
    match source {
        EmailSource::Gmail => store.update_gmail_tokens(
            user.id,
            &tokens.access_token,
            tokens.refresh_token.as_deref(),
            expiry.as_deref(),
            None,
        ),
        EmailSource::Outlook => store.update_outlook_tokens(
            user.id,
            &tokens.access_token,
            tokens.refresh_token.as_deref(),
            expiry.as_deref(),
            None,
        ),
    }
    .map_err(AppError::from)?;

    Ok(Json(json!({ "message": format!("{} connected", source.as_str()) })))
}

// ─────────────────────────────────────────────────────────────────────
// Tasks
// ─────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTaskRequest {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    priority: Option<i64>,
    #[serde(default = "default_true")]
    auto_breakdown: bool,
}

fn default_true() -> bool {
    true
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state.default_user()?;
    let service = state.task_service_for(&user)?;

    let task = service
        .create_task(&NewTask {
            title: req.title,
            content: req.description.clone(),
            project_id: req.project_id,
            priority: req.priority,
            ..Default::default()
        })
        .await
        .map_err(AppError::from)?;

    let analyzer = state.analyzer(Arc::clone(&service));
    let analysis = analyzer
        .analyze(
            user.id,
            &task.id,
            &task.title,
            req.description.as_deref(),
            req.auto_breakdown,
        )
        .await?;

    Ok(Json(json!({ "task": task, "analysis": analysis })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTasksQuery {
    #[serde(default)]
    completed: Option<bool>,
    #[serde(default)]
    energy_level: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AiInsights {
    energy_level: Option<EnergyLevel>,
    estimated_minutes: Option<i64>,
    priority_score: Option<f64>,
    eisenhower_quadrant: Option<Quadrant>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskView {
    #[serde(flatten)]
    task: TickTask,
    #[serde(skip_serializing_if = "Option::is_none")]
    ai_insights: Option<AiInsights>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email_source: Option<EmailSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email_has_attachments: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email_attachment_count: Option<i64>,
}

/// Rebuild a task-shaped view from a cached insight row, for when the remote
/// listing is unavailable.
fn task_from_insight(insight: &DbTaskInsight) -> TickTask {
    TickTask {
        id: insight.external_task_id.clone(),
        title: insight.title.clone(),
        content: insight.description.clone(),
        project_id: insight.project_ref.clone(),
        status: if insight.completed { 2 } else { 0 },
        priority: None,
        due_date: None,
        parent_id: None,
    }
}

fn into_view(mut task: TickTask, insight: Option<&DbTaskInsight>) -> TaskView {
    let Some(insight) = insight else {
        return TaskView {
            task,
            ai_insights: None,
            email_source: None,
            email_link: None,
            email_has_attachments: None,
            email_attachment_count: None,
        };
    };

    // A listing that omits the project still gets the stored ref, so deep
    // links keep working.
    if task.project_id.is_none() {
        task.project_id = insight.project_ref.clone();
    }

    TaskView {
        task,
        ai_insights: Some(AiInsights {
            energy_level: insight.energy_level,
            estimated_minutes: insight.estimated_duration_minutes,
            priority_score: insight.priority_score,
            eisenhower_quadrant: insight.eisenhower_quadrant,
        }),
        email_source: insight.email_source,
        email_link: insight.email_link.clone(),
        email_has_attachments: insight.email_source.map(|_| insight.email_has_attachments),
        email_attachment_count: insight.email_attachment_count,
    }
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<TaskView>>, ApiError> {
    let user = state.default_user()?;
    let service = state.task_service_for(&user)?;
    let energy_filter = parse_energy(query.energy_level.as_deref())?;

    let mut tasks = match service.list_tasks(query.completed).await {
        Ok(tasks) => tasks,
        Err(TaskServiceError::Auth(msg)) => return Err(AppError::Auth(msg).into()),
        Err(e) => {
            // Same policy as the reconciliation core: stale-but-present data
            // outranks absent data.
            log::warn!("Task listing failed, serving cached insights: {}", e);
            let db = state.db();
            let store = db
                .lock()
                .map_err(|_| AppError::Internal("insight store lock poisoned".into()))?;
            store
                .cached_tasks(user.id, query.completed.unwrap_or(false))
                .map_err(AppError::from)?
                .iter()
                .map(task_from_insight)
                .collect()
        }
    };

    if let Some(level) = energy_filter {
        let db = state.db();
        let store = db
            .lock()
            .map_err(|_| AppError::Internal("insight store lock poisoned".into()))?;
        let matching: Vec<String> = store
            .top_by_priority(user.id, -1, Some(level))
            .map_err(AppError::from)?
            .into_iter()
            .map(|i| i.external_task_id)
            .collect();
        tasks.retain(|t| matching.contains(&t.id));
    }

    let db = state.db();
    let store = db
        .lock()
        .map_err(|_| AppError::Internal("insight store lock poisoned".into()))?;
    let views = tasks
        .into_iter()
        .map(|task| {
            let insight = store.get_insight(user.id, &task.id).ok().flatten();
            into_view(task, insight.as_ref())
        })
        .collect();

    Ok(Json(views))
}

async fn task_details(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state.default_user()?;
    let service = state.task_service_for(&user)?;

    let task = service.get_task(&task_id).await.map_err(AppError::from)?;
    let analyzer = state.analyzer(service);
    let insights = analyzer.get_task_details(user.id, &task_id)?;

    Ok(Json(json!({ "task": task, "insights": insights })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteTaskQuery {
    #[serde(default)]
    actual_minutes: Option<i64>,
}

async fn complete_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    Query(query): Query<CompleteTaskQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state.default_user()?;
    let service = state.task_service_for(&user)?;

    service
        .complete_task(&task_id)
        .await
        .map_err(AppError::from)?;

    let analyzer = state.analyzer(service);
    analyzer.update_completion(user.id, &task_id, query.actual_minutes)?;

    Ok(Json(json!({ "message": "Task completed successfully" })))
}

#[derive(Deserialize)]
struct StaleQuery {
    #[serde(default)]
    days: Option<i64>,
}

async fn stale_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StaleQuery>,
) -> Result<Json<Vec<crate::analyzer::StaleTaskView>>, ApiError> {
    let user = state.default_user()?;
    let service = state.task_service_for(&user)?;
    let analyzer = state.analyzer(service);

    let days = query.days.unwrap_or(state.config.stale_threshold_days);
    if days < 1 {
        return Err(bad_request("days must be at least 1"));
    }
    Ok(Json(analyzer.detect_stale(user.id, days).await?))
}

async fn vague_tasks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<crate::analyzer::VagueTask>>, ApiError> {
    let user = state.default_user()?;
    let service = state.task_service_for(&user)?;
    let analyzer = state.analyzer(service);
    Ok(Json(analyzer.identify_vague(user.id).await?))
}

async fn analyze_all(
    State(state): State<Arc<AppState>>,
) -> Result<Json<crate::analyzer::BulkAnalysisReport>, ApiError> {
    let user = state.default_user()?;
    let service = state.task_service_for(&user)?;
    let analyzer = state.analyzer(service);
    Ok(Json(analyzer.analyze_all(user.id).await?))
}

async fn backfill_project_refs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<crate::analyzer::BackfillReport>, ApiError> {
    let user = state.default_user()?;
    let service = state.task_service_for(&user)?;
    let analyzer = state.analyzer(service);
    Ok(Json(analyzer.backfill_project_refs(user.id).await?))
}

// ─────────────────────────────────────────────────────────────────────
// Prioritization
// ─────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrioritizeQuery {
    #[serde(default)]
    energy_level: Option<String>,
}

async fn prioritize_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PrioritizeQuery>,
) -> Result<Json<Vec<crate::prioritizer::PrioritizedTask>>, ApiError> {
    let user = state.default_user()?;
    let service = state.task_service_for(&user)?;
    let energy = parse_energy(query.energy_level.as_deref())?;

    let tasks = service
        .list_tasks(Some(false))
        .await
        .map_err(AppError::from)?;
    let prioritizer = state.prioritizer();
    Ok(Json(prioritizer.prioritize(user.id, &tasks, energy).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopTasksQuery {
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    energy_level: Option<String>,
}

async fn top_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TopTasksQuery>,
) -> Result<Json<Vec<crate::prioritizer::TaskSummary>>, ApiError> {
    let user = state.default_user()?;
    let energy = parse_energy(query.energy_level.as_deref())?;
    let limit = query.limit.unwrap_or(3).clamp(1, 10);
    Ok(Json(state.prioritizer().get_top(user.id, limit, energy)?))
}

// ─────────────────────────────────────────────────────────────────────
// Clarifications
// ─────────────────────────────────────────────────────────────────────

async fn get_clarifications(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state.default_user()?;
    let db = state.db();
    let store = db
        .lock()
        .map_err(|_| AppError::Internal("insight store lock poisoned".into()))?;
    let insight = store
        .get_insight(user.id, &task_id)
        .map_err(AppError::from)?;

    let (questions, answers) = insight
        .map(|i| {
            (
                i.clarifying_questions.unwrap_or_default(),
                i.clarifying_answers.unwrap_or_default(),
            )
        })
        .unwrap_or_default();

    Ok(Json(json!({
        "isVague": !questions.is_empty(),
        "questions": questions,
        "existingAnswers": answers,
    })))
}

async fn save_clarifications(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    Json(answers): Json<BTreeMap<String, String>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state.default_user()?;
    let service = state.task_service_for(&user)?;
    let analyzer = state.analyzer(service);

    analyzer
        .save_clarifying_answers(user.id, &task_id, answers.clone())
        .await?;

    Ok(Json(json!({
        "message": "Answers saved successfully",
        "taskId": task_id,
        "answers": answers,
    })))
}

// ─────────────────────────────────────────────────────────────────────
// Energy
// ─────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogEnergyRequest {
    energy_level: String,
    #[serde(default)]
    focus_quality: Option<String>,
}

async fn log_energy(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LogEnergyRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state.default_user()?;
    let level = EnergyLevel::parse(&req.energy_level)
        .ok_or_else(|| bad_request(format!("unknown energy level {:?}", req.energy_level)))?;
    let focus = match req.focus_quality.as_deref() {
        None => None,
        Some(raw) => Some(
            FocusQuality::parse(raw)
                .ok_or_else(|| bad_request(format!("unknown focus quality {:?}", raw)))?,
        ),
    };

    let log_id = state.energy_tracker().log(user.id, level, focus)?;
    Ok(Json(json!({ "message": "Energy logged", "logId": log_id })))
}

async fn current_energy(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state.default_user()?;
    let level = state.energy_tracker().recommend_current(user.id)?;
    Ok(Json(json!({ "recommendedEnergy": level })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuggestQuery {
    energy_level: String,
    #[serde(default)]
    limit: Option<i64>,
}

async fn suggest_by_energy(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SuggestQuery>,
) -> Result<Json<Vec<crate::prioritizer::TaskSummary>>, ApiError> {
    let user = state.default_user()?;
    let level = EnergyLevel::parse(&query.energy_level)
        .ok_or_else(|| bad_request(format!("unknown energy level {:?}", query.energy_level)))?;
    let limit = query.limit.unwrap_or(5).clamp(1, 20);
    Ok(Json(state.energy_tracker().suggest_tasks(user.id, level, limit)?))
}

#[derive(Deserialize)]
struct PatternsQuery {
    #[serde(default)]
    days: Option<i64>,
}

async fn energy_patterns(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PatternsQuery>,
) -> Result<Json<crate::energy_tracker::EnergyPatterns>, ApiError> {
    let user = state.default_user()?;
    let days = query.days.unwrap_or(30).clamp(7, 90);
    Ok(Json(state.energy_tracker().patterns(user.id, days)?))
}

// ─────────────────────────────────────────────────────────────────────
// Daily review
// ─────────────────────────────────────────────────────────────────────

async fn daily_review(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state.default_user()?;
    let service = state.task_service_for(&user)?;
    let analyzer = state.analyzer(Arc::clone(&service));

    let stale = analyzer
        .detect_stale(user.id, state.config.stale_threshold_days)
        .await?;
    let top = state.prioritizer().get_top(user.id, 3, None)?;
    let recommended = state.energy_tracker().recommend_current(user.id)?;

    let all_tasks = match service.list_tasks(Some(false)).await {
        Ok(tasks) => tasks,
        Err(e) => {
            log::warn!("Task listing failed during daily review: {}", e);
            Vec::new()
        }
    };
    let today = Utc::now().date_naive();
    let due_today: Vec<&TickTask> = all_tasks
        .iter()
        .filter(|t| {
            t.due_date
                .as_deref()
                .and_then(parse_task_service_date)
                .map(|dt| dt.date_naive() == today)
                .unwrap_or(false)
        })
        .collect();

    Ok(Json(json!({
        "date": today,
        "recommendedEnergy": recommended,
        "topPriorities": top,
        "dueToday": due_today,
        "staleTasks": stale.into_iter().take(5).collect::<Vec<_>>(),
        "message": "Good morning! Here's your focus for today.",
    })))
}

/// Parse the service's date strings, which show up as RFC 3339 or with the
/// unpadded `+0000` offset variant.
fn parse_task_service_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let normalized = raw.replace("+0000", "+00:00").replace("-0000", "+00:00");
    DateTime::parse_from_rfc3339(&normalized)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

// ─────────────────────────────────────────────────────────────────────
// Email
// ─────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiveEmailRequest {
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    body: String,
    #[serde(default)]
    from: String,
    #[serde(default)]
    message_id: String,
    #[serde(default)]
    has_attachments: bool,
    #[serde(default)]
    attachment_count: i64,
    #[serde(default)]
    source: Option<String>,
}

fn parse_source(raw: Option<&str>) -> Result<EmailSource, ApiError> {
    match raw {
        None => Ok(EmailSource::Gmail),
        Some(s) => {
            EmailSource::parse(s).ok_or_else(|| bad_request(format!("unknown email source {:?}", s)))
        }
    }
}

async fn receive_email(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReceiveEmailRequest>,
) -> Result<Json<crate::email::EmailTaskResult>, ApiError> {
    let user = state.default_user()?;
    let service = state.task_service_for(&user)?;
    let source = parse_source(req.source.as_deref())?;

    let incoming = IncomingEmail {
        subject: req.subject.unwrap_or_else(|| "Untitled".to_string()),
        from: req.from,
        message_id: req.message_id,
        body: req.body,
        has_attachments: req.has_attachments,
        attachment_count: req.attachment_count,
    };

    let receiver = state.email_receiver(service);
    Ok(Json(receiver.process_email(user.id, &incoming, source).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEmailQuery {
    #[serde(default)]
    source: Option<String>,
}

async fn receive_raw_email(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RawEmailQuery>,
    raw: Bytes,
) -> Result<Json<crate::email::EmailTaskResult>, ApiError> {
    let user = state.default_user()?;
    let service = state.task_service_for(&user)?;
    let source = parse_source(query.source.as_deref())?;

    let incoming = email::parse_raw(&raw)?;
    let receiver = state.email_receiver(service);
    Ok(Json(receiver.process_email(user.id, &incoming, source).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_task_service_date_variants() {
        for raw in [
            "2026-08-09T23:59:00.000+0000",
            "2026-08-09T23:59:00.000Z",
            "2026-08-09T23:59:00+00:00",
        ] {
            let parsed = parse_task_service_date(raw).expect(raw);
            assert_eq!(parsed.date_naive().to_string(), "2026-08-09");
        }
        assert!(parse_task_service_date("next tuesday").is_none());
    }

    #[test]
    fn test_parse_energy_rejects_unknown() {
        assert!(parse_energy(None).unwrap().is_none());
        assert_eq!(parse_energy(Some("high")).unwrap(), Some(EnergyLevel::High));
        assert!(parse_energy(Some("turbo")).is_err());
    }

    #[test]
    fn test_parse_source_defaults_to_gmail() {
        assert_eq!(parse_source(None).unwrap(), EmailSource::Gmail);
        assert_eq!(parse_source(Some("outlook")).unwrap(), EmailSource::Outlook);
        assert!(parse_source(Some("fax")).is_err());
    }
}
