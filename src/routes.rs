use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::dashboard::{self, RosterQuery};
use crate::db;
use crate::error::{AppError, ValidationError};
use crate::invites;
use crate::models::{
    AcceptInvite, EnrollRequest, Invite, NewAttendance, NewEvent, NewGrade, NewInvite, NewUser,
    ProfileUpdate, RiskInput, RoleUpdate,
};
use crate::risk::RiskBucket;
use crate::state::AppState;

type SharedState = Arc<AppState>;

pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok", "mode": "free_rules" }))
}

pub async fn predict_handler(
    State(state): State<SharedState>,
    Json(input): Json<RiskInput>,
) -> Result<impl IntoResponse, AppError> {
    input.validate()?;
    Ok(Json(state.scorer.score(&input)))
}

pub async fn create_user_handler(
    State(state): State<SharedState>,
    Json(payload): Json<NewUser>,
) -> Result<impl IntoResponse, AppError> {
    let user = db::create_user(&state.pool, &payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn role_handler(
    State(state): State<SharedState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<RoleUpdate>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(db::set_role(&state.pool, user_id, payload.role).await?))
}

pub async fn profile_handler(
    State(state): State<SharedState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<ProfileUpdate>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(db::update_profile(&state.pool, user_id, &payload).await?))
}

pub async fn enroll_handler(
    State(state): State<SharedState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<EnrollRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = db::enroll(&state.pool, user_id, &payload).await?;
    let (status, message) = if outcome.created {
        (StatusCode::CREATED, "Enrolled successfully!")
    } else {
        (StatusCode::OK, "You are already enrolled in this course.")
    };

    Ok((
        status,
        Json(json!({
            "enrollment_id": outcome.enrollment_id,
            "course_id": outcome.course_id,
            "created": outcome.created,
            "message": message,
        })),
    ))
}

pub async fn dashboard_handler(
    State(state): State<SharedState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    if db::fetch_user(&state.pool, user_id).await?.is_none() {
        return Err(AppError::NotFound("user"));
    }
    let rows = db::fetch_enrollment_rows(&state.pool, Some(user_id)).await?;
    Ok(Json(dashboard::student_dashboard(&rows)))
}

pub async fn list_grades_handler(
    State(state): State<SharedState>,
    Path(enrollment_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(db::list_grades(&state.pool, enrollment_id).await?))
}

pub async fn add_grade_handler(
    State(state): State<SharedState>,
    Path(enrollment_id): Path<Uuid>,
    Json(payload): Json<NewGrade>,
) -> Result<impl IntoResponse, AppError> {
    let change = db::add_grade(&state.pool, enrollment_id, &payload).await?;
    Ok((StatusCode::CREATED, Json(change)))
}

pub async fn update_grade_handler(
    State(state): State<SharedState>,
    Path(grade_id): Path<Uuid>,
    Json(payload): Json<NewGrade>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(db::update_grade(&state.pool, grade_id, &payload).await?))
}

pub async fn delete_grade_handler(
    State(state): State<SharedState>,
    Path(grade_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(db::delete_grade(&state.pool, grade_id).await?))
}

pub async fn list_attendance_handler(
    State(state): State<SharedState>,
    Path(enrollment_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(db::list_attendance(&state.pool, enrollment_id).await?))
}

pub async fn add_attendance_handler(
    State(state): State<SharedState>,
    Path(enrollment_id): Path<Uuid>,
    Json(payload): Json<NewAttendance>,
) -> Result<impl IntoResponse, AppError> {
    let change = db::add_attendance(&state.pool, enrollment_id, &payload).await?;
    Ok((StatusCode::CREATED, Json(change)))
}

pub async fn update_attendance_handler(
    State(state): State<SharedState>,
    Path(attendance_id): Path<Uuid>,
    Json(payload): Json<NewAttendance>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        db::update_attendance(&state.pool, attendance_id, &payload).await?,
    ))
}

pub async fn delete_attendance_handler(
    State(state): State<SharedState>,
    Path(attendance_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(db::delete_attendance(&state.pool, attendance_id).await?))
}

pub async fn overview_handler(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, AppError> {
    let rows = db::fetch_enrollment_rows(&state.pool, None).await?;
    let overview = dashboard::instructor_overview(&rows);
    Ok(Json(json!({
        "totals": overview.totals,
        "overview": overview.rows,
        "generated_at": Utc::now().format("%Y-%m-%d %H:%M").to_string(),
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct RosterParams {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub risk: Option<String>,
}

impl RosterParams {
    /// A blank risk means no filter; an unknown one is rejected.
    pub fn into_query(self) -> Result<RosterQuery, ValidationError> {
        let risk = match self.risk.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(key) => Some(RiskBucket::from_class_key(key).ok_or_else(|| {
                ValidationError::Unknown {
                    field: "risk",
                    value: key.to_string(),
                }
            })?),
        };
        Ok(RosterQuery { q: self.q, risk })
    }
}

pub async fn students_handler(
    State(state): State<SharedState>,
    Query(params): Query<RosterParams>,
) -> Result<impl IntoResponse, AppError> {
    let query = params.into_query()?;
    let rows = db::fetch_enrollment_rows(&state.pool, None).await?;
    Ok(Json(dashboard::instructor_roster(&rows, &query)))
}

pub async fn reports_handler(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, AppError> {
    let rows = db::fetch_enrollment_rows(&state.pool, None).await?;
    let events =
        db::upcoming_events(&state.pool, dashboard::UPCOMING_EVENTS_LIMIT as i64).await?;
    let report = dashboard::course_report(&rows, &events);
    Ok(Json(json!({
        "courses": report.courses,
        "critical_list": report.critical_list,
        "events": report.events,
        "generated_at": Utc::now().format("%Y-%m-%d %H:%M").to_string(),
    })))
}

#[derive(Serialize)]
struct InviteCreated {
    invite: Invite,
    accept_link: String,
}

pub async fn create_invite_handler(
    State(state): State<SharedState>,
    Json(payload): Json<NewInvite>,
) -> Result<impl IntoResponse, AppError> {
    let invite = db::create_invite(&state.pool, &payload, Utc::now()).await?;
    let accept_link = invites::accept_link(&state.config.app_base_url, &invite.token);
    info!("Invite for {} ready: {accept_link}", invite.student_email);

    Ok((
        StatusCode::CREATED,
        Json(InviteCreated {
            invite,
            accept_link,
        }),
    ))
}

pub async fn accept_invite_handler(
    State(state): State<SharedState>,
    Path(token): Path<String>,
    Json(payload): Json<AcceptInvite>,
) -> Result<impl IntoResponse, AppError> {
    let result = db::accept_invite(&state.pool, &token, payload.user_id, Utc::now()).await?;
    let status = if result.ok {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    Ok((status, Json(result)))
}

pub async fn list_events_handler(
    State(state): State<SharedState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(db::list_events(&state.pool, user_id).await?))
}

pub async fn create_event_handler(
    State(state): State<SharedState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<NewEvent>,
) -> Result<impl IntoResponse, AppError> {
    db::create_event(&state.pool, user_id, &payload).await?;
    Ok(Json(json!({ "status": "success" })))
}
