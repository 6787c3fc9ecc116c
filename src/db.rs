use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgRow, PgConnection, PgExecutor, PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::accounts::{normalize_email, normalize_theme, split_name};
use crate::error::{AppError, ValidationError};
use crate::invites::{self, InviteOutcome, InviteResult};
use crate::models::{
    AttendanceChange, AttendanceEntry, AttendanceStatus, CalendarEvent, EnrollOutcome,
    EnrollRequest, EnrollmentAggregate, EnrollmentRow, GradeChange, GradeEntry, Invite,
    NewAttendance, NewEvent, NewGrade, NewInvite, NewUser, ProfileUpdate, Role, User,
};

const USER_COLUMNS: &str = "id, first_name, last_name, email, role, theme_preference";
const GRADE_COLUMNS: &str = "id, enrollment_id, exam_name, score, weight, date_recorded";
const ATTENDANCE_COLUMNS: &str = "id, enrollment_id, date, status";
const INVITE_COLUMNS: &str =
    "id, instructor_id, student_email, course_id, token, expires_at, accepted, accepted_at";
const EVENT_COLUMNS: &str = "id, user_id, title, event_date, event_type";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn decode_error(err: ValidationError) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(err))
}

fn unique_conflict(err: sqlx::Error, message: String) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(message),
        _ => AppError::Database(err),
    }
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    let role: Option<String> = row.try_get("role")?;
    let role = role
        .map(|r| r.parse::<Role>())
        .transpose()
        .map_err(decode_error)?;

    Ok(User {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        role,
        theme_preference: row.try_get("theme_preference")?,
    })
}

fn grade_from_row(row: &PgRow) -> Result<GradeEntry, sqlx::Error> {
    Ok(GradeEntry {
        id: row.try_get("id")?,
        enrollment_id: row.try_get("enrollment_id")?,
        exam_name: row.try_get("exam_name")?,
        score: row.try_get("score")?,
        weight: row.try_get("weight")?,
        date_recorded: row.try_get("date_recorded")?,
    })
}

fn attendance_from_row(row: &PgRow) -> Result<AttendanceEntry, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(AttendanceEntry {
        id: row.try_get("id")?,
        enrollment_id: row.try_get("enrollment_id")?,
        date: row.try_get("date")?,
        status: status.parse().map_err(decode_error)?,
    })
}

fn invite_from_row(row: &PgRow) -> Result<Invite, sqlx::Error> {
    Ok(Invite {
        id: row.try_get("id")?,
        instructor_id: row.try_get("instructor_id")?,
        student_email: row.try_get("student_email")?,
        course_id: row.try_get("course_id")?,
        token: row.try_get("token")?,
        expires_at: row.try_get("expires_at")?,
        accepted: row.try_get("accepted")?,
        accepted_at: row.try_get("accepted_at")?,
    })
}

fn event_from_row(row: &PgRow) -> Result<CalendarEvent, sqlx::Error> {
    Ok(CalendarEvent {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        event_date: row.try_get("event_date")?,
        event_type: row.try_get("event_type")?,
    })
}

fn aggregate_from_row(row: &PgRow) -> Result<EnrollmentAggregate, sqlx::Error> {
    Ok(EnrollmentAggregate {
        current_grade: row.try_get("current_grade")?,
        attendance_rate: row.try_get("attendance_rate")?,
    })
}

pub async fn create_user(pool: &PgPool, new_user: &NewUser) -> Result<User, AppError> {
    let email = normalize_email(&new_user.email)?;

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO course_tracker.users (id, first_name, last_name, email, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO NOTHING
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(new_user.first_name.trim())
    .bind(new_user.last_name.trim())
    .bind(&email)
    .bind(new_user.role.map(|r| r.as_str()))
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let user = user_from_row(&row)?;
            info!("Created user {} ({})", user.id, user.email);
            Ok(user)
        }
        None => Err(AppError::Conflict(format!("{email} is already registered"))),
    }
}

pub async fn fetch_user<'e>(
    executor: impl PgExecutor<'e>,
    user_id: Uuid,
) -> Result<Option<User>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {USER_COLUMNS} FROM course_tracker.users WHERE id = $1"
    ))
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(user_from_row).transpose()
}

pub async fn set_role(pool: &PgPool, user_id: Uuid, role: Role) -> Result<User, AppError> {
    let row = sqlx::query(&format!(
        "UPDATE course_tracker.users SET role = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
    ))
    .bind(user_id)
    .bind(role.as_str())
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("user"))?;

    info!("User {user_id} selected role {role}");
    Ok(user_from_row(&row)?)
}

/// Blank or absent fields keep their stored values.
pub async fn update_profile(
    pool: &PgPool,
    user_id: Uuid,
    update: &ProfileUpdate,
) -> Result<User, AppError> {
    let current = fetch_user(pool, user_id)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    let (first_name, last_name) = update
        .name
        .as_deref()
        .and_then(split_name)
        .unwrap_or((current.first_name, current.last_name));

    let email = match update.email.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => normalize_email(raw)?,
        _ => current.email,
    };

    let theme = match update.theme.as_deref() {
        Some(theme) => normalize_theme(Some(theme)).to_string(),
        None => current.theme_preference,
    };

    let row = sqlx::query(&format!(
        r#"
        UPDATE course_tracker.users
        SET first_name = $2, last_name = $3, email = $4, theme_preference = $5
        WHERE id = $1
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(&first_name)
    .bind(&last_name)
    .bind(&email)
    .bind(&theme)
    .fetch_one(pool)
    .await
    .map_err(|e| unique_conflict(e, format!("{email} is already registered")))?;

    Ok(user_from_row(&row)?)
}

async fn enroll_in_course(
    conn: &mut PgConnection,
    user_id: Uuid,
    course_name: &str,
    course_code: &str,
) -> Result<EnrollOutcome, sqlx::Error> {
    // no-op update so RETURNING yields the existing id on conflict
    let course_id: Uuid = sqlx::query(
        r#"
        INSERT INTO course_tracker.courses (id, course_name, course_code)
        VALUES ($1, $2, $3)
        ON CONFLICT (course_code) DO UPDATE SET course_code = EXCLUDED.course_code
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(course_name)
    .bind(course_code)
    .fetch_one(&mut *conn)
    .await?
    .try_get("id")?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO course_tracker.enrollments (id, user_id, course_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, course_id) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(row) = inserted {
        return Ok(EnrollOutcome {
            enrollment_id: row.try_get("id")?,
            course_id,
            created: true,
        });
    }

    let enrollment_id: Uuid = sqlx::query(
        "SELECT id FROM course_tracker.enrollments WHERE user_id = $1 AND course_id = $2",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_one(&mut *conn)
    .await?
    .try_get("id")?;

    Ok(EnrollOutcome {
        enrollment_id,
        course_id,
        created: false,
    })
}

/// Enrolls a user by course code, creating the course on first use.
pub async fn enroll(
    pool: &PgPool,
    user_id: Uuid,
    request: &EnrollRequest,
) -> Result<EnrollOutcome, AppError> {
    let course_code = request.course_code.trim();
    if course_code.is_empty() {
        return Err(ValidationError::Empty {
            field: "course_code",
        }
        .into());
    }
    let course_name = match request.course_name.trim() {
        "" => course_code,
        name => name,
    };

    let mut tx = pool.begin().await?;
    if fetch_user(&mut *tx, user_id).await?.is_none() {
        return Err(AppError::NotFound("user"));
    }
    let outcome = enroll_in_course(&mut tx, user_id, course_name, course_code).await?;
    tx.commit().await?;

    if outcome.created {
        info!("User {user_id} enrolled in {course_code}");
    } else {
        debug!("User {user_id} already enrolled in {course_code}");
    }
    Ok(outcome)
}

/// Every enrollment joined with student and course, optionally for one student.
pub async fn fetch_enrollment_rows(
    pool: &PgPool,
    user_id: Option<Uuid>,
) -> Result<Vec<EnrollmentRow>, AppError> {
    let mut query = String::from(
        r#"
        SELECT e.id AS enrollment_id, u.id AS user_id, u.first_name, u.last_name, u.email,
               c.id AS course_id, c.course_name, c.course_code,
               e.attendance_rate, e.current_grade
        FROM course_tracker.enrollments e
        JOIN course_tracker.users u ON u.id = e.user_id
        JOIN course_tracker.courses c ON c.id = e.course_id
        "#,
    );

    if user_id.is_some() {
        query.push_str(" WHERE e.user_id = $1");
    }
    query.push_str(" ORDER BY c.course_name, u.last_name, u.first_name");

    let mut rows = sqlx::query(&query);
    if let Some(value) = user_id {
        rows = rows.bind(value);
    }

    let records = rows.fetch_all(pool).await?;
    let mut enrollments = Vec::with_capacity(records.len());

    for row in records {
        let first_name: String = row.try_get("first_name")?;
        let last_name: String = row.try_get("last_name")?;
        enrollments.push(EnrollmentRow {
            enrollment_id: row.try_get("enrollment_id")?,
            user_id: row.try_get("user_id")?,
            student_name: format!("{first_name} {last_name}").trim().to_string(),
            email: row.try_get("email")?,
            course_id: row.try_get("course_id")?,
            course_name: row.try_get("course_name")?,
            course_code: row.try_get("course_code")?,
            attendance_rate: row.try_get("attendance_rate")?,
            current_grade: row.try_get("current_grade")?,
        });
    }

    Ok(enrollments)
}

/// Locks the enrollment row for the rest of the transaction and returns its cached aggregate.
async fn lock_enrollment(
    conn: &mut PgConnection,
    enrollment_id: Uuid,
) -> Result<Option<EnrollmentAggregate>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT current_grade, attendance_rate
        FROM course_tracker.enrollments
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(enrollment_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(aggregate_from_row).transpose()
}

async fn store_aggregate(
    conn: &mut PgConnection,
    enrollment_id: Uuid,
    aggregate: &EnrollmentAggregate,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE course_tracker.enrollments
        SET current_grade = $2, attendance_rate = $3
        WHERE id = $1
        "#,
    )
    .bind(enrollment_id)
    .bind(aggregate.current_grade)
    .bind(aggregate.attendance_rate)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn list_grades<'e>(
    executor: impl PgExecutor<'e>,
    enrollment_id: Uuid,
) -> Result<Vec<GradeEntry>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {GRADE_COLUMNS} FROM course_tracker.grades
        WHERE enrollment_id = $1
        ORDER BY date_recorded, exam_name
        "#
    ))
    .bind(enrollment_id)
    .fetch_all(executor)
    .await?;

    rows.iter().map(grade_from_row).collect()
}

pub async fn list_attendance<'e>(
    executor: impl PgExecutor<'e>,
    enrollment_id: Uuid,
) -> Result<Vec<AttendanceEntry>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {ATTENDANCE_COLUMNS} FROM course_tracker.attendance
        WHERE enrollment_id = $1
        ORDER BY date
        "#
    ))
    .bind(enrollment_id)
    .fetch_all(executor)
    .await?;

    rows.iter().map(attendance_from_row).collect()
}

async fn refresh_grade(
    conn: &mut PgConnection,
    enrollment_id: Uuid,
    mut aggregate: EnrollmentAggregate,
) -> Result<EnrollmentAggregate, sqlx::Error> {
    let grades = list_grades(&mut *conn, enrollment_id).await?;
    aggregate.refresh_grade(&grades);
    store_aggregate(conn, enrollment_id, &aggregate).await?;
    debug!(
        "Enrollment {enrollment_id} grade {:.2} from {} entries",
        aggregate.current_grade,
        grades.len()
    );
    Ok(aggregate)
}

async fn refresh_attendance(
    conn: &mut PgConnection,
    enrollment_id: Uuid,
    mut aggregate: EnrollmentAggregate,
) -> Result<EnrollmentAggregate, sqlx::Error> {
    let sessions = list_attendance(&mut *conn, enrollment_id).await?;
    aggregate.refresh_attendance(&sessions);
    store_aggregate(conn, enrollment_id, &aggregate).await?;
    debug!(
        "Enrollment {enrollment_id} attendance {:.2} from {} sessions",
        aggregate.attendance_rate,
        sessions.len()
    );
    Ok(aggregate)
}

async fn owning_enrollment(
    conn: &mut PgConnection,
    table: &str,
    entry_id: Uuid,
) -> Result<Option<Uuid>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT enrollment_id FROM course_tracker.{table} WHERE id = $1"
    ))
    .bind(entry_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|r| r.try_get("enrollment_id")).transpose()
}

pub async fn add_grade(
    pool: &PgPool,
    enrollment_id: Uuid,
    grade: &NewGrade,
) -> Result<GradeChange, AppError> {
    grade.validate()?;

    let mut tx = pool.begin().await?;
    let aggregate = lock_enrollment(&mut tx, enrollment_id)
        .await?
        .ok_or(AppError::NotFound("enrollment"))?;

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO course_tracker.grades
        (id, enrollment_id, exam_name, score, weight, date_recorded)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {GRADE_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(enrollment_id)
    .bind(grade.exam_name.trim())
    .bind(grade.score)
    .bind(grade.weight)
    .bind(grade.date_recorded)
    .fetch_one(&mut *tx)
    .await?;
    let entry = grade_from_row(&row)?;

    let aggregate = refresh_grade(&mut tx, enrollment_id, aggregate).await?;
    tx.commit().await?;

    info!("Recorded grade '{}' for enrollment {enrollment_id}", entry.exam_name);
    Ok(GradeChange {
        grade: entry,
        aggregate,
    })
}

pub async fn update_grade(
    pool: &PgPool,
    grade_id: Uuid,
    grade: &NewGrade,
) -> Result<GradeChange, AppError> {
    grade.validate()?;

    let mut tx = pool.begin().await?;
    let enrollment_id = owning_enrollment(&mut tx, "grades", grade_id)
        .await?
        .ok_or(AppError::NotFound("grade"))?;
    let aggregate = lock_enrollment(&mut tx, enrollment_id)
        .await?
        .ok_or(AppError::NotFound("enrollment"))?;

    let row = sqlx::query(&format!(
        r#"
        UPDATE course_tracker.grades
        SET exam_name = $2, score = $3, weight = $4, date_recorded = $5
        WHERE id = $1
        RETURNING {GRADE_COLUMNS}
        "#
    ))
    .bind(grade_id)
    .bind(grade.exam_name.trim())
    .bind(grade.score)
    .bind(grade.weight)
    .bind(grade.date_recorded)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("grade"))?;
    let entry = grade_from_row(&row)?;

    let aggregate = refresh_grade(&mut tx, enrollment_id, aggregate).await?;
    tx.commit().await?;

    info!("Updated grade {grade_id} for enrollment {enrollment_id}");
    Ok(GradeChange {
        grade: entry,
        aggregate,
    })
}

pub async fn delete_grade(pool: &PgPool, grade_id: Uuid) -> Result<EnrollmentAggregate, AppError> {
    let mut tx = pool.begin().await?;
    let enrollment_id = owning_enrollment(&mut tx, "grades", grade_id)
        .await?
        .ok_or(AppError::NotFound("grade"))?;
    let aggregate = lock_enrollment(&mut tx, enrollment_id)
        .await?
        .ok_or(AppError::NotFound("enrollment"))?;

    let result = sqlx::query("DELETE FROM course_tracker.grades WHERE id = $1")
        .bind(grade_id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("grade"));
    }

    let aggregate = refresh_grade(&mut tx, enrollment_id, aggregate).await?;
    tx.commit().await?;

    info!("Deleted grade {grade_id} from enrollment {enrollment_id}");
    Ok(aggregate)
}

pub async fn add_attendance(
    pool: &PgPool,
    enrollment_id: Uuid,
    session: &NewAttendance,
) -> Result<AttendanceChange, AppError> {
    let mut tx = pool.begin().await?;
    let aggregate = lock_enrollment(&mut tx, enrollment_id)
        .await?
        .ok_or(AppError::NotFound("enrollment"))?;

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO course_tracker.attendance (id, enrollment_id, date, status)
        VALUES ($1, $2, $3, $4)
        RETURNING {ATTENDANCE_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(enrollment_id)
    .bind(session.date)
    .bind(session.status.as_str())
    .fetch_one(&mut *tx)
    .await?;
    let entry = attendance_from_row(&row)?;

    let aggregate = refresh_attendance(&mut tx, enrollment_id, aggregate).await?;
    tx.commit().await?;

    info!(
        "Recorded {} on {} for enrollment {enrollment_id}",
        entry.status.as_str(),
        entry.date
    );
    Ok(AttendanceChange {
        attendance: entry,
        aggregate,
    })
}

pub async fn update_attendance(
    pool: &PgPool,
    attendance_id: Uuid,
    session: &NewAttendance,
) -> Result<AttendanceChange, AppError> {
    let mut tx = pool.begin().await?;
    let enrollment_id = owning_enrollment(&mut tx, "attendance", attendance_id)
        .await?
        .ok_or(AppError::NotFound("attendance"))?;
    let aggregate = lock_enrollment(&mut tx, enrollment_id)
        .await?
        .ok_or(AppError::NotFound("enrollment"))?;

    let row = sqlx::query(&format!(
        r#"
        UPDATE course_tracker.attendance
        SET date = $2, status = $3
        WHERE id = $1
        RETURNING {ATTENDANCE_COLUMNS}
        "#
    ))
    .bind(attendance_id)
    .bind(session.date)
    .bind(session.status.as_str())
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("attendance"))?;
    let entry = attendance_from_row(&row)?;

    let aggregate = refresh_attendance(&mut tx, enrollment_id, aggregate).await?;
    tx.commit().await?;

    info!("Updated attendance {attendance_id} for enrollment {enrollment_id}");
    Ok(AttendanceChange {
        attendance: entry,
        aggregate,
    })
}

pub async fn delete_attendance(
    pool: &PgPool,
    attendance_id: Uuid,
) -> Result<EnrollmentAggregate, AppError> {
    let mut tx = pool.begin().await?;
    let enrollment_id = owning_enrollment(&mut tx, "attendance", attendance_id)
        .await?
        .ok_or(AppError::NotFound("attendance"))?;
    let aggregate = lock_enrollment(&mut tx, enrollment_id)
        .await?
        .ok_or(AppError::NotFound("enrollment"))?;

    let result = sqlx::query("DELETE FROM course_tracker.attendance WHERE id = $1")
        .bind(attendance_id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("attendance"));
    }

    let aggregate = refresh_attendance(&mut tx, enrollment_id, aggregate).await?;
    tx.commit().await?;

    info!("Deleted attendance {attendance_id} from enrollment {enrollment_id}");
    Ok(aggregate)
}

pub async fn create_invite(
    pool: &PgPool,
    request: &NewInvite,
    now: DateTime<Utc>,
) -> Result<Invite, AppError> {
    let student_email = normalize_email(&request.student_email)?;

    let instructor = fetch_user(pool, request.instructor_id)
        .await?
        .ok_or(AppError::NotFound("instructor"))?;
    if instructor.role != Some(Role::Instructor) {
        return Err(AppError::Forbidden("only instructors can send invites"));
    }

    if let Some(course_id) = request.course_id {
        let exists = sqlx::query("SELECT 1 FROM course_tracker.courses WHERE id = $1")
            .bind(course_id)
            .fetch_optional(pool)
            .await?
            .is_some();
        if !exists {
            return Err(AppError::NotFound("course"));
        }
    }

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO course_tracker.invites
        (id, instructor_id, student_email, course_id, token, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {INVITE_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(instructor.id)
    .bind(&student_email)
    .bind(request.course_id)
    .bind(invites::new_token())
    .bind(invites::expiry_from(now))
    .fetch_one(pool)
    .await?;

    Ok(invite_from_row(&row)?)
}

async fn course_name(conn: &mut PgConnection, course_id: Uuid) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query("SELECT course_name FROM course_tracker.courses WHERE id = $1")
        .bind(course_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|r| r.try_get("course_name")).transpose()
}

pub async fn accept_invite(
    pool: &PgPool,
    token: &str,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<InviteResult, AppError> {
    let mut tx = pool.begin().await?;
    let user = fetch_user(&mut *tx, user_id)
        .await?
        .ok_or(AppError::NotFound("user"))?;

    let invite = sqlx::query(&format!(
        "SELECT {INVITE_COLUMNS} FROM course_tracker.invites WHERE token = $1 FOR UPDATE"
    ))
    .bind(token)
    .fetch_optional(&mut *tx)
    .await?
    .as_ref()
    .map(invite_from_row)
    .transpose()?;

    let outcome = invites::evaluate(invite.as_ref(), &user, now);
    let Some(invite) = invite.filter(|_| outcome == InviteOutcome::Accepted) else {
        debug!("Invite not accepted for user {user_id}: {outcome:?}");
        return Ok(InviteResult::from(outcome));
    };

    let mut course = None;
    if let Some(course_id) = invite.course_id {
        if let Some(name) = course_name(&mut tx, course_id).await? {
            sqlx::query(
                r#"
                INSERT INTO course_tracker.enrollments (id, user_id, course_id)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id, course_id) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user.id)
            .bind(course_id)
            .execute(&mut *tx)
            .await?;
            course = Some(name);
        }
    }

    sqlx::query(
        "UPDATE course_tracker.invites SET accepted = TRUE, accepted_at = $2 WHERE id = $1",
    )
    .bind(invite.id)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let instructor_name = fetch_user(&mut *tx, invite.instructor_id)
        .await?
        .map(|u| u.full_name())
        .unwrap_or_else(|| "Instructor".to_string());
    tx.commit().await?;

    info!("User {user_id} accepted invite {}", invite.id);
    let mut result = InviteResult::from(outcome);
    result.instructor_name = Some(instructor_name);
    result.course_name = course;
    Ok(result)
}

pub async fn create_event(
    pool: &PgPool,
    user_id: Uuid,
    event: &NewEvent,
) -> Result<CalendarEvent, AppError> {
    let title = event.title.trim();
    if title.is_empty() {
        return Err(ValidationError::Empty { field: "title" }.into());
    }
    if fetch_user(pool, user_id).await?.is_none() {
        return Err(AppError::NotFound("user"));
    }

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO course_tracker.calendar_events (id, user_id, title, event_date, event_type)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {EVENT_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(title)
    .bind(event.date)
    .bind(event.event_type.trim())
    .fetch_one(pool)
    .await?;

    Ok(event_from_row(&row)?)
}

pub async fn list_events(pool: &PgPool, user_id: Uuid) -> Result<Vec<CalendarEvent>, AppError> {
    let rows = sqlx::query(&format!(
        "SELECT {EVENT_COLUMNS} FROM course_tracker.calendar_events WHERE user_id = $1 ORDER BY event_date"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(event_from_row)
        .collect::<Result<Vec<_>, _>>()?)
}

pub async fn upcoming_events(pool: &PgPool, limit: i64) -> Result<Vec<CalendarEvent>, AppError> {
    let rows = sqlx::query(&format!(
        "SELECT {EVENT_COLUMNS} FROM course_tracker.calendar_events ORDER BY event_date ASC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(event_from_row)
        .collect::<Result<Vec<_>, _>>()?)
}

/// Upserts the student and course named by an import row and returns the enrollment id.
async fn ensure_enrollment(
    pool: &PgPool,
    email: &str,
    first_name: &str,
    last_name: &str,
    course_code: &str,
    course_name: &str,
) -> anyhow::Result<EnrollOutcome> {
    let email = normalize_email(email)?;
    let mut tx = pool.begin().await?;

    let user_id: Uuid = sqlx::query(
        r#"
        INSERT INTO course_tracker.users (id, first_name, last_name, email, role)
        VALUES ($1, $2, $3, $4, 'student')
        ON CONFLICT (email) DO UPDATE
        SET first_name = EXCLUDED.first_name, last_name = EXCLUDED.last_name
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(first_name.trim())
    .bind(last_name.trim())
    .bind(&email)
    .fetch_one(&mut *tx)
    .await?
    .try_get("id")?;

    let outcome = enroll_in_course(&mut tx, user_id, course_name.trim(), course_code.trim()).await?;
    tx.commit().await?;
    Ok(outcome)
}

#[derive(serde::Deserialize)]
struct GradeCsvRow {
    email: String,
    first_name: String,
    last_name: String,
    course_code: String,
    course_name: String,
    exam_name: String,
    score: f64,
    weight: f64,
    date_recorded: NaiveDate,
}

#[derive(serde::Deserialize)]
struct AttendanceCsvRow {
    email: String,
    first_name: String,
    last_name: String,
    course_code: String,
    course_name: String,
    date: NaiveDate,
    status: String,
}

/// Each row goes through [`add_grade`], so aggregates are recomputed per insert.
pub async fn import_grades_csv(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for (index, result) in reader.deserialize::<GradeCsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("invalid grade row at line {line}"))?;
        let enrollment = ensure_enrollment(
            pool,
            &row.email,
            &row.first_name,
            &row.last_name,
            &row.course_code,
            &row.course_name,
        )
        .await
        .with_context(|| format!("failed to enroll {} (line {line})", row.email))?;

        let grade = NewGrade {
            exam_name: row.exam_name,
            score: row.score,
            weight: row.weight,
            date_recorded: row.date_recorded,
        };
        add_grade(pool, enrollment.enrollment_id, &grade)
            .await
            .with_context(|| format!("failed to record grade at line {line}"))?;
        inserted += 1;
    }

    Ok(inserted)
}

pub async fn import_attendance_csv(pool: &PgPool, csv_path: &Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for (index, result) in reader.deserialize::<AttendanceCsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("invalid attendance row at line {line}"))?;
        let status: AttendanceStatus = row
            .status
            .parse()
            .with_context(|| format!("invalid status at line {line}"))?;
        let enrollment = ensure_enrollment(
            pool,
            &row.email,
            &row.first_name,
            &row.last_name,
            &row.course_code,
            &row.course_name,
        )
        .await
        .with_context(|| format!("failed to enroll {} (line {line})", row.email))?;

        let session = NewAttendance {
            date: row.date,
            status,
        };
        add_attendance(pool, enrollment.enrollment_id, &session)
            .await
            .with_context(|| format!("failed to record attendance at line {line}"))?;
        inserted += 1;
    }

    Ok(inserted)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let instructor: Uuid = sqlx::query(
        r#"
        INSERT INTO course_tracker.users (id, first_name, last_name, email, role)
        VALUES ($1, 'Hala', 'Mansour', 'hala.mansour@university.edu', 'instructor')
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .fetch_one(pool)
    .await?
    .try_get("id")?;

    let students = [
        ("rami.khalil@university.edu", "Rami", "Khalil"),
        ("yasmine.daher@university.edu", "Yasmine", "Daher"),
        ("elie.nassar@university.edu", "Elie", "Nassar"),
    ];
    let courses = [("MATH201", "Linear Algebra"), ("CSC310", "Data Structures")];

    let date = |month: u32, day: u32| {
        NaiveDate::from_ymd_opt(2026, month, day).context("invalid seed date")
    };

    for (student_index, (email, first_name, last_name)) in students.iter().enumerate() {
        for (course_index, (code, name)) in courses.iter().enumerate() {
            let enrollment =
                ensure_enrollment(pool, email, first_name, last_name, code, name).await?;
            if !enrollment.created {
                continue;
            }

            // spread students across risk buckets
            let base = 92.0 - 14.0 * student_index as f64 - 4.0 * course_index as f64;
            let grades = [
                ("Quiz 1", base + 3.0, 15.0, date(2, 6)?),
                ("Midterm", base - 5.0, 35.0, date(3, 12)?),
            ];
            for (exam_name, score, weight, date_recorded) in grades {
                let grade = NewGrade {
                    exam_name: exam_name.to_string(),
                    score,
                    weight,
                    date_recorded,
                };
                add_grade(pool, enrollment.enrollment_id, &grade).await?;
            }

            let absences = student_index * 2 + course_index;
            for session in 0..8u32 {
                let status = if (session as usize) < absences {
                    AttendanceStatus::Absent
                } else {
                    AttendanceStatus::Present
                };
                let entry = NewAttendance {
                    date: date(2, 2 + session * 3)?,
                    status,
                };
                add_attendance(pool, enrollment.enrollment_id, &entry).await?;
            }
        }
    }

    let events = [
        ("Linear Algebra midterm", date(3, 12)?, "exam"),
        ("Data Structures project due", date(4, 3)?, "assignment"),
    ];
    for (title, event_date, event_type) in events {
        sqlx::query(
            r#"
            INSERT INTO course_tracker.calendar_events (id, user_id, title, event_date, event_type)
            SELECT $1, $2, $3, $4, $5
            WHERE NOT EXISTS (
                SELECT 1 FROM course_tracker.calendar_events WHERE user_id = $2 AND title = $3
            )
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(instructor)
        .bind(title)
        .bind(event_date)
        .bind(event_type)
        .execute(pool)
        .await?;
    }

    info!("Seeded {} students across {} courses", students.len(), courses.len());
    Ok(())
}
