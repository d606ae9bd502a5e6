use rocket::State;
use rocket::serde::json::{Error as JsonError, Json};
use sqlx::{Pool, Sqlite};

use super::{CsvAttachment, IdResponse, MessageResponse};
use crate::auth::{Permission, User};
use crate::db::{
    create_goal, create_log, create_student, dashboard_stats, delete_goal, delete_log,
    delete_student, get_goal, list_goals, list_logs, list_students, update_goal, update_log,
    update_student, with_deadline,
};
use crate::env::AppConfig;
use crate::error::AppError;
use crate::models::{
    DashboardStats, Goal, GoalDetail, GoalFields, LogFields, Student, StudentFields, TrackingLog,
};
use crate::validation::ValidateExt;

const REPORT_HEADER: [&str; 9] = [
    "Date",
    "Score",
    "Prompts",
    "Used Manipulatives",
    "Manipulative Type",
    "Compliance",
    "Behavior",
    "Time Spent",
    "Notes",
];

/// Renders a goal's logs as CSV, one row per log in the order given.
pub fn goal_report_csv(logs: &[TrackingLog]) -> Result<Vec<u8>, AppError> {
    let csv_error = |err: csv::Error| AppError::Internal(format!("Failed to write CSV: {}", err));

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(REPORT_HEADER).map_err(csv_error)?;

    for log in logs {
        let date = log.log_date.format("%Y-%m-%d").to_string();
        let used = if log.manipulatives_used { "Yes" } else { "No" };

        writer
            .write_record([
                date.as_str(),
                log.score.as_str(),
                log.prompt_level.as_str(),
                used,
                log.manipulatives_type.as_str(),
                log.compliance.as_str(),
                log.behavior.as_str(),
                log.time_spent.as_str(),
                log.notes.as_str(),
            ])
            .map_err(csv_error)?;
    }

    writer
        .into_inner()
        .map_err(|err| AppError::Internal(format!("Failed to flush CSV: {}", err)))
}

fn required(value: Option<i64>, name: &str) -> Result<i64, AppError> {
    value.ok_or_else(|| AppError::Validation(format!("{} is required", name)))
}

#[post("/students", data = "<student>")]
pub async fn api_create_student(
    student: Result<Json<StudentFields>, JsonError<'_>>,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<IdResponse>, AppError> {
    user.require_permission(Permission::EditRecords)?;
    let student = student.validated()?;

    let id = with_deadline(config.db_timeout(), create_student(db, &student)).await?;
    Ok(Json(IdResponse { id }))
}

#[get("/students?<archived>")]
pub async fn api_list_students(
    archived: Option<bool>,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<Vec<Student>>, AppError> {
    user.require_permission(Permission::ViewRecords)?;

    let students = with_deadline(
        config.db_timeout(),
        list_students(db, archived.unwrap_or(false)),
    )
    .await?;
    Ok(Json(students))
}

#[put("/students/<id>", data = "<student>")]
pub async fn api_update_student(
    id: i64,
    student: Result<Json<StudentFields>, JsonError<'_>>,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::EditRecords)?;
    let student = student.validated()?;

    with_deadline(config.db_timeout(), update_student(db, id, &student)).await?;
    Ok(Json(MessageResponse::new("Student updated")))
}

#[delete("/students/<id>")]
pub async fn api_delete_student(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::EditRecords)?;

    with_deadline(config.db_timeout(), delete_student(db, id)).await?;
    Ok(Json(MessageResponse::new("Student deleted")))
}

#[post("/goals", data = "<goal>")]
pub async fn api_create_goal(
    goal: Result<Json<GoalFields>, JsonError<'_>>,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<IdResponse>, AppError> {
    user.require_permission(Permission::EditRecords)?;
    let goal = goal.validated()?;

    let id = with_deadline(config.db_timeout(), create_goal(db, &goal)).await?;
    Ok(Json(IdResponse { id }))
}

#[get("/goals?<student_id>")]
pub async fn api_list_goals(
    student_id: Option<i64>,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<Vec<Goal>>, AppError> {
    user.require_permission(Permission::ViewRecords)?;
    let student_id = required(student_id, "student_id")?;

    let goals = with_deadline(config.db_timeout(), list_goals(db, student_id)).await?;
    Ok(Json(goals))
}

#[get("/goals/<id>")]
pub async fn api_get_goal(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<GoalDetail>, AppError> {
    user.require_permission(Permission::ViewRecords)?;

    let goal = with_deadline(config.db_timeout(), get_goal(db, id)).await?;
    Ok(Json(goal))
}

#[put("/goals/<id>", data = "<goal>")]
pub async fn api_update_goal(
    id: i64,
    goal: Result<Json<GoalFields>, JsonError<'_>>,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::EditRecords)?;
    let goal = goal.validated()?;

    with_deadline(config.db_timeout(), update_goal(db, id, &goal)).await?;
    Ok(Json(MessageResponse::new("Goal updated")))
}

#[delete("/goals/<id>")]
pub async fn api_delete_goal(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::EditRecords)?;

    with_deadline(config.db_timeout(), delete_goal(db, id)).await?;
    Ok(Json(MessageResponse::new("Goal deleted")))
}

#[get("/goals/<id>/export")]
pub async fn api_export_goal(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<CsvAttachment, AppError> {
    user.require_permission(Permission::ViewRecords)?;

    let goal = with_deadline(config.db_timeout(), get_goal(db, id)).await?;
    let logs = with_deadline(config.db_timeout(), list_logs(db, id)).await?;

    let filename = format!("{}_{}_Report.csv", goal.student_name, goal.goal.subject);
    Ok(CsvAttachment::new(goal_report_csv(&logs)?, &filename))
}

/// The author is always the session user, never a field in the body.
#[post("/logs", data = "<log>")]
pub async fn api_create_log(
    log: Result<Json<LogFields>, JsonError<'_>>,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<IdResponse>, AppError> {
    user.require_permission(Permission::EditRecords)?;
    let log = log.validated()?;

    let id = with_deadline(config.db_timeout(), create_log(db, user.id, &log)).await?;
    Ok(Json(IdResponse { id }))
}

#[get("/logs?<goal_id>")]
pub async fn api_list_logs(
    goal_id: Option<i64>,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<Vec<TrackingLog>>, AppError> {
    user.require_permission(Permission::ViewRecords)?;
    let goal_id = required(goal_id, "goal_id")?;

    let logs = with_deadline(config.db_timeout(), list_logs(db, goal_id)).await?;
    Ok(Json(logs))
}

#[put("/logs/<id>", data = "<log>")]
pub async fn api_update_log(
    id: i64,
    log: Result<Json<LogFields>, JsonError<'_>>,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::EditRecords)?;
    let log = log.validated()?;

    with_deadline(config.db_timeout(), update_log(db, id, &log)).await?;
    Ok(Json(MessageResponse::new("Log updated")))
}

#[delete("/logs/<id>")]
pub async fn api_delete_log(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::EditRecords)?;

    with_deadline(config.db_timeout(), delete_log(db, id)).await?;
    Ok(Json(MessageResponse::new("Log deleted")))
}

#[get("/stats")]
pub async fn api_dashboard_stats(
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<DashboardStats>, AppError> {
    user.require_permission(Permission::ViewRecords)?;

    let stats = with_deadline(config.db_timeout(), dashboard_stats(db)).await?;
    Ok(Json(stats))
}
