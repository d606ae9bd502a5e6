use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{
    DashboardStats, GoalDetail, Goal, GoalFields, LogFields, RecentLog, Student, StudentFields,
    TrackingLog,
};

const GOAL_COLUMNS: &str =
    "g.id, g.student_id, g.subject, g.iep_date, g.description, g.active, g.mastery_score, g.mastery_count";

fn not_found(kind: &str, id: i64) -> AppError {
    AppError::NotFound(format!("{} {} not found", kind, id))
}

#[instrument(skip(pool))]
pub async fn create_student(pool: &Pool<Sqlite>, fields: &StudentFields) -> Result<i64, AppError> {
    info!("Creating student");
    let result = sqlx::query("INSERT INTO students (name, student_id, active) VALUES (?, ?, ?)")
        .bind(&fields.name)
        .bind(&fields.student_id)
        .bind(fields.active)
        .execute(pool)
        .await?;

    Ok(result.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn list_students(pool: &Pool<Sqlite>, archived: bool) -> Result<Vec<Student>, AppError> {
    let students = sqlx::query_as::<_, Student>(
        "SELECT id, name, student_id, active FROM students WHERE active = ? ORDER BY name ASC",
    )
    .bind(!archived)
    .fetch_all(pool)
    .await?;

    Ok(students)
}

#[instrument(skip(pool))]
pub async fn update_student(
    pool: &Pool<Sqlite>,
    id: i64,
    fields: &StudentFields,
) -> Result<(), AppError> {
    info!("Updating student");
    let result = sqlx::query("UPDATE students SET name = ?, student_id = ?, active = ? WHERE id = ?")
        .bind(&fields.name)
        .bind(&fields.student_id)
        .bind(fields.active)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(not_found("Student", id));
    }
    Ok(())
}

/// Removes a student with all of their goals and those goals' logs.
/// Either every row goes or none do.
#[instrument(skip(pool))]
pub async fn delete_student(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting student with goals and logs");
    let mut tx = pool.begin().await?;

    sqlx::query(
        "DELETE FROM tracking_logs WHERE goal_id IN (SELECT id FROM goals WHERE student_id = ?)",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM goals WHERE student_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM students WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(not_found("Student", id));
    }

    tx.commit().await?;
    Ok(())
}

#[instrument(skip(pool))]
pub async fn create_goal(pool: &Pool<Sqlite>, fields: &GoalFields) -> Result<i64, AppError> {
    info!("Creating goal");
    let result = sqlx::query(
        "INSERT INTO goals (student_id, subject, iep_date, description, mastery_score, mastery_count)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(fields.student_id)
    .bind(&fields.subject)
    .bind(fields.iep_date)
    .bind(&fields.description)
    .bind(fields.mastery_score())
    .bind(fields.mastery_count())
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

#[instrument(skip(pool))]
pub async fn list_goals(pool: &Pool<Sqlite>, student_id: i64) -> Result<Vec<Goal>, AppError> {
    let goals = sqlx::query_as::<_, Goal>(&format!(
        "SELECT {} FROM goals g
         WHERE g.student_id = ? AND g.active = TRUE
         ORDER BY g.created_at DESC, g.id DESC",
        GOAL_COLUMNS
    ))
    .bind(student_id)
    .fetch_all(pool)
    .await?;

    Ok(goals)
}

#[instrument(skip(pool))]
pub async fn get_goal(pool: &Pool<Sqlite>, id: i64) -> Result<GoalDetail, AppError> {
    let goal = sqlx::query_as::<_, GoalDetail>(&format!(
        "SELECT {}, s.name AS student_name, s.student_id AS student_id_str
         FROM goals g JOIN students s ON g.student_id = s.id
         WHERE g.id = ?",
        GOAL_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    goal.ok_or_else(|| not_found("Goal", id))
}

#[instrument(skip(pool))]
pub async fn update_goal(pool: &Pool<Sqlite>, id: i64, fields: &GoalFields) -> Result<(), AppError> {
    info!("Updating goal");
    let result = sqlx::query(
        "UPDATE goals
         SET subject = ?, iep_date = ?, description = ?, mastery_score = ?, mastery_count = ?
         WHERE id = ?",
    )
    .bind(&fields.subject)
    .bind(fields.iep_date)
    .bind(&fields.description)
    .bind(fields.mastery_score())
    .bind(fields.mastery_count())
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(not_found("Goal", id));
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn delete_goal(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting goal with logs");
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM tracking_logs WHERE goal_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let result = sqlx::query("DELETE FROM goals WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(not_found("Goal", id));
    }

    tx.commit().await?;
    Ok(())
}

#[instrument(skip(pool, fields))]
pub async fn create_log(
    pool: &Pool<Sqlite>,
    author_id: i64,
    fields: &LogFields,
) -> Result<i64, AppError> {
    info!(goal_id = fields.goal_id, "Creating tracking log");
    let result = sqlx::query(
        "INSERT INTO tracking_logs
         (goal_id, user_id, log_date, score, prompt_level, manipulatives_used,
          manipulatives_type, compliance, behavior, time_spent, notes)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(fields.goal_id)
    .bind(author_id)
    .bind(fields.log_date)
    .bind(&fields.score)
    .bind(&fields.prompt_level)
    .bind(fields.manipulatives_used)
    .bind(&fields.manipulatives_type)
    .bind(&fields.compliance)
    .bind(&fields.behavior)
    .bind(&fields.time_spent)
    .bind(&fields.notes)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Logs for a goal, newest first, with the author's name where known.
#[instrument(skip(pool))]
pub async fn list_logs(pool: &Pool<Sqlite>, goal_id: i64) -> Result<Vec<TrackingLog>, AppError> {
    let logs = sqlx::query_as::<_, TrackingLog>(
        "SELECT l.id, l.goal_id, l.user_id,
                COALESCE(NULLIF(u.full_name, ''), u.email, 'Unknown') AS tester_name,
                l.log_date, l.score, l.prompt_level, l.manipulatives_used, l.manipulatives_type,
                l.compliance, l.behavior, l.time_spent, l.notes
         FROM tracking_logs l
         LEFT JOIN users u ON l.user_id = u.id
         WHERE l.goal_id = ?
         ORDER BY l.log_date DESC, l.created_at DESC, l.id DESC",
    )
    .bind(goal_id)
    .fetch_all(pool)
    .await?;

    Ok(logs)
}

#[instrument(skip(pool, fields))]
pub async fn update_log(pool: &Pool<Sqlite>, id: i64, fields: &LogFields) -> Result<(), AppError> {
    info!(log_id = id, "Updating tracking log");
    let result = sqlx::query(
        "UPDATE tracking_logs
         SET log_date = ?, score = ?, prompt_level = ?, manipulatives_used = ?,
             manipulatives_type = ?, compliance = ?, behavior = ?, time_spent = ?, notes = ?
         WHERE id = ?",
    )
    .bind(fields.log_date)
    .bind(&fields.score)
    .bind(&fields.prompt_level)
    .bind(fields.manipulatives_used)
    .bind(&fields.manipulatives_type)
    .bind(&fields.compliance)
    .bind(&fields.behavior)
    .bind(&fields.time_spent)
    .bind(&fields.notes)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(not_found("Log", id));
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn delete_log(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting tracking log");
    let result = sqlx::query("DELETE FROM tracking_logs WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(not_found("Log", id));
    }
    Ok(())
}

#[instrument(skip(pool))]
pub async fn dashboard_stats(pool: &Pool<Sqlite>) -> Result<DashboardStats, AppError> {
    let student_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM students WHERE active = TRUE")
            .fetch_one(pool)
            .await?;

    let active_goals: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM goals WHERE active = TRUE")
        .fetch_one(pool)
        .await?;

    let logs_this_week: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM tracking_logs WHERE log_date >= date('now', '-7 days')",
    )
    .fetch_one(pool)
    .await?;

    let recent_logs = sqlx::query_as::<_, RecentLog>(
        "SELECT s.name AS student_name, g.subject, l.score, l.log_date AS date,
                l.goal_id, s.id AS student_id
         FROM tracking_logs l
         JOIN goals g ON l.goal_id = g.id
         JOIN students s ON g.student_id = s.id
         ORDER BY l.created_at DESC, l.id DESC
         LIMIT 5",
    )
    .fetch_all(pool)
    .await?;

    Ok(DashboardStats {
        student_count,
        active_goals,
        logs_this_week,
        recent_logs,
    })
}
