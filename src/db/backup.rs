use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::{BackupSnapshot, Goal, RestoreSummary, Student, TrackingLog};

/// Record tables, children first. Deletes walk this order, inserts reverse it.
const RECORD_TABLES: [&str; 3] = ["tracking_logs", "goals", "students"];

async fn clear_records(conn: &mut SqliteConnection) -> Result<(), AppError> {
    for table in RECORD_TABLES {
        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Points a table's AUTOINCREMENT counter at its current largest id, so the
/// next insert continues after restored rows. An empty table gets no entry,
/// which makes SQLite start again from 1.
async fn resync_sequence(conn: &mut SqliteConnection, table: &str) -> Result<(), AppError> {
    sqlx::query("DELETE FROM sqlite_sequence WHERE name = ?")
        .bind(table)
        .execute(&mut *conn)
        .await?;

    sqlx::query(&format!(
        "INSERT INTO sqlite_sequence (name, seq)
         SELECT ?, (SELECT MAX(id) FROM {0}) WHERE EXISTS (SELECT 1 FROM {0})",
        table
    ))
    .bind(table)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Dumps every record inside one read transaction, so the three lists come
/// from the same database state.
#[instrument(skip(pool))]
pub async fn export_backup(pool: &Pool<Sqlite>) -> Result<BackupSnapshot, AppError> {
    info!("Exporting backup");
    let mut tx = pool.begin().await?;

    let students = sqlx::query_as::<_, Student>(
        "SELECT id, name, student_id, active FROM students ORDER BY id",
    )
    .fetch_all(&mut *tx)
    .await?;

    let goals = sqlx::query_as::<_, Goal>(
        "SELECT id, student_id, subject, iep_date, description, active, mastery_score, mastery_count
         FROM goals ORDER BY id",
    )
    .fetch_all(&mut *tx)
    .await?;

    let logs = sqlx::query_as::<_, TrackingLog>(
        "SELECT id, goal_id, user_id, log_date, score, prompt_level, manipulatives_used,
                manipulatives_type, compliance, behavior, time_spent, notes
         FROM tracking_logs ORDER BY id",
    )
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        students = students.len(),
        goals = goals.len(),
        logs = logs.len(),
        "Backup exported"
    );

    Ok(BackupSnapshot {
        students,
        goals,
        logs,
        exported_at: Some(Utc::now()),
    })
}

/// Replaces every record with the snapshot's contents, keeping their ids.
///
/// Runs as a single transaction: a snapshot that references a missing
/// parent or repeats an id fails the whole restore and the previous data
/// stays in place. Log authors that no longer exist are stored as unknown.
#[instrument(skip_all, fields(
    students = snapshot.students.len(),
    goals = snapshot.goals.len(),
    logs = snapshot.logs.len(),
))]
pub async fn restore_backup(
    pool: &Pool<Sqlite>,
    snapshot: &BackupSnapshot,
) -> Result<RestoreSummary, AppError> {
    info!("Restoring backup");
    let mut tx = pool.begin().await?;

    clear_records(&mut *tx).await?;

    for student in &snapshot.students {
        sqlx::query("INSERT INTO students (id, name, student_id, active) VALUES (?, ?, ?, ?)")
            .bind(student.id)
            .bind(&student.name)
            .bind(&student.student_id)
            .bind(student.active)
            .execute(&mut *tx)
            .await?;
    }

    for goal in &snapshot.goals {
        sqlx::query(
            "INSERT INTO goals
             (id, student_id, subject, iep_date, description, active, mastery_score, mastery_count)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(goal.id)
        .bind(goal.student_id)
        .bind(&goal.subject)
        .bind(goal.iep_date)
        .bind(&goal.description)
        .bind(goal.active)
        .bind(goal.mastery_score)
        .bind(goal.mastery_count)
        .execute(&mut *tx)
        .await?;
    }

    for log in &snapshot.logs {
        sqlx::query(
            "INSERT INTO tracking_logs
             (id, goal_id, user_id, log_date, score, prompt_level, manipulatives_used,
              manipulatives_type, compliance, behavior, time_spent, notes)
             VALUES (?, ?, (SELECT id FROM users WHERE id = ?), ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(log.id)
        .bind(log.goal_id)
        .bind(log.user_id)
        .bind(log.log_date)
        .bind(&log.score)
        .bind(&log.prompt_level)
        .bind(log.manipulatives_used)
        .bind(&log.manipulatives_type)
        .bind(&log.compliance)
        .bind(&log.behavior)
        .bind(&log.time_spent)
        .bind(&log.notes)
        .execute(&mut *tx)
        .await?;
    }

    for table in RECORD_TABLES {
        resync_sequence(&mut *tx, table).await?;
    }

    tx.commit().await?;

    Ok(RestoreSummary {
        students: snapshot.students.len(),
        goals: snapshot.goals.len(),
        logs: snapshot.logs.len(),
    })
}

/// Deletes every student, goal and log and restarts their id counters.
/// User accounts and invitations are untouched.
#[instrument(skip(pool))]
pub async fn reset_database(pool: &Pool<Sqlite>) -> Result<(), AppError> {
    info!("Resetting record tables");
    let mut tx = pool.begin().await?;

    clear_records(&mut *tx).await?;

    for table in RECORD_TABLES {
        sqlx::query("DELETE FROM sqlite_sequence WHERE name = ?")
            .bind(table)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}
