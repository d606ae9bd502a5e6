#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rocket::http::{ContentType, Status};
    use serde_json::json;

    use crate::api::IdResponse;
    use crate::db::delete_student;
    use crate::error::AppError;
    use crate::models::{DashboardStats, Goal, GoalDetail, Student, TrackingLog};
    use crate::test::test_utils::{
        body_json, create_standard_test_db, login_as, setup_test_client,
    };

    #[rocket::async_test]
    async fn test_student_crud_and_archiving() {
        let (client, _db) = setup_test_client(create_standard_test_db().await).await;
        login_as(&client, "aide@school.test").await;

        let response = client
            .post("/api/students")
            .header(ContentType::JSON)
            .body(json!({ "name": "Cara Lee", "student_id": "S-300" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let IdResponse { id } = response.into_json().await.unwrap();

        let response = client.get("/api/students").dispatch().await;
        let students: Vec<Student> = response.into_json().await.unwrap();
        let names: Vec<&str> = students.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Ava Smith", "Ben Jones", "Cara Lee"]);

        let response = client
            .put(format!("/api/students/{}", id))
            .header(ContentType::JSON)
            .body(json!({ "name": "Cara Lee", "student_id": "S-300", "active": false }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let response = client.get("/api/students?archived=true").dispatch().await;
        let archived: Vec<Student> = response.into_json().await.unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].id, id);
        assert!(!archived[0].active);

        let response = client.get("/api/students?archived=false").dispatch().await;
        let active: Vec<Student> = response.into_json().await.unwrap();
        assert_eq!(active.len(), 2);
    }

    #[rocket::async_test]
    async fn test_student_validation_and_duplicates() {
        let (client, _db) = setup_test_client(create_standard_test_db().await).await;
        login_as(&client, "aide@school.test").await;

        let response = client
            .post("/api/students")
            .header(ContentType::JSON)
            .body(json!({ "name": "", "student_id": "" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);

        let response = client
            .post("/api/students")
            .header(ContentType::JSON)
            .body(json!({ "name": "Another Ava", "student_id": "S-100" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
        assert_eq!(body_json(response).await["error"], "conflict_error");

        let response = client
            .put("/api/students/9999")
            .header(ContentType::JSON)
            .body(json!({ "name": "Nobody", "student_id": "S-999" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_delete_student_cascades() {
        let (client, db) = setup_test_client(create_standard_test_db().await).await;
        login_as(&client, "aide@school.test").await;

        let response = client
            .delete(format!("/api/students/{}", db.student_id("S-100")))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        assert_eq!(db.count("students").await, 1);
        assert_eq!(db.count("goals").await, 0);
        assert_eq!(db.count("tracking_logs").await, 0);

        let response = client
            .delete(format!("/api/students/{}", db.student_id("S-100")))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_failed_student_delete_removes_nothing() {
        let db = create_standard_test_db().await;
        let ava = db.student_id("S-100");

        sqlx::query(
            "CREATE TRIGGER fail_student_delete BEFORE DELETE ON students
             BEGIN SELECT RAISE(ABORT, 'simulated failure'); END;",
        )
        .execute(&db.pool)
        .await
        .unwrap();

        let result = delete_student(&db.pool, ava).await;
        assert!(matches!(result, Err(AppError::Database(_))));

        assert_eq!(db.count("students").await, 2);
        assert_eq!(db.count("goals").await, 2);
        assert_eq!(db.count("tracking_logs").await, 3);
    }

    #[rocket::async_test]
    async fn test_goal_lifecycle() {
        let (client, db) = setup_test_client(create_standard_test_db().await).await;
        login_as(&client, "aide@school.test").await;
        let ben = db.student_id("S-200");

        let response = client
            .post("/api/goals")
            .header(ContentType::JSON)
            .body(
                json!({
                    "student_id": ben,
                    "subject": "Writing",
                    "iep_date": "2024-09-15",
                    "description": "Writes a full sentence",
                    "mastery_score": 0
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let IdResponse { id } = response.into_json().await.unwrap();

        let response = client.get(format!("/api/goals/{}", id)).dispatch().await;
        let detail: GoalDetail = response.into_json().await.unwrap();
        assert_eq!(detail.student_name, "Ben Jones");
        assert_eq!(detail.student_id_str, "S-200");
        assert_eq!(detail.goal.mastery_score, 80);
        assert_eq!(detail.goal.mastery_count, 3);

        let response = client
            .put(format!("/api/goals/{}", id))
            .header(ContentType::JSON)
            .body(
                json!({
                    "student_id": ben,
                    "subject": "Writing",
                    "iep_date": "2024-09-15",
                    "description": "Writes a paragraph",
                    "mastery_score": 90,
                    "mastery_count": 5
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let response = client
            .get(format!("/api/goals?student_id={}", ben))
            .dispatch()
            .await;
        let goals: Vec<Goal> = response.into_json().await.unwrap();
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].description, "Writes a paragraph");
        assert_eq!(goals[0].mastery_score, 90);
        assert_eq!(goals[0].mastery_count, 5);

        let response = client.get("/api/goals").dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);

        let response = client.delete(format!("/api/goals/{}", id)).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let response = client.get(format!("/api/goals/{}", id)).dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_goal_for_missing_student_is_rejected() {
        let (client, db) = setup_test_client(create_standard_test_db().await).await;
        login_as(&client, "aide@school.test").await;

        let response = client
            .post("/api/goals")
            .header(ContentType::JSON)
            .body(
                json!({ "student_id": 9999, "subject": "Art", "iep_date": "2024-09-15" })
                    .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
        assert_eq!(db.count("goals").await, 2);
    }

    #[rocket::async_test]
    async fn test_delete_goal_removes_its_logs_only() {
        let (client, db) = setup_test_client(create_standard_test_db().await).await;
        login_as(&client, "aide@school.test").await;

        let response = client
            .delete(format!("/api/goals/{}", db.goal_id("Math")))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        assert_eq!(db.count("goals").await, 1);
        assert_eq!(db.count("tracking_logs").await, 1);
    }

    #[rocket::async_test]
    async fn test_log_lifecycle() {
        let (client, db) = setup_test_client(create_standard_test_db().await).await;
        login_as(&client, "aide@school.test").await;
        let reading = db.goal_id("Reading");

        let response = client
            .post("/api/logs")
            .header(ContentType::JSON)
            .body(
                json!({
                    "goal_id": reading,
                    "log_date": "2024-10-05",
                    "score": "5/5",
                    "user_id": db.user_id("admin@school.test"),
                    "manipulatives_used": true,
                    "manipulatives_type": "Letter tiles"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let IdResponse { id } = response.into_json().await.unwrap();

        let response = client
            .get(format!("/api/logs?goal_id={}", reading))
            .dispatch()
            .await;
        let logs: Vec<TrackingLog> = response.into_json().await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].id, id);
        assert_eq!(logs[0].user_id, Some(db.user_id("aide@school.test")));
        assert_eq!(logs[0].tester_name.as_deref(), Some("Jamie Aide"));
        assert!(logs[0].manipulatives_used);

        let response = client
            .put(format!("/api/logs/{}", id))
            .header(ContentType::JSON)
            .body(json!({ "log_date": "2024-10-06", "score": "4/5", "notes": "Tired" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let response = client
            .get(format!("/api/logs?goal_id={}", reading))
            .dispatch()
            .await;
        let logs: Vec<TrackingLog> = response.into_json().await.unwrap();
        assert_eq!(logs[0].score, "4/5");
        assert_eq!(logs[0].notes, "Tired");

        let response = client.delete(format!("/api/logs/{}", id)).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let response = client.delete(format!("/api/logs/{}", id)).dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_log_store_errors_are_not_echoed() {
        let (client, _db) = setup_test_client(create_standard_test_db().await).await;
        login_as(&client, "aide@school.test").await;

        let response = client
            .post("/api/logs")
            .header(ContentType::JSON)
            .body(json!({ "goal_id": 9999, "log_date": "2024-10-05" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);
        let body = body_json(response).await;
        let message = body["message"].as_str().unwrap_or_default();
        assert!(!message.contains("FOREIGN KEY"));
        assert!(!message.contains("tracking_logs"));
    }

    #[rocket::async_test]
    async fn test_goal_csv_export() {
        let (client, db) = setup_test_client(create_standard_test_db().await).await;
        login_as(&client, "aide@school.test").await;

        let response = client
            .get(format!("/api/goals/{}/export", db.goal_id("Math")))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.content_type(), Some(ContentType::CSV));
        assert_eq!(
            response.headers().get_one("Content-Disposition"),
            Some("attachment; filename=\"Ava_Smith_Math_Report.csv\"")
        );

        let report = response.into_string().await.unwrap();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("2024-10-02,4/5"));
        assert!(lines[2].starts_with("2024-10-01,3/5"));

        let response = client.get("/api/goals/9999/export").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_dashboard_stats() {
        let (client, db) = setup_test_client(create_standard_test_db().await).await;
        login_as(&client, "aide@school.test").await;

        let today = Utc::now().date_naive();
        let response = client
            .post("/api/logs")
            .header(ContentType::JSON)
            .body(
                json!({
                    "goal_id": db.goal_id("Reading"),
                    "log_date": (today - Duration::days(1)).format("%Y-%m-%d").to_string(),
                    "score": "5/5"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let response = client.get("/api/stats").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let stats: DashboardStats = response.into_json().await.unwrap();

        assert_eq!(stats.student_count, 2);
        assert_eq!(stats.active_goals, 2);
        assert_eq!(stats.logs_this_week, 1);
        assert_eq!(stats.recent_logs.len(), 4);
        assert_eq!(stats.recent_logs[0].score, "5/5");
        assert_eq!(stats.recent_logs[0].student_name, "Ava Smith");
        assert_eq!(stats.recent_logs[0].subject, "Reading");
    }
}
