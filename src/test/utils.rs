#[cfg(test)]
pub mod test_utils {
    use chrono::NaiveDate;
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;
    use sqlx::{Pool, Sqlite, SqlitePool};
    use std::collections::HashMap;
    use std::sync::Once;

    use crate::auth::{Credentials, MIN_BCRYPT_COST, NewAccount, Role};
    use crate::db::{create_goal, create_log, create_student, insert_account};
    use crate::env::AppConfig;
    use crate::error::AppError;
    use crate::init_rocket;
    use crate::models::{GoalFields, LogFields, StudentFields};

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    pub fn test_config() -> AppConfig {
        AppConfig {
            bcrypt_cost: MIN_BCRYPT_COST,
            ..AppConfig::default()
        }
    }

    struct TestUser {
        email: String,
        role: Role,
        full_name: Option<String>,
    }

    struct TestGoal {
        student_code: String,
        subject: String,
    }

    struct TestLog {
        subject: String,
        date: String,
        score: String,
        author: Option<String>,
    }

    #[derive(Default)]
    pub struct TestDbBuilder {
        users: Vec<TestUser>,
        students: Vec<(String, String)>,
        goals: Vec<TestGoal>,
        logs: Vec<TestLog>,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn admin(mut self, email: &str) -> Self {
            self.users.push(TestUser {
                email: email.to_string(),
                role: Role::Admin,
                full_name: None,
            });
            self
        }

        pub fn assistant(mut self, email: &str, full_name: Option<&str>) -> Self {
            self.users.push(TestUser {
                email: email.to_string(),
                role: Role::Assistant,
                full_name: full_name.map(String::from),
            });
            self
        }

        pub fn student(mut self, name: &str, student_code: &str) -> Self {
            self.students
                .push((name.to_string(), student_code.to_string()));
            self
        }

        /// Goals are keyed by subject, so keep subjects unique per test db.
        pub fn goal(mut self, student_code: &str, subject: &str) -> Self {
            self.goals.push(TestGoal {
                student_code: student_code.to_string(),
                subject: subject.to_string(),
            });
            self
        }

        pub fn log(mut self, subject: &str, date: &str, score: &str, author: Option<&str>) -> Self {
            self.logs.push(TestLog {
                subject: subject.to_string(),
                date: date.to_string(),
                score: score.to_string(),
                author: author.map(String::from),
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder().is_test(true).try_init();
            });

            let pool = SqlitePool::connect("sqlite::memory:").await?;
            sqlx::migrate!("./migrations").run(&pool).await?;

            let credentials = Credentials::new(MIN_BCRYPT_COST);
            let mut user_ids = HashMap::new();
            let mut student_ids = HashMap::new();
            let mut goal_ids = HashMap::new();

            for user in &self.users {
                let account = NewAccount {
                    email: user.email.clone(),
                    password_hash: credentials.hash(STANDARD_PASSWORD).await?,
                    full_name: user.full_name.clone(),
                    school_name: None,
                };
                let mut conn = pool.acquire().await?;
                let id = insert_account(&mut *conn, &account, user.role).await?;
                user_ids.insert(user.email.clone(), id);
            }

            for (name, code) in &self.students {
                let fields = StudentFields {
                    name: name.clone(),
                    student_id: code.clone(),
                    active: true,
                };
                let id = create_student(&pool, &fields).await?;
                student_ids.insert(code.clone(), id);
            }

            for goal in &self.goals {
                let fields = GoalFields {
                    student_id: student_ids[&goal.student_code],
                    subject: goal.subject.clone(),
                    iep_date: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap_or_default(),
                    description: format!("{} goal", goal.subject),
                    mastery_score: None,
                    mastery_count: None,
                };
                let id = create_goal(&pool, &fields).await?;
                goal_ids.insert(goal.subject.clone(), id);
            }

            for log in &self.logs {
                let author = match &log.author {
                    Some(email) => user_ids[email],
                    None => *user_ids.values().next().unwrap_or(&0),
                };
                let fields = LogFields {
                    goal_id: goal_ids[&log.subject],
                    log_date: NaiveDate::parse_from_str(&log.date, "%Y-%m-%d")
                        .map_err(|err| AppError::Validation(err.to_string()))?,
                    score: log.score.clone(),
                    prompt_level: "Verbal".to_string(),
                    manipulatives_used: false,
                    manipulatives_type: String::new(),
                    compliance: "Good".to_string(),
                    behavior: "Calm".to_string(),
                    time_spent: "10m".to_string(),
                    notes: String::new(),
                };
                create_log(&pool, author, &fields).await?;
            }

            Ok(TestDb {
                pool,
                user_ids,
                student_ids,
                goal_ids,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub user_ids: HashMap<String, i64>,
        pub student_ids: HashMap<String, i64>,
        pub goal_ids: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn user_id(&self, email: &str) -> i64 {
            self.user_ids[email]
        }

        pub fn student_id(&self, code: &str) -> i64 {
            self.student_ids[code]
        }

        pub fn goal_id(&self, subject: &str) -> i64 {
            self.goal_ids[subject]
        }

        pub async fn count(&self, table: &str) -> i64 {
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&self.pool)
                .await
                .unwrap()
        }

        pub async fn admin_count(&self) -> i64 {
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin'")
                .fetch_one(&self.pool)
                .await
                .unwrap()
        }
    }

    /// An admin, an assistant, two students (Math and Reading goals on the
    /// first) and three logs.
    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .admin("admin@school.test")
            .assistant("aide@school.test", Some("Jamie Aide"))
            .student("Ava Smith", "S-100")
            .student("Ben Jones", "S-200")
            .goal("S-100", "Math")
            .goal("S-100", "Reading")
            .log("Math", "2024-10-01", "3/5", Some("aide@school.test"))
            .log("Math", "2024-10-02", "4/5", Some("admin@school.test"))
            .log("Reading", "2024-10-02", "2/5", Some("aide@school.test"))
            .build()
            .await
            .expect("Failed to build standard test database")
    }

    pub async fn empty_test_db() -> TestDb {
        TestDbBuilder::new()
            .build()
            .await
            .expect("Failed to build empty test database")
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        let rocket = init_rocket(test_db.pool.clone(), test_config());
        let client = Client::tracked(rocket)
            .await
            .expect("valid rocket instance");
        (client, test_db)
    }

    pub async fn login(client: &Client, email: &str, password: &str) -> Status {
        client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(json!({ "email": email, "password": password }).to_string())
            .dispatch()
            .await
            .status()
    }

    pub async fn login_as(client: &Client, email: &str) {
        let status = login(client, email, STANDARD_PASSWORD).await;
        assert_eq!(status, Status::Ok, "login as {} failed", email);
    }

    pub async fn body_json(response: rocket::local::asynchronous::LocalResponse<'_>) -> serde_json::Value {
        let body = response.into_string().await.unwrap_or_default();
        serde_json::from_str(&body).unwrap_or(serde_json::Value::Null)
    }
}
