//! Loan store tests against a live PostgreSQL
//!
//! Each test creates its own schema with the `lms_*` tables and drops it
//! afterwards. Run with:
//! DATABASE_URL=postgres://... cargo test --test pg_store -- --ignored

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::sync::Barrier;

use library_loans::{
    config::LoansConfig,
    error::{AppError, Resource},
    models::{CopyId, LoanId, LoanStatus, MemberId, TitleId, TitleRef},
    repository::{Repository, SchemaName},
    services::{ManualClock, Services},
};

static NEXT_SCHEMA: AtomicUsize = AtomicUsize::new(0);

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

struct PgDesk {
    pool: PgPool,
    schema: String,
    repository: Repository,
    services: Services,
}

impl PgDesk {
    async fn new(lock_timeout_ms: u64) -> Self {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPoolOptions::new()
            .max_connections(12)
            .connect(&url)
            .await
            .expect("Failed to connect to database");

        let schema = format!(
            "lms_test_{}_{}",
            std::process::id(),
            NEXT_SCHEMA.fetch_add(1, Ordering::SeqCst)
        );
        // Integer keys, as in the catalog's own tables
        let ddl = [
            format!("CREATE SCHEMA {schema}"),
            format!(
                "CREATE TABLE {schema}.lms_books (
                    book_id SERIAL PRIMARY KEY,
                    title TEXT NOT NULL,
                    isbn TEXT
                )"
            ),
            format!(
                "CREATE TABLE {schema}.lms_book_copies (
                    copy_id SERIAL PRIMARY KEY,
                    book_id INTEGER NOT NULL REFERENCES {schema}.lms_books (book_id),
                    status TEXT NOT NULL DEFAULT 'Available'
                )"
            ),
            format!(
                "CREATE TABLE {schema}.lms_members (
                    member_id SERIAL PRIMARY KEY,
                    name TEXT NOT NULL
                )"
            ),
            format!(
                "CREATE TABLE {schema}.lms_loans (
                    loan_id INTEGER GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
                    copy_id INTEGER NOT NULL REFERENCES {schema}.lms_book_copies (copy_id),
                    member_id INTEGER NOT NULL REFERENCES {schema}.lms_members (member_id),
                    loan_date TIMESTAMPTZ NOT NULL,
                    due_date TIMESTAMPTZ NOT NULL,
                    return_date TIMESTAMPTZ
                )"
            ),
        ];
        for statement in &ddl {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .expect("Failed to create test tables");
        }

        let config = LoansConfig {
            schema: schema.clone(),
            lock_timeout_ms,
            ..LoansConfig::default()
        };
        let schema_name = SchemaName::parse(&schema).expect("valid schema name");
        let repository = Repository::postgres(pool.clone(), &schema_name, config.lock_timeout());
        let services = Services::new(
            repository.clone(),
            &config,
            Arc::new(ManualClock::new(at(2024, 1, 2))),
        );

        Self {
            pool,
            schema,
            repository,
            services,
        }
    }

    async fn add_title(&self, isbn: &str, title: &str) -> TitleId {
        let id: i64 = sqlx::query_scalar(&format!(
            "INSERT INTO {}.lms_books (title, isbn) VALUES ($1, $2) RETURNING book_id::bigint",
            self.schema
        ))
        .bind(title)
        .bind(isbn)
        .fetch_one(&self.pool)
        .await
        .expect("Failed to insert title");
        TitleId(id)
    }

    async fn add_copy(&self, title: TitleId) -> CopyId {
        let id: i64 = sqlx::query_scalar(&format!(
            "INSERT INTO {}.lms_book_copies (book_id) VALUES ($1) RETURNING copy_id::bigint",
            self.schema
        ))
        .bind(title.0)
        .fetch_one(&self.pool)
        .await
        .expect("Failed to insert copy");
        CopyId(id)
    }

    async fn add_member(&self, name: &str) -> MemberId {
        let id: i64 = sqlx::query_scalar(&format!(
            "INSERT INTO {}.lms_members (name) VALUES ($1) RETURNING member_id::bigint",
            self.schema
        ))
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .expect("Failed to insert member");
        MemberId(id)
    }

    async fn drop_schema(self) {
        sqlx::query(&format!("DROP SCHEMA {} CASCADE", self.schema))
            .execute(&self.pool)
            .await
            .expect("Failed to drop test schema");
    }
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_issue_takes_lowest_copy_and_reads_back() {
    let desk = PgDesk::new(5_000).await;
    let title = desk.add_title("978-0-14-044913-6", "Crime and Punishment").await;
    let copies = vec![
        desk.add_copy(title).await,
        desk.add_copy(title).await,
        desk.add_copy(title).await,
    ];
    let member = desk.add_member("Ada").await;

    let first = desk
        .services
        .loans
        .issue_loan(&TitleRef::Isbn("978-0-14-044913-6".into()), member, at(2024, 1, 1), at(2024, 1, 15))
        .await
        .unwrap();
    let second = desk
        .services
        .loans
        .issue_loan(&TitleRef::Id(title), member, at(2024, 1, 1), at(2024, 1, 15))
        .await
        .unwrap();
    assert!(second > first);

    let loan = desk.services.loans.get_loan(first).await.unwrap();
    assert_eq!(loan.copy_id, copies[0]);
    assert_eq!(loan.member_id, member);
    assert_eq!(loan.loan_date, at(2024, 1, 1));
    assert_eq!(loan.due_date, at(2024, 1, 15));
    assert!(loan.is_open());
    assert_eq!(
        desk.services.loans.get_loan(second).await.unwrap().copy_id,
        copies[1]
    );

    let availability = desk.services.loans.availability(&TitleRef::Id(title)).await.unwrap();
    assert_eq!(availability.total_copies, 3);
    assert_eq!(availability.available_copies, 1);

    let active = desk.services.loans.list_active_loans().await.unwrap();
    assert_eq!(active.len(), 2);
    assert_eq!(active[0].isbn, "978-0-14-044913-6");
    assert_eq!(active[0].status, LoanStatus::Active);

    let summary = desk.services.reports.summary().await.unwrap();
    assert_eq!(summary.active_count, 2);
    assert_eq!(summary.total_loans, 2);
    assert_eq!(summary.total_books, 1);
    assert_eq!(summary.total_members, 1);

    let months = desk.services.reports.loan_activity_by_month().await.unwrap();
    assert_eq!(months.len(), 1);
    assert_eq!(months[0].month, "2024-01");
    assert_eq!(months[0].count, 2);

    let top = desk.services.reports.top_titles(5).await.unwrap();
    assert_eq!(top[0].title_id, title);
    assert_eq!(top[0].times_borrowed, 2);

    desk.drop_schema().await;
}

#[tokio::test]
#[ignore]
async fn test_double_return_and_unknown_loan() {
    let desk = PgDesk::new(5_000).await;
    let title = desk.add_title("978-0-00-000002-2", "Middlemarch").await;
    desk.add_copy(title).await;
    let member = desk.add_member("Grace").await;

    let loan_id = desk
        .services
        .loans
        .issue_loan(&TitleRef::Id(title), member, at(2024, 1, 1), at(2024, 1, 15))
        .await
        .unwrap();

    let returned = desk.services.loans.return_loan(loan_id).await.unwrap();
    assert_eq!(returned.return_date, Some(at(2024, 1, 2)));

    let again = desk.services.loans.return_loan(loan_id).await;
    assert!(matches!(again, Err(AppError::AlreadyReturned(id)) if id == loan_id));
    assert_eq!(
        desk.services.loans.get_loan(loan_id).await.unwrap().return_date,
        Some(at(2024, 1, 2))
    );

    let unknown = desk.services.loans.return_loan(LoanId(9999)).await;
    assert!(matches!(
        unknown,
        Err(AppError::NotFound(Resource::Loan(LoanId(9999))))
    ));

    let copies = desk.repository.catalog.copies_of_title(title).await.unwrap();
    assert_eq!(copies.len(), 1);
    assert_eq!(
        desk.services.loans.availability(&TitleRef::Id(title)).await.unwrap().available_copies,
        1
    );

    desk.drop_schema().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_concurrent_issues_on_one_copy() {
    let desk = PgDesk::new(5_000).await;
    let title = desk.add_title("978-0-00-000003-3", "Emma").await;
    let copy = desk.add_copy(title).await;

    let contenders = 8;
    let mut members = Vec::new();
    for n in 0..contenders {
        members.push(desk.add_member(&format!("member {n}")).await);
    }

    let barrier = Arc::new(Barrier::new(contenders));
    let mut handles = Vec::new();
    for member in members {
        let services = desk.services.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            services
                .loans
                .issue_loan(&TitleRef::Id(title), member, at(2024, 1, 1), at(2024, 1, 15))
                .await
        }));
    }

    let mut wins = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(loan_id) => wins.push(loan_id),
            Err(AppError::NoCopyAvailable(t)) => assert_eq!(t, title),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(wins.len(), 1);
    assert_eq!(
        desk.services.loans.get_loan(wins[0]).await.unwrap().copy_id,
        copy
    );
    assert_eq!(desk.services.loans.list_active_loans().await.unwrap().len(), 1);

    desk.drop_schema().await;
}

#[tokio::test]
#[ignore]
async fn test_lock_wait_is_bounded_and_transient() {
    let desk = PgDesk::new(200).await;
    let title = desk.add_title("978-0-00-000004-4", "Persuasion").await;
    let copy = desk.add_copy(title).await;
    let member = desk.add_member("Anne").await;

    let loan_id = desk
        .services
        .loans
        .issue_loan(&TitleRef::Id(title), member, at(2024, 1, 1), at(2024, 1, 15))
        .await
        .unwrap();

    // Another session sits on the loan row
    let mut holder = desk.pool.begin().await.unwrap();
    sqlx::query(&format!(
        "SELECT 1 FROM {}.lms_loans WHERE loan_id = $1 FOR UPDATE",
        desk.schema
    ))
    .bind(loan_id.0)
    .execute(&mut *holder)
    .await
    .unwrap();

    // Straight on the store: only the server-side lock_timeout can end the wait
    let mut unit = desk.repository.loans.begin().await.unwrap();
    let locked = tokio::time::timeout(Duration::from_secs(5), unit.lock_loan(loan_id))
        .await
        .expect("lock wait was not bounded by lock_timeout");
    assert!(matches!(locked, Err(AppError::Transient(_))));
    drop(unit);

    let result = desk.services.loans.return_loan(loan_id).await;
    assert!(matches!(result, Err(AppError::Transient(_))));

    holder.rollback().await.unwrap();

    let returned = desk.services.loans.return_loan(loan_id).await.unwrap();
    assert_eq!(returned.copy_id, copy);

    // Copy selection waits on a held copy the same way
    let mut holder = desk.repository.loans.begin().await.unwrap();
    assert_eq!(holder.find_available_copy(title).await.unwrap(), Some(copy));
    let blocked = desk
        .services
        .loans
        .issue_loan(&TitleRef::Id(title), member, at(2024, 1, 3), at(2024, 1, 17))
        .await;
    assert!(matches!(blocked, Err(AppError::Transient(_))));
    drop(holder);

    desk.drop_schema().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[ignore]
async fn test_waiting_issue_moves_past_a_copy_that_was_lent() {
    let desk = PgDesk::new(5_000).await;
    let title = desk.add_title("978-0-00-000005-5", "Mansfield Park").await;
    let first = desk.add_copy(title).await;
    let second = desk.add_copy(title).await;
    let member = desk.add_member("Fanny").await;

    let mut holder = desk.repository.loans.begin().await.unwrap();
    assert_eq!(holder.find_available_copy(title).await.unwrap(), Some(first));
    holder.mark_loaned(first).await.unwrap();

    let services = desk.services.clone();
    let waiting = tokio::spawn(async move {
        services
            .loans
            .issue_loan(&TitleRef::Id(title), member, at(2024, 1, 1), at(2024, 1, 15))
            .await
    });

    // Let the issue block on the first copy before it is lent
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!waiting.is_finished());
    holder.commit().await.unwrap();

    let loan_id = waiting.await.unwrap().unwrap();
    assert_eq!(
        desk.services.loans.get_loan(loan_id).await.unwrap().copy_id,
        second
    );

    desk.drop_schema().await;
}
