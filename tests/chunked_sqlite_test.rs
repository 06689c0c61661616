use serde_json::json;
use sheet_query::db::{ChunkedQueryExecutor, DbSession, QuerySession, SessionOptions};
use sheet_query::error::AppError;
use sheet_query::models::{ConnectionDescriptor, DatabaseSettings, QueryTemplate};
use tempfile::NamedTempFile;

const SERVICE_COUNT: usize = 2500;

fn writable() -> SessionOptions {
    SessionOptions {
        sqlite_create_if_missing: true,
        ..SessionOptions::default()
    }
}

/// Create a SQLite file with `SERVICE_COUNT` services named SVC00000, SVC00001, ...
async fn seed_services() -> (NamedTempFile, ConnectionDescriptor) {
    let temp_file = NamedTempFile::new().unwrap();
    let url = format!("sqlite:{}", temp_file.path().to_str().unwrap());
    let descriptor = DatabaseSettings::from_url(&url)
        .unwrap()
        .descriptor("services")
        .unwrap();

    let mut session = DbSession::connect(&descriptor, &writable()).await.unwrap();
    session
        .execute(
            "CREATE TABLE services (
                SERVICENAME TEXT NOT NULL,
                REGION TEXT,
                LOAD INTEGER,
                RATIO REAL
            )",
        )
        .await
        .unwrap();
    let inserted = session
        .execute(&format!(
            "WITH RECURSIVE seq(n) AS (SELECT 0 UNION ALL SELECT n + 1 FROM seq WHERE n < {})
             INSERT INTO services (SERVICENAME, REGION, LOAD, RATIO)
             SELECT printf('SVC%05d', n),
                    CASE n % 2 WHEN 0 THEN 'north' ELSE 'south' END,
                    n,
                    n / 4.0
             FROM seq",
            SERVICE_COUNT - 1
        ))
        .await
        .unwrap();
    assert_eq!(inserted, SERVICE_COUNT as u64);
    session.close().await.unwrap();

    (temp_file, descriptor)
}

fn service_keys(range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|n| format!("SVC{:05}", n)).collect()
}

fn executor(chunk_size: usize) -> ChunkedQueryExecutor {
    ChunkedQueryExecutor::with_options(chunk_size, writable())
}

#[tokio::test]
async fn test_all_keys_across_three_chunks() {
    let (_file, descriptor) = seed_services().await;
    let template =
        QueryTemplate::parse("SELECT SERVICENAME, REGION FROM services WHERE SERVICENAME IN ({})")
            .unwrap();
    let keys = service_keys(0..SERVICE_COUNT);

    let outcome = executor(999)
        .execute(&descriptor, &template, &keys)
        .await
        .unwrap();

    assert_eq!(outcome.chunk_count, 3);
    assert_eq!(outcome.result.columns, vec!["SERVICENAME", "REGION"]);
    assert_eq!(outcome.result.row_count(), SERVICE_COUNT);
    assert_eq!(outcome.result.rows[0][0], json!("SVC00000"));
    assert_eq!(outcome.result.rows[SERVICE_COUNT - 1][0], json!("SVC02499"));
}

#[tokio::test]
async fn test_rows_follow_chunk_order() {
    let (_file, descriptor) = seed_services().await;
    let template = QueryTemplate::parse(
        "SELECT SERVICENAME FROM services WHERE SERVICENAME IN ({}) ORDER BY SERVICENAME",
    )
    .unwrap();
    // First chunk: 3 and 1, second chunk: 2.
    let keys = vec![
        "SVC00003".to_string(),
        "SVC00001".to_string(),
        "SVC00002".to_string(),
    ];

    let outcome = executor(2)
        .execute(&descriptor, &template, &keys)
        .await
        .unwrap();

    let names: Vec<_> = outcome.result.rows.iter().map(|r| r[0].clone()).collect();
    assert_eq!(
        names,
        vec![json!("SVC00001"), json!("SVC00003"), json!("SVC00002")]
    );
    assert_eq!(outcome.chunk_count, 2);
}

#[tokio::test]
async fn test_column_values_are_typed() {
    let (_file, descriptor) = seed_services().await;
    let template = QueryTemplate::parse(
        "SELECT SERVICENAME, LOAD, RATIO FROM services WHERE SERVICENAME IN ({})",
    )
    .unwrap();

    let outcome = executor(999)
        .execute(&descriptor, &template, &["SVC00010".to_string()])
        .await
        .unwrap();

    let record = outcome.result.record(0).unwrap();
    assert_eq!(record["SERVICENAME"], json!("SVC00010"));
    assert_eq!(record["LOAD"], json!(10));
    assert_eq!(record["RATIO"], json!(2.5));
}

#[tokio::test]
async fn test_unmatched_keys_keep_columns() {
    let (_file, descriptor) = seed_services().await;
    let template =
        QueryTemplate::parse("SELECT SERVICENAME, REGION FROM services WHERE SERVICENAME IN ({})")
            .unwrap();

    let outcome = executor(999)
        .execute(&descriptor, &template, &["NOPE".to_string()])
        .await
        .unwrap();

    assert_eq!(outcome.chunk_count, 1);
    assert!(outcome.result.is_empty());
    assert_eq!(outcome.result.columns, vec!["SERVICENAME", "REGION"]);
}

#[tokio::test]
async fn test_empty_chunk_before_matching_chunk() {
    let (_file, descriptor) = seed_services().await;
    let template =
        QueryTemplate::parse("SELECT SERVICENAME, LOAD FROM services WHERE SERVICENAME IN ({})")
            .unwrap();
    let keys = vec!["NOPE".to_string(), "SVC00007".to_string()];

    let outcome = executor(1).execute(&descriptor, &template, &keys).await.unwrap();

    assert_eq!(outcome.chunk_count, 2);
    assert_eq!(outcome.result.columns, vec!["SERVICENAME", "LOAD"]);
    assert_eq!(outcome.result.rows, vec![vec![json!("SVC00007"), json!(7)]]);
}

#[tokio::test]
async fn test_failing_chunk_aborts_run() {
    let (_file, descriptor) = seed_services().await;
    let template =
        QueryTemplate::parse("SELECT * FROM no_such_table WHERE SERVICENAME IN ({})").unwrap();

    let err = executor(999)
        .execute(&descriptor, &template, &service_keys(0..10))
        .await
        .unwrap_err();

    match err {
        AppError::Execution { chunk, message, .. } => {
            assert_eq!(chunk, Some(0));
            assert!(message.contains("no_such_table"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_quote_in_key_breaks_sql() {
    let (_file, descriptor) = seed_services().await;
    let template =
        QueryTemplate::parse("SELECT SERVICENAME FROM services WHERE SERVICENAME IN ({})").unwrap();

    let result = executor(999)
        .execute(&descriptor, &template, &["O'Neil".to_string()])
        .await;

    assert!(matches!(result, Err(AppError::Execution { .. })));
}

#[tokio::test]
async fn test_session_runs_every_chunk_on_one_connection() {
    let (_file, descriptor) = seed_services().await;
    let template =
        QueryTemplate::parse("SELECT SERVICENAME FROM services WHERE SERVICENAME IN ({})").unwrap();

    let mut session = DbSession::connect(&descriptor, &writable()).await.unwrap();
    // A temp table is only visible on the connection that created it.
    session
        .execute("CREATE TEMP TABLE marker AS SELECT 1 AS x")
        .await
        .unwrap();
    let check = QueryTemplate::parse(
        "SELECT s.SERVICENAME FROM services s, marker m WHERE s.SERVICENAME IN ({})",
    )
    .unwrap();

    let outcome = executor(100)
        .execute_on(&mut session, &check, &service_keys(0..250))
        .await
        .unwrap();
    assert_eq!(outcome.chunk_count, 3);
    assert_eq!(outcome.result.row_count(), 250);

    let plain = executor(100)
        .execute_on(&mut session, &template, &service_keys(0..5))
        .await
        .unwrap();
    assert_eq!(plain.result.row_count(), 5);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_missing_database_file_is_execution_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.db");
    let descriptor = DatabaseSettings::from_url(&format!("sqlite:{}", path.display()))
        .unwrap()
        .descriptor("absent")
        .unwrap();
    let template = QueryTemplate::parse("SELECT 1 WHERE 'a' IN ({})").unwrap();

    let result = ChunkedQueryExecutor::new()
        .execute(&descriptor, &template, &["a".to_string()])
        .await;

    assert!(matches!(result, Err(AppError::Execution { .. })));
}
