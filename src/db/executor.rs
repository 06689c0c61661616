//! Chunked query execution.
//!
//! A key list of any length is turned into IN-list sized batches. Each batch
//! is quoted, joined and substituted into the query template, then run on a
//! single session. The per-batch rows are concatenated in order.
//!
//! Any failing batch aborts the whole run; rows from earlier batches are
//! dropped with the accumulator.

use crate::db::session::{DbSession, QuerySession, SessionOptions};
use crate::error::{AppError, AppResult};
use crate::models::{ConnectionDescriptor, MAX_CHUNK_SIZE, QueryTemplate, ResultSet};
use std::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

/// Wrap each key in single quotes.
///
/// Embedded quotes are not escaped: keys come from a trusted upload and a
/// quote inside a key produces invalid SQL.
pub fn quote_keys<S: AsRef<str>>(keys: &[S]) -> Vec<String> {
    keys.iter().map(|k| format!("'{}'", k.as_ref())).collect()
}

/// Split quoted keys into consecutive batches of at most `chunk_size`.
pub fn chunk_keys(quoted: &[String], chunk_size: usize) -> Vec<&[String]> {
    quoted.chunks(chunk_size.max(1)).collect()
}

/// Number of batches `len` keys produce.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    len.div_ceil(chunk_size.max(1))
}

/// Render the SQL for every batch of `keys`, in execution order.
pub fn render_chunks<S: AsRef<str>>(
    template: &QueryTemplate,
    keys: &[S],
    chunk_size: usize,
) -> Vec<String> {
    let quoted = quote_keys(keys);
    chunk_keys(&quoted, chunk_size)
        .into_iter()
        .map(|chunk| template.render(&chunk.join(",")))
        .collect()
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub result: ResultSet,
    pub chunk_count: usize,
    pub execution_time_ms: u64,
}

/// Executes a query template over a key list, one batch at a time.
#[derive(Debug, Clone)]
pub struct ChunkedQueryExecutor {
    chunk_size: usize,
    session_options: SessionOptions,
}

impl ChunkedQueryExecutor {
    /// Create an executor with the default batch size of 999.
    pub fn new() -> Self {
        Self {
            chunk_size: MAX_CHUNK_SIZE,
            session_options: SessionOptions::default(),
        }
    }

    /// Create an executor with custom settings.
    ///
    /// The batch size is clamped to `1..=999`.
    pub fn with_options(chunk_size: usize, session_options: SessionOptions) -> Self {
        Self {
            chunk_size: chunk_size.clamp(1, MAX_CHUNK_SIZE),
            session_options,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn session_options(&self) -> &SessionOptions {
        &self.session_options
    }

    /// Open a session for `descriptor`, run every batch on it and close it.
    ///
    /// An empty key list returns an empty result without connecting.
    pub async fn execute(
        &self,
        descriptor: &ConnectionDescriptor,
        template: &QueryTemplate,
        keys: &[String],
    ) -> AppResult<ExecutionOutcome> {
        if keys.is_empty() {
            warn!("Key list is empty, nothing to query");
            return Ok(ExecutionOutcome {
                result: ResultSet::default(),
                chunk_count: 0,
                execution_time_ms: 0,
            });
        }

        let mut session = DbSession::connect(descriptor, &self.session_options).await?;
        let outcome = self.execute_on(&mut session, template, keys).await;

        // Close even when a chunk failed; the chunk error wins.
        let closed = session.close().await;
        let outcome = outcome?;
        if let Err(e) = closed {
            warn!(error = %e, "Failed to close database session");
        }
        Ok(outcome)
    }

    /// Run every batch on an already open session.
    pub async fn execute_on<S: QuerySession>(
        &self,
        session: &mut S,
        template: &QueryTemplate,
        keys: &[String],
    ) -> AppResult<ExecutionOutcome> {
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let span = info_span!("chunked_query", run_id = %run_id);

        async move {
            let start = Instant::now();
            let statements = render_chunks(template, keys, self.chunk_size);
            let total = statements.len();

            info!(
                keys = keys.len(),
                chunks = total,
                chunk_size = self.chunk_size,
                "Executing chunked query"
            );

            let mut result = ResultSet::default();
            for (index, sql) in statements.iter().enumerate() {
                let chunk = session
                    .fetch_all(sql)
                    .await
                    .map_err(|e| e.at_chunk(index))?;
                debug!(
                    chunk = index + 1,
                    of = total,
                    keys = (keys.len() - index * self.chunk_size).min(self.chunk_size),
                    rows = chunk.row_count(),
                    "Chunk executed"
                );
                result.append(chunk).map_err(|e| e.at_chunk(index))?;
            }

            let execution_time_ms = start.elapsed().as_millis() as u64;
            info!(
                rows = result.row_count(),
                chunks = total,
                execution_time_ms,
                "Chunked query finished"
            );

            Ok(ExecutionOutcome {
                result,
                chunk_count: total,
                execution_time_ms,
            })
        }
        .instrument(span)
        .await
    }
}

impl Default for ChunkedQueryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate the batch size given on the command line.
pub fn validate_chunk_size(chunk_size: usize) -> AppResult<usize> {
    if (1..=MAX_CHUNK_SIZE).contains(&chunk_size) {
        Ok(chunk_size)
    } else {
        Err(AppError::configuration(format!(
            "Chunk size must be between 1 and {}, got {}",
            MAX_CHUNK_SIZE, chunk_size
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Session double that records the SQL it receives and replays canned results.
    struct ScriptedSession {
        executed: Vec<String>,
        responses: Vec<AppResult<ResultSet>>,
    }

    impl ScriptedSession {
        fn new(responses: Vec<AppResult<ResultSet>>) -> Self {
            Self {
                executed: Vec::new(),
                responses,
            }
        }
    }

    impl QuerySession for ScriptedSession {
        async fn fetch_all(&mut self, sql: &str) -> AppResult<ResultSet> {
            self.executed.push(sql.to_string());
            if self.responses.is_empty() {
                return Ok(ResultSet::default());
            }
            self.responses.remove(0)
        }

        async fn close(self) -> AppResult<()> {
            Ok(())
        }
    }

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("SVC{:05}", i)).collect()
    }

    fn id_name(rows: &[(i64, &str)]) -> ResultSet {
        ResultSet {
            columns: vec!["ID".to_string(), "NAME".to_string()],
            rows: rows.iter().map(|(id, n)| vec![json!(id), json!(n)]).collect(),
        }
    }

    #[test]
    fn test_quote_keys() {
        assert_eq!(quote_keys(&["A", "B"]), vec!["'A'", "'B'"]);
    }

    #[test]
    fn test_quote_keys_does_not_escape() {
        assert_eq!(quote_keys(&["O'Neil"]), vec!["'O'Neil'"]);
    }

    #[test]
    fn test_chunk_count() {
        assert_eq!(chunk_count(0, 999), 0);
        assert_eq!(chunk_count(1, 999), 1);
        assert_eq!(chunk_count(999, 999), 1);
        assert_eq!(chunk_count(1000, 999), 2);
        assert_eq!(chunk_count(1998, 999), 2);
        assert_eq!(chunk_count(1999, 999), 3);
    }

    #[test]
    fn test_chunks_of_1998_are_two_full_batches() {
        let quoted = quote_keys(&keys(1998));
        let chunks = chunk_keys(&quoted, 999);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == 999));
    }

    #[test]
    fn test_chunks_preserve_order() {
        let quoted = quote_keys(&keys(2500));
        let chunks = chunk_keys(&quoted, 999);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 502);
        let rejoined: Vec<String> = chunks.concat();
        assert_eq!(rejoined, quoted);
    }

    #[test]
    fn test_random_lengths_rejoin_in_order() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let n = rng.gen_range(0..5000);
            let size = rng.gen_range(1..=MAX_CHUNK_SIZE);
            let quoted = quote_keys(&keys(n));
            let chunks = chunk_keys(&quoted, size);

            assert_eq!(chunks.len(), chunk_count(n, size));
            assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= size));
            assert_eq!(chunks.concat(), quoted);
        }
    }

    #[test]
    fn test_render_chunks_substitutes_keys() {
        let template = QueryTemplate::parse("SELECT * FROM svc WHERE SERVICENAME IN ({})").unwrap();
        let keys = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let statements = render_chunks(&template, &keys, 999);
        assert_eq!(statements.len(), 1);
        assert!(statements[0].contains("'A','B','C'"));
    }

    #[test]
    fn test_with_options_clamps_chunk_size() {
        let executor = ChunkedQueryExecutor::with_options(5000, SessionOptions::default());
        assert_eq!(executor.chunk_size(), MAX_CHUNK_SIZE);
        let executor = ChunkedQueryExecutor::with_options(0, SessionOptions::default());
        assert_eq!(executor.chunk_size(), 1);
    }

    #[test]
    fn test_validate_chunk_size() {
        assert!(validate_chunk_size(999).is_ok());
        assert!(validate_chunk_size(1).is_ok());
        assert!(validate_chunk_size(0).is_err());
        assert!(validate_chunk_size(1000).is_err());
    }

    #[tokio::test]
    async fn test_execute_on_one_query_per_chunk() {
        let template = QueryTemplate::parse("SELECT ID, NAME FROM svc WHERE NAME IN ({})").unwrap();
        let mut session = ScriptedSession::new(Vec::new());
        let executor = ChunkedQueryExecutor::new();

        let outcome = executor
            .execute_on(&mut session, &template, &keys(2000))
            .await
            .unwrap();

        assert_eq!(outcome.chunk_count, 3);
        assert_eq!(session.executed.len(), 3);
        assert!(session.executed[0].contains("'SVC00000'"));
        assert!(session.executed[2].contains("'SVC01998','SVC01999'"));
    }

    #[tokio::test]
    async fn test_execute_on_concatenates_in_chunk_order() {
        let template = QueryTemplate::parse("SELECT ID, NAME FROM svc WHERE NAME IN ({})").unwrap();
        let mut session = ScriptedSession::new(vec![
            Ok(id_name(&[(1, "a"), (2, "b")])),
            Ok(id_name(&[(3, "c"), (4, "d"), (5, "e")])),
        ]);
        let executor = ChunkedQueryExecutor::with_options(2, SessionOptions::default());

        let outcome = executor
            .execute_on(&mut session, &template, &keys(4))
            .await
            .unwrap();

        assert_eq!(outcome.result.columns, vec!["ID", "NAME"]);
        assert_eq!(outcome.result.row_count(), 5);
        let ids: Vec<_> = outcome.result.rows.iter().map(|r| r[0].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(2), json!(3), json!(4), json!(5)]);
    }

    #[tokio::test]
    async fn test_execute_on_failure_discards_partial_rows() {
        let template = QueryTemplate::parse("SELECT ID, NAME FROM svc WHERE NAME IN ({})").unwrap();
        let mut session = ScriptedSession::new(vec![
            Ok(id_name(&[(1, "a")])),
            Err(AppError::execution(
                "ORA-00942: table or view does not exist",
                Some("ORA-00942".to_string()),
                "check",
            )),
            Ok(id_name(&[(3, "c")])),
        ]);
        let executor = ChunkedQueryExecutor::with_options(1, SessionOptions::default());

        let err = executor
            .execute_on(&mut session, &template, &keys(3))
            .await
            .unwrap_err();

        match err {
            AppError::Execution { chunk, code, .. } => {
                assert_eq!(chunk, Some(1));
                assert_eq!(code.as_deref(), Some("ORA-00942"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The third chunk never ran.
        assert_eq!(session.executed.len(), 2);
    }

    #[tokio::test]
    async fn test_execute_empty_keys_does_not_connect() {
        // A descriptor pointing nowhere: connecting would fail.
        let descriptor = ConnectionDescriptor {
            kind: crate::models::DatabaseType::SQLite,
            user: String::new(),
            password: String::new(),
            host: String::new(),
            service_name: "/nonexistent/dir/never.db".to_string(),
            port: 0,
        };
        let template = QueryTemplate::parse("SELECT * FROM t WHERE k IN ({})").unwrap();
        let outcome = ChunkedQueryExecutor::new()
            .execute(&descriptor, &template, &[])
            .await
            .unwrap();
        assert_eq!(outcome.chunk_count, 0);
        assert!(outcome.result.columns.is_empty());
        assert!(outcome.result.is_empty());
    }
}
