// SQL Command Executor
// Builds commands against any Postgres executor: a connection, a transaction
// (`&mut *tx`) or a listener (`&mut listener`)

use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;
use sqlx::{Encode, Executor, Row, Type};
use tracing::trace;

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlCommandExecutor;

impl SqlCommandExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Prepare `statement` for execution on `executor`
    pub fn create_command<'q, E>(&self, executor: E, statement: &'q str) -> SqlCommand<'q, E> {
        SqlCommand {
            executor,
            statement,
            query: sqlx::query(statement),
        }
    }

    /// Run a multi-statement script (no binds) over the simple query protocol
    pub async fn run_script<'c, E>(&self, executor: E, script: &'c str) -> Result<u64, sqlx::Error>
    where
        E: Executor<'c, Database = Postgres>,
    {
        trace!(statement = %summary(script), "run_script");
        let result = executor.execute(sqlx::raw_sql(script)).await?;
        Ok(result.rows_affected())
    }
}

/// One parameterized statement bound to an executor
pub struct SqlCommand<'q, E> {
    executor: E,
    statement: &'q str,
    query: Query<'q, Postgres, PgArguments>,
}

impl<'q, E> SqlCommand<'q, E> {
    /// Bind the next positional parameter
    pub fn bind<T>(mut self, value: T) -> Self
    where
        T: 'q + Encode<'q, Postgres> + Type<Postgres>,
    {
        self.query = self.query.bind(value);
        self
    }

    /// Execute and return the number of affected rows
    pub async fn execute_non_query<'c>(self) -> Result<u64, sqlx::Error>
    where
        E: Executor<'c, Database = Postgres>,
    {
        trace!(statement = %summary(self.statement), "execute_non_query");
        let result = self.query.execute(self.executor).await?;
        Ok(result.rows_affected())
    }

    /// Execute and return the first column of the first row as text.
    ///
    /// `None` when no row came back or the value was NULL.
    pub async fn execute_scalar<'c>(self) -> Result<Option<String>, sqlx::Error>
    where
        E: Executor<'c, Database = Postgres>,
    {
        trace!(statement = %summary(self.statement), "execute_scalar");
        let row = self.query.fetch_optional(self.executor).await?;
        match row {
            Some(row) => row.try_get::<Option<String>, _>(0),
            None => Ok(None),
        }
    }
}

// First few words of a statement, for trace output
fn summary(statement: &str) -> String {
    statement
        .split_whitespace()
        .take(6)
        .collect::<Vec<_>>()
        .join(" ")
}
