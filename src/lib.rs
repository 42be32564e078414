//! FetchQL - translates a T-SQL-like dialect into FetchXML and executes it
//! against a remote record store.
//!
//! # Architecture
//!
//! The query processing pipeline is:
//! ```text
//! SQL text -> Parser -> AST -> Planner -> PlanNode tree -> Executor -> QueryResult
//! ```
//!
//! [`FetchQlEngine`] owns the remote client pool and hands out isolated
//! [`FetchQlSession`]s, each with its own DECLARE/SET variable scope.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fetchql::{FetchQlEngine, PlannerOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let pool: Arc<dyn fetchql_client::ClientPool> = todo!("a RemoteClient-backed pool");
//!     let engine = FetchQlEngine::new(pool);
//!     let mut session = engine.session();
//!
//!     let result = session
//!         .query("SELECT name, revenue FROM account WHERE revenue > 1000", &PlannerOptions::default())
//!         .await
//!         .unwrap();
//! }
//! ```

pub use fetchql_ast::Statement;
pub use fetchql_client::{ClientPool, PooledClient, RemoteClient};
pub use fetchql_common::cancellation::CancellationToken;
pub use fetchql_common::error::{Error, Result};
pub use fetchql_common::result::{ColumnInfo, QueryResult, QueryRow, QueryValue};
pub use fetchql_eval::VariableScope;
pub use fetchql_executor::{ExecutionContext, ExecutionStatistics};
pub use fetchql_plan::{PlanFormatter, PlanNode, QueryPlanDescription};
pub use fetchql_planner::{PlannerOptions, PlanResult};

use std::sync::Arc;

use tracing::instrument;

/// Splits a semicolon-separated batch into its statement texts, honoring
/// single-quoted string literals (`''` is an escaped quote, matching the
/// lexer) so a semicolon inside a string literal never ends a statement.
fn split_statements(text: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' if in_string && chars.peek() == Some(&'\'') => {
                current.push('\'');
                current.push('\'');
                chars.next();
            }
            '\'' => {
                in_string = !in_string;
                current.push(c);
            }
            ';' if !in_string => {
                if !current.trim().is_empty() {
                    statements.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        statements.push(current);
    }
    statements
}

/// Factory for creating isolated query sessions against one remote store.
///
/// `FetchQlEngine` is lightweight and shareable across threads: it is just a
/// handle to the connection pool. Each session created from it keeps its own
/// DECLARE/SET variable scope, but sessions share the same pool and its
/// concurrency limit.
#[derive(Clone)]
pub struct FetchQlEngine {
    pool: Arc<dyn ClientPool>,
}

impl FetchQlEngine {
    /// Creates a new engine backed by `pool`.
    pub fn new(pool: Arc<dyn ClientPool>) -> Self {
        Self { pool }
    }

    /// Creates a new session with an empty variable scope.
    pub fn session(&self) -> FetchQlSession {
        FetchQlSession::new(self.pool.clone())
    }
}

/// An isolated query execution session.
///
/// A session holds the DECLARE/SET variable bindings accumulated across the
/// statements it has run; successive calls to [`query`](Self::query) and
/// [`explain`](Self::explain) see variables declared by earlier ones. It is
/// not `Sync` by design: a batch of DECLARE/SET/SELECT statements is
/// inherently a sequential conversation with one caller.
pub struct FetchQlSession {
    pool: Arc<dyn ClientPool>,
    variables: Arc<VariableScope>,
}

impl FetchQlSession {
    /// Creates a new session backed by `pool`, with an empty variable scope.
    pub fn new(pool: Arc<dyn ClientPool>) -> Self {
        Self { pool, variables: Arc::new(VariableScope::new()) }
    }

    /// Plans and executes `sql`, buffering the whole result into a
    /// [`QueryResult`]. `sql` may be a batch of leading DECLARE/SET
    /// statements followed by exactly one SELECT/INSERT/UPDATE/DELETE/UNION
    /// statement; the batch's declarations are folded into this session's
    /// variable scope before the final statement is planned.
    #[instrument(skip(self, sql, options))]
    pub async fn query(&mut self, sql: &str, options: &PlannerOptions) -> Result<QueryResult> {
        let statement = self.prepare(sql)?;
        let plan_result = fetchql_planner::plan(&statement, options)?;
        let ctx = self.execution_context(options);
        fetchql_executor::execute(&plan_result.root, ctx).await
    }

    /// Plans `sql` without executing it and renders the explain-tree text
    /// format, for callers diagnosing why a query took the path it did.
    pub fn explain(&mut self, sql: &str, options: &PlannerOptions) -> Result<String> {
        let statement = self.prepare(sql)?;
        let plan_result = fetchql_planner::plan(&statement, options)?;
        let description = QueryPlanDescription::from_node(&plan_result.root);
        Ok(PlanFormatter::format(&description))
    }

    /// Plans `sql` and returns the chosen plan tree without executing it.
    pub fn plan(&mut self, sql: &str, options: &PlannerOptions) -> Result<PlanResult> {
        let statement = self.prepare(sql)?;
        fetchql_planner::plan(&statement, options)
    }

    /// Gets a previously DECLAREd variable's current value.
    pub fn get_variable(&self, name: &str) -> Result<QueryValue> {
        self.variables.get(name)
    }

    /// Splits `sql` on statement boundaries, applies every leading
    /// DECLARE/SET statement to this session's scope, and returns the final
    /// statement (the one actually meant to be planned).
    fn prepare(&mut self, sql: &str) -> Result<Statement> {
        let parts = split_statements(sql);
        let Some((last, leading)) = parts.split_last() else {
            return Err(Error::invalid_request("empty statement batch"));
        };
        for part in leading {
            match fetchql_parser::parse(part)? {
                Statement::Declare(d) => {
                    let initial = match &d.initial {
                        Some(expr) => {
                            Some(fetchql_eval::evaluate(expr, &QueryRow::new(String::new()))?)
                        }
                        None => None,
                    };
                    self.variables_mut().declare(&d.name, d.sql_type.clone(), initial)?;
                }
                Statement::Set(s) => {
                    let value = fetchql_eval::Evaluator::with_scope(&QueryRow::new(String::new()), &self.variables)
                        .evaluate(&s.value)?;
                    self.variables_mut().set(&s.name, value)?;
                }
                other => return Err(Error::invalid_request(format!(
                    "expected DECLARE or SET in a statement batch, found {other:?}"
                ))),
            }
        }
        fetchql_parser::parse(last)
    }

    /// Unique access to the variable scope: safe because the `Arc` clone
    /// handed to a previous query's `ExecutionContext` has already been
    /// dropped by the time the next statement batch is prepared.
    fn variables_mut(&mut self) -> &mut VariableScope {
        Arc::get_mut(&mut self.variables).expect("session's variable scope is not shared while mutating")
    }

    fn execution_context(&self, _options: &PlannerOptions) -> ExecutionContext {
        let cancel = CancellationToken::new();
        ExecutionContext::new(self.pool.clone(), cancel).with_variables(self.variables.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_statements_on_semicolons() {
        let parts = split_statements("DECLARE @x INT = 1; SET @x = 2; SELECT * FROM account");
        assert_eq!(parts.len(), 3);
    }

    #[test]
    fn semicolon_inside_string_literal_does_not_split() {
        let parts = split_statements("SELECT * FROM account WHERE name = 'a;b'");
        assert_eq!(parts.len(), 1);
        assert!(parts[0].contains("a;b"));
    }

    #[test]
    fn escaped_quote_inside_string_literal_is_preserved() {
        let parts = split_statements("SELECT * FROM account WHERE name = 'O''Brien; Corp'");
        assert_eq!(parts.len(), 1);
        assert!(parts[0].contains("O''Brien; Corp"));
    }
}
