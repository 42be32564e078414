//! Hand-rolled lexer and recursive-descent parser for the FetchQL dialect.
//!
//! The dialect is a bounded subset of T-SQL: SELECT with TOP/DISTINCT,
//! joins, WHERE/HAVING, GROUP BY (including date-part grouping), ORDER BY,
//! UNION[ALL], INSERT/UPDATE/DELETE, and scalar variables. CTEs, window
//! functions, and correlated subqueries are not part of the grammar.

mod lexer;
mod parser;
mod token;

use fetchql_ast::Statement;
use fetchql_common::Result;

use lexer::Lexer;
use parser::Parser;

/// Parses `text` into a [`Statement`], or a [`fetchql_common::Error::ParseError`]
/// carrying the byte offset of the first offending token.
pub fn parse(text: &str) -> Result<Statement> {
    let tokens = Lexer::new(text).tokenize()?;
    Parser::new(tokens).parse_statement()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_explain_scenario_delete() {
        let stmt = parse("DELETE FROM account WHERE statecode = 1").unwrap();
        assert!(matches!(stmt, Statement::Delete(_)));
    }

    #[test]
    fn reports_position_of_lexer_error() {
        let err = parse("SELECT * FROM account WHERE #bad").unwrap_err();
        assert!(err.to_string().contains("parse error at position"));
    }
}
