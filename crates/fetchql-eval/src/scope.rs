//! DECLARE/SET/GET scalar variable scope.
//!
//! Variable names are case-insensitive and must begin with `@`. `Set` and
//! `Get` on an undeclared name raise [`Error::ExecutionFailed`] rather than
//! implicitly declaring it — DECLARE is the only way a name enters scope.

use rustc_hash::FxHashMap;

use fetchql_common::{Error, QueryValue, Result};

/// Holds the `@name -> (sql_type, value)` bindings live for one compile's
/// statement batch (a DECLARE/SET sequence preceding a query).
#[derive(Debug, Default)]
pub struct VariableScope {
    vars: FxHashMap<String, (String, QueryValue)>,
}

impl VariableScope {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str) -> Result<String> {
        if !name.starts_with('@') {
            return Err(Error::execution_failed(format!(
                "variable name '{name}' must begin with '@'"
            )));
        }
        Ok(name.to_ascii_uppercase())
    }

    pub fn declare(&mut self, name: &str, sql_type: impl Into<String>, initial: Option<QueryValue>) -> Result<()> {
        let key = Self::key(name)?;
        self.vars
            .insert(key, (sql_type.into(), initial.unwrap_or_else(QueryValue::null)));
        Ok(())
    }

    pub fn set(&mut self, name: &str, value: QueryValue) -> Result<()> {
        let key = Self::key(name)?;
        match self.vars.get_mut(&key) {
            Some(entry) => {
                entry.1 = value;
                Ok(())
            }
            None => Err(Error::execution_failed(format!("undeclared variable '{name}'"))),
        }
    }

    pub fn get(&self, name: &str) -> Result<QueryValue> {
        let key = Self::key(name)?;
        self.vars
            .get(&key)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| Error::execution_failed(format!("undeclared variable '{name}'")))
    }

    pub fn sql_type(&self, name: &str) -> Result<String> {
        let key = Self::key(name)?;
        self.vars
            .get(&key)
            .map(|(t, _)| t.clone())
            .ok_or_else(|| Error::execution_failed(format!("undeclared variable '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_variable_is_case_insensitively_settable() {
        let mut scope = VariableScope::new();
        scope.declare("@Count", "INT", Some(QueryValue::from_i64(0))).unwrap();
        scope.set("@COUNT", QueryValue::from_i64(5)).unwrap();
        assert_eq!(scope.get("@count").unwrap(), QueryValue::from_i64(5));
    }

    #[test]
    fn set_on_undeclared_name_fails() {
        let mut scope = VariableScope::new();
        assert!(scope.set("@missing", QueryValue::null()).is_err());
    }

    #[test]
    fn name_without_at_sigil_is_rejected() {
        let mut scope = VariableScope::new();
        assert!(scope.declare("count", "INT", None).is_err());
    }
}
