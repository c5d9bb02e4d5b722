//! Expression evaluation context
//!
//! The only things an expression can see: the current row's values and
//! the built-in conversion functions.

use serde_json::Value;
use std::borrow::Cow;

use super::dates;
use crate::error::ExpressionResult;
use crate::models::Row;

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprValue {
    Text(String),
    Integer(i64),
}

impl ExprValue {
    /// Text form, used for concatenation and validation.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            ExprValue::Text(s) => Cow::Borrowed(s),
            ExprValue::Integer(n) => Cow::Owned(n.to_string()),
        }
    }

    pub fn into_json(self) -> Value {
        match self {
            ExprValue::Text(s) => Value::String(s),
            ExprValue::Integer(n) => Value::from(n),
        }
    }
}

/// Built-in functions callable from expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    /// `toEpoche(date, format)` - Unix seconds
    ToEpoche,
    /// `toIsoDate(date, format)` - ISO-8601 timestamp
    ToIsoDate,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "toEpoche" => Some(Builtin::ToEpoche),
            "toIsoDate" => Some(Builtin::ToIsoDate),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::ToEpoche => "toEpoche",
            Builtin::ToIsoDate => "toIsoDate",
        }
    }

    pub fn arity(&self) -> usize {
        2
    }
}

/// Bindings visible to an expression while resolving one row.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionContext<'a> {
    values: &'a Row,
}

impl<'a> ExpressionContext<'a> {
    pub fn new(values: &'a Row) -> Self {
        Self { values }
    }

    /// Value bound to `name`, empty when the row has no such column.
    pub fn value(&self, name: &str) -> &'a str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }

    /// Invoke a built-in. Arity is checked when the expression is compiled.
    pub fn call(&self, function: Builtin, args: &[ExprValue]) -> ExpressionResult<ExprValue> {
        let date = args.first().map(ExprValue::as_text).unwrap_or_default();
        let format = args.get(1).map(ExprValue::as_text).unwrap_or_default();

        if date.is_empty() {
            return Ok(ExprValue::Text(String::new()));
        }

        match function {
            Builtin::ToEpoche => dates::to_epoch(&date, &format).map(ExprValue::Integer),
            Builtin::ToIsoDate => dates::to_iso_date(&date, &format).map(ExprValue::Text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_missing_binding_is_empty() {
        let values = row(&[("A", "x")]);
        let ctx = ExpressionContext::new(&values);
        assert_eq!(ctx.value("A"), "x");
        assert_eq!(ctx.value("B"), "");
    }

    #[test]
    fn test_empty_date_yields_empty() {
        let values = Row::new();
        let ctx = ExpressionContext::new(&values);
        let args = [ExprValue::Text(String::new()), ExprValue::Text("DD.MM.YYYY".into())];
        assert_eq!(
            ctx.call(Builtin::ToEpoche, &args).unwrap(),
            ExprValue::Text(String::new())
        );
        assert_eq!(
            ctx.call(Builtin::ToIsoDate, &args).unwrap(),
            ExprValue::Text(String::new())
        );
    }

    #[test]
    fn test_to_epoche_is_integer() {
        let values = Row::new();
        let ctx = ExpressionContext::new(&values);
        let args = [ExprValue::Text("02.01.1970".into()), ExprValue::Text("DD.MM.YYYY".into())];
        assert_eq!(ctx.call(Builtin::ToEpoche, &args).unwrap(), ExprValue::Integer(86400));
    }

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(Builtin::lookup("toIsoDate"), Some(Builtin::ToIsoDate));
        assert_eq!(Builtin::lookup("eval"), None);
    }
}
