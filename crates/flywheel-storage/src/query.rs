// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Compiles selector requirements into backend query conditions.
//!
//! Each requirement is resolved against the model's field catalog, its
//! string literals are coerced to the column's kind, and the operator
//! is mapped to a SQL comparison. The compiler performs no I/O; the
//! resulting conjunction is rendered into a parameterized WHERE clause
//! by [`append_where`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Postgres, QueryBuilder};

use crate::catalog::{ColumnDef, ColumnKind, FieldCatalog, FieldValue};
use crate::error::StorageError;
use crate::selector::{Operator, Requirement};

/// Pluggable parser turning selector time literals into timestamps.
///
/// The host decides the accepted format; the error string is reported
/// back inside [`StorageError::InvalidValue`].
pub type ParseToTime = Arc<dyn Fn(&str) -> Result<DateTime<Utc>, String> + Send + Sync>;

/// A compiled comparison, ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// The column the comparison addresses.
    pub column: &'static str,
    /// The SQL comparison.
    pub op: CompareOp,
    /// Coerced operand values; empty for the null tests.
    pub values: Vec<FieldValue>,
}

/// The SQL comparison operators conditions render to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `IN (…)`
    In,
    /// `NOT IN (…)`
    NotIn,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `IS NOT NULL`
    IsNotNull,
    /// `IS NULL`
    IsNull,
}

/// Requirement + catalog -> typed condition compiler.
#[derive(Clone)]
pub struct QueryCompiler {
    catalog: FieldCatalog,
    parse_to_time: Option<ParseToTime>,
}

impl QueryCompiler {
    /// Create a compiler over the given catalog.
    pub fn new(catalog: FieldCatalog, parse_to_time: Option<ParseToTime>) -> Self {
        Self {
            catalog,
            parse_to_time,
        }
    }

    /// Compile a requirement conjunction into conditions.
    pub fn compile(&self, requirements: &[Requirement]) -> Result<Vec<Condition>, StorageError> {
        requirements.iter().map(|r| self.compile_one(r)).collect()
    }

    fn compile_one(&self, requirement: &Requirement) -> Result<Condition, StorageError> {
        let column = self.catalog.get(requirement.key())?;
        let operator = requirement.operator();

        match operator {
            Operator::Exists => {
                return Ok(Condition {
                    column: column.name,
                    op: CompareOp::IsNotNull,
                    values: Vec::new(),
                });
            }
            Operator::DoesNotExist => {
                return Ok(Condition {
                    column: column.name,
                    op: CompareOp::IsNull,
                    values: Vec::new(),
                });
            }
            _ => {}
        }

        // Bool columns take only a plain equality check.
        if column.kind == ColumnKind::Bool && operator != Operator::Equals {
            return Err(unsupported(operator, &column));
        }

        match operator {
            Operator::Equals
            | Operator::DoubleEquals
            | Operator::NotEquals
            | Operator::GreaterThan
            | Operator::LessThan => {
                let raw = requirement
                    .pop_any()
                    .ok_or_else(|| StorageError::BadValueCount {
                        operator: operator.as_str().to_string(),
                        expected: "exactly one value",
                    })?;
                let value = self.coerce(&column, raw)?;
                let op = match operator {
                    Operator::NotEquals => CompareOp::Ne,
                    Operator::GreaterThan => CompareOp::Gt,
                    Operator::LessThan => CompareOp::Lt,
                    _ => CompareOp::Eq,
                };
                Ok(Condition {
                    column: column.name,
                    op,
                    values: vec![value],
                })
            }
            Operator::In | Operator::NotIn => {
                let raw_values = requirement.list();
                if raw_values.is_empty() {
                    return Err(StorageError::BadValueCount {
                        operator: operator.as_str().to_string(),
                        expected: "at least one value",
                    });
                }
                let values = raw_values
                    .iter()
                    .map(|raw| self.coerce(&column, raw))
                    .collect::<Result<Vec<_>, _>>()?;
                let op = if operator == Operator::In {
                    CompareOp::In
                } else {
                    CompareOp::NotIn
                };
                Ok(Condition {
                    column: column.name,
                    op,
                    values,
                })
            }
            Operator::Exists | Operator::DoesNotExist => unreachable!("handled above"),
        }
    }

    fn coerce(&self, column: &ColumnDef, raw: &str) -> Result<FieldValue, StorageError> {
        let invalid = |reason: String| StorageError::InvalidValue {
            column: column.name.to_string(),
            value: raw.to_string(),
            reason,
        };
        match column.kind {
            ColumnKind::Text => Ok(FieldValue::Text(raw.to_string())),
            ColumnKind::SmallInt => raw
                .parse::<i16>()
                .map(|v| FieldValue::Int(i64::from(v)))
                .map_err(|e| invalid(e.to_string())),
            ColumnKind::Int => raw
                .parse::<i32>()
                .map(|v| FieldValue::Int(i64::from(v)))
                .map_err(|e| invalid(e.to_string())),
            ColumnKind::BigInt => raw
                .parse::<i64>()
                .map(FieldValue::Int)
                .map_err(|e| invalid(e.to_string())),
            ColumnKind::Float => raw
                .parse::<f32>()
                .map(|v| FieldValue::Float(f64::from(v)))
                .map_err(|e| invalid(e.to_string())),
            ColumnKind::Double => raw
                .parse::<f64>()
                .map(FieldValue::Float)
                .map_err(|e| invalid(e.to_string())),
            ColumnKind::Bool => {
                if raw.eq_ignore_ascii_case("true") {
                    Ok(FieldValue::Bool(true))
                } else if raw.eq_ignore_ascii_case("false") {
                    Ok(FieldValue::Bool(false))
                } else {
                    Err(invalid("expected 'true' or 'false'".to_string()))
                }
            }
            ColumnKind::Timestamp => {
                let parse = self
                    .parse_to_time
                    .as_ref()
                    .ok_or_else(|| invalid("no time parser configured".to_string()))?;
                parse(raw).map(FieldValue::Timestamp).map_err(invalid)
            }
        }
    }
}

fn unsupported(operator: Operator, column: &ColumnDef) -> StorageError {
    StorageError::UnsupportedOperator {
        operator: operator.as_str().to_string(),
        column: column.name.to_string(),
        kind: column.kind.as_str().to_string(),
    }
}

/// Append one condition to a query under construction.
pub fn push_condition(builder: &mut QueryBuilder<'_, Postgres>, condition: &Condition) {
    builder.push(condition.column);
    match condition.op {
        CompareOp::IsNotNull => {
            builder.push(" IS NOT NULL");
        }
        CompareOp::IsNull => {
            builder.push(" IS NULL");
        }
        CompareOp::In | CompareOp::NotIn => {
            builder.push(if condition.op == CompareOp::In {
                " IN ("
            } else {
                " NOT IN ("
            });
            for (i, value) in condition.values.iter().enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                push_bind_value(builder, value);
            }
            builder.push(")");
        }
        CompareOp::Eq | CompareOp::Ne | CompareOp::Gt | CompareOp::Lt => {
            builder.push(match condition.op {
                CompareOp::Eq => " = ",
                CompareOp::Ne => " <> ",
                CompareOp::Gt => " > ",
                _ => " < ",
            });
            push_bind_value(builder, &condition.values[0]);
        }
    }
}

/// Append a `WHERE` conjunction for the compiled conditions, if any.
pub fn append_where(builder: &mut QueryBuilder<'_, Postgres>, conditions: &[Condition]) {
    for (i, condition) in conditions.iter().enumerate() {
        builder.push(if i == 0 { " WHERE " } else { " AND " });
        push_condition(builder, condition);
    }
}

/// Bind one typed scalar.
pub fn push_bind_value(builder: &mut QueryBuilder<'_, Postgres>, value: &FieldValue) {
    match value {
        FieldValue::Text(v) => {
            builder.push_bind(v.clone());
        }
        FieldValue::Int(v) => {
            builder.push_bind(*v);
        }
        FieldValue::Float(v) => {
            builder.push_bind(*v);
        }
        FieldValue::Bool(v) => {
            builder.push_bind(*v);
        }
        FieldValue::Timestamp(v) => {
            builder.push_bind(*v);
        }
        FieldValue::Null => {
            builder.push("NULL");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::parse;

    static COLUMNS: &[ColumnDef] = &[
        ColumnDef::new("name", ColumnKind::Text),
        ColumnDef::new("replicas", ColumnKind::Int),
        ColumnDef::new("weight", ColumnKind::SmallInt),
        ColumnDef::new("score", ColumnKind::Double),
        ColumnDef::new("ready", ColumnKind::Bool),
        ColumnDef::new("created_at", ColumnKind::Timestamp),
    ];

    fn compiler() -> QueryCompiler {
        QueryCompiler::new(
            FieldCatalog::from_columns(COLUMNS),
            Some(Arc::new(|raw: &str| {
                raw.parse::<DateTime<Utc>>().map_err(|e| e.to_string())
            })),
        )
    }

    fn compile(selector: &str) -> Result<Vec<Condition>, StorageError> {
        compiler().compile(&parse(selector).unwrap())
    }

    #[test]
    fn test_compile_conjunction() {
        let conditions = compile("name=web,replicas>3").unwrap();
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].op, CompareOp::Eq);
        assert_eq!(conditions[0].values, vec![FieldValue::Text("web".into())]);
        assert_eq!(conditions[1].op, CompareOp::Gt);
        assert_eq!(conditions[1].values, vec![FieldValue::Int(3)]);
    }

    #[test]
    fn test_int_coercion_respects_width() {
        assert!(compile("replicas=2147483648").is_err());
        assert!(compile("weight=40000").is_err());
        assert!(compile("weight=123").is_ok());
    }

    #[test]
    fn test_float_coercion() {
        let conditions = compile("score<1.5").unwrap();
        assert_eq!(conditions[0].op, CompareOp::Lt);
        assert!(matches!(conditions[0].values[0], FieldValue::Float(v) if v == 1.5));
    }

    #[test]
    fn test_bool_accepts_only_equality() {
        assert!(compile("ready=true").is_ok());
        assert!(compile("ready=TRUE").is_ok());
        assert!(compile("ready=yes").is_err());
        let err = compile("ready>true").unwrap_err();
        assert!(
            matches!(err, StorageError::UnsupportedOperator { ref kind, .. } if kind == "bool"),
            "got {err}"
        );
        assert!(compile("ready!=true").is_err());
        assert!(compile("ready in (true,false)").is_err());
    }

    #[test]
    fn test_in_rejects_empty_set() {
        let err = compile("name in ()").unwrap_err();
        assert!(matches!(err, StorageError::BadValueCount { .. }));
    }

    #[test]
    fn test_unknown_field() {
        let err = compile("missing=1").unwrap_err();
        assert!(matches!(err, StorageError::FieldNotFound { field } if field == "missing"));
    }

    #[test]
    fn test_exists_compiles_to_null_tests() {
        let conditions = compile("name,!score").unwrap();
        assert_eq!(conditions[0].op, CompareOp::IsNotNull);
        assert!(conditions[0].values.is_empty());
        assert_eq!(conditions[1].op, CompareOp::IsNull);
    }

    #[test]
    fn test_time_coercion_uses_injected_parser() {
        assert!(compile("created_at>2024-01-01T00:00:00Z").is_ok());
        assert!(compile("created_at>not-a-time").is_err());

        let no_parser = QueryCompiler::new(FieldCatalog::from_columns(COLUMNS), None);
        let reqs = parse("created_at>2024-01-01T00:00:00Z").unwrap();
        assert!(no_parser.compile(&reqs).is_err());
    }

    #[test]
    fn test_where_clause_rendering() {
        let conditions = compile("name in (web,api),replicas>3,!score").unwrap();
        let mut builder = QueryBuilder::new("SELECT * FROM apps");
        append_where(&mut builder, &conditions);
        assert_eq!(
            builder.sql(),
            "SELECT * FROM apps WHERE name IN ($1, $2) AND replicas > $3 AND score IS NULL"
        );
    }
}
