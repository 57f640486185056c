//! Data quality gate.
//!
//! Every check is a read-only query whose first value is compared with an
//! expectation. All checks run even after one fails, so a single gate
//! reports every violation at once.

use tidemark_types::error::Violation;
use tidemark_warehouse::sql::quote_qualified;
use tidemark_warehouse::{Value, Warehouse, WarehouseError};

/// What a check asserts.
#[derive(Debug, Clone, PartialEq)]
pub enum Assertion {
    /// `table` holds at least one row.
    NonEmpty { table: String },
    /// No row of `table` has `column` set to NULL.
    NotNull { table: String, column: String },
    /// First column of the first row of `sql` equals `expected`.
    Scalar {
        table: Option<String>,
        sql: String,
        expected: Value,
    },
}

/// A named assertion evaluated by [`check`].
#[derive(Debug, Clone, PartialEq)]
pub struct QualityCheck {
    pub name: String,
    pub assertion: Assertion,
}

impl QualityCheck {
    pub fn non_empty(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            assertion: Assertion::NonEmpty {
                table: table.into(),
            },
        }
    }

    pub fn not_null(
        name: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            assertion: Assertion::NotNull {
                table: table.into(),
                column: column.into(),
            },
        }
    }

    pub fn scalar(name: impl Into<String>, sql: impl Into<String>, expected: Value) -> Self {
        Self {
            name: name.into(),
            assertion: Assertion::Scalar {
                table: None,
                sql: sql.into(),
                expected,
            },
        }
    }

    /// Attribute a scalar check to `table` in violation reports.
    #[must_use]
    pub fn on_table(mut self, name: impl Into<String>) -> Self {
        if let Assertion::Scalar { table, .. } = &mut self.assertion {
            *table = Some(name.into());
        }
        self
    }

    #[must_use]
    pub fn table(&self) -> Option<&str> {
        match &self.assertion {
            Assertion::NonEmpty { table } | Assertion::NotNull { table, .. } => Some(table.as_str()),
            Assertion::Scalar { table, .. } => table.as_deref(),
        }
    }

    /// The read query this check issues.
    #[must_use]
    pub fn query(&self) -> String {
        match &self.assertion {
            Assertion::NonEmpty { table } => {
                format!("SELECT COUNT(*) FROM {}", quote_qualified(table))
            }
            Assertion::NotNull { table, column } => format!(
                "SELECT COUNT(*) FROM {} WHERE {} IS NULL",
                quote_qualified(table),
                quote_qualified(column)
            ),
            Assertion::Scalar { sql, .. } => sql.clone(),
        }
    }

    fn expected(&self) -> String {
        match &self.assertion {
            Assertion::NonEmpty { .. } => ">= 1 row".to_string(),
            Assertion::NotNull { .. } => "0".to_string(),
            Assertion::Scalar { expected, .. } => expected.to_string(),
        }
    }

    /// Compare the query's first value with the expectation.
    ///
    /// Returns the observed value rendered for a report when the check
    /// fails, `None` when it passes.
    fn evaluate(&self, first: &Value) -> Option<String> {
        let passed = match &self.assertion {
            Assertion::NonEmpty { .. } => first.as_i64().is_some_and(|n| n >= 1),
            Assertion::NotNull { .. } => first.as_i64() == Some(0),
            Assertion::Scalar { expected, .. } => first.matches(expected),
        };
        if passed {
            None
        } else if matches!(self.assertion, Assertion::NonEmpty { .. }) {
            Some(format!("{first} rows"))
        } else {
            Some(first.to_string())
        }
    }

    fn violation(&self, actual: String) -> Violation {
        Violation {
            check: self.name.clone(),
            table: self.table().map(str::to_string),
            expected: self.expected(),
            actual,
        }
    }
}

/// Aggregate outcome of a gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    Passed { checks: usize },
    Failed { checks: usize, violations: Vec<Violation> },
}

impl CheckResult {
    #[must_use]
    pub fn passed(&self) -> bool {
        matches!(self, Self::Passed { .. })
    }

    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Passed { .. } => &[],
            Self::Failed { violations, .. } => violations,
        }
    }
}

/// Evaluate every check in order using read queries only.
///
/// A check whose query is rejected or returns no rows is itself a violation.
/// [`Warehouse::query`] refuses statements that write, so a check's SQL can
/// never change the tables it inspects.
///
/// # Errors
///
/// Returns the [`WarehouseError`] only when the connection itself is lost;
/// the remaining checks cannot run in that case.
pub fn check(
    warehouse: &mut dyn Warehouse,
    checks: &[QualityCheck],
) -> Result<CheckResult, WarehouseError> {
    let mut violations = Vec::new();

    for quality_check in checks {
        let outcome = match warehouse.query(&quality_check.query()) {
            Ok(rows) => match rows.first().and_then(|row| row.first()) {
                Some(first) => quality_check.evaluate(first),
                None => Some("no rows".to_string()),
            },
            Err(e) if e.is_connection() => return Err(e),
            Err(e) => Some(format!("query failed: {e}")),
        };

        if let Some(actual) = outcome {
            let violation = quality_check.violation(actual);
            tracing::warn!(
                check = %violation.check,
                expected = %violation.expected,
                actual = %violation.actual,
                "Quality check failed"
            );
            violations.push(violation);
        } else {
            tracing::debug!(check = %quality_check.name, "Quality check passed");
        }
    }

    if violations.is_empty() {
        Ok(CheckResult::Passed {
            checks: checks.len(),
        })
    } else {
        Ok(CheckResult::Failed {
            checks: checks.len(),
            violations,
        })
    }
}
