// Workflow conditions - recursive boolean tree evaluated against a context
// snapshot. Evaluation is pure: malformed rules resolve to a non-match with
// a diagnostic instead of erroring past this boundary.

use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::context::EvaluationContext;
use crate::models::TaskStatus;

/// Document categories every client file is expected to carry.
pub const REQUIRED_DOCUMENT_CATEGORIES: [&str; 3] = ["ID", "INCOME", "BANK_STATEMENT"];

/// Closed condition tree: composites compose children, rules test the context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    And {
        #[serde(default)]
        children: Vec<Condition>,
    },
    Or {
        #[serde(default)]
        children: Vec<Condition>,
    },
    Rule(ConditionRule),
}

impl Condition {
    pub fn and(children: Vec<Condition>) -> Self {
        Self::And { children }
    }

    pub fn or(children: Vec<Condition>) -> Self {
        Self::Or { children }
    }

    pub fn rule(rule: ConditionRule) -> Self {
        Self::Rule(rule)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionRule {
    pub condition_type: ConditionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    /// Optional filter: document category or task status, depending on type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ConditionRule {
    pub fn new(condition_type: ConditionType) -> Self {
        Self {
            condition_type,
            operator: None,
            value: None,
            field: None,
        }
    }

    pub fn with_operator(mut self, operator: &str) -> Self {
        self.operator = Some(operator.to_string());
        self
    }

    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_field(mut self, field: &str) -> Self {
        self.field = Some(field.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionType {
    ClientStatusEquals,
    ClientHasTag,
    ClientAgeDays,
    ClientMissingDocuments,
    DocumentCount,
    DocumentMissing,
    TaskCount,
    TaskOverdueExists,
    LoanAmountThreshold,
}

impl ConditionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientStatusEquals => "CLIENT_STATUS_EQUALS",
            Self::ClientHasTag => "CLIENT_HAS_TAG",
            Self::ClientAgeDays => "CLIENT_AGE_DAYS",
            Self::ClientMissingDocuments => "CLIENT_MISSING_DOCUMENTS",
            Self::DocumentCount => "DOCUMENT_COUNT",
            Self::DocumentMissing => "DOCUMENT_MISSING",
            Self::TaskCount => "TASK_COUNT",
            Self::TaskOverdueExists => "TASK_OVERDUE_EXISTS",
            Self::LoanAmountThreshold => "LOAN_AMOUNT_THRESHOLD",
        }
    }
}

/// Comparators shared by the count/threshold rules. Both symbolic and word
/// spellings parse to the same operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Lt,
    Eq,
    Gte,
    Lte,
    Ne,
}

impl CompareOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gt" | "greater_than" | ">" => Some(Self::Gt),
            "lt" | "less_than" | "<" => Some(Self::Lt),
            "eq" | "equals" | "==" | "=" => Some(Self::Eq),
            "gte" | "greater_than_or_equals" | ">=" => Some(Self::Gte),
            "lte" | "less_than_or_equals" | "<=" => Some(Self::Lte),
            "ne" | "not_equals" | "!=" => Some(Self::Ne),
            _ => None,
        }
    }

    pub fn compare_f64(&self, left: f64, right: f64) -> bool {
        match self {
            Self::Gt => left > right,
            Self::Lt => left < right,
            Self::Eq => left == right,
            Self::Gte => left >= right,
            Self::Lte => left <= right,
            Self::Ne => left != right,
        }
    }
}

/// Result of evaluating a condition tree or a single rule.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub matched: bool,
    pub detail: String,
}

impl Evaluation {
    fn hit(detail: impl Into<String>) -> Self {
        Self {
            matched: true,
            detail: detail.into(),
        }
    }

    fn miss(detail: impl Into<String>) -> Self {
        Self {
            matched: false,
            detail: detail.into(),
        }
    }
}

/// Evaluate a condition tree against a context snapshot.
///
/// AND over an empty child list is true; OR over an empty child list is
/// false.
pub fn evaluate(condition: &Condition, ctx: &EvaluationContext) -> Evaluation {
    match condition {
        Condition::And { children } => {
            for child in children {
                let result = evaluate(child, ctx);
                if !result.matched {
                    return Evaluation::miss(format!("AND failed: {}", result.detail));
                }
            }
            Evaluation::hit(format!("AND matched ({} children)", children.len()))
        }
        Condition::Or { children } => {
            for child in children {
                let result = evaluate(child, ctx);
                if result.matched {
                    return Evaluation::hit(format!("OR matched: {}", result.detail));
                }
            }
            Evaluation::miss(format!("OR failed ({} children)", children.len()))
        }
        Condition::Rule(rule) => evaluate_rule(rule, ctx),
    }
}

fn evaluate_rule(rule: &ConditionRule, ctx: &EvaluationContext) -> Evaluation {
    match rule.condition_type {
        ConditionType::ClientStatusEquals => {
            let expected = match rule.value.as_ref().and_then(|v| v.as_str()) {
                Some(s) => s,
                None => return Evaluation::miss("CLIENT_STATUS_EQUALS requires a string value"),
            };
            let actual = ctx.client.status.as_str();
            if actual == expected {
                Evaluation::hit(format!("client status is {}", actual))
            } else {
                Evaluation::miss(format!("client status is {}, expected {}", actual, expected))
            }
        }

        ConditionType::ClientHasTag => {
            let tag = match rule.value.as_ref().and_then(|v| v.as_str()) {
                Some(s) => s,
                None => return Evaluation::miss("CLIENT_HAS_TAG requires a string value"),
            };
            if ctx.client.has_tag(tag) {
                Evaluation::hit(format!("client has tag '{}'", tag))
            } else {
                Evaluation::miss(format!("client lacks tag '{}'", tag))
            }
        }

        ConditionType::ClientAgeDays => {
            let (op, threshold) = match rule_comparator(rule) {
                Ok(pair) => pair,
                Err(detail) => return Evaluation::miss(detail),
            };
            let age_days = (ctx.now - ctx.client.created_at).num_days() as f64;
            if op.compare_f64(age_days, threshold) {
                Evaluation::hit(format!("client age {} days", age_days))
            } else {
                Evaluation::miss(format!(
                    "client age {} days did not satisfy comparison with {}",
                    age_days, threshold
                ))
            }
        }

        ConditionType::ClientMissingDocuments => {
            for category in REQUIRED_DOCUMENT_CATEGORIES {
                let supplied = ctx
                    .documents
                    .iter()
                    .any(|d| d.category == category && d.status.is_supplied());
                if !supplied {
                    return Evaluation::hit(format!("required category {} is absent", category));
                }
            }
            Evaluation::miss("all required document categories are present")
        }

        ConditionType::DocumentCount => {
            let (op, threshold) = match rule_comparator(rule) {
                Ok(pair) => pair,
                Err(detail) => return Evaluation::miss(detail),
            };
            let count = ctx
                .documents
                .iter()
                .filter(|d| match rule.field.as_deref() {
                    Some(category) => d.category == category,
                    None => true,
                })
                .count() as f64;
            if op.compare_f64(count, threshold) {
                Evaluation::hit(format!("document count {}", count))
            } else {
                Evaluation::miss(format!(
                    "document count {} did not satisfy comparison with {}",
                    count, threshold
                ))
            }
        }

        ConditionType::DocumentMissing => {
            let outstanding = ctx
                .documents
                .iter()
                .filter(|d| {
                    d.status.is_outstanding()
                        && match rule.field.as_deref() {
                            Some(category) => d.category == category,
                            None => true,
                        }
                })
                .count();
            if outstanding > 0 {
                Evaluation::hit(format!("{} outstanding documents", outstanding))
            } else {
                Evaluation::miss("no outstanding documents")
            }
        }

        ConditionType::TaskCount => {
            let (op, threshold) = match rule_comparator(rule) {
                Ok(pair) => pair,
                Err(detail) => return Evaluation::miss(detail),
            };
            let status_filter: Option<TaskStatus> = match rule.field.as_deref() {
                Some(s) => match s.parse() {
                    Ok(status) => Some(status),
                    Err(e) => return Evaluation::miss(e),
                },
                None => None,
            };
            let count = ctx
                .tasks
                .iter()
                .filter(|t| status_filter.map(|s| t.status == s).unwrap_or(true))
                .count() as f64;
            if op.compare_f64(count, threshold) {
                Evaluation::hit(format!("task count {}", count))
            } else {
                Evaluation::miss(format!(
                    "task count {} did not satisfy comparison with {}",
                    count, threshold
                ))
            }
        }

        ConditionType::TaskOverdueExists => {
            let count = ctx.tasks.iter().filter(|t| t.is_overdue(ctx.now)).count() as f64;
            match rule_comparator(rule) {
                Ok((op, threshold)) => {
                    if op.compare_f64(count, threshold) {
                        Evaluation::hit(format!("{} overdue tasks", count))
                    } else {
                        Evaluation::miss(format!(
                            "overdue task count {} did not satisfy comparison with {}",
                            count, threshold
                        ))
                    }
                }
                // Without an operator the rule is existential.
                Err(_) if rule.operator.is_none() && rule.value.is_none() => {
                    if count > 0.0 {
                        Evaluation::hit(format!("{} overdue tasks", count))
                    } else {
                        Evaluation::miss("no overdue tasks")
                    }
                }
                Err(detail) => Evaluation::miss(detail),
            }
        }

        ConditionType::LoanAmountThreshold => {
            let (op, threshold) = match rule_comparator(rule) {
                Ok(pair) => pair,
                Err(detail) => return Evaluation::miss(detail),
            };
            // Existential: any one scenario satisfying the comparison matches.
            for scenario in &ctx.loan_scenarios {
                let amount = scenario.amount.to_f64().unwrap_or(f64::NAN);
                if op.compare_f64(amount, threshold) {
                    return Evaluation::hit(format!(
                        "loan scenario '{}' amount {} satisfied comparison",
                        scenario.name, amount
                    ));
                }
            }
            Evaluation::miss(format!(
                "no loan scenario satisfied comparison with {}",
                threshold
            ))
        }
    }
}

fn rule_comparator(rule: &ConditionRule) -> Result<(CompareOp, f64), String> {
    let op_str = rule
        .operator
        .as_deref()
        .ok_or_else(|| format!("{} requires an operator", rule.condition_type.as_str()))?;
    let op = CompareOp::parse(op_str)
        .ok_or_else(|| format!("unknown operator '{}'", op_str))?;
    let threshold = rule
        .value
        .as_ref()
        .and_then(|v| v.as_f64())
        .ok_or_else(|| format!("{} requires a numeric value", rule.condition_type.as_str()))?;
    Ok((op, threshold))
}
