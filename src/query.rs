// Copyright (c) 2024 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::collections::HashMap;

use canonical_error::{invalid_argument_error, CanonicalError};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::scan_engine::ObjectRow;

// One term of a filter expression: `<column> <operator> <value>` with an
// optional trailing connective. Column/operator/value syntax is matched by
// CONDITION_REGEX; text between matches is ignored.
static CONDITION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)([a-zA-Z_][\w\s]*)\s*(>=|<=|!=|>|<|=|like)\s*('[^']*'|"[^"]*"|[\w.]+)\s*(AND|OR|\+|\|)?"#,
    )
    .unwrap()
});

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
    Like,
}

impl CompareOp {
    fn from_token(token: &str) -> Self {
        match token.to_lowercase().as_str() {
            ">" => CompareOp::Gt,
            ">=" => CompareOp::Ge,
            "<" => CompareOp::Lt,
            "<=" => CompareOp::Le,
            "=" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            "like" => CompareOp::Like,
            // CONDITION_REGEX only yields the tokens above.
            _ => unreachable!(),
        }
    }
}

// Logical connective trailing a condition. Parsed and retained, but not
// evaluated: all conditions are implicitly ANDed. See evaluate_conditions().
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

impl Connective {
    fn from_token(token: &str) -> Self {
        match token.to_lowercase().as_str() {
            "and" | "+" => Connective::And,
            "or" | "|" => Connective::Or,
            _ => unreachable!(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    // Canonical column name, as found in the valid-columns map.
    pub column: String,
    pub op: CompareOp,
    // Literal with surrounding quotes stripped.
    pub value: String,
    pub connective: Option<Connective>,
}

/// Parses a free-text filter expression into an ordered list of conditions.
/// `valid_columns` maps lowercased column names to their canonical forms;
/// a parsed column absent from the map fails the whole parse. Text that
/// does not match the condition grammar is skipped, not rejected.
pub fn parse_query_conditions(query: &str,
                              valid_columns: &HashMap<String, String>)
                              -> Result<Vec<Condition>, CanonicalError> {
    let mut conditions = Vec::<Condition>::new();
    for caps in CONDITION_REGEX.captures_iter(query) {
        let column = caps[1].trim().to_lowercase();
        let Some(canonical) = valid_columns.get(&column) else {
            return Err(invalid_argument_error(
                &format!("Invalid column: {}", column)));
        };
        conditions.push(Condition {
            column: canonical.clone(),
            op: CompareOp::from_token(&caps[2]),
            value: caps[3]
                .trim_matches(|c| c == '\'' || c == '"')
                .to_string(),
            connective: caps.get(4).map(|m| Connective::from_token(m.as_str())),
        });
    }
    Ok(conditions)
}

/// Decides whether `row` satisfies all of `conditions`, in order, short
/// circuiting on the first failure. An empty condition list admits every
/// row.
///
/// Comparisons are dual-mode: when both the row value (after stripping a
/// trailing degree glyph) and the condition literal parse as floats, the
/// comparison is numeric; otherwise both sides are compared as lowercased
/// strings. `like` is a case-normalized substring test and fails whenever
/// the comparison resolves to numeric mode.
pub fn evaluate_conditions(row: &ObjectRow, conditions: &[Condition]) -> bool {
    for condition in conditions {
        let Some(raw) = row.value(&condition.column) else {
            return false;
        };
        let row_value = raw.trim_end_matches('°');

        let passed = match (row_value.parse::<f64>(),
                            condition.value.parse::<f64>()) {
            (Ok(row_num), Ok(cond_num)) => match condition.op {
                CompareOp::Gt => row_num > cond_num,
                CompareOp::Ge => row_num >= cond_num,
                CompareOp::Lt => row_num < cond_num,
                CompareOp::Le => row_num <= cond_num,
                CompareOp::Eq => row_num == cond_num,
                CompareOp::Ne => row_num != cond_num,
                // `like` is only meaningful on strings.
                CompareOp::Like => false,
            },
            _ => {
                let row_str = row_value.to_lowercase();
                let cond_str = condition.value.to_lowercase();
                match condition.op {
                    CompareOp::Gt => row_str > cond_str,
                    CompareOp::Ge => row_str >= cond_str,
                    CompareOp::Lt => row_str < cond_str,
                    CompareOp::Le => row_str <= cond_str,
                    CompareOp::Eq => row_str == cond_str,
                    CompareOp::Ne => row_str != cond_str,
                    CompareOp::Like => row_str.contains(&cond_str),
                }
            },
        };
        if !passed {
            return false;
        }
    }
    true
}

// mod tests.
