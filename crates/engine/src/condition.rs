//! Condition evaluation for `if_else` nodes.
//!
//! Conditions are folded strictly left to right: `a OR b AND c` is
//! `(a OR b) AND c`. The first branch that evaluates true wins; when none
//! does, the implicit `none` branch is taken.

use serde_json::Value;

use nodes::{RecordSnapshot, Temperature};

use crate::models::{
    Combinator, Condition, ConditionBranch, ConditionField, Operator, ASSIGNED_TO_ANYONE,
    NONE_BRANCH,
};
use crate::EngineError;

/// Save-time check that `condition`'s operator is supported for its field
/// and that it carries a usable value where one is needed.
pub fn check_condition(condition: &Condition) -> Result<(), EngineError> {
    use ConditionField as F;
    use Operator as Op;

    let supported = match condition.field {
        F::HasTag | F::HasMotivation => true,
        F::Status | F::Temperature | F::IsAssigned => condition.operator != Op::Contains,
        F::IsComplete => matches!(condition.operator, Op::Equals | Op::NotEquals),
    };
    if !supported {
        return Err(EngineError::UnsupportedOperator {
            field: condition.field.as_str().into(),
            operator: condition.operator.as_str().into(),
        });
    }

    if !condition.operator.takes_value() {
        return Ok(());
    }

    let invalid = || EngineError::InvalidConditionValue {
        field: condition.field.as_str().into(),
        value: condition.value.to_string(),
    };

    match condition.field {
        F::IsComplete => as_bool(&condition.value).map(|_| ()).ok_or_else(invalid),
        F::Temperature => {
            let raw = non_empty_str(&condition.value).ok_or_else(|| missing(condition))?;
            raw.parse::<Temperature>().map(|_| ()).map_err(|_| invalid())
        }
        _ => non_empty_str(&condition.value).map(|_| ()).ok_or_else(|| missing(condition)),
    }
}

fn missing(condition: &Condition) -> EngineError {
    EngineError::MissingConditionValue {
        field: condition.field.as_str().into(),
        operator: condition.operator.as_str().into(),
    }
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty())
}

/// Booleans arrive either as JSON booleans or as `"true"` / `"false"`.
fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Truth value of a single condition against `record`.
///
/// Conditions are checked at save time; a value that still fails to parse
/// here evaluates to false.
pub fn matches(condition: &Condition, record: &RecordSnapshot) -> bool {
    use ConditionField as F;
    use Operator as Op;

    let value = non_empty_str(&condition.value);

    match condition.field {
        F::Status => scalar(condition.operator, record.status_id.as_deref(), value),

        F::HasTag | F::HasMotivation => {
            let set = if condition.field == F::HasTag {
                &record.tag_ids
            } else {
                &record.motivation_ids
            };
            let has = |id: &str| set.iter().any(|s| s == id);
            match condition.operator {
                Op::Equals | Op::Contains => value.is_some_and(has),
                Op::NotEquals => value.is_some_and(|v| !has(v)),
                Op::IsEmpty => set.is_empty(),
                Op::IsNotEmpty => !set.is_empty(),
            }
        }

        F::Temperature => {
            let expected = value.and_then(|v| v.parse::<Temperature>().ok());
            let actual = record.temperature;
            match condition.operator {
                Op::Equals => expected.is_some() && actual == expected,
                Op::NotEquals => expected.is_some() && actual != expected,
                Op::IsEmpty => actual.is_none(),
                Op::IsNotEmpty => actual.is_some(),
                Op::Contains => false,
            }
        }

        F::IsComplete => match (condition.operator, as_bool(&condition.value)) {
            (Op::Equals, Some(expected)) => record.is_complete == expected,
            (Op::NotEquals, Some(expected)) => record.is_complete != expected,
            _ => false,
        },

        F::IsAssigned => {
            let assignee = record.assigned_user_id.as_deref();
            match (condition.operator, value) {
                (Op::Equals, Some(ASSIGNED_TO_ANYONE)) => assignee.is_some(),
                (Op::NotEquals, Some(ASSIGNED_TO_ANYONE)) => assignee.is_none(),
                (op, value) => scalar(op, assignee, value),
            }
        }
    }
}

/// Equality / presence test on a single optional identifier.
fn scalar(operator: Operator, actual: Option<&str>, expected: Option<&str>) -> bool {
    match operator {
        Operator::Equals => expected.is_some() && actual == expected,
        Operator::NotEquals => expected.is_some() && actual != expected,
        Operator::IsEmpty => actual.is_none(),
        Operator::IsNotEmpty => actual.is_some(),
        Operator::Contains => false,
    }
}

/// Left-to-right fold of a branch's conditions. An empty branch is false.
pub fn evaluate_branch(branch: &ConditionBranch, record: &RecordSnapshot) -> bool {
    let mut conditions = branch.conditions.iter();
    let Some(first) = conditions.next() else {
        return false;
    };

    conditions.fold(matches(first, record), |acc, condition| {
        match condition.combinator {
            Combinator::And => acc && matches(condition, record),
            Combinator::Or => acc || matches(condition, record),
        }
    })
}

/// Id of the first branch that evaluates true, or [`NONE_BRANCH`].
pub fn select_branch<'a>(branches: &'a [ConditionBranch], record: &RecordSnapshot) -> &'a str {
    branches
        .iter()
        .find(|branch| evaluate_branch(branch, record))
        .map(|branch| branch.id.as_str())
        .unwrap_or(NONE_BRANCH)
}
