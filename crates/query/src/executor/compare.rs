//! Comparison, membership and boolean-junction semantics.
//!
//! UNDEFINED is contagious: any comparison with an UNDEFINED operand is
//! UNDEFINED, except `<>` which yields true. A null operand only supports
//! equality; ordering it against anything is false.

use crate::ast::{ComparisonOp, JunctionOp};
use crate::error::{QueryError, Result};
use core::cmp::Ordering;
use tessera_core::{ObjectType, Value};

/// Equality with numeric widening (`1 = 1L = 1.0`).
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    if a.is_numeric() && b.is_numeric() {
        a.compare_widening(b) == Ordering::Equal
    } else {
        a == b
    }
}

/// Evaluates `left op right`.
pub(crate) fn compare(op: ComparisonOp, left: &Value, right: &Value) -> Result<Value> {
    if left.is_undefined() || right.is_undefined() {
        return Ok(if op == ComparisonOp::Ne {
            Value::Boolean(true)
        } else {
            Value::Undefined
        });
    }
    if left.is_null() || right.is_null() {
        let both = left.is_null() && right.is_null();
        return Ok(Value::Boolean(match op {
            ComparisonOp::Eq => both,
            ComparisonOp::Ne => !both,
            _ => false,
        }));
    }
    if !op.is_ordering() {
        let equal = left.is_comparable_with(right) && values_equal(left, right);
        return Ok(Value::Boolean(equal == (op == ComparisonOp::Eq)));
    }
    if !left.is_comparable_with(right) || !left.is_orderable() {
        return Err(QueryError::type_mismatch(
            format!("a value comparable with {}", left.data_type()),
            right.data_type(),
        ));
    }
    let ord = left.compare_widening(right);
    Ok(Value::Boolean(match op {
        ComparisonOp::Lt => ord == Ordering::Less,
        ComparisonOp::Le => ord != Ordering::Greater,
        ComparisonOp::Gt => ord == Ordering::Greater,
        ComparisonOp::Ge => ord != Ordering::Less,
        ComparisonOp::Eq | ComparisonOp::Ne => unreachable!("handled above"),
    }))
}

/// Tri-state truth value of a junction operand.
pub(crate) fn truth(value: &Value) -> Result<Option<bool>> {
    match value {
        Value::Boolean(b) => Ok(Some(*b)),
        Value::Undefined | Value::Null => Ok(None),
        other => Err(QueryError::type_mismatch("Boolean", other.data_type())),
    }
}

/// Folds one more operand into a junction. Returns `Some` once the result is
/// decided (false for AND, true for OR).
pub(crate) fn junction_step(op: JunctionOp, acc: &mut Option<bool>, next: Option<bool>) -> Option<bool> {
    let decisive = op == JunctionOp::Or;
    match next {
        Some(b) if b == decisive => {
            *acc = Some(decisive);
            Some(decisive)
        }
        Some(_) => None,
        None => {
            *acc = None;
            None
        }
    }
}

/// `element IN collection`.
pub(crate) fn contains(element: &Value, collection: &Value) -> Result<Value> {
    if element.is_undefined() || collection.is_undefined() || collection.is_null() {
        return Ok(Value::Undefined);
    }
    let found = match collection {
        Value::Collection(items) => items.iter().any(|item| values_equal(item, element)),
        Value::Region(region) => region
            .values()
            .map_err(QueryError::from_storage)?
            .iter()
            .any(|item| values_equal(item, element)),
        Value::Struct(s) => s.values().iter().any(|item| values_equal(item, element)),
        other => return Err(QueryError::type_mismatch("Collection", other.data_type())),
    };
    Ok(Value::Boolean(found))
}

/// Interprets a WHERE result: true keeps the row, UNDEFINED and null drop it.
pub(crate) fn accepts(value: &Value) -> Result<bool> {
    match value {
        Value::Boolean(b) => Ok(*b),
        Value::Undefined | Value::Null => Ok(false),
        other => Err(QueryError::TypeMismatch {
            expected: ObjectType::Boolean.to_string(),
            got: other.data_type(),
        }),
    }
}
