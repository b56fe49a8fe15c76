//! Filter, update and sort evaluation for the in-memory store
//!
//! Covers the subset of MongoDB query semantics the gateway's clients use:
//! equality (dotted paths, array membership), comparison operators, `$in`,
//! `$nin`, `$exists` and the `$and`/`$or`/`$nor` combinators. Updates support
//! `$set`, `$inc`, `$unset` and `$setOnInsert`.

use bson::{Bson, Document};
use std::cmp::Ordering;

use crate::db::schemas::as_f64;
use crate::types::{GatewayError, Result};

fn unsupported(op: &str) -> GatewayError {
    GatewayError::Validation(format!("Unsupported operator: {}", op))
}

/// Resolve a dotted path inside a document
pub fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = document.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Ordering between two values of comparable types
pub fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Equality with numbers compared by value across BSON numeric types
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    match compare(a, b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

fn equals_condition(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        None => matches!(expected, Bson::Null),
        Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(v) => values_equal(v, expected),
    }
}

fn ordered_condition(value: Option<&Bson>, bound: &Bson, accept: fn(Ordering) -> bool) -> bool {
    match value {
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| compare(item, bound).map_or(false, accept)),
        Some(v) => compare(v, bound).map_or(false, accept),
        None => false,
    }
}

fn is_operator_document(document: &Document) -> bool {
    document.keys().next().map_or(false, |k| k.starts_with('$'))
}

fn as_array<'a>(op: &str, arg: &'a Bson) -> Result<&'a Vec<Bson>> {
    match arg {
        Bson::Array(items) => Ok(items),
        _ => Err(GatewayError::Validation(format!("{} needs an array", op))),
    }
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> Result<bool> {
    let ops = match condition {
        Bson::Document(ops) if is_operator_document(ops) => ops,
        _ => return Ok(equals_condition(value, condition)),
    };

    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => equals_condition(value, arg),
            "$ne" => !equals_condition(value, arg),
            "$gt" => ordered_condition(value, arg, |o| o == Ordering::Greater),
            "$gte" => ordered_condition(value, arg, |o| o != Ordering::Less),
            "$lt" => ordered_condition(value, arg, |o| o == Ordering::Less),
            "$lte" => ordered_condition(value, arg, |o| o != Ordering::Greater),
            "$in" => as_array(op, arg)?
                .iter()
                .any(|candidate| equals_condition(value, candidate)),
            "$nin" => !as_array(op, arg)?
                .iter()
                .any(|candidate| equals_condition(value, candidate)),
            "$exists" => {
                let wanted = match arg {
                    Bson::Boolean(b) => *b,
                    other => as_f64(other).map_or(true, |n| n != 0.0),
                };
                wanted == value.is_some()
            }
            other => return Err(unsupported(other)),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn clauses<'a>(op: &str, arg: &'a Bson) -> Result<Vec<&'a Document>> {
    as_array(op, arg)?
        .iter()
        .map(|clause| match clause {
            Bson::Document(d) => Ok(d),
            _ => Err(GatewayError::Validation(format!("{} clauses must be documents", op))),
        })
        .collect()
}

/// Whether `document` satisfies `filter`; an empty filter matches everything
pub fn matches(document: &Document, filter: &Document) -> Result<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(document, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches(document, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for clause in clauses(key, condition)? {
                    if matches(document, clause)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            op if op.starts_with('$') => return Err(unsupported(op)),
            path => field_matches(lookup(document, path), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn set_path(document: &mut Document, path: &str, value: Bson) -> Result<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            let child = document
                .entry(head.to_string())
                .or_insert_with(|| Bson::Document(Document::new()));
            match child {
                Bson::Document(inner) => set_path(inner, rest, value),
                _ => Err(GatewayError::Validation(format!(
                    "Cannot create field '{}' inside non-document '{}'",
                    rest, head
                ))),
            }
        }
    }
}

fn unset_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                unset_path(inner, rest);
            }
        }
    }
}

fn add_numbers(current: Option<&Bson>, delta: &Bson, path: &str) -> Result<Bson> {
    let not_numeric = || GatewayError::Validation(format!("Cannot apply $inc to '{}'", path));
    let current = current.unwrap_or(&Bson::Int32(0));
    match (current, delta) {
        (Bson::Int32(a), Bson::Int32(b)) => Ok(a
            .checked_add(*b)
            .map(Bson::Int32)
            .unwrap_or_else(|| Bson::Int64(i64::from(*a) + i64::from(*b)))),
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            let a = current.as_i64().or_else(|| current.as_i32().map(i64::from));
            let b = delta.as_i64().or_else(|| delta.as_i32().map(i64::from));
            match (a, b) {
                (Some(a), Some(b)) => a.checked_add(b).map(Bson::Int64).ok_or_else(not_numeric),
                _ => Err(not_numeric()),
            }
        }
        _ => {
            let a = as_f64(current).ok_or_else(not_numeric)?;
            let b = as_f64(delta).ok_or_else(not_numeric)?;
            Ok(Bson::Double(a + b))
        }
    }
}

fn operator_fields<'a>(op: &str, arg: &'a Bson) -> Result<&'a Document> {
    match arg {
        Bson::Document(fields) => Ok(fields),
        _ => Err(GatewayError::Validation(format!("{} needs a document", op))),
    }
}

/// Apply an operator update in place; returns whether the document changed.
///
/// `inserting` enables `$setOnInsert`.
pub fn apply_update(document: &mut Document, update: &Document, inserting: bool) -> Result<bool> {
    if update.is_empty() || !is_operator_document(update) {
        return Err(GatewayError::Validation(
            "Update document must use update operators".to_string(),
        ));
    }

    let before = document.clone();
    for (op, arg) in update {
        let fields = operator_fields(op, arg)?;
        match op.as_str() {
            "$set" => {
                for (path, value) in fields {
                    set_path(document, path, value.clone())?;
                }
            }
            "$setOnInsert" => {
                if inserting {
                    for (path, value) in fields {
                        set_path(document, path, value.clone())?;
                    }
                }
            }
            "$unset" => {
                for path in fields.keys() {
                    unset_path(document, path);
                }
            }
            "$inc" => {
                for (path, delta) in fields {
                    let next = add_numbers(lookup(document, path), delta, path)?;
                    set_path(document, path, next)?;
                }
            }
            other => return Err(unsupported(other)),
        }
    }
    Ok(*document != before)
}

/// Seed document for an upsert: the filter's equality conditions
pub fn upsert_seed(filter: &Document) -> Result<Document> {
    let mut seed = Document::new();
    for (key, condition) in filter {
        if key.starts_with('$') {
            continue;
        }
        match condition {
            Bson::Document(ops) if is_operator_document(ops) => {
                if let Some(value) = ops.get("$eq") {
                    set_path(&mut seed, key, value.clone())?;
                }
            }
            value => set_path(&mut seed, key, value.clone())?,
        }
    }
    Ok(seed)
}

fn type_rank(value: Option<&Bson>) -> u8 {
    match value {
        None | Some(Bson::Null) => 0,
        Some(v) if as_f64(v).is_some() => 1,
        Some(Bson::String(_)) => 2,
        Some(Bson::Document(_)) => 3,
        Some(Bson::Array(_)) => 4,
        Some(Bson::ObjectId(_)) => 5,
        Some(Bson::Boolean(_)) => 6,
        Some(Bson::DateTime(_)) => 7,
        Some(_) => 8,
    }
}

/// Stable sort by a `{field: 1 | -1, ...}` specification
pub fn sort_documents(documents: &mut [Document], sort: &Document) {
    let keys: Vec<(String, bool)> = sort
        .iter()
        .map(|(k, dir)| (k.clone(), as_f64(dir).map_or(false, |d| d < 0.0)))
        .collect();

    documents.sort_by(|a, b| {
        for (path, descending) in &keys {
            let (x, y) = (lookup(a, path), lookup(b, path));
            let ordering = type_rank(x).cmp(&type_rank(y)).then_with(|| match (x, y) {
                (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            });
            let ordering = if *descending { ordering.reverse() } else { ordering };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}
