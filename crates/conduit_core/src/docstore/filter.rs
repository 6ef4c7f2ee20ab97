//! Document filters, sort and paging options.

use serde_json::Value;
use std::cmp::Ordering;

/// Conjunction of field predicates. An empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<Clause>,
}

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Eq { field: String, value: Value },
    In { field: String, values: Vec<Value> },
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Field equals `value`.
    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause::Eq {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    /// Field is one of `values`. An empty set matches nothing.
    pub fn any_of<I, V>(mut self, field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.clauses.push(Clause::In {
            field: field.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Eq { field, value } => lookup(doc, field) == Some(value),
            Clause::In { field, values } => {
                lookup(doc, field).is_some_and(|found| values.contains(found))
            }
        })
    }
}

/// Resolves a dotted field path inside a document.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, part| current.get(part))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Sort keys are applied in order; later keys break ties of earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    sort: Vec<(String, SortOrder)>,
    skip: usize,
    limit: Option<usize>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, field: &str, order: SortOrder) -> Self {
        self.sort.push((field.to_string(), order));
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn apply(&self, mut docs: Vec<Value>) -> Vec<Value> {
        if !self.sort.is_empty() {
            docs.sort_by(|left, right| {
                for (field, order) in &self.sort {
                    let ordering = compare_values(
                        lookup(left, field).unwrap_or(&Value::Null),
                        lookup(right, field).unwrap_or(&Value::Null),
                    );
                    let ordering = match order {
                        SortOrder::Asc => ordering,
                        SortOrder::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }
        let iter = docs.into_iter().skip(self.skip);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

/// Total order over JSON values: null < bool < number < string < array < object.
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => a
                .as_f64()
                .unwrap_or(f64::NAN)
                .partial_cmp(&b.as_f64().unwrap_or(f64::NAN))
                .unwrap_or(Ordering::Equal),
        },
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                let ordering = compare_values(x, y);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.len().cmp(&b.len())
        }
        (Value::Object(_), Value::Object(_)) => Ordering::Equal,
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::{compare_values, Filter, FindOptions, SortOrder};
    use serde_json::json;
    use std::cmp::Ordering;

    #[test]
    fn filter_combines_clauses_conjunctively() {
        let doc = json!({"name": "go", "meta": {"lang": "en"}, "count": 3});
        assert!(Filter::all().matches(&doc));
        assert!(Filter::all().eq("name", "go").eq("meta.lang", "en").matches(&doc));
        assert!(!Filter::all().eq("name", "go").eq("count", 4).matches(&doc));
        assert!(Filter::all().any_of("name", ["rust", "go"]).matches(&doc));
    }

    #[test]
    fn empty_membership_matches_nothing() {
        let doc = json!({"name": "go"});
        let none: Vec<String> = Vec::new();
        assert!(!Filter::all().any_of("name", none).matches(&doc));
    }

    #[test]
    fn sort_breaks_ties_with_later_keys_then_pages() {
        let docs = vec![
            json!({"at": 1, "id": "a"}),
            json!({"at": 2, "id": "b"}),
            json!({"at": 2, "id": "c"}),
            json!({"at": 3, "id": "d"}),
        ];
        let options = FindOptions::new()
            .sort("at", SortOrder::Desc)
            .sort("id", SortOrder::Desc)
            .skip(1)
            .limit(2);
        let ids: Vec<_> = options
            .apply(docs)
            .into_iter()
            .map(|doc| doc["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[test]
    fn values_of_different_types_have_a_stable_rank() {
        assert_eq!(compare_values(&json!(null), &json!(1)), Ordering::Less);
        assert_eq!(compare_values(&json!("a"), &json!(10)), Ordering::Greater);
        assert_eq!(compare_values(&json!(2.5), &json!(2)), Ordering::Greater);
    }
}
