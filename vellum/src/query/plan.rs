use std::collections::HashSet;

use crate::database::Collection;
use crate::error::{DbError, Result};
use crate::schema::types::{FieldType, FieldValue};
use crate::store::Locator;

use super::parse::{Comparison, Projection, SelectQuery, DOCUMENT_COLUMN};

/// One output column of a plan.
#[derive(Debug, Clone)]
pub(crate) enum ProjectedColumn {
    /// The raw encoded document.
    Document,
    /// A scalar leaf field.
    Field(String),
}

/// Executable form of a SELECT: a snapshot of candidate locators in their
/// final iteration order, the predicates still to check per row, and the
/// projection.
pub(crate) struct QueryPlan {
    pub columns: Vec<String>,
    pub projected: Vec<ProjectedColumn>,
    pub candidates: Vec<Locator>,
    pub residuals: Vec<Comparison>,
}

/// Plans a parsed SELECT against one collection.
///
/// Conjuncts covered by an index are answered by index lookups; the lookup
/// with the fewest hits drives iteration order and the other covered
/// lookups intersect into it. Uncovered conjuncts stay behind as residual
/// filters over the candidates. With no covered conjunct at all the plan
/// degrades to a full scan in insertion order.
///
/// Lookups and the scan snapshot happen under one index read lock, so the
/// plan sees either all of a committed batch or none of it.
pub(crate) fn build(collection: &Collection, query: SelectQuery) -> Result<QueryPlan> {
    let schema = &collection.schema;

    let (columns, projected) = match &query.projection {
        Projection::All => {
            let mut columns = Vec::new();
            let mut projected = Vec::new();
            for (path, _) in schema.leaf_paths() {
                columns.push(path.clone());
                projected.push(ProjectedColumn::Field(path.clone()));
            }
            (columns, projected)
        }
        Projection::Columns(names) => {
            let mut columns = Vec::new();
            let mut projected = Vec::new();
            for name in names {
                if name == DOCUMENT_COLUMN {
                    projected.push(ProjectedColumn::Document);
                } else {
                    schema.resolve(name)?;
                    projected.push(ProjectedColumn::Field(name.clone()));
                }
                columns.push(name.clone());
            }
            (columns, projected)
        }
    };

    for conjunct in &query.conjuncts {
        let field = schema.resolve(&conjunct.path)?;
        check_literal(field, conjunct)?;
    }

    let indexes = collection.indexes.read();
    let mut covered: Vec<(usize, Vec<Locator>)> = Vec::new();
    for (i, conjunct) in query.conjuncts.iter().enumerate() {
        if let Some(key) = conjunct.value.as_key() {
            if let Some(hits) = indexes.lookup(&conjunct.path, conjunct.op, &key) {
                covered.push((i, hits));
            }
        }
    }

    let (candidates, residuals) = if covered.is_empty() {
        let candidates = collection.store.snapshot();
        log::debug!(
            "query on '{}': full scan over {} document(s), {} residual filter(s)",
            collection.name,
            candidates.len(),
            query.conjuncts.len()
        );
        (candidates, query.conjuncts.clone())
    } else {
        let mut driving = 0;
        for slot in 1..covered.len() {
            let slot_key = selectivity(&covered[slot], &query.conjuncts, &indexes);
            let best_key = selectivity(&covered[driving], &query.conjuncts, &indexes);
            if slot_key < best_key {
                driving = slot;
            }
        }

        let mut candidates = covered[driving].1.clone();
        for (slot, (_, hits)) in covered.iter().enumerate() {
            if slot == driving {
                continue;
            }
            let members: HashSet<Locator> = hits.iter().copied().collect();
            candidates.retain(|locator| members.contains(locator));
        }

        let covered_conjuncts: HashSet<usize> = covered.iter().map(|(i, _)| *i).collect();
        let residuals: Vec<Comparison> = query
            .conjuncts
            .iter()
            .enumerate()
            .filter(|(i, _)| !covered_conjuncts.contains(i))
            .map(|(_, c)| c.clone())
            .collect();
        log::debug!(
            "query on '{}': index on '{}' drives {} candidate(s), {} residual filter(s)",
            collection.name,
            query.conjuncts[covered[driving].0].path,
            candidates.len(),
            residuals.len()
        );
        (candidates, residuals)
    };
    drop(indexes);

    Ok(QueryPlan {
        columns,
        projected,
        candidates,
        residuals,
    })
}

/// Orders covered lookups by hit count, then by index declaration position
/// so equal counts pick the same driver every time.
fn selectivity(
    entry: &(usize, Vec<Locator>),
    conjuncts: &[Comparison],
    indexes: &crate::index::IndexManager,
) -> (usize, usize) {
    let (conjunct, hits) = entry;
    let position = indexes
        .position(&conjuncts[*conjunct].path)
        .unwrap_or(usize::MAX);
    (hits.len(), position)
}

fn check_literal(field: FieldType, conjunct: &Comparison) -> Result<()> {
    let ok = match field {
        FieldType::Int | FieldType::Float => matches!(
            conjunct.value,
            FieldValue::Int(_) | FieldValue::Float(_)
        ),
        FieldType::String => matches!(conjunct.value, FieldValue::Str(_)),
        FieldType::Bool => matches!(conjunct.value, FieldValue::Bool(_)),
        FieldType::Binary | FieldType::Object | FieldType::List => false,
    };
    if ok {
        return Ok(());
    }
    let expected = match field {
        FieldType::Int | FieldType::Float => "a numeric literal",
        FieldType::String => "a string literal",
        FieldType::Bool => "a bool literal",
        _ => "no comparison (field is not orderable)",
    };
    Err(DbError::TypeMismatch {
        name: conjunct.path.clone(),
        expected: expected.to_string(),
        actual: conjunct.value.type_name().to_string(),
    })
}
