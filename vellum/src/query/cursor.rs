use std::cmp::Ordering;
use std::sync::Arc;

use crate::buffer::DocumentBuffer;
use crate::database::Collection;
use crate::error::{DbError, Result};
use crate::index::CompareOp;
use crate::schema::types::{compare_values, FieldValue};
use crate::store::Locator;

use super::parse::Comparison;
use super::plan::{ProjectedColumn, QueryPlan};

/// Forward-only cursor over a SELECT's rows.
///
/// The candidate set was snapshotted when the statement was planned, so the
/// cursor is unaffected by concurrent inserts. Rows are materialized lazily:
/// each `next` reads and filters documents until one passes, which makes an
/// early-abandoned query cheap.
pub struct ResultSet {
    collection: Arc<Collection>,
    columns: Vec<String>,
    projected: Vec<ProjectedColumn>,
    residuals: Vec<Comparison>,
    candidates: std::vec::IntoIter<Locator>,
    current: Option<Vec<Option<FieldValue>>>,
}

impl ResultSet {
    pub(crate) fn new(collection: Arc<Collection>, plan: QueryPlan) -> Self {
        Self {
            collection,
            columns: plan.columns,
            projected: plan.projected,
            residuals: plan.residuals,
            candidates: plan.candidates.into_iter(),
            current: None,
        }
    }

    /// Advances to the next matching row. Returns `Ok(false)` once the
    /// result set is exhausted; the cursor then no longer has a row.
    pub fn next(&mut self) -> Result<bool> {
        for locator in self.candidates.by_ref() {
            let doc = self.collection.store.read(locator)?;
            if !row_matches(&self.collection, &self.residuals, &doc)? {
                continue;
            }
            let mut row = Vec::with_capacity(self.projected.len());
            for column in &self.projected {
                let cell = match column {
                    ProjectedColumn::Document => {
                        Some(FieldValue::Bytes(doc.as_slice().to_vec()))
                    }
                    ProjectedColumn::Field(path) => {
                        self.collection.schema.extract(doc.as_slice(), path)?
                    }
                };
                row.push(cell);
            }
            self.current = Some(row);
            return Ok(true);
        }
        self.current = None;
        Ok(false)
    }

    /// Output column names, in projection order.
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Position of a named column. Duplicated names resolve to the first.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| DbError::UnknownColumn(name.to_string()))
    }

    /// True when the column is absent from the current row's document.
    pub fn is_null(&self, index: usize) -> Result<bool> {
        Ok(self.cell(index)?.is_none())
    }

    pub fn get_string(&self, index: usize) -> Result<Option<&str>> {
        match self.cell(index)? {
            None => Ok(None),
            Some(FieldValue::Str(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(self.type_mismatch(index, "string", other)),
        }
    }

    pub fn get_integer(&self, index: usize) -> Result<Option<i64>> {
        match self.cell(index)? {
            None => Ok(None),
            Some(FieldValue::Int(i)) => Ok(Some(*i)),
            Some(other) => Err(self.type_mismatch(index, "int", other)),
        }
    }

    pub fn get_float(&self, index: usize) -> Result<Option<f64>> {
        match self.cell(index)? {
            None => Ok(None),
            Some(FieldValue::Float(f)) => Ok(Some(*f)),
            Some(other) => Err(self.type_mismatch(index, "float", other)),
        }
    }

    pub fn get_boolean(&self, index: usize) -> Result<Option<bool>> {
        match self.cell(index)? {
            None => Ok(None),
            Some(FieldValue::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(self.type_mismatch(index, "bool", other)),
        }
    }

    pub fn get_blob(&self, index: usize) -> Result<Option<&[u8]>> {
        match self.cell(index)? {
            None => Ok(None),
            Some(FieldValue::Bytes(bytes)) => Ok(Some(bytes.as_slice())),
            Some(other) => Err(self.type_mismatch(index, "binary", other)),
        }
    }

    /// The current row's cell, untyped. `Ok(None)` is an absent field.
    pub fn get_value(&self, index: usize) -> Result<Option<&FieldValue>> {
        Ok(self.cell(index)?.as_ref())
    }

    fn cell(&self, index: usize) -> Result<&Option<FieldValue>> {
        let row = self.current.as_ref().ok_or(DbError::CursorPosition)?;
        row.get(index).ok_or_else(|| {
            DbError::UnknownColumn(format!("column index {index} is out of range"))
        })
    }

    fn type_mismatch(&self, index: usize, expected: &str, value: &FieldValue) -> DbError {
        let name = self
            .columns
            .get(index)
            .cloned()
            .unwrap_or_else(|| index.to_string());
        DbError::TypeMismatch {
            name,
            expected: expected.to_string(),
            actual: value.type_name().to_string(),
        }
    }
}

fn row_matches(
    collection: &Collection,
    residuals: &[Comparison],
    doc: &DocumentBuffer,
) -> Result<bool> {
    for conjunct in residuals {
        let value = collection.schema.extract(doc.as_slice(), &conjunct.path)?;
        let holds = match value {
            // An absent field satisfies no predicate.
            None => false,
            Some(value) => predicate_holds(&value, conjunct),
        };
        if !holds {
            return Ok(false);
        }
    }
    Ok(true)
}

fn predicate_holds(value: &FieldValue, conjunct: &Comparison) -> bool {
    match compare_values(value, &conjunct.value) {
        None => false,
        Some(ord) => match conjunct.op {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::GtEq => ord != Ordering::Less,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::LtEq => ord != Ordering::Greater,
        },
    }
}
