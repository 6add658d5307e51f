use sqlparser::ast::{
    BinaryOperator, Expr, GroupByExpr, Query, Select, SelectItem, SetExpr, Statement,
    TableFactor, UnaryOperator, Value,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::error::{DbError, Result};
use crate::index::CompareOp;
use crate::schema::types::FieldValue;

/// Pseudo-column projecting the whole encoded document.
pub const DOCUMENT_COLUMN: &str = "_document";

/// What the SELECT projects.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Projection {
    /// `SELECT *`: every scalar leaf path in schema declaration order.
    All,
    /// Explicit column list, in query order.
    Columns(Vec<String>),
}

/// One `path op literal` conjunct of the WHERE clause.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Comparison {
    pub path: String,
    pub op: CompareOp,
    pub value: FieldValue,
}

/// A SELECT reduced to the dialect the engine executes: single collection,
/// field-path projection, AND-chained comparisons.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SelectQuery {
    pub collection: String,
    pub projection: Projection,
    pub conjuncts: Vec<Comparison>,
}

/// Parses one SELECT statement of the supported dialect. Anything outside
/// the dialect is rejected with `QuerySyntax` rather than silently ignored.
pub(crate) fn parse_select(sql: &str) -> Result<SelectQuery> {
    let dialect = GenericDialect {};
    let statements = Parser::parse_sql(&dialect, sql)
        .map_err(|e| DbError::QuerySyntax(e.to_string()))?;
    if statements.len() != 1 {
        return Err(DbError::QuerySyntax(
            "expected exactly one SELECT statement".into(),
        ));
    }
    let query = match &statements[0] {
        Statement::Query(query) => query,
        _ => {
            return Err(DbError::QuerySyntax(
                "only SELECT statements are supported".into(),
            ))
        }
    };
    let select = plain_select(query)?;

    let collection = collection_name(select)?;
    let projection = projection(select)?;
    let conjuncts = match &select.selection {
        Some(expr) => {
            let mut conjuncts = Vec::new();
            collect_conjuncts(expr, &mut conjuncts)?;
            conjuncts
        }
        None => Vec::new(),
    };

    Ok(SelectQuery {
        collection,
        projection,
        conjuncts,
    })
}

/// Unwraps the query down to a plain SELECT, rejecting every clause the
/// dialect leaves out.
fn plain_select(query: &Query) -> Result<&Select> {
    if query.with.is_some() {
        return Err(unsupported("WITH"));
    }
    if !query.order_by.is_empty() {
        return Err(unsupported("ORDER BY"));
    }
    if query.limit.is_some() || !query.limit_by.is_empty() {
        return Err(unsupported("LIMIT"));
    }
    if query.offset.is_some() || query.fetch.is_some() {
        return Err(unsupported("OFFSET"));
    }
    if !query.locks.is_empty() {
        return Err(unsupported("FOR UPDATE"));
    }
    let select = match query.body.as_ref() {
        SetExpr::Select(select) => select,
        _ => {
            return Err(DbError::QuerySyntax(
                "only a plain SELECT body is supported".into(),
            ))
        }
    };
    if select.distinct.is_some() {
        return Err(unsupported("DISTINCT"));
    }
    if select.top.is_some() {
        return Err(unsupported("TOP"));
    }
    if select.into.is_some() {
        return Err(unsupported("SELECT INTO"));
    }
    match &select.group_by {
        GroupByExpr::Expressions(exprs) if exprs.is_empty() => {}
        _ => return Err(unsupported("GROUP BY")),
    }
    if select.having.is_some() {
        return Err(unsupported("HAVING"));
    }
    if !select.sort_by.is_empty() {
        return Err(unsupported("SORT BY"));
    }
    if !select.lateral_views.is_empty() {
        return Err(unsupported("LATERAL VIEW"));
    }
    if !select.named_window.is_empty() {
        return Err(unsupported("WINDOW"));
    }
    if select.qualify.is_some() {
        return Err(unsupported("QUALIFY"));
    }
    Ok(select)
}

fn unsupported(clause: &str) -> DbError {
    DbError::QuerySyntax(format!("{clause} is not supported"))
}

fn collection_name(select: &Select) -> Result<String> {
    if select.from.len() != 1 {
        return Err(DbError::QuerySyntax(
            "queries must name exactly one collection".into(),
        ));
    }
    let table = &select.from[0];
    if !table.joins.is_empty() {
        return Err(unsupported("JOIN"));
    }
    match &table.relation {
        TableFactor::Table { name, alias, .. } => {
            if alias.is_some() {
                return Err(DbError::QuerySyntax(
                    "table aliases are not supported".into(),
                ));
            }
            if name.0.len() != 1 {
                return Err(DbError::QuerySyntax(
                    "qualified collection names are not supported".into(),
                ));
            }
            Ok(name.0[0].value.clone())
        }
        _ => Err(DbError::QuerySyntax(
            "FROM must name a collection".into(),
        )),
    }
}

fn projection(select: &Select) -> Result<Projection> {
    let mut wildcard = false;
    let mut columns = Vec::new();
    for item in &select.projection {
        match item {
            SelectItem::Wildcard(_) => wildcard = true,
            SelectItem::UnnamedExpr(expr) => columns.push(column_path(expr)?),
            SelectItem::ExprWithAlias { .. } => {
                return Err(DbError::QuerySyntax(
                    "column aliases are not supported".into(),
                ))
            }
            SelectItem::QualifiedWildcard(..) => {
                return Err(DbError::QuerySyntax(
                    "qualified wildcards are not supported".into(),
                ))
            }
        }
    }
    if wildcard {
        if !columns.is_empty() {
            return Err(DbError::QuerySyntax(
                "'*' cannot be combined with named columns".into(),
            ));
        }
        return Ok(Projection::All);
    }
    Ok(Projection::Columns(columns))
}

/// A field path is a bare or quoted identifier, possibly dotted. Quoting
/// makes the whole dotted path one identifier; both spellings normalize to
/// the same path string.
fn column_path(expr: &Expr) -> Result<String> {
    match expr {
        Expr::Identifier(ident) => Ok(ident.value.clone()),
        Expr::CompoundIdentifier(parts) => Ok(parts
            .iter()
            .map(|p| p.value.as_str())
            .collect::<Vec<_>>()
            .join(".")),
        _ => Err(DbError::QuerySyntax(format!(
            "expected a field path, got: {expr}"
        ))),
    }
}

fn collect_conjuncts(expr: &Expr, out: &mut Vec<Comparison>) -> Result<()> {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            collect_conjuncts(left, out)?;
            collect_conjuncts(right, out)?;
            Ok(())
        }
        Expr::Nested(inner) => collect_conjuncts(inner, out),
        Expr::BinaryOp { left, op, right } => {
            out.push(comparison(left, op, right)?);
            Ok(())
        }
        _ => Err(DbError::QuerySyntax(format!(
            "expected a comparison, got: {expr}"
        ))),
    }
}

fn comparison(left: &Expr, op: &BinaryOperator, right: &Expr) -> Result<Comparison> {
    let op = match op {
        BinaryOperator::Eq => CompareOp::Eq,
        BinaryOperator::Gt => CompareOp::Gt,
        BinaryOperator::GtEq => CompareOp::GtEq,
        BinaryOperator::Lt => CompareOp::Lt,
        BinaryOperator::LtEq => CompareOp::LtEq,
        BinaryOperator::Or => return Err(unsupported("OR")),
        other => {
            return Err(DbError::QuerySyntax(format!(
                "operator {other} is not supported"
            )))
        }
    };
    let path = column_path(left)?;
    let value = literal(right)?;
    Ok(Comparison { path, op, value })
}

fn literal(expr: &Expr) -> Result<FieldValue> {
    match expr {
        Expr::Value(Value::Number(text, _)) => number(text),
        Expr::Value(Value::SingleQuotedString(s)) => Ok(FieldValue::Str(s.clone())),
        Expr::Value(Value::Boolean(b)) => Ok(FieldValue::Bool(*b)),
        Expr::Value(Value::Null) => Err(DbError::QuerySyntax(
            "NULL literals are not supported".into(),
        )),
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match literal(expr)? {
            FieldValue::Int(i) => Ok(FieldValue::Int(-i)),
            FieldValue::Float(f) => Ok(FieldValue::Float(-f)),
            _ => Err(DbError::QuerySyntax(
                "'-' applies only to numeric literals".into(),
            )),
        },
        _ => Err(DbError::QuerySyntax(format!(
            "expected a literal, got: {expr}"
        ))),
    }
}

fn number(text: &str) -> Result<FieldValue> {
    if let Ok(i) = text.parse::<i64>() {
        return Ok(FieldValue::Int(i));
    }
    text.parse::<f64>()
        .map(FieldValue::Float)
        .map_err(|_| DbError::QuerySyntax(format!("invalid numeric literal '{text}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(sql: &str) -> SelectQuery {
        parse_select(sql).unwrap()
    }

    fn syntax_err(sql: &str) -> String {
        match parse_select(sql) {
            Err(DbError::QuerySyntax(msg)) => msg,
            other => panic!("expected QuerySyntax for {sql:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_select_star() {
        let q = parse("SELECT * FROM character");
        assert_eq!(q.collection, "character");
        assert_eq!(q.projection, Projection::All);
        assert!(q.conjuncts.is_empty());
    }

    #[test]
    fn test_select_columns_and_predicate() {
        let q = parse("SELECT name, age FROM character WHERE house = 'Stark'");
        assert_eq!(
            q.projection,
            Projection::Columns(vec!["name".into(), "age".into()])
        );
        assert_eq!(
            q.conjuncts,
            vec![Comparison {
                path: "house".into(),
                op: CompareOp::Eq,
                value: FieldValue::Str("Stark".into()),
            }]
        );
    }

    #[test]
    fn test_dotted_and_quoted_paths_normalize() {
        let dotted = parse("SELECT played_by.name FROM character");
        let quoted = parse("SELECT \"played_by.name\" FROM character");
        assert_eq!(dotted.projection, quoted.projection);
        assert_eq!(
            dotted.projection,
            Projection::Columns(vec!["played_by.name".into()])
        );
    }

    #[test]
    fn test_document_pseudo_column_parses_as_identifier() {
        let q = parse("SELECT _document FROM character WHERE age > 38");
        assert_eq!(
            q.projection,
            Projection::Columns(vec![DOCUMENT_COLUMN.to_string()])
        );
    }

    #[test]
    fn test_and_chain_flattens_with_nesting() {
        let q = parse(
            "SELECT name FROM character WHERE (age >= 21 AND age <= 51) AND house = 'Stark'",
        );
        let paths: Vec<&str> = q.conjuncts.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["age", "age", "house"]);
        assert_eq!(q.conjuncts[0].op, CompareOp::GtEq);
        assert_eq!(q.conjuncts[1].op, CompareOp::LtEq);
    }

    #[test]
    fn test_numeric_literals() {
        let q = parse("SELECT name FROM c WHERE age > -5 AND rating >= 8.5 AND votes < 9999999999");
        assert_eq!(q.conjuncts[0].value, FieldValue::Int(-5));
        assert_eq!(q.conjuncts[1].value, FieldValue::Float(8.5));
        assert_eq!(q.conjuncts[2].value, FieldValue::Int(9_999_999_999));
    }

    #[test]
    fn test_boolean_literal() {
        let q = parse("SELECT name FROM c WHERE alive = true");
        assert_eq!(q.conjuncts[0].value, FieldValue::Bool(true));
    }

    #[test]
    fn test_rejects_clauses_outside_the_dialect() {
        assert!(syntax_err("SELECT name FROM c ORDER BY name").contains("ORDER BY"));
        assert!(syntax_err("SELECT name FROM c LIMIT 5").contains("LIMIT"));
        assert!(syntax_err("SELECT DISTINCT name FROM c").contains("DISTINCT"));
        assert!(syntax_err("SELECT name FROM c GROUP BY name").contains("GROUP BY"));
        assert!(syntax_err("SELECT a FROM c JOIN d ON a = b").contains("JOIN"));
        assert!(syntax_err("SELECT name FROM c WHERE a = 1 OR b = 2").contains("OR"));
        assert!(syntax_err("SELECT name FROM c WHERE a != 1").contains("not supported"));
        assert!(syntax_err("SELECT name AS n FROM c").contains("aliases"));
        assert!(syntax_err("SELECT *, name FROM c").contains("'*'"));
        assert!(syntax_err("SELECT name FROM a, b").contains("one collection"));
        assert!(syntax_err("SELECT name FROM db.c").contains("qualified"));
    }

    #[test]
    fn test_rejects_non_select_statements() {
        assert!(!syntax_err("INSERT INTO c VALUES (1)").is_empty());
        assert!(!syntax_err("DELETE FROM c").is_empty());
        assert!(syntax_err("SELECT 1 FROM a; SELECT 2 FROM b").contains("one SELECT"));
        assert!(!syntax_err("not sql at all").is_empty());
    }

    #[test]
    fn test_rejects_malformed_predicates() {
        assert!(!syntax_err("SELECT name FROM c WHERE age").is_empty());
        assert!(!syntax_err("SELECT name FROM c WHERE 21 = age").is_empty());
        assert!(!syntax_err("SELECT name FROM c WHERE age = name").is_empty());
        assert!(!syntax_err("SELECT name FROM c WHERE age = NULL").is_empty());
        assert!(!syntax_err("SELECT lower(name) FROM c").is_empty());
    }
}
