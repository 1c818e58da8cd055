//! DDL classifier implementation.
//!
//! Converts definition text to a classified statement using sqlparser.
//! The grammar decides everything; when it cannot, the result is the
//! `Unclassified` variant and the caller chooses what that means.

use sqlparser::ast as sp;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser as SqlParser;

use super::ast::{DdlObject, DdlStatement};
use super::error::{DdlError, DdlResult};
use crate::storage::{ObjectKind, QualifiedName};

/// Classify a definition.
///
/// Total function: never fails. Input that is empty, unparseable, has
/// more than one statement, or is a statement kind we don't track
/// comes back as `Unclassified`.
pub fn classify(sql: &str, default_schema: &str) -> DdlStatement {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return DdlStatement::Unclassified { raw: sql.to_string() };
    }

    let dialect = GenericDialect {};
    let statements = match SqlParser::parse_sql(&dialect, trimmed) {
        Ok(s) => s,
        Err(_) => return DdlStatement::Unclassified { raw: sql.to_string() },
    };

    if statements.len() != 1 {
        return DdlStatement::Unclassified { raw: sql.to_string() };
    }

    convert_statement(&statements[0], default_schema)
        .unwrap_or_else(|| DdlStatement::Unclassified { raw: sql.to_string() })
}

/// Classify a definition, requiring a classified result.
///
/// Used where an unclassifiable definition is a validation failure,
/// e.g. custom conflict resolutions.
pub fn parse_strict(sql: &str, default_schema: &str) -> DdlResult<DdlStatement> {
    if sql.trim().is_empty() {
        return Err(DdlError::Empty);
    }
    match classify(sql, default_schema) {
        DdlStatement::Unclassified { .. } => {
            let first_line = sql.lines().next().unwrap_or("").trim().to_string();
            Err(DdlError::Unclassifiable(first_line))
        }
        classified => Ok(classified),
    }
}

fn convert_statement(stmt: &sp::Statement, default_schema: &str) -> Option<DdlStatement> {
    match stmt {
        sp::Statement::CreateTable(create) => {
            let name = qualified_name(&create.name, default_schema)?;
            let references = table_references(create, default_schema);
            Some(DdlStatement::Create(DdlObject {
                kind: ObjectKind::Table,
                name,
                parent: None,
                references,
            }))
        }

        sp::Statement::CreateView { name, query, .. } => {
            let name = qualified_name(name, default_schema)?;
            let references = query_references(query, default_schema);
            Some(DdlStatement::Create(DdlObject {
                kind: ObjectKind::View,
                name,
                parent: None,
                references,
            }))
        }

        sp::Statement::CreateIndex(create) => {
            let table = qualified_name(&create.table_name, default_schema)?;
            let name = match &create.name {
                Some(n) => qualified_name(n, default_schema)?,
                None => return None, // unnamed index, nothing to track
            };
            Some(DdlStatement::Create(DdlObject {
                kind: ObjectKind::Index,
                name,
                parent: Some(table.clone()),
                references: vec![table],
            }))
        }

        sp::Statement::CreateFunction(create) => {
            let name = qualified_name(&create.name, default_schema)?;
            Some(DdlStatement::Create(DdlObject {
                kind: ObjectKind::Function,
                name,
                parent: None,
                references: Vec::new(),
            }))
        }

        sp::Statement::CreateTrigger {
            name, table_name, ..
        } => {
            let name = qualified_name(name, default_schema)?;
            let table = qualified_name(table_name, default_schema)?;
            Some(DdlStatement::Create(DdlObject {
                kind: ObjectKind::Trigger,
                name,
                parent: Some(table.clone()),
                references: vec![table],
            }))
        }

        sp::Statement::CreateSequence { name, .. } => {
            let name = qualified_name(name, default_schema)?;
            Some(DdlStatement::Create(DdlObject {
                kind: ObjectKind::Sequence,
                name,
                parent: None,
                references: Vec::new(),
            }))
        }

        sp::Statement::CreateType { name, .. } => {
            let name = qualified_name(name, default_schema)?;
            Some(DdlStatement::Create(DdlObject {
                kind: ObjectKind::Type,
                name,
                parent: None,
                references: Vec::new(),
            }))
        }

        sp::Statement::AlterTable { name, .. } => {
            let name = qualified_name(name, default_schema)?;
            Some(DdlStatement::Alter(DdlObject {
                kind: ObjectKind::Table,
                name,
                parent: None,
                references: Vec::new(),
            }))
        }

        sp::Statement::AlterView { name, .. } => {
            let name = qualified_name(name, default_schema)?;
            Some(DdlStatement::Alter(DdlObject {
                kind: ObjectKind::View,
                name,
                parent: None,
                references: Vec::new(),
            }))
        }

        sp::Statement::Drop {
            object_type, names, ..
        } => {
            let kind = match object_type {
                sp::ObjectType::Table => ObjectKind::Table,
                sp::ObjectType::View => ObjectKind::View,
                sp::ObjectType::Index => ObjectKind::Index,
                sp::ObjectType::Sequence => ObjectKind::Sequence,
                _ => return None,
            };
            let name = qualified_name(names.first()?, default_schema)?;
            Some(DdlStatement::Drop(DdlObject {
                kind,
                name,
                parent: None,
                references: Vec::new(),
            }))
        }

        sp::Statement::DropFunction { func_desc, .. } => {
            let name = qualified_name(&func_desc.first()?.name, default_schema)?;
            Some(DdlStatement::Drop(DdlObject {
                kind: ObjectKind::Function,
                name,
                parent: None,
                references: Vec::new(),
            }))
        }

        _ => None,
    }
}

/// Extract a schema-qualified name from an ObjectName.
///
/// One-part names get the default schema; quoted names that fail our
/// component validation bail out to Unclassified via None.
fn qualified_name(name: &sp::ObjectName, default_schema: &str) -> Option<QualifiedName> {
    let parts: Vec<String> = name
        .0
        .iter()
        .map(|p| {
            p.as_ident()
                .map(|id| id.value.clone())
                .unwrap_or_else(|| p.to_string())
        })
        .collect();

    match parts.as_slice() {
        [single] => QualifiedName::new(default_schema, single.clone()).ok(),
        [schema, .., last] => QualifiedName::new(schema.clone(), last.clone()).ok(),
        [] => None,
    }
}

/// FK targets from a CREATE TABLE: table-level constraints plus
/// inline column REFERENCES.
fn table_references(create: &sp::CreateTable, default_schema: &str) -> Vec<QualifiedName> {
    let mut refs = Vec::new();

    for constraint in &create.constraints {
        if let sp::TableConstraint::ForeignKey { foreign_table, .. } = constraint {
            if let Some(qn) = qualified_name(foreign_table, default_schema) {
                refs.push(qn);
            }
        }
    }

    for column in &create.columns {
        for option in &column.options {
            if let sp::ColumnOption::ForeignKey { foreign_table, .. } = &option.option {
                if let Some(qn) = qualified_name(foreign_table, default_schema) {
                    refs.push(qn);
                }
            }
        }
    }

    refs.sort();
    refs.dedup();
    refs
}

/// Tables named in a view's FROM clauses (including joins).
fn query_references(query: &sp::Query, default_schema: &str) -> Vec<QualifiedName> {
    let mut refs = Vec::new();
    collect_set_expr_tables(query.body.as_ref(), default_schema, &mut refs);
    refs.sort();
    refs.dedup();
    refs
}

fn collect_set_expr_tables(body: &sp::SetExpr, default_schema: &str, out: &mut Vec<QualifiedName>) {
    match body {
        sp::SetExpr::Select(select) => {
            for twj in &select.from {
                collect_table_factor(&twj.relation, default_schema, out);
                for join in &twj.joins {
                    collect_table_factor(&join.relation, default_schema, out);
                }
            }
        }
        sp::SetExpr::SetOperation { left, right, .. } => {
            collect_set_expr_tables(left.as_ref(), default_schema, out);
            collect_set_expr_tables(right.as_ref(), default_schema, out);
        }
        sp::SetExpr::Query(inner) => {
            collect_set_expr_tables(inner.body.as_ref(), default_schema, out)
        }
        _ => {}
    }
}

fn collect_table_factor(factor: &sp::TableFactor, default_schema: &str, out: &mut Vec<QualifiedName>) {
    if let sp::TableFactor::Table { name, .. } = factor {
        if let Some(qn) = qualified_name(name, default_schema) {
            out.push(qn);
        }
    }
}
