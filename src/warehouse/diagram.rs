//! Entity-relationship diagram of the warehouse as a Graphviz DOT document.
//!
//! Render it with e.g. `dot -Tpng warehouse.dot -o warehouse_erd.png`.

use crate::sqlite_persistence::{Table, VersionedSchema};
use std::fmt::Write;

fn escape_record(s: &str) -> String {
    s.chars()
        .flat_map(|c| match c {
            '{' | '}' | '|' | '<' | '>' | '"' => vec!['\\', c],
            _ => vec![c],
        })
        .collect()
}

fn table_label(table: &Table) -> String {
    let mut fields = Vec::with_capacity(table.columns.len());
    for column in table.columns {
        let mut field = format!("{} : {}", column.name, column.sql_type.as_sql());
        if column.is_primary_key {
            field.push_str(" (PK)");
        } else if column.foreign_key.is_some() {
            field.push_str(" (FK)");
        }
        if column.non_null && !column.is_primary_key {
            field.push_str(" NOT NULL");
        }
        fields.push(format!("{}\\l", escape_record(&field)));
    }
    format!("{{{}|{}}}", table.name, fields.join(""))
}

pub fn render_dot(schema: &VersionedSchema) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = writeln!(out, "digraph warehouse {{");
    let _ = writeln!(out, "    rankdir=LR;");
    let _ = writeln!(out, "    node [shape=record, fontname=\"Helvetica\"];");

    for table in schema.tables {
        let _ = writeln!(out, "    {} [label=\"{}\"];", table.name, table_label(table));
    }
    for table in schema.tables {
        for column in table.columns {
            if let Some(fk) = column.foreign_key {
                let _ = writeln!(
                    out,
                    "    {} -> {} [label=\"{}\"];",
                    table.name, fk.foreign_table, column.name
                );
            }
        }
    }
    let _ = writeln!(out, "}}");
    out
}
