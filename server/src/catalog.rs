//! Served tables and the references between them.

use crate::error::{AppError, Result};
use std::collections::BTreeSet;

/// `table.field` must hold the id of an existing `parent` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub table: &'static str,
    pub field: &'static str,
    pub parent: &'static str,
}

/// References of the gym schema.
pub static REFERENCES: [Reference; 3] = [
    Reference {
        table: "group_items",
        field: "group_id",
        parent: "groups",
    },
    Reference {
        table: "group_items",
        field: "product_id",
        parent: "products",
    },
    Reference {
        table: "sales",
        field: "subscriber_id",
        parent: "subscribers",
    },
];

/// The tables this server exposes.
#[derive(Debug, Clone)]
pub struct Catalog {
    tables: BTreeSet<String>,
}

impl Catalog {
    pub fn new<I, T>(tables: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
        }
    }

    /// Fail with 404 unless the table is served.
    pub fn ensure(&self, table: &str) -> Result<()> {
        if self.tables.contains(table) {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("unknown table: {table}")))
        }
    }

    /// References leaving `table` whose parent is also served.
    pub fn references_from<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'static Reference> + 'a {
        REFERENCES
            .iter()
            .filter(move |r| r.table == table && self.tables.contains(r.parent))
    }

    /// References pointing at `table` from a served table.
    pub fn references_to<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'static Reference> + 'a {
        REFERENCES
            .iter()
            .filter(move |r| r.parent == table && self.tables.contains(r.table))
    }
}
