// ABOUTME: Static table definitions and PostgreSQL DDL generation
// ABOUTME: Tenant-scoped tables get forced row-level security policies keyed on app.current_tenant
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::session::TENANT_SETTING;

/// Column every tenant-scoped table carries
pub const TENANT_COLUMN: &str = "tenant_id";

/// Logical column type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Free text
    Text,
    /// 64-bit signed integer
    BigInt,
    /// Boolean flag
    Boolean,
    /// Timestamp with time zone
    Timestamp,
}

impl ColumnType {
    const fn sql(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::BigInt => "BIGINT",
            Self::Boolean => "BOOLEAN",
            Self::Timestamp => "TIMESTAMPTZ",
        }
    }
}

/// One column of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name
    pub name: &'static str,
    /// Logical type
    pub column_type: ColumnType,
    /// Whether NULL is allowed
    pub nullable: bool,
}

impl ColumnDef {
    /// Required text column
    #[must_use]
    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            column_type: ColumnType::Text,
            nullable: false,
        }
    }

    /// Required integer column
    #[must_use]
    pub const fn bigint(name: &'static str) -> Self {
        Self {
            name,
            column_type: ColumnType::BigInt,
            nullable: false,
        }
    }

    /// Required timestamp column
    #[must_use]
    pub const fn timestamp(name: &'static str) -> Self {
        Self {
            name,
            column_type: ColumnType::Timestamp,
            nullable: false,
        }
    }

    /// Required boolean column
    #[must_use]
    pub const fn boolean(name: &'static str) -> Self {
        Self {
            name,
            column_type: ColumnType::Boolean,
            nullable: false,
        }
    }

    /// Allow NULL
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Static description of a table
#[derive(Debug, PartialEq, Eq)]
pub struct TableDef {
    /// Table name
    pub name: &'static str,
    /// Primary key column (text)
    pub primary_key: &'static str,
    /// All columns, primary key included
    pub columns: &'static [ColumnDef],
    /// Whether rows belong to a tenant and are guarded by the visibility predicate
    pub tenant_scoped: bool,
    /// Unique constraints as column lists
    pub unique: &'static [&'static [&'static str]],
}

impl TableDef {
    /// Whether `column` is declared on this table
    #[must_use]
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name == column)
    }

    /// Look up a column definition
    #[must_use]
    pub fn column(&self, column: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == column)
    }

    /// PostgreSQL statements creating the table, its unique indexes, and, for
    /// tenant-scoped tables, the forced row-level security policy
    #[must_use]
    pub fn postgres_ddl(&self) -> Vec<String> {
        let mut columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut column = format!("\"{}\" {}", c.name, c.column_type.sql());
                if c.name == self.primary_key {
                    column.push_str(" PRIMARY KEY");
                } else if !c.nullable {
                    column.push_str(" NOT NULL");
                }
                column
            })
            .collect();
        if self.tenant_scoped && !self.has_column(TENANT_COLUMN) {
            columns.push(format!("\"{TENANT_COLUMN}\" TEXT NOT NULL"));
        }

        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
            self.name,
            columns.join(", ")
        )];

        for (index, key) in self.unique.iter().enumerate() {
            let cols: Vec<String> = key.iter().map(|c| format!("\"{c}\"")).collect();
            statements.push(format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS \"{}_uq{}\" ON \"{}\" ({})",
                self.name,
                index,
                self.name,
                cols.join(", ")
            ));
        }

        if self.tenant_scoped {
            let predicate =
                format!("\"{TENANT_COLUMN}\" = current_setting('{TENANT_SETTING}', true)");
            statements.push(format!(
                "ALTER TABLE \"{}\" ENABLE ROW LEVEL SECURITY",
                self.name
            ));
            statements.push(format!(
                "ALTER TABLE \"{}\" FORCE ROW LEVEL SECURITY",
                self.name
            ));
            statements.push(format!(
                "DROP POLICY IF EXISTS tenant_isolation ON \"{}\"",
                self.name
            ));
            statements.push(format!(
                "CREATE POLICY tenant_isolation ON \"{}\" USING ({predicate}) WITH CHECK ({predicate})",
                self.name
            ));
        }
        statements
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static WIDGETS: TableDef = TableDef {
        name: "widgets",
        primary_key: "id",
        columns: &[
            ColumnDef::text("id"),
            ColumnDef::text("tenant_id"),
            ColumnDef::text("label").nullable(),
        ],
        tenant_scoped: true,
        unique: &[&["tenant_id", "label"]],
    };

    #[test]
    fn tenant_scoped_ddl_forces_rls() {
        let ddl = WIDGETS.postgres_ddl();
        assert!(ddl[0].contains("\"id\" TEXT PRIMARY KEY"));
        assert!(ddl[0].contains("\"label\" TEXT,") || ddl[0].ends_with("\"label\" TEXT)"));
        assert!(ddl.iter().any(|s| s.contains("FORCE ROW LEVEL SECURITY")));
        assert!(ddl
            .iter()
            .any(|s| s.contains("current_setting('app.current_tenant', true)")));
        assert!(ddl.iter().any(|s| s.starts_with("CREATE UNIQUE INDEX")));
    }
}
