//! Catalog functions. Each call runs on a fresh statement whose result set is
//! fetched like any query.

use crate::cli::CatalogCall;
use crate::error::Result;

use super::connection::Connection;
use super::diagnostics::HandleKind;
use super::statement::Statement;

/// Empty or missing filters are passed to the driver as NULL.
fn filter(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

impl Connection {
    fn catalog(&self, call: CatalogCall) -> Result<Statement> {
        self.shared.clear(HandleKind::Statement);
        let mut stmt = self.new_statement(None)?;
        stmt.run_catalog(&call)?;
        log::debug!("Catalog call {} started", call.name());
        Ok(stmt)
    }

    pub fn tables(
        &self,
        qualifier: Option<&str>,
        schema: Option<&str>,
        table: Option<&str>,
        table_type: Option<&str>,
    ) -> Result<Statement> {
        self.catalog(CatalogCall::Tables {
            catalog: filter(qualifier),
            schema: filter(schema),
            table: filter(table),
            table_type: filter(table_type),
        })
    }

    pub fn columns(
        &self,
        qualifier: Option<&str>,
        schema: Option<&str>,
        table: Option<&str>,
        column: Option<&str>,
    ) -> Result<Statement> {
        self.catalog(CatalogCall::Columns {
            catalog: filter(qualifier),
            schema: filter(schema),
            table: filter(table),
            column: filter(column),
        })
    }

    pub fn primary_keys(
        &self,
        qualifier: Option<&str>,
        schema: Option<&str>,
        table: Option<&str>,
    ) -> Result<Statement> {
        self.catalog(CatalogCall::PrimaryKeys {
            catalog: filter(qualifier),
            schema: filter(schema),
            table: filter(table),
        })
    }

    /// Keys linking `pk_*` (referenced) and `fk_*` (referencing) tables; either
    /// side may be left open.
    #[allow(clippy::too_many_arguments)]
    pub fn foreign_keys(
        &self,
        pk_qualifier: Option<&str>,
        pk_schema: Option<&str>,
        pk_table: Option<&str>,
        fk_qualifier: Option<&str>,
        fk_schema: Option<&str>,
        fk_table: Option<&str>,
    ) -> Result<Statement> {
        self.catalog(CatalogCall::ForeignKeys {
            pk_catalog: filter(pk_qualifier),
            pk_schema: filter(pk_schema),
            pk_table: filter(pk_table),
            fk_catalog: filter(fk_qualifier),
            fk_schema: filter(fk_schema),
            fk_table: filter(fk_table),
        })
    }

    pub fn procedures(
        &self,
        qualifier: Option<&str>,
        schema: Option<&str>,
        procedure: Option<&str>,
    ) -> Result<Statement> {
        self.catalog(CatalogCall::Procedures {
            catalog: filter(qualifier),
            schema: filter(schema),
            procedure: filter(procedure),
        })
    }

    pub fn procedure_columns(
        &self,
        qualifier: Option<&str>,
        schema: Option<&str>,
        procedure: Option<&str>,
        column: Option<&str>,
    ) -> Result<Statement> {
        self.catalog(CatalogCall::ProcedureColumns {
            catalog: filter(qualifier),
            schema: filter(schema),
            procedure: filter(procedure),
            column: filter(column),
        })
    }

    /// Index statistics; `unique_only` restricts the result to unique indexes.
    pub fn statistics(
        &self,
        qualifier: Option<&str>,
        schema: Option<&str>,
        table: Option<&str>,
        unique_only: bool,
    ) -> Result<Statement> {
        self.catalog(CatalogCall::Statistics {
            catalog: filter(qualifier),
            schema: filter(schema),
            table: filter(table),
            unique_only,
        })
    }

    pub fn table_privileges(
        &self,
        qualifier: Option<&str>,
        schema: Option<&str>,
        table: Option<&str>,
    ) -> Result<Statement> {
        self.catalog(CatalogCall::TablePrivileges {
            catalog: filter(qualifier),
            schema: filter(schema),
            table: filter(table),
        })
    }

    pub fn column_privileges(
        &self,
        qualifier: Option<&str>,
        schema: Option<&str>,
        table: Option<&str>,
        column: Option<&str>,
    ) -> Result<Statement> {
        self.catalog(CatalogCall::ColumnPrivileges {
            catalog: filter(qualifier),
            schema: filter(schema),
            table: filter(table),
            column: filter(column),
        })
    }

    /// Optimal row-identifying column set. `scope` is one of the
    /// `SQL_SCOPE_*` codes.
    pub fn special_columns(
        &self,
        qualifier: Option<&str>,
        schema: Option<&str>,
        table: Option<&str>,
        scope: i16,
    ) -> Result<Statement> {
        self.catalog(CatalogCall::SpecialColumns {
            catalog: filter(qualifier),
            schema: filter(schema),
            table: filter(table),
            scope,
        })
    }
}
