//! DDL statement rendering
//!
//! Text only; executing the statements is up to the caller.

use crate::error::{CompileError, CompileResult};
use crate::render::Renderer;
use relc_ir::{Rel, Schema};
use relc_registry::{Dialect, RuleTable};

#[derive(Debug, Clone, PartialEq)]
pub enum DdlStatement {
    CreateTable {
        name: String,
        schema: Schema,
        if_not_exists: bool,
        /// Connector options, rendered as `WITH (...)`.
        properties: Vec<(String, String)>,
    },
    CreateView {
        name: String,
        query: Rel,
        temporary: bool,
        or_replace: bool,
    },
    DropTable {
        name: String,
        if_exists: bool,
    },
    DropView {
        name: String,
        if_exists: bool,
        temporary: bool,
    },
    RenameTable {
        from: String,
        to: String,
    },
    CreateDatabase {
        name: String,
        if_not_exists: bool,
        location: Option<String>,
    },
    DropDatabase {
        name: String,
        if_exists: bool,
        cascade: bool,
    },
    AnalyzeTable {
        name: String,
        noscan: bool,
    },
}

impl DdlStatement {
    pub fn kind_name(&self) -> &'static str {
        match self {
            DdlStatement::CreateTable { .. } => "CreateTable",
            DdlStatement::CreateView { .. } => "CreateView",
            DdlStatement::DropTable { .. } => "DropTable",
            DdlStatement::DropView { .. } => "DropView",
            DdlStatement::RenameTable { .. } => "RenameTable",
            DdlStatement::CreateDatabase { .. } => "CreateDatabase",
            DdlStatement::DropDatabase { .. } => "DropDatabase",
            DdlStatement::AnalyzeTable { .. } => "AnalyzeTable",
        }
    }
}

pub fn render_ddl(statement: &DdlStatement, dialect: Dialect, rules: &RuleTable) -> CompileResult<String> {
    let descriptor = dialect.descriptor();
    let ddl = &descriptor.ddl;
    let r = Renderer::new(descriptor);
    let unsupported = |detail: &str| CompileError::UnsupportedOperator {
        operator: statement.kind_name().to_string(),
        dialect,
        detail: detail.to_string(),
    };

    let sql = match statement {
        DdlStatement::CreateTable {
            name,
            schema,
            if_not_exists,
            properties,
        } => {
            if schema.is_empty() {
                return Err(unsupported("a table needs at least one column"));
            }
            if !properties.is_empty() && !ddl.table_properties {
                return Err(unsupported("table properties are not available"));
            }
            let mut columns = Vec::with_capacity(schema.len());
            for field in &schema.fields {
                let type_name = dialect.column_type_name(&field.data_type).ok_or_else(|| {
                    unsupported(&format!("no column type for {}", field.data_type))
                })?;
                let mut column = format!("{} {}", r.quote_identifier(&field.name), type_name);
                if !field.nullable {
                    column.push_str(" NOT NULL");
                }
                columns.push(column);
            }
            let mut sql = format!(
                "CREATE TABLE {}{} ({})",
                if *if_not_exists { "IF NOT EXISTS " } else { "" },
                r.quote_identifier(name),
                columns.join(", ")
            );
            if !properties.is_empty() {
                let props: Vec<String> = properties
                    .iter()
                    .map(|(k, v)| format!("{} = {}", r.quote_string(k), r.quote_string(v)))
                    .collect();
                sql.push_str(&format!(" WITH ({})", props.join(", ")));
            }
            sql
        }
        DdlStatement::CreateView {
            name,
            query,
            temporary,
            or_replace,
        } => {
            if *temporary && !ddl.temporary_view {
                return Err(unsupported("temporary views are not available"));
            }
            if *or_replace && !ddl.or_replace_view {
                return Err(unsupported("CREATE OR REPLACE VIEW is not available"));
            }
            let compiled = crate::compile(query, dialect, rules)?;
            format!(
                "CREATE {}{}VIEW {} AS {}",
                if *or_replace { "OR REPLACE " } else { "" },
                if *temporary { "TEMPORARY " } else { "" },
                r.quote_identifier(name),
                compiled.sql
            )
        }
        DdlStatement::DropTable { name, if_exists } => format!(
            "DROP TABLE {}{}",
            if *if_exists { "IF EXISTS " } else { "" },
            r.quote_identifier(name)
        ),
        DdlStatement::DropView {
            name,
            if_exists,
            temporary,
        } => {
            if *temporary && !ddl.temporary_view {
                return Err(unsupported("temporary views are not available"));
            }
            // Flink keeps temporary views in a separate namespace.
            let temporary = *temporary && dialect == Dialect::Flink;
            format!(
                "DROP {}VIEW {}{}",
                if temporary { "TEMPORARY " } else { "" },
                if *if_exists { "IF EXISTS " } else { "" },
                r.quote_identifier(name)
            )
        }
        DdlStatement::RenameTable { from, to } => format!(
            "ALTER TABLE {} RENAME TO {}",
            r.quote_identifier(from),
            r.quote_identifier(to)
        ),
        DdlStatement::CreateDatabase {
            name,
            if_not_exists,
            location,
        } => {
            let keyword = ddl
                .database_keyword
                .ok_or_else(|| unsupported("databases cannot be created"))?;
            if *if_not_exists && !ddl.database_if_not_exists {
                return Err(unsupported("IF NOT EXISTS is not available for databases"));
            }
            let mut sql = format!(
                "CREATE {} {}{}",
                keyword,
                if *if_not_exists { "IF NOT EXISTS " } else { "" },
                r.quote_identifier(name)
            );
            if let Some(path) = location {
                if !ddl.database_location {
                    return Err(unsupported("database locations are not available"));
                }
                sql.push_str(&format!(" LOCATION {}", r.quote_string(path)));
            }
            sql
        }
        DdlStatement::DropDatabase {
            name,
            if_exists,
            cascade,
        } => {
            let keyword = ddl
                .database_keyword
                .ok_or_else(|| unsupported("databases cannot be dropped"))?;
            if *cascade && !ddl.drop_database_cascade {
                return Err(unsupported("CASCADE is not available"));
            }
            format!(
                "DROP {} {}{}{}",
                keyword,
                if *if_exists { "IF EXISTS " } else { "" },
                r.quote_identifier(name),
                if *cascade { " CASCADE" } else { "" }
            )
        }
        DdlStatement::AnalyzeTable { name, noscan } => {
            if !ddl.analyze_table {
                return Err(unsupported("ANALYZE TABLE is not available"));
            }
            format!(
                "ANALYZE TABLE {} COMPUTE STATISTICS{}",
                r.quote_identifier(name),
                if *noscan { " NOSCAN" } else { "" }
            )
        }
    };

    tracing::debug!(
        target: "relc::compile",
        statement = statement.kind_name(),
        dialect = %dialect,
        "rendered ddl"
    );
    Ok(sql)
}
