//! Relational expression compiler
//!
//! Lowers a validated operator tree (`relc_ir::Rel`) to a single SQL
//! statement for one dialect. Compilation is pure: it performs no I/O, keeps
//! no state between calls and yields byte-identical text for identical
//! input, so the SQL (or its fingerprint) can serve as a cache key.

pub mod ast;
mod ddl;
mod error;
mod relational;
pub mod render;
mod scalar;

pub use ddl::{render_ddl, DdlStatement};
pub use error::{CompileError, CompileResult};

use relc_ir::{DataType, Expr, Rel, Schema};
use relc_registry::{Dialect, RuleTable};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::relational::RelCompiler;
use crate::render::Renderer;
use crate::scalar::{ScalarCompiler, Scope};

/// A rendered statement and the schema of its result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    pub schema: Schema,
    pub dialect: Dialect,
}

impl CompiledQuery {
    /// SHA-256 of the dialect and SQL text.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.dialect.name().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.sql.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Compile `rel` to SQL text for `dialect`.
pub fn compile(rel: &Rel, dialect: Dialect, rules: &RuleTable) -> CompileResult<CompiledQuery> {
    let select = compile_select(rel, dialect, rules)?;
    let sql = Renderer::new(dialect.descriptor()).render_select(&select);
    tracing::debug!(
        target: "relc::compile",
        dialect = %dialect,
        root = rel.kind_name(),
        sql_len = sql.len(),
        "compiled query"
    );
    Ok(CompiledQuery {
        sql,
        schema: rel.schema().clone(),
        dialect,
    })
}

/// Compile `rel` to a statement tree without rendering it.
pub fn compile_select(rel: &Rel, dialect: Dialect, rules: &RuleTable) -> CompileResult<ast::Select> {
    RelCompiler::new(dialect, rules).compile(rel)
}

/// Compile a standalone scalar expression to SQL text and its type.
///
/// Column references render unqualified.
pub fn compile_expr(expr: &Expr, dialect: Dialect, rules: &RuleTable) -> CompileResult<(String, DataType)> {
    let compiled = ScalarCompiler::new(dialect, rules).compile(expr, &Scope::Bare)?;
    let text = Renderer::new(dialect.descriptor()).render_expr(&compiled.expr);
    Ok((text, compiled.data_type))
}
