//! Rendering rules
//!
//! A template is a small expression language over the compiled arguments of
//! a call. The SQL compiler expands it into its own AST, so the registry
//! stays independent of any particular SQL representation.

/// Operators usable inside synthesized templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateOp {
    Add,
    Sub,
    Mul,
    Div,
    Gt,
    Lt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    /// The n-th argument of the call.
    Arg(usize),
    /// Every argument, in order; only meaningful inside `Call`.
    Args,
    /// `NAME(arg, ...)`
    Call(&'static str, Vec<Template>),
    /// `EXTRACT(FIELD FROM expr)`
    Extract(&'static str, Box<Template>),
    /// `CAST(expr AS TYPE)`
    Cast(Box<Template>, &'static str),
    Binary(TemplateOp, Box<Template>, Box<Template>),
    Int(i64),
    /// Numeric literal kept verbatim, e.g. `1000.0`.
    Number(&'static str),
    Str(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderRule {
    Template(Template),
    /// The dialect has no way to express the function.
    Unsupported(&'static str),
}

impl Template {
    /// Highest argument index the template reads, if any.
    pub fn max_arg(&self) -> Option<usize> {
        match self {
            Template::Arg(i) => Some(*i),
            Template::Args | Template::Int(_) | Template::Number(_) | Template::Str(_) => None,
            Template::Call(_, args) => args.iter().filter_map(Template::max_arg).max(),
            Template::Extract(_, inner) | Template::Cast(inner, _) => inner.max_arg(),
            Template::Binary(_, l, r) => l.max_arg().max(r.max_arg()),
        }
    }
}

// Shorthands used by the builtin rule sets.

pub fn arg(i: usize) -> Template {
    Template::Arg(i)
}

pub fn call(name: &'static str, args: Vec<Template>) -> Template {
    Template::Call(name, args)
}

/// `NAME(<all args>)`
pub fn rename(name: &'static str) -> Template {
    Template::Call(name, vec![Template::Args])
}

pub fn extract(field: &'static str, inner: Template) -> Template {
    Template::Extract(field, Box::new(inner))
}

pub fn cast(inner: Template, type_name: &'static str) -> Template {
    Template::Cast(Box::new(inner), type_name)
}

pub fn binary(op: TemplateOp, left: Template, right: Template) -> Template {
    Template::Binary(op, Box::new(left), Box::new(right))
}
