//! Filter expressions, column templates and tag lookups over a record.
//!
//! A column or filter string dispatches on its first character:
//!
//! - `@expr` is evaluated as a boolean/arithmetic expression,
//! - `%text [Tag] text` expands bracketed tag references inside literal text,
//! - anything else is the name of a tag whose raw value is returned.
//!
//! Evaluation errors never escape this module's convenience functions: a
//! failing filter is false and a failing column is empty.

mod eval;
mod parse;

pub use eval::evaluate;
pub use parse::{parse, Ast, BinaryOp, UnaryOp};

use crate::error::EvalError;
use crate::types::{Record, TagValue};

/// Sigil selecting expression evaluation.
pub const EXPR_SIGIL: char = '@';

/// Sigil selecting template expansion.
pub const TEMPLATE_SIGIL: char = '%';

/// How template expansion renders a reference to a tag the record lacks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingTag {
    /// Render nothing.
    #[default]
    Empty,
    /// Render the reference itself, e.g. `[Model]`.
    Placeholder,
}

impl MissingTag {
    /// Map the `output.missing_tag` setting; unknown values fall back to empty.
    pub fn from_config(value: &str) -> Self {
        if value.eq_ignore_ascii_case("placeholder") {
            MissingTag::Placeholder
        } else {
            MissingTag::Empty
        }
    }
}

/// A parsed expression that can be evaluated against many records.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    ast: Ast,
}

impl Expression {
    /// Parse an expression. A leading `@` sigil is accepted and ignored.
    pub fn compile(source: &str) -> Result<Self, EvalError> {
        let body = source.trim();
        let body = body.strip_prefix(EXPR_SIGIL).unwrap_or(body);
        Ok(Self {
            source: source.to_string(),
            ast: parse(body)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn eval(&self, record: &Record) -> Result<TagValue, EvalError> {
        evaluate(&self.ast, &record.tags)
    }

    /// True when the expression yields `true` or a non-empty string.
    pub fn matches(&self, record: &Record) -> bool {
        match self.eval(record) {
            Ok(value) => is_truthy(&value),
            Err(e) => {
                tracing::trace!("Filter [{}] on {}: {}", self.source, record.label(), e);
                false
            }
        }
    }
}

/// Filter truthiness: boolean `true` or a non-empty string.
pub fn is_truthy(value: &TagValue) -> bool {
    match value {
        TagValue::Bool(b) => *b,
        TagValue::String(s) => !s.is_empty(),
        _ => false,
    }
}

/// Evaluate `expr` once against `record` and test its truthiness.
///
/// Syntax errors count as false.
pub fn filter(expr: &str, record: &Record) -> bool {
    match Expression::compile(expr) {
        Ok(compiled) => compiled.matches(record),
        Err(e) => {
            tracing::trace!("Filter [{}] does not parse: {}", expr, e);
            false
        }
    }
}

/// Expand `[Tag]` references in `template` with the record's display values.
///
/// An unterminated `[` takes the rest of the template as the tag name. An
/// empty reference `[]` renders nothing.
pub fn expand(template: &str, record: &Record, missing: MissingTag) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let (name, next) = match after.find(']') {
            Some(close) => (&after[..close], &after[close + 1..]),
            None => (after, ""),
        };
        if !name.is_empty() {
            match record.get(name) {
                Some(value) => out.push_str(&value.to_string()),
                None if missing == MissingTag::Placeholder => {
                    out.push('[');
                    out.push_str(name);
                    out.push(']');
                }
                None => {}
            }
        }
        rest = next;
    }
    out.push_str(rest);
    out
}

/// One output column, dispatched on its sigil once at setup.
#[derive(Debug, Clone)]
pub enum FieldExpr {
    /// Plain tag lookup.
    Tag(String),
    /// `@expression`.
    Expr(Expression),
    /// `%template` with the sigil stripped.
    Template(String),
    /// An `@expression` that failed to parse; always resolves to nothing.
    Invalid(String),
}

impl FieldExpr {
    pub fn parse(column: &str) -> Self {
        if column.starts_with(EXPR_SIGIL) {
            match Expression::compile(column) {
                Ok(expr) => FieldExpr::Expr(expr),
                Err(e) => {
                    tracing::warn!("Column [{}] is not a valid expression: {}", column, e);
                    FieldExpr::Invalid(column.to_string())
                }
            }
        } else if let Some(template) = column.strip_prefix(TEMPLATE_SIGIL) {
            FieldExpr::Template(template.to_string())
        } else {
            FieldExpr::Tag(column.to_string())
        }
    }

    /// Native value of the column for this record, if it has one.
    pub fn resolve(&self, record: &Record, missing: MissingTag) -> Option<TagValue> {
        match self {
            FieldExpr::Tag(name) => record.get(name).cloned(),
            FieldExpr::Expr(expr) => expr.eval(record).ok(),
            FieldExpr::Template(template) => {
                Some(TagValue::String(expand(template, record, missing)))
            }
            FieldExpr::Invalid(_) => None,
        }
    }

    /// Display string of the column; empty when it does not resolve.
    pub fn render(&self, record: &Record, missing: MissingTag) -> String {
        self.resolve(record, missing)
            .map(|v| v.to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon() -> Record {
        Record::new("/photos/a.jpg")
            .with_tag("FileName", "a.jpg")
            .with_tag("Make", "Canon")
            .with_tag("Model", "5D")
            .with_tag("ISO", 400i64)
    }

    #[test]
    fn test_filter_true_and_false() {
        let record = canon();
        assert!(filter(r#"@Make == "Canon""#, &record));
        assert!(filter(r#"Make == "Canon""#, &record));
        assert!(!filter(r#"@Make == "Nikon""#, &record));
    }

    #[test]
    fn test_filter_errors_are_false() {
        let record = canon();
        assert!(!filter("@Lens == 1", &record));
        assert!(!filter("@Make ==", &record));
        assert!(!filter("@ISO", &record));
    }

    #[test]
    fn test_filter_non_empty_string_is_true() {
        let record = canon().with_tag("Empty", "");
        assert!(filter("@Model", &record));
        assert!(!filter("@Empty", &record));
    }

    #[test]
    fn test_expand_without_brackets_is_identity() {
        let text = "no references here";
        assert_eq!(expand(text, &canon(), MissingTag::Empty), text);
    }

    #[test]
    fn test_expand_substitutes_values() {
        assert_eq!(
            expand("[Make] [Model] @ [ISO]", &canon(), MissingTag::Empty),
            "Canon 5D @ 400"
        );
    }

    #[test]
    fn test_expand_missing_tag_policies() {
        let record = canon();
        assert_eq!(expand("x[Lens]y", &record, MissingTag::Empty), "xy");
        assert_eq!(
            expand("x[Lens]y", &record, MissingTag::Placeholder),
            "x[Lens]y"
        );
    }

    #[test]
    fn test_expand_unterminated_bracket_uses_rest() {
        assert_eq!(expand("by [Make", &canon(), MissingTag::Empty), "by Canon");
        assert_eq!(expand("[]x", &canon(), MissingTag::Placeholder), "x");
    }

    #[test]
    fn test_field_expr_dispatch() {
        let record = canon();
        assert_eq!(
            FieldExpr::parse("Make").resolve(&record, MissingTag::Empty),
            Some(TagValue::from("Canon"))
        );
        assert_eq!(
            FieldExpr::parse("@ISO * 2").resolve(&record, MissingTag::Empty),
            Some(TagValue::Int(800))
        );
        assert_eq!(
            FieldExpr::parse("%[Make]/[Model]").render(&record, MissingTag::Empty),
            "Canon/5D"
        );
        assert_eq!(FieldExpr::parse("Lens").render(&record, MissingTag::Empty), "");
    }

    #[test]
    fn test_invalid_expression_column_renders_empty() {
        let field = FieldExpr::parse("@ISO *");
        assert!(matches!(field, FieldExpr::Invalid(_)));
        assert_eq!(field.render(&canon(), MissingTag::Empty), "");
    }

    #[test]
    fn test_missing_tag_from_config() {
        assert_eq!(MissingTag::from_config("placeholder"), MissingTag::Placeholder);
        assert_eq!(MissingTag::from_config("empty"), MissingTag::Empty);
    }
}
