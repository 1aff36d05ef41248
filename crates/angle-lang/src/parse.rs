use rustc_hash::FxHashMap;

use crate::{
    Shared, SharedCell,
    compiler::Expression,
    error::{Error, InnerError},
    filter::FilterRegistry,
};

const ONE_TIME_PREFIX: &str = "::";

#[derive(Debug, Clone)]
pub struct Options {
    /// Reuse compiled expressions for identical source text.
    pub cache: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self { cache: true }
    }
}

/// Compiles expression text, caching the results.
///
/// Cloning a parser shares its cache and filter registry.
#[derive(Clone, Default)]
pub struct Parser {
    filters: FilterRegistry,
    cache: Shared<SharedCell<FxHashMap<String, Shared<Expression>>>>,
    options: Options,
}

impl Parser {
    pub fn new(filters: FilterRegistry) -> Self {
        Self::with_options(filters, Options::default())
    }

    pub fn with_options(filters: FilterRegistry, options: Options) -> Self {
        Self {
            filters,
            cache: Shared::default(),
            options,
        }
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    /// Parses and compiles `text`. A leading `::` marks the expression as
    /// one-time.
    #[allow(clippy::result_large_err)]
    pub fn parse(&self, text: &str) -> Result<Shared<Expression>, Error> {
        let key = text.trim();

        if self.options.cache
            && let Some(expression) = self.cache.borrow().get(key)
        {
            return Ok(Shared::clone(expression));
        }

        let (source, one_time) = match key.strip_prefix(ONE_TIME_PREFIX) {
            Some(rest) => (rest, true),
            None => (key, false),
        };

        let program = crate::parse_ast(source)?;
        let expression = Expression::compile(source, program, one_time, &self.filters)
            .map(Shared::new)
            .map_err(|e| Error::from_error(source, InnerError::Compile(e)))?;

        tracing::trace!(
            source = key,
            constant = expression.is_constant(),
            inputs = expression.inputs().len(),
            "compiled expression"
        );

        if self.options.cache {
            self.cache
                .borrow_mut()
                .insert(key.to_string(), Shared::clone(&expression));
        }

        Ok(expression)
    }
}

impl std::fmt::Debug for Parser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser")
            .field("filters", &self.filters)
            .field("cached", &self.cache.borrow().len())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Value, compiler::WatchDelegate};

    #[test]
    fn test_cache_returns_same_expression() {
        let parser = Parser::default();
        let a = parser.parse("a + b").unwrap();
        let b = parser.parse("  a + b ").unwrap();

        assert!(Shared::ptr_eq(&a, &b));
    }

    #[test]
    fn test_cache_disabled() {
        let parser = Parser::with_options(FilterRegistry::new(), Options { cache: false });
        let a = parser.parse("a").unwrap();
        let b = parser.parse("a").unwrap();

        assert!(!Shared::ptr_eq(&a, &b));
    }

    #[test]
    fn test_one_time_prefix() {
        let parser = Parser::default();
        let expression = parser.parse("::a.b").unwrap();

        assert!(expression.is_one_time());
        assert_eq!(expression.source(), "a.b");
        assert_eq!(expression.watch_delegate(), Some(WatchDelegate::OneTime));
        assert!(!parser.parse("a.b").unwrap().is_one_time());
    }

    #[test]
    fn test_eval() {
        let expression = Parser::default().parse("a.b[0] * 2").unwrap();
        let scope = Value::from(serde_json::json!({"a": {"b": [21]}}));

        assert_eq!(expression.eval(&scope, &Value::Undefined), Ok(Value::from(42.0)));
    }

    #[test]
    fn test_errors_carry_source() {
        let err = Parser::default().parse("a | unknown").unwrap_err();

        assert!(matches!(err.cause, InnerError::Compile(_)));
        assert_eq!(err.source_code, "a | unknown");
    }
}
