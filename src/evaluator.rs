use crate::accessors::{Accessors, CaseSensitivity, KeyedValues};
use crate::builder::{Builder, CompiledExpr};
use crate::cache::{CompiledExpressionsCache, ExpressionCache};
use crate::error::Result;
use crate::functions::FunctionsRegistry;
use crate::parser::{Parser, ParserOptions};
use log::debug;
use std::any::TypeId;
use std::sync::Arc;

/// The embedding surface: owns the parser, the function registry and the
/// artifact cache, and runs formula text end to end.
///
/// Each formula is compiled at most once per input type; subsequent
/// evaluations reuse the cached artifact. Failed builds are never cached, so
/// registering the missing function makes the same text succeed later.
pub struct Evaluator {
    parser: Parser,
    functions: FunctionsRegistry,
    cache: Box<dyn ExpressionCache>,
    keyed_case: CaseSensitivity,
}

impl Evaluator {
    /// An evaluator with default parsing, an empty registry and an unbounded
    /// artifact cache.
    pub fn new() -> Self {
        Evaluator {
            parser: Parser::new(),
            functions: FunctionsRegistry::new(),
            cache: Box::new(CompiledExpressionsCache::new()),
            keyed_case: CaseSensitivity::Insensitive,
        }
    }

    pub fn with_parser_options(mut self, options: ParserOptions) -> Self {
        self.parser = Parser::with_options(options);
        self
    }

    pub fn with_cache(mut self, cache: Box<dyn ExpressionCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Key matching mode for [`evaluate_keyed`](Self::evaluate_keyed);
    /// insensitive by default.
    pub fn with_keyed_case(mut self, case: CaseSensitivity) -> Self {
        self.keyed_case = case;
        self
    }

    pub fn functions(&self) -> &FunctionsRegistry {
        &self.functions
    }

    pub fn functions_mut(&mut self) -> &mut FunctionsRegistry {
        &mut self.functions
    }

    /// Evaluates a formula that takes no input.
    pub fn evaluate(&self, text: &str) -> Result<f64> {
        let compiled = self.compile(text, true, |builder, tokens| builder.build(tokens))?;
        compiled(&())
    }

    /// Evaluates a formula against a typed input through its accessor surface.
    ///
    /// The artifact is cached per (formula text, `T`); the accessor surface is
    /// captured at first compile, so later calls with the same text and type
    /// reuse the bindings of the surface supplied then.
    pub fn evaluate_with<T: 'static>(
        &self,
        text: &str,
        input: &T,
        accessors: &Accessors<T>,
    ) -> Result<f64> {
        let compiled = self.compile(text, true, |builder, tokens| {
            builder.build_typed(tokens, accessors)
        })?;
        compiled(input)
    }

    /// Evaluates a formula against keyed values.
    pub fn evaluate_keyed(&self, text: &str, values: &KeyedValues) -> Result<f64> {
        let case = self.keyed_case;
        // sensitive artifacts embed each name's exact spelling, so two
        // spellings of one formula are not interchangeable
        let share_spellings = case == CaseSensitivity::Insensitive;
        let compiled = self.compile(text, share_spellings, |builder, tokens| {
            builder.build_keyed(tokens, case)
        })?;
        compiled(values)
    }

    /// Returns the cached artifact for (text, T) or parses, builds and caches
    /// a fresh one. `fold_case` lowercases the cache key so that differently
    /// cased spellings of one formula share an artifact; callers pass false
    /// when spelling is significant to the artifact's bindings.
    fn compile<T, F>(&self, text: &str, fold_case: bool, build: F) -> Result<CompiledExpr<T>>
    where
        T: 'static,
        F: FnOnce(&Builder<'_>, Vec<crate::token::Token>) -> Result<CompiledExpr<T>>,
    {
        let key = if fold_case {
            text.to_ascii_lowercase()
        } else {
            text.to_string()
        };
        let input_type = TypeId::of::<T>();
        if let Some(artifact) = self.cache.get(&key, input_type) {
            if let Ok(compiled) = artifact.downcast::<CompiledExpr<T>>() {
                debug!("cache hit for formula: {}", text);
                return Ok((*compiled).clone());
            }
        }

        debug!("compiling formula: {}", text);
        let tokens = self.parser.parse(text)?;
        let builder = Builder::new(&self.functions);
        let compiled = build(&builder, tokens)?;
        self.cache.put(&key, input_type, Arc::new(compiled.clone()));
        Ok(compiled)
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}
