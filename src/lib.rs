pub mod accessors;
pub mod builder;
pub mod cache;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod parser;
pub mod postfix;
pub mod token;

pub use accessors::{Accessors, CaseSensitivity, KeyedValues};
pub use builder::{Builder, CompiledExpr};
pub use cache::{CompiledExpressionsCache, ExpressionCache, LruExpressionsCache};
pub use error::{Error, Result};
pub use evaluator::Evaluator;
pub use functions::FunctionsRegistry;
pub use parser::{Parser, ParserOptions};

/// One-shot evaluation of a formula against keyed values, with the math and
/// logical preludes registered. Hosts that evaluate repeatedly should hold an
/// [`Evaluator`] instead, to reuse compiled artifacts.
pub fn evaluate_expression(
    expression: &str,
    values: &KeyedValues,
) -> Result<f64> {
    let mut evaluator = Evaluator::new();
    evaluator.functions_mut().add_math()?.add_logical()?;
    evaluator.evaluate_keyed(expression, values)
}
