use thiserror::Error;

/// Everything that can go wrong between raw formula text and a decimal result.
///
/// All variants are fatal to the current call only; nothing is retried and no
/// partial artifact is ever cached after a failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Unrecognized character sequence or malformed numeric literal.
    #[error("lex error: {0}")]
    Lex(String),

    /// Unbalanced brackets or a misplaced parameter separator.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// A name, function or method could not be resolved against the registry
    /// or the input accessor surface.
    #[error("binding error: {0}")]
    Binding(String),

    /// More than one instance-method candidate matched a function-style call.
    #[error("ambiguous call: {0}")]
    Ambiguity(String),

    /// Operand/operator imbalance while executing postfix tokens, or a keyed
    /// lookup that missed at runtime.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// A function or alias name collides with a built-in, an alias, or an
    /// existing registration.
    #[error("registration error: {0}")]
    Registration(String),
}

pub type Result<T> = std::result::Result<T, Error>;
