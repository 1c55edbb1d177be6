use crate::error::{Error, Result};
use crate::token::Token;

/// Two-stack shunting-yard conversion from infix to postfix (Reverse Polish)
/// order. An operator pops already-stacked operators of greater or equal
/// precedence (left-associative ties), brackets group, and whatever remains
/// on the operator stack flushes to the output at the end.
///
/// Called once for the top-level token list and once per function argument
/// list from the builder.
pub fn convert_to_postfix(tokens: Vec<Token>) -> Result<Vec<Token>> {
    let mut output: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut operators: Vec<Token> = Vec::new();

    for token in tokens {
        if token.is_operator() {
            while let Some(top) = operators.last() {
                if top.is_operator() && top.precedence() >= token.precedence() {
                    let top = operators.pop().expect("peeked above");
                    output.push(top);
                } else {
                    break;
                }
            }
            operators.push(token);
        } else if token.is_opening_bracket() {
            operators.push(token);
        } else if token.is_closing_bracket() {
            loop {
                match operators.pop() {
                    None => return Err(Error::Syntax("mismatched brackets".into())),
                    Some(op) if op.is_opening_bracket() => break,
                    Some(op) => output.push(op),
                }
            }
        } else if token.is_constant() || token.is_function() || token.is_name() {
            output.push(token);
        }
    }

    while let Some(op) = operators.pop() {
        if op.is_opening_bracket() || op.is_closing_bracket() {
            return Err(Error::Syntax("mismatched brackets".into()));
        }
        output.push(op);
    }

    Ok(output)
}
