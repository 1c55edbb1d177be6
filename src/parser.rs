use crate::error::{Error, Result};
use crate::token::{self, Token, TokenKind};
use log::debug;

/// Opt-in rewrites applied to the raw text before lexing.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParserOptions {
    /// Rewrite the word ` and ` (case-insensitive, space-delimited) to ` & `.
    pub and_as_text: bool,
    /// Rewrite the word ` or ` (case-insensitive, space-delimited) to ` | `.
    pub or_as_text: bool,
}

/// Turns raw formula text into a structured token list: lexing, bracket
/// validation, function-call structuring and unary-operator normalization.
#[derive(Debug, Default)]
pub struct Parser {
    options: ParserOptions,
}

impl Parser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ParserOptions) -> Self {
        Parser { options }
    }

    pub fn parse(&self, input: &str) -> Result<Vec<Token>> {
        debug!("parsing formula: {}", input);
        let mut cleaned: String = input
            .chars()
            .filter(|c| !matches!(c, '\r' | '\n' | '\t'))
            .collect();

        if self.options.and_as_text {
            cleaned = replace_word_operator(&cleaned, "and", '&');
        }
        if self.options.or_as_text {
            cleaned = replace_word_operator(&cleaned, "or", '|');
        }

        let tokens = lex(&cleaned)?;
        validate_brackets(&tokens)?;
        let tokens: Vec<Token> = tokens.into_iter().filter(|t| !t.is_empty()).collect();
        let mut tokens = structure_functions(tokens)?;
        normalize_unary(&mut tokens);
        Ok(tokens)
    }
}

/// Single left-to-right scan. A terminal character closes the preceding run
/// and lexes on its own, except when `<` or `>` extends into a two-character
/// operator. Whitespace runs become `Empty` tokens, dropped later.
fn lex(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        let current = chars[i];
        if token::is_terminal_char(current) {
            tokens.push(Token::new(&collect(&chars[start..i]))?);
            if token::starts_terminal_sequence(current)
                && i + 1 < chars.len()
                && token::extends_terminal_sequence(current, chars[i + 1])
            {
                let pair: String = [current, chars[i + 1]].iter().collect();
                tokens.push(Token::new(&pair)?);
                i += 2;
            } else {
                tokens.push(Token::new(&current.to_string())?);
                i += 1;
            }
            start = i;
        } else {
            i += 1;
        }
    }

    if start < chars.len() {
        tokens.push(Token::new(&collect(&chars[start..]))?);
    }

    Ok(tokens)
}

fn collect(chars: &[char]) -> String {
    chars.iter().collect()
}

/// Space-delimited, case-insensitive word replacement; ASCII search keeps the
/// byte offsets of the lowercased copy valid in the original.
fn replace_word_operator(input: &str, word: &str, symbol: char) -> String {
    let needle = format!(" {word} ");
    let haystack = input.to_ascii_lowercase();
    let mut output = String::with_capacity(input.len());
    let mut copied = 0;
    let mut from = 0;

    while let Some(position) = haystack[from..].find(&needle) {
        let at = from + position;
        output.push_str(&input[copied..at]);
        output.push(' ');
        output.push(symbol);
        output.push(' ');
        copied = at + needle.len();
        from = copied;
    }

    output.push_str(&input[copied..]);
    output
}

/// Top-level open/close bracket counts must balance and never go negative.
fn validate_brackets(tokens: &[Token]) -> Result<()> {
    let mut count: i32 = 0;
    for token in tokens {
        if token.is_opening_bracket() {
            count += 1;
        } else if token.is_closing_bracket() {
            count -= 1;
            if count < 0 {
                return Err(Error::Syntax("mismatched brackets".into()));
            }
        }
    }

    if count != 0 {
        return Err(Error::Syntax("mismatched brackets".into()));
    }
    Ok(())
}

/// One function call being assembled: the promoted token, its argument lists
/// so far, and the count of unmatched grouping brackets inside the current
/// argument.
struct Frame {
    function: Token,
    arguments: Vec<Vec<Token>>,
    depth: usize,
}

/// Rewrites `name(` into a Function token owning nested argument lists and
/// consumes the call's brackets and separators. Plain grouping brackets pass
/// through untouched.
fn structure_functions(tokens: Vec<Token>) -> Result<Vec<Token>> {
    let mut output: Vec<Token> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    for token in tokens {
        if token.is_opening_bracket() {
            let follows_name = sink(&mut output, &mut stack)
                .last()
                .is_some_and(Token::is_name);
            if follows_name {
                let mut function = sink(&mut output, &mut stack)
                    .pop()
                    .expect("sink has a trailing name");
                function.promote_to_function()?;
                stack.push(Frame {
                    function,
                    arguments: vec![Vec::new()],
                    depth: 0,
                });
            } else if let Some(frame) = stack.last_mut() {
                frame.depth += 1;
                current_argument(frame).push(token);
            } else {
                output.push(token);
            }
        } else if token.is_separator() {
            match stack.last_mut() {
                Some(frame) if frame.depth == 0 => frame.arguments.push(Vec::new()),
                Some(_) => return Err(Error::Syntax("mismatched brackets".into())),
                None => {
                    return Err(Error::Syntax(
                        "misplaced function parameter separator".into(),
                    ))
                }
            }
        } else if token.is_closing_bracket() {
            match stack.last_mut() {
                Some(frame) if frame.depth == 0 => {
                    let mut frame = stack.pop().expect("matched Some above");
                    if frame.arguments.last().is_some_and(Vec::is_empty) {
                        frame.arguments.pop();
                    }
                    frame.function.set_argument_lists(frame.arguments);
                    sink(&mut output, &mut stack).push(frame.function);
                }
                Some(frame) => {
                    frame.depth -= 1;
                    current_argument(frame).push(token);
                }
                None => output.push(token),
            }
        } else {
            sink(&mut output, &mut stack).push(token);
        }
    }

    if !stack.is_empty() {
        return Err(Error::Syntax("mismatched brackets".into()));
    }
    Ok(output)
}

/// Where the next ordinary token goes: the active function's current argument
/// list, or the top-level stream.
fn sink<'a>(output: &'a mut Vec<Token>, stack: &'a mut Vec<Frame>) -> &'a mut Vec<Token> {
    match stack.last_mut() {
        Some(frame) => current_argument(frame),
        None => output,
    }
}

fn current_argument(frame: &mut Frame) -> &mut Vec<Token> {
    frame
        .arguments
        .last_mut()
        .expect("a frame always has an open argument list")
}

/// A `+`/`-` is unary iff it is the first token of its list or directly
/// follows an opening bracket. Unary `+` is dropped; unary `-` becomes
/// `-1 *`. Applies recursively to every function argument list.
fn normalize_unary(tokens: &mut Vec<Token>) {
    for token in tokens.iter_mut() {
        if token.is_function() {
            for argument in token.argument_lists_mut().iter_mut() {
                normalize_unary(argument);
            }
        }
    }

    let mut i = tokens.len();
    while i > 0 {
        i -= 1;
        let unary = (tokens[i].is_add() || tokens[i].is_subtract())
            && (i == 0
                || tokens[i - 1].is_opening_bracket()
                || tokens[i - 1].is_separator());
        if unary {
            if tokens[i].is_add() {
                tokens.remove(i);
            } else {
                tokens[i] = Token::synthetic(TokenKind::Multiply, "*");
                tokens.insert(i, Token::from_value(-1.0));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tokens: &[Token]) -> Vec<TokenKind> {
        tokens.iter().map(Token::kind).collect()
    }

    #[test]
    fn single_constant() {
        let tokens = Parser::new().parse("1").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind(), TokenKind::Constant);
        assert_eq!(tokens[0].numeric_value(), Some(1.0));
    }

    #[test]
    fn tabs_and_newlines_ignored() {
        let tokens = Parser::new().parse("1  +\t2\r\n* 3").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Constant,
                TokenKind::Add,
                TokenKind::Constant,
                TokenKind::Multiply,
                TokenKind::Constant,
            ]
        );
    }

    #[test]
    fn two_char_operators_lex_as_one_token() {
        let tokens = Parser::new().parse("a >= b").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Name, TokenKind::GreaterOrEqualTo, TokenKind::Name]
        );

        let tokens = Parser::new().parse("1<=2").unwrap();
        assert_eq!(tokens[1].kind(), TokenKind::LessOrEqualTo);

        let tokens = Parser::new().parse("1<>2").unwrap();
        assert_eq!(tokens[1].kind(), TokenKind::NotEqualTo);
    }

    #[test]
    fn lone_comparison_chars_lex_alone() {
        let tokens = Parser::new().parse("1 < 2 = 3 > 4").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Constant,
                TokenKind::LessThan,
                TokenKind::Constant,
                TokenKind::EqualTo,
                TokenKind::Constant,
                TokenKind::GreaterThan,
                TokenKind::Constant,
            ]
        );
    }

    #[test]
    fn unary_minus_becomes_multiply_by_negative_one() {
        let tokens = Parser::new().parse("-1.").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Constant, TokenKind::Multiply, TokenKind::Constant]
        );
        assert_eq!(tokens[0].numeric_value(), Some(-1.0));
        assert_eq!(tokens[2].numeric_value(), Some(1.0));
    }

    #[test]
    fn unary_plus_is_dropped() {
        let tokens = Parser::new().parse("+5").unwrap();
        assert_eq!(kinds(&tokens), vec![TokenKind::Constant]);
    }

    #[test]
    fn unary_minus_after_opening_bracket() {
        let tokens = Parser::new().parse("(-2)").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::OpeningBracket,
                TokenKind::Constant,
                TokenKind::Multiply,
                TokenKind::Constant,
                TokenKind::ClosingBracket,
            ]
        );
        assert_eq!(tokens[1].numeric_value(), Some(-1.0));
    }

    #[test]
    fn interior_minus_stays_binary() {
        let tokens = Parser::new().parse("2-3").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![TokenKind::Constant, TokenKind::Subtract, TokenKind::Constant]
        );
    }

    #[test]
    fn function_with_two_arguments() {
        let tokens = Parser::new().parse("max(1, 2)").unwrap();
        assert_eq!(tokens.len(), 1);
        let function = &tokens[0];
        assert_eq!(function.kind(), TokenKind::Function);
        assert_eq!(function.value(), "max");
        assert_eq!(function.argument_lists().len(), 2);
        assert_eq!(function.argument_lists()[0][0].numeric_value(), Some(1.0));
        assert_eq!(function.argument_lists()[1][0].numeric_value(), Some(2.0));
    }

    #[test]
    fn function_with_no_arguments() {
        let tokens = Parser::new().parse("pi()").unwrap();
        assert_eq!(tokens[0].kind(), TokenKind::Function);
        assert!(tokens[0].argument_lists().is_empty());
    }

    #[test]
    fn trailing_empty_argument_is_trimmed() {
        let tokens = Parser::new().parse("max(1, 2,)").unwrap();
        assert_eq!(tokens[0].argument_lists().len(), 2);
    }

    #[test]
    fn nested_function_calls() {
        let tokens = Parser::new().parse("max(min(1, 2), 3)").unwrap();
        assert_eq!(tokens.len(), 1);
        let outer = &tokens[0];
        assert_eq!(outer.value(), "max");
        assert_eq!(outer.argument_lists().len(), 2);

        let inner = &outer.argument_lists()[0][0];
        assert_eq!(inner.kind(), TokenKind::Function);
        assert_eq!(inner.value(), "min");
        assert_eq!(inner.argument_lists().len(), 2);
    }

    #[test]
    fn argument_may_contain_grouping_brackets() {
        let tokens = Parser::new().parse("abs((1 + 2) * 3)").unwrap();
        let argument = &tokens[0].argument_lists()[0];
        assert_eq!(
            kinds(argument),
            vec![
                TokenKind::OpeningBracket,
                TokenKind::Constant,
                TokenKind::Add,
                TokenKind::Constant,
                TokenKind::ClosingBracket,
                TokenKind::Multiply,
                TokenKind::Constant,
            ]
        );
    }

    #[test]
    fn unary_normalization_recurses_into_arguments() {
        let tokens = Parser::new().parse("abs(-3)").unwrap();
        let argument = &tokens[0].argument_lists()[0];
        assert_eq!(
            kinds(argument),
            vec![TokenKind::Constant, TokenKind::Multiply, TokenKind::Constant]
        );
        assert_eq!(argument[0].numeric_value(), Some(-1.0));
    }

    #[test]
    fn unary_minus_in_second_argument() {
        let tokens = Parser::new().parse("max(1, -2)").unwrap();
        let argument = &tokens[0].argument_lists()[1];
        assert_eq!(
            kinds(argument),
            vec![TokenKind::Constant, TokenKind::Multiply, TokenKind::Constant]
        );
    }

    #[test]
    fn separator_inside_grouping_brackets_is_rejected() {
        let result = Parser::new().parse("func((1,2))");
        assert_eq!(
            result.unwrap_err(),
            Error::Syntax("mismatched brackets".into())
        );
    }

    #[test]
    fn separator_outside_function_is_rejected() {
        let result = Parser::new().parse("1, 2");
        assert_eq!(
            result.unwrap_err(),
            Error::Syntax("misplaced function parameter separator".into())
        );
    }

    #[test]
    fn unbalanced_brackets_are_rejected() {
        for input in ["(", ")", "(()", "f(1", "1)"] {
            let result = Parser::new().parse(input);
            assert_eq!(
                result.unwrap_err(),
                Error::Syntax("mismatched brackets".into()),
                "for input '{input}'"
            );
        }
    }

    #[test]
    fn malformed_literal_is_lex_error() {
        assert!(matches!(
            Parser::new().parse("1.2.3 + 4"),
            Err(Error::Lex(_))
        ));
    }

    #[test]
    fn empty_input_parses_to_no_tokens() {
        assert!(Parser::new().parse("").unwrap().is_empty());
        assert!(Parser::new().parse("   ").unwrap().is_empty());
    }

    #[test]
    fn and_or_as_text_rewrites() {
        let parser = Parser::with_options(ParserOptions {
            and_as_text: true,
            or_as_text: true,
        });
        let tokens = parser.parse("1 AND 2 or 3").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::Constant,
                TokenKind::And,
                TokenKind::Constant,
                TokenKind::Or,
                TokenKind::Constant,
            ]
        );
    }

    #[test]
    fn and_as_text_disabled_fails_to_lex() {
        // without the option the whole input is one run starting with a digit
        assert!(matches!(
            Parser::new().parse("1 and 2"),
            Err(Error::Lex(_))
        ));
    }

    #[test]
    fn grouping_brackets_pass_through() {
        let tokens = Parser::new().parse("(1 + 2) * 3").unwrap();
        assert_eq!(
            kinds(&tokens),
            vec![
                TokenKind::OpeningBracket,
                TokenKind::Constant,
                TokenKind::Add,
                TokenKind::Constant,
                TokenKind::ClosingBracket,
                TokenKind::Multiply,
                TokenKind::Constant,
            ]
        );
    }
}
