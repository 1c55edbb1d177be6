use crate::accessors::{keyed_lookup, Accessors, CaseSensitivity, KeyedValues};
use crate::error::{Error, Result};
use crate::functions::FunctionsRegistry;
use crate::postfix::convert_to_postfix;
use crate::token::{Token, TokenKind};
use log::debug;
use std::sync::Arc;

/// The executable artifact produced for one expression/input-type pair.
/// Immutable and side-effect free; safe to invoke concurrently.
pub type CompiledExpr<T> = Arc<dyn Fn(&T) -> Result<f64> + Send + Sync>;

type NameResolver<'r, T> = dyn Fn(&Token) -> Result<CompiledExpr<T>> + 'r;
type MethodResolver<'r, T> = dyn Fn(&Token, Vec<CompiledExpr<T>>) -> Result<CompiledExpr<T>> + 'r;

/// Walks postfix tokens with an operand stack, resolving names and functions
/// against the registry and the input accessor surface, and produces a
/// directly executable closure tree.
///
/// The input shape is chosen once per build: no input, a typed accessor
/// surface, or keyed values.
pub struct Builder<'a> {
    functions: &'a FunctionsRegistry,
}

impl<'a> Builder<'a> {
    pub fn new(functions: &'a FunctionsRegistry) -> Self {
        Builder { functions }
    }

    /// Builds an artifact for a formula that takes no input. Any name token
    /// is a binding error.
    pub fn build(&self, tokens: Vec<Token>) -> Result<CompiledExpr<()>> {
        debug!("building parameterless artifact");
        let names = |token: &Token| -> Result<CompiledExpr<()>> {
            Err(Error::Binding(format!(
                "unknown name '{}' - the formula takes no input",
                token.value()
            )))
        };
        let methods = |token: &Token, args: Vec<CompiledExpr<()>>| -> Result<CompiledExpr<()>> {
            Err(registry_miss(token.value(), args.len()))
        };
        self.bind(tokens, &names, &methods)
    }

    /// Builds an artifact bound to a typed input through its accessor
    /// surface: names become field accesses (alias-aware), unresolved calls
    /// fall back to declared methods.
    pub fn build_typed<T: 'static>(
        &self,
        mut tokens: Vec<Token>,
        accessors: &Accessors<T>,
    ) -> Result<CompiledExpr<T>> {
        debug!("building artifact for input type {}", accessors.type_name());
        accessors.validate()?;
        map_field_names(&mut tokens, accessors)?;

        let names = |token: &Token| -> Result<CompiledExpr<T>> {
            let (_, getter) = accessors.resolve_field(token.value()).ok_or_else(|| {
                Error::Binding(format!(
                    "argument type {} does not have a field named '{}'",
                    accessors.type_name(),
                    token.value()
                ))
            })?;
            Ok(Arc::new(move |input: &T| Ok(getter(input))))
        };

        let methods = |token: &Token, args: Vec<CompiledExpr<T>>| -> Result<CompiledExpr<T>> {
            let arity = args.len();
            let mut candidates = accessors.method_candidates(token.value(), arity);
            match candidates.len() {
                0 => Err(Error::Binding(format!(
                    "there is no function '{name}' with {arity} parameters defined \
                     and type {ty} has no method '{name}' taking {arity} decimal parameters",
                    name = token.value(),
                    ty = accessors.type_name(),
                ))),
                1 => {
                    let (_, body) = candidates.pop().expect("checked length");
                    Ok(Arc::new(move |input: &T| {
                        let mut values = Vec::with_capacity(args.len());
                        for arg in &args {
                            values.push(arg(input)?);
                        }
                        Ok(body(input, &values))
                    }))
                }
                _ => {
                    let names: Vec<&str> = candidates.iter().map(|(name, _)| *name).collect();
                    Err(Error::Ambiguity(format!(
                        "call '{}' with {} parameters matches more than one method on {}: {}",
                        token.value(),
                        arity,
                        accessors.type_name(),
                        names.join(", ")
                    )))
                }
            }
        };

        self.bind(tokens, &names, &methods)
    }

    /// Builds an artifact over keyed values. Names become runtime lookups by
    /// the token's literal text; no alias resolution applies.
    pub fn build_keyed(
        &self,
        tokens: Vec<Token>,
        case: CaseSensitivity,
    ) -> Result<CompiledExpr<KeyedValues>> {
        debug!("building artifact for keyed input");
        let names = |token: &Token| -> Result<CompiledExpr<KeyedValues>> {
            let name = token.value().to_string();
            Ok(Arc::new(move |values: &KeyedValues| {
                keyed_lookup(values, &name, case).ok_or_else(|| {
                    Error::Evaluation(format!("key '{name}' not present in the supplied values"))
                })
            }))
        };
        let methods = |token: &Token,
                       args: Vec<CompiledExpr<KeyedValues>>|
         -> Result<CompiledExpr<KeyedValues>> {
            Err(registry_miss(token.value(), args.len()))
        };
        self.bind(tokens, &names, &methods)
    }

    fn bind<T: 'static>(
        &self,
        tokens: Vec<Token>,
        names: &NameResolver<'_, T>,
        methods: &MethodResolver<'_, T>,
    ) -> Result<CompiledExpr<T>> {
        let postfix = convert_to_postfix(tokens)?;
        self.bind_postfix(&postfix, names, methods)
    }

    fn bind_postfix<T: 'static>(
        &self,
        postfix: &[Token],
        names: &NameResolver<'_, T>,
        methods: &MethodResolver<'_, T>,
    ) -> Result<CompiledExpr<T>> {
        let mut stack: Vec<CompiledExpr<T>> = Vec::new();

        for token in postfix {
            if token.is_constant() {
                let value = token.numeric_value().ok_or_else(|| {
                    Error::Evaluation(format!(
                        "constant token '{}' has no numeric value",
                        token.value()
                    ))
                })?;
                stack.push(Arc::new(move |_| Ok(value)));
            } else if token.is_name() {
                stack.push(names(token)?);
            } else if token.is_function() {
                stack.push(self.bind_function(token, names, methods)?);
            } else if token.is_operator() {
                let right = stack.pop().ok_or_else(missing_operand)?;
                let left = stack.pop().ok_or_else(missing_operand)?;
                stack.push(combine(token.kind(), left, right)?);
            } else {
                return Err(Error::Evaluation(format!(
                    "unexpected '{:?}' token in postfix stream",
                    token.kind()
                )));
            }
        }

        if stack.len() != 1 {
            return Err(Error::Evaluation(
                "too many values supplied - missing operator".into(),
            ));
        }
        Ok(stack.pop().expect("checked length"))
    }

    /// Fixed resolution order: built-in special form, registry function,
    /// instance method on the input accessor surface.
    fn bind_function<T: 'static>(
        &self,
        token: &Token,
        names: &NameResolver<'_, T>,
        methods: &MethodResolver<'_, T>,
    ) -> Result<CompiledExpr<T>> {
        let arity = token.argument_lists().len();
        let canonical = self.functions.resolve_name(token.value());

        if let Some(expected) = self.functions.builtin_arity(&canonical) {
            if expected != arity {
                return Err(Error::Binding(format!(
                    "built-in function '{canonical}' expects {expected} arguments, {arity} supplied"
                )));
            }
            let args = self.bind_arguments(token, names, methods)?;
            return build_builtin(&canonical, args);
        }

        if let Some(body) = self.functions.lookup(&canonical, arity) {
            let args = self.bind_arguments(token, names, methods)?;
            return Ok(Arc::new(move |input: &T| {
                let mut values = Vec::with_capacity(args.len());
                for arg in &args {
                    values.push(arg(input)?);
                }
                Ok(body(&values))
            }));
        }

        let args = self.bind_arguments(token, names, methods)?;
        methods(token, args)
    }

    /// Each argument list is independently postfix-converted and bound with
    /// the same resolvers as the enclosing expression.
    fn bind_arguments<T: 'static>(
        &self,
        token: &Token,
        names: &NameResolver<'_, T>,
        methods: &MethodResolver<'_, T>,
    ) -> Result<Vec<CompiledExpr<T>>> {
        let mut args = Vec::with_capacity(token.argument_lists().len());
        for list in token.argument_lists() {
            let postfix = convert_to_postfix(list.clone())?;
            args.push(self.bind_postfix(&postfix, names, methods)?);
        }
        Ok(args)
    }
}

fn build_builtin<T: 'static>(name: &str, args: Vec<CompiledExpr<T>>) -> Result<CompiledExpr<T>> {
    match name {
        "if" => {
            let [condition, then_branch, else_branch]: [CompiledExpr<T>; 3] = args
                .try_into()
                .map_err(|_| Error::Evaluation("built-in arity mismatch".into()))?;
            Ok(Arc::new(move |input: &T| {
                if condition(input)? != 0.0 {
                    then_branch(input)
                } else {
                    else_branch(input)
                }
            }))
        }
        "not" => {
            let [value]: [CompiledExpr<T>; 1] = args
                .try_into()
                .map_err(|_| Error::Evaluation("built-in arity mismatch".into()))?;
            Ok(Arc::new(move |input: &T| {
                Ok((value(input)? == 0.0) as i32 as f64)
            }))
        }
        _ => Err(Error::Binding(format!("unknown built-in '{name}'"))),
    }
}

/// Binary node construction. Arithmetic applies directly; logical operators
/// take both operands' nonzero truthiness; relational operators encode their
/// outcome as 1/0.
fn combine<T: 'static>(
    kind: TokenKind,
    left: CompiledExpr<T>,
    right: CompiledExpr<T>,
) -> Result<CompiledExpr<T>> {
    let node: CompiledExpr<T> = match kind {
        TokenKind::Add => Arc::new(move |i: &T| Ok(left(i)? + right(i)?)),
        TokenKind::Subtract => Arc::new(move |i: &T| Ok(left(i)? - right(i)?)),
        TokenKind::Multiply => Arc::new(move |i: &T| Ok(left(i)? * right(i)?)),
        TokenKind::Divide => Arc::new(move |i: &T| Ok(left(i)? / right(i)?)),
        TokenKind::And => Arc::new(move |i: &T| {
            let l = left(i)?;
            let r = right(i)?;
            Ok((l != 0.0 && r != 0.0) as i32 as f64)
        }),
        TokenKind::Or => Arc::new(move |i: &T| {
            let l = left(i)?;
            let r = right(i)?;
            Ok((l != 0.0 || r != 0.0) as i32 as f64)
        }),
        TokenKind::EqualTo => Arc::new(move |i: &T| Ok((left(i)? == right(i)?) as i32 as f64)),
        TokenKind::NotEqualTo => Arc::new(move |i: &T| Ok((left(i)? != right(i)?) as i32 as f64)),
        TokenKind::LessThan => Arc::new(move |i: &T| Ok((left(i)? < right(i)?) as i32 as f64)),
        TokenKind::LessOrEqualTo => {
            Arc::new(move |i: &T| Ok((left(i)? <= right(i)?) as i32 as f64))
        }
        TokenKind::GreaterThan => Arc::new(move |i: &T| Ok((left(i)? > right(i)?) as i32 as f64)),
        TokenKind::GreaterOrEqualTo => {
            Arc::new(move |i: &T| Ok((left(i)? >= right(i)?) as i32 as f64))
        }
        other => {
            return Err(Error::Evaluation(format!(
                "'{other:?}' is not a binary operator"
            )))
        }
    };
    Ok(node)
}

fn missing_operand() -> Error {
    Error::Evaluation("insufficient data for calculation - missing operand".into())
}

fn registry_miss(name: &str, arity: usize) -> Error {
    Error::Binding(format!(
        "there is no function '{name}' with {arity} parameters defined"
    ))
}

/// Rewrites every Name token (recursively, through argument lists) to its
/// canonical field name on the accessor surface; the single rename a token
/// ever receives.
fn map_field_names<T>(tokens: &mut [Token], accessors: &Accessors<T>) -> Result<()> {
    for token in tokens.iter_mut() {
        if token.is_name() {
            let canonical = match accessors.resolve_field(token.value()) {
                Some((name, _)) => name.to_string(),
                None => {
                    return Err(Error::Binding(format!(
                        "argument type {} does not have a field named '{}'",
                        accessors.type_name(),
                        token.value()
                    )))
                }
            };
            token.change_value_to(canonical);
        } else if token.is_function() {
            for list in token.argument_lists_mut().iter_mut() {
                map_field_names(list, accessors)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn registry() -> FunctionsRegistry {
        let mut functions = FunctionsRegistry::new();
        functions.add_math().unwrap();
        functions.add_logical().unwrap();
        functions
    }

    fn eval(input: &str) -> Result<f64> {
        let functions = registry();
        let tokens = Parser::new().parse(input)?;
        let builder = Builder::new(&functions);
        let compiled = builder.build(tokens)?;
        compiled(&())
    }

    #[test]
    fn operator_precedence() {
        assert_eq!(eval("1+2*4").unwrap(), 9.0);
        assert_eq!(eval("5/10*2").unwrap(), 1.0);
        assert_eq!(eval("2-(3*4)").unwrap(), -10.0);
    }

    #[test]
    fn unary_rewriting_evaluates() {
        assert_eq!(eval("-1.").unwrap(), -1.0);
        assert_eq!(eval("-(2+3)").unwrap(), -5.0);
        assert_eq!(eval("+7").unwrap(), 7.0);
        assert_eq!(eval("-abs(3)").unwrap(), -3.0);
    }

    #[test]
    fn relational_encoding() {
        assert_eq!(eval("1>=1").unwrap(), 1.0);
        assert_eq!(eval("1<>2").unwrap(), 1.0);
        assert_eq!(eval("1=2").unwrap(), 0.0);
        assert_eq!(eval("2<3").unwrap(), 1.0);
        assert_eq!(eval("2<=1").unwrap(), 0.0);
        assert_eq!(eval("3>2").unwrap(), 1.0);
    }

    #[test]
    fn logical_encoding() {
        assert_eq!(eval("2 & 3 * 0").unwrap(), 0.0);
        assert_eq!(eval("0 | 3 * 10").unwrap(), 1.0);
        assert_eq!(eval("1 & 1").unwrap(), 1.0);
        assert_eq!(eval("0 | 0").unwrap(), 0.0);
    }

    #[test]
    fn builtin_if_selects_branch() {
        assert_eq!(eval("if(1, 10, 20)").unwrap(), 10.0);
        assert_eq!(eval("if(0, 10, 20)").unwrap(), 20.0);
        assert_eq!(eval("if(2>1, 1+1, 0)").unwrap(), 2.0);
    }

    #[test]
    fn builtin_not_inverts_truthiness() {
        assert_eq!(eval("not(0)").unwrap(), 1.0);
        assert_eq!(eval("not(5)").unwrap(), 0.0);
    }

    #[test]
    fn builtin_arity_is_checked_at_build_time() {
        let err = eval("if(1)").unwrap_err();
        assert_eq!(
            err,
            Error::Binding("built-in function 'if' expects 3 arguments, 1 supplied".into())
        );

        let err = eval("not(1,3)").unwrap_err();
        assert_eq!(
            err,
            Error::Binding("built-in function 'not' expects 1 arguments, 2 supplied".into())
        );
    }

    #[test]
    fn registry_functions_evaluate() {
        assert_eq!(eval("max(min(1,2),3)").unwrap(), 3.0);
        assert_eq!(eval("max(1+2, 2*3)").unwrap(), 6.0);
        assert_eq!(eval("abs((1-5)*2)").unwrap(), 8.0);
        assert_eq!(eval("Between(5, 1, 10)").unwrap(), 1.0);
    }

    #[test]
    fn unknown_function_is_a_binding_error() {
        let err = eval("nope(1)").unwrap_err();
        assert_eq!(
            err,
            Error::Binding("there is no function 'nope' with 1 parameters defined".into())
        );
    }

    #[test]
    fn function_alias_resolves_before_lookup() {
        let mut functions = registry();
        functions.add_alias("Max", "Greatest").unwrap();
        let tokens = Parser::new().parse("greatest(2, 5)").unwrap();
        let compiled = Builder::new(&functions).build(tokens).unwrap();
        assert_eq!(compiled(&()).unwrap(), 5.0);
    }

    #[test]
    fn name_without_input_is_a_binding_error() {
        assert!(matches!(eval("net * 2"), Err(Error::Binding(_))));
    }

    #[test]
    fn empty_formula_is_missing_operator() {
        assert_eq!(
            eval("").unwrap_err(),
            Error::Evaluation("too many values supplied - missing operator".into())
        );
    }

    struct Order {
        net: f64,
        quantity: f64,
    }

    fn order_surface() -> Accessors<Order> {
        Accessors::new()
            .field("Net", |o: &Order| o.net)
            .field("Quantity", |o: &Order| o.quantity)
            .alias("Net", "Amount")
            .method("Subtotal", 1, |o: &Order, args| o.net * o.quantity * args[0])
    }

    fn eval_order(input: &str, order: &Order) -> Result<f64> {
        let functions = registry();
        let tokens = Parser::new().parse(input)?;
        let compiled = Builder::new(&functions).build_typed(tokens, &order_surface())?;
        compiled(order)
    }

    #[test]
    fn typed_fields_bind_case_insensitively() {
        let order = Order {
            net: 100.0,
            quantity: 3.0,
        };
        assert_eq!(eval_order("net * quantity", &order).unwrap(), 300.0);
        assert_eq!(eval_order("NET + 1", &order).unwrap(), 101.0);
    }

    #[test]
    fn typed_fields_bind_through_aliases() {
        let order = Order {
            net: 40.0,
            quantity: 1.0,
        };
        assert_eq!(eval_order("amount / 2", &order).unwrap(), 20.0);
    }

    #[test]
    fn typed_fields_bind_inside_function_arguments() {
        let order = Order {
            net: -7.0,
            quantity: 1.0,
        };
        assert_eq!(eval_order("abs(net)", &order).unwrap(), 7.0);
    }

    #[test]
    fn unknown_field_is_a_binding_error() {
        let order = Order {
            net: 1.0,
            quantity: 1.0,
        };
        let err = eval_order("gross * 2", &order).unwrap_err();
        assert!(matches!(err, Error::Binding(_)));
        assert!(err.to_string().contains("gross"));
    }

    #[test]
    fn methods_bind_when_registry_misses() {
        let order = Order {
            net: 10.0,
            quantity: 2.0,
        };
        assert_eq!(eval_order("subtotal(0.5)", &order).unwrap(), 10.0);
    }

    #[test]
    fn registered_function_wins_over_method() {
        let mut functions = registry();
        functions.register("Subtotal", 1, |a| a[0] + 1000.0).unwrap();
        let order = Order {
            net: 10.0,
            quantity: 2.0,
        };
        let tokens = Parser::new().parse("subtotal(1)").unwrap();
        let compiled = Builder::new(&functions)
            .build_typed(tokens, &order_surface())
            .unwrap();
        assert_eq!(compiled(&order).unwrap(), 1001.0);
    }

    #[test]
    fn ambiguous_method_candidates_are_rejected() {
        let accessors = Accessors::new()
            .field("Net", |o: &Order| o.net)
            .method("Total", 1, |o: &Order, args| o.net + args[0])
            .method("toTal", 1, |o: &Order, args| o.net - args[0]);
        let functions = registry();
        let tokens = Parser::new().parse("total(1)").unwrap();
        let err = Builder::new(&functions)
            .build_typed(tokens, &accessors)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Ambiguity(_)));
        assert!(err.to_string().contains("Total"));
        assert!(err.to_string().contains("toTal"));
    }

    #[test]
    fn missing_function_and_method_names_both() {
        let order_err = eval_order("markup(1)", &Order {
            net: 1.0,
            quantity: 1.0,
        })
        .unwrap_err();
        let message = order_err.to_string();
        assert!(message.contains("no function 'markup' with 1 parameters"));
        assert!(message.contains("no method 'markup'"));
    }

    #[test]
    fn keyed_values_bind_at_runtime() {
        let functions = registry();
        let tokens = Parser::new().parse("rate * hours").unwrap();
        let compiled = Builder::new(&functions)
            .build_keyed(tokens, CaseSensitivity::Insensitive)
            .unwrap();

        let mut values = KeyedValues::new();
        values.insert("Rate".to_string(), 50.0);
        values.insert("Hours".to_string(), 8.0);
        assert_eq!(compiled(&values).unwrap(), 400.0);

        values.remove("Hours");
        assert!(matches!(compiled(&values), Err(Error::Evaluation(_))));
    }

    #[test]
    fn keyed_case_sensitive_lookup_misses_on_case() {
        let functions = registry();
        let tokens = Parser::new().parse("Rate + 0").unwrap();
        let compiled = Builder::new(&functions)
            .build_keyed(tokens, CaseSensitivity::Sensitive)
            .unwrap();

        let mut values = KeyedValues::new();
        values.insert("rate".to_string(), 1.0);
        assert!(compiled(&values).is_err());
    }

    #[test]
    fn hand_built_stream_with_missing_operand_fails() {
        let functions = FunctionsRegistry::new();
        let tokens = vec![Token::new("1").unwrap(), Token::new("+").unwrap()];
        let err = Builder::new(&functions).build(tokens).err().unwrap();
        assert_eq!(
            err,
            Error::Evaluation("insufficient data for calculation - missing operand".into())
        );
    }

    #[test]
    fn hand_built_stream_with_extra_operand_fails() {
        let functions = FunctionsRegistry::new();
        let tokens = vec![Token::new("1").unwrap(), Token::new("2").unwrap()];
        let err = Builder::new(&functions).build(tokens).err().unwrap();
        assert_eq!(
            err,
            Error::Evaluation("too many values supplied - missing operator".into())
        );
    }

    #[test]
    fn division_follows_ieee_semantics() {
        assert!(eval("1/0").unwrap().is_infinite());
    }
}
