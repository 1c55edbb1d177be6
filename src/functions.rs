use crate::error::{Error, Result};
use crate::token::{is_numeric_start, is_terminal_char};
use std::collections::HashMap;
use std::sync::Arc;

/// A registered function body. The slice length always equals the arity the
/// body was registered under.
pub type FunctionBody = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// Reserved special forms, resolved by fixed semantics in the builder and
/// never shadowable by registrations or aliases.
const BUILT_INS: [(&str, usize); 2] = [("if", 3), ("not", 1)];

/// User-registered callables keyed by (arity, case-insensitive name), plus an
/// alias→canonical table shared across built-ins and registered functions.
#[derive(Default)]
pub struct FunctionsRegistry {
    functions: HashMap<usize, HashMap<String, FunctionBody>>,
    aliases: HashMap<String, String>,
}

impl FunctionsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `body` under (name, arity). Fails when the name collides
    /// with a built-in, an alias, or an existing registration of the same
    /// arity; a different arity under the same name is an overload, not a
    /// collision.
    pub fn register<F>(&mut self, name: &str, arity: usize, body: F) -> Result<&mut Self>
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        let key = valid_name(name)?;
        if builtin_arity_of(&key).is_some() {
            return Err(Error::Registration(format!(
                "'{name}' is a built-in function and cannot be redefined"
            )));
        }
        if self.aliases.contains_key(&key) {
            return Err(Error::Registration(format!(
                "'{name}' is already defined as an alias"
            )));
        }
        let functions = self.functions.entry(arity).or_default();
        if functions.contains_key(&key) {
            return Err(Error::Registration(format!(
                "there is already a function '{name}' with {arity} parameters"
            )));
        }
        functions.insert(key, Arc::new(body));
        Ok(self)
    }

    /// Binds `alias` to an already-registered function or built-in. The alias
    /// may not collide with a built-in, a registered name, or another alias.
    pub fn add_alias(&mut self, canonical: &str, alias: &str) -> Result<&mut Self> {
        let alias_key = valid_name(alias)?;
        let canonical_key = canonical.trim().to_ascii_lowercase();

        if builtin_arity_of(&canonical_key).is_none() && !self.is_registered_name(&canonical_key)
        {
            return Err(Error::Registration(format!(
                "cannot alias '{canonical}': no such function or built-in"
            )));
        }
        if builtin_arity_of(&alias_key).is_some() {
            return Err(Error::Registration(format!(
                "alias '{alias}' collides with a built-in function"
            )));
        }
        if self.is_registered_name(&alias_key) {
            return Err(Error::Registration(format!(
                "alias '{alias}' collides with a registered function"
            )));
        }
        if self.aliases.contains_key(&alias_key) {
            return Err(Error::Registration(format!(
                "alias '{alias}' is already defined"
            )));
        }

        self.aliases.insert(alias_key, canonical_key);
        Ok(self)
    }

    /// Resolves a name through the alias table; identity when unaliased.
    /// Always lowercase.
    pub fn resolve_name(&self, name: &str) -> String {
        let key = name.trim().to_ascii_lowercase();
        self.aliases.get(&key).cloned().unwrap_or(key)
    }

    /// Alias-aware lookup by name and arity.
    pub fn lookup(&self, name: &str, arity: usize) -> Option<FunctionBody> {
        let canonical = self.resolve_name(name);
        self.functions.get(&arity)?.get(&canonical).cloned()
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        self.builtin_arity(name).is_some()
    }

    pub fn builtin_arity(&self, name: &str) -> Option<usize> {
        builtin_arity_of(&name.trim().to_ascii_lowercase())
    }

    fn is_registered_name(&self, key: &str) -> bool {
        self.functions.values().any(|m| m.contains_key(key))
    }

    /// Common math functions: Min, Max, Round, Floor, Ceiling, Sqrt, Pow, Abs.
    pub fn add_math(&mut self) -> Result<&mut Self> {
        self.register("Min", 2, |a| a[0].min(a[1]))?
            .register("Min", 3, |a| a[0].min(a[1]).min(a[2]))?
            .register("Max", 2, |a| a[0].max(a[1]))?
            .register("Max", 3, |a| a[0].max(a[1]).max(a[2]))?
            .register("Round", 1, |a| a[0].round())?
            .register("Round", 2, |a| {
                let scale = 10f64.powi(a[1] as i32);
                (a[0] * scale).round() / scale
            })?
            .register("Floor", 1, |a| a[0].floor())?
            .register("Ceiling", 1, |a| a[0].ceil())?
            .register("Sqrt", 1, |a| a[0].sqrt())?
            .register("Pow", 2, |a| a[0].powf(a[1]))?
            .register("Abs", 1, |a| a[0].abs())?;
        Ok(self)
    }

    /// Range predicates encoding their result as 1/0.
    pub fn add_logical(&mut self) -> Result<&mut Self> {
        self.register("Between", 3, |a| (a[0] > a[1] && a[0] < a[2]) as i32 as f64)?
            .register("BetweenLeftInclusive", 3, |a| {
                (a[0] >= a[1] && a[0] < a[2]) as i32 as f64
            })?
            .register("BetweenRightInclusive", 3, |a| {
                (a[0] > a[1] && a[0] <= a[2]) as i32 as f64
            })?
            .register("BetweenInclusive", 3, |a| {
                (a[0] >= a[1] && a[0] <= a[2]) as i32 as f64
            })?;
        Ok(self)
    }
}

fn builtin_arity_of(key: &str) -> Option<usize> {
    BUILT_INS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, arity)| *arity)
}

/// A registrable name must survive the lexer as a single Name token: not
/// empty, no terminal characters, not starting like a numeric literal.
fn valid_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::Registration(
            "name can not be empty or white space".into(),
        ));
    }
    if trimmed.chars().any(is_terminal_char) {
        return Err(Error::Registration(format!(
            "name '{trimmed}' contains terminal characters"
        )));
    }
    if is_numeric_start(trimmed.chars().next().unwrap_or('\0')) {
        return Err(Error::Registration(format!(
            "name '{trimmed}' starts with a numeric character"
        )));
    }
    Ok(trimmed.to_ascii_lowercase())
}
