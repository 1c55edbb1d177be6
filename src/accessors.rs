use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

pub type Getter<T> = Arc<dyn Fn(&T) -> f64 + Send + Sync>;
pub type MethodBody<T> = Arc<dyn Fn(&T, &[f64]) -> f64 + Send + Sync>;

/// Input values addressed by string key instead of declared fields.
pub type KeyedValues = HashMap<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseSensitivity {
    Sensitive,
    Insensitive,
}

pub(crate) fn keyed_lookup(
    values: &KeyedValues,
    name: &str,
    case: CaseSensitivity,
) -> Option<f64> {
    match case {
        CaseSensitivity::Sensitive => values.get(name).copied(),
        CaseSensitivity::Insensitive => values.get(name).copied().or_else(|| {
            values
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| *value)
        }),
    }
}

struct Field<T> {
    name: String,
    getter: Getter<T>,
}

struct Method<T> {
    name: String,
    arity: usize,
    body: MethodBody<T>,
}

/// The host-declared accessor surface for one input type: decimal-valued
/// field getters, field aliases, and decimal-returning methods. Declaration
/// never fails; the alias invariants are checked at bind time, before any
/// lookup.
pub struct Accessors<T> {
    type_name: &'static str,
    fields: Vec<Field<T>>,
    aliases: Vec<(String, String)>,
    methods: Vec<Method<T>>,
}

impl<T> Accessors<T> {
    pub fn new() -> Self {
        Accessors {
            type_name: std::any::type_name::<T>(),
            fields: Vec::new(),
            aliases: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn field<F>(mut self, name: &str, getter: F) -> Self
    where
        F: Fn(&T) -> f64 + Send + Sync + 'static,
    {
        self.fields.push(Field {
            name: name.trim().to_string(),
            getter: Arc::new(getter),
        });
        self
    }

    /// Declares an alternate name for a declared field.
    pub fn alias(mut self, field: &str, alias: &str) -> Self {
        self.aliases
            .push((alias.trim().to_string(), field.trim().to_string()));
        self
    }

    pub fn method<F>(mut self, name: &str, arity: usize, body: F) -> Self
    where
        F: Fn(&T, &[f64]) -> f64 + Send + Sync + 'static,
    {
        self.methods.push(Method {
            name: name.trim().to_string(),
            arity,
            body: Arc::new(body),
        });
        self
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Bind-time invariants: field names unique; every alias names a declared
    /// field, differs from its own field's name, and collides with no other
    /// alias and no field name.
    pub(crate) fn validate(&self) -> Result<()> {
        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i]
                .iter()
                .any(|other| other.name.eq_ignore_ascii_case(&field.name))
            {
                return Err(Error::Binding(format!(
                    "{} declares field '{}' more than once",
                    self.type_name, field.name
                )));
            }
        }

        for (i, (alias, field)) in self.aliases.iter().enumerate() {
            if !self
                .fields
                .iter()
                .any(|f| f.name.eq_ignore_ascii_case(field))
            {
                return Err(Error::Binding(format!(
                    "alias '{alias}' refers to unknown field '{field}' on {}",
                    self.type_name
                )));
            }
            if alias.eq_ignore_ascii_case(field) {
                return Err(Error::Binding(format!(
                    "alias '{alias}' duplicates the name of field '{field}'"
                )));
            }
            if self
                .fields
                .iter()
                .any(|f| f.name.eq_ignore_ascii_case(alias))
            {
                return Err(Error::Binding(format!(
                    "alias '{alias}' collides with a field of {}",
                    self.type_name
                )));
            }
            if self.aliases[..i]
                .iter()
                .any(|(other, _)| other.eq_ignore_ascii_case(alias))
            {
                return Err(Error::Binding(format!(
                    "more than one field is aliased to '{alias}'"
                )));
            }
        }

        Ok(())
    }

    /// Case-insensitive field resolution through the alias table; returns the
    /// canonical declared name and its getter.
    pub(crate) fn resolve_field(&self, name: &str) -> Option<(&str, Getter<T>)> {
        let canonical = self
            .aliases
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
            .map(|(_, field)| field.as_str())
            .unwrap_or(name);

        self.fields
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(canonical))
            .map(|field| (field.name.as_str(), field.getter.clone()))
    }

    /// All methods matching case-insensitively on name and arity. More than
    /// one match is an ambiguity reported by the builder.
    pub(crate) fn method_candidates(&self, name: &str, arity: usize) -> Vec<(&str, MethodBody<T>)> {
        self.methods
            .iter()
            .filter(|m| m.arity == arity && m.name.eq_ignore_ascii_case(name))
            .map(|m| (m.name.as_str(), m.body.clone()))
            .collect()
    }
}

impl<T> Default for Accessors<T> {
    fn default() -> Self {
        Self::new()
    }
}
