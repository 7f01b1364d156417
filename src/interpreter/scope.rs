use crate::ast::Value;
use ahash::AHashMap;

#[derive(Debug, Default)]
struct Scope {
    variables: AHashMap<String, Value>,
    /// Present on primitive scopes and the recipe scope; guard scopes have none.
    arguments: Option<AHashMap<String, Value>>,
}

/// Nested lexical scopes of a run.
///
/// Reads walk outwards from the innermost scope. Writes always bind in the
/// innermost scope and never reach into an enclosing one.
#[derive(Debug)]
pub(super) struct ScopeStack {
    scopes: Vec<Scope>,
}

impl ScopeStack {
    pub(super) fn new(parameters: AHashMap<String, Value>) -> Self {
        Self {
            scopes: vec![Scope {
                variables: AHashMap::new(),
                arguments: Some(parameters),
            }],
        }
    }

    pub(super) fn push(&mut self, arguments: Option<AHashMap<String, Value>>) {
        self.scopes.push(Scope {
            variables: AHashMap::new(),
            arguments,
        });
    }

    pub(super) fn pop(&mut self) {
        // The recipe scope lives for the whole run.
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub(super) fn get(&self, name: &str) -> Option<&Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.variables.get(name))
    }

    pub(super) fn set(&mut self, name: &str, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.variables.insert(name.to_string(), value);
        }
    }

    /// Looks up an argument of the nearest scope that has arguments.
    pub(super) fn argument(&self, name: &str) -> Option<&Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.arguments.as_ref())
            .and_then(|arguments| arguments.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_shadow_and_reads_walk_outwards() {
        let mut scopes = ScopeStack::new(AHashMap::new());
        scopes.set("x", Value::Number(1.0));
        scopes.push(None);
        assert_eq!(scopes.get("x"), Some(&Value::Number(1.0)));
        scopes.set("x", Value::Number(2.0));
        assert_eq!(scopes.get("x"), Some(&Value::Number(2.0)));
        scopes.pop();
        assert_eq!(scopes.get("x"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn guard_scopes_see_the_enclosing_primitive_arguments() {
        let mut scopes = ScopeStack::new(AHashMap::from_iter([(
            "MODE".to_string(),
            Value::from("recipe"),
        )]));
        scopes.push(Some(AHashMap::from_iter([(
            "MODE".to_string(),
            Value::from("primitive"),
        )])));
        scopes.push(None);
        assert_eq!(scopes.argument("MODE"), Some(&Value::from("primitive")));
        scopes.pop();
        scopes.pop();
        assert_eq!(scopes.argument("MODE"), Some(&Value::from("recipe")));
    }

    #[test]
    fn primitive_arguments_do_not_leak_outwards_of_their_scope() {
        let mut scopes = ScopeStack::new(AHashMap::new());
        scopes.push(Some(AHashMap::from_iter([("A".to_string(), Value::Bool(true))])));
        scopes.push(Some(AHashMap::new()));
        assert_eq!(scopes.argument("A"), None);
    }
}
