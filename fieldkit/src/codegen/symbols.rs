use super::types::TypeId;
use std::collections::HashMap;

/// Symbol table for tracking local variable types during inference.
///
/// Scopes nest: a lookup walks from the innermost block outwards, and a
/// name declared in an inner block shadows the outer one until the block
/// is popped.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<HashMap<String, TypeId>>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Leaves the innermost scope. The outermost scope is never popped.
    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Define a variable in the current scope.
    pub fn define_var(&mut self, name: &str, ty: TypeId) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), ty);
        }
    }

    /// Look up a variable's type.
    pub fn lookup_var(&self, name: &str) -> Option<TypeId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::types::{Type, TypeStore};

    #[test]
    fn inner_scope_shadows_and_pops() {
        let mut store = TypeStore::new();
        let outer = store.new_known(Type::Int);
        let inner = store.new_known(Type::Bool);

        let mut symbols = SymbolTable::new();
        symbols.define_var("x", outer);
        symbols.push_scope();
        symbols.define_var("x", inner);
        assert_eq!(symbols.lookup_var("x"), Some(inner));
        symbols.pop_scope();
        assert_eq!(symbols.lookup_var("x"), Some(outer));
        assert_eq!(symbols.lookup_var("y"), None);
    }
}
