//! Method authorization.

use super::{MethodDescriptor, OBJECT_CLASS};
use core::fmt;

/// Decides whether a resolved method may be invoked from a query.
///
/// The engine consults the authorizer once per distinct binding per query run and
/// caches the answer for the rest of that run.
pub trait MethodAuthorizer: Send + Sync + fmt::Debug {
    /// Returns true if `method`, invoked on an instance of `receiver_class`, is allowed.
    fn authorize(&self, receiver_class: &str, method: &MethodDescriptor) -> bool;
}

/// Allows every method.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAllAuthorizer;

impl MethodAuthorizer for AllowAllAuthorizer {
    fn authorize(&self, _receiver_class: &str, _method: &MethodDescriptor) -> bool {
        true
    }
}

const BUILTIN_CLASSES: &[&str] = &[
    OBJECT_CLASS,
    "String",
    "Number",
    "Integer",
    "Long",
    "Double",
    "Boolean",
    "Collection",
    "Entry",
    "Region",
];

/// Allows built-in methods and, on user classes, only no-argument
/// `get*`/`is*` accessors.
#[derive(Clone, Copy, Debug, Default)]
pub struct RestrictedAuthorizer;

impl MethodAuthorizer for RestrictedAuthorizer {
    fn authorize(&self, _receiver_class: &str, method: &MethodDescriptor) -> bool {
        if BUILTIN_CLASSES.contains(&method.declaring_class()) {
            return true;
        }
        let name = method.name();
        method.params().is_empty()
            && ((name.len() > 3 && name.starts_with("get")) || (name.len() > 2 && name.starts_with("is")))
    }
}

#[cfg(test)]
mod tests {
    use super::super::{ClassDescriptor, TypeRegistry};
    use super::*;
    use tessera_core::{ObjectType, Value};

    #[test]
    fn test_restricted_authorizer() {
        let class = ClassDescriptor::new("Account")
            .method("getBalance", [], |_, _| Ok(Value::Int(1)))
            .method("isOpen", [], |_, _| Ok(Value::Boolean(true)))
            .method("close", [], |_, _| Ok(Value::Null))
            .method("getRate", [ObjectType::Int], |_, _| Ok(Value::Null));
        let auth = RestrictedAuthorizer;
        let allowed: Vec<bool> = class
            .methods()
            .iter()
            .map(|m| auth.authorize("Account", m))
            .collect();
        assert_eq!(allowed, vec![true, true, false, false]);

        let registry = TypeRegistry::new();
        let length = &registry.class("String").unwrap().methods()[1];
        assert!(auth.authorize("String", length));
        assert!(AllowAllAuthorizer.authorize("Account", &class.methods()[2]));
    }
}
