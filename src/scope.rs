//! Scope matching for middleware and error handlers.
//!
//! A scope is either `"*"` (every method) or a dot-qualified prefix of
//! fully-qualified method names: a package (`"testapp"`), a service
//! (`"testapp.PersonService"`) or a single method
//! (`"testapp.PersonService.getPerson"`).
//!
//! Matching is a literal string prefix test, not segment-aware:
//! `"testapp.Person"` also matches `"testapp.PersonService.getPerson"`.

use std::sync::Arc;

/// Scope matching every method.
pub const GLOBAL_SCOPE: &str = "*";

/// A handler registered under a scope.
pub struct ScopedEntry<H: ?Sized> {
    pub scope: String,
    pub handler: Arc<H>,
}

impl<H: ?Sized> ScopedEntry<H> {
    pub fn new(scope: impl Into<String>, handler: Arc<H>) -> Self {
        Self {
            scope: scope.into(),
            handler,
        }
    }

    /// True if this entry applies to `method`.
    #[inline]
    pub fn applies_to(&self, method: &str) -> bool {
        matches(&self.scope, method)
    }
}

impl<H: ?Sized> Clone for ScopedEntry<H> {
    fn clone(&self) -> Self {
        Self {
            scope: self.scope.clone(),
            handler: self.handler.clone(),
        }
    }
}

impl<H: ?Sized> std::fmt::Debug for ScopedEntry<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedEntry").field("scope", &self.scope).finish()
    }
}

/// True if `scope` selects the fully-qualified `method`.
#[inline]
pub fn matches(scope: &str, method: &str) -> bool {
    scope == GLOBAL_SCOPE || method.starts_with(scope)
}

/// Entries applying to `method`, in registration order.
pub fn filter_for_method<H: ?Sized>(entries: &[ScopedEntry<H>], method: &str) -> Arc<[ScopedEntry<H>]> {
    entries
        .iter()
        .filter(|entry| entry.applies_to(method))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const METHOD: &str = "testapp.PersonService.getPerson";

    #[test]
    fn test_global_scope() {
        assert!(matches("*", METHOD));
        assert!(matches("*", "anything"));
    }

    #[test]
    fn test_package_service_method_scopes() {
        assert!(matches("testapp", METHOD));
        assert!(matches("testapp.PersonService", METHOD));
        assert!(matches(METHOD, METHOD));
        assert!(!matches("testapp.PersonService.getPeople", METHOD));
        assert!(!matches("otherapp", METHOD));
    }

    #[test]
    fn test_prefix_is_not_segment_aware() {
        assert!(matches("testapp.Person", METHOD));
        assert!(matches("testapp.PersonService", "testapp.PersonServiceX.foo"));
    }

    #[test]
    fn test_filter_keeps_registration_order() {
        let entries: Vec<ScopedEntry<str>> = vec![
            ScopedEntry::new("*", Arc::from("first")),
            ScopedEntry::new("otherapp", Arc::from("skipped")),
            ScopedEntry::new("testapp.PersonService", Arc::from("second")),
            ScopedEntry::new("*", Arc::from("third")),
        ];

        let filtered = filter_for_method(&entries, METHOD);
        let names: Vec<&str> = filtered.iter().map(|e| &*e.handler).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }
}
