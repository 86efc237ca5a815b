//! Per-path HTTP method allow-list.
//!
//! An allow-list maps path patterns to the verbs they accept. It is checked
//! before routing, so a disallowed verb never reaches a handler.
//!
//! A path that matches no pattern is **not restricted**: absence of an entry
//! is not a denial. Unknown paths are the router's business (`404`).
//!
//! ```rust
//! use tally::{AllowList, ErrorKind, Method};
//!
//! let mut allow = AllowList::new();
//! allow.allow("/accounts", &[Method::Get]);
//! allow.allow("/accounts/{id}", &[Method::Get, Method::Delete]);
//!
//! assert!(allow.check(Method::Get, "/accounts", true).is_ok());
//! assert!(allow.check(Method::Delete, "/accounts/42", true).is_ok());
//! assert_eq!(
//!     allow.check(Method::Post, "/accounts", true).unwrap_err().kind(),
//!     ErrorKind::MethodNotAllowed,
//! );
//! assert!(allow.check(Method::Post, "/budgets", true).is_ok());
//! ```

use matchit::Router as MatchitRouter;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::method::{Method, MethodSet};

/// Path patterns and the verbs each one accepts.
///
/// Patterns use the router's `{name}` placeholder syntax; a placeholder
/// matches exactly one segment. Patterns are compiled into a radix tree when
/// registered, so matching at request time is deterministic and allocation
/// free. Static segments take priority over placeholders.
pub struct AllowList {
    entries: Vec<(String, MethodSet)>,
    tree: MatchitRouter<MethodSet>,
}

impl AllowList {
    pub fn new() -> Self {
        Self { entries: Vec::new(), tree: MatchitRouter::new() }
    }

    /// Permits `methods` on `pattern`. Registering a pattern again adds to
    /// its set.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is not a valid route or conflicts with an existing
    /// one (e.g. `/a/{id}` next to `/a/{name}`). Allow-lists are built at
    /// startup, so this surfaces as a boot failure.
    pub fn allow(&mut self, pattern: &str, methods: &[Method]) {
        let set = MethodSet::of(methods);

        if let Some((_, existing)) = self.entries.iter_mut().find(|(p, _)| p == pattern) {
            *existing = existing.union(set);
            self.rebuild();
            return;
        }

        self.tree
            .insert(pattern, set)
            .unwrap_or_else(|e| panic!("invalid allow-list pattern `{pattern}`: {e}"));
        self.entries.push((pattern.to_owned(), set));
    }

    /// The verbs permitted on `path`, or `None` if no pattern matches.
    pub fn permitted(&self, path: &str) -> Option<MethodSet> {
        self.tree.at(path).ok().map(|matched| *matched.value)
    }

    /// Rejects `method` on `path` if a pattern matches and does not list it.
    ///
    /// `verbose` puts the method and path in the message; production
    /// deployments pass `false` and get a generic one.
    pub fn check(&self, method: Method, path: &str, verbose: bool) -> Result<(), AppError> {
        let Some(permitted) = self.permitted(path) else {
            debug!(%path, "no allow-list entry, passing through");
            return Ok(());
        };

        if permitted.contains(method) {
            return Ok(());
        }

        warn!(%method, %path, allowed = %permitted, "method not allowed");
        if verbose {
            Err(AppError::method_not_allowed(format!("{method} method not allowed for {path}")))
        } else {
            Err(AppError::method_not_allowed("Method not allowed"))
        }
    }

    fn rebuild(&mut self) {
        let mut tree = MatchitRouter::new();
        for (pattern, set) in &self.entries {
            tree.insert(pattern.as_str(), *set)
                .unwrap_or_else(|e| panic!("invalid allow-list pattern `{pattern}`: {e}"));
        }
        self.tree = tree;
    }
}

impl Default for AllowList {
    fn default() -> Self { Self::new() }
}
