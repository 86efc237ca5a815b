//! HTTP method as a typed enum, plus a compact set of methods.
//!
//! Only the RFC 9110 methods are known. Anything else is answered with
//! `405 Method Not Allowed` by the server before it reaches the router.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A known HTTP method.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Method {
    Connect,
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
    Trace,
}

impl Method {
    /// Every known method, in declaration order.
    pub const ALL: [Method; 9] = [
        Self::Connect,
        Self::Delete,
        Self::Get,
        Self::Head,
        Self::Options,
        Self::Patch,
        Self::Post,
        Self::Put,
        Self::Trace,
    ];

    /// Returns the uppercase wire representation (e.g. `"GET"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Delete  => "DELETE",
            Self::Get     => "GET",
            Self::Head    => "HEAD",
            Self::Options => "OPTIONS",
            Self::Patch   => "PATCH",
            Self::Post    => "POST",
            Self::Put     => "PUT",
            Self::Trace   => "TRACE",
        }
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// Returned when a method string is not one of the RFC 9110 methods.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown HTTP method `{0}`")]
pub struct UnknownMethod(pub String);

/// Parses an uppercase method string (e.g. `"GET"`). Case-sensitive per RFC 9110 §9.1.
impl FromStr for Method {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" => Ok(Self::Connect),
            "DELETE"  => Ok(Self::Delete),
            "GET"     => Ok(Self::Get),
            "HEAD"    => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "PATCH"   => Ok(Self::Patch),
            "POST"    => Ok(Self::Post),
            "PUT"     => Ok(Self::Put),
            "TRACE"   => Ok(Self::Trace),
            other     => Err(UnknownMethod(other.to_owned())),
        }
    }
}

impl TryFrom<&http::Method> for Method {
    type Error = UnknownMethod;

    fn try_from(method: &http::Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── MethodSet ─────────────────────────────────────────────────────────────────

/// A set of [`Method`]s, one bit per method.
///
/// Used by the allow-list: `Copy`, no allocation, O(1) membership.
///
/// ```rust
/// use tally::{Method, MethodSet};
///
/// let set = MethodSet::of(&[Method::Get, Method::Post]);
/// assert!(set.contains(Method::Get));
/// assert!(!set.contains(Method::Delete));
/// assert_eq!(set.to_string(), "GET, POST");
/// ```
#[derive(Clone, Copy, Default, Eq, PartialEq)]
pub struct MethodSet(u16);

impl MethodSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn of(methods: &[Method]) -> Self {
        methods.iter().copied().collect()
    }

    pub fn insert(&mut self, method: Method) {
        self.0 |= method.bit();
    }

    pub fn contains(self, method: Method) -> bool {
        self.0 & method.bit() != 0
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Members in declaration order.
    pub fn iter(self) -> impl Iterator<Item = Method> {
        Method::ALL.into_iter().filter(move |m| self.contains(*m))
    }
}

impl FromIterator<Method> for MethodSet {
    fn from_iter<I: IntoIterator<Item = Method>>(iter: I) -> Self {
        let mut set = Self::empty();
        for method in iter {
            set.insert(method);
        }
        set
    }
}

/// Comma-separated, the format of an `Allow` header.
impl fmt::Display for MethodSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, method) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(method.as_str())?;
        }
        Ok(())
    }
}

impl fmt::Debug for MethodSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_methods_case_sensitively() {
        for method in Method::ALL {
            assert_eq!(method.as_str().parse::<Method>(), Ok(method));
        }
        assert_eq!("get".parse::<Method>(), Err(UnknownMethod("get".into())));
        assert!("PURGE".parse::<Method>().is_err());
    }

    #[test]
    fn converts_from_http_method() {
        assert_eq!(Method::try_from(&http::Method::DELETE), Ok(Method::Delete));
        let custom = http::Method::from_bytes(b"PROPFIND").unwrap();
        assert!(Method::try_from(&custom).is_err());
    }

    #[test]
    fn set_membership_and_union() {
        let reads = MethodSet::of(&[Method::Get, Method::Head]);
        let writes = MethodSet::of(&[Method::Post]);
        let all = reads.union(writes);

        assert!(all.contains(Method::Head));
        assert!(all.contains(Method::Post));
        assert!(!reads.contains(Method::Post));
        assert!(MethodSet::empty().is_empty());
        assert_eq!(all.iter().count(), 3);
    }

    #[test]
    fn set_display_follows_declaration_order() {
        let set = MethodSet::of(&[Method::Put, Method::Delete, Method::Get]);
        assert_eq!(set.to_string(), "DELETE, GET, PUT");
        assert_eq!(MethodSet::empty().to_string(), "");
    }
}
