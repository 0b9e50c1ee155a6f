use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// The wildcard segment accepted in either half of a permission.
pub const WILDCARD: &str = "*";

const SEPARATOR: char = ':';

/// Kind of operation a subject wants to perform (e.g. "view", "finalize").
///
/// Actions are opaque strings; the constants below cover the CRUD verbs every
/// resource shares, and resources are free to define their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Action(Cow<'static, str>);

impl Action {
    pub const VIEW: Action = Action(Cow::Borrowed("view"));
    pub const CREATE: Action = Action(Cow::Borrowed("create"));
    pub const UPDATE: Action = Action(Cow::Borrowed("update"));
    pub const DELETE: Action = Action(Cow::Borrowed("delete"));
    pub const LIST: Action = Action(Cow::Borrowed("list"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Action {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl core::fmt::Display for Action {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An allowed action on a resource type, serialized as `"resource:action"`.
///
/// Two wildcard forms are recognised when a *granted* permission is matched
/// against a *requested* one:
/// - `"resource:*"` grants every action on that resource;
/// - `"*:*"` (superadmin) grants everything.
///
/// Equality is value equality on the serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    /// The superadmin permission: matches every resource and every action.
    pub const SUPER_ADMIN: Permission = Permission(Cow::Borrowed("*:*"));

    pub fn new(resource_type: impl AsRef<str>, action: impl AsRef<str>) -> Self {
        Self(Cow::Owned(format!(
            "{}{SEPARATOR}{}",
            resource_type.as_ref(),
            action.as_ref()
        )))
    }

    /// Wrap an already-serialized permission code (e.g. `"invoice:view"`).
    ///
    /// No validation happens here; a malformed code simply never matches
    /// anything except itself.
    pub fn from_code(code: impl Into<Cow<'static, str>>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into `(resource_type, action)`.
    ///
    /// Returns two empty strings when the separator is missing.
    pub fn parse(&self) -> (&str, &str) {
        self.0.split_once(SEPARATOR).unwrap_or(("", ""))
    }

    pub fn resource_type(&self) -> &str {
        self.parse().0
    }

    pub fn action(&self) -> &str {
        self.parse().1
    }

    pub fn is_super_admin(&self) -> bool {
        *self == Self::SUPER_ADMIN
    }

    /// Whether this (granted) permission covers `requested`.
    ///
    /// Asymmetric: `"product:*".matches("product:view")` holds, the reverse
    /// does not. No prefix or glob matching on resource names.
    pub fn matches(&self, requested: &Permission) -> bool {
        if self.is_super_admin() || self == requested {
            return true;
        }
        let (resource, action) = self.parse();
        action == WILDCARD && resource == requested.resource_type()
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
