//! `billforge-auth`: the authorization core.
//!
//! Profiles (roles) grant `resource:action` permissions; policies decide on
//! concrete resource instances. This crate is decoupled from HTTP and storage:
//! hosts plug in a [`ProfileResolver`] and wire policies at startup.

pub mod authorize;
pub mod cache;
pub mod gate;
pub mod hybrid;
pub mod permissions;
pub mod policy;
pub mod profile;
pub mod resolver;
pub mod subject;

pub use authorize::{AuthzError, Decision, DenialKind, ProfileSummary};
pub use cache::CachedResolver;
pub use gate::Gate;
pub use hybrid::HybridGate;
pub use permissions::{Action, Permission, WILDCARD};
pub use policy::{
    AdminBypassPolicy, AdminCheck, OwnershipPolicy, Policy, Resource, SharedPolicy,
    SuperAdminCheck,
};
pub use profile::{grants, Profile, SharedProfile, StaticProfile};
pub use resolver::{ProfileResolver, ResolveError, StaticResolver};
pub use subject::Subject;
