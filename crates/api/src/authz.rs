//! Request-level authorization: the [`AuthGate`] facade and the gating
//! middleware built on it.
//!
//! Handlers that work on a loaded record call [`AuthGate::authorize`] with
//! the instance (role check, then the resource type's policy). Routes with
//! no instance yet (list, create) are gated by [`require_permission`]; the
//! admin area by [`require_admin`].

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::MethodRouter,
};

use billforge_auth::{
    Action, AdminBypassPolicy, AuthzError, CachedResolver, Decision, HybridGate, OwnershipPolicy,
    Permission, Policy, ProfileResolver, ResolveError, Resource, SuperAdminCheck,
};
use billforge_core::UserId;

use crate::app::errors::{authz_error_to_response, json_error};
use crate::context::{subject_of, CurrentUser};

/// Cached user → profile lookup shared by the gate and the admin check.
pub type ProfileCache = CachedResolver<UserId, Arc<dyn ProfileResolver<UserId>>>;

/// The application's authorization entry point.
///
/// Wraps a [`HybridGate`] over a TTL-cached resolver and substitutes the nil
/// user when a request carries no [`CurrentUser`].
pub struct AuthGate {
    cache: Arc<ProfileCache>,
    gate: HybridGate<UserId, Arc<ProfileCache>>,
}

impl AuthGate {
    pub fn new(resolver: impl ProfileResolver<UserId> + 'static, cache_ttl: Duration) -> Self {
        let resolver: Arc<dyn ProfileResolver<UserId>> = Arc::new(resolver);
        let cache = Arc::new(CachedResolver::new(resolver, cache_ttl));
        Self {
            gate: HybridGate::new(cache.clone()),
            cache,
        }
    }

    pub fn register_policy(&self, resource_type: impl Into<String>, policy: impl Policy<UserId> + 'static) {
        self.gate.register(resource_type, policy);
    }

    /// Owners only, with `*:*` profiles let through.
    pub fn register_owned(&self, resource_type: impl Into<String>) {
        let policy = AdminBypassPolicy::new(OwnershipPolicy, SuperAdminCheck::new(self.cache.clone()));
        self.gate.register(resource_type, policy);
    }

    pub fn registered_types(&self) -> Vec<String> {
        self.gate.registered_types()
    }

    pub async fn authorize(
        &self,
        user: Option<&CurrentUser>,
        action: &Action,
        resource_type: &str,
        resource: Option<&dyn Resource<UserId>>,
    ) -> Result<(), AuthzError> {
        self.gate
            .authorize(&subject_of(user), action, resource_type, resource)
            .await
    }

    pub async fn can(
        &self,
        user: Option<&CurrentUser>,
        action: &Action,
        resource_type: &str,
        resource: Option<&dyn Resource<UserId>>,
    ) -> bool {
        self.authorize(user, action, resource_type, resource).await.is_ok()
    }

    /// Role-only check for UI affordances. Not a gate for mutations.
    pub async fn can_profile(&self, user: Option<&CurrentUser>, action: &Action, resource_type: &str) -> bool {
        self.gate
            .can_profile(&subject_of(user), action, resource_type)
            .await
    }

    pub async fn explain(
        &self,
        subject: UserId,
        action: &Action,
        resource_type: &str,
        resource: Option<&dyn Resource<UserId>>,
    ) -> Decision {
        self.gate.explain(&subject, action, resource_type, resource).await
    }

    /// Whether `user`'s profile grants `*:*`.
    ///
    /// Unlike the policies, a backend failure is returned to the caller
    /// instead of counting as "no". An unknown user is simply not an admin.
    pub async fn is_admin(&self, user: UserId) -> Result<bool, ResolveError> {
        match self.cache.resolve(&user).await {
            Ok(profile) => {
                Ok(profile.is_some_and(|profile| profile.has_permission(&Permission::SUPER_ADMIN)))
            }
            Err(ResolveError::SubjectNotFound) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Call after changing `user`'s profile assignment.
    pub fn invalidate_user(&self, user: UserId) {
        self.cache.invalidate(&user);
    }

    /// Call after changing any profile's permission set.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn cache(&self) -> &ProfileCache {
        &self.cache
    }
}

/// State for [`require_permission`].
#[derive(Clone)]
pub struct PermissionGuard {
    gate: Arc<AuthGate>,
    resource_type: &'static str,
    action: Action,
}

impl PermissionGuard {
    pub fn new(gate: Arc<AuthGate>, resource_type: &'static str, action: Action) -> Self {
        Self {
            gate,
            resource_type,
            action,
        }
    }
}

/// Put `route` behind [`require_permission`] for `resource_type:action`.
pub fn guarded(
    route: MethodRouter,
    gate: &Arc<AuthGate>,
    resource_type: &'static str,
    action: Action,
) -> MethodRouter {
    route.route_layer(middleware::from_fn_with_state(
        PermissionGuard::new(gate.clone(), resource_type, action),
        require_permission,
    ))
}

/// Reject with 401 when nobody is signed in and 403 when the caller's profile
/// does not grant `resource_type:action`.
pub async fn require_permission(
    State(guard): State<PermissionGuard>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let user = req.extensions().get::<CurrentUser>().copied();
    if let Err(err) = guard
        .gate
        .authorize(user.as_ref(), &guard.action, guard.resource_type, None)
        .await
    {
        return authz_error_to_response(user.as_ref(), err);
    }
    next.run(req).await
}

/// Only users whose profile grants `*:*` get through.
///
/// A profile lookup failure is a 500, not a denial.
pub async fn require_admin(
    State(gate): State<Arc<AuthGate>>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(user) = req.extensions().get::<CurrentUser>().copied() else {
        return json_error(StatusCode::UNAUTHORIZED, "unauthenticated", "authentication required");
    };

    match gate.is_admin(user.user_id()).await {
        Ok(true) => next.run(req).await,
        Ok(false) => json_error(StatusCode::FORBIDDEN, "forbidden", "administrator access required"),
        Err(err) => {
            tracing::error!(user_id = %user.user_id(), error = %err, "admin check failed");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "authz_unavailable",
                "authorization is temporarily unavailable",
            )
        }
    }
}
