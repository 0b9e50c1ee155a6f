use billforge_core::UserId;

/// The authenticated caller of a request.
///
/// Inserted into request extensions by the auth middleware when a valid
/// bearer token is present; absent otherwise.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    user_id: UserId,
}

impl CurrentUser {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

/// Authorization subject for an optional caller: no caller is the nil user.
pub fn subject_of(user: Option<&CurrentUser>) -> UserId {
    user.map(CurrentUser::user_id).unwrap_or_else(UserId::nil)
}
