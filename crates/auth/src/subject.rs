use core::fmt::Debug;
use core::hash::Hash;

use billforge_core::UserId;
use uuid::Uuid;

/// Identity of whoever is asking for access.
///
/// Gates, resolvers and policies are generic over this trait so the same
/// machinery works with a raw numeric id, a UUID, or a richer claims value.
/// The only structure the authorization core relies on is equality (plus
/// `Hash`, since subjects key the profile cache) and a distinguished *zero*
/// value meaning "no authenticated subject". A zero subject is never
/// authorized.
pub trait Subject: Clone + Eq + Hash + Debug + Send + Sync + 'static {
    fn is_zero(&self) -> bool;
}

macro_rules! impl_subject_for_int {
    ($($t:ty),* $(,)?) => {
        $(
            impl Subject for $t {
                fn is_zero(&self) -> bool {
                    *self == 0
                }
            }
        )*
    };
}

impl_subject_for_int!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

impl Subject for String {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl Subject for Uuid {
    fn is_zero(&self) -> bool {
        self.is_nil()
    }
}

impl Subject for UserId {
    fn is_zero(&self) -> bool {
        self.is_nil()
    }
}

impl<S: Subject> Subject for Option<S> {
    fn is_zero(&self) -> bool {
        match self {
            Some(inner) => inner.is_zero(),
            None => true,
        }
    }
}
