//! The ownership guard used by every mutation path.
//!
//! Scattering `resource.owner == requester` comparisons across handlers is
//! how field-name drift creeps in, so there is exactly one place that knows
//! how the check works.

use uuid::Uuid;

use crate::error::ApiError;

/// A resource with an owning user.
pub trait Owned {
    fn owner_id(&self) -> Uuid;
}

/// Reject with Forbidden unless `requester` owns the resource. Mutation
/// paths call this before touching the store, so a rejected request leaves
/// the resource unchanged.
pub fn ensure_owner<T: Owned>(resource: &T, requester: Uuid) -> Result<(), ApiError> {
    if resource.owner_id() == requester {
        Ok(())
    } else {
        Err(ApiError::forbidden(
            "You are not allowed to modify this resource",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Resource {
        owner: Uuid,
    }

    impl Owned for Resource {
        fn owner_id(&self) -> Uuid {
            self.owner
        }
    }

    #[test]
    fn owner_passes() {
        let owner = Uuid::new_v4();
        assert!(ensure_owner(&Resource { owner }, owner).is_ok());
    }

    #[test]
    fn non_owner_is_forbidden() {
        let err = ensure_owner(&Resource { owner: Uuid::new_v4() }, Uuid::new_v4()).unwrap_err();
        assert_eq!(err.status_code(), 403);
    }
}
