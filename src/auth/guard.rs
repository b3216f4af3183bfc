use crate::auth::claims::{Claims, Role};
use crate::error::{AppError, NOT_AUTHORIZED_MESSAGE};

/// Identifies who owns a resource. Call sites know either the owner's
/// username or numeric id, so both forms are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOwner<'a> {
    Name(&'a str),
    Id(i64),
}

impl From<i64> for ResourceOwner<'_> {
    fn from(id: i64) -> Self {
        ResourceOwner::Id(id)
    }
}

impl<'a> From<&'a str> for ResourceOwner<'a> {
    fn from(name: &'a str) -> Self {
        ResourceOwner::Name(name)
    }
}

impl ResourceOwner<'_> {
    /// Compared against both `sub` and `id`.
    fn matches(&self, claims: &Claims) -> bool {
        match *self {
            ResourceOwner::Id(id) => claims.id == Some(id) || claims.sub == id.to_string(),
            ResourceOwner::Name(name) => {
                claims.sub == name || claims.id.map(|id| id.to_string()).as_deref() == Some(name)
            }
        }
    }
}

/// Passes only when the caller's role is exactly `role`.
pub fn require_role(claims: &Claims, role: Role) -> Result<(), AppError> {
    if claims.has_role(role) {
        Ok(())
    } else {
        Err(AppError::Forbidden("Insufficient permissions".into()))
    }
}

/// Passes for admins and for the resource's owner.
pub fn require_ownership_or_admin<'a>(
    owner: impl Into<ResourceOwner<'a>>,
    claims: &Claims,
) -> Result<(), AppError> {
    if claims.has_role(Role::Admin) || owner.into().matches(claims) {
        Ok(())
    } else {
        Err(AppError::Forbidden(NOT_AUTHORIZED_MESSAGE.into()))
    }
}
