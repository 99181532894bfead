//! Lookups answered by other bounded contexts.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{GatewayResult, ROLE_LOOKUP_ROUTE, RequestGateway, TAG_NUMBER_ROUTE};
use crate::state::round::{TagNumber, UserId};

/// Request body shared by every lookup: the identity being resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRequest {
    /// Identity to resolve.
    pub user_id: UserId,
}

/// Response body of a lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LookupResponse<T> {
    /// The owning context knows the identity.
    Found {
        /// Identity that was resolved.
        user_id: UserId,
        /// Resolved value.
        value: T,
    },
    /// The owning context has no value for the identity.
    NotFound {
        /// Identity that was looked up.
        user_id: UserId,
    },
}

impl<T> LookupResponse<T> {
    /// The resolved value, if any.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Found { value, .. } => Some(value),
            Self::NotFound { .. } => None,
        }
    }
}

/// Permission role owned by the user context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Full control over every round.
    Admin,
    /// May edit rounds and correct scores.
    Editor,
    /// Regular member.
    User,
}

impl UserRole {
    /// Whether the role may manage rounds created by someone else.
    pub fn can_manage_rounds(self) -> bool {
        matches!(self, Self::Admin | Self::Editor)
    }
}

/// Resolves a participant's ranking tag.
pub trait TagLookup: Send + Sync {
    /// `Ok(None)` when the leaderboard has no tag for the user.
    fn tag_number(&self, user_id: &UserId) -> BoxFuture<'static, GatewayResult<Option<TagNumber>>>;
}

/// Resolves a requestor's permission role.
pub trait RoleLookup: Send + Sync {
    /// `Ok(None)` when the user context does not know the user.
    fn role(&self, user_id: &UserId) -> BoxFuture<'static, GatewayResult<Option<UserRole>>>;
}

/// [`TagLookup`] and [`RoleLookup`] over a [`RequestGateway`].
#[derive(Clone)]
pub struct GatewayLookups {
    gateway: RequestGateway,
}

impl GatewayLookups {
    /// Wrap a gateway.
    pub fn new(gateway: RequestGateway) -> Self {
        Self { gateway }
    }
}

impl TagLookup for GatewayLookups {
    fn tag_number(&self, user_id: &UserId) -> BoxFuture<'static, GatewayResult<Option<TagNumber>>> {
        let gateway = self.gateway.clone();
        let request = LookupRequest {
            user_id: user_id.clone(),
        };
        Box::pin(async move {
            let context = format!("tag number for {}", request.user_id);
            let response: LookupResponse<TagNumber> =
                gateway.request(TAG_NUMBER_ROUTE, &request, context).await?;
            Ok(response.into_value())
        })
    }
}

impl RoleLookup for GatewayLookups {
    fn role(&self, user_id: &UserId) -> BoxFuture<'static, GatewayResult<Option<UserRole>>> {
        let gateway = self.gateway.clone();
        let request = LookupRequest {
            user_id: user_id.clone(),
        };
        Box::pin(async move {
            let context = format!("role for {}", request.user_id);
            let response: LookupResponse<UserRole> =
                gateway.request(ROLE_LOOKUP_ROUTE, &request, context).await?;
            Ok(response.into_value())
        })
    }
}
