use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

/// Profile step value written once the onboarding flow has been finished.
pub const PROFILE_COMPLETED: &str = "completed";

/// Session
///
/// The authenticated-user context resolved from request headers by the external
/// auth service. Created and destroyed entirely upstream; the gate only reads it,
/// once per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Session {
    /// Opaque user identifier. Present iff the request is authenticated.
    pub user_id: String,
    pub email: String,
    pub email_verified: bool,
    /// Onboarding progress marker, notably the sentinel [`PROFILE_COMPLETED`].
    pub profile_step: String,
}

impl Session {
    pub fn has_completed_profile(&self) -> bool {
        self.profile_step == PROFILE_COMPLETED
    }
}

/// MessageBody
///
/// JSON body used for every response the gate produces itself
/// (abuse-shield denials and internal errors).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
