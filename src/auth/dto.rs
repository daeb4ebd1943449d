use serde::{Deserialize, Serialize};

use crate::store::{Profile, Role};

/// Request body for completing the caller's profile.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: String,
    pub roll_no: Option<String>,
    pub department: Option<String>,
    pub mobile: Option<String>,
}

/// Request body for changing someone's role.
#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub email: String,
    pub role: Role,
}

/// Profile as returned to the client.
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub profile: Profile,
    pub profile_complete: bool,
}

impl From<Profile> for ProfileResponse {
    fn from(profile: Profile) -> Self {
        Self {
            profile_complete: profile.is_complete(),
            profile,
        }
    }
}
