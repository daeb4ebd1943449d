use serde::{Deserialize, Serialize};

/// Access-token payload issued by the campus identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,           // identity provider user id
    pub iat: usize,            // issued at (unix timestamp)
    pub exp: usize,            // expires at (unix timestamp)
    pub iss: String,           // issuer
    pub aud: String,           // audience
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>, // verified account email
}
