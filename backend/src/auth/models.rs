use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::farmers::models::Farmer;

/// Identity carried inside an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub phone: String,
    pub name: String,
}

impl From<&Farmer> for AuthUser {
    fn from(farmer: &Farmer) -> Self {
        Self {
            id: farmer.id,
            phone: farmer.phone.clone(),
            name: farmer.full_name(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Farmer ID
    pub phone: String,
    pub name: String,
    pub exp: usize,
    pub iat: usize,
}
