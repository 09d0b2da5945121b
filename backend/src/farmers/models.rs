use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::validation;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferredLanguage {
    En,
    #[default]
    Kn,
}

impl PreferredLanguage {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "en" => Some(Self::En),
            "kn" => Some(Self::Kn),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Farmer {
    pub id: Uuid,
    pub phone: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub district: String,
    pub taluk: String,
    pub village: String,
    pub land_size: Option<f64>,
    pub crops_grown: Vec<String>,
    pub preferred_language: PreferredLanguage,
    pub is_verified: bool,
    pub is_active: bool,
    pub password_hash: String,
    pub otp: Option<String>,
    pub otp_created_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Farmer {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Deserialize, Default, Validate)]
pub struct RegistrationRequest {
    #[validate(
        required(message = "This field is required."),
        custom(function = "validation::valid_phone")
    )]
    pub phone: Option<String>,
    #[validate(
        required(message = "This field is required."),
        email(message = "Enter a valid email address.")
    )]
    pub email: Option<String>,
    #[validate(
        required(message = "This field is required."),
        custom(function = "validation::not_blank"),
        length(max = 150)
    )]
    pub first_name: Option<String>,
    #[validate(length(max = 150))]
    pub last_name: Option<String>,
    #[validate(
        required(message = "This field is required."),
        custom(function = "validation::strong_password")
    )]
    pub password: Option<String>,
    #[validate(
        required(message = "This field is required."),
        custom(function = "validation::not_blank")
    )]
    pub password2: Option<String>,
    #[validate(
        required(message = "This field is required."),
        custom(function = "validation::not_blank"),
        length(max = 100)
    )]
    pub district: Option<String>,
    #[validate(
        required(message = "This field is required."),
        custom(function = "validation::not_blank"),
        length(max = 100)
    )]
    pub taluk: Option<String>,
    #[validate(
        required(message = "This field is required."),
        custom(function = "validation::not_blank"),
        length(max = 100)
    )]
    pub village: Option<String>,
    #[validate(range(min = 0.0, message = "Ensure this value is greater than or equal to 0."))]
    pub land_size: Option<f64>,
    pub crops_grown: Option<Vec<String>>,
    #[validate(custom(function = "validation::valid_language"))]
    pub preferred_language: Option<String>,
}

#[derive(Debug, Deserialize, Default, Validate)]
pub struct LoginRequest {
    #[validate(
        required(message = "This field is required."),
        custom(function = "validation::not_blank")
    )]
    pub phone: Option<String>,
    #[validate(
        required(message = "This field is required."),
        custom(function = "validation::not_blank")
    )]
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct SendOtpRequest {
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct VerifyOtpRequest {
    pub phone: Option<String>,
    pub otp: Option<String>,
}

/// Partial profile update. Phone, verification state and timestamps are
/// not writable through it.
#[derive(Debug, Deserialize, Default, Validate)]
pub struct ProfileUpdate {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,
    #[validate(custom(function = "validation::not_blank"), length(max = 150))]
    pub first_name: Option<String>,
    #[validate(length(max = 150))]
    pub last_name: Option<String>,
    #[validate(custom(function = "validation::not_blank"), length(max = 100))]
    pub district: Option<String>,
    #[validate(custom(function = "validation::not_blank"), length(max = 100))]
    pub taluk: Option<String>,
    #[validate(custom(function = "validation::not_blank"), length(max = 100))]
    pub village: Option<String>,
    #[validate(range(min = 0.0, message = "Ensure this value is greater than or equal to 0."))]
    pub land_size: Option<f64>,
    pub crops_grown: Option<Vec<String>>,
    #[validate(custom(function = "validation::valid_language"))]
    pub preferred_language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FarmerProfile {
    pub id: Uuid,
    pub phone: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub district: String,
    pub taluk: String,
    pub village: String,
    pub land_size: Option<f64>,
    pub crops_grown: Vec<String>,
    pub preferred_language: PreferredLanguage,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Farmer> for FarmerProfile {
    fn from(farmer: &Farmer) -> Self {
        Self {
            id: farmer.id,
            phone: farmer.phone.clone(),
            email: farmer.email.clone(),
            first_name: farmer.first_name.clone(),
            last_name: farmer.last_name.clone(),
            district: farmer.district.clone(),
            taluk: farmer.taluk.clone(),
            village: farmer.village.clone(),
            land_size: farmer.land_size,
            crops_grown: farmer.crops_grown.clone(),
            preferred_language: farmer.preferred_language,
            is_verified: farmer.is_verified,
            created_at: farmer.created_at,
        }
    }
}

/// Farmer summary returned alongside a login token.
#[derive(Debug, Serialize)]
pub struct LoginFarmer {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub district: String,
    pub village: String,
    pub preferred_language: PreferredLanguage,
}

impl From<&Farmer> for LoginFarmer {
    fn from(farmer: &Farmer) -> Self {
        Self {
            id: farmer.id,
            name: farmer.full_name(),
            phone: farmer.phone.clone(),
            email: farmer.email.clone(),
            district: farmer.district.clone(),
            village: farmer.village.clone(),
            preferred_language: farmer.preferred_language,
        }
    }
}
