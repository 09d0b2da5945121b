use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::models::{
    Farmer, FarmerProfile, LoginFarmer, LoginRequest, PreferredLanguage, ProfileUpdate,
    RegistrationRequest, SendOtpRequest, VerifyOtpRequest,
};
use super::{otp, password, validation};
use crate::auth::jwt::JwtService;
use crate::auth::models::AuthUser;
use crate::db::repository::{AnalysisRepository, FarmerRepository, RepositoryError};
use crate::error::{field_errors, AppError, FieldErrors};

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub farmer: LoginFarmer,
}

/// Trimmed text of a field the request validation has already accepted.
fn text(value: Option<String>) -> String {
    value.unwrap_or_default().trim().to_string()
}

fn add_error(errors: &mut FieldErrors, field: &str, message: &str) {
    errors
        .entry(field.to_string())
        .or_default()
        .push(message.to_string());
}

fn language_or_default(raw: Option<&str>) -> Result<PreferredLanguage, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(PreferredLanguage::default()),
        Some(raw) => validation::parse_language(raw)
            .map_err(|message| AppError::field("preferred_language", message)),
    }
}

fn conflict_to_field(err: RepositoryError) -> AppError {
    match err {
        RepositoryError::Conflict(field) if field == "phone" => {
            AppError::field("phone", "Farmer with this phone already exists.")
        }
        RepositoryError::Conflict(field) if field == "email" => {
            AppError::field("email", "Farmer with this email already exists.")
        }
        other => AppError::Repository(other),
    }
}

fn clean_crops(crops: Vec<String>) -> Vec<String> {
    crops
        .into_iter()
        .map(|crop| crop.trim().to_string())
        .filter(|crop| !crop.is_empty())
        .collect()
}

pub struct FarmerService {
    farmers: Arc<dyn FarmerRepository>,
    analyses: Arc<dyn AnalysisRepository>,
    jwt: JwtService,
}

impl FarmerService {
    pub fn new(
        farmers: Arc<dyn FarmerRepository>,
        analyses: Arc<dyn AnalysisRepository>,
        jwt: JwtService,
    ) -> Self {
        Self {
            farmers,
            analyses,
            jwt,
        }
    }

    pub async fn register(&self, request: RegistrationRequest) -> Result<Farmer, AppError> {
        let mut errors = match request.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => field_errors(&e),
        };
        if let (Some(password), Some(password2)) = (&request.password, &request.password2) {
            if password != password2 {
                add_error(&mut errors, "password", "Passwords don't match");
            }
        }
        if !errors.is_empty() {
            return Err(AppError::InvalidFields(errors));
        }

        let phone = validation::normalize_phone(&text(request.phone))
            .map_err(|message| AppError::field("phone", message))?;
        let email = validation::normalize_email(&text(request.email));
        let preferred_language = language_or_default(request.preferred_language.as_deref())?;
        let password = request.password.unwrap_or_default();

        let mut duplicates = FieldErrors::new();
        if self.farmers.get_farmer_by_phone(&phone).await?.is_some() {
            add_error(&mut duplicates, "phone", "Farmer with this phone already exists.");
        }
        if self.farmers.get_farmer_by_email(&email).await?.is_some() {
            add_error(&mut duplicates, "email", "Farmer with this email already exists.");
        }
        if !duplicates.is_empty() {
            return Err(AppError::InvalidFields(duplicates));
        }
        let password_hash = password::hash_password(&password)
            .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))?;

        let now = Utc::now();
        let farmer = Farmer {
            id: Uuid::new_v4(),
            phone,
            email,
            first_name: text(request.first_name),
            last_name: text(request.last_name),
            district: text(request.district),
            taluk: text(request.taluk),
            village: text(request.village),
            land_size: request.land_size,
            crops_grown: clean_crops(request.crops_grown.unwrap_or_default()),
            preferred_language,
            is_verified: true,
            is_active: true,
            password_hash,
            otp: None,
            otp_created_at: None,
            created_at: now,
            updated_at: now,
        };
        self.farmers
            .create_farmer(&farmer)
            .await
            .map_err(conflict_to_field)?;

        log::info!("Registered farmer {} ({})", farmer.id, farmer.phone);
        Ok(farmer)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<LoginResponse, AppError> {
        request.validate()?;
        let phone = text(request.phone);
        let password = request.password.unwrap_or_default();

        let invalid = || AppError::field("non_field_errors", "Invalid credentials");
        let Ok(phone) = validation::normalize_phone(&phone) else {
            return Err(invalid());
        };
        let farmer = self
            .farmers
            .get_farmer_by_phone(&phone)
            .await?
            .ok_or_else(invalid)?;
        if !password::verify_password(&password, &farmer.password_hash) {
            log::warn!("Failed login for farmer {}", farmer.id);
            return Err(invalid());
        }

        let access_token = self
            .jwt
            .generate_token(&AuthUser::from(&farmer))
            .map_err(|e| AppError::Internal(e.to_string()))?;

        log::info!("Farmer {} logged in", farmer.id);
        Ok(LoginResponse {
            access_token,
            farmer: LoginFarmer::from(&farmer),
        })
    }

    async fn farmer_by_phone(&self, raw: &str) -> Result<Farmer, AppError> {
        let not_found = || AppError::NotFound("Farmer not found".into());
        let Ok(phone) = validation::normalize_phone(raw) else {
            return Err(not_found());
        };
        self.farmers
            .get_farmer_by_phone(&phone)
            .await?
            .ok_or_else(not_found)
    }

    /// Issues a fresh code. There is no SMS gateway; the code is logged.
    pub async fn send_otp(&self, request: SendOtpRequest) -> Result<(), AppError> {
        let phone = request
            .phone
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| AppError::Validation("Phone required".into()))?;
        let mut farmer = self.farmer_by_phone(&phone).await?;

        let code = otp::issue(&mut farmer, Utc::now());
        self.farmers.update_farmer(&farmer).await?;
        log::info!("SMS to {}: Your OTP is {}", farmer.phone, code);
        Ok(())
    }

    pub async fn verify_otp(&self, request: VerifyOtpRequest) -> Result<&'static str, AppError> {
        let (Some(phone), Some(code)) = (
            request.phone.filter(|p| !p.trim().is_empty()),
            request.otp.filter(|o| !o.trim().is_empty()),
        ) else {
            return Err(AppError::Validation("Phone and OTP required".into()));
        };
        let mut farmer = self.farmer_by_phone(&phone).await?;

        let outcome = otp::verify(&mut farmer, &code, Utc::now());
        match outcome {
            Err(otp::OtpRejection::Mismatch) | Err(otp::OtpRejection::NoneIssued) => {}
            _ => self.farmers.update_farmer(&farmer).await?,
        }
        match outcome {
            Ok(()) => {
                log::info!("Farmer {} verified by OTP", farmer.id);
                Ok("Verified successfully")
            }
            Err(rejection) => Err(AppError::Validation(rejection.message().into())),
        }
    }

    async fn active_farmer(&self, farmer_id: Uuid) -> Result<Farmer, AppError> {
        self.farmers
            .get_farmer_by_id(farmer_id)
            .await?
            .filter(|farmer| farmer.is_active)
            .ok_or_else(|| AppError::Unauthorized("Farmer account not found or inactive".into()))
    }

    pub async fn profile(&self, farmer_id: Uuid) -> Result<FarmerProfile, AppError> {
        let farmer = self.active_farmer(farmer_id).await?;
        Ok(FarmerProfile::from(&farmer))
    }

    /// Applies the fields present in `update`; absent fields are untouched.
    pub async fn update_profile(
        &self,
        farmer_id: Uuid,
        update: ProfileUpdate,
    ) -> Result<FarmerProfile, AppError> {
        update.validate()?;
        let mut farmer = self.active_farmer(farmer_id).await?;

        let assign = |value: Option<String>, target: &mut String| {
            if let Some(value) = value {
                *target = value.trim().to_string();
            }
        };
        assign(update.first_name, &mut farmer.first_name);
        assign(update.last_name, &mut farmer.last_name);
        assign(update.district, &mut farmer.district);
        assign(update.taluk, &mut farmer.taluk);
        assign(update.village, &mut farmer.village);

        if let Some(email) = update.email {
            farmer.email = validation::normalize_email(&email);
        }
        if let Some(language) = update.preferred_language.filter(|l| !l.trim().is_empty()) {
            farmer.preferred_language = language_or_default(Some(&language))?;
        }
        if let Some(land_size) = update.land_size {
            farmer.land_size = Some(land_size);
        }
        if let Some(crops) = update.crops_grown {
            farmer.crops_grown = clean_crops(crops);
        }

        farmer.touch();
        self.farmers
            .update_farmer(&farmer)
            .await
            .map_err(conflict_to_field)?;
        log::info!("Updated profile of farmer {}", farmer.id);
        Ok(FarmerProfile::from(&farmer))
    }

    /// Removes the account. Analyses the farmer created are kept and lose
    /// their owner.
    pub async fn delete_account(&self, farmer_id: Uuid) -> Result<(), AppError> {
        let farmer = self.active_farmer(farmer_id).await?;
        let detached = self.analyses.detach_farmer(farmer.id).await?;
        self.farmers.delete_farmer(farmer.id).await?;
        log::info!(
            "Deleted farmer {}; {} analyses kept without owner",
            farmer.id,
            detached
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_repository::InMemoryRepository;
    use crate::diagnosis::models::Analysis;
    use chrono::Duration;

    fn service() -> (FarmerService, Arc<InMemoryRepository>) {
        let repo = Arc::new(InMemoryRepository::new());
        let service = FarmerService::new(repo.clone(), repo.clone(), JwtService::new("secret"));
        (service, repo)
    }

    fn registration(phone: &str, email: &str) -> RegistrationRequest {
        RegistrationRequest {
            phone: Some(phone.into()),
            email: Some(email.into()),
            first_name: Some("Ravi".into()),
            last_name: Some("Kumar".into()),
            password: Some("harvest2024".into()),
            password2: Some("harvest2024".into()),
            district: Some("Mandya".into()),
            taluk: Some("Maddur".into()),
            village: Some("Koppa".into()),
            land_size: Some(2.5),
            crops_grown: Some(vec!["ragi".into(), " ".into()]),
            preferred_language: Some("en".into()),
        }
    }

    fn field_errors(result: Result<Farmer, AppError>) -> FieldErrors {
        match result {
            Err(AppError::InvalidFields(errors)) => errors,
            other => panic!("expected field errors, got {:?}", other.map(|f| f.id)),
        }
    }

    #[actix_web::test]
    async fn registration_normalizes_and_activates() {
        let (service, _) = service();
        let farmer = service
            .register(registration("98123 45678", "ravi@Example.com"))
            .await
            .unwrap();
        assert_eq!(farmer.phone, "+919812345678");
        assert_eq!(farmer.email, "ravi@example.com");
        assert_eq!(farmer.crops_grown, vec!["ragi"]);
        assert_eq!(farmer.preferred_language, PreferredLanguage::En);
        assert!(farmer.is_verified && farmer.is_active);
        assert_ne!(farmer.password_hash, "harvest2024");
    }

    #[actix_web::test]
    async fn registration_reports_every_bad_field() {
        let (service, _) = service();
        let errors = field_errors(
            service
                .register(RegistrationRequest {
                    password: Some("1234".into()),
                    password2: Some("4321".into()),
                    preferred_language: Some("hi".into()),
                    ..Default::default()
                })
                .await,
        );
        for field in [
            "phone",
            "email",
            "first_name",
            "district",
            "taluk",
            "village",
            "password",
            "preferred_language",
        ] {
            assert!(errors.contains_key(field), "missing {}", field);
        }
        assert!(errors["password"].contains(&"Passwords don't match".to_string()));
        assert!(!errors.contains_key("last_name"));
    }

    #[actix_web::test]
    async fn field_rules_are_reported_with_form_messages() {
        let (service, _) = service();
        let mut request = registration("12345", "not-an-email");
        request.village = Some("   ".into());
        request.land_size = Some(-1.0);
        request.password2 = Some("different1".into());
        let errors = field_errors(service.register(request).await);

        assert_eq!(errors["phone"], vec!["Enter a valid phone number."]);
        assert_eq!(errors["email"], vec!["Enter a valid email address."]);
        assert_eq!(errors["village"], vec!["This field may not be blank."]);
        assert_eq!(
            errors["land_size"],
            vec!["Ensure this value is greater than or equal to 0."]
        );
        assert_eq!(errors["password"], vec!["Passwords don't match"]);
        assert!(!errors.contains_key("district"));

        let login = service.login(LoginRequest::default()).await;
        assert!(matches!(
            login,
            Err(AppError::InvalidFields(e)) if e["phone"] == ["This field is required."]
                && e.contains_key("password")
        ));
    }

    #[actix_web::test]
    async fn duplicate_phone_and_email_are_rejected() {
        let (service, _) = service();
        service
            .register(registration("9812345678", "a@example.com"))
            .await
            .unwrap();

        let errors = field_errors(
            service
                .register(registration("+919812345678", "a@example.com"))
                .await,
        );
        assert!(errors.contains_key("phone"));
        assert!(errors.contains_key("email"));
    }

    #[actix_web::test]
    async fn login_issues_a_token_for_the_farmer() {
        let (service, _) = service();
        let farmer = service
            .register(registration("9812345678", "a@example.com"))
            .await
            .unwrap();

        let response = service
            .login(LoginRequest {
                phone: Some("09812345678".into()),
                password: Some("harvest2024".into()),
            })
            .await
            .unwrap();
        assert_eq!(response.farmer.id, farmer.id);
        assert_eq!(response.farmer.name, "Ravi Kumar");
        let claims = service.jwt.verify_token(&response.access_token).unwrap();
        assert_eq!(claims.sub, farmer.id.to_string());

        let wrong = service
            .login(LoginRequest {
                phone: Some("9812345678".into()),
                password: Some("harvest2025".into()),
            })
            .await;
        assert!(matches!(wrong, Err(AppError::InvalidFields(e)) if e.contains_key("non_field_errors")));
    }

    #[actix_web::test]
    async fn otp_flow_follows_the_contract() {
        let (service, repo) = service();
        let farmer = service
            .register(registration("9812345678", "a@example.com"))
            .await
            .unwrap();

        let verify = |otp: &str| VerifyOtpRequest {
            phone: Some("9812345678".into()),
            otp: Some(otp.into()),
        };
        let message = |result: Result<&'static str, AppError>| match result {
            Ok(m) => m.to_string(),
            Err(e) => e.to_string(),
        };

        assert_eq!(
            message(service.verify_otp(VerifyOtpRequest::default()).await),
            "Phone and OTP required"
        );
        assert!(matches!(
            service
                .verify_otp(VerifyOtpRequest {
                    phone: Some("9000000000".into()),
                    otp: Some("123456".into()),
                })
                .await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(message(service.verify_otp(verify("123456")).await), "No OTP found");

        service
            .send_otp(SendOtpRequest {
                phone: Some("9812345678".into()),
            })
            .await
            .unwrap();
        let stored = repo.get_farmer_by_id(farmer.id).await.unwrap().unwrap();
        let code = stored.otp.clone().unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        assert_eq!(message(service.verify_otp(verify(wrong)).await), "Invalid OTP");
        assert_eq!(
            message(service.verify_otp(verify(&code)).await),
            "Verified successfully"
        );
        assert_eq!(message(service.verify_otp(verify(&code)).await), "No OTP found");

        let mut stale = repo.get_farmer_by_id(farmer.id).await.unwrap().unwrap();
        stale.otp = Some("654321".into());
        stale.otp_created_at = Some(Utc::now() - Duration::minutes(30));
        repo.update_farmer(&stale).await.unwrap();
        assert_eq!(message(service.verify_otp(verify("654321")).await), "OTP expired");
        let cleared = repo.get_farmer_by_id(farmer.id).await.unwrap().unwrap();
        assert!(cleared.otp.is_none());
    }

    #[actix_web::test]
    async fn profile_update_is_partial() {
        let (service, _) = service();
        let farmer = service
            .register(registration("9812345678", "a@example.com"))
            .await
            .unwrap();

        let profile = service
            .update_profile(
                farmer.id,
                ProfileUpdate {
                    village: Some("Besagarahalli".into()),
                    preferred_language: Some("kn".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(profile.village, "Besagarahalli");
        assert_eq!(profile.preferred_language, PreferredLanguage::Kn);
        assert_eq!(profile.district, "Mandya");
        assert_eq!(profile.phone, "+919812345678");

        let blank = service
            .update_profile(
                farmer.id,
                ProfileUpdate {
                    first_name: Some("  ".into()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(blank, Err(AppError::InvalidFields(e)) if e.contains_key("first_name")));
    }

    #[actix_web::test]
    async fn deleting_account_keeps_analyses() {
        let (service, repo) = service();
        let farmer = service
            .register(registration("9812345678", "a@example.com"))
            .await
            .unwrap();
        let analysis = Analysis::new(Some(farmer.id), "ragi".into(), "kn".into());
        repo.create_analysis(&analysis).await.unwrap();

        service.delete_account(farmer.id).await.unwrap();

        assert!(repo.get_farmer_by_id(farmer.id).await.unwrap().is_none());
        let kept = repo.get_analysis(analysis.id).await.unwrap().unwrap();
        assert_eq!(kept.farmer_id, None);
        assert!(matches!(
            service.profile(farmer.id).await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
