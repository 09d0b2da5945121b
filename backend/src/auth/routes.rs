use actix_web::{web, HttpResponse, Result};
use serde_json::json;

use super::middleware::AuthenticatedFarmer;
use crate::error::AppError;
use crate::farmers::models::{
    LoginRequest, ProfileUpdate, RegistrationRequest, SendOtpRequest, VerifyOtpRequest,
};
use crate::farmers::FarmerService;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/auth")
            .route("/signup/", web::post().to(signup))
            .route("/login/", web::post().to(login))
            .route("/send-otp/", web::post().to(send_otp))
            .route("/verify-otp/", web::post().to(verify_otp))
            .service(
                web::resource("/profile/")
                    .route(web::get().to(profile))
                    .route(web::put().to(update_profile))
                    .route(web::patch().to(update_profile))
                    .route(web::delete().to(delete_account)),
            ),
    );
}

pub async fn signup(
    farmers: web::Data<FarmerService>,
    body: web::Json<RegistrationRequest>,
) -> Result<HttpResponse, AppError> {
    let farmer = farmers.register(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "message": "Registration successful.",
        "data": { "phone": farmer.phone, "email": farmer.email },
    })))
}

pub async fn login(
    farmers: web::Data<FarmerService>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    let login = farmers.login(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Login successful",
        "data": login,
    })))
}

pub async fn send_otp(
    farmers: web::Data<FarmerService>,
    body: web::Json<SendOtpRequest>,
) -> Result<HttpResponse, AppError> {
    farmers.send_otp(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "message": "OTP sent" })))
}

pub async fn verify_otp(
    farmers: web::Data<FarmerService>,
    body: web::Json<VerifyOtpRequest>,
) -> Result<HttpResponse, AppError> {
    let message = farmers.verify_otp(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "message": message })))
}

pub async fn profile(
    farmer: AuthenticatedFarmer,
    farmers: web::Data<FarmerService>,
) -> Result<HttpResponse, AppError> {
    log::debug!("Profile requested for farmer {}", farmer.0);
    let profile = farmers.profile(farmer.0).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "data": profile })))
}

pub async fn update_profile(
    farmer: AuthenticatedFarmer,
    farmers: web::Data<FarmerService>,
    body: web::Json<ProfileUpdate>,
) -> Result<HttpResponse, AppError> {
    let profile = farmers.update_profile(farmer.0, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Profile updated",
        "data": profile,
    })))
}

pub async fn delete_account(
    farmer: AuthenticatedFarmer,
    farmers: web::Data<FarmerService>,
) -> Result<HttpResponse, AppError> {
    farmers.delete_account(farmer.0).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "message": "Account deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::JwtService;
    use crate::auth::middleware::AuthMiddleware;
    use crate::db::InMemoryRepository;
    use actix_web::{http::StatusCode, test, App};
    use serde_json::Value;
    use std::sync::Arc;

    fn signup_body() -> Value {
        json!({
            "phone": "9812345678",
            "email": "asha@example.com",
            "first_name": "Asha",
            "password": "harvest2024",
            "password2": "harvest2024",
            "district": "Mandya",
            "taluk": "Maddur",
            "village": "Koppa",
            "crops_grown": ["ragi", "sugarcane"],
            "preferred_language": "kn"
        })
    }

    #[actix_web::test]
    async fn signup_login_and_profile_round() {
        let repo = Arc::new(InMemoryRepository::new());
        let jwt = JwtService::new("route-secret");
        let farmers = FarmerService::new(repo.clone(), repo, jwt.clone());
        let app = test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(jwt))
                .app_data(web::Data::new(farmers))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/auth/signup/")
            .set_json(signup_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["phone"], "+919812345678");

        let req = test::TestRequest::post()
            .uri("/api/auth/signup/")
            .set_json(signup_body())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["errors"]["phone"].is_array());

        let req = test::TestRequest::post()
            .uri("/api/auth/login/")
            .set_json(json!({ "phone": "9812345678", "password": "harvest2024" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["message"], "Login successful");
        assert_eq!(body["data"]["farmer"]["name"], "Asha");
        let token = body["data"]["access_token"].as_str().unwrap().to_string();

        let req = test::TestRequest::get()
            .uri("/api/auth/profile/")
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::UNAUTHORIZED
        );

        let req = test::TestRequest::put()
            .uri("/api/auth/profile/")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .set_json(json!({ "village": "Hosahalli" }))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["message"], "Profile updated");
        assert_eq!(body["data"]["village"], "Hosahalli");
        assert_eq!(body["data"]["crops_grown"][1], "sugarcane");

        let req = test::TestRequest::delete()
            .uri("/api/auth/profile/")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["message"], "Account deleted");

        let req = test::TestRequest::get()
            .uri("/api/auth/profile/")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[actix_web::test]
    async fn otp_endpoints_report_contract_errors() {
        let repo = Arc::new(InMemoryRepository::new());
        let farmers = FarmerService::new(repo.clone(), repo, JwtService::new("s"));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(farmers))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/auth/send-otp/")
            .set_json(json!({}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Phone required");

        let req = test::TestRequest::post()
            .uri("/api/auth/send-otp/")
            .set_json(json!({ "phone": "9000000000" }))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::NOT_FOUND
        );

        let req = test::TestRequest::post()
            .uri("/api/auth/verify-otp/")
            .set_json(json!({ "phone": "9000000000" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Phone and OTP required");
    }
}
