mod auth;
mod config;
mod db;
mod diagnosis;
mod error;
mod farmers;
mod report;
mod routes;
mod storage;
mod weather;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use auth::jwt::JwtService;
use auth::middleware::AuthMiddleware;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;
use config::{AppConfig, ImageStoreKind, StorageBackend};
use db::repository::{AnalysisRepository, FarmerRepository};
use db::{DynamoDbRepository, InMemoryRepository};
use diagnosis::{ClassMapCatalog, ClassifierService, DiagnosisService, MockGenerator};
use farmers::FarmerService;
use routes::{configure_routes, MediaMount, UploadLimits};
use std::env;
use std::sync::Arc;
use storage::{ImageStore, LocalImageStore, S3Service};
use weather::WeatherClient;

fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    log::error!("{}: {}", context, err);
    std::io::Error::other(format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let config = AppConfig::from_env().map_err(|e| startup_error("Invalid configuration", e))?;

    let needs_aws = matches!(config.storage, StorageBackend::DynamoDb { .. })
        || matches!(config.image_store, ImageStoreKind::S3 { .. });
    let aws_config = if needs_aws {
        Some(aws_config::defaults(BehaviorVersion::latest()).load().await)
    } else {
        None
    };

    let (analyses, farmer_repo): (Arc<dyn AnalysisRepository>, Arc<dyn FarmerRepository>) =
        match (&config.storage, &aws_config) {
            (
                StorageBackend::DynamoDb {
                    farmers_table,
                    analyses_table,
                    images_table,
                },
                Some(aws),
            ) => {
                log::info!(
                    "Using DynamoDB tables {}, {}, {}",
                    farmers_table,
                    analyses_table,
                    images_table
                );
                let repo = Arc::new(DynamoDbRepository::new(
                    DynamoDbClient::new(aws),
                    farmers_table.clone(),
                    analyses_table.clone(),
                    images_table.clone(),
                ));
                (repo.clone() as Arc<dyn AnalysisRepository>, repo as Arc<dyn FarmerRepository>)
            }
            _ => {
                log::warn!("Using in-memory storage; data is lost on restart");
                let repo = Arc::new(InMemoryRepository::new());
                (repo.clone() as Arc<dyn AnalysisRepository>, repo as Arc<dyn FarmerRepository>)
            }
        };

    let mut media = None;
    let images: Arc<dyn ImageStore> = match (&config.image_store, &aws_config) {
        (ImageStoreKind::S3 { bucket }, Some(aws)) => {
            log::info!("Storing images in S3 bucket {}", bucket);
            Arc::new(S3Service::new(S3Client::new(aws), bucket.clone()))
        }
        (ImageStoreKind::Local { root, url_prefix }, _) => {
            std::fs::create_dir_all(root)
                .map_err(|e| startup_error("Cannot create media directory", e))?;
            media = Some(MediaMount {
                url: url_prefix.clone(),
                root: root.clone(),
            });
            Arc::new(LocalImageStore::new(root.clone(), url_prefix.clone()))
        }
        (ImageStoreKind::S3 { .. }, None) => {
            return Err(startup_error("Image store", "S3 selected without AWS configuration"));
        }
    };

    let catalog = ClassMapCatalog::load(config.classifier.class_maps_file.as_deref())
        .map_err(|e| startup_error("Cannot load class maps", e))?;
    let classifier = ClassifierService::new(config.classifier.clone(), &catalog)
        .map_err(|e| startup_error("Cannot configure classifier", e))?;
    let mock = MockGenerator::from_catalog(&catalog)
        .map_err(|e| startup_error("Cannot configure mock diagnoses", e))?;

    let diagnosis = web::Data::new(DiagnosisService::new(
        analyses.clone(),
        images,
        Arc::new(classifier),
        mock,
    ));

    let jwt_service = JwtService::new(&config.jwt_secret);
    let farmers = web::Data::new(FarmerService::new(
        farmer_repo,
        analyses,
        jwt_service.clone(),
    ));
    let auth_middleware = AuthMiddleware::new(jwt_service);
    let weather = web::Data::new(
        WeatherClient::new(config.weather.clone())
            .map_err(|e| startup_error("Cannot build weather client", e))?,
    );
    let limits = web::Data::new(UploadLimits {
        max_image_bytes: config.max_image_bytes,
    });

    let bind_address = format!("0.0.0.0:{}", config.port);
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(auth_middleware.clone())
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(diagnosis.clone())
            .app_data(farmers.clone())
            .app_data(weather.clone())
            .app_data(limits.clone())
            .configure(|cfg| configure_routes(cfg, media.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
