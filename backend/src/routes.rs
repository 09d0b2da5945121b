use actix_files::Files;
use actix_multipart::{Field, Multipart, MultipartError};
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse};
use futures::{StreamExt, TryStreamExt};
use serde_json::json;
use std::path::PathBuf;
use uuid::Uuid;

use crate::auth::middleware::MaybeFarmer;
use crate::diagnosis::service::MAX_IMAGES;
use crate::diagnosis::upload::{too_large, UploadedImage};
use crate::diagnosis::{AnalyzeRequest, DiagnosisService};
use crate::error::AppError;
use crate::report::{render_analysis, report_filename};

#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_image_bytes: usize,
}

/// Directory served under `url` for the local image store.
#[derive(Debug, Clone)]
pub struct MediaMount {
    pub url: String,
    pub root: PathBuf,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, media: Option<MediaMount>) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        AppError::Validation(format!("Invalid request body: {}", err)).into()
    }))
    .service(
        web::scope("/api/crop-doctor")
            .route("/analyze/", web::post().to(analyze))
            .route("/analysis/{analysis_id}/", web::get().to(get_analysis))
            .route("/report/{analysis_id}/", web::get().to(download_report)),
    )
    .configure(crate::auth::routes::configure)
    .configure(crate::weather::routes::configure);

    if let Some(media) = media {
        let url = media.url.trim_end_matches('/').to_string();
        log::info!("Serving {} from {}", url, media.root.display());
        cfg.service(Files::new(&url, media.root));
    }
}

fn malformed(err: MultipartError) -> AppError {
    AppError::Validation(format!("Malformed upload: {}", err))
}

/// Text parts are short form values; anything past this is refused.
pub const MAX_TEXT_FIELD_BYTES: usize = 1024;

async fn read_text(field: &mut Field, name: &str) -> Result<String, AppError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(malformed)?;
        if data.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
            return Err(AppError::Validation(format!(
                "Field '{}' must be at most {} bytes",
                name, MAX_TEXT_FIELD_BYTES
            )));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&data).into_owned())
}

/// Reads an image part, failing as soon as it grows past `max_bytes`.
async fn read_image(
    field: &mut Field,
    position: usize,
    max_bytes: usize,
) -> Result<Vec<u8>, AppError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(malformed)?;
        if data.len() + chunk.len() > max_bytes {
            return Err(too_large(position, max_bytes));
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

async fn read_analyze_form(
    mut payload: Multipart,
    limits: UploadLimits,
) -> Result<AnalyzeRequest, AppError> {
    let mut request = AnalyzeRequest::default();

    while let Some(mut field) = payload.try_next().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "crop_type" => request.crop_type = read_text(&mut field, &name).await?,
            "language" => request.language = read_text(&mut field, &name).await?,
            "images" => {
                let position = request.images.len();
                let filename = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .map(str::to_string);
                let data = read_image(&mut field, position, limits.max_image_bytes).await?;
                if data.is_empty() {
                    continue;
                }
                if position == MAX_IMAGES {
                    return Err(AppError::Validation(format!(
                        "Maximum {} images allowed",
                        MAX_IMAGES
                    )));
                }
                request.images.push(UploadedImage::new(
                    position,
                    filename,
                    data,
                    limits.max_image_bytes,
                )?);
            }
            other => {
                log::debug!("Ignoring multipart field '{}'", other);
                while let Some(chunk) = field.next().await {
                    chunk.map_err(malformed)?;
                }
            }
        }
    }
    Ok(request)
}

async fn analyze(
    diagnosis: web::Data<DiagnosisService>,
    limits: web::Data<UploadLimits>,
    farmer: MaybeFarmer,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let request = read_analyze_form(payload, **limits).await?;
    log::info!(
        "Crop doctor request: {} images, crop '{}', farmer {:?}",
        request.images.len(),
        request.crop_type,
        farmer.0
    );
    let analysis = diagnosis.analyze(farmer.0, request).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "analysis": analysis })))
}

/// Unparseable ids cannot name an analysis, so they are reported as missing.
fn parse_analysis_id(raw: &str, missing: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound(missing.into()))
}

async fn get_analysis(
    diagnosis: web::Data<DiagnosisService>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let analysis_id = parse_analysis_id(&path.into_inner(), "Analysis not found")?;
    let analysis = diagnosis.get_view(analysis_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "analysis": analysis })))
}

const REPORT_NOT_FOUND: &str = "Report not found";

async fn download_report(
    diagnosis: web::Data<DiagnosisService>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let analysis_id = parse_analysis_id(&path.into_inner(), REPORT_NOT_FOUND)?;
    let analysis = diagnosis
        .get_analysis(analysis_id)
        .await
        .map_err(|e| match e {
            AppError::NotFound(_) => AppError::NotFound(REPORT_NOT_FOUND.into()),
            other => other,
        })?;
    let filename = report_filename(&analysis);
    let pdf = web::block(move || render_analysis(&analysis)).await?;
    log::info!("Serving report {} ({} bytes)", filename, pdf.len());

    Ok(HttpResponse::Ok()
        .content_type("application/pdf")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename)],
        })
        .body(pdf))
}
