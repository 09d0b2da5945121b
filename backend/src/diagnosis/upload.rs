use image::ImageFormat;

use crate::error::AppError;

const ACCEPTED_FORMATS: [ImageFormat; 5] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::WebP,
    ImageFormat::Gif,
    ImageFormat::Bmp,
];

/// An uploaded file whose bytes were sniffed as a supported image.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: Option<String>,
    pub format: ImageFormat,
    pub data: Vec<u8>,
}

impl UploadedImage {
    /// `position` is the zero-based upload position, used in messages.
    pub fn new(
        position: usize,
        filename: Option<String>,
        data: Vec<u8>,
        max_bytes: usize,
    ) -> Result<Self, AppError> {
        if data.len() > max_bytes {
            return Err(too_large(position, max_bytes));
        }
        let format = image::guess_format(&data)
            .ok()
            .filter(|format| ACCEPTED_FORMATS.contains(format))
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Image {} is not a supported image (PNG, JPEG, WebP, GIF or BMP)",
                    position + 1
                ))
            })?;
        Ok(Self {
            filename,
            format,
            data,
        })
    }

    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("img")
    }

    pub fn content_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

pub fn too_large(position: usize, max_bytes: usize) -> AppError {
    AppError::Validation(format!(
        "Image {} exceeds the {} byte upload limit",
        position + 1,
        max_bytes
    ))
}
