use serde::Serialize;

use crate::gateway::GeneratedImage;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "OK".to_string(),
            message: "Image generation relay is running".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageResponse {
    pub success: bool,
    pub image_url: String,
    pub prompt: String,
}

impl From<GeneratedImage> for GenerateImageResponse {
    fn from(image: GeneratedImage) -> Self {
        Self {
            success: true,
            image_url: image.image_url,
            prompt: image.prompt,
        }
    }
}
