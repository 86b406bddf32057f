//! Image metadata via header probing.

use std::path::Path;

use async_trait::async_trait;

use super::{TypedExtractor, TypedMeta};
use crate::classify::FileCategory;

pub struct ImageExtractor;

#[async_trait]
impl TypedExtractor for ImageExtractor {
    fn name(&self) -> &'static str {
        "image"
    }

    fn handles(&self) -> &'static [FileCategory] {
        &[FileCategory::Image]
    }

    async fn extract(&self, path: &Path) -> Option<TypedMeta> {
        // Reads only the header, not the pixel data.
        let (width, height) = image::image_dimensions(path).ok()?;
        let format = image::ImageFormat::from_path(path)
            .ok()
            .map(|f| format!("{:?}", f).to_lowercase());
        Some(TypedMeta::Image {
            width,
            height,
            format,
        })
    }
}
