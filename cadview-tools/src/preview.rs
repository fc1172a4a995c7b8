//! 渲染结果的压缩预览，供对话上下文直接携带。

use std::io::Cursor;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageError;
use image::codecs::jpeg::JpegEncoder;
use tracing::{debug, warn};

/// 将图片缩小到 `max_side` 以内（不放大），编码为 JPEG 后转 base64。
///
/// 预览是附加信息，失败时只记录日志并返回 `None`。
pub fn encode_preview_base64(image_path: &Path, max_side: u32, quality: u8) -> Option<String> {
    match encode_preview(image_path, max_side, quality) {
        Ok(bytes) => {
            debug!(path = %image_path.display(), bytes = bytes.len(), "生成预览图");
            Some(STANDARD.encode(bytes))
        }
        Err(err) => {
            warn!(path = %image_path.display(), error = %err, "生成预览图失败");
            None
        }
    }
}

fn encode_preview(image_path: &Path, max_side: u32, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut image = image::open(image_path)?;
    let max_side = max_side.max(1);
    if image.width() > max_side || image.height() > max_side {
        image = image.thumbnail(max_side, max_side);
    }
    let rgb = image.to_rgb8();
    let mut buffer = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)?;
    Ok(buffer.into_inner())
}
