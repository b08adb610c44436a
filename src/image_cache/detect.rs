use std::{io::Cursor, sync::LazyLock};

use image::{ImageFormat, Rgba, RgbaImage};

/// File extension for the image type recognised from the payload's magic bytes.
pub fn detect_extension(body: &[u8]) -> Option<&'static str> {
    match image::guess_format(body) {
        Ok(ImageFormat::Png) => Some("png"),
        Ok(ImageFormat::Jpeg) => Some("jpg"),
        Ok(ImageFormat::Gif) => Some("gif"),
        Ok(ImageFormat::WebP) => Some("webp"),
        _ if is_svg(body) => Some("svg"),
        _ => None,
    }
}

fn is_svg(body: &[u8]) -> bool {
    let head = &body[..body.len().min(1024)];
    let Ok(head) = std::str::from_utf8(head).or_else(|e| std::str::from_utf8(&head[..e.valid_up_to()]))
    else {
        return false;
    };
    let head = head.trim_start_matches('\u{feff}').trim_start();
    head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg"))
}

static PLACEHOLDER: LazyLock<Vec<u8>> = LazyLock::new(|| {
    let pixel = RgbaImage::from_pixel(1, 1, Rgba([0xe0, 0xe0, 0xe0, 0xff]));
    let mut body = Cursor::new(Vec::new());
    match pixel.write_to(&mut body, ImageFormat::Png) {
        Ok(()) => body.into_inner(),
        Err(error) => {
            tracing::error!(%error, "failed to encode placeholder image");
            Vec::new()
        }
    }
});

/// A single flat grey pixel, encoded as PNG.
pub fn placeholder_png() -> &'static [u8] {
    &PLACEHOLDER
}
