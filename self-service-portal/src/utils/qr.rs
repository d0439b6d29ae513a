use anyhow::Result;
use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, Luma};
use qrcode::QrCode;
use std::io::Cursor;

/// Render `data` as a QR code PNG and return it as a `data:` URL.
pub fn qr_png_data_url(data: &str) -> Result<String> {
    let code = QrCode::new(data.as_bytes())?;
    let image = code
        .render::<Luma<u8>>()
        .min_dimensions(240, 240)
        .quiet_zone(true)
        .build();

    let dynamic_image = DynamicImage::ImageLuma8(image);
    let mut buffer = Cursor::new(Vec::new());
    dynamic_image.write_to(&mut buffer, image::ImageOutputFormat::Png)?;

    Ok(format!(
        "data:image/png;base64,{}",
        general_purpose::STANDARD.encode(buffer.get_ref())
    ))
}
