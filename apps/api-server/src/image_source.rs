use anyhow::Context;
use image::RgbImage;

/// Decode any format the `image` crate recognizes and convert it to 8-bit RGB.
pub fn decode_rgb_image(bytes: &[u8]) -> anyhow::Result<RgbImage> {
    let image = image::load_from_memory(bytes).context("failed to decode image")?;
    Ok(image.to_rgb8())
}

/// GET `url` and return the body; non-2xx statuses are errors.
pub async fn fetch_image_bytes(client: &reqwest::Client, url: &str) -> anyhow::Result<Vec<u8>> {
    tracing::debug!("fetching image from {}", url);
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("request to {} failed", url))?
        .error_for_status()?;

    let bytes = response.bytes().await?;
    Ok(bytes.to_vec())
}

/// Fetch and decode in one step, which is how the URL route reports failures.
pub async fn load_image_from_url(client: &reqwest::Client, url: &str) -> anyhow::Result<RgbImage> {
    let bytes = fetch_image_bytes(client, url).await?;
    decode_rgb_image(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    #[test]
    fn test_decode_converts_to_rgb() {
        let rgba = RgbaImage::from_pixel(3, 2, Rgba([10, 20, 30, 0]));
        let mut png = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(rgba)
            .write_to(&mut png, ImageFormat::Png)
            .unwrap();

        let rgb = decode_rgb_image(png.get_ref()).unwrap();
        assert_eq!(rgb.dimensions(), (3, 2));
        assert_eq!(rgb.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_rgb_image(b"definitely not an image").is_err());
        assert!(decode_rgb_image(&[]).is_err());
    }
}
