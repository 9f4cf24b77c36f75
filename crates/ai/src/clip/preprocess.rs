use image::RgbImage;
use ndarray::Array3;

pub const TARGET_IMAGE_SIZE: u32 = 224;

const MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

/// Center crop the largest square, resize it to 224x224 and normalize
/// according to CLIP, returning a CHW array.
///
/// Same framing as resizing the short side to 224 then cropping, but the
/// intermediate buffer never exceeds the source, whatever the aspect ratio.
pub fn preprocess_rgb8_image(image: &RgbImage) -> anyhow::Result<Array3<f32>> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        anyhow::bail!("image is empty ({}x{})", w, h);
    }

    let side = w.min(h);
    let left = (w - side) / 2;
    let top = (h - side) / 2;
    let square = image::imageops::crop_imm(image, left, top, side, side).to_image();

    let image = image::imageops::resize(
        &square,
        TARGET_IMAGE_SIZE,
        TARGET_IMAGE_SIZE,
        image::imageops::FilterType::CatmullRom,
    );

    let size = TARGET_IMAGE_SIZE as usize;
    let array = Array3::from_shape_fn((3, size, size), |(c, i, j)| {
        let p = image.get_pixel(j as u32, i as u32);
        (p[c] as f32 / 255.0 - MEAN[c]) / STD[c]
    });

    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_preprocess_shape_and_values() {
        let image = RgbImage::from_pixel(640, 320, Rgb([255, 0, 128]));
        let array = preprocess_rgb8_image(&image).unwrap();

        assert_eq!(array.shape(), &[3, 224, 224]);
        let expected_r = (1.0 - MEAN[0]) / STD[0];
        let expected_g = (0.0 - MEAN[1]) / STD[1];
        assert!((array[[0, 100, 100]] - expected_r).abs() < 1e-3);
        assert!((array[[1, 0, 223]] - expected_g).abs() < 1e-3);
    }

    #[test]
    fn test_preprocess_tiny_and_empty() {
        let tiny = RgbImage::from_pixel(1, 3, Rgb([10, 20, 30]));
        assert_eq!(preprocess_rgb8_image(&tiny).unwrap().shape(), &[3, 224, 224]);

        assert!(preprocess_rgb8_image(&RgbImage::new(0, 10)).is_err());
    }

    #[test]
    fn test_preprocess_extreme_aspect_ratio() {
        // the 1x1 center crop lands on the last red column
        let wide = RgbImage::from_fn(200_000, 1, |x, _| {
            if x < 100_000 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });
        let array = preprocess_rgb8_image(&wide).unwrap();
        assert_eq!(array.shape(), &[3, 224, 224]);
        let expected_r = (1.0 - MEAN[0]) / STD[0];
        assert!((array[[0, 112, 112]] - expected_r).abs() < 1e-3);

        let tall = RgbImage::from_pixel(2, 100_000, Rgb([0, 255, 0]));
        let array = preprocess_rgb8_image(&tall).unwrap();
        assert_eq!(array.shape(), &[3, 224, 224]);
        let expected_g = (1.0 - MEAN[1]) / STD[1];
        assert!((array[[1, 0, 0]] - expected_g).abs() < 1e-3);
        assert!((array[[1, 223, 223]] - expected_g).abs() < 1e-3);
    }
}
