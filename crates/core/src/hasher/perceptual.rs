use fast_image_resize::{self as fir, images::Image as FirImage};
use image::DynamicImage;

/// Compute the 64-bit difference hash (dHash) of a decoded image.
///
/// The image is downsampled to a 9x8 grayscale grid and each of the 64
/// adjacent-pixel luminance gradients contributes one sign bit. Visually
/// identical content (re-encodes, recompressions, small edits) lands on
/// identical or near-identical values; unrelated content differs in many
/// bits. Returns `None` only if the resize pipeline rejects the pixel
/// buffer, which does not happen for normally decoded images.
pub fn difference_hash(img: &DynamicImage) -> Option<u64> {
    let pixels = downsample_9x8_grayscale(img)?;
    Some(pack_gradient_bits(&pixels))
}

/// Resize to 9x8 RGB with SIMD, then convert only those 72 pixels to
/// grayscale using BT.601. Avoids a full-resolution grayscale pass.
fn downsample_9x8_grayscale(img: &DynamicImage) -> Option<[u8; 72]> {
    let rgb = img.to_rgb8();
    let (w, h) = (rgb.width(), rgb.height());

    let src = FirImage::from_vec_u8(w, h, rgb.into_raw(), fir::PixelType::U8x3).ok()?;
    let mut dst = FirImage::new(9, 8, fir::PixelType::U8x3);
    fir::Resizer::new().resize(&src, &mut dst, None).ok()?;

    let rgb_buf = dst.buffer();
    let mut gray = [0u8; 72];
    for i in 0..72 {
        let r = rgb_buf[i * 3] as f32;
        let g = rgb_buf[i * 3 + 1] as f32;
        let b = rgb_buf[i * 3 + 2] as f32;
        gray[i] = (0.299 * r + 0.587 * g + 0.114 * b) as u8;
    }
    Some(gray)
}

/// For each row of 9 pixels, compare adjacent pairs; a brighter left
/// neighbour sets the bit. 8 bits per row x 8 rows = 64 bits.
fn pack_gradient_bits(pixels: &[u8; 72]) -> u64 {
    let mut hash: u64 = 0;
    let mut bit = 0;
    for row in 0..8 {
        for col in 0..8 {
            let left = pixels[row * 9 + col];
            let right = pixels[row * 9 + col + 1];
            if left > right {
                hash |= 1 << bit;
            }
            bit += 1;
        }
    }
    hash
}

/// Number of differing bits between two fingerprints.
pub fn hamming_distance(a: u64, b: u64) -> u32 {
    (a ^ b).count_ones()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn gradient_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(image::RgbImage::from_fn(width, height, |x, _| {
            image::Rgb([(x * 255 / width) as u8, 0, 0])
        }))
    }

    fn checkerboard_image() -> DynamicImage {
        DynamicImage::ImageRgb8(image::RgbImage::from_fn(64, 64, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([0, 0, 0])
            }
        }))
    }

    #[test]
    fn test_hamming_distance_identical() {
        assert_eq!(hamming_distance(0, 0), 0);
        assert_eq!(hamming_distance(u64::MAX, u64::MAX), 0);
    }

    #[test]
    fn test_hamming_distance_different() {
        assert_eq!(hamming_distance(0, 1), 1);
        assert_eq!(hamming_distance(0, 3), 2);
        assert_eq!(hamming_distance(0, u64::MAX), 64);
    }

    #[test]
    fn test_hash_is_deterministic() {
        let img = gradient_image(64, 64);
        assert_eq!(difference_hash(&img), difference_hash(&img));
    }

    #[test]
    fn test_gradient_sets_bits() {
        // A monotone horizontal ramp has a brighter right neighbour in every
        // pair, so no bits; the reversed ramp sets all 64.
        let ramp = gradient_image(64, 64);
        let reversed = DynamicImage::ImageRgb8(image::RgbImage::from_fn(64, 64, |x, _| {
            image::Rgb([((63 - x) * 4) as u8, 0, 0])
        }));

        assert_eq!(difference_hash(&ramp), Some(0));
        assert_eq!(difference_hash(&reversed), Some(u64::MAX));
    }

    #[test]
    fn test_unrelated_content_differs() {
        let a = difference_hash(&gradient_image(64, 64)).unwrap();
        let b = difference_hash(&checkerboard_image()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_survives_reencoding() {
        // The same pixels through two lossless containers decode back to the
        // same content and therefore the same fingerprint.
        let img = gradient_image(64, 64);

        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let mut tiff = Vec::new();
        img.write_to(&mut Cursor::new(&mut tiff), image::ImageFormat::Tiff)
            .unwrap();

        let from_png = image::load_from_memory(&png).unwrap();
        let from_tiff = image::load_from_memory(&tiff).unwrap();
        assert_eq!(difference_hash(&from_png), difference_hash(&from_tiff));
    }

    #[test]
    fn test_manual_grid() {
        // 9x8 grid, uniform except one bright pixel at the start of row 0:
        // exactly the first comparison of row 0 has a brighter left side.
        let mut pixels = [100u8; 72];
        pixels[0] = 200;
        assert_eq!(pack_gradient_bits(&pixels), 1);
    }
}
