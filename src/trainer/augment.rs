//! Training-time image augmentation.
//!
//! Each augmented copy applies a random horizontal flip, a small rotation,
//! and brightness/contrast/hue jitter. All randomness flows through the
//! caller's seeded RNG so runs are reproducible.

use image::imageops;
use image::RgbImage;
use rand::rngs::StdRng;
use rand::Rng;

/// Maximum rotation in degrees, either direction.
const MAX_ROTATION_DEG: f32 = 15.0;

/// Produce one randomly jittered copy of `img`.
pub fn augment_image(img: &RgbImage, rng: &mut StdRng) -> RgbImage {
    let mut out = if rng.gen_bool(0.5) {
        imageops::flip_horizontal(img)
    } else {
        img.clone()
    };

    let angle = rng.gen_range(-MAX_ROTATION_DEG..MAX_ROTATION_DEG);
    out = rotate_nearest(&out, angle);

    let brightness = rng.gen_range(-20..=20);
    out = imageops::brighten(&out, brightness);

    let contrast = rng.gen_range(-10.0..10.0);
    out = imageops::contrast(&out, contrast);

    let hue = rng.gen_range(-10..=10);
    imageops::huerotate(&out, hue)
}

/// Rotate `img` around its center by `degrees`, nearest-neighbor sampling.
///
/// Pixels that map outside the source are clamped to the border, which
/// avoids injecting black wedges the embedding network never saw.
fn rotate_nearest(img: &RgbImage, degrees: f32) -> RgbImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }
    let cx = w as f32 / 2.0;
    let cy = h as f32 / 2.0;
    let (sin, cos) = degrees.to_radians().sin_cos();

    let mut out = RgbImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let dx = x as f32 + 0.5 - cx;
            let dy = y as f32 + 0.5 - cy;
            let sx = (cos * dx + sin * dy + cx - 0.5).round();
            let sy = (cos.mul_add(dy, -(sin * dx)) + cy - 0.5).round();
            let sx = sx.clamp(0.0, (w - 1) as f32) as u32;
            let sy = sy.clamp(0.0, (h - 1) as f32) as u32;
            out.put_pixel(x, y, *img.get_pixel(sx, sy));
        }
    }
    out
}
