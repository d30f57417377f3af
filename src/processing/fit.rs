//! Scale/offset computation for placing an image on a wallpaper surface.

use anyhow::{Context, Result};
use fast_image_resize as fir;
use image::{Rgba, RgbaImage, imageops};
use rotation_model::PlacementMode;

use crate::sink::Target;

/// Geometry needed to turn a decoded image into the canvas handed to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitPlan {
    pub scaled_w: u32,
    pub scaled_h: u32,
    pub offset_x: i64,
    pub offset_y: i64,
    pub canvas_w: u32,
    pub canvas_h: u32,
    /// The scaled image is the final output; no canvas is composed.
    pub direct: bool,
}

/// Largest buffer `render` will allocate, in pixels (256 MiB of RGBA).
pub const MAX_RENDER_PIXELS: u64 = 1 << 26;

/// Uniform scale that matches the screen height, or the screen width when
/// matching the height would leave the sides uncovered.
pub fn scale_to_screen(
    image_w: u32,
    image_h: u32,
    screen_w: u32,
    screen_h: u32,
) -> Result<(u32, u32)> {
    let iw = f64::from(image_w.max(1));
    let ih = f64::from(image_h.max(1));
    let sw = f64::from(screen_w.max(1));
    let sh = f64::from(screen_h.max(1));

    let height_first_w = iw * sh / ih;
    let (w, h) = if height_first_w < sw {
        (sw, ih * sw / iw)
    } else {
        (height_first_w, sh)
    };
    Ok((to_dimension(w)?, to_dimension(h)?))
}

fn to_dimension(length: f64) -> Result<u32> {
    // f64 -> u64 saturates, so the range check is left to try_from.
    u32::try_from(length.floor().max(1.0) as u64)
        .with_context(|| format!("scaled dimension {length:.0} does not fit in u32"))
}

fn center_if_shorter(scaled_h: u32, screen_h: u32) -> i64 {
    if scaled_h < screen_h {
        i64::from((screen_h - scaled_h) / 2)
    } else {
        0
    }
}

pub fn fit(
    image_w: u32,
    image_h: u32,
    screen_w: u32,
    screen_h: u32,
    target: Target,
    placement: PlacementMode,
) -> Result<FitPlan> {
    let (scaled_w, scaled_h) = scale_to_screen(image_w, image_h, screen_w, screen_h)?;
    let overflow_x = i64::from(screen_w) - i64::from(scaled_w);
    let offset_y = center_if_shorter(scaled_h, screen_h);

    let plan = match target {
        Target::LockScreen => FitPlan {
            scaled_w,
            scaled_h,
            offset_x: overflow_x / 2,
            offset_y,
            canvas_w: screen_w,
            canvas_h: screen_h,
            direct: false,
        },
        Target::HomeScreen if placement == PlacementMode::Full => FitPlan {
            scaled_w,
            scaled_h,
            offset_x: 0,
            offset_y: 0,
            canvas_w: scaled_w,
            canvas_h: scaled_h,
            direct: true,
        },
        // Not centering: the divisor picks how far into the overflow the first pane starts.
        Target::HomeScreen => FitPlan {
            scaled_w,
            scaled_h,
            offset_x: overflow_x / i64::from(placement.divisor()),
            offset_y,
            canvas_w: scaled_w,
            canvas_h: scaled_h,
            direct: false,
        },
    };
    Ok(plan)
}

/// Resize `image` per `plan` and compose it onto an opaque black canvas.
///
/// Only the part of the scaled image that lands on the canvas is resampled,
/// so a lock-screen canvas never costs more than the screen itself.
pub fn render(image: &RgbaImage, plan: &FitPlan) -> Result<RgbaImage> {
    if plan.direct {
        ensure_pixel_budget(plan.scaled_w, plan.scaled_h)?;
        return resize_rgba(image, plan.scaled_w, plan.scaled_h, None);
    }
    ensure_pixel_budget(plan.canvas_w, plan.canvas_h)?;
    let mut canvas = RgbaImage::from_pixel(plan.canvas_w, plan.canvas_h, Rgba([0, 0, 0, 255]));
    if let Some(window) = visible_window(image.dimensions(), plan) {
        let visible = resize_rgba(image, window.width, window.height, Some(window.source))?;
        imageops::overlay(&mut canvas, &visible, window.x, window.y);
    }
    Ok(canvas)
}

fn ensure_pixel_budget(width: u32, height: u32) -> Result<()> {
    let pixels = u64::from(width) * u64::from(height);
    anyhow::ensure!(
        pixels <= MAX_RENDER_PIXELS,
        "{width}x{height} output exceeds the pixel budget of {MAX_RENDER_PIXELS}"
    );
    Ok(())
}

/// Source rectangle in image pixels: left, top, width, height.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SourceRect {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
}

/// Canvas region covered by the scaled image and the source pixels feeding it.
#[derive(Debug, Clone, Copy, PartialEq)]
struct VisibleWindow {
    x: i64,
    y: i64,
    width: u32,
    height: u32,
    source: SourceRect,
}

fn visible_window((image_w, image_h): (u32, u32), plan: &FitPlan) -> Option<VisibleWindow> {
    let (x0, x1) = clip_span(plan.offset_x, plan.scaled_w, plan.canvas_w)?;
    let (y0, y1) = clip_span(plan.offset_y, plan.scaled_h, plan.canvas_h)?;
    let (left, width) = source_span(x0 - plan.offset_x, x1 - x0, image_w, plan.scaled_w);
    let (top, height) = source_span(y0 - plan.offset_y, y1 - y0, image_h, plan.scaled_h);
    Some(VisibleWindow {
        x: x0,
        y: y0,
        width: u32::try_from(x1 - x0).ok()?,
        height: u32::try_from(y1 - y0).ok()?,
        source: SourceRect {
            left,
            top,
            width,
            height,
        },
    })
}

/// Intersection of `[offset, offset + len)` with `[0, bound)`.
fn clip_span(offset: i64, len: u32, bound: u32) -> Option<(i64, i64)> {
    let start = offset.max(0);
    let end = (offset + i64::from(len)).min(i64::from(bound));
    (end > start).then_some((start, end))
}

/// Map a span of scaled pixels back onto the source axis, keeping at least one
/// source pixel so extreme downsampling still has something to sample.
fn source_span(scaled_start: i64, scaled_len: i64, source_len: u32, scaled_total: u32) -> (f64, f64) {
    let ratio = f64::from(source_len) / f64::from(scaled_total.max(1));
    let source_len = f64::from(source_len);
    let mut start = scaled_start as f64 * ratio;
    let mut len = (scaled_len as f64 * ratio).min(source_len);
    if len < 1.0 {
        start += (len - 1.0) / 2.0;
        len = source_len.min(1.0);
    }
    (start.clamp(0.0, source_len - len), len)
}

fn resize_rgba(
    source: &RgbaImage,
    target_w: u32,
    target_h: u32,
    crop: Option<SourceRect>,
) -> Result<RgbaImage> {
    anyhow::ensure!(
        target_w > 0 && target_h > 0,
        "resize dimensions must be positive"
    );
    if crop.is_none() && source.dimensions() == (target_w, target_h) {
        return Ok(source.clone());
    }

    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x4,
    )
    .context("failed to create source view for wallpaper resize")?;
    let mut dst_image = fir::images::Image::new(target_w, target_h, fir::PixelType::U8x4);
    let mut options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::CatmullRom));
    if let Some(rect) = crop {
        options = options.crop(rect.left, rect.top, rect.width, rect.height);
    }
    fir::Resizer::new()
        .resize(&src_view, &mut dst_image, Some(&options))
        .context("wallpaper resize failed")?;
    RgbaImage::from_raw(target_w, target_h, dst_image.into_vec())
        .ok_or_else(|| anyhow::anyhow!("failed to construct resized RGBA image"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_crops_wide_image_on_lock_screen() {
        let image = RgbaImage::from_pixel(400, 100, Rgba([200, 100, 50, 255]));
        let plan = fit(400, 100, 100, 200, Target::LockScreen, PlacementMode::Half).unwrap();
        assert_eq!((plan.scaled_w, plan.scaled_h), (800, 200));
        assert_eq!((plan.offset_x, plan.offset_y), (-350, 0));

        let canvas = render(&image, &plan).unwrap();
        assert_eq!(canvas.dimensions(), (100, 200));
        let px = canvas.get_pixel(50, 100);
        assert!(px[0] > 150 && px[2] < 100, "unexpected pixel {px:?}");
    }

    #[test]
    fn render_direct_plan_returns_scaled_image() {
        let image = RgbaImage::from_pixel(300, 200, Rgba([1, 2, 3, 255]));
        let plan = fit(300, 200, 100, 200, Target::HomeScreen, PlacementMode::Full).unwrap();
        assert!(plan.direct);
        let out = render(&image, &plan).unwrap();
        assert_eq!(out.dimensions(), (300, 200));
    }

    #[test]
    fn render_home_screen_keeps_scaled_canvas() {
        let image = RgbaImage::from_pixel(300, 200, Rgba([9, 9, 9, 255]));
        let plan = fit(300, 200, 100, 200, Target::HomeScreen, PlacementMode::Half).unwrap();
        assert_eq!((plan.canvas_w, plan.canvas_h), (300, 200));
        assert_eq!(plan.offset_x, -100);
        let out = render(&image, &plan).unwrap();
        assert_eq!(out.dimensions(), (300, 200));
        // The right-hand strip past the shifted image stays black.
        assert_eq!(out.get_pixel(250, 100), &Rgba([0, 0, 0, 255]));
        assert_eq!(out.get_pixel(10, 100), &Rgba([9, 9, 9, 255]));
    }

    #[test]
    fn lock_screen_render_only_resamples_visible_window() {
        // A 65000x1 strip scales to 152100000x2340; the canvas stays screen sized.
        let image = RgbaImage::from_pixel(65_000, 1, Rgba([30, 60, 90, 255]));
        let plan = fit(65_000, 1, 1080, 2340, Target::LockScreen, PlacementMode::Half).unwrap();
        assert_eq!((plan.scaled_w, plan.scaled_h), (152_100_000, 2340));
        let canvas = render(&image, &plan).unwrap();
        assert_eq!(canvas.dimensions(), (1080, 2340));
        let px = canvas.get_pixel(540, 1170);
        assert!(px[0].abs_diff(30) <= 2 && px[2].abs_diff(90) <= 2, "unexpected pixel {px:?}");
    }

    #[test]
    fn oversized_home_canvas_is_refused() {
        let image = RgbaImage::from_pixel(4000, 40, Rgba([1, 1, 1, 255]));
        let plan = fit(4000, 40, 1080, 2340, Target::HomeScreen, PlacementMode::Half).unwrap();
        let err = render(&image, &plan).unwrap_err();
        assert!(err.to_string().contains("pixel budget"), "{err:#}");

        let direct = fit(4000, 40, 1080, 2340, Target::HomeScreen, PlacementMode::Full).unwrap();
        assert!(render(&image, &direct).is_err());
    }

    #[test]
    fn scaled_dimension_overflow_is_an_error() {
        assert!(scale_to_screen(u32::MAX, 1, 1, u32::MAX).is_err());
    }

    #[test]
    fn visible_window_clips_to_canvas() {
        let plan = fit(400, 100, 100, 200, Target::LockScreen, PlacementMode::Half).unwrap();
        let window = visible_window((400, 100), &plan).unwrap();
        assert_eq!((window.x, window.y, window.width, window.height), (0, 0, 100, 200));
        assert_eq!(window.source.left, 175.0);
        assert_eq!(window.source.width, 50.0);
        assert_eq!(window.source.height, 100.0);
    }
}
