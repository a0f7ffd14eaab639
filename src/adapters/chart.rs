use crate::domain::model::LinearFit;
use crate::domain::ports::{ChartRenderer, ConfigProvider};
use crate::utils::error::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([40, 40, 40]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const POINT: Rgb<u8> = Rgb([31, 119, 180]);
const FIT_LINE: Rgb<u8> = Rgb([214, 39, 40]);

const MARGIN_LEFT: u32 = 56;
const MARGIN_RIGHT: u32 = 24;
const MARGIN_TOP: u32 = 24;
const MARGIN_BOTTOM: u32 = 48;
const TICKS: u32 = 5;
const POINT_RADIUS: i64 = 4;
/// Dotted line: draw `DOT_ON` pixels, skip `DOT_OFF`.
const DOT_ON: usize = 4;
const DOT_OFF: usize = 4;

const GLYPH_W: i64 = 5;
const GLYPH_H: i64 = 7;
const LABEL_SCALE: i64 = 2;
const X_LABEL: &str = "Rank";
const Y_LABEL: &str = "Peak";
const LEGEND_POINTS: &str = "Data";
const LEGEND_FIT: &str = "Regression";

/// 5x7 bitmaps for the characters used by labels, legend and tick values.
/// Each row is five bits, most significant on the left.
fn glyph(c: char) -> Option<[u8; 7]> {
    let rows = match c {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'a' => [0x00, 0x00, 0x0E, 0x01, 0x0F, 0x11, 0x0F],
        'e' => [0x00, 0x00, 0x0E, 0x11, 0x1F, 0x10, 0x0E],
        'g' => [0x00, 0x0F, 0x11, 0x11, 0x0F, 0x01, 0x0E],
        'i' => [0x04, 0x00, 0x0C, 0x04, 0x04, 0x04, 0x0E],
        'k' => [0x10, 0x10, 0x12, 0x14, 0x18, 0x14, 0x12],
        'n' => [0x00, 0x00, 0x16, 0x19, 0x11, 0x11, 0x11],
        'o' => [0x00, 0x00, 0x0E, 0x11, 0x11, 0x11, 0x0E],
        'r' => [0x00, 0x00, 0x16, 0x19, 0x10, 0x10, 0x10],
        's' => [0x00, 0x00, 0x0E, 0x10, 0x0E, 0x01, 0x1E],
        't' => [0x08, 0x08, 0x1C, 0x08, 0x08, 0x09, 0x06],
        ' ' => [0x00; 7],
        _ => return None,
    };
    Some(rows)
}

fn text_width(text: &str, scale: i64) -> i64 {
    let n = text.chars().count() as i64;
    (n * (GLYPH_W + 1) - 1).max(0) * scale
}

/// Tick value text; one decimal unless the axis spans ten units or more.
fn tick_label(value: f64, span: f64) -> String {
    let text = if span >= 10.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value)
    };
    if text.trim_start_matches('-').chars().all(|c| c == '0' || c == '.') {
        text.trim_start_matches('-').to_string()
    } else {
        text
    }
}

/// Rasterizes the scatter plot into a PNG.
#[derive(Debug, Clone)]
pub struct PngChartRenderer {
    width: u32,
    height: u32,
}

impl PngChartRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn from_config<C: ConfigProvider>(config: &C) -> Self {
        let (width, height) = config.chart_size();
        Self::new(width, height)
    }
}

/// Value range padded by 5% on each side; a flat range is widened to ±1.
fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if (hi - lo).abs() < f64::EPSILON {
        return (lo - 1.0, hi + 1.0);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad, hi + pad)
}

struct Canvas {
    image: RgbImage,
    left: f64,
    top: f64,
    plot_w: f64,
    plot_h: f64,
    x_range: (f64, f64),
    y_range: (f64, f64),
}

impl Canvas {
    fn to_pixel(&self, x: f64, y: f64) -> (i64, i64) {
        let fx = (x - self.x_range.0) / (self.x_range.1 - self.x_range.0);
        let fy = (y - self.y_range.0) / (self.y_range.1 - self.y_range.0);
        let px = self.left + fx * self.plot_w;
        let py = self.top + self.plot_h - fy * self.plot_h;
        (px.round() as i64, py.round() as i64)
    }

    fn put(&mut self, x: i64, y: i64, color: Rgb<u8>) {
        if x >= 0 && y >= 0 && (x as u32) < self.image.width() && (y as u32) < self.image.height() {
            self.image.put_pixel(x as u32, y as u32, color);
        }
    }

    /// Bresenham line; `dotted` skips pixels in a fixed on/off pattern.
    fn line(&mut self, from: (i64, i64), to: (i64, i64), color: Rgb<u8>, dotted: bool) {
        let (mut x, mut y) = from;
        let dx = (to.0 - x).abs();
        let dy = -(to.1 - y).abs();
        let sx = if x < to.0 { 1 } else { -1 };
        let sy = if y < to.1 { 1 } else { -1 };
        let mut err = dx + dy;
        let mut step = 0usize;

        loop {
            if !dotted || step % (DOT_ON + DOT_OFF) < DOT_ON {
                self.put(x, y, color);
            }
            if x == to.0 && y == to.1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
            step += 1;
        }
    }

    fn disc(&mut self, center: (i64, i64), radius: i64, color: Rgb<u8>) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.put(center.0 + dx, center.1 + dy, color);
                }
            }
        }
    }

    fn text(&mut self, origin: (i64, i64), text: &str, scale: i64, color: Rgb<u8>) {
        let mut x = origin.0;
        for c in text.chars() {
            if let Some(rows) = glyph(c) {
                for (row, bits) in (0i64..).zip(rows) {
                    for col in 0..GLYPH_W {
                        if (bits >> (GLYPH_W - 1 - col)) & 1 == 0 {
                            continue;
                        }
                        for dy in 0..scale {
                            for dx in 0..scale {
                                self.put(x + col * scale + dx, origin.1 + row * scale + dy, color);
                            }
                        }
                    }
                }
            }
            x += (GLYPH_W + 1) * scale;
        }
    }

    fn fill_rect(&mut self, from: (i64, i64), to: (i64, i64), color: Rgb<u8>) {
        for y in from.1..=to.1 {
            for x in from.0..=to.0 {
                self.put(x, y, color);
            }
        }
    }

    fn labels(&mut self) {
        let left = self.left as i64;
        let top = self.top as i64;
        let bottom = (self.top + self.plot_h) as i64;
        let center_x = (self.left + self.plot_w / 2.0) as i64;

        let x_span = self.x_range.1 - self.x_range.0;
        let y_span = self.y_range.1 - self.y_range.0;
        for i in 0..=TICKS {
            let f = f64::from(i) / f64::from(TICKS);

            let gx = (self.left + f * self.plot_w).round() as i64;
            let label = tick_label(self.x_range.0 + f * x_span, x_span);
            self.text((gx - text_width(&label, 1) / 2, bottom + 8), &label, 1, AXIS);

            let gy = (self.top + self.plot_h - f * self.plot_h).round() as i64;
            let label = tick_label(self.y_range.0 + f * y_span, y_span);
            self.text((left - 8 - text_width(&label, 1), gy - GLYPH_H / 2), &label, 1, AXIS);
        }

        let x_label_w = text_width(X_LABEL, LABEL_SCALE);
        self.text((center_x - x_label_w / 2, bottom + 22), X_LABEL, LABEL_SCALE, AXIS);
        self.text((left - 40, top - GLYPH_H * LABEL_SCALE - 4), Y_LABEL, LABEL_SCALE, AXIS);
    }

    /// Box in the plot's top-right corner naming the points and the fit line.
    fn legend(&mut self) {
        let right = (self.left + self.plot_w) as i64;
        let top = self.top as i64;
        let width = 24 + text_width(LEGEND_FIT, 1) + 6;
        let (x, y) = (right - width - 6, top + 6);

        self.fill_rect((x, y), (x + width, y + 30), BACKGROUND);
        self.line((x, y), (x + width, y), GRID, false);
        self.line((x, y + 30), (x + width, y + 30), GRID, false);
        self.line((x, y), (x, y + 30), GRID, false);
        self.line((x + width, y), (x + width, y + 30), GRID, false);

        self.disc((x + 11, y + 9), 3, POINT);
        self.text((x + 24, y + 6), LEGEND_POINTS, 1, AXIS);

        self.line((x + 4, y + 21), (x + 18, y + 21), FIT_LINE, true);
        self.line((x + 4, y + 22), (x + 18, y + 22), FIT_LINE, true);
        self.text((x + 24, y + 18), LEGEND_FIT, 1, AXIS);
    }

    fn frame(&mut self) {
        let left = self.left as i64;
        let top = self.top as i64;
        let right = (self.left + self.plot_w) as i64;
        let bottom = (self.top + self.plot_h) as i64;

        for i in 0..=TICKS {
            let f = f64::from(i) / f64::from(TICKS);
            let gx = (self.left + f * self.plot_w).round() as i64;
            let gy = (self.top + f * self.plot_h).round() as i64;
            self.line((gx, top), (gx, bottom), GRID, false);
            self.line((left, gy), (right, gy), GRID, false);
            self.line((gx, bottom), (gx, bottom + 5), AXIS, false);
            self.line((left - 5, gy), (left, gy), AXIS, false);
        }

        self.line((left, bottom), (right, bottom), AXIS, false);
        self.line((left, top), (left, bottom), AXIS, false);
    }
}

impl ChartRenderer for PngChartRenderer {
    fn render(&self, points: &[(f64, f64)], fit: &LinearFit) -> Result<Vec<u8>> {
        let x_range = padded_range(points.iter().map(|p| p.0));
        let (x_min, x_max) = points
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p.0), hi.max(p.0))
            });
        let y_range = padded_range(
            points
                .iter()
                .map(|p| p.1)
                .chain([fit.predict(x_min), fit.predict(x_max)]),
        );

        let mut canvas = Canvas {
            image: RgbImage::from_pixel(self.width, self.height, BACKGROUND),
            left: f64::from(MARGIN_LEFT),
            top: f64::from(MARGIN_TOP),
            plot_w: f64::from(self.width.saturating_sub(MARGIN_LEFT + MARGIN_RIGHT).max(1)),
            plot_h: f64::from(self.height.saturating_sub(MARGIN_TOP + MARGIN_BOTTOM).max(1)),
            x_range,
            y_range,
        };

        canvas.frame();

        for &(x, y) in points {
            let center = canvas.to_pixel(x, y);
            canvas.disc(center, POINT_RADIUS, POINT);
        }

        if x_min.is_finite() && x_max.is_finite() {
            let start = canvas.to_pixel(x_min, fit.predict(x_min));
            let end = canvas.to_pixel(x_max, fit.predict(x_max));
            canvas.line(start, end, FIT_LINE, true);
            // thicken
            canvas.line((start.0, start.1 + 1), (end.0, end.1 + 1), FIT_LINE, true);
        }

        canvas.labels();
        canvas.legend();

        let mut bytes = Vec::new();
        canvas
            .image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;

        tracing::debug!(
            points = points.len(),
            bytes = bytes.len(),
            "chart rendered"
        );
        Ok(bytes)
    }

    fn mime_type(&self) -> &'static str {
        "image/png"
    }
}

/// `data:<mime>;base64,<payload>` for embedding in an `<img src>`.
pub fn to_data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

    #[test]
    fn test_render_produces_png_of_configured_size() {
        let renderer = PngChartRenderer::new(320, 240);
        let points = [(1.0, 1.0), (2.0, 3.0), (3.0, 2.0), (4.0, 5.0)];
        let fit = LinearFit {
            slope: 1.1,
            intercept: 0.0,
        };

        let bytes = renderer.render(&points, &fit).unwrap();
        assert!(bytes.starts_with(PNG_MAGIC));

        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Png).unwrap();
        assert_eq!(decoded.width(), 320);
        assert_eq!(decoded.height(), 240);
    }

    #[test]
    fn test_render_single_point() {
        let renderer = PngChartRenderer::new(200, 200);
        let fit = LinearFit {
            slope: 0.0,
            intercept: 7.0,
        };
        let bytes = renderer.render(&[(3.0, 7.0)], &fit).unwrap();
        assert!(bytes.starts_with(PNG_MAGIC));
    }

    #[test]
    fn test_points_are_drawn_in_point_color() {
        let renderer = PngChartRenderer::new(300, 300);
        let fit = LinearFit {
            slope: 0.0,
            intercept: 0.0,
        };
        let bytes = renderer.render(&[(0.0, 0.0), (10.0, 10.0)], &fit).unwrap();
        let img = image::load_from_memory(&bytes).unwrap().to_rgb8();

        assert!(img.pixels().any(|p| *p == POINT));
        assert!(img.pixels().any(|p| *p == FIT_LINE));
    }

    #[test]
    fn test_label_characters_all_have_glyphs() {
        for text in [X_LABEL, Y_LABEL, LEGEND_POINTS, LEGEND_FIT, "-0.123456789"] {
            assert!(text.chars().all(|c| glyph(c).is_some()), "{text}");
        }
    }

    #[test]
    fn test_tick_labels() {
        assert_eq!(tick_label(2.24, 4.0), "2.2");
        assert_eq!(tick_label(47.6, 50.0), "48");
        assert_eq!(tick_label(-0.01, 4.0), "0.0");
    }

    #[test]
    fn test_axis_label_and_legend_are_drawn() {
        let renderer = PngChartRenderer::new(320, 240);
        let fit = LinearFit {
            slope: 1.0,
            intercept: 0.0,
        };
        let bytes = renderer.render(&[(1.0, 1.0), (5.0, 5.0)], &fit).unwrap();
        let img = image::load_from_memory(&bytes).unwrap().to_rgb8();

        // "Rank" sits under the tick labels, below the plot area
        let bottom = MARGIN_TOP + (240 - MARGIN_TOP - MARGIN_BOTTOM);
        let label_ink = (bottom + 20..240)
            .flat_map(|y| (0..320).map(move |x| (x, y)))
            .filter(|&(x, y)| *img.get_pixel(x, y) == AXIS)
            .count();
        assert!(label_ink > 20);

        // legend swatch for the fit line, in the top-right corner
        let right = 320 - MARGIN_RIGHT;
        let legend_fit = (MARGIN_TOP..MARGIN_TOP + 40)
            .flat_map(|y| (right - 100..right).map(move |x| (x, y)))
            .any(|(x, y)| *img.get_pixel(x, y) == FIT_LINE);
        assert!(legend_fit);
    }

    #[test]
    fn test_data_uri_prefix() {
        let uri = to_data_uri("image/png", &[1, 2, 3]);
        assert_eq!(uri, "data:image/png;base64,AQID");
    }
}
