//! Canvas fingerprint probe.
//!
//! Rasterizes a fixed probe scene (rectangles, two text runs, a filled
//! circle, a three-stop gradient, a stroked bezier) into an offscreen RGBA
//! surface and hashes the pixel data with MurmurHash3, formatted base-36.
//! The scene never changes; differences between devices come from the render
//! quirks the environment supplies (antialiasing bias and the glyph seed),
//! so the hash is stable per device and divergent across devices.

/// Sentinel for environments with no canvas capability at all.
pub const NO_CANVAS: &str = "no-canvas";
/// Sentinel for environments whose canvas failed mid-render.
pub const CANVAS_ERROR: &str = "canvas-error";

const SURFACE_WIDTH: u32 = 280;
const SURFACE_HEIGHT: u32 = 60;

/// Render characteristics of the host surface.
#[derive(Debug, Clone, PartialEq)]
pub struct CanvasQuirks {
    /// Edge-coverage alpha shift, standing in for driver antialiasing.
    pub antialias_bias: u8,
    /// Seed mixed into glyph rasterization, standing in for the host's font
    /// rendering stack.
    pub glyph_seed: u32,
    /// Backing surface dimensions. A degenerate surface fails the render.
    pub surface: (u32, u32),
}

impl Default for CanvasQuirks {
    fn default() -> Self {
        Self {
            antialias_bias: 0,
            glyph_seed: 0,
            surface: (SURFACE_WIDTH, SURFACE_HEIGHT),
        }
    }
}

/// Render the probe scene and hash it. Sentinel on render failure.
pub fn canvas_fingerprint(quirks: &CanvasQuirks) -> String {
    match render_probe_scene(quirks) {
        Some(surface) => to_base36(murmur3_32(&surface.pixels, 0)),
        None => CANVAS_ERROR.to_string(),
    }
}

fn render_probe_scene(quirks: &CanvasQuirks) -> Option<Surface> {
    let (width, height) = quirks.surface;
    let mut surface = Surface::new(width, height)?;
    let bias = quirks.antialias_bias;

    surface.fill_rect(100, 1, 62, 20, [0xff, 0x66, 0x00, 0xff]);
    surface.draw_text(
        "Fingerprint Canvas",
        2,
        15,
        14,
        "Arial",
        [0x00, 0x66, 0x99, 0xff],
        quirks.glyph_seed,
    );
    surface.draw_text(
        "Security Check",
        4,
        45,
        18,
        "Times New Roman",
        [102, 204, 0, 178],
        quirks.glyph_seed,
    );
    surface.fill_circle(50.0, 50.0, 20.0, [0x8b, 0x45, 0x13, 0xff], bias);
    surface.gradient_fill(
        200,
        30,
        75,
        25,
        0.0,
        SURFACE_WIDTH as f32,
        &[
            (0.0, [0xff, 0x00, 0x00, 0xff]),
            (0.5, [0x00, 0x80, 0x00, 0xff]),
            (1.0, [0x00, 0x00, 0xff, 0xff]),
        ],
    );
    surface.stroke_bezier(
        (170.0, 10.0),
        (130.0, 100.0),
        (230.0, 100.0),
        (190.0, 10.0),
        [0xff, 0x14, 0x93, 0xff],
        bias,
    );

    Some(surface)
}

struct Surface {
    width: i32,
    height: i32,
    pixels: Vec<u8>,
}

impl Surface {
    fn new(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self {
            width: width as i32,
            height: height as i32,
            pixels: vec![0; width as usize * height as usize * 4],
        })
    }

    /// Source-over blend of one pixel. Out-of-bounds writes are dropped.
    fn blend(&mut self, x: i32, y: i32, color: [u8; 4]) {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return;
        }
        let idx = ((y * self.width + x) * 4) as usize;
        let alpha = color[3] as u32;
        let inverse = 255 - alpha;
        for channel in 0..3 {
            let src = color[channel] as u32;
            let dst = self.pixels[idx + channel] as u32;
            self.pixels[idx + channel] = ((src * alpha + dst * inverse) / 255) as u8;
        }
        let dst_alpha = self.pixels[idx + 3] as u32;
        self.pixels[idx + 3] = (alpha + dst_alpha * inverse / 255) as u8;
    }

    fn fill_rect(&mut self, x: i32, y: i32, w: i32, h: i32, color: [u8; 4]) {
        for py in y..y + h {
            for px in x..x + w {
                self.blend(px, py, color);
            }
        }
    }

    fn fill_circle(&mut self, cx: f32, cy: f32, radius: f32, color: [u8; 4], bias: u8) {
        let inner = (radius - 0.5) * (radius - 0.5);
        let outer = (radius + 0.5) * (radius + 0.5);
        let reach = radius.ceil() as i32 + 1;
        for py in (cy as i32 - reach)..=(cy as i32 + reach) {
            for px in (cx as i32 - reach)..=(cx as i32 + reach) {
                let dx = px as f32 + 0.5 - cx;
                let dy = py as f32 + 0.5 - cy;
                let dist = dx * dx + dy * dy;
                if dist <= inner {
                    self.blend(px, py, color);
                } else if dist < outer {
                    let edge = [color[0], color[1], color[2], color[3].saturating_sub(bias)];
                    self.blend(px, py, edge);
                }
            }
        }
    }

    fn gradient_fill(
        &mut self,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        x0: f32,
        x1: f32,
        stops: &[(f32, [u8; 4])],
    ) {
        let span = (x1 - x0).max(1.0);
        for px in x..x + w {
            let t = ((px as f32 - x0) / span).clamp(0.0, 1.0);
            let color = sample_gradient(stops, t);
            for py in y..y + h {
                self.blend(px, py, color);
            }
        }
    }

    fn stroke_bezier(
        &mut self,
        p0: (f32, f32),
        p1: (f32, f32),
        p2: (f32, f32),
        p3: (f32, f32),
        color: [u8; 4],
        bias: u8,
    ) {
        const STEPS: u32 = 240;
        let feather = [color[0], color[1], color[2], 140u8.saturating_sub(bias)];
        for i in 0..=STEPS {
            let t = i as f32 / STEPS as f32;
            let u = 1.0 - t;
            let x = u * u * u * p0.0 + 3.0 * u * u * t * p1.0 + 3.0 * u * t * t * p2.0 + t * t * t * p3.0;
            let y = u * u * u * p0.1 + 3.0 * u * u * t * p1.1 + 3.0 * u * t * t * p2.1 + t * t * t * p3.1;
            let (px, py) = (x.round() as i32, y.round() as i32);
            self.blend(px, py, color);
            self.blend(px + 1, py, feather);
            self.blend(px, py + 1, feather);
        }
    }

    fn draw_text(
        &mut self,
        text: &str,
        x: i32,
        baseline: i32,
        size: i32,
        font: &str,
        color: [u8; 4],
        seed: u32,
    ) {
        let cell_w = size * 3 / 5;
        let mut pen_x = x;
        for ch in text.chars() {
            if ch != ' ' {
                let glyph = glyph_bits(ch, font, seed);
                for gy in 0..size {
                    for gx in 0..cell_w {
                        let bit = (glyph >> ((gx as u32 * 7 + gy as u32 * 3) % 31)) & 1;
                        if bit == 1 {
                            self.blend(pen_x + gx, baseline - size + gy, color);
                        }
                    }
                }
            }
            pen_x += cell_w + 1;
        }
    }
}

/// Pseudo-glyph bit pattern for one character of one family.
fn glyph_bits(ch: char, font: &str, seed: u32) -> u32 {
    let mut hash = 0x811c_9dc5u32 ^ seed;
    for byte in font.bytes() {
        hash = (hash ^ byte as u32).wrapping_mul(0x0100_0193);
    }
    (hash ^ ch as u32).wrapping_mul(0x0100_0193)
}

fn sample_gradient(stops: &[(f32, [u8; 4])], t: f32) -> [u8; 4] {
    let Some(first) = stops.first() else {
        return [0, 0, 0, 0];
    };
    if t <= first.0 {
        return first.1;
    }
    for pair in stops.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        if t <= end.0 {
            let segment = (end.0 - start.0).max(f32::EPSILON);
            let local = (t - start.0) / segment;
            let mut color = [0u8; 4];
            for channel in 0..4 {
                let a = start.1[channel] as f32;
                let b = end.1[channel] as f32;
                color[channel] = (a + (b - a) * local).round() as u8;
            }
            return color;
        }
    }
    stops[stops.len() - 1].1
}

/// MurmurHash3 x86/32 over raw bytes.
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h1 = seed;
    let tail_start = data.len() - data.len() % 4;
    for chunk in data[..tail_start].chunks_exact(4) {
        let mut k1 = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k1 = k1.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h1 ^= k1;
        h1 = h1.rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = &data[tail_start..];
    if !tail.is_empty() {
        let mut k1: u32 = 0;
        for (i, &byte) in tail.iter().enumerate() {
            k1 ^= (byte as u32) << (8 * i);
        }
        k1 = k1.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h1 ^= k1;
    }

    h1 ^= data.len() as u32;
    h1 ^= h1 >> 16;
    h1 = h1.wrapping_mul(0x85eb_ca6b);
    h1 ^= h1 >> 13;
    h1 = h1.wrapping_mul(0xc2b2_ae35);
    h1 ^= h1 >> 16;
    h1
}

fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
