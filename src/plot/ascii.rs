//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks of a posterior or merit curve
//! - deterministic output (helpful for golden tests)
//!
//! Plot elements:
//! - curve: `-` line (broken wherever the value is not finite)
//! - selected candidates: `*`

use crate::domain::{ExtremumCandidate, MeritCurve, PosteriorResult};

/// What to put on the y axis of a posterior plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PosteriorScale {
    #[default]
    LogPdf,
    /// Normalized probability per sample.
    Probability,
}

impl PosteriorScale {
    fn label(self) -> &'static str {
        match self {
            PosteriorScale::LogPdf => "log-pdf",
            PosteriorScale::Probability => "p",
        }
    }
}

/// Plot a posterior; `marks` are grid indices to flag with `*`.
pub fn render_posterior_plot(
    posterior: &PosteriorResult,
    marks: &[usize],
    scale: PosteriorScale,
    width: usize,
    height: usize,
) -> String {
    let values = match scale {
        PosteriorScale::LogPdf => posterior.log_pdf.clone(),
        PosteriorScale::Probability => posterior.probabilities(),
    };
    let points: Vec<(f64, f64)> = posterior.redshifts.iter().copied().zip(values).collect();
    let marked: Vec<(f64, f64)> = marks
        .iter()
        .filter_map(|&i| points.get(i).copied())
        .collect();
    render_plot(scale.label(), &points, &marked, width, height)
}

/// Plot a merit curve with its extremum candidates.
pub fn render_merit_plot(
    curve: &MeritCurve,
    candidates: &[ExtremumCandidate],
    width: usize,
    height: usize,
) -> String {
    let points: Vec<(f64, f64)> = curve
        .redshifts()
        .iter()
        .copied()
        .zip(curve.merits().iter().copied())
        .collect();
    let marked: Vec<(f64, f64)> = candidates.iter().map(|c| (c.position, c.value)).collect();
    render_plot(curve.kind().label(), &points, &marked, width, height)
}

fn render_plot(
    label: &str,
    points: &[(f64, f64)],
    marks: &[(f64, f64)],
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (z_min, z_max) = x_range(points).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = y_range(points).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Curve first so marks overlay it.
    draw_curve(&mut grid, points, z_min, z_max, y_min, y_max);

    for &(z, y) in marks {
        if !y.is_finite() {
            continue;
        }
        let x = map_x(z, z_min, z_max, width);
        let yy = map_y(y, y_min, y_max, height);
        grid[yy][x] = '*';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: z=[{z_min:.3}, {z_max:.3}] | {label}=[{y_min:.2}, {y_max:.2}]\n"
    ));

    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }

    out
}

fn x_range(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    let mut min_z = f64::INFINITY;
    let mut max_z = f64::NEG_INFINITY;
    for &(z, _) in points {
        min_z = min_z.min(z);
        max_z = max_z.max(z);
    }
    if !(min_z.is_finite() && max_z.is_finite()) {
        return None;
    }
    if max_z > min_z {
        Some((min_z, max_z))
    } else {
        Some((min_z - 0.5, max_z + 0.5))
    }
}

fn y_range(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for &(_, y) in points.iter().filter(|(_, y)| y.is_finite()) {
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }
    (min_y.is_finite() && max_y.is_finite()).then_some((min_y, max_y))
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = if span > 0.0 { span * frac } else { 0.5 };
    (min - pad, max + pad)
}

fn map_x(z: f64, z_min: f64, z_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((z - z_min) / (z_max - z_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(
    grid: &mut [Vec<char>],
    curve: &[(f64, f64)],
    z_min: f64,
    z_max: f64,
    y_min: f64,
    y_max: f64,
) {
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(z, y) in curve {
        if !y.is_finite() {
            prev = None;
            continue;
        }
        let x = map_x(z, z_min, z_max, width);
        let yy = map_y(y, y_min, y_max, height);
        if let Some((x0, y0)) = prev {
            draw_line(grid, x0, y0, x, yy, '-');
        } else {
            grid[yy][x] = '-';
        }
        prev = Some((x, yy));
    }
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
