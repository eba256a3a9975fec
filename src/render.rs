use crate::types::{CellLabel, Solution};

const CELL_W: usize = 4;
const CELL_H: usize = 2;

/// Draws a layout as ASCII art. Walls are drawn wherever two neighbouring
/// cells belong to different apartments, circulation is hatched with `#`
/// and each apartment carries its id in its first cell.
pub fn render_solution(solution: &Solution) -> String {
    let w = solution.width as usize;
    let h = solution.height as usize;
    if w == 0 || h == 0 {
        return String::new();
    }

    let cols = w * CELL_W + 1;
    let rows = h * CELL_H + 1;
    let mut canvas = vec![vec![' '; cols]; rows];
    let label = |x: usize, y: usize| solution.assignment[y][x];

    for y in 0..h {
        for x in 0..w {
            if label(x, y) == CellLabel::Circulation {
                for row in canvas.iter_mut().take((y + 1) * CELL_H + 1).skip(y * CELL_H) {
                    for ch in row.iter_mut().take((x + 1) * CELL_W + 1).skip(x * CELL_W) {
                        *ch = '#';
                    }
                }
            }
        }
    }

    draw_rect(&mut canvas, 0, 0, cols - 1, rows - 1);

    for y in 0..h {
        for x in 0..w {
            if x + 1 < w && label(x, y) != label(x + 1, y) {
                let cx = (x + 1) * CELL_W;
                for cy in y * CELL_H..=(y + 1) * CELL_H {
                    put_vertical(&mut canvas, cx, cy);
                }
            }
            if y + 1 < h && label(x, y) != label(x, y + 1) {
                let cy = (y + 1) * CELL_H;
                for cx in x * CELL_W..=(x + 1) * CELL_W {
                    put_horizontal(&mut canvas, cx, cy);
                }
            }
        }
    }

    for p in &solution.placements {
        let Some(first) = p.cells.iter().min_by_key(|c| (c.y, c.x)) else {
            continue;
        };
        let sx = first.x as usize * CELL_W + 1;
        let sy = first.y as usize * CELL_H + 1;
        for (i, ch) in p.id.to_string().chars().take(CELL_W - 1).enumerate() {
            canvas[sy][sx + i] = ch;
        }
    }

    let mut result = String::new();
    for row in &canvas {
        let line: String = row.iter().collect();
        result.push_str(line.trim_end());
        result.push('\n');
    }
    result
}

/// One line per apartment: id, type, area and the measures used for ranking.
pub fn legend(solution: &Solution) -> String {
    let (cw, ch) = solution.cell_size;
    let mut out = String::new();
    for p in &solution.placements {
        out.push_str(&format!(
            "  {:>2}  {:<7} {:>3} cells {:>7.1} m2  facade {}  compactness {}\n",
            p.id,
            p.label,
            p.area(),
            p.area() as f64 * cw * ch,
            p.facade_count,
            p.compactness,
        ));
    }
    out
}

fn put_horizontal(canvas: &mut [Vec<char>], x: usize, y: usize) {
    if let Some(ch) = canvas.get_mut(y).and_then(|row| row.get_mut(x)) {
        *ch = if *ch == '|' || *ch == '+' { '+' } else { '-' };
    }
}

fn put_vertical(canvas: &mut [Vec<char>], x: usize, y: usize) {
    if let Some(ch) = canvas.get_mut(y).and_then(|row| row.get_mut(x)) {
        *ch = if *ch == '-' || *ch == '+' { '+' } else { '|' };
    }
}

fn draw_rect(canvas: &mut [Vec<char>], x: usize, y: usize, w: usize, h: usize) {
    for i in x..=x + w {
        put_horizontal(canvas, i, y);
        put_horizontal(canvas, i, y + h);
    }
    for j in y..=y + h {
        put_vertical(canvas, x, j);
        put_vertical(canvas, x + w, j);
    }
    for &cx in &[x, x + w] {
        for &cy in &[y, y + h] {
            if let Some(ch) = canvas.get_mut(cy).and_then(|row| row.get_mut(cx)) {
                *ch = '+';
            }
        }
    }
}
