//! World and biomes.
//!
//! The world is a fixed rectangle covered by static biome rectangles, drawn
//! in declaration order, with a translucent grid on top. What gets drawn each
//! frame is derived from the camera: a padded visible region for culling
//! biomes and cell-snapped bounds for the grid.

use arena_shared::{
    math::{Rect, Vec2},
    render::{Color, Stroke, Surface},
};

use crate::camera::Camera;

pub const WORLD_WIDTH: f32 = 15000.0;
pub const WORLD_HEIGHT: f32 = 15000.0;
/// Margin drawn beyond the viewport to avoid pop-in at the edges.
pub const RENDER_PADDING: f32 = 200.0;
pub const GRID_CELL: f32 = 90.0;

const GRID_STROKE: Stroke = Stroke {
    color: Color::rgba(59, 60, 54, 0.1),
    width: 5.0,
};

/// A static colored region.
#[derive(Debug, Clone, PartialEq)]
pub struct Biome {
    pub name: String,
    pub rect: Rect,
    pub color: Color,
}

impl Biome {
    pub fn new(name: &str, rect: Rect, color: Color) -> Self {
        Self {
            name: name.to_string(),
            rect,
            color,
        }
    }
}

/// Grid line extent, every value a multiple of [`GRID_CELL`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GridBounds {
    pub start_x: f32,
    pub start_y: f32,
    pub end_x: f32,
    pub end_y: f32,
}

/// Per-frame derived view of the world.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldView {
    pub visible: Rect,
    pub grid: GridBounds,
}

#[derive(Debug, Clone)]
pub struct World {
    pub width: f32,
    pub height: f32,
    biomes: Vec<Biome>,
    view: WorldView,
}

impl Default for World {
    fn default() -> Self {
        Self::new(WORLD_WIDTH, WORLD_HEIGHT, default_biomes())
    }
}

impl World {
    pub fn new(width: f32, height: f32, biomes: Vec<Biome>) -> Self {
        Self {
            width,
            height,
            biomes,
            view: WorldView::default(),
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }

    pub fn biomes(&self) -> &[Biome] {
        &self.biomes
    }

    /// View computed by the last [`World::update_view`] or [`World::draw`].
    pub fn view(&self) -> &WorldView {
        &self.view
    }

    /// Padded viewport clamped to the world rectangle.
    pub fn compute_visible_region(&self, camera: &Camera) -> Rect {
        let x = (camera.position.x - RENDER_PADDING).clamp(0.0, self.width);
        let y = (camera.position.y - RENDER_PADDING).clamp(0.0, self.height);
        let w = (self.width - x).min(camera.viewport.x + RENDER_PADDING * 2.0);
        let h = (self.height - y).min(camera.viewport.y + RENDER_PADDING * 2.0);
        Rect::new(x, y, w.max(0.0), h.max(0.0))
    }

    /// Grid extent covering the padded viewport, snapped outward to whole cells.
    pub fn compute_grid_bounds(&self, camera: &Camera) -> GridBounds {
        let snap_down = |v: f32| (v / GRID_CELL).floor() * GRID_CELL;
        let snap_up = |v: f32| (v / GRID_CELL).ceil() * GRID_CELL;
        GridBounds {
            start_x: snap_down(camera.position.x - RENDER_PADDING),
            start_y: snap_down(camera.position.y - RENDER_PADDING),
            end_x: snap_up(camera.position.x + camera.viewport.x + RENDER_PADDING),
            end_y: snap_up(camera.position.y + camera.viewport.y + RENDER_PADDING),
        }
    }

    pub fn update_view(&mut self, camera: &Camera) -> WorldView {
        self.view = WorldView {
            visible: self.compute_visible_region(camera),
            grid: self.compute_grid_bounds(camera),
        };
        self.view
    }

    /// Biomes overlapping the visible region, in draw order.
    pub fn visible_biomes(&self, visible: &Rect) -> impl Iterator<Item = &Biome> {
        let visible = *visible;
        self.biomes.iter().filter(move |b| b.rect.intersects(&visible))
    }

    /// Clears the frame and paints biomes then grid lines.
    pub fn draw(&mut self, camera: &Camera, surface: &mut dyn Surface) {
        let view = self.update_view(camera);
        let offset = Vec2::ZERO - camera.position;

        surface.clear();
        for biome in self.visible_biomes(&view.visible) {
            surface.fill_rect(biome.rect.translate(offset), biome.color);
        }

        let grid = view.grid;
        let columns = ((grid.end_x - grid.start_x) / GRID_CELL).round() as i64;
        for i in 0..=columns {
            let x = grid.start_x + i as f32 * GRID_CELL;
            surface.stroke_line(
                Vec2::new(x, grid.start_y) + offset,
                Vec2::new(x, grid.end_y) + offset,
                GRID_STROKE,
            );
        }
        let rows = ((grid.end_y - grid.start_y) / GRID_CELL).round() as i64;
        for j in 0..=rows {
            let y = grid.start_y + j as f32 * GRID_CELL;
            surface.stroke_line(
                Vec2::new(grid.start_x, y) + offset,
                Vec2::new(grid.end_x, y) + offset,
                GRID_STROKE,
            );
        }
    }
}

/// The stock map: a forest base layer striped with winter, rivers and desert.
pub fn default_biomes() -> Vec<Biome> {
    vec![
        Biome::new(
            "default forest",
            Rect::new(0.0, 0.0, 15000.0, 15000.0),
            Color::rgb(0x78, 0x8f, 0x57),
        ),
        Biome::new(
            "winter",
            Rect::new(0.0, 0.0, 15000.0, 3000.0),
            Color::rgb(0xcc, 0xcc, 0xdf),
        ),
        Biome::new(
            "first river",
            Rect::new(0.0, 3000.0, 15000.0, 750.0),
            Color::rgb(0x2c, 0x8c, 0x9c),
        ),
        Biome::new(
            "top forest",
            Rect::new(0.0, 4800.0, 15000.0, 950.0),
            Color::rgb(0x77, 0x97, 0x36),
        ),
        Biome::new(
            "second river",
            Rect::new(0.0, 5750.0, 15000.0, 1000.0),
            Color::rgb(0x34, 0x65, 0xaa),
        ),
        Biome::new(
            "bottom forest",
            Rect::new(0.0, 6750.0, 15000.0, 950.0),
            Color::rgb(0x77, 0x97, 0x36),
        ),
        Biome::new(
            "desert",
            Rect::new(0.0, 9000.0, 15000.0, 3000.0),
            Color::rgb(0xb8, 0x84, 0x54),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_shared::render::{DrawCmd, RecordingSurface};

    fn camera_at(x: f32, y: f32) -> Camera {
        let mut cam = Camera::new(Vec2::new(1920.0, 1152.0));
        cam.position = Vec2::new(x, y);
        cam
    }

    fn sample_positions() -> Vec<(f32, f32)> {
        let mut out = Vec::new();
        for &x in &[-20000.0, -825.0, -1.0, 0.0, 12.5, 199.0, 7000.0, 14900.0, 15000.0, 40000.0] {
            for &y in &[-541.0, 0.0, 3333.0, 14999.5, 22000.0] {
                out.push((x, y));
            }
        }
        out
    }

    #[test]
    fn visible_region_stays_inside_world() {
        let world = World::default();
        for (x, y) in sample_positions() {
            let visible = world.compute_visible_region(&camera_at(x, y));
            assert!(
                world.bounds().contains_rect(&visible),
                "camera ({x},{y}) gave {visible:?}"
            );
        }
    }

    #[test]
    fn grid_bounds_are_snapped_and_cover_padded_viewport() {
        let world = World::default();
        for (x, y) in sample_positions() {
            let cam = camera_at(x, y);
            let g = world.compute_grid_bounds(&cam);
            for v in [g.start_x, g.start_y, g.end_x, g.end_y] {
                assert_eq!((v / GRID_CELL).fract(), 0.0, "{v} not a multiple of 90");
            }
            let padded = cam.rect().expand(RENDER_PADDING);
            assert!(g.start_x <= padded.x && g.start_y <= padded.y);
            assert!(g.end_x >= padded.right() && g.end_y >= padded.bottom());
        }
    }

    #[test]
    fn culls_biomes_outside_visible_region() {
        let world = World::new(
            1000.0,
            1000.0,
            vec![
                Biome::new("inside", Rect::new(100.0, 100.0, 50.0, 50.0), Color::rgb(1, 1, 1)),
                Biome::new("outside", Rect::new(900.0, 900.0, 50.0, 50.0), Color::rgb(2, 2, 2)),
                Biome::new("touching", Rect::new(500.0, 0.0, 10.0, 10.0), Color::rgb(3, 3, 3)),
            ],
        );
        let visible = Rect::new(0.0, 0.0, 500.0, 500.0);
        let names: Vec<_> = world.visible_biomes(&visible).map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["inside"]);
    }

    #[test]
    fn draw_clears_then_paints_in_declaration_order() {
        let mut world = World::default();
        let cam = camera_at(0.0, 2500.0);
        let mut surface = RecordingSurface::new();
        world.draw(&cam, &mut surface);

        assert_eq!(surface.commands.first(), Some(&DrawCmd::Clear));
        let fills = surface.filled_rects();
        // Visible y range is 2300..3852: base forest, winter and first river.
        let colors: Vec<_> = fills.iter().map(|(_, c)| *c).collect();
        assert_eq!(
            colors,
            vec![
                Color::rgb(0x78, 0x8f, 0x57),
                Color::rgb(0xcc, 0xcc, 0xdf),
                Color::rgb(0x2c, 0x8c, 0x9c),
            ]
        );
        // Rectangles are shifted into screen space.
        assert_eq!(fills[2].0, Rect::new(0.0, 500.0, 15000.0, 750.0));

        let lines = surface
            .commands
            .iter()
            .filter(|c| matches!(c, DrawCmd::StrokeLine(..)))
            .count();
        let g = world.view().grid;
        let expected = ((g.end_x - g.start_x) / GRID_CELL) as usize
            + 1
            + ((g.end_y - g.start_y) / GRID_CELL) as usize
            + 1;
        assert_eq!(lines, expected);
    }
}
