use anyhow::{anyhow, Context, Result};
use tiny_skia::{
    BlendMode, Color, FillRule, LineCap, LineJoin, Paint, PathBuilder, Pixmap, PixmapPaint, Rect,
    Stroke, Transform,
};

use super::history::HistoryStack;
use super::raster::Raster;
use super::tools::{Point, Shape, StrokeStyle, Tool};

#[derive(Clone, Copy, Debug)]
struct ActiveStroke {
    tool: Tool,
    style: StrokeStyle,
    start: Point,
    last: Point,
    moved: bool,
}

/// Freehand drawing surface backed by an owned pixmap.
///
/// Callers work in logical coordinates; the backing store is
/// `logical size * pixel_ratio` pixels and every paint goes through the same
/// scale transform.
pub struct StrokeSurface {
    pixmap: Pixmap,
    width: u32,
    height: u32,
    pixel_ratio: f32,
    history: HistoryStack<Pixmap>,
    active: Option<ActiveStroke>,
}

impl StrokeSurface {
    pub fn new(width: u32, height: u32, pixel_ratio: f32) -> Result<Self> {
        let pixel_ratio = if pixel_ratio.is_finite() && pixel_ratio > 0.0 {
            pixel_ratio
        } else {
            1.0
        };
        let backing_w = ((width as f32) * pixel_ratio).ceil() as u32;
        let backing_h = ((height as f32) * pixel_ratio).ceil() as u32;
        let pixmap = Pixmap::new(backing_w, backing_h)
            .ok_or_else(|| anyhow!("cannot allocate {backing_w}x{backing_h} canvas"))?;

        Ok(Self {
            pixmap,
            width,
            height,
            pixel_ratio,
            history: HistoryStack::new(),
            active: None,
        })
    }

    /// Replaces the canvas content with a persisted raster, scaled to the
    /// backing store. History is dropped.
    pub fn seed(&mut self, raster: &Raster) -> Result<()> {
        self.pixmap.fill(Color::TRANSPARENT);
        self.history.clear();
        self.active = None;

        let Some(source) = raster.decode().context("cannot seed canvas")? else {
            return Ok(());
        };

        if source.width() == self.pixmap.width() && source.height() == self.pixmap.height() {
            self.pixmap = source;
            return Ok(());
        }

        let sx = self.pixmap.width() as f32 / source.width() as f32;
        let sy = self.pixmap.height() as f32 / source.height() as f32;
        self.pixmap.draw_pixmap(
            0,
            0,
            source.as_ref(),
            &PixmapPaint::default(),
            Transform::from_scale(sx, sy),
            None,
        );
        Ok(())
    }

    pub fn logical_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn snapshot(&self) -> Result<Raster> {
        Raster::encode(&self.pixmap)
    }

    pub fn begin_stroke(&mut self, point: Point, tool: Tool, style: StrokeStyle) {
        self.history.push(self.pixmap.clone());
        self.active = Some(ActiveStroke {
            tool,
            style,
            start: point,
            last: point,
            moved: false,
        });
    }

    pub fn extend_stroke(&mut self, point: Point) {
        let Some(mut stroke) = self.active else {
            return;
        };
        if !stroke.tool.is_freehand() {
            stroke.last = point;
            self.active = Some(stroke);
            return;
        }

        self.paint_segment(&stroke, stroke.last, point);
        stroke.last = point;
        stroke.moved = true;
        self.active = Some(stroke);
    }

    /// Finishes the current stroke and returns the encoded canvas.
    ///
    /// `None` when no stroke was in progress.
    pub fn end_stroke(&mut self, point: Point) -> Result<Option<Raster>> {
        let Some(stroke) = self.active.take() else {
            return Ok(None);
        };

        match stroke.tool {
            Tool::Pen | Tool::Eraser => {
                if stroke.last != point {
                    self.paint_segment(&stroke, stroke.last, point);
                } else if !stroke.moved {
                    self.paint_dot(&stroke, point);
                }
            }
            Tool::Shape(shape) => self.paint_shape(&stroke, shape, stroke.start, point),
        }

        self.snapshot().map(Some)
    }

    /// Restores the state before the last stroke. `None` if nothing to undo.
    pub fn undo(&mut self) -> Result<Option<Raster>> {
        self.active = None;
        match self.history.undo(self.pixmap.clone()) {
            Ok(previous) => {
                self.pixmap = previous;
                self.snapshot().map(Some)
            }
            Err(_) => Ok(None),
        }
    }

    pub fn redo(&mut self) -> Result<Option<Raster>> {
        self.active = None;
        match self.history.redo(self.pixmap.clone()) {
            Ok(next) => {
                self.pixmap = next;
                self.snapshot().map(Some)
            }
            Err(_) => Ok(None),
        }
    }

    pub fn reset(&mut self) {
        self.pixmap.fill(Color::TRANSPARENT);
        self.history.clear();
        self.active = None;
    }

    fn transform(&self) -> Transform {
        Transform::from_scale(self.pixel_ratio, self.pixel_ratio)
    }

    fn paint_segment(&mut self, stroke: &ActiveStroke, from: Point, to: Point) {
        let mut pb = PathBuilder::new();
        pb.move_to(from.x, from.y);
        pb.line_to(to.x, to.y);
        let Some(path) = pb.finish() else {
            return;
        };
        let paint = paint_for(stroke);
        let outline = outline_for(stroke);
        let transform = self.transform();
        self.pixmap.stroke_path(&path, &paint, &outline, transform, None);
    }

    fn paint_dot(&mut self, stroke: &ActiveStroke, at: Point) {
        let radius = (stroke.style.thickness * 0.5).max(0.5);
        let Some(path) = PathBuilder::from_circle(at.x, at.y, radius) else {
            return;
        };
        let paint = paint_for(stroke);
        let transform = self.transform();
        self.pixmap.fill_path(&path, &paint, FillRule::Winding, transform, None);
    }

    fn paint_shape(&mut self, stroke: &ActiveStroke, shape: Shape, start: Point, end: Point) {
        let Some(path) = shape_path(shape, start, end) else {
            log::debug!("skipping degenerate {shape:?} from {start:?} to {end:?}");
            return;
        };
        let paint = paint_for(stroke);
        let outline = outline_for(stroke);
        let transform = self.transform();
        self.pixmap.stroke_path(&path, &paint, &outline, transform, None);
    }
}

fn paint_for(stroke: &ActiveStroke) -> Paint<'static> {
    let mut paint = Paint::default();
    let [r, g, b, a] = stroke.style.color;
    paint.set_color_rgba8(r, g, b, a);
    paint.anti_alias = true;
    if stroke.tool == Tool::Eraser {
        paint.set_color_rgba8(0, 0, 0, 255);
        paint.blend_mode = BlendMode::Clear;
    }
    paint
}

fn outline_for(stroke: &ActiveStroke) -> Stroke {
    Stroke {
        width: stroke.style.thickness,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Default::default()
    }
}

fn shape_path(shape: Shape, start: Point, end: Point) -> Option<tiny_skia::Path> {
    match shape {
        Shape::Line => {
            let mut pb = PathBuilder::new();
            pb.move_to(start.x, start.y);
            pb.line_to(end.x, end.y);
            pb.finish()
        }
        Shape::Rect => rect_between(start, end).map(PathBuilder::from_rect),
        Shape::Square => {
            let dx = end.x - start.x;
            let dy = end.y - start.y;
            let side = dx.abs().max(dy.abs());
            let corner = Point::new(
                start.x + side * non_zero_signum(dx),
                start.y + side * non_zero_signum(dy),
            );
            rect_between(start, corner).map(PathBuilder::from_rect)
        }
        Shape::Circle => {
            let radius = start.distance(end);
            if radius <= f32::EPSILON {
                return None;
            }
            PathBuilder::from_circle(start.x, start.y, radius)
        }
        Shape::Triangle => {
            let mut pb = PathBuilder::new();
            pb.move_to((start.x + end.x) * 0.5, start.y);
            pb.line_to(end.x, end.y);
            pb.line_to(start.x, end.y);
            pb.close();
            pb.finish()
        }
    }
}

fn rect_between(a: Point, b: Point) -> Option<Rect> {
    Rect::from_ltrb(a.x.min(b.x), a.y.min(b.y), a.x.max(b.x), a.y.max(b.y))
}

fn non_zero_signum(value: f32) -> f32 {
    if value < 0.0 {
        -1.0
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: [u8; 4] = [255, 255, 255, 255];

    fn alpha_at(surface: &StrokeSurface, x: u32, y: u32) -> u8 {
        surface.pixmap().pixel(x, y).expect("pixel in bounds").alpha()
    }

    fn draw_line(
        surface: &mut StrokeSurface,
        tool: Tool,
        from: Point,
        to: Point,
        width: f32,
    ) -> Raster {
        surface.begin_stroke(from, tool, StrokeStyle::new(WHITE, width));
        surface.extend_stroke(Point::new((from.x + to.x) * 0.5, (from.y + to.y) * 0.5));
        surface
            .end_stroke(to)
            .expect("end stroke")
            .expect("stroke was active")
    }

    #[test]
    fn undo_then_redo_restores_each_raster() {
        let mut surface = StrokeSurface::new(64, 64, 1.0).expect("surface");
        let mut rasters = Vec::new();
        for i in 0..3 {
            let y = 10.0 + i as f32 * 15.0;
            rasters.push(draw_line(
                &mut surface,
                Tool::Pen,
                Point::new(4.0, y),
                Point::new(60.0, y),
                3.0,
            ));
        }

        for _ in 0..3 {
            surface.undo().expect("undo").expect("history not empty");
        }
        assert!(!surface.can_undo());

        for expected in &rasters {
            let restored = surface.redo().expect("redo").expect("redo not empty");
            assert_eq!(&restored, expected);
        }
        assert_eq!(surface.snapshot().expect("snapshot"), rasters[2]);
    }

    #[test]
    fn new_stroke_after_undo_invalidates_redo() {
        let mut surface = StrokeSurface::new(32, 32, 1.0).expect("surface");
        draw_line(&mut surface, Tool::Pen, Point::new(2.0, 2.0), Point::new(30.0, 2.0), 2.0);
        surface.undo().expect("undo");
        assert!(surface.can_redo());

        let (from, to) = (Point::new(2.0, 20.0), Point::new(30.0, 20.0));
        let after = draw_line(&mut surface, Tool::Pen, from, to, 2.0);
        assert!(surface.redo().expect("redo").is_none());
        assert_eq!(surface.snapshot().expect("snapshot"), after);
    }

    #[test]
    fn undo_and_redo_on_empty_history_are_noops() {
        let mut surface = StrokeSurface::new(16, 16, 1.0).expect("surface");
        let before = surface.snapshot().expect("snapshot");
        assert!(surface.undo().expect("undo").is_none());
        assert!(surface.redo().expect("redo").is_none());
        assert_eq!(surface.snapshot().expect("snapshot"), before);
    }

    #[test]
    fn eraser_only_clears_along_its_path() {
        let mut surface = StrokeSurface::new(100, 40, 1.0).expect("surface");
        draw_line(&mut surface, Tool::Pen, Point::new(0.0, 20.0), Point::new(100.0, 20.0), 10.0);
        assert_eq!(alpha_at(&surface, 50, 20), 255);

        draw_line(&mut surface, Tool::Eraser, Point::new(50.0, 0.0), Point::new(50.0, 40.0), 4.0);

        assert_eq!(alpha_at(&surface, 50, 20), 0);
        assert_eq!(alpha_at(&surface, 20, 20), 255);
        assert_eq!(alpha_at(&surface, 80, 20), 255);
    }

    #[test]
    fn pixel_ratio_scales_backing_store_only() {
        let mut dense = StrokeSurface::new(50, 50, 2.0).expect("surface");
        assert_eq!(dense.logical_size(), (50, 50));
        assert_eq!(dense.pixmap().width(), 100);

        draw_line(&mut dense, Tool::Pen, Point::new(5.0, 25.0), Point::new(45.0, 25.0), 4.0);
        assert_eq!(alpha_at(&dense, 50, 50), 255);
        assert_eq!(alpha_at(&dense, 50, 10), 0);

        let mut sparse = StrokeSurface::new(50, 50, 1.0).expect("surface");
        draw_line(&mut sparse, Tool::Pen, Point::new(5.0, 25.0), Point::new(45.0, 25.0), 4.0);
        assert_eq!(alpha_at(&sparse, 25, 25), 255);
    }

    #[test]
    fn shapes_paint_only_on_release() {
        let mut surface = StrokeSurface::new(64, 64, 1.0).expect("surface");
        let style = StrokeStyle::new(WHITE, 2.0);
        surface.begin_stroke(Point::new(10.0, 10.0), Tool::Shape(Shape::Rect), style);
        surface.extend_stroke(Point::new(40.0, 40.0));
        assert_eq!(alpha_at(&surface, 10, 25), 0);

        surface
            .end_stroke(Point::new(50.0, 50.0))
            .expect("end")
            .expect("active");
        assert_eq!(alpha_at(&surface, 10, 30), 255);
        assert_eq!(alpha_at(&surface, 50, 30), 255);
        assert_eq!(alpha_at(&surface, 30, 30), 0);
    }

    #[test]
    fn tap_leaves_a_dot() {
        let mut surface = StrokeSurface::new(20, 20, 1.0).expect("surface");
        surface.begin_stroke(Point::new(10.0, 10.0), Tool::Pen, StrokeStyle::new(WHITE, 6.0));
        surface.end_stroke(Point::new(10.0, 10.0)).expect("end");
        assert_eq!(alpha_at(&surface, 10, 10), 255);
    }

    #[test]
    fn reset_clears_pixels_and_history() {
        let mut surface = StrokeSurface::new(20, 20, 1.0).expect("surface");
        draw_line(&mut surface, Tool::Pen, Point::new(0.0, 10.0), Point::new(20.0, 10.0), 4.0);
        surface.reset();
        assert!(!surface.can_undo());
        assert!(surface.pixmap().pixels().iter().all(|p| p.alpha() == 0));
    }

    #[test]
    fn seed_restores_persisted_raster() {
        let mut source = StrokeSurface::new(30, 30, 1.0).expect("surface");
        let (from, to) = (Point::new(0.0, 15.0), Point::new(30.0, 15.0));
        let raster = draw_line(&mut source, Tool::Pen, from, to, 4.0);

        let mut restored = StrokeSurface::new(30, 30, 1.0).expect("surface");
        restored.seed(&raster).expect("seed");
        assert_eq!(restored.snapshot().expect("snapshot"), raster);
        assert!(!restored.can_undo());
    }
}
