use std::sync::Arc;

use futures::{FutureExt as _, future::BoxFuture};

use crate::{
    blend::{BlendEquation, BlendFactor, blend},
    canvas::{Canvas, PixelCanvas},
    color::{ChannelSet, Color},
    dimension::Dimension,
    error::{ForgeError, ForgeResult},
    gradient::{Gradient, GradientDirection, apply_gradient_map},
    loader::ImageLoader,
    transform::Transform,
};

/// Per-evaluation bundle handed down the operation tree.
#[derive(Clone)]
pub struct Context {
    pub images: Arc<ImageLoader>,
    pub deps: Arc<dyn DependencyHandle>,
}

/// Capability scoped to one entry, allowing its operation tree to request
/// another entry's evaluated result.
pub trait DependencyHandle: Send + Sync {
    fn depend_on<'a>(&'a self, entry: &'a str) -> BoxFuture<'a, ForgeResult<Arc<Canvas>>>;
}

/// Sampling policy for transform destinations that map outside the source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum OutOfBounds {
    Clamp,
    Repeat,
    Fill(Color),
}

#[derive(Clone, Debug)]
pub struct LayerEntry {
    pub op: CanvasOp,
    pub x_offset: i32,
    pub y_offset: i32,
}

/// Where a gradient map gets its ramp from: literal stops, or a row/column
/// sampled out of another evaluated operation.
#[derive(Clone, Debug)]
pub enum GradientSource {
    Stops(Gradient),
    Texture {
        source: Box<CanvasOp>,
        index: u32,
        direction: GradientDirection,
    },
}

impl GradientSource {
    pub fn resolve<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, ForgeResult<Gradient>> {
        async move {
            match self {
                GradientSource::Stops(gradient) => Ok(gradient.clone()),
                GradientSource::Texture {
                    source,
                    index,
                    direction,
                } => {
                    let canvas = source.run(ctx, Dimension::AUTO, Dimension::AUTO).await?;
                    Gradient::from_canvas(&canvas, *index, *direction)
                }
            }
        }
        .boxed()
    }
}

/// One node of the operation tree. The variant set is closed: evaluation
/// dispatches exhaustively, so a new operation cannot be added without
/// updating the evaluator.
#[derive(Clone, Debug)]
pub enum CanvasOp {
    Fill {
        color: Color,
        width: Dimension,
        height: Dimension,
    },
    Tint {
        target: Box<CanvasOp>,
        color: Color,
    },
    Layer {
        entries: Vec<LayerEntry>,
        width: Dimension,
        height: Dimension,
        equation: BlendEquation,
        src_color: BlendFactor,
        dst_color: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    },
    Region {
        source: Box<CanvasOp>,
        x_offset: u32,
        y_offset: u32,
        width: Dimension,
        height: Dimension,
    },
    Transform {
        target: Box<CanvasOp>,
        width: Dimension,
        height: Dimension,
        matrix: Transform,
        out_of_bounds: OutOfBounds,
    },
    GradientMap {
        target: Box<CanvasOp>,
        gradient: GradientSource,
        map_channels: ChannelSet,
        output_channels: ChannelSet,
        rescale: bool,
    },
    RawImage {
        path: String,
    },
    Dependency {
        path: String,
    },
}

impl CanvasOp {
    /// Evaluates this node to a pixel buffer. `parent_width`/`parent_height`
    /// are the fallbacks used where the node has no explicit size.
    pub fn run<'a>(
        &'a self,
        ctx: &'a Context,
        parent_width: Dimension,
        parent_height: Dimension,
    ) -> BoxFuture<'a, ForgeResult<Arc<Canvas>>> {
        async move {
            match self {
                CanvasOp::Fill {
                    color,
                    width,
                    height,
                } => {
                    let width = resolve(*width, parent_width, "width")?;
                    let height = resolve(*height, parent_height, "height")?;
                    Ok(Arc::new(Canvas::solid(width, height, *color)))
                }
                CanvasOp::Tint { target, color } => {
                    let canvas = target.run(ctx, parent_width, parent_height).await?;
                    let tinted =
                        PixelCanvas::from_fn(canvas.width(), canvas.height(), |x, y| {
                            multiply(canvas.get(x, y), *color)
                        });
                    Ok(Arc::new(tinted.into()))
                }
                CanvasOp::Layer {
                    entries,
                    width,
                    height,
                    equation,
                    src_color,
                    dst_color,
                    src_alpha,
                    dst_alpha,
                } => {
                    run_layer(
                        ctx,
                        entries,
                        resolve(*width, parent_width, "width")?,
                        resolve(*height, parent_height, "height")?,
                        *equation,
                        [*src_color, *dst_color, *src_alpha, *dst_alpha],
                    )
                    .await
                }
                CanvasOp::Region {
                    source,
                    x_offset,
                    y_offset,
                    width,
                    height,
                } => {
                    run_region(
                        ctx,
                        source,
                        *x_offset,
                        *y_offset,
                        width.or(parent_width),
                        height.or(parent_height),
                    )
                    .await
                }
                CanvasOp::Transform {
                    target,
                    width,
                    height,
                    matrix,
                    out_of_bounds,
                } => {
                    run_transform(
                        ctx,
                        target,
                        *width,
                        *height,
                        matrix,
                        *out_of_bounds,
                        parent_width,
                        parent_height,
                    )
                    .await
                }
                CanvasOp::GradientMap {
                    target,
                    gradient,
                    map_channels,
                    output_channels,
                    rescale,
                } => {
                    let (canvas, gradient) = futures::try_join!(
                        target.run(ctx, parent_width, parent_height),
                        gradient.resolve(ctx)
                    )?;
                    let mut out = PixelCanvas::from_canvas(&canvas);
                    apply_gradient_map(
                        &mut out,
                        &gradient,
                        *map_channels,
                        *output_channels,
                        *rescale,
                    );
                    Ok(Arc::new(out.into()))
                }
                CanvasOp::RawImage { path } => ctx
                    .images
                    .read_from(path)
                    .await
                    .ok_or_else(|| ForgeError::io(format!("no image at path '{path}'"))),
                CanvasOp::Dependency { path } => ctx.deps.depend_on(path).await,
            }
        }
        .boxed()
    }
}

fn resolve(own: Dimension, parent: Dimension, what: &str) -> ForgeResult<u32> {
    own.or(parent)
        .resolve()
        .ok_or_else(|| ForgeError::resolution(format!("cannot resolve {what}")))
}

/// Per-channel `a * b / 255` integer multiply.
fn multiply(a: Color, b: Color) -> Color {
    Color::from_argb(
        (a.a() * b.a() / 255) as i32,
        (a.r() * b.r() / 255) as i32,
        (a.g() * b.g() / 255) as i32,
        (a.b() * b.b() / 255) as i32,
    )
}

async fn run_layer(
    ctx: &Context,
    entries: &[LayerEntry],
    width: u32,
    height: u32,
    equation: BlendEquation,
    factors: [BlendFactor; 4],
) -> ForgeResult<Arc<Canvas>> {
    let results = futures::future::join_all(
        entries
            .iter()
            .map(|e| e.op.run(ctx, Dimension::of(width), Dimension::of(height))),
    )
    .await;

    let mut children = Vec::with_capacity(entries.len());
    let mut errors = Vec::new();
    for (entry, result) in entries.iter().zip(results) {
        match result {
            Ok(canvas) => children.push((entry, canvas)),
            Err(err) => errors.push(err),
        }
    }
    if !errors.is_empty() {
        let details: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        return Err(ForgeError::resolution(format!(
            "one of the child operations failed:\n  {}",
            details.join("\n  ")
        )));
    }
    if children.is_empty() {
        return Ok(Arc::new(Canvas::solid(width, height, Color::TRANSPARENT)));
    }

    // Children are painted back-to-front; the first declared entry is
    // topmost. The bottom-most pass replaces, later passes blend.
    let mut out = PixelCanvas::new(width, height);
    let mut first = true;
    for (entry, canvas) in children.iter().rev() {
        for y in 0..height {
            for x in 0..width {
                let x0 = i64::from(x) - i64::from(entry.x_offset);
                let y0 = i64::from(y) - i64::from(entry.y_offset);
                if x0 < 0 || y0 < 0 || !canvas.in_bounds(x0 as u32, y0 as u32) {
                    continue;
                }
                let src = canvas.get(x0 as u32, y0 as u32);
                let px = if first {
                    src
                } else {
                    blend(
                        src,
                        out.get(x, y),
                        equation,
                        factors[0],
                        factors[1],
                        factors[2],
                        factors[3],
                    )
                };
                out.set(x, y, px);
            }
        }
        first = false;
    }
    Ok(Arc::new(out.into()))
}

async fn run_region(
    ctx: &Context,
    source: &CanvasOp,
    x_offset: u32,
    y_offset: u32,
    width: Dimension,
    height: Dimension,
) -> ForgeResult<Arc<Canvas>> {
    // The source is asked for a size inflated by the offset, so it can
    // auto-size around the crop window.
    let canvas = source
        .run(
            ctx,
            width.map(|w| w + x_offset),
            height.map(|h| h + y_offset),
        )
        .await?;

    if let (Some(w), Some(h)) = (width.resolve(), height.resolve()) {
        if x_offset + w > canvas.width() || y_offset + h > canvas.height() {
            return Err(ForgeError::resolution(format!(
                "region outside image boundary, region: [{x_offset}, {y_offset}, {width}, \
                 {height}], image dimension: {}, {}",
                canvas.width(),
                canvas.height()
            )));
        }
    }

    let implicit = |size: u32, offset: u32, what: &str| {
        size.checked_sub(offset).ok_or_else(|| {
            ForgeError::resolution(format!(
                "region {what} offset {offset} outside image dimension {size}"
            ))
        })
    };
    let w = match width.resolve() {
        Some(w) => w,
        None => implicit(canvas.width(), x_offset, "x")?,
    };
    let h = match height.resolve() {
        Some(h) => h,
        None => implicit(canvas.height(), y_offset, "y")?,
    };
    Ok(Arc::new(canvas.sub_region(w, h, x_offset, y_offset).into()))
}

#[allow(clippy::too_many_arguments)]
async fn run_transform(
    ctx: &Context,
    target: &CanvasOp,
    width: Dimension,
    height: Dimension,
    matrix: &Transform,
    out_of_bounds: OutOfBounds,
    parent_width: Dimension,
    parent_height: Dimension,
) -> ForgeResult<Arc<Canvas>> {
    let inverse = matrix
        .invert()
        .ok_or_else(|| ForgeError::resolution(format!("invalid transform matrix {matrix}")))?;
    let canvas = target.run(ctx, parent_width, parent_height).await?;
    if matrix.is_identity() {
        return Ok(canvas);
    }
    if canvas.width() == 0 || canvas.height() == 0 {
        return Err(ForgeError::resolution("cannot transform an empty canvas"));
    }

    let (out_width, out_height) = match (width.resolve(), height.resolve()) {
        (Some(w), Some(h)) => (w, h),
        _ => auto_size(matrix, canvas.width(), canvas.height()),
    };

    let src_w = canvas.width() as f32;
    let src_h = canvas.height() as f32;
    let out = PixelCanvas::from_fn(out_width, out_height, |x, y| {
        // Destination pixel centers, offset into centered space.
        let (sx, sy) = inverse.apply(
            x as f32 - out_width as f32 / 2.0 + 0.5,
            y as f32 - out_height as f32 / 2.0 + 0.5,
        );
        let cx = sx + src_w / 2.0;
        let cy = sy + src_h / 2.0;
        if cx >= 0.0 && cy >= 0.0 && canvas.in_bounds(cx as u32, cy as u32) {
            return canvas.get(cx as u32, cy as u32);
        }
        match out_of_bounds {
            OutOfBounds::Clamp => canvas.get(
                (cx as i64).clamp(0, i64::from(canvas.width()) - 1) as u32,
                (cy as i64).clamp(0, i64::from(canvas.height()) - 1) as u32,
            ),
            OutOfBounds::Repeat => canvas.get(wrap(cx, canvas.width()), wrap(cy, canvas.height())),
            OutOfBounds::Fill(color) => color,
        }
    });
    Ok(Arc::new(out.into()))
}

/// Output bounds of the transformed source: the bounding box of its four
/// transformed corners, expressed in centered coordinates.
fn auto_size(matrix: &Transform, width: u32, height: u32) -> (u32, u32) {
    let (mut x_min, mut x_max, mut y_min, mut y_max) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
    for i in 0..4 {
        let corner_x = if i % 2 == 0 {
            width as f32
        } else {
            -(width as f32)
        };
        let corner_y = if i / 2 == 0 {
            height as f32
        } else {
            -(height as f32)
        };
        let (x, y) = matrix.apply(corner_x, corner_y);
        x_min = x_min.min(x);
        x_max = x_max.max(x);
        y_min = y_min.min(y);
        y_max = y_max.max(y);
    }
    // Rounded so quarter-turn extents survive f32 trig noise.
    (
        ((x_max - x_min) / 2.0).round() as u32,
        ((y_max - y_min) / 2.0).round() as u32,
    )
}

/// Modulo wrap into [0, size).
fn wrap(value: f32, size: u32) -> u32 {
    let wrapped = value.rem_euclid(size as f32);
    (wrapped as u32).min(size - 1)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    /// Test handle backed by a fixed map; unlisted entries fail like the
    /// real dispatcher's unknown-entry error.
    #[derive(Default)]
    struct FixedDeps(HashMap<String, Arc<Canvas>>);

    impl DependencyHandle for FixedDeps {
        fn depend_on<'a>(&'a self, entry: &'a str) -> BoxFuture<'a, ForgeResult<Arc<Canvas>>> {
            async move {
                self.0.get(entry).cloned().ok_or_else(|| {
                    ForgeError::dependency(format!(
                        "invalid dependency: no entry named '{entry}'"
                    ))
                })
            }
            .boxed()
        }
    }

    fn ctx() -> Context {
        ctx_with(FixedDeps::default())
    }

    fn ctx_with(deps: FixedDeps) -> Context {
        Context {
            images: Arc::new(ImageLoader::new("nonexistent-texture-root")),
            deps: Arc::new(deps),
        }
    }

    /// Splices a literal pixel buffer into a tree as the entry `"src"`.
    fn pixel_ctx(pixels: PixelCanvas) -> Context {
        let mut deps = FixedDeps::default();
        deps.0.insert("src".to_string(), Arc::new(pixels.into()));
        ctx_with(deps)
    }

    fn raw() -> CanvasOp {
        CanvasOp::Dependency { path: "src".into() }
    }

    fn fill(color: Color) -> CanvasOp {
        CanvasOp::Fill {
            color,
            width: Dimension::AUTO,
            height: Dimension::AUTO,
        }
    }

    fn sized_fill(color: Color, w: u32, h: u32) -> CanvasOp {
        CanvasOp::Fill {
            color,
            width: Dimension::of(w),
            height: Dimension::of(h),
        }
    }

    fn layer_over(entries: Vec<LayerEntry>, width: Dimension, height: Dimension) -> CanvasOp {
        CanvasOp::Layer {
            entries,
            width,
            height,
            equation: BlendEquation::Add,
            src_color: BlendFactor::SrcAlpha,
            dst_color: BlendFactor::OneMinusSrcAlpha,
            src_alpha: BlendFactor::SrcAlpha,
            dst_alpha: BlendFactor::OneMinusSrcAlpha,
        }
    }

    fn at(op: CanvasOp, x_offset: i32, y_offset: i32) -> LayerEntry {
        LayerEntry {
            op,
            x_offset,
            y_offset,
        }
    }

    async fn run(op: &CanvasOp, pw: Dimension, ph: Dimension) -> ForgeResult<Arc<Canvas>> {
        op.run(&ctx(), pw, ph).await
    }

    #[tokio::test]
    async fn fill_uses_own_size_then_parent() {
        let own = sized_fill(Color::WHITE, 3, 4);
        let canvas = run(&own, Dimension::of(9), Dimension::of(9)).await.unwrap();
        assert_eq!((canvas.width(), canvas.height()), (3, 4));

        let inherited = fill(Color::WHITE);
        let canvas = run(&inherited, Dimension::of(9), Dimension::of(8))
            .await
            .unwrap();
        assert_eq!((canvas.width(), canvas.height()), (9, 8));
    }

    #[tokio::test]
    async fn fill_fails_without_any_size() {
        let err = run(&fill(Color::WHITE), Dimension::AUTO, Dimension::AUTO)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cannot resolve width"));
    }

    #[tokio::test]
    async fn tint_multiplies_channels() {
        let op = CanvasOp::Tint {
            target: Box::new(sized_fill(Color::from_argb(255, 200, 100, 50), 2, 2)),
            color: Color::from_argb(255, 128, 255, 0),
        };
        let canvas = run(&op, Dimension::AUTO, Dimension::AUTO).await.unwrap();
        assert_eq!(canvas.get(1, 1), Color::from_argb(255, 100, 100, 0));
    }

    #[tokio::test]
    async fn region_explicit_out_of_bounds_fails() {
        let op = CanvasOp::Region {
            source: Box::new(sized_fill(Color::WHITE, 4, 4)),
            x_offset: 2,
            y_offset: 0,
            width: Dimension::of(3),
            height: Dimension::of(4),
        };
        let err = run(&op, Dimension::AUTO, Dimension::AUTO).await.unwrap_err();
        assert!(err.to_string().contains("region outside image boundary"));
    }

    #[tokio::test]
    async fn region_auto_takes_source_minus_offset() {
        let op = CanvasOp::Region {
            source: Box::new(sized_fill(Color::WHITE, 7, 5)),
            x_offset: 2,
            y_offset: 1,
            width: Dimension::AUTO,
            height: Dimension::AUTO,
        };
        let canvas = run(&op, Dimension::AUTO, Dimension::AUTO).await.unwrap();
        assert_eq!((canvas.width(), canvas.height()), (5, 4));
    }

    #[tokio::test]
    async fn region_inflates_requested_size_by_offset() {
        // The auto-sized source sees the crop size plus the offset.
        let op = CanvasOp::Region {
            source: Box::new(fill(Color::WHITE)),
            x_offset: 3,
            y_offset: 2,
            width: Dimension::of(4),
            height: Dimension::of(4),
        };
        let canvas = run(&op, Dimension::AUTO, Dimension::AUTO).await.unwrap();
        assert_eq!((canvas.width(), canvas.height()), (4, 4));
    }

    #[tokio::test]
    async fn layer_empty_is_transparent() {
        let op = layer_over(vec![], Dimension::of(2), Dimension::of(2));
        let canvas = run(&op, Dimension::AUTO, Dimension::AUTO).await.unwrap();
        assert_eq!(canvas.get(0, 0), Color::TRANSPARENT);
        assert_eq!(canvas.get(1, 1), Color::TRANSPARENT);
    }

    #[tokio::test]
    async fn layer_first_entry_is_topmost() {
        let op = layer_over(
            vec![
                at(fill(Color::rgb(255, 0, 0)), 0, 0),
                at(fill(Color::rgb(0, 255, 0)), 0, 0),
            ],
            Dimension::of(2),
            Dimension::of(2),
        );
        let canvas = run(&op, Dimension::AUTO, Dimension::AUTO).await.unwrap();
        assert_eq!(canvas.get(0, 0), Color::rgb(255, 0, 0));
    }

    #[tokio::test]
    async fn layer_offsets_leave_outside_pixels_untouched() {
        let op = layer_over(
            vec![at(sized_fill(Color::rgb(0, 0, 255), 1, 1), 1, 1)],
            Dimension::of(2),
            Dimension::of(2),
        );
        let canvas = run(&op, Dimension::AUTO, Dimension::AUTO).await.unwrap();
        assert_eq!(canvas.get(0, 0), Color::TRANSPARENT);
        assert_eq!(canvas.get(1, 1), Color::rgb(0, 0, 255));
    }

    #[tokio::test]
    async fn layer_aggregates_child_failures() {
        let op = layer_over(
            vec![
                at(fill(Color::WHITE), 0, 0),
                at(
                    CanvasOp::RawImage {
                        path: "missing".into(),
                    },
                    0,
                    0,
                ),
                at(
                    CanvasOp::Dependency {
                        path: "elsewhere".into(),
                    },
                    0,
                    0,
                ),
            ],
            Dimension::of(2),
            Dimension::of(2),
        );
        let err = run(&op, Dimension::AUTO, Dimension::AUTO).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("one of the child operations failed"));
        assert!(msg.contains("no image at path 'missing'"));
        assert!(msg.contains("no entry named 'elsewhere'"));
    }

    #[tokio::test]
    async fn transform_identity_passes_source_through() {
        let op = CanvasOp::Transform {
            target: Box::new(sized_fill(Color::rgb(1, 2, 3), 4, 4)),
            width: Dimension::AUTO,
            height: Dimension::AUTO,
            matrix: Transform::identity(),
            out_of_bounds: OutOfBounds::Fill(Color::TRANSPARENT),
        };
        let canvas = run(&op, Dimension::AUTO, Dimension::AUTO).await.unwrap();
        assert!(matches!(&*canvas, Canvas::Solid { .. }));
    }

    #[tokio::test]
    async fn transform_singular_matrix_fails_before_target_runs() {
        let op = CanvasOp::Transform {
            target: Box::new(fill(Color::WHITE)),
            width: Dimension::AUTO,
            height: Dimension::AUTO,
            matrix: Transform::scaling(0.0, 1.0),
            out_of_bounds: OutOfBounds::Clamp,
        };
        let err = run(&op, Dimension::AUTO, Dimension::AUTO).await.unwrap_err();
        assert!(err.to_string().contains("invalid transform matrix"));
    }

    /// A quarter turn and back reproduces the source for axis-aligned
    /// rotations.
    #[tokio::test]
    async fn transform_rotation_round_trips() {
        let source =
            PixelCanvas::from_fn(4, 4, |x, y| Color::rgb((x * 60) as i32, (y * 60) as i32, 0));
        let op = CanvasOp::Transform {
            target: Box::new(CanvasOp::Transform {
                target: Box::new(raw()),
                width: Dimension::of(4),
                height: Dimension::of(4),
                matrix: Transform::rotation_degrees(90.0),
                out_of_bounds: OutOfBounds::Fill(Color::TRANSPARENT),
            }),
            width: Dimension::of(4),
            height: Dimension::of(4),
            matrix: Transform::rotation_degrees(-90.0),
            out_of_bounds: OutOfBounds::Fill(Color::TRANSPARENT),
        };
        let canvas = op
            .run(&pixel_ctx(source.clone()), Dimension::AUTO, Dimension::AUTO)
            .await
            .unwrap();
        assert_eq!((canvas.width(), canvas.height()), (4, 4));
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(canvas.get(x, y), source.get(x, y), "pixel {x},{y}");
            }
        }
    }

    #[tokio::test]
    async fn transform_rotation_moves_pixels() {
        let source = PixelCanvas::from_fn(2, 2, |x, y| {
            if x == 0 && y == 0 {
                Color::rgb(255, 0, 0)
            } else {
                Color::rgb(0, 0, 255)
            }
        });
        let op = CanvasOp::Transform {
            target: Box::new(raw()),
            width: Dimension::of(2),
            height: Dimension::of(2),
            matrix: Transform::rotation_degrees(90.0),
            out_of_bounds: OutOfBounds::Fill(Color::TRANSPARENT),
        };
        let canvas = op
            .run(&pixel_ctx(source), Dimension::AUTO, Dimension::AUTO)
            .await
            .unwrap();
        // (0,0) rotates by 90 degrees into the top-right corner.
        assert_eq!(canvas.get(1, 0), Color::rgb(255, 0, 0));
    }

    #[tokio::test]
    async fn transform_auto_size_covers_rotated_box() {
        let op = CanvasOp::Transform {
            target: Box::new(sized_fill(Color::WHITE, 6, 2)),
            width: Dimension::AUTO,
            height: Dimension::AUTO,
            matrix: Transform::rotation_degrees(90.0),
            out_of_bounds: OutOfBounds::Fill(Color::TRANSPARENT),
        };
        let canvas = run(&op, Dimension::AUTO, Dimension::AUTO).await.unwrap();
        assert_eq!((canvas.width(), canvas.height()), (2, 6));
    }

    #[tokio::test]
    async fn transform_repeat_tiles_the_source() {
        let source = PixelCanvas::from_fn(2, 1, |x, _| {
            if x == 0 {
                Color::rgb(10, 0, 0)
            } else {
                Color::rgb(0, 10, 0)
            }
        });
        let op = CanvasOp::Transform {
            target: Box::new(raw()),
            width: Dimension::of(4),
            height: Dimension::of(1),
            matrix: Transform::translation(1.0, 0.0),
            out_of_bounds: OutOfBounds::Repeat,
        };
        let canvas = op
            .run(&pixel_ctx(source), Dimension::AUTO, Dimension::AUTO)
            .await
            .unwrap();
        // Shifted right by one with wrap-around: pattern stays alternating.
        assert_eq!(canvas.get(0, 0), canvas.get(2, 0));
        assert_ne!(canvas.get(0, 0), canvas.get(1, 0));
    }

    #[tokio::test]
    async fn dependency_resolves_through_handle() {
        let source = PixelCanvas::from_fn(1, 1, |_, _| Color::rgb(7, 8, 9));
        let canvas = raw()
            .run(&pixel_ctx(source), Dimension::AUTO, Dimension::AUTO)
            .await
            .unwrap();
        assert_eq!(canvas.get(0, 0), Color::rgb(7, 8, 9));
    }

    #[tokio::test]
    async fn gradient_map_from_stops() {
        let gradient = Gradient::from_stops(vec![
            (0.0, Color::rgb(0, 0, 255)),
            (0.999, Color::rgb(255, 0, 0)),
        ])
        .unwrap();
        let op = CanvasOp::GradientMap {
            target: Box::new(sized_fill(Color::rgb(255, 255, 255), 2, 2)),
            gradient: GradientSource::Stops(gradient),
            map_channels: ChannelSet::parse("rgb").unwrap(),
            output_channels: ChannelSet::parse("rgb").unwrap(),
            rescale: false,
        };
        let canvas = run(&op, Dimension::AUTO, Dimension::AUTO).await.unwrap();
        assert_eq!(canvas.get(0, 0), Color::rgb(255, 0, 0));
    }

    #[tokio::test]
    async fn raw_image_missing_reports_path() {
        let op = CanvasOp::RawImage {
            path: "no/such/thing".into(),
        };
        let err = run(&op, Dimension::AUTO, Dimension::AUTO).await.unwrap_err();
        assert!(err.to_string().contains("no image at path 'no/such/thing'"));
    }
}
