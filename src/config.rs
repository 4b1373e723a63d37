use std::collections::BTreeMap;

use crate::{
    blend::{BlendEquation, BlendFactor},
    color::{ChannelSet, Color},
    error::{ForgeError, ForgeResult},
    gradient::{Gradient, GradientDirection},
    op::{CanvasOp, GradientSource, LayerEntry, OutOfBounds},
    output::CompressionMode,
    transform::Transform,
};

/// Fully validated generation plan: default dimensions plus one operation
/// tree (and compression mode) per output path.
#[derive(Debug)]
pub struct Config {
    pub default_width: u32,
    pub default_height: u32,
    pub entries: BTreeMap<String, GenEntry>,
}

#[derive(Debug)]
pub struct GenEntry {
    pub op: CanvasOp,
    pub compression: CompressionMode,
}

impl Config {
    /// Parses and validates a JSON config document.
    pub fn from_json(text: &str) -> ForgeResult<Config> {
        let file: ConfigFile = serde_json::from_str(text)
            .map_err(|err| ForgeError::config(format!("cannot parse config: {err}")))?;
        let default_compression = file.compression.unwrap_or_default();

        let mut entries = BTreeMap::new();
        for (path, spec) in file.entries {
            validate_path(&path)?;
            let op = spec
                .op
                .build()
                .map_err(|err| ForgeError::config(format!("entry '{path}': {err}")))?;
            entries.insert(
                path,
                GenEntry {
                    op,
                    compression: spec.compression.unwrap_or(default_compression),
                },
            );
        }
        Ok(Config {
            default_width: file.width.unwrap_or(16),
            default_height: file.height.unwrap_or(16),
            entries,
        })
    }
}

fn validate_path(path: &str) -> ForgeResult<()> {
    let valid = !path.is_empty()
        && path
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "_-./".contains(c));
    if valid {
        Ok(())
    } else {
        Err(ForgeError::config(format!(
            "'{path}' is not a valid output path"
        )))
    }
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    compression: Option<CompressionMode>,
    #[serde(default)]
    entries: BTreeMap<String, EntrySpec>,
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct EntrySpec {
    op: OpSpec,
    compression: Option<CompressionMode>,
}

/// Raw operation tree as written in the config; `build` lowers it into a
/// `CanvasOp` with all value parsing and validation applied.
#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OpSpec {
    Fill {
        color: String,
        width: Option<u32>,
        height: Option<u32>,
    },
    Tint {
        target: Box<OpSpec>,
        color: String,
    },
    Layer {
        #[serde(default)]
        entries: Vec<LayerEntrySpec>,
        width: Option<u32>,
        height: Option<u32>,
        equation: Option<BlendEquation>,
        src_blend: Option<BlendFactor>,
        dst_blend: Option<BlendFactor>,
        src_color: Option<BlendFactor>,
        dst_color: Option<BlendFactor>,
        src_alpha: Option<BlendFactor>,
        dst_alpha: Option<BlendFactor>,
    },
    Region {
        source: Box<OpSpec>,
        #[serde(default)]
        x: u32,
        #[serde(default)]
        y: u32,
        width: Option<u32>,
        height: Option<u32>,
    },
    Transform {
        target: Box<OpSpec>,
        #[serde(default)]
        steps: Vec<TransformStep>,
        width: Option<u32>,
        height: Option<u32>,
        out_of_bounds: Option<OutOfBoundsSpec>,
    },
    GradientMap {
        target: Box<OpSpec>,
        gradient: GradientSpec,
        #[serde(default = "default_map_channels")]
        map_channels: String,
        #[serde(default = "default_output_channels")]
        output_channels: String,
        #[serde(default = "default_rescale")]
        rescale: bool,
    },
    Image {
        path: String,
    },
    Dependency {
        path: String,
    },
}

fn default_map_channels() -> String {
    "rgb".to_string()
}

fn default_output_channels() -> String {
    "rgba".to_string()
}

fn default_rescale() -> bool {
    true
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct LayerEntrySpec {
    op: OpSpec,
    #[serde(default)]
    x: i32,
    #[serde(default)]
    y: i32,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "snake_case")]
enum TransformStep {
    Rotate(f32),
    Scale(ScaleArg),
    Shear([f32; 2]),
    Translate([f32; 2]),
    FlipX,
    FlipY,
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum ScaleArg {
    Uniform(f32),
    Axes([f32; 2]),
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "snake_case")]
enum OutOfBoundsSpec {
    Clamp,
    Repeat,
    Fill(String),
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum GradientSpec {
    Stops {
        stops: Vec<StopSpec>,
    },
    Texture {
        texture: Box<OpSpec>,
        index: u32,
        #[serde(default)]
        direction: GradientDirection,
    },
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct StopSpec {
    at: f32,
    color: String,
}

impl OpSpec {
    fn build(self) -> ForgeResult<CanvasOp> {
        match self {
            OpSpec::Fill {
                color,
                width,
                height,
            } => Ok(CanvasOp::Fill {
                color: color.parse()?,
                width: width.into(),
                height: height.into(),
            }),
            OpSpec::Tint { target, color } => Ok(CanvasOp::Tint {
                target: Box::new(target.build()?),
                color: color.parse()?,
            }),
            OpSpec::Layer {
                entries,
                width,
                height,
                equation,
                src_blend,
                dst_blend,
                src_color,
                dst_color,
                src_alpha,
                dst_alpha,
            } => {
                let src_blend = src_blend.unwrap_or(BlendFactor::SrcAlpha);
                let dst_blend = dst_blend.unwrap_or(BlendFactor::OneMinusSrcAlpha);
                Ok(CanvasOp::Layer {
                    entries: entries
                        .into_iter()
                        .map(|e| {
                            Ok(LayerEntry {
                                op: e.op.build()?,
                                x_offset: e.x,
                                y_offset: e.y,
                            })
                        })
                        .collect::<ForgeResult<Vec<_>>>()?,
                    width: width.into(),
                    height: height.into(),
                    equation: equation.unwrap_or(BlendEquation::Add),
                    src_color: src_color.unwrap_or(src_blend),
                    dst_color: dst_color.unwrap_or(dst_blend),
                    src_alpha: src_alpha.unwrap_or(src_blend),
                    dst_alpha: dst_alpha.unwrap_or(dst_blend),
                })
            }
            OpSpec::Region {
                source,
                x,
                y,
                width,
                height,
            } => Ok(CanvasOp::Region {
                source: Box::new(source.build()?),
                x_offset: x,
                y_offset: y,
                width: width.into(),
                height: height.into(),
            }),
            OpSpec::Transform {
                target,
                steps,
                width,
                height,
                out_of_bounds,
            } => {
                let mut matrix = Transform::identity();
                for step in steps {
                    matrix = matrix.then(step.into_transform());
                }
                let out_of_bounds = match out_of_bounds {
                    None => OutOfBounds::Fill(Color::TRANSPARENT),
                    Some(OutOfBoundsSpec::Clamp) => OutOfBounds::Clamp,
                    Some(OutOfBoundsSpec::Repeat) => OutOfBounds::Repeat,
                    Some(OutOfBoundsSpec::Fill(color)) => OutOfBounds::Fill(color.parse()?),
                };
                Ok(CanvasOp::Transform {
                    target: Box::new(target.build()?),
                    width: width.into(),
                    height: height.into(),
                    matrix,
                    out_of_bounds,
                })
            }
            OpSpec::GradientMap {
                target,
                gradient,
                map_channels,
                output_channels,
                rescale,
            } => Ok(CanvasOp::GradientMap {
                target: Box::new(target.build()?),
                gradient: gradient.build()?,
                map_channels: ChannelSet::parse(&map_channels)?,
                output_channels: ChannelSet::parse(&output_channels)?,
                rescale,
            }),
            OpSpec::Image { path } => Ok(CanvasOp::RawImage { path }),
            OpSpec::Dependency { path } => Ok(CanvasOp::Dependency { path }),
        }
    }
}

impl TransformStep {
    fn into_transform(self) -> Transform {
        match self {
            TransformStep::Rotate(degrees) => Transform::rotation_degrees(degrees),
            TransformStep::Scale(ScaleArg::Uniform(s)) => Transform::scaling(s, s),
            TransformStep::Scale(ScaleArg::Axes([x, y])) => Transform::scaling(x, y),
            TransformStep::Shear([x, y]) => Transform::shear(x, y),
            TransformStep::Translate([x, y]) => Transform::translation(x, y),
            TransformStep::FlipX => Transform::flip_x(),
            TransformStep::FlipY => Transform::flip_y(),
        }
    }
}

impl GradientSpec {
    fn build(self) -> ForgeResult<GradientSource> {
        match self {
            GradientSpec::Stops { stops } => {
                let stops = stops
                    .into_iter()
                    .map(|s| Ok((s.at, s.color.parse::<Color>()?)))
                    .collect::<ForgeResult<Vec<_>>>()?;
                Ok(GradientSource::Stops(Gradient::from_stops(stops)?))
            }
            GradientSpec::Texture {
                texture,
                index,
                direction,
            } => Ok(GradientSource::Texture {
                source: Box::new(texture.build()?),
                index,
                direction,
            }),
        }
    }
}
