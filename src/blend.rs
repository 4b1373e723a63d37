use crate::color::{Channel, Color};

/// Per-channel combining equation applied to `(src·srcFactor, dst·dstFactor)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendEquation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

impl BlendEquation {
    fn equate(
        self,
        src: Color,
        dst: Color,
        src_factor: BlendFactor,
        dst_factor: BlendFactor,
        c: Channel,
    ) -> i32 {
        let s = src.channel(c) as f32;
        let d = dst.channel(c) as f32;
        match self {
            // Channel results are truncated, not rounded.
            BlendEquation::Add => {
                (s * src_factor.factor(src, dst, c) + d * dst_factor.factor(src, dst, c)) as i32
            }
            BlendEquation::Subtract => {
                (s * src_factor.factor(src, dst, c) - d * dst_factor.factor(src, dst, c)) as i32
            }
            BlendEquation::ReverseSubtract => {
                (d * dst_factor.factor(src, dst, c) - s * src_factor.factor(src, dst, c)) as i32
            }
            BlendEquation::Min => src.channel(c).min(dst.channel(c)) as i32,
            BlendEquation::Max => src.channel(c).max(dst.channel(c)) as i32,
        }
    }
}

/// Multiplier in [0,1] for one side of a blend. Evaluated per-channel except
/// the alpha-based factors, which always read the alpha channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

impl BlendFactor {
    fn factor(self, src: Color, dst: Color, c: Channel) -> f32 {
        match self {
            BlendFactor::Zero => 0.0,
            BlendFactor::One => 1.0,
            BlendFactor::SrcColor => src.channel(c) as f32 / 255.0,
            BlendFactor::OneMinusSrcColor => 1.0 - src.channel(c) as f32 / 255.0,
            BlendFactor::DstColor => dst.channel(c) as f32 / 255.0,
            BlendFactor::OneMinusDstColor => 1.0 - dst.channel(c) as f32 / 255.0,
            BlendFactor::SrcAlpha => src.a() as f32 / 255.0,
            BlendFactor::OneMinusSrcAlpha => 1.0 - src.a() as f32 / 255.0,
            BlendFactor::DstAlpha => dst.a() as f32 / 255.0,
            BlendFactor::OneMinusDstAlpha => 1.0 - dst.a() as f32 / 255.0,
        }
    }
}

/// Combines `src` over `dst` channel-wise; color channels use the color
/// factors, alpha uses the alpha factors. Out-of-range results clamp.
pub fn blend(
    src: Color,
    dst: Color,
    equation: BlendEquation,
    src_color: BlendFactor,
    dst_color: BlendFactor,
    src_alpha: BlendFactor,
    dst_alpha: BlendFactor,
) -> Color {
    Color::from_argb(
        equation.equate(src, dst, src_alpha, dst_alpha, Channel::A),
        equation.equate(src, dst, src_color, dst_color, Channel::R),
        equation.equate(src, dst, src_color, dst_color, Channel::G),
        equation.equate(src, dst, src_color, dst_color, Channel::B),
    )
}
