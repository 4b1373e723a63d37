use crate::{
    canvas::{Canvas, PixelCanvas},
    color::{Channel, ChannelSet, Color},
    error::{ForgeError, ForgeResult},
};

/// Axis and order in which a gradient is read out of a texture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradientDirection {
    #[default]
    LeftToRight,
    RightToLeft,
    TopToBottom,
    BottomToTop,
}

impl GradientDirection {
    fn x_axis(self) -> bool {
        matches!(
            self,
            GradientDirection::LeftToRight | GradientDirection::RightToLeft
        )
    }

    fn reversed(self) -> bool {
        matches!(
            self,
            GradientDirection::RightToLeft | GradientDirection::BottomToTop
        )
    }
}

/// Piecewise-linear color ramp over normalized positions in [0,1).
/// Lookups outside the stop range clamp to the nearest stop; an empty
/// gradient samples black.
#[derive(Clone, Debug, PartialEq)]
pub struct Gradient {
    stops: Vec<(f32, Color)>,
}

impl Gradient {
    /// Builds from literal stops. Positions must lie in [0,1) and be unique.
    pub fn from_stops(mut stops: Vec<(f32, Color)>) -> ForgeResult<Gradient> {
        for &(at, _) in &stops {
            if !(0.0..1.0).contains(&at) {
                return Err(ForgeError::resolution(format!(
                    "invalid gradient stop position {at}, must be in range of 0 ~ 1"
                )));
            }
        }
        stops.sort_by(|a, b| a.0.total_cmp(&b.0));
        for pair in stops.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(ForgeError::resolution(format!(
                    "duplicated gradient stop at position {}",
                    pair[0].0
                )));
            }
        }
        Ok(Gradient { stops })
    }

    /// Samples one row or column of `canvas` into evenly spaced stops.
    pub fn from_canvas(
        canvas: &Canvas,
        index: u32,
        direction: GradientDirection,
    ) -> ForgeResult<Gradient> {
        let (len, limit) = if direction.x_axis() {
            (canvas.width(), canvas.height())
        } else {
            (canvas.height(), canvas.width())
        };
        if index >= limit {
            return Err(ForgeError::resolution(format!(
                "gradient index {index} outside canvas dimension {limit}"
            )));
        }
        let mut pixels: Vec<Color> = (0..len)
            .map(|i| {
                if direction.x_axis() {
                    canvas.get(i, index)
                } else {
                    canvas.get(index, i)
                }
            })
            .collect();
        if direction.reversed() {
            pixels.reverse();
        }
        let count = pixels.len() as f32;
        Ok(Gradient {
            stops: pixels
                .into_iter()
                .enumerate()
                .map(|(i, color)| (i as f32 / count, color))
                .collect(),
        })
    }

    pub fn sample(&self, value: f32) -> Color {
        // First stop at or above `value`; everything before it is below.
        let split = self.stops.partition_point(|(at, _)| *at < value);
        let head = split.checked_sub(1).map(|i| self.stops[i]);
        let tail = self.stops.get(split).copied();
        match (head, tail) {
            (None, None) => Color::BLACK,
            (None, Some((_, color))) => color,
            (Some((_, color)), None) => color,
            (Some((head_at, head_color)), Some((tail_at, tail_color))) => {
                head_color.lerp(tail_color, (value - head_at) / (tail_at - head_at))
            }
        }
    }
}

/// Remaps the selected input channels of every pixel through `gradient`,
/// writing only the output channels. Alpha-zero pixels are skipped unless
/// alpha is itself mapped. With `rescale`, the observed value range is
/// stretched to [0,1] first.
pub fn apply_gradient_map(
    canvas: &mut PixelCanvas,
    gradient: &Gradient,
    map_channels: ChannelSet,
    output_channels: ChannelSet,
    rescale: bool,
) {
    if map_channels.is_empty() || output_channels.is_empty() {
        return;
    }
    let map_alpha = map_channels.contains(Channel::A);

    let (mut min, mut max) = (0.0f32, 1.0f32);
    if rescale {
        min = 1.0;
        max = 0.0;
        for y in 0..canvas.height() {
            for x in 0..canvas.width() {
                let px = canvas.get(x, y);
                if px.a() == 0 && !map_alpha {
                    continue;
                }
                let value = map_value(px, map_channels);
                min = min.min(value);
                max = max.max(value);
            }
        }
    }

    for y in 0..canvas.height() {
        for x in 0..canvas.width() {
            let px = canvas.get(x, y);
            if px.a() == 0 && !map_alpha {
                continue;
            }
            let value = proportion(min, max, map_value(px, map_channels));
            canvas.set(x, y, px.replace(gradient.sample(value), output_channels));
        }
    }
}

fn map_value(color: Color, channels: ChannelSet) -> f32 {
    let sum: u32 = channels.iter().map(|c| color.channel(c)).sum();
    sum as f32 / (255.0 * channels.len() as f32)
}

fn proportion(min: f32, max: f32, value: f32) -> f32 {
    if max == min {
        value
    } else {
        (value - min) / (max - min)
    }
}
