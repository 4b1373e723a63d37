use crate::error::{ForgeError, ForgeResult};

/// Packed 32-bit ARGB color. The packed form is the identity used for
/// equality, hashing and cache keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color(pub u32);

impl Color {
    pub const TRANSPARENT: Color = Color(0x0000_0000);
    pub const BLACK: Color = Color(0xFF00_0000);
    pub const WHITE: Color = Color(0xFFFF_FFFF);

    /// Builds a color from channel values, clamping each to 0..=255.
    pub fn from_argb(a: i32, r: i32, g: i32, b: i32) -> Color {
        let clamp = |v: i32| v.clamp(0, 255) as u32;
        Color((clamp(a) << 24) | (clamp(r) << 16) | (clamp(g) << 8) | clamp(b))
    }

    pub fn rgb(r: i32, g: i32, b: i32) -> Color {
        Self::from_argb(255, r, g, b)
    }

    pub fn a(self) -> u32 {
        self.0 >> 24 & 0xff
    }

    pub fn r(self) -> u32 {
        self.0 >> 16 & 0xff
    }

    pub fn g(self) -> u32 {
        self.0 >> 8 & 0xff
    }

    pub fn b(self) -> u32 {
        self.0 & 0xff
    }

    /// The low 24 bits, alpha stripped.
    pub fn rgb_bits(self) -> u32 {
        self.0 & 0xff_ffff
    }

    pub fn channel(self, c: Channel) -> u32 {
        match c {
            Channel::A => self.a(),
            Channel::R => self.r(),
            Channel::G => self.g(),
            Channel::B => self.b(),
        }
    }

    /// Channel-wise linear interpolation toward `other`, rounded.
    pub fn lerp(self, other: Color, d: f32) -> Color {
        let mix = |a: u32, b: u32| (a as f32 + d * (b as f32 - a as f32)).round() as i32;
        Color::from_argb(
            mix(self.a(), other.a()),
            mix(self.r(), other.r()),
            mix(self.g(), other.g()),
            mix(self.b(), other.b()),
        )
    }

    /// Takes the channels named in `channels` from `other`, the rest from
    /// `self`.
    pub fn replace(self, other: Color, channels: ChannelSet) -> Color {
        let pick = |c: Channel| {
            if channels.contains(c) {
                other.channel(c)
            } else {
                self.channel(c)
            }
        };
        Color::from_argb(
            pick(Channel::A) as i32,
            pick(Channel::R) as i32,
            pick(Channel::G) as i32,
            pick(Channel::B) as i32,
        )
    }

    /// Parses hex color notation with an optional `#` prefix. Accepted digit
    /// counts: 1 (gray), 2 (gray), 3 (RGB), 4 (ARGB), 6 (RGB), 8 (ARGB).
    pub fn parse(s: &str) -> Option<Color> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let d = |i: usize| {
            let v = (hex.as_bytes()[i] as char).to_digit(16).unwrap_or(0) as i32;
            (v << 4) | v
        };
        let dd = |i: usize| {
            let hi = (hex.as_bytes()[i] as char).to_digit(16).unwrap_or(0) as i32;
            let lo = (hex.as_bytes()[i + 1] as char).to_digit(16).unwrap_or(0) as i32;
            (hi << 4) | lo
        };
        match hex.len() {
            1 => Some(Color::rgb(d(0), d(0), d(0))),
            2 => Some(Color::rgb(dd(0), dd(0), dd(0))),
            3 => Some(Color::rgb(d(0), d(1), d(2))),
            4 => Some(Color::from_argb(d(0), d(1), d(2), d(3))),
            6 => Some(Color::rgb(dd(0), dd(2), dd(4))),
            8 => Some(Color::from_argb(dd(0), dd(2), dd(4), dd(6))),
            _ => None,
        }
    }
}

impl std::str::FromStr for Color {
    type Err = ForgeError;

    fn from_str(s: &str) -> ForgeResult<Color> {
        Color::parse(s).ok_or_else(|| ForgeError::config(format!("cannot parse color '{s}'")))
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.a() == 255 {
            write!(f, "#{:06X}", self.rgb_bits())
        } else {
            write!(f, "#{:08X}", self.0)
        }
    }
}

impl std::fmt::Debug for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Color({self})")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    A,
    R,
    G,
    B,
}

impl Channel {
    pub const ALL: [Channel; 4] = [Channel::A, Channel::R, Channel::G, Channel::B];

    fn bit(self) -> u8 {
        match self {
            Channel::A => 1,
            Channel::R => 2,
            Channel::G => 4,
            Channel::B => 8,
        }
    }

    fn flag(self) -> char {
        match self {
            Channel::A => 'a',
            Channel::R => 'r',
            Channel::G => 'g',
            Channel::B => 'b',
        }
    }
}

/// A set of ARGB channels, written in configs as flag strings like `"rgb"`.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelSet(u8);

impl ChannelSet {
    pub const EMPTY: ChannelSet = ChannelSet(0);

    pub fn of(channels: &[Channel]) -> ChannelSet {
        let mut set = ChannelSet::EMPTY;
        for &c in channels {
            set.insert(c);
        }
        set
    }

    /// Parses a flag string. Unknown flags are an error; repeated flags only
    /// warn.
    pub fn parse(s: &str) -> ForgeResult<ChannelSet> {
        let mut set = ChannelSet::EMPTY;
        for ch in s.chars() {
            let channel = match ch.to_ascii_lowercase() {
                'a' => Channel::A,
                'r' => Channel::R,
                'g' => Channel::G,
                'b' => Channel::B,
                _ => {
                    return Err(ForgeError::config(format!(
                        "unknown color channel flag '{ch}'; allowed values are: [a, r, g, b]"
                    )));
                }
            };
            if !set.insert(channel) {
                tracing::warn!("repeated color channel flag '{ch}' in \"{s}\"");
            }
        }
        Ok(set)
    }

    /// Returns false if the channel was already present.
    pub fn insert(&mut self, c: Channel) -> bool {
        let present = self.contains(c);
        self.0 |= c.bit();
        !present
    }

    pub fn contains(self, c: Channel) -> bool {
        self.0 & c.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> u32 {
        self.0.count_ones()
    }

    pub fn iter(self) -> impl Iterator<Item = Channel> {
        Channel::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl std::fmt::Debug for ChannelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChannelSet(")?;
        for c in self.iter() {
            write!(f, "{}", c.flag())?;
        }
        write!(f, ")")
    }
}
