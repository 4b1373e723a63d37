/// A width or height that is either explicit or `AUTO` ("inherit from
/// context"). Auto-ness survives `map`, so size adjustments compose without
/// forcing resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Dimension(Option<u32>);

impl Dimension {
    pub const AUTO: Dimension = Dimension(None);

    pub fn of(value: u32) -> Dimension {
        Dimension(Some(value))
    }

    pub fn is_auto(self) -> bool {
        self.0.is_none()
    }

    pub fn resolve(self) -> Option<u32> {
        self.0
    }

    /// This dimension, or `fallback` if auto.
    pub fn or(self, fallback: Dimension) -> Dimension {
        if self.is_auto() { fallback } else { self }
    }

    pub fn unwrap_or(self, fallback: u32) -> u32 {
        self.0.unwrap_or(fallback)
    }

    pub fn map(self, f: impl FnOnce(u32) -> u32) -> Dimension {
        Dimension(self.0.map(f))
    }
}

impl From<Option<u32>> for Dimension {
    fn from(value: Option<u32>) -> Dimension {
        Dimension(value)
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v}"),
            None => write!(f, "auto"),
        }
    }
}
