use std::path::{Path, PathBuf};

use image::ImageEncoder as _;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};

use crate::{
    canvas::Canvas,
    error::{ForgeError, ForgeResult},
};

/// PNG compression effort for one entry. The mode tags the content hash, so
/// switching modes re-encodes even when pixels are unchanged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionMode {
    #[default]
    Default,
    Fast,
    Best,
}

impl CompressionMode {
    /// Byte tag mixed into the digest input alongside the pixels.
    pub fn metadata(self) -> [u8; 1] {
        [self as u8]
    }

    fn compression_type(self) -> CompressionType {
        match self {
            CompressionMode::Default => CompressionType::Default,
            CompressionMode::Fast => CompressionType::Fast,
            CompressionMode::Best => CompressionType::Best,
        }
    }
}

pub fn encode_png(canvas: &Canvas, mode: CompressionMode) -> ForgeResult<Vec<u8>> {
    let img = canvas.to_image();
    let mut bytes = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut bytes, mode.compression_type(), FilterType::Adaptive);
    encoder
        .write_image(
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .map_err(|err| ForgeError::io(format!("cannot encode png: {err}")))?;
    Ok(bytes)
}

/// Location of one entry's output file under the output root.
pub fn output_file(out_dir: &Path, entry: &str) -> PathBuf {
    out_dir.join(format!("{entry}.png"))
}

pub fn write_output(out_dir: &Path, entry: &str, bytes: &[u8]) -> ForgeResult<()> {
    let path = output_file(out_dir, entry);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| ForgeError::io(format!("cannot create output directory: {err}")))?;
    }
    std::fs::write(&path, bytes)
        .map_err(|err| ForgeError::io(format!("cannot write '{}': {err}", path.display())))
}

/// Removes output files no longer produced by the current run. Failures go
/// to `report` rather than failing the run.
pub fn delete_stale(
    out_dir: &Path,
    entries: impl IntoIterator<Item = String>,
    report: impl Fn(String),
) {
    for entry in entries {
        let path = output_file(out_dir, &entry);
        if let Err(err) = std::fs::remove_file(&path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                report(format!(
                    "cannot delete outdated output entry {entry}: {err}"
                ));
            }
        }
    }
}
