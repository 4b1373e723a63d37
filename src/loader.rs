use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;

use crate::{
    canvas::Canvas,
    error::{ForgeError, ForgeResult},
};

/// Memoizing PNG texture loader rooted at one base directory. Load errors
/// are reported once and cached as absence, so a missing texture fails every
/// operation that wants it without re-reading the disk. Memoization is
/// best-effort rather than single-flight: concurrent first requests for the
/// same path may both decode, which is safe because loads are pure.
pub struct ImageLoader {
    base: PathBuf,
    cache: Mutex<HashMap<String, Option<Arc<Canvas>>>>,
}

impl ImageLoader {
    pub fn new(base: impl Into<PathBuf>) -> ImageLoader {
        ImageLoader {
            base: base.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn read_from(&self, path: &str) -> Option<Arc<Canvas>> {
        if let Some(hit) = self.cache.lock().get(path) {
            return hit.clone();
        }

        let file = self.base.join(format!("{path}.png"));
        let loaded = tokio::task::spawn_blocking(move || {
            let canvas = load_png(&file);
            if let Err(err) = &canvas {
                tracing::warn!("cannot read image '{}': {err}", file.display());
            }
            canvas.ok()
        })
        .await
        .unwrap_or_default()
        .map(Arc::new);

        let mut cache = self.cache.lock();
        cache.entry(path.to_string()).or_insert(loaded).clone()
    }
}

fn load_png(path: &Path) -> ForgeResult<Canvas> {
    let bytes =
        std::fs::read(path).map_err(|err| ForgeError::io(format!("cannot open file: {err}")))?;
    let img = image::load_from_memory_with_format(&bytes, image::ImageFormat::Png)
        .map_err(|err| ForgeError::io(format!("cannot decode png: {err}")))?;
    Ok(Canvas::from_image(&img.to_rgba8()))
}
