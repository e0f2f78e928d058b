// Avatar and background images, decoded off the render thread and uploaded on poll.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, warn};
use macroquad::prelude::*;

type Decoded = (String, Result<Image>);

pub struct TextureCache {
    root: Option<PathBuf>,
    tx: Sender<Decoded>,
    rx: Receiver<Decoded>,
    textures: HashMap<String, Texture2D>,
    requested: HashSet<String>,
}

impl TextureCache {
    pub fn new(root: Option<PathBuf>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            root,
            tx,
            rx,
            textures: HashMap::new(),
            requested: HashSet::new(),
        }
    }

    /// Start loading `url` unless it was already requested. Failures are logged once.
    pub fn request(&mut self, url: &str) {
        if self.requested.contains(url) {
            return;
        }
        self.requested.insert(url.to_string());
        let path = match resolve(url, self.root.as_deref()) {
            Ok(path) => path,
            Err(e) => {
                warn!("image {url}: {e:#}");
                return;
            }
        };
        let tx = self.tx.clone();
        let key = url.to_string();
        thread::spawn(move || {
            let decoded = decode(&path);
            let _ = tx.send((key, decoded));
        });
    }

    pub fn request_all<I: IntoIterator<Item = String>>(&mut self, urls: I) {
        for url in urls {
            self.request(&url);
        }
    }

    /// Upload whatever finished decoding. Must run on the render thread.
    pub fn poll(&mut self) {
        for (url, decoded) in self.rx.try_iter() {
            match decoded {
                Ok(image) => {
                    debug!("image {url}: {}x{}", image.width, image.height);
                    let texture = Texture2D::from_image(&image);
                    texture.set_filter(FilterMode::Linear);
                    self.textures.insert(url, texture);
                }
                Err(e) => warn!("image {url}: {e:#}"),
            }
        }
    }

    pub fn get(&self, url: &str) -> Option<&Texture2D> {
        self.textures.get(url)
    }

    pub fn loaded(&self) -> usize {
        self.textures.len()
    }
}

fn decode(path: &Path) -> Result<Image> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?;
    Image::from_file_with_format(&bytes, None)
        .map_err(|e| anyhow!("failed to decode '{}': {e:?}", path.display()))
}

/// Map an image reference to a local file. Remote URLs are not fetched.
pub fn resolve(url: &str, root: Option<&Path>) -> Result<PathBuf> {
    if url.starts_with("http://") || url.starts_with("https://") {
        bail!("remote images are not supported");
    }
    let raw = url.strip_prefix("file://").unwrap_or(url);
    if raw.is_empty() {
        bail!("empty image path");
    }
    let path = PathBuf::from(raw);
    Ok(match root {
        Some(root) if path.is_relative() => root.join(path),
        _ => path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_join_the_asset_root() {
        let root = Path::new("/srv/lobby");
        assert_eq!(resolve("avatars/ana.png", Some(root)).unwrap(), root.join("avatars/ana.png"));
        assert_eq!(resolve("/abs/bg.jpg", Some(root)).unwrap(), PathBuf::from("/abs/bg.jpg"));
        assert_eq!(resolve("x.png", None).unwrap(), PathBuf::from("x.png"));
    }

    #[test]
    fn file_scheme_is_stripped() {
        assert_eq!(resolve("file:///tmp/a.png", None).unwrap(), PathBuf::from("/tmp/a.png"));
    }

    #[test]
    fn remote_and_empty_references_are_refused() {
        assert!(resolve("https://cdn.example/a.png", None).is_err());
        assert!(resolve("http://cdn.example/a.png", None).is_err());
        assert!(resolve("file://", None).is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = decode(Path::new("/nonexistent/palroom/none.png")).unwrap_err();
        assert!(format!("{err:#}").contains("none.png"));
    }
}
