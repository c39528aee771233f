//! Token assets: manifest parsing, sprite loading behind a completion barrier, tier registry.

use image::imageops::FilterType;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use thiserror::Error;

/// Sprites are downsampled to a square of this many pixels per side.
pub const SPRITE_SIZE: u32 = 24;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("cannot read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid manifest: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("manifest lists {names} names but {images} images")]
    LengthMismatch { names: usize, images: usize },
    #[error("manifest lists no tiers")]
    Empty,
    #[error("cannot load image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("loader for tier {0} exited without reporting")]
    Lost(usize),
}

/// Small RGB pixel grid drawn inside a token's circle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sprite {
    size: u32,
    pixels: Vec<[u8; 3]>,
}

impl Sprite {
    /// Downsample a decoded image to `SPRITE_SIZE` x `SPRITE_SIZE`.
    pub fn from_image(img: &image::DynamicImage) -> Self {
        let rgb = img
            .resize_exact(SPRITE_SIZE, SPRITE_SIZE, FilterType::Triangle)
            .to_rgb8();
        Self {
            size: SPRITE_SIZE,
            pixels: rgb.pixels().map(|p| p.0).collect(),
        }
    }

    /// Procedural pebble: flat colour with a soft highlight from the top-left.
    pub fn swatch(rgb: [u8; 3]) -> Self {
        let s = SPRITE_SIZE;
        let mut pixels = Vec::with_capacity((s * s) as usize);
        for y in 0..s {
            for x in 0..s {
                let nx = (x as f32 + 0.5) / s as f32 - 0.35;
                let ny = (y as f32 + 0.5) / s as f32 - 0.35;
                let dist = (nx * nx + ny * ny).sqrt();
                let factor = (1.18 - dist * 0.55).clamp(0.7, 1.18);
                pixels.push(rgb.map(|c| (c as f32 * factor).min(255.0) as u8));
            }
        }
        Self { size: s, pixels }
    }

    /// Colour at unit coordinates; `u`, `v` are clamped into `[0, 1]`.
    pub fn sample(&self, u: f32, v: f32) -> [u8; 3] {
        let max = self.size - 1;
        let x = ((u.clamp(0.0, 1.0) * self.size as f32) as u32).min(max);
        let y = ((v.clamp(0.0, 1.0) * self.size as f32) as u32).min(max);
        self.pixels[(y * self.size + x) as usize]
    }

    /// Colour at the centre, used for legend swatches.
    pub fn dominant(&self) -> [u8; 3] {
        self.sample(0.5, 0.5)
    }
}

/// Where a tier's image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    File(PathBuf),
    Swatch([u8; 3]),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub name: String,
    pub source: ImageSource,
}

/// On-disk form: two parallel lists of equal length.
#[derive(Debug, Deserialize)]
struct RawManifest {
    names: Vec<String>,
    images: Vec<PathBuf>,
}

/// Ordered tier list; index is the evolution rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetManifest {
    pub entries: Vec<ManifestEntry>,
}

/// Built-in roster used when no manifest is given.
const BUILTIN_ROSTER: [(&str, &str); 13] = [
    ("Yu", "#E06C75"),
    ("Ai", "#E5C07B"),
    ("Ayumu", "#F4A7B9"),
    ("Emma", "#98C379"),
    ("Kanata", "#C678DD"),
    ("Karin", "#61AFEF"),
    ("Kasumi", "#F0E68C"),
    ("Mia", "#D0D0D0"),
    ("Lanzhu", "#FF8C69"),
    ("Rina", "#F5F5F5"),
    ("Setsuna", "#D7263D"),
    ("Shioriko", "#3CB371"),
    ("Shizuku", "#56B6C2"),
];

impl AssetManifest {
    pub fn builtin() -> Self {
        let entries = BUILTIN_ROSTER
            .iter()
            .map(|(name, hex)| ManifestEntry {
                name: (*name).to_string(),
                source: ImageSource::Swatch(hex_rgb(hex).unwrap_or([128, 128, 128])),
            })
            .collect();
        Self { entries }
    }

    /// Read a TOML manifest; image paths are resolved against the manifest's directory.
    pub fn load(path: &Path) -> Result<Self, AssetError> {
        let text = std::fs::read_to_string(path).map_err(|source| AssetError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&text, base)
    }

    pub fn from_toml_str(text: &str, base: &Path) -> Result<Self, AssetError> {
        let raw: RawManifest = toml::from_str(text)?;
        if raw.names.len() != raw.images.len() {
            return Err(AssetError::LengthMismatch {
                names: raw.names.len(),
                images: raw.images.len(),
            });
        }
        if raw.names.is_empty() {
            return Err(AssetError::Empty);
        }
        let entries = raw
            .names
            .into_iter()
            .zip(raw.images)
            .map(|(name, image)| {
                let path = if image.is_absolute() {
                    image
                } else {
                    base.join(image)
                };
                ManifestEntry {
                    name,
                    source: ImageSource::File(path),
                }
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn tier_count(&self) -> usize {
        self.entries.len()
    }
}

fn hex_rgb(s: &str) -> Option<[u8; 3]> {
    let s = s.trim_start_matches('#');
    if s.len() != 6 || !s.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&s[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

fn load_source(source: &ImageSource) -> Result<Sprite, AssetError> {
    match source {
        ImageSource::Swatch(rgb) => Ok(Sprite::swatch(*rgb)),
        ImageSource::File(path) => image::open(path)
            .map(|img| Sprite::from_image(&img))
            .map_err(|source| AssetError::Image {
                path: path.clone(),
                source,
            }),
    }
}

/// One tier of token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenKind {
    pub tier: usize,
    pub name: String,
    /// `None` when the image failed to load; such tokens are not drawn.
    pub image: Option<Sprite>,
}

/// Token kinds ordered by tier.
#[derive(Debug, Clone)]
pub struct TokenRegistry {
    kinds: Vec<TokenKind>,
}

impl TokenRegistry {
    pub fn new(kinds: Vec<TokenKind>) -> Self {
        Self { kinds }
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn get(&self, tier: usize) -> Option<&TokenKind> {
        self.kinds.get(tier)
    }

    pub fn name(&self, tier: usize) -> &str {
        self.get(tier).map_or("?", |k| k.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &TokenKind> {
        self.kinds.iter()
    }
}

type LoadResult = (usize, Result<Sprite, AssetError>);

/// In-flight asset loads. Each tier loads on its own thread; the registry only
/// becomes available once every load has reported (the barrier).
pub struct PendingAssets {
    names: Vec<String>,
    slots: Vec<Option<Sprite>>,
    reported: Vec<bool>,
    completed: usize,
    rx: Receiver<LoadResult>,
}

impl PendingAssets {
    pub fn spawn(manifest: AssetManifest) -> Self {
        let total = manifest.tier_count();
        let (tx, rx) = mpsc::channel();
        let mut names = Vec::with_capacity(total);
        for (index, entry) in manifest.entries.into_iter().enumerate() {
            names.push(entry.name);
            let tx = tx.clone();
            let source = entry.source;
            thread::spawn(move || {
                let _ = tx.send((index, load_source(&source)));
            });
        }
        Self {
            names,
            slots: vec![None; total],
            reported: vec![false; total],
            completed: 0,
            rx,
        }
    }

    pub fn total(&self) -> usize {
        self.names.len()
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn is_ready(&self) -> bool {
        self.completed >= self.total()
    }

    /// Drain finished loads without blocking. Returns the completion count.
    pub fn poll(&mut self) -> usize {
        while !self.is_ready() {
            match self.rx.try_recv() {
                Ok(result) => self.record(result),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.abandon_unreported(),
            }
        }
        self.completed
    }

    /// Block until every load has reported.
    pub fn wait(mut self) -> TokenRegistry {
        while !self.is_ready() {
            match self.rx.recv() {
                Ok(result) => self.record(result),
                Err(_) => self.abandon_unreported(),
            }
        }
        self.into_registry()
    }

    /// The registry if the barrier has resolved, otherwise `self` back.
    pub fn try_resolve(mut self) -> Result<TokenRegistry, Self> {
        self.poll();
        if self.is_ready() {
            Ok(self.into_registry())
        } else {
            Err(self)
        }
    }

    fn record(&mut self, (index, result): LoadResult) {
        if self.reported[index] {
            return;
        }
        self.reported[index] = true;
        self.completed += 1;
        match result {
            Ok(sprite) => self.slots[index] = Some(sprite),
            Err(e) => log::warn!("tier {} ({}): {}", index, self.names[index], e),
        }
    }

    /// All senders are gone; whatever never reported counts as failed.
    fn abandon_unreported(&mut self) {
        for index in 0..self.reported.len() {
            if !self.reported[index] {
                self.record((index, Err(AssetError::Lost(index))));
            }
        }
    }

    fn into_registry(self) -> TokenRegistry {
        let loaded = self.slots.iter().filter(|s| s.is_some()).count();
        log::info!("loaded {}/{} token images", loaded, self.total());
        let kinds = self
            .names
            .into_iter()
            .zip(self.slots)
            .enumerate()
            .map(|(tier, (name, image))| TokenKind { tier, name, image })
            .collect();
        TokenRegistry::new(kinds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_roster_has_thirteen_tiers() {
        let m = AssetManifest::builtin();
        assert_eq!(m.tier_count(), 13);
        assert_eq!(m.entries[0].name, "Yu");
        assert!(matches!(m.entries[12].source, ImageSource::Swatch(_)));
    }

    #[test]
    fn hex_rgb_rejects_non_ascii() {
        assert_eq!(hex_rgb("#E06C75"), Some([0xE0, 0x6C, 0x75]));
        assert_eq!(hex_rgb("#aé123"), None);
    }

    #[test]
    fn manifest_resolves_relative_paths() {
        let text = r#"
            names = ["Yu", "Ai"]
            images = ["img/yu.jpeg", "/abs/ai.png"]
        "#;
        let m = AssetManifest::from_toml_str(text, Path::new("/game")).unwrap();
        assert_eq!(m.tier_count(), 2);
        assert_eq!(
            m.entries[0].source,
            ImageSource::File(PathBuf::from("/game/img/yu.jpeg"))
        );
        assert_eq!(
            m.entries[1].source,
            ImageSource::File(PathBuf::from("/abs/ai.png"))
        );
    }

    #[test]
    fn manifest_rejects_length_mismatch() {
        let text = r#"
            names = ["Yu", "Ai", "Ayumu"]
            images = ["yu.jpeg"]
        "#;
        let err = AssetManifest::from_toml_str(text, Path::new(".")).unwrap_err();
        assert!(matches!(
            err,
            AssetError::LengthMismatch {
                names: 3,
                images: 1
            }
        ));
    }

    #[test]
    fn manifest_rejects_empty() {
        let err = AssetManifest::from_toml_str("names = []\nimages = []", Path::new("."))
            .unwrap_err();
        assert!(matches!(err, AssetError::Empty));
    }

    #[test]
    fn manifest_load_reports_missing_file() {
        let err = AssetManifest::load(Path::new("/nonexistent/tokens.toml")).unwrap_err();
        assert!(matches!(err, AssetError::Io { .. }));
    }

    #[test]
    fn swatch_sample_stays_in_bounds() {
        let s = Sprite::swatch([100, 150, 200]);
        let _ = s.sample(0.0, 0.0);
        let _ = s.sample(1.0, 1.0);
        let _ = s.sample(-3.0, 7.0);
        assert_ne!(s.sample(0.3, 0.3), s.sample(0.95, 0.95));
    }

    #[test]
    fn barrier_waits_for_every_tier() {
        let registry = PendingAssets::spawn(AssetManifest::builtin()).wait();
        assert_eq!(registry.len(), 13);
        assert!(registry.iter().all(|k| k.image.is_some()));
        assert_eq!(registry.name(3), "Emma");
        assert_eq!(registry.get(12).map(|k| k.tier), Some(12));
    }

    #[test]
    fn failed_load_leaves_a_gap() {
        let manifest = AssetManifest {
            entries: vec![
                ManifestEntry {
                    name: "A".into(),
                    source: ImageSource::Swatch([10, 20, 30]),
                },
                ManifestEntry {
                    name: "B".into(),
                    source: ImageSource::File(PathBuf::from("/nonexistent/b.png")),
                },
                ManifestEntry {
                    name: "C".into(),
                    source: ImageSource::Swatch([30, 20, 10]),
                },
            ],
        };
        let registry = PendingAssets::spawn(manifest).wait();
        assert_eq!(registry.len(), 3);
        assert!(registry.get(0).unwrap().image.is_some());
        assert!(registry.get(1).unwrap().image.is_none());
        assert_eq!(registry.name(1), "B");
        assert!(registry.get(2).unwrap().image.is_some());
    }

    #[test]
    fn try_resolve_eventually_yields_registry() {
        let mut pending = PendingAssets::spawn(AssetManifest::builtin());
        let registry = loop {
            match pending.try_resolve() {
                Ok(r) => break r,
                Err(p) => {
                    pending = p;
                    thread::yield_now();
                }
            }
        };
        assert_eq!(registry.len(), 13);
    }
}
