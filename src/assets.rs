use crate::config::AssetsConfig;
use crate::error::{PipelineError, PipelineResult};
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

/// Reads the intrinsic length of a media file.
pub trait MediaProbe: Send + Sync {
    fn duration(&self, path: &Path) -> Result<f64>;
}

/// Probes media with the external ffprobe binary
pub struct FfprobeProbe;

impl MediaProbe for FfprobeProbe {
    fn duration(&self, path: &Path) -> Result<f64> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .with_context(|| format!("Failed to run ffprobe for {}", path.display()))?;

        if !output.status.success() {
            anyhow::bail!(
                "ffprobe failed for {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse()
            .context("Failed to parse ffprobe duration as f64")
    }
}

/// Role of a media asset in the composition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Background,
    Secondary,
    Overlay,
    Music,
}

/// A probed media file
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAsset {
    pub kind: AssetKind,
    pub path: PathBuf,
    pub duration: f64,
}

/// Seedable choice from asset pools; a fixed seed gives a fixed pick sequence.
pub struct AssetPicker {
    rng: StdRng,
}

impl AssetPicker {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    pub fn choose<'p, T>(&mut self, pool: &'p [T]) -> Option<&'p T> {
        pool.choose(&mut self.rng)
    }
}

/// Assets picked for one video
#[derive(Debug, Clone)]
pub struct SelectedAssets {
    pub primary: MediaAsset,
    pub secondary: Option<MediaAsset>,
    pub overlay: Option<MediaAsset>,
    pub music: Option<MediaAsset>,
    pub transition: Option<PathBuf>,
}

/// Asset loader that resolves, probes and caches media files
pub struct AssetLoader<'a> {
    assets: HashMap<PathBuf, MediaAsset>,
    base_path: PathBuf,
    probe: &'a dyn MediaProbe,
}

impl<'a> AssetLoader<'a> {
    /// Create a new asset loader with a base path for resolving relative paths
    pub fn new(base_path: impl AsRef<Path>, probe: &'a dyn MediaProbe) -> Self {
        Self {
            assets: HashMap::new(),
            base_path: base_path.as_ref().to_path_buf(),
            probe,
        }
    }

    /// Load and probe a media asset, reusing earlier results
    pub fn load(&mut self, kind: AssetKind, path: &Path) -> Result<&MediaAsset> {
        let full_path = self.resolve_path(path);

        if !self.assets.contains_key(&full_path) {
            if !full_path.exists() {
                anyhow::bail!("Media file not found: {}", full_path.display());
            }

            let duration = self.probe.duration(&full_path)?;
            if duration <= 0.0 {
                anyhow::bail!("Media file has no duration: {}", full_path.display());
            }

            self.assets.insert(
                full_path.clone(),
                MediaAsset {
                    kind,
                    path: full_path.clone(),
                    duration,
                },
            );
        }

        self.assets
            .get(&full_path)
            .with_context(|| format!("Asset cache lost {}", full_path.display()))
    }

    /// Resolve a path relative to the base path
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    fn load_optional(&mut self, kind: AssetKind, path: Option<&PathBuf>) -> Option<MediaAsset> {
        let path = path?;
        match self.load(kind, path) {
            Ok(asset) => Some(asset.clone()),
            Err(e) => {
                warn!(?kind, "Leaving out optional layer: {:#}", e);
                None
            }
        }
    }

    /// Pick this run's assets. Only the primary background is required.
    pub fn select(
        &mut self,
        config: &AssetsConfig,
        picker: &mut AssetPicker,
    ) -> PipelineResult<SelectedAssets> {
        let available: Vec<&PathBuf> = config
            .backgrounds
            .iter()
            .filter(|p| self.resolve_path(p).exists())
            .collect();
        let background = match picker.choose(&available) {
            Some(path) => (*path).clone(),
            None => {
                let missing = config
                    .backgrounds
                    .first()
                    .map(|p| self.resolve_path(p))
                    .unwrap_or_else(|| self.base_path.clone());
                return Err(PipelineError::AssetMissing(missing));
            }
        };
        let primary = match self.load(AssetKind::Background, &background) {
            Ok(asset) => asset.clone(),
            Err(e) => {
                warn!("Background unusable: {:#}", e);
                return Err(PipelineError::AssetMissing(self.resolve_path(&background)));
            }
        };

        let secondary_pick = picker.choose(&config.secondary).cloned();
        let secondary = self.load_optional(AssetKind::Secondary, secondary_pick.as_ref());
        let overlay = self.load_optional(AssetKind::Overlay, config.overlay.as_ref());
        let music = self.load_optional(AssetKind::Music, config.music.as_ref());

        let transition = match &config.transition {
            Some(path) if self.resolve_path(path).exists() => Some(self.resolve_path(path)),
            Some(path) => {
                warn!(
                    path = %path.display(),
                    "Transition sound missing, segments will join directly"
                );
                None
            }
            None => None,
        };

        info!(
            background = %primary.path.display(),
            loaded = %self.stats(),
            "Assets selected"
        );

        Ok(SelectedAssets {
            primary,
            secondary,
            overlay,
            music,
            transition,
        })
    }

    /// Get statistics about loaded assets
    pub fn stats(&self) -> AssetStats {
        let mut stats = AssetStats {
            total: self.assets.len(),
            ..AssetStats::default()
        };

        for asset in self.assets.values() {
            match asset.kind {
                AssetKind::Background => stats.backgrounds += 1,
                AssetKind::Secondary => stats.secondary += 1,
                AssetKind::Overlay => stats.overlays += 1,
                AssetKind::Music => stats.music += 1,
            }
        }

        stats
    }
}

/// Statistics about loaded assets
#[derive(Debug, Clone, Default)]
pub struct AssetStats {
    pub total: usize,
    pub backgrounds: usize,
    pub secondary: usize,
    pub overlays: usize,
    pub music: usize,
}

impl std::fmt::Display for AssetStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Total: {}, Backgrounds: {}, Secondary: {}, Overlays: {}, Music: {}",
            self.total, self.backgrounds, self.secondary, self.overlays, self.music
        )
    }
}
