//! Texture loading.
//!
//! Sprites are loaded concurrently and fanned back in: the caller awaits
//! [`load_textures`], which resolves only once every sprite named in the
//! manifest has loaded. Any failure aborts the whole load.

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Sprites the client draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpriteId {
    Body,
    Hand,
}

impl SpriteId {
    pub const ALL: [SpriteId; 2] = [SpriteId::Body, SpriteId::Hand];

    pub fn name(self) -> &'static str {
        match self {
            SpriteId::Body => "body01",
            SpriteId::Hand => "arm01",
        }
    }

    /// Path relative to the assets directory.
    pub fn default_path(self) -> &'static str {
        match self {
            SpriteId::Body => "images/skins/body01.png",
            SpriteId::Hand => "images/skins/arm01.png",
        }
    }
}

/// A loaded image. Decoding is left to the drawing backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub name: String,
    pub data: Bytes,
}

/// Loads one image.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, name: &str, path: &str) -> anyhow::Result<Texture>;
}

/// Reads images from a directory on disk.
#[derive(Debug, Clone)]
pub struct FsImageLoader {
    root: PathBuf,
}

impl FsImageLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ImageLoader for FsImageLoader {
    async fn load(&self, name: &str, path: &str) -> anyhow::Result<Texture> {
        let full = self.root.join(path);
        let data = tokio::fs::read(&full)
            .await
            .with_context(|| format!("read sprite {}", full.display()))?;
        Ok(Texture {
            name: name.to_string(),
            data: Bytes::from(data),
        })
    }
}

/// Produces empty images. Used when no assets directory is configured.
#[derive(Debug, Default, Clone)]
pub struct PlaceholderLoader;

#[async_trait]
impl ImageLoader for PlaceholderLoader {
    async fn load(&self, name: &str, _path: &str) -> anyhow::Result<Texture> {
        Ok(Texture {
            name: name.to_string(),
            data: Bytes::new(),
        })
    }
}

/// All sprites, ready to draw.
#[derive(Debug, Clone, Default)]
pub struct TextureTable {
    textures: HashMap<SpriteId, Texture>,
}

impl TextureTable {
    pub fn get(&self, id: SpriteId) -> Option<&Texture> {
        self.textures.get(&id)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Table of empty placeholder textures, for tests and headless runs.
    pub fn placeholders() -> Self {
        let textures = SpriteId::ALL
            .iter()
            .map(|&id| {
                (
                    id,
                    Texture {
                        name: id.name().to_string(),
                        data: Bytes::new(),
                    },
                )
            })
            .collect();
        Self { textures }
    }
}

/// Loads every sprite concurrently and waits until all have completed.
pub async fn load_textures(loader: Arc<dyn ImageLoader>) -> anyhow::Result<TextureTable> {
    let expected = SpriteId::ALL.len();
    let mut tasks = JoinSet::new();
    for id in SpriteId::ALL {
        let loader = Arc::clone(&loader);
        tasks.spawn(async move {
            let tex = loader.load(id.name(), id.default_path()).await;
            (id, tex)
        });
    }

    let mut loaded = 0usize;
    let mut textures = HashMap::with_capacity(expected);
    while let Some(joined) = tasks.join_next().await {
        let (id, tex) = joined.context("texture load task")?;
        let tex = tex.with_context(|| format!("load sprite {}", id.name()))?;
        loaded += 1;
        debug!(sprite = id.name(), loaded, expected, "Sprite loaded");
        textures.insert(id, tex);
    }

    if loaded != expected {
        anyhow::bail!("loaded {loaded} of {expected} sprites");
    }
    info!(count = loaded, "All sprites loaded");
    Ok(TextureTable { textures })
}
