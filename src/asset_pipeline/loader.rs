use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc::{self, channel},
        Arc,
    },
};

use anyhow::Context;

use crate::{material_manager::TextureData, video::VideoFrames};

pub struct GltfImport {
    pub document: gltf::Document,
    pub buffers: Vec<gltf::buffer::Data>,
    pub images: Vec<gltf::image::Data>,
}

pub enum Asset {
    Image(TextureData),
    Gltf(GltfImport),
    Frames(VideoFrames),
}

pub struct Loaded<K> {
    pub key: K,
    pub path: PathBuf,
    pub asset: Asset,
}

/// Decodes assets on the rayon pool. Results are handed back through `poll`,
/// which the frame loop calls once per frame. Failed loads are logged and
/// never reported.
pub struct AssetLoader<K> {
    sender: mpsc::Sender<Loaded<K>>,
    receiver: mpsc::Receiver<Loaded<K>>,
    pending: Arc<AtomicUsize>,
}

impl<K: Send + 'static> AssetLoader<K> {
    pub fn new() -> Self {
        let (sender, receiver) = channel();

        Self {
            sender,
            receiver,
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn request_image(&self, key: K, path: PathBuf) {
        self.spawn(key, path, |path| {
            let image = image::ImageReader::open(path)?
                .with_guessed_format()?
                .decode()
                .context("Failed to decode image")?;
            Ok(Asset::Image(TextureData::from_rgba_image(image.to_rgba8())))
        });
    }

    pub fn request_gltf(&self, key: K, path: PathBuf) {
        self.spawn(key, path, |path| {
            let (document, buffers, images) = gltf::import(path)?;
            Ok(Asset::Gltf(GltfImport {
                document,
                buffers,
                images,
            }))
        });
    }

    pub fn request_frames(&self, key: K, path: PathBuf) {
        self.spawn(key, path, |path| {
            crate::video::decode_gif_file(path).map(Asset::Frames)
        });
    }

    /// Number of requests that have neither completed nor failed.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Drains everything that finished since the last call.
    pub fn poll(&self) -> Vec<Loaded<K>> {
        self.receiver.try_iter().collect()
    }

    #[cfg(test)]
    pub fn wait(&self, timeout: std::time::Duration) -> Option<Loaded<K>> {
        self.receiver.recv_timeout(timeout).ok()
    }

    fn spawn<F>(&self, key: K, path: PathBuf, decode: F)
    where
        F: FnOnce(&Path) -> anyhow::Result<Asset> + Send + 'static,
    {
        let sender = self.sender.clone();
        let pending = self.pending.clone();
        pending.fetch_add(1, Ordering::AcqRel);

        rayon::spawn(move || {
            match decode(&path) {
                Ok(asset) => {
                    log::debug!("Loaded {}", path.display());
                    // The receiver only goes away when the app shuts down.
                    let _ = sender.send(Loaded { key, path, asset });
                }
                Err(e) => log::error!("Failed to load {}: {:#}", path.display(), e),
            }
            pending.fetch_sub(1, Ordering::AcqRel);
        });
    }
}
