use std::{
    fs::File,
    io::{BufRead, BufReader, Seek},
    path::{Path, PathBuf},
};

use anyhow::Context;
use image::{codecs::gif::GifDecoder, AnimationDecoder};

use crate::material_manager::{TextureData, TextureId, TextureManager};

// Browsers clamp very short GIF delays to 100 ms as well.
const DEFAULT_FRAME_DELAY: f32 = 0.1;
const MIN_FRAME_DELAY: f32 = 0.02;

#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub data: TextureData,
    /// Seconds this frame stays on screen.
    pub delay: f32,
}

#[derive(Debug, Clone)]
pub struct VideoFrames {
    pub frames: Vec<VideoFrame>,
}

impl VideoFrames {
    pub fn duration(&self) -> f32 {
        self.frames.iter().map(|f| f.delay).sum()
    }

    fn frame_at(&self, time: f32) -> usize {
        let mut end = 0.0;
        for (index, frame) in self.frames.iter().enumerate() {
            end += frame.delay;
            if time < end {
                return index;
            }
        }
        self.frames.len().saturating_sub(1)
    }
}

pub fn decode_gif<R: BufRead + Seek>(reader: R) -> anyhow::Result<VideoFrames> {
    let decoder = GifDecoder::new(reader).context("Not a GIF")?;
    let frames = decoder
        .into_frames()
        .collect_frames()
        .context("Failed to decode GIF frames")?;

    let frames: Vec<VideoFrame> = frames
        .into_iter()
        .map(|frame| {
            let (numer, denom) = frame.delay().numer_denom_ms();
            let millis = numer as f32 / denom.max(1) as f32;
            let delay = if millis <= 0.0 {
                DEFAULT_FRAME_DELAY
            } else {
                (millis / 1000.0).max(MIN_FRAME_DELAY)
            };

            VideoFrame {
                data: TextureData::from_rgba_image(frame.into_buffer()),
                delay,
            }
        })
        .collect();

    if frames.is_empty() {
        anyhow::bail!("GIF without frames");
    }

    Ok(VideoFrames { frames })
}

pub fn decode_gif_file(path: &Path) -> anyhow::Result<VideoFrames> {
    let file = File::open(path)?;
    decode_gif(BufReader::new(file))
}

/// Plays a looping frame sequence into a texture. Starts paused and muted.
/// Frames are loaded elsewhere and handed over with `set_frames`.
pub struct VideoPlayer {
    sources: Vec<PathBuf>,
    index: usize,
    frames: Option<VideoFrames>,
    playhead: f32,
    shown_frame: Option<usize>,
    playing: bool,
    muted: bool,
    looping: bool,
    texture: TextureId,
}

impl VideoPlayer {
    /// With no sources the player stays blank.
    pub fn new(sources: Vec<PathBuf>, texture: TextureId) -> Self {
        Self {
            sources,
            index: 0,
            frames: None,
            playhead: 0.0,
            shown_frame: None,
            playing: false,
            muted: true,
            looping: true,
            texture,
        }
    }

    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current_source(&self) -> Option<&Path> {
        self.sources.get(self.index).map(PathBuf::as_path)
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn mute(&mut self) {
        self.muted = true;
    }

    pub fn unmute(&mut self) {
        self.muted = false;
    }

    /// Moves to the next source, wrapping around, and keeps playing. Returns
    /// the source that now needs loading.
    pub fn change_video(&mut self) -> Option<&Path> {
        if self.sources.is_empty() {
            log::warn!("No video sources to change to");
            return None;
        }

        self.index = (self.index + 1) % self.sources.len();
        self.pause();
        self.frames = None;
        self.playhead = 0.0;
        self.shown_frame = None;
        self.play();
        self.current_source()
    }

    /// Frames for a source that is no longer current are dropped.
    pub fn set_frames(
        &mut self,
        source: usize,
        frames: VideoFrames,
        textures: &mut TextureManager,
    ) {
        if source != self.index {
            log::debug!("Dropping frames for stale video source {}", source);
            return;
        }

        self.frames = Some(frames);
        self.playhead = 0.0;
        self.shown_frame = None;
        self.show_current_frame(textures);
    }

    pub fn advance(&mut self, dt: f32, textures: &mut TextureManager) {
        if !self.playing {
            return;
        }
        let Some(frames) = &self.frames else {
            return;
        };

        let duration = frames.duration();
        self.playhead += dt;
        if self.playhead >= duration {
            if self.looping && duration > 0.0 {
                self.playhead %= duration;
            } else {
                self.playhead = duration;
                self.playing = false;
            }
        }

        self.show_current_frame(textures);
    }

    fn show_current_frame(&mut self, textures: &mut TextureManager) {
        let Some(frames) = &self.frames else {
            return;
        };

        let frame_index = frames.frame_at(self.playhead);
        if self.shown_frame == Some(frame_index) {
            return;
        }

        textures.set_data(self.texture, frames.frames[frame_index].data.clone());
        self.shown_frame = Some(frame_index);
    }
}
