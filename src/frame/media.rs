use std::sync::Arc;

use crate::foundation::error::{EngineError, EngineResult};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    /// No preference; whatever the producer yields.
    #[default]
    None,
    Rgb24,
    Rgb24a,
    Yuv422,
    Yuv420p,
    /// Texture handle placeholder; sized like rgba.
    OpenGl,
}

impl ImageFormat {
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Rgb24 => "rgb24",
            Self::Rgb24a => "rgb24a",
            Self::Yuv422 => "yuv422",
            Self::Yuv420p => "yuv420p",
            Self::OpenGl => "opengl",
        }
    }

    /// Buffer size in bytes for a `width` x `height` image, with one spare row.
    pub fn buffer_size(self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize + 1);
        match self {
            Self::None => 0,
            Self::Rgb24 => w * h * 3,
            Self::Rgb24a | Self::OpenGl => w * h * 4,
            Self::Yuv422 => w * h * 2,
            Self::Yuv420p => w * h * 3 / 2,
        }
    }

    /// Bytes of the visible `width` x `height` area, without the spare row.
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        let (w, h) = (width as usize, height as usize);
        match self {
            Self::None => 0,
            Self::Rgb24 => w * h * 3,
            Self::Rgb24a | Self::OpenGl => w * h * 4,
            Self::Yuv422 => w * h * 2,
            Self::Yuv420p => w * h * 3 / 2,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    #[default]
    None,
    S16,
    S32,
    S32le,
    Float,
    F32le,
}

impl AudioFormat {
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::S16 => "s16",
            Self::S32 => "s32",
            Self::S32le => "s32le",
            Self::Float => "float",
            Self::F32le => "f32le",
        }
    }

    pub fn buffer_size(self, samples: usize, channels: usize) -> usize {
        let bytes = match self {
            Self::None => 0,
            Self::S16 => 2,
            Self::S32 | Self::S32le | Self::Float | Self::F32le => 4,
        };
        samples * channels * bytes
    }
}

/// Parameters of an image pull. Ops may rewrite them for the level below.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageRequest {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub writable: bool,
}

impl ImageRequest {
    pub fn new(format: ImageFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            writable: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub data: Arc<Vec<u8>>,
}

impl Image {
    pub fn new(format: ImageFormat, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            format,
            width,
            height,
            data: Arc::new(data),
        }
    }

    /// White card; yuv formats use studio-range white with neutral chroma.
    pub fn test_card(format: ImageFormat, width: u32, height: u32) -> Self {
        let size = format.buffer_size(width, height);
        let data = match format {
            ImageFormat::Yuv422 => [235u8, 128].iter().copied().cycle().take(size).collect(),
            _ => vec![255u8; size],
        };
        Self::new(format, width, height, data)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The visible pixels, trimmed of any spare row.
    pub fn pixels(&self) -> EngineResult<&[u8]> {
        let size = self.format.frame_size(self.width, self.height);
        self.data.get(..size).ok_or_else(|| {
            EngineError::production(format!(
                "{} image {}x{} holds {} bytes, expected {size}",
                self.format.name(),
                self.width,
                self.height,
                self.data.len()
            ))
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioRequest {
    pub format: AudioFormat,
    pub frequency: u32,
    pub channels: u32,
    pub samples: u32,
}

impl AudioRequest {
    pub fn new(format: AudioFormat, frequency: u32, channels: u32, samples: u32) -> Self {
        Self {
            format,
            frequency,
            channels,
            samples,
        }
    }
}

pub const DEFAULT_AUDIO_FREQUENCY: u32 = 48000;
pub const DEFAULT_AUDIO_CHANNELS: u32 = 2;
pub const DEFAULT_AUDIO_SAMPLES: u32 = 1920;

#[derive(Clone, Debug, PartialEq)]
pub struct Audio {
    pub format: AudioFormat,
    pub frequency: u32,
    pub channels: u32,
    pub samples: u32,
    pub data: Arc<Vec<u8>>,
}

impl Audio {
    pub fn new(format: AudioFormat, frequency: u32, channels: u32, samples: u32, data: Vec<u8>) -> Self {
        Self {
            format,
            frequency,
            channels,
            samples,
            data: Arc::new(data),
        }
    }

    pub fn silence(request: AudioRequest) -> Self {
        let size = request
            .format
            .buffer_size(request.samples as usize, request.channels as usize);
        Self::new(
            request.format,
            request.frequency,
            request.channels,
            request.samples,
            vec![0u8; size],
        )
    }
}

#[cfg(test)]
#[path = "../../tests/unit/frame/media.rs"]
mod tests;
