use std::path::Path;

use crate::foundation::error::{EngineError, EngineResult};

/// Video profile shared by the services of one graph.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Profile {
    pub description: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate_num: u32,
    pub frame_rate_den: u32,
    pub sample_aspect_num: u32,
    pub sample_aspect_den: u32,
    pub progressive: bool,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            description: "PAL 4:3 DV or DVD".to_string(),
            width: 720,
            height: 576,
            frame_rate_num: 25,
            frame_rate_den: 1,
            sample_aspect_num: 16,
            sample_aspect_den: 15,
            progressive: false,
        }
    }
}

impl Profile {
    pub fn fps(&self) -> f64 {
        if self.frame_rate_den == 0 {
            return 0.0;
        }
        f64::from(self.frame_rate_num) / f64::from(self.frame_rate_den)
    }

    /// Sample (pixel) aspect ratio.
    pub fn sar(&self) -> f64 {
        if self.sample_aspect_den == 0 {
            return 1.0;
        }
        f64::from(self.sample_aspect_num) / f64::from(self.sample_aspect_den)
    }

    /// Display aspect ratio.
    pub fn dar(&self) -> f64 {
        if self.height == 0 {
            return 0.0;
        }
        self.sar() * f64::from(self.width) / f64::from(self.height)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(EngineError::config("profile width and height must be non-zero"));
        }
        if self.frame_rate_num == 0 || self.frame_rate_den == 0 {
            return Err(EngineError::config("profile frame rate must be non-zero"));
        }
        if self.sample_aspect_num == 0 || self.sample_aspect_den == 0 {
            return Err(EngineError::config("profile sample aspect must be non-zero"));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> EngineResult<Self> {
        let profile: Self =
            serde_json::from_str(json).map_err(|e| EngineError::serde(e.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn from_path(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("read profile {}: {e}", path.display()))?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/profile.rs"]
mod tests;
