//! Equalization run configuration.

use std::path::Path;

use common::SerdeFormat;
use serde::{Deserialize, Serialize};

use crate::common::{BinCount, Error, Result};
use crate::image::ChannelMode;
use crate::ops::{check_group_size, ScanAlgorithm, DEFAULT_GROUP_SIZE};

/// Parameters of one equalization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EqualizeConfig {
    /// Number of histogram bins (default: 256).
    pub bins: BinCount,
    /// Prefix-sum strategy for the cumulative histogram.
    pub scan: ScanAlgorithm,
    /// Whether color channels are equalized separately or as one luminance plane.
    pub channel_mode: ChannelMode,
    /// Work-group size of the histogram reduction; power of two, at most 1024.
    pub group_size: u32,
    /// Maximum channel pipelines in flight at once.
    pub max_concurrent_channels: usize,
}

impl Default for EqualizeConfig {
    fn default() -> Self {
        Self {
            bins: BinCount::DEFAULT,
            scan: ScanAlgorithm::default(),
            channel_mode: ChannelMode::default(),
            group_size: DEFAULT_GROUP_SIZE,
            max_concurrent_channels: 4,
        }
    }
}

impl EqualizeConfig {
    /// Default configuration with `bins` bins.
    pub fn with_bins(bins: u32) -> Result<Self> {
        Ok(Self {
            bins: BinCount::new(bins)?,
            ..Self::default()
        })
    }

    pub fn validate(&self) -> Result<()> {
        // Re-check the bin count: the field is public.
        BinCount::new(self.bins.get())?;
        check_group_size(self.group_size)?;
        if self.max_concurrent_channels == 0 {
            return Err(Error::InvalidParameter(
                "max_concurrent_channels must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Loads a YAML or JSON configuration file, chosen by extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let invalid = |reason: String| {
            Error::InvalidParameter(format!("{}: {}", path.display(), reason))
        };

        let format = SerdeFormat::from_path(path).map_err(|e| invalid(e.to_string()))?;
        let text = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let config: Self = format
            .deserialize(&text)
            .map_err(|e| invalid(e.to_string()))?;
        config.validate()?;

        tracing::debug!(path = %path.display(), ?config, "Loaded configuration");
        Ok(config)
    }

    /// Writes the configuration as YAML or JSON, chosen by extension.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let format = SerdeFormat::from_path(path)
            .map_err(|e| Error::InvalidParameter(format!("{}: {}", path.display(), e)))?;
        let text = format
            .serialize(self)
            .map_err(|e| Error::Encoding(format!("{}: {}", path.display(), e)))?;
        std::fs::write(path, text)
            .map_err(|e| Error::Encoding(format!("{}: {}", path.display(), e)))?;

        tracing::debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }
}
