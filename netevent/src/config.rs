use std::path::{Path, PathBuf};

use anyhow::{ensure, Context as _, Result};
use config::{Config, Environment, File, FileFormat};
use netevent_userspace_common::DEFAULT_CAPACITY;
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/netevent/config.toml";

const PAGE_SIZE: usize = 4096;

/// Agent configuration, layered from an optional TOML file and
/// `NETEVENT__<SECTION>__<KEY>` environment variables.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub agent: AgentSection,
    pub channel: ChannelSection,
    pub output: OutputSection,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentSection {
    pub iface: String,
    pub xdp_mode: XdpMode,
    pub ebpf_logging: bool,
    pub stats_interval_secs: u64,
    /// Kernel object to load instead of the workspace build output.
    pub ebpf_object: Option<PathBuf>,
}

impl Default for AgentSection {
    fn default() -> Self {
        AgentSection {
            iface: "eth0".to_string(),
            xdp_mode: XdpMode::default(),
            ebpf_logging: true,
            stats_interval_secs: 10,
            ebpf_object: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum XdpMode {
    #[default]
    Default,
    Skb,
    Drv,
    Hw,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChannelSection {
    pub capacity_bytes: usize,
}

impl Default for ChannelSection {
    fn default() -> Self {
        ChannelSection {
            capacity_bytes: DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputSection {
    pub format: OutputFormat,
    /// Records buffered between the drain loop and the sink.
    pub queue_depth: usize,
}

impl Default for OutputSection {
    fn default() -> Self {
        OutputSection {
            format: OutputFormat::default(),
            queue_depth: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Hex,
}

impl AgentConfig {
    /// Loads `path` if it exists, then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix("NETEVENT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("failed to read config {}", path.display()))?;

        Self::finish(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()
            .context("failed to parse config")?;

        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self> {
        let config: Self = config
            .try_deserialize()
            .context("invalid agent configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.channel.capacity_bytes > 0,
            "channel.capacity_bytes must be non-zero"
        );
        ensure!(
            self.output.queue_depth > 0,
            "output.queue_depth must be non-zero"
        );
        ensure!(
            self.agent.stats_interval_secs > 0,
            "agent.stats_interval_secs must be non-zero"
        );
        Ok(())
    }

    /// The kernel ring buffer only accepts power-of-two, page-aligned sizes.
    pub fn validate_kernel_capacity(&self) -> Result<()> {
        let capacity = self.channel.capacity_bytes;
        ensure!(
            capacity.is_power_of_two() && capacity % PAGE_SIZE == 0,
            "channel.capacity_bytes {} must be a power of two and a multiple of {}",
            capacity,
            PAGE_SIZE
        );
        ensure!(
            u32::try_from(capacity).is_ok(),
            "channel.capacity_bytes {} exceeds the ring buffer limit",
            capacity
        );
        Ok(())
    }
}
