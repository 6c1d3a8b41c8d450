use anyhow::{anyhow, Context as _, Result};
use aya::{
    maps::Map,
    programs::{Xdp, XdpFlags},
    Ebpf,
};
use std::path::{Path, PathBuf};

use crate::config::XdpMode;

/// Represents the XDP capture program to be loaded and attached.
pub struct ProgramBuilder {
    function_name: &'static str,
    iface: String,
    mode: XdpMode,
}

impl ProgramBuilder {
    /// Creates a new ProgramBuilder instance.
    ///
    /// # Arguments
    ///
    /// * `function_name` - The name of the XDP function in the eBPF object.
    /// * `iface` - The network interface the program attaches to.
    pub fn xdp(function_name: &'static str, iface: impl Into<String>) -> Self {
        Self {
            function_name,
            iface: iface.into(),
            mode: XdpMode::Default,
        }
    }

    /// Sets the XDP attach mode.
    pub fn with_mode(mut self, mode: XdpMode) -> Self {
        self.mode = mode;
        self
    }

    /// Loads and attaches the program. It stays attached for as long as
    /// `ebpf` lives.
    pub fn load(&self, ebpf: &mut Ebpf) -> Result<()> {
        let prog: &mut Xdp = ebpf
            .program_mut(self.function_name)
            .ok_or_else(|| anyhow!("Failed to get program {}", self.function_name))?
            .try_into()?;
        prog.load()?;
        prog.attach(&self.iface, xdp_flags(self.mode))
            .with_context(|| {
                format!(
                    "failed to attach {} to {} in {:?} mode",
                    self.function_name, self.iface, self.mode
                )
            })?;
        Ok(())
    }
}

pub fn xdp_flags(mode: XdpMode) -> XdpFlags {
    match mode {
        XdpMode::Default => XdpFlags::default(),
        XdpMode::Skb => XdpFlags::SKB_MODE,
        XdpMode::Drv => XdpFlags::DRV_MODE,
        XdpMode::Hw => XdpFlags::HW_MODE,
    }
}

/// Represents an eBPF map to be taken out of the loaded object.
pub struct MapBuilder {
    name: &'static str,
}

impl MapBuilder {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }

    /// Takes ownership of the map so it can outlive borrows of `ebpf`.
    pub fn take(&self, ebpf: &mut Ebpf) -> Result<Map> {
        ebpf.take_map(self.name)
            .ok_or_else(|| anyhow!("Failed to get map {}", self.name))
    }
}

/// Constructs the path to the kernel object built by `cargo xtask build-ebpf`.
///
/// # Arguments
///
/// * `program_name` - The name of the eBPF program file.
pub fn get_ebpf_path(program_name: &str) -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let ebpf_path = if cfg!(debug_assertions) {
        "target/bpfel-unknown-none/debug"
    } else {
        "target/bpfel-unknown-none/release"
    };

    manifest_dir
        .parent()
        .unwrap_or(manifest_dir)
        .join(ebpf_path)
        .join(program_name)
}
