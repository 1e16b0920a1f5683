// src/utils/system.rs: System functions

use sysinfo::{MemoryRefreshKind, RefreshKind, System};
use anyhow::{anyhow, Result};
use log::{info, warn};
use crate::config::defs::MAX_TOOL_MEMORY_GB;

const GIB: u64 = 1_073_741_824;


/// Finds the amount of total and available RAM, keyed to OS
///
/// # Returns
///
/// Result<u64, u64> total ram, available ram
pub fn detect_ram() -> Result<(u64, u64)> {
    let (total_ram, available_ram) = if cfg!(target_os = "macos") {
        let refresh_kind = RefreshKind::nothing().with_memory(MemoryRefreshKind::everything());
        let system = System::new_with_specifics(refresh_kind);
        let total = system.total_memory();
        let used = system.used_memory();
        (total, total.saturating_sub(used))
    } else {
        let mut system = System::new();
        system.refresh_memory();
        (system.total_memory(), system.available_memory())
    };

    if total_ram == 0 || available_ram == 0 {
        return Err(anyhow!("Failed to detect valid RAM values"));
    }

    Ok((total_ram, available_ram))
}


/// Physical cores, falling back to 1 when the platform does not say.
pub fn detect_cores() -> usize {
    System::physical_core_count().unwrap_or(1)
}


/// Logs the host resources and warns when the tools' fixed memory ceilings
/// exceed what is available. Never fails the run.
pub fn report_resources() {
    let cores = detect_cores();
    match detect_ram() {
        Ok((total_ram, available_ram)) => {
            info!(
                "Host has {} physical cores, {} GiB RAM ({} GiB available)",
                cores,
                total_ram / GIB,
                available_ram / GIB
            );
            if !memory_is_sufficient(available_ram) {
                warn!(
                    "Available RAM ({} GiB) is below the largest tool memory ceiling ({} GiB); memory-bound steps may fail",
                    available_ram / GIB,
                    MAX_TOOL_MEMORY_GB
                );
            }
        }
        Err(e) => warn!("Could not detect RAM: {}", e),
    }
}

pub fn memory_is_sufficient(available_ram: u64) -> bool {
    available_ram >= MAX_TOOL_MEMORY_GB * GIB
}
