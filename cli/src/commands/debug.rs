use bytesize::ByteSize;
use color_eyre::eyre::Result;
use corescope_platform::{normalize_vendor, DiskUsage, HardwareProvider};

use crate::config::{self, config_path, UserConfig};
use crate::data::{memory_snapshot, PlatformHardware};
use crate::helper::HelperSource;
use crate::logging;

fn format_bytes(bytes: u64) -> String {
    ByteSize::b(bytes).display().si().to_string()
}

pub fn run() -> Result<()> {
    let config = UserConfig::load();

    println!("corescope debug information");
    println!("{}", "=".repeat(60));

    println!("\n--- Processor ---");
    println!("Supported: {}", PlatformHardware::is_supported());
    let mut hardware = PlatformHardware::new()?;
    let identity = hardware.identity();
    println!("Vendor: {}", normalize_vendor(&identity.vendor));
    println!("Model: {}", identity.model);
    println!(
        "Cores: {} physical, {} logical",
        identity.physical_cores, identity.logical_cores
    );
    match hardware.frequency() {
        Ok(frequency) => {
            println!("Frequency: {:.2} GHz", frequency.average_hz() / 1e9);
            println!("Max frequency: {:.2} GHz", frequency.max_hz as f64 / 1e9);
        }
        Err(e) => println!("Frequency: unavailable ({})", e),
    }
    match hardware.system_counters() {
        Ok(Some(counters)) => println!(
            "Counters: {} context switches, {} interrupts",
            counters.context_switches, counters.interrupts
        ),
        Ok(None) => println!("Counters: not exposed on this platform"),
        Err(e) => println!("Counters: unavailable ({})", e),
    }

    println!("\n--- Helper ---");
    println!("Enabled: {}", config.helper.enabled);
    match HelperSource::from_config(&config.helper) {
        Ok(source) => match source.launch() {
            Ok(launch) => println!("Resolved: {}", launch.program.display()),
            Err(candidates) => {
                println!("Not found. Candidates tried:");
                for candidate in candidates {
                    println!("  {}", candidate.display());
                }
            }
        },
        Err(e) => println!("Resolution failed: {}", e),
    }
    println!(
        "Scale: frequency / {}, voltage / {}",
        config.helper.frequency_divisor, config.helper.voltage_divisor
    );

    println!("\n--- Memory ---");
    match hardware.memory() {
        Ok(info) => {
            let memory = memory_snapshot(&info);
            println!(
                "RAM: {} of {} used ({:.1}%)",
                format_bytes(memory.used_bytes),
                format_bytes(memory.total_bytes),
                memory.usage_percent()
            );
            println!(
                "Swap: {} of {} used ({:.1}%)",
                format_bytes(memory.swap_used_bytes),
                format_bytes(memory.swap_total_bytes),
                memory.swap_usage_percent()
            );
        }
        Err(e) => println!("Memory: unavailable ({})", e),
    }

    println!("\n--- Disks ---");
    match hardware.disks() {
        Ok(disks) => {
            for disk in disks.iter().chain(std::iter::once(&DiskUsage::combined(&disks))) {
                println!(
                    "{} [{}] on {}: {} of {} used ({:.1}%)",
                    disk.name,
                    disk.file_system,
                    disk.mount_point,
                    format_bytes(disk.used_bytes()),
                    format_bytes(disk.total_bytes),
                    disk.usage_percent()
                );
            }
        }
        Err(e) => println!("Disks: unavailable ({})", e),
    }

    println!("\n--- Paths ---");
    println!("Config: {}", config_path().display());
    println!("Cache: {}", config::cache_dir().display());
    println!("Logs: {}", logging::log_dir().display());

    println!("\n--- Current Config ---");
    println!("{}", toml::to_string_pretty(&config)?);

    Ok(())
}
