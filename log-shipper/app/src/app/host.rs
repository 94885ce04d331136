//! Host metadata attached to every outgoing batch. Collection is best-effort:
//! anything that cannot be read is left out.

use crate::domain::EnvironmentTags;
use std::fs;
use tracing::debug;

pub const TAG_OS: &str = "OS";
pub const TAG_OS_VERSION: &str = "OSVersion";
pub const TAG_MEMORY_SIZE: &str = "MemorySize";
pub const TAG_PROCESSOR: &str = "Processor";
pub const TAG_MACHINE_NAME: &str = "MachineName";

pub fn collect_environment_tags() -> EnvironmentTags {
    let mut tags = EnvironmentTags::new();
    tags.insert(TAG_OS, std::env::consts::OS);

    if let Some(release) = read_trimmed("/proc/sys/kernel/osrelease") {
        tags.insert(TAG_OS_VERSION, release);
    }
    if let Some(memory) = fs::read_to_string("/proc/meminfo")
        .ok()
        .as_deref()
        .and_then(memory_size_gb)
    {
        tags.insert(TAG_MEMORY_SIZE, memory);
    }
    if let Some(model) = fs::read_to_string("/proc/cpuinfo")
        .ok()
        .as_deref()
        .and_then(processor_model)
    {
        tags.insert(TAG_PROCESSOR, model);
    }
    if let Some(name) = machine_name() {
        tags.insert(TAG_MACHINE_NAME, name);
    }

    debug!("Collected {} environment tags", tags.len());
    tags
}

/// Host name, or `None` when it cannot be read.
pub fn machine_name() -> Option<String> {
    hostname::get()
        .ok()
        .map(|name| name.to_string_lossy().trim().to_string())
        .filter(|name| !name.is_empty())
}

fn read_trimmed(path: &str) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// `MemTotal` from `/proc/meminfo`, rendered in whole gigabytes.
fn memory_size_gb(meminfo: &str) -> Option<String> {
    let kib: u64 = meminfo
        .lines()
        .find_map(|line| line.strip_prefix("MemTotal:"))?
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;
    let gb = (kib as f64 / (1024.0 * 1024.0)).round() as u64;
    Some(format!("{} GB", gb.max(1)))
}

fn processor_model(cpuinfo: &str) -> Option<String> {
    cpuinfo.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        (key.trim() == "model name")
            .then(|| value.trim().to_string())
            .filter(|v| !v.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_size_from_meminfo() {
        let meminfo = "MemTotal:       16303924 kB\nMemFree:         1234 kB\n";
        assert_eq!(memory_size_gb(meminfo).as_deref(), Some("16 GB"));
        assert_eq!(memory_size_gb("MemFree: 12 kB"), None);
        assert_eq!(memory_size_gb("MemTotal: lots kB"), None);
    }

    #[test]
    fn test_processor_model_from_cpuinfo() {
        let cpuinfo = "processor\t: 0\nvendor_id\t: GenuineIntel\nmodel name\t: Intel(R) Xeon(R) CPU @ 2.20GHz\n";
        assert_eq!(
            processor_model(cpuinfo).as_deref(),
            Some("Intel(R) Xeon(R) CPU @ 2.20GHz")
        );
        assert_eq!(processor_model("processor : 0"), None);
    }

    #[test]
    fn test_collected_tags_always_carry_os() {
        let tags = collect_environment_tags();
        assert_eq!(tags.get(TAG_OS), Some(std::env::consts::OS));
    }
}
