//! Disk space introspection

use std::path::Path;

/// Total and available bytes on the filesystem holding a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

/// Oracle answering how much space is left for a path
pub trait DiskSpace: Send + Sync {
    fn usage(&self, path: &Path) -> std::io::Result<DiskUsage>;
}

/// Queries the OS via `fs2`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDiskSpace;

impl DiskSpace for SystemDiskSpace {
    fn usage(&self, path: &Path) -> std::io::Result<DiskUsage> {
        // The target itself usually does not exist yet
        let probe = path
            .ancestors()
            .find(|p| p.exists())
            .unwrap_or_else(|| Path::new("."));

        Ok(DiskUsage {
            total_bytes: fs2::total_space(probe)?,
            available_bytes: fs2::available_space(probe)?,
        })
    }
}

/// Reports the same numbers for every path
#[derive(Debug, Clone, Copy)]
pub struct FixedDiskSpace(pub DiskUsage);

impl FixedDiskSpace {
    pub fn available(available_bytes: u64) -> Self {
        Self(DiskUsage {
            total_bytes: available_bytes.max(1) * 2,
            available_bytes,
        })
    }
}

impl DiskSpace for FixedDiskSpace {
    fn usage(&self, _path: &Path) -> std::io::Result<DiskUsage> {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_disk_space_for_missing_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let usage = SystemDiskSpace
            .usage(&temp_dir.path().join("not/yet/created.bin"))
            .unwrap();
        assert!(usage.total_bytes > 0);
        assert!(usage.available_bytes <= usage.total_bytes);
    }

    #[test]
    fn test_fixed_disk_space() {
        let oracle = FixedDiskSpace::available(100);
        let usage = oracle.usage(Path::new("/anywhere")).unwrap();
        assert_eq!(usage.available_bytes, 100);
        assert_eq!(usage.total_bytes, 200);
    }
}
