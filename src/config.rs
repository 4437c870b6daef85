/// Heap size and debug-behavior tuning.
///
/// A standalone heap crate only ever has a handful of knobs, so they are
/// plain `HeapConfig` fields with a `Default` rather than a registry of
/// config entries. `from_env` layers `SELFHEAP_<FIELD>` environment
/// overrides on top for embedders that want to tune a running binary
/// without recompiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    /// Eden capacity in bytes. Allocations land here first.
    pub eden_capacity: usize,
    /// Capacity of each of from-space and to-space, in bytes.
    pub semispace_capacity: usize,
    /// Initial old-space capacity in bytes. Old-space has no growth
    /// strategy yet, so this is effectively its only capacity.
    pub old_space_capacity: usize,
    /// Fill freshly bump-allocated memory with 0xAB so uninitialized
    /// reads are detectable. Defaults to on in debug builds.
    pub scrub_on_alloc: bool,
    /// Print collection/evacuation trace lines to stderr.
    pub gc_verbose: bool,
}

impl Default for HeapConfig {
    fn default() -> Self {
        HeapConfig {
            eden_capacity: 1024 * 1024,
            semispace_capacity: 4 * 1024 * 1024,
            old_space_capacity: 16 * 1024 * 1024,
            scrub_on_alloc: cfg!(debug_assertions),
            gc_verbose: false,
        }
    }
}

impl HeapConfig {
    /// Start from `Default::default()` and apply any `SELFHEAP_*`
    /// environment overrides present in the process environment.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_usize("SELFHEAP_EDEN_BYTES") {
            cfg.eden_capacity = v;
        }
        if let Some(v) = env_usize("SELFHEAP_SEMISPACE_BYTES") {
            cfg.semispace_capacity = v;
        }
        if let Some(v) = env_usize("SELFHEAP_OLD_SPACE_BYTES") {
            cfg.old_space_capacity = v;
        }
        if let Some(v) = env_bool("SELFHEAP_SCRUB_ON_ALLOC") {
            cfg.scrub_on_alloc = v;
        }
        if let Some(v) = env_bool("SELFHEAP_GC_VERBOSE") {
            cfg.gc_verbose = v;
        }
        cfg
    }
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok()?.parse().ok()
}

fn env_bool(name: &str) -> Option<bool> {
    match std::env::var(name).ok()?.as_str() {
        "1" | "on" | "true" => Some(true),
        "0" | "off" | "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_megabyte_scale_sizes() {
        let cfg = HeapConfig::default();
        assert_eq!(cfg.eden_capacity, 1024 * 1024);
        assert_eq!(cfg.semispace_capacity, 4 * 1024 * 1024);
        assert_eq!(cfg.old_space_capacity, 16 * 1024 * 1024);
    }
}
