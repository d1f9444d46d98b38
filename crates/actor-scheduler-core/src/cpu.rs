//! CPU discovery and best-effort affinity pinning, via `core_affinity`.
//!
//! Pinning failures are logged and otherwise ignored: a mis-pinned worker
//! still runs correctly, just without the cache-locality benefit.

use tracing::warn;

/// Physical core count, falling back to `std::thread::available_parallelism`
/// if the platform's affinity enumeration comes back empty.
pub fn core_count() -> usize {
    let cores = core_affinity::get_core_ids().map(|ids| ids.len()).unwrap_or(0);
    if cores > 0 {
        return cores;
    }
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

/// Pin the calling thread to the core at `index` in the enumeration order,
/// if affinity info is available and `index` is in range. Best-effort: a
/// failure is logged at `warn!` and otherwise swallowed.
pub fn pin_current_thread(index: usize) {
    let Some(core_ids) = core_affinity::get_core_ids() else {
        warn!("no CPU affinity information available on this platform");
        return;
    };
    let Some(core_id) = core_ids.get(index % core_ids.len().max(1)) else {
        warn!(worker = index, "no core id to pin to");
        return;
    };
    if !core_affinity::set_for_current(*core_id) {
        warn!(worker = index, ?core_id, "failed to pin worker thread to core");
    }
}

/// Choose a dedicated core for the embedder's ASIO collaborator, mirroring
/// `cpu_assign`'s `asio_cpu` output. Returns `None` when `pin_asio` is
/// false (the common case -- ASIO shares whatever core its own thread lands
/// on) or when affinity information isn't available. When `pin_asio` is
/// true, prefers a core beyond the `worker_count` already claimed by
/// workers; if the machine is too small to spare one, falls back to
/// sharing the last worker's core rather than refusing to pin at all.
pub fn assign_asio_cpu(worker_count: usize, pin_asio: bool) -> Option<usize> {
    if !pin_asio {
        return None;
    }
    let total = core_affinity::get_core_ids().map(|ids| ids.len()).unwrap_or(0);
    if total == 0 {
        warn!("pin_asio requested but no CPU affinity information is available");
        return None;
    }
    if total > worker_count {
        Some(worker_count)
    } else {
        Some(total - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_asio_cpu_is_none_when_not_requested() {
        assert_eq!(assign_asio_cpu(4, false), None);
    }
}
