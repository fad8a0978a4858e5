/*!
 * Memory Management
 *
 * Maps process memory demands onto a small physical frame pool backed by
 * unbounded virtual storage. Pages are demand-paged: a reservation puts
 * every page into virtual storage, and a page only becomes resident when
 * it is first resolved. Under frame pressure the victim is always chosen
 * from the requesting process's own resident pages.
 */

mod cache;
mod types;

pub use types::{MemoryError, MemoryResult, MemoryStats, Page};

use crate::core::types::{PageId, Pid, Size};
use crate::core::SimConfig;
use ahash::RandomState;
use cache::PageCache;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Lock-free counters behind `MemoryStats`, shared with the display side
#[derive(Debug, Default)]
pub struct AtomicMemoryStats {
    frame_capacity: AtomicUsize,
    resident: AtomicUsize,
    virtual_pages: AtomicUsize,
    cache_entries: AtomicUsize,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    evictions: AtomicU64,
    release_generation: AtomicU64,
}

impl AtomicMemoryStats {
    pub fn snapshot(&self) -> MemoryStats {
        MemoryStats {
            frame_capacity: self.frame_capacity.load(Ordering::Relaxed),
            resident_pages: self.resident.load(Ordering::Relaxed),
            virtual_pages: self.virtual_pages.load(Ordering::Relaxed),
            cache_entries: self.cache_entries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            release_generation: self.release_generation.load(Ordering::Relaxed),
        }
    }
}

/// Memory manager
///
/// Owns the frame pool, the page table (resident pages only), the virtual
/// overflow store, and the page cache. Mutated only by the scheduler
/// thread; observers read the atomic stats snapshot.
pub struct MemoryManager {
    page_size: Size,
    frames: Vec<Option<Page>>,
    page_table: HashMap<PageId, usize, RandomState>,
    virtual_store: Vec<Page>,
    cache: PageCache,
    next_page_id: PageId,
    release_generation: u64,
    stats: Arc<AtomicMemoryStats>,
}

impl MemoryManager {
    pub fn new(total_ram: Size, page_size: Size, cache_capacity: usize) -> Self {
        let capacity = total_ram / page_size;
        info!(
            "memory manager initialized: {} frames of {} bytes, cache capacity {}",
            capacity, page_size, cache_capacity
        );

        let stats = Arc::new(AtomicMemoryStats::default());
        stats.frame_capacity.store(capacity, Ordering::Relaxed);

        Self {
            page_size,
            frames: (0..capacity).map(|_| None).collect(),
            page_table: HashMap::with_hasher(RandomState::new()),
            virtual_store: Vec::new(),
            cache: PageCache::new(cache_capacity),
            next_page_id: 0,
            release_generation: 0,
            stats,
        }
    }

    pub fn with_config(config: &SimConfig) -> Self {
        Self::new(config.total_ram, config.page_size, config.cache_capacity)
    }

    pub fn page_size(&self) -> Size {
        self.page_size
    }

    pub fn frame_capacity(&self) -> usize {
        self.frames.len()
    }

    /// Counter handle for the display side; survives the manager moving
    /// onto the scheduler thread
    pub fn stats_handle(&self) -> Arc<AtomicMemoryStats> {
        Arc::clone(&self.stats)
    }

    pub fn stats(&self) -> MemoryStats {
        self.stats.snapshot()
    }

    /// Bumped whenever a release frees at least one frame; the scheduler
    /// uses it to retry processes parked on admission failure
    pub fn release_generation(&self) -> u64 {
        self.release_generation
    }

    /// Reserve `ceil(size / page_size)` fresh pages for a process.
    ///
    /// Nothing becomes resident here; every page starts in virtual
    /// storage and is promoted on first resolve.
    pub fn reserve(&mut self, size: Size, owner: Pid) -> Vec<PageId> {
        let count = (size + self.page_size - 1) / self.page_size;
        let mut ids = Vec::with_capacity(count);

        for _ in 0..count {
            let id = self.next_page_id;
            self.next_page_id += 1;
            self.virtual_store.push(Page::new(id, owner, self.page_size));
            ids.push(id);
        }

        debug!("reserved {} pages for process {}", count, owner);
        self.publish();
        ids
    }

    /// Look up a page: cache, then page table, then a linear scan of
    /// virtual storage (promoting the page on a hit there).
    pub fn resolve(&mut self, id: PageId) -> MemoryResult<Page> {
        // Cache hit: O(1), no page-table side effects
        if let Some(page) = self.cache.get(id) {
            let page = page.clone();
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(page);
        }
        self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);

        // Already resident
        if let Some(&frame) = self.page_table.get(&id) {
            if let Some(page) = self.frames[frame].clone() {
                self.cache.insert(page.clone());
                self.publish();
                return Ok(page);
            }
        }

        // Overflow store; promote on hit
        let Some(idx) = self.virtual_store.iter().position(|p| p.id == id) else {
            return Err(MemoryError::PageNotFound(id));
        };

        // Make room before pulling the page out, so an admission failure
        // leaves the page where it was
        let owner = self.virtual_store[idx].owner;
        if self.free_frame().is_none() {
            self.evict_for(owner)?;
        }

        let page = self.virtual_store.swap_remove(idx);
        let resolved = page.clone();
        self.admit(page)?;
        self.cache.insert(resolved.clone());
        self.publish();
        Ok(resolved)
    }

    /// Install a page into physical memory, evicting one of its owner's
    /// resident pages if no frame is free.
    pub fn admit(&mut self, page: Page) -> MemoryResult<usize> {
        let frame = match self.free_frame() {
            Some(idx) => idx,
            None => self.evict_for(page.owner)?,
        };

        self.page_table.insert(page.id, frame);
        self.frames[frame] = Some(page);
        self.publish();
        Ok(frame)
    }

    /// Drop every physical and virtual page owned by a process.
    ///
    /// Safe to call more than once; the second call finds nothing and is
    /// a no-op. Returns the number of pages freed.
    pub fn release(&mut self, pid: Pid) -> usize {
        let mut freed_frames = 0;
        for slot in self.frames.iter_mut() {
            if slot.as_ref().map_or(false, |p| p.owner == pid) {
                if let Some(page) = slot.take() {
                    self.page_table.remove(&page.id);
                    freed_frames += 1;
                }
            }
        }

        let before = self.virtual_store.len();
        self.virtual_store.retain(|p| p.owner != pid);
        let freed_virtual = before - self.virtual_store.len();

        self.cache.remove_owned_by(pid);

        if freed_frames > 0 {
            self.release_generation += 1;
            self.stats
                .release_generation
                .store(self.release_generation, Ordering::Relaxed);
        }

        if freed_frames + freed_virtual > 0 {
            info!(
                "released {} resident and {} virtual pages for process {}",
                freed_frames, freed_virtual, pid
            );
        }

        self.publish();
        freed_frames + freed_virtual
    }

    /// Page IDs currently resident in physical memory
    pub fn resident_page_ids(&self) -> Vec<PageId> {
        self.page_table.keys().copied().collect()
    }

    /// Page IDs currently in virtual storage
    pub fn virtual_page_ids(&self) -> Vec<PageId> {
        self.virtual_store.iter().map(|p| p.id).collect()
    }

    pub fn is_resident(&self, id: PageId) -> bool {
        self.page_table.contains_key(&id)
    }

    fn free_frame(&self) -> Option<usize> {
        self.frames.iter().position(Option::is_none)
    }

    /// Demote one of the requester's own resident pages back to virtual
    /// storage and return its freed frame
    fn evict_for(&mut self, requester: Pid) -> MemoryResult<usize> {
        let victim = self
            .page_table
            .iter()
            .find(|(_, frame)| {
                self.frames[**frame]
                    .as_ref()
                    .map_or(false, |p| p.owner == requester)
            })
            .map(|(id, frame)| (*id, *frame));

        let Some((victim_id, frame)) = victim else {
            return Err(MemoryError::NoEvictionCandidate(requester));
        };

        self.page_table.remove(&victim_id);
        self.cache.remove(victim_id);
        if let Some(page) = self.frames[frame].take() {
            self.virtual_store.push(page);
        }

        self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        debug!(
            "evicted page {} of process {} from frame {}",
            victim_id, requester, frame
        );
        Ok(frame)
    }

    fn publish(&self) {
        self.stats
            .resident
            .store(self.page_table.len(), Ordering::Relaxed);
        self.stats
            .virtual_pages
            .store(self.virtual_store.len(), Ordering::Relaxed);
        self.stats
            .cache_entries
            .store(self.cache.len(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservation_is_demand_paged() {
        let mut memory = MemoryManager::new(16, 4, 4);
        let pages = memory.reserve(8, 1);

        assert_eq!(pages.len(), 2);
        assert_eq!(memory.resident_page_ids().len(), 0);
        assert_eq!(memory.virtual_page_ids().len(), 2);
    }

    #[test]
    fn resolve_promotes_and_caches() {
        let mut memory = MemoryManager::new(16, 4, 4);
        let pages = memory.reserve(4, 1);

        let page = memory.resolve(pages[0]).unwrap();
        assert_eq!(page.id, pages[0]);
        assert!(memory.is_resident(pages[0]));

        // Second lookup is served from the cache
        memory.resolve(pages[0]).unwrap();
        let stats = memory.stats();
        assert_eq!(stats.cache_hits, 1);
    }

    #[test]
    fn resolve_unknown_page_fails() {
        let mut memory = MemoryManager::new(16, 4, 4);
        assert_eq!(memory.resolve(42), Err(MemoryError::PageNotFound(42)));
    }

    #[test]
    fn failed_admission_leaves_page_in_virtual_storage() {
        // One frame; two owners with one page each
        let mut memory = MemoryManager::new(4, 4, 4);
        let a = memory.reserve(4, 1);
        let b = memory.reserve(4, 2);

        memory.resolve(a[0]).unwrap();
        assert_eq!(
            memory.resolve(b[0]),
            Err(MemoryError::NoEvictionCandidate(2))
        );
        assert!(memory.virtual_page_ids().contains(&b[0]));
    }
}
