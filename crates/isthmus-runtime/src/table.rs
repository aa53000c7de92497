//! The opaque handle table.
//!
//! Maps an integer handle to a (type tag, storage) pair. Every operation
//! runs under one table-wide `RwLock`, so invalidation on transfer and
//! borrow-token checks are atomic with respect to each other. Share counts
//! are atomics adjusted under the read lock; only the final decrement takes
//! the write lock.
//!
//! Handles carry the generation of the slot they were issued from. An
//! invalidated entry is dropped and its slot reused under the next
//! generation, so later access through the old handle is still reported as
//! [`RuntimeError::StaleHandle`] rather than [`RuntimeError::UnknownHandle`].

use std::any::{type_name, Any};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{Result, RuntimeError};
use crate::handle::{Handle, TypeTag};

/// Raw storage owned by a handle.
pub enum Storage {
    /// A type-erased owned value.
    Value(Box<dyn Any + Send + Sync>),
    /// Bytes lent across the boundary as a view.
    Region(Vec<u8>),
}

impl Storage {
    pub fn value<T: Any + Send + Sync>(value: T) -> Self {
        Self::Value(Box::new(value))
    }

    /// Recover a typed value. Regions and other types are returned unchanged.
    pub fn downcast<T: Any>(self) -> std::result::Result<T, Self> {
        match self {
            Self::Value(boxed) => match boxed.downcast::<T>() {
                Ok(value) => Ok(*value),
                Err(boxed) => Err(Self::Value(boxed)),
            },
            region => Err(region),
        }
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(_) => write!(f, "Value(..)"),
            Self::Region(bytes) => write!(f, "Region({} bytes)", bytes.len()),
        }
    }
}

#[derive(Debug, Default)]
struct BorrowState {
    /// Outstanding tokens as (epoch, mutable).
    active: Vec<(u64, bool)>,
    next_epoch: u64,
    /// Conflicting access attempts observed while any borrow was active.
    violations: u64,
}

impl BorrowState {
    fn is_active(&self) -> bool {
        !self.active.is_empty()
    }

    fn has_exclusive(&self) -> bool {
        self.active.iter().any(|(_, mutable)| *mutable)
    }

    fn grants_exclusive(&self, epoch: u64) -> bool {
        self.active.contains(&(epoch, true))
    }
}

struct Entry {
    tag: TypeTag,
    storage: Storage,
    borrows: BorrowState,
    shares: AtomicUsize,
    thread_shareable: bool,
    owner_thread: ThreadId,
}

impl Entry {
    fn new(tag: TypeTag, storage: Storage, thread_shareable: bool) -> Self {
        Self {
            tag,
            storage,
            borrows: BorrowState::default(),
            shares: AtomicUsize::new(1),
            thread_shareable,
            owner_thread: thread::current().id(),
        }
    }

    fn mismatch(&self, handle: Handle, expected: &str) -> RuntimeError {
        let found = match self.storage {
            Storage::Value(_) => self.tag.to_string(),
            Storage::Region(_) => format!("{} region", self.tag),
        };
        RuntimeError::TypeMismatch {
            handle,
            expected: expected.to_string(),
            found,
        }
    }

    fn value_ref<T: Any>(&self, handle: Handle) -> Result<&T> {
        let value = match &self.storage {
            Storage::Value(boxed) => boxed.downcast_ref::<T>(),
            Storage::Region(_) => None,
        };
        value.ok_or_else(|| self.mismatch(handle, type_name::<T>()))
    }

    fn value_mut<T: Any>(&mut self, handle: Handle) -> Result<&mut T> {
        let err = self.mismatch(handle, type_name::<T>());
        let value = match &mut self.storage {
            Storage::Value(boxed) => boxed.downcast_mut::<T>(),
            Storage::Region(_) => None,
        };
        value.ok_or(err)
    }

    fn region(&self, handle: Handle) -> Result<&[u8]> {
        match &self.storage {
            Storage::Region(bytes) => Ok(bytes),
            Storage::Value(_) => Err(self.mismatch(handle, "region")),
        }
    }

    fn check_thread(&self, handle: Handle) -> Result<()> {
        if !self.thread_shareable && thread::current().id() != self.owner_thread {
            return Err(RuntimeError::CrossThreadShare { handle });
        }
        Ok(())
    }

    /// Record a conflicting access if a borrow is outstanding.
    fn deny_if_borrowed(&mut self, handle: Handle, action: &str) -> Result<()> {
        if self.borrows.is_active() {
            self.borrows.violations += 1;
            warn!(handle = %handle, action, "conflicting access during borrow");
            return Err(RuntimeError::ReentrantMutation {
                handle,
                detail: format!("{action} while borrowed"),
            });
        }
        Ok(())
    }
}

/// A table slot. The generation moves on every time the slot is emptied,
/// so handles issued for earlier occupants no longer match it.
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

#[derive(Default)]
struct Slots {
    slots: Vec<Slot>,
    /// Emptied slots ready for reuse.
    free: Vec<u32>,
}

impl Slots {
    /// Index of the live entry `handle` names.
    fn locate(&self, handle: Handle) -> Result<usize> {
        let index = handle.index() as usize;
        let slot = self
            .slots
            .get(index)
            .filter(|s| handle.generation() != 0 && handle.generation() <= s.generation)
            .ok_or(RuntimeError::UnknownHandle { handle })?;
        if slot.generation != handle.generation() || slot.entry.is_none() {
            return Err(RuntimeError::StaleHandle { handle });
        }
        Ok(index)
    }

    /// Like [`Slots::locate`], for operations that end a handle's life.
    fn locate_owned(&self, handle: Handle) -> Result<usize> {
        self.locate(handle).map_err(|e| match e {
            RuntimeError::StaleHandle { handle } => {
                warn!(handle = %handle, "double invalidation");
                RuntimeError::AlreadyInvalidated { handle }
            }
            other => other,
        })
    }

    fn get(&self, handle: Handle) -> Result<&Entry> {
        let index = self.locate(handle)?;
        self.slots[index]
            .entry
            .as_ref()
            .ok_or(RuntimeError::StaleHandle { handle })
    }

    fn get_mut(&mut self, handle: Handle) -> Result<&mut Entry> {
        let index = self.locate(handle)?;
        self.slots[index]
            .entry
            .as_mut()
            .ok_or(RuntimeError::StaleHandle { handle })
    }

    fn insert(&mut self, entry: Entry) -> Handle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return Handle::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 1,
            entry: Some(entry),
        });
        Handle::new(index, 1)
    }

    /// Empty the slot at `index`. A slot whose generation is exhausted is
    /// retired instead of reused.
    fn remove(&mut self, index: usize) -> Option<Entry> {
        let slot = &mut self.slots[index];
        let entry = slot.entry.take()?;
        if slot.generation < u32::MAX {
            slot.generation += 1;
            self.free.push(index as u32);
        }
        Some(entry)
    }

    fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.entry.is_some()).count()
    }
}

/// A borrow of one handle, presented back at borrow end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowToken {
    handle: Handle,
    epoch: u64,
    mutable: bool,
    violations_at_start: u64,
}

impl BorrowToken {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn mutable(&self) -> bool {
        self.mutable
    }

    /// Borrow counter value when the borrow began.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Result of dropping one share.
#[derive(Debug)]
pub enum ShareOutcome {
    /// Other holders remain.
    Retained(usize),
    /// That was the last holder; the storage is handed back for destruction.
    Destroyed(Storage),
}

/// The runtime handle table.
pub struct HandleTable {
    slots: RwLock<Slots>,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandleTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleTable")
            .field("slots", &self.len())
            .field("live", &self.live_count())
            .finish()
    }
}

fn view_extent(
    handle: Handle,
    offset: usize,
    count: usize,
    stride: usize,
    len: usize,
) -> Result<(usize, usize)> {
    if stride == 0 {
        return Err(RuntimeError::BoundsViolation {
            handle,
            detail: "zero element stride".to_string(),
        });
    }
    let start = offset.checked_mul(stride);
    let end = offset
        .checked_add(count)
        .and_then(|n| n.checked_mul(stride));
    match (start, end) {
        (Some(start), Some(end)) if end <= len => Ok((start, end)),
        _ => Err(RuntimeError::BoundsViolation {
            handle,
            detail: format!(
                "elements {offset}..+{count} of stride {stride} exceed the {len}-byte region"
            ),
        }),
    }
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(Slots::default()),
        }
    }

    /// Register storage under a fresh handle with a single owner.
    pub fn allocate_handle(&self, tag: impl Into<TypeTag>, storage: Storage) -> Handle {
        let handle = self
            .slots
            .write()
            .insert(Entry::new(tag.into(), storage, true));
        debug!(handle = %handle, "allocated handle");
        handle
    }

    pub fn allocate_value<T: Any + Send + Sync>(&self, tag: impl Into<TypeTag>, value: T) -> Handle {
        self.allocate_handle(tag, Storage::value(value))
    }

    /// Register reference-counted storage. The caller holds the first share.
    pub fn allocate_shared(
        &self,
        tag: impl Into<TypeTag>,
        storage: Storage,
        thread_shareable: bool,
    ) -> Handle {
        self.slots
            .write()
            .insert(Entry::new(tag.into(), storage, thread_shareable))
    }

    /// Lend bytes across the boundary as a view.
    pub fn lend_region(&self, tag: impl Into<TypeTag>, bytes: Vec<u8>) -> Handle {
        self.allocate_handle(tag, Storage::Region(bytes))
    }

    /// Invalidate a handle and hand its storage back to the caller.
    pub fn invalidate_handle(&self, handle: Handle) -> Result<Storage> {
        let mut slots = self.slots.write();
        let index = slots.locate_owned(handle)?;
        slots.get_mut(handle)?.deny_if_borrowed(handle, "invalidation")?;
        slots
            .remove(index)
            .map(|entry| entry.storage)
            .ok_or(RuntimeError::StaleHandle { handle })
    }

    /// Move ownership to a fresh handle. The source is invalidated in the
    /// same critical section, so it can never be released twice.
    pub fn transfer(&self, handle: Handle) -> Result<Handle> {
        let mut slots = self.slots.write();
        let index = slots.locate_owned(handle)?;
        slots.get_mut(handle)?.deny_if_borrowed(handle, "transfer")?;
        let entry = slots
            .remove(index)
            .ok_or(RuntimeError::StaleHandle { handle })?;
        let moved = slots.insert(Entry::new(entry.tag, entry.storage, entry.thread_shareable));
        debug!(from = %handle, to = %moved, "transferred handle");
        Ok(moved)
    }

    /// Take the typed value out of a handle, invalidating it. A type
    /// mismatch leaves the handle untouched.
    pub fn take<T: Any>(&self, handle: Handle) -> Result<T> {
        {
            let slots = self.slots.read();
            slots.get(handle)?.value_ref::<T>(handle)?;
        }
        let storage = self.invalidate_handle(handle)?;
        storage
            .downcast::<T>()
            .map_err(|_| RuntimeError::TypeMismatch {
                handle,
                expected: type_name::<T>().to_string(),
                found: "other".to_string(),
            })
    }

    pub fn tag(&self, handle: Handle) -> Result<TypeTag> {
        self.slots.read().get(handle).map(|e| e.tag.clone())
    }

    pub fn is_live(&self, handle: Handle) -> bool {
        self.slots.read().locate(handle).is_ok()
    }

    /// Read a value in place. Reads are allowed during borrows.
    pub fn with_value<T: Any, R>(&self, handle: Handle, f: impl FnOnce(&T) -> R) -> Result<R> {
        let slots = self.slots.read();
        let value = slots.get(handle)?.value_ref::<T>(handle)?;
        Ok(f(value))
    }

    /// Mutate a value through its owner. Fails, and is recorded against
    /// any outstanding borrow, if the value is currently borrowed.
    pub fn mutate<T: Any, R>(&self, handle: Handle, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut slots = self.slots.write();
        let entry = slots.get_mut(handle)?;
        entry.deny_if_borrowed(handle, "owner mutation")?;
        Ok(f(entry.value_mut::<T>(handle)?))
    }

    /// Mutate a value through an exclusive borrow.
    pub fn mutate_borrowed<T: Any, R>(
        &self,
        token: &BorrowToken,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R> {
        let handle = token.handle;
        let mut slots = self.slots.write();
        let entry = slots.get_mut(handle)?;
        if !entry.borrows.grants_exclusive(token.epoch) {
            return Err(RuntimeError::ReentrantMutation {
                handle,
                detail: "token does not grant exclusive access".to_string(),
            });
        }
        Ok(f(entry.value_mut::<T>(handle)?))
    }

    /// Start a borrow. Shared borrows may overlap each other; an exclusive
    /// borrow overlaps nothing.
    pub fn begin_borrow(&self, handle: Handle, mutable: bool) -> Result<BorrowToken> {
        let mut slots = self.slots.write();
        let entry = slots.get_mut(handle)?;
        let conflict = if mutable {
            entry.borrows.is_active()
        } else {
            entry.borrows.has_exclusive()
        };
        if conflict {
            entry.borrows.violations += 1;
            warn!(handle = %handle, mutable, "conflicting borrow");
            return Err(RuntimeError::ReentrantMutation {
                handle,
                detail: if mutable {
                    "exclusive borrow while already borrowed".to_string()
                } else {
                    "shared borrow during an exclusive borrow".to_string()
                },
            });
        }
        let epoch = entry.borrows.next_epoch;
        entry.borrows.next_epoch += 1;
        entry.borrows.active.push((epoch, mutable));
        Ok(BorrowToken {
            handle,
            epoch,
            mutable,
            violations_at_start: entry.borrows.violations,
        })
    }

    /// End a borrow. Fails with `ReentrantMutation` if any conflicting
    /// access was attempted while this borrow was outstanding.
    pub fn end_borrow(&self, token: BorrowToken) -> Result<()> {
        let handle = token.handle;
        let mut slots = self.slots.write();
        let entry = slots.get_mut(handle)?;
        let Some(pos) = entry
            .borrows
            .active
            .iter()
            .position(|(epoch, _)| *epoch == token.epoch)
        else {
            return Err(RuntimeError::ReentrantMutation {
                handle,
                detail: format!("borrow {} is not outstanding", token.epoch),
            });
        };
        entry.borrows.active.remove(pos);
        let attempts = entry.borrows.violations - token.violations_at_start;
        if attempts > 0 {
            return Err(RuntimeError::ReentrantMutation {
                handle,
                detail: format!("{attempts} conflicting access attempt(s) during the borrow"),
            });
        }
        Ok(())
    }

    /// Add a share. Returns the new count.
    pub fn share_increment(&self, handle: Handle) -> Result<usize> {
        let slots = self.slots.read();
        let entry = slots.get(handle)?;
        entry.check_thread(handle)?;
        Ok(entry.shares.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Drop a share. The last drop invalidates the handle and returns its
    /// storage for destruction.
    pub fn share_decrement(&self, handle: Handle) -> Result<ShareOutcome> {
        loop {
            {
                let slots = self.slots.read();
                let entry = slots.get(handle)?;
                entry.check_thread(handle)?;
                let current = entry.shares.load(Ordering::Acquire);
                if current > 1 {
                    if entry
                        .shares
                        .compare_exchange(current, current - 1, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return Ok(ShareOutcome::Retained(current - 1));
                    }
                    continue;
                }
            }

            // Possibly the last share: increments take the read lock, so
            // none can race with this.
            let mut slots = self.slots.write();
            let index = slots.locate(handle)?;
            let entry = slots.get_mut(handle)?;
            if entry.shares.load(Ordering::Acquire) > 1 {
                continue;
            }
            entry.deny_if_borrowed(handle, "final release")?;
            let entry = slots
                .remove(index)
                .ok_or(RuntimeError::StaleHandle { handle })?;
            debug!(handle = %handle, "last share released");
            return Ok(ShareOutcome::Destroyed(entry.storage));
        }
    }

    pub fn share_count(&self, handle: Handle) -> Result<usize> {
        Ok(self.slots.read().get(handle)?.shares.load(Ordering::Acquire))
    }

    /// Bounds guard for a view: `count` elements of `stride` bytes starting
    /// at element `offset` must lie inside the lent region.
    pub fn check_view(&self, handle: Handle, offset: usize, count: usize, stride: usize) -> Result<()> {
        let slots = self.slots.read();
        let region = slots.get(handle)?.region(handle)?;
        view_extent(handle, offset, count, stride, region.len()).map(|_| ())
    }

    /// Bounds-checked copy out of a lent region.
    pub fn read_view(
        &self,
        handle: Handle,
        offset: usize,
        count: usize,
        stride: usize,
    ) -> Result<Vec<u8>> {
        let slots = self.slots.read();
        let region = slots.get(handle)?.region(handle)?;
        let (start, end) = view_extent(handle, offset, count, stride, region.len())?;
        Ok(region[start..end].to_vec())
    }

    /// Bounds-checked write into a lent region through an exclusive borrow.
    pub fn write_view(
        &self,
        token: &BorrowToken,
        offset: usize,
        bytes: &[u8],
        stride: usize,
    ) -> Result<()> {
        let handle = token.handle;
        let mut slots = self.slots.write();
        let entry = slots.get_mut(handle)?;
        if !entry.borrows.grants_exclusive(token.epoch) {
            return Err(RuntimeError::ReentrantMutation {
                handle,
                detail: "write through a non-exclusive view".to_string(),
            });
        }
        let count = if stride == 0 { 0 } else { bytes.len() / stride };
        let tag = entry.tag.to_string();
        match &mut entry.storage {
            Storage::Region(region) => {
                let (start, end) = view_extent(handle, offset, count, stride, region.len())?;
                if end - start != bytes.len() {
                    return Err(RuntimeError::BoundsViolation {
                        handle,
                        detail: format!("{} bytes is not a whole number of elements", bytes.len()),
                    });
                }
                region[start..end].copy_from_slice(bytes);
                Ok(())
            }
            Storage::Value(_) => Err(RuntimeError::TypeMismatch {
                handle,
                expected: "region".to_string(),
                found: tag,
            }),
        }
    }

    /// Start of a lent region. The pointer stays valid while a borrow of
    /// the handle is outstanding, since a borrowed region cannot be
    /// reclaimed or released.
    pub fn region_ptr(&self, handle: Handle) -> Result<*const u8> {
        let slots = self.slots.read();
        Ok(slots.get(handle)?.region(handle)?.as_ptr())
    }

    pub fn region_len(&self, handle: Handle) -> Result<usize> {
        let slots = self.slots.read();
        Ok(slots.get(handle)?.region(handle)?.len())
    }

    /// Return a lent region to its lender.
    pub fn reclaim_region(&self, handle: Handle) -> Result<Vec<u8>> {
        {
            let slots = self.slots.read();
            slots.get(handle)?.region(handle)?;
        }
        match self.invalidate_handle(handle)? {
            Storage::Region(bytes) => Ok(bytes),
            Storage::Value(_) => Err(RuntimeError::TypeMismatch {
                handle,
                expected: "region".to_string(),
                found: "value".to_string(),
            }),
        }
    }

    /// Slots allocated so far, occupied or free.
    pub fn len(&self) -> usize {
        self.slots.read().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn live_count(&self) -> usize {
        self.slots.read().live()
    }
}
