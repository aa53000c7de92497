//! RAII scopes for guarded crossings.
//!
//! Glue opens a scope before the foreign call and the scope's `Drop`
//! releases the borrow or share however the call exits, including by
//! unwinding. Calling `finish`/`release` surfaces the release result.

use tracing::warn;

use crate::error::{Result, RuntimeError};
use crate::handle::Handle;
use crate::table::{BorrowToken, HandleTable, ShareOutcome};

/// An outstanding borrow, ended on drop.
#[derive(Debug)]
pub struct BorrowScope<'t> {
    table: &'t HandleTable,
    token: Option<BorrowToken>,
}

impl<'t> BorrowScope<'t> {
    pub fn token(&self) -> Option<&BorrowToken> {
        self.token.as_ref()
    }

    /// Write through the borrow. Needs an exclusive borrow of a region.
    pub fn write(&self, offset: usize, bytes: &[u8], stride: usize) -> Result<()> {
        match &self.token {
            Some(token) => self.table.write_view(token, offset, bytes, stride),
            None => Err(RuntimeError::ReentrantMutation {
                handle: Handle::NULL,
                detail: "borrow already ended".to_string(),
            }),
        }
    }

    /// End the borrow and report whether it was violated.
    pub fn finish(mut self) -> Result<()> {
        match self.token.take() {
            Some(token) => self.table.end_borrow(token),
            None => Ok(()),
        }
    }
}

impl Drop for BorrowScope<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            let handle = token.handle();
            if let Err(e) = self.table.end_borrow(token) {
                warn!(handle = %handle, error = %e, "borrow ended with a hazard");
            }
        }
    }
}

/// One share held for the duration of a call.
#[derive(Debug)]
pub struct ShareScope<'t> {
    table: &'t HandleTable,
    handle: Option<Handle>,
}

impl<'t> ShareScope<'t> {
    pub fn handle(&self) -> Option<Handle> {
        self.handle
    }

    /// Drop the share now.
    pub fn release(mut self) -> Result<ShareOutcome> {
        match self.handle.take() {
            Some(handle) => self.table.share_decrement(handle),
            None => Ok(ShareOutcome::Retained(0)),
        }
    }
}

impl Drop for ShareScope<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.table.share_decrement(handle) {
                warn!(handle = %handle, error = %e, "share release failed");
            }
        }
    }
}

impl HandleTable {
    /// Begin a borrow that ends when the scope is dropped.
    pub fn borrow_scope(&self, handle: Handle, mutable: bool) -> Result<BorrowScope<'_>> {
        let token = self.begin_borrow(handle, mutable)?;
        Ok(BorrowScope {
            table: self,
            token: Some(token),
        })
    }

    /// Take a share that is dropped with the scope.
    pub fn share_scope(&self, handle: Handle) -> Result<ShareScope<'_>> {
        self.share_increment(handle)?;
        Ok(ShareScope {
            table: self,
            handle: Some(handle),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Storage;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn borrow_scope_ends_on_drop() {
        let table = HandleTable::new();
        let h = table.allocate_value("Doc", 1_u32);
        {
            let _scope = table.borrow_scope(h, true).unwrap();
            assert!(table.mutate(h, |n: &mut u32| *n += 1).is_err());
        }
        table.mutate(h, |n: &mut u32| *n += 1).unwrap();
        assert_eq!(table.with_value(h, |n: &u32| *n).unwrap(), 2);
    }

    #[test]
    fn finish_reports_violation() {
        let table = HandleTable::new();
        let h = table.allocate_value("Doc", 1_u32);
        let scope = table.borrow_scope(h, false).unwrap();
        let _ = table.mutate(h, |n: &mut u32| *n = 0);
        assert!(matches!(
            scope.finish(),
            Err(RuntimeError::ReentrantMutation { .. })
        ));
    }

    #[test]
    fn write_through_exclusive_scope() {
        let table = HandleTable::new();
        let h = table.lend_region("Pair", vec![0_u8; 8]);
        let shared = table.borrow_scope(h, false).unwrap();
        assert!(shared.write(0, &[1, 2, 3, 4], 4).is_err());
        drop(shared);

        let exclusive = table.borrow_scope(h, true).unwrap();
        exclusive.write(1, &[9, 9, 9, 9], 4).unwrap();
        exclusive.finish().unwrap();
        assert_eq!(table.reclaim_region(h).unwrap(), vec![0, 0, 0, 0, 9, 9, 9, 9]);
    }

    #[test]
    fn share_scope_released_on_unwind() {
        let table = HandleTable::new();
        let h = table.allocate_shared("Shared", Storage::value(0_u8), true);
        let result = catch_unwind(AssertUnwindSafe(|| {
            let _scope = table.share_scope(h).unwrap();
            assert_eq!(table.share_count(h).unwrap(), 2);
            panic!("callee failed");
        }));
        assert!(result.is_err());
        assert_eq!(table.share_count(h).unwrap(), 1);
    }

    #[test]
    fn explicit_release() {
        let table = HandleTable::new();
        let h = table.allocate_shared("Shared", Storage::value(0_u8), true);
        let scope = table.share_scope(h).unwrap();
        assert_eq!(scope.handle(), Some(h));
        assert!(matches!(scope.release().unwrap(), ShareOutcome::Retained(1)));
    }
}
