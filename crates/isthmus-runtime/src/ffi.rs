//! C entry points over the process-wide handle table.
//!
//! Every entry point returns a discriminant code, zero on success. On
//! failure the channel value is kept per thread until fetched with
//! `isthmus_last_error`.

use std::cell::RefCell;
use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::channel::{from_error_code, raise_error, Discriminant, ErrorChannelValue, RawChannel};
use crate::error::RuntimeError;
use crate::handle::Handle;
use crate::table::{BorrowToken, HandleTable};

static GLOBAL: Lazy<HandleTable> = Lazy::new(HandleTable::new);

/// Borrow tokens handed to C, keyed by (handle, epoch).
static TOKENS: Lazy<Mutex<HashMap<(Handle, u64), BorrowToken>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

thread_local! {
    static LAST_ERROR: RefCell<Option<ErrorChannelValue>> = const { RefCell::new(None) };
}

/// The handle table shared by all glue in the process.
pub fn global_table() -> &'static HandleTable {
    &GLOBAL
}

fn record(value: ErrorChannelValue) -> u8 {
    let code = value.discriminant.code();
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(value));
    code
}

fn status(result: crate::Result<()>) -> u8 {
    match result {
        Ok(()) => Discriminant::Success.code(),
        Err(e) => record(e.into()),
    }
}

fn null_out(what: &str) -> u8 {
    record(raise_error(Discriminant::Hazard, format!("null {what} pointer")))
}

/// Take this thread's last recorded failure.
pub fn take_last_error() -> Option<ErrorChannelValue> {
    LAST_ERROR.with(|slot| slot.borrow_mut().take())
}

#[no_mangle]
pub extern "C" fn isthmus_transfer(handle: u64, out: *mut u64) -> u8 {
    if out.is_null() {
        return null_out("out");
    }
    match GLOBAL.transfer(Handle::from_raw(handle)) {
        Ok(moved) => {
            unsafe { *out = moved.raw() };
            Discriminant::Success.code()
        }
        Err(e) => record(e.into()),
    }
}

/// Invalidate a handle and destroy what it owns.
#[no_mangle]
pub extern "C" fn isthmus_release(handle: u64) -> u8 {
    status(GLOBAL.invalidate_handle(Handle::from_raw(handle)).map(drop))
}

#[no_mangle]
pub extern "C" fn isthmus_borrow_begin(handle: u64, mutable: bool, token: *mut u64) -> u8 {
    if token.is_null() {
        return null_out("token");
    }
    let handle = Handle::from_raw(handle);
    match GLOBAL.begin_borrow(handle, mutable) {
        Ok(issued) => {
            let epoch = issued.epoch();
            TOKENS.lock().insert((handle, epoch), issued);
            unsafe { *token = epoch };
            Discriminant::Success.code()
        }
        Err(e) => record(e.into()),
    }
}

#[no_mangle]
pub extern "C" fn isthmus_borrow_end(handle: u64, token: u64) -> u8 {
    let handle = Handle::from_raw(handle);
    let Some(issued) = TOKENS.lock().remove(&(handle, token)) else {
        return record(
            RuntimeError::ReentrantMutation {
                handle,
                detail: format!("borrow {token} is not outstanding"),
            }
            .into(),
        );
    };
    status(GLOBAL.end_borrow(issued))
}

#[no_mangle]
pub extern "C" fn isthmus_share_increment(handle: u64) -> u8 {
    status(GLOBAL.share_increment(Handle::from_raw(handle)).map(drop))
}

/// Drop a share; the last one destroys the storage.
#[no_mangle]
pub extern "C" fn isthmus_share_decrement(handle: u64) -> u8 {
    status(GLOBAL.share_decrement(Handle::from_raw(handle)).map(drop))
}

#[no_mangle]
pub extern "C" fn isthmus_view_check(handle: u64, offset: usize, count: usize, stride: usize) -> u8 {
    status(GLOBAL.check_view(Handle::from_raw(handle), offset, count, stride))
}

/// Start of a lent region, or null. Valid while the handle is borrowed.
#[no_mangle]
pub extern "C" fn isthmus_view_data(handle: u64) -> *const u8 {
    match GLOBAL.region_ptr(Handle::from_raw(handle)) {
        Ok(ptr) => ptr,
        Err(e) => {
            record(e.into());
            std::ptr::null()
        }
    }
}

/// Copy `len` bytes into a fresh lent region.
#[no_mangle]
pub extern "C" fn isthmus_lend(data: *const u8, len: usize, out: *mut u64) -> u8 {
    if out.is_null() || (data.is_null() && len > 0) {
        return null_out("lend");
    }
    let bytes = if len == 0 {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(data, len) }.to_vec()
    };
    let handle = GLOBAL.lend_region("region", bytes);
    unsafe { *out = handle.raw() };
    Discriminant::Success.code()
}

/// Invalidate a lent region, copying up to `cap` bytes of it into `dst`
/// when `dst` is not null.
#[no_mangle]
pub extern "C" fn isthmus_reclaim(handle: u64, dst: *mut u8, cap: usize) -> u8 {
    match GLOBAL.reclaim_region(Handle::from_raw(handle)) {
        Ok(bytes) => {
            if !dst.is_null() {
                let n = bytes.len().min(cap);
                unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, n) };
            }
            Discriminant::Success.code()
        }
        Err(e) => record(e.into()),
    }
}

/// Record a native error code as this thread's failure.
#[no_mangle]
pub extern "C" fn isthmus_raise_code(code: i32) -> u8 {
    let value = from_error_code(code);
    if value.is_success() {
        return Discriminant::Success.code();
    }
    record(value)
}

/// Move this thread's last failure into `out`. Returns its discriminant,
/// or zero if nothing was recorded.
#[no_mangle]
pub extern "C" fn isthmus_last_error(out: *mut RawChannel) -> u8 {
    if out.is_null() {
        return null_out("error");
    }
    let value = take_last_error().unwrap_or_else(|| ErrorChannelValue::success(Vec::new()));
    let code = value.discriminant.code();
    unsafe { *out = value.into_raw() };
    code
}

/// Free a payload handed out by `isthmus_last_error`.
#[no_mangle]
pub extern "C" fn isthmus_error_free(err: *mut RawChannel) {
    if err.is_null() {
        return;
    }
    unsafe {
        let raw = std::ptr::replace(err, RawChannel::EMPTY);
        drop(raw.into_value());
    }
}
