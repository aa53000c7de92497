//! Runtime Support Library for isthmus glue.
//!
//! Pure infrastructure shared by every generated artifact. No call-specific
//! logic lives here.
//!
//! - [`table`]: opaque handle table behind one table-wide lock
//! - [`scope`]: RAII scopes releasing borrows and shares on every exit path
//! - [`channel`]: the wire-level error channel and panic translation
//! - [`ffi`]: C entry points over the process-wide table
//! - [`marshal`]: byte views of `repr(C)` values
//! - [`error`]: runtime hazards

pub mod channel;
pub mod error;
pub mod ffi;
pub mod handle;
pub mod marshal;
pub mod scope;
pub mod table;

pub use channel::{
    catch_boundary, deliver, from_error_code, raise_error, settle, ChannelResult, Discriminant,
    ErrorChannelValue, RawChannel,
};
pub use error::{Result, RuntimeError};
pub use ffi::{global_table, take_last_error};
pub use handle::{Handle, TypeTag};
pub use marshal::{read_slice, read_value, slice_bytes, value_bytes};
pub use scope::{BorrowScope, ShareScope};
pub use table::{BorrowToken, HandleTable, ShareOutcome, Storage};
