//! The wire-level error channel.
//!
//! Every fallible glue function returns one discriminated value whatever the
//! native failure signaling was: a returned failure, a panic unwinding out
//! of the callee, a C error code, or a runtime hazard.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::warn;

use crate::error::RuntimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Discriminant {
    Success,
    /// The callee reported a typed failure.
    Failure,
    Panic,
    /// A nonzero native error code.
    ErrorCode,
    /// A runtime hazard caught by the support library.
    Hazard,
}

impl Discriminant {
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Panic => 2,
            Self::ErrorCode => 3,
            Self::Hazard => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::Failure),
            2 => Some(Self::Panic),
            3 => Some(Self::ErrorCode),
            4 => Some(Self::Hazard),
            _ => None,
        }
    }
}

impl fmt::Display for Discriminant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Panic => "panic",
            Self::ErrorCode => "error-code",
            Self::Hazard => "hazard",
        };
        f.write_str(name)
    }
}

/// A discriminant plus an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorChannelValue {
    pub discriminant: Discriminant,
    pub payload: Vec<u8>,
}

pub type ChannelResult<T> = std::result::Result<T, ErrorChannelValue>;

impl ErrorChannelValue {
    pub fn success(payload: impl Into<Vec<u8>>) -> Self {
        raise_error(Discriminant::Success, payload)
    }

    pub fn failure(payload: impl Into<Vec<u8>>) -> Self {
        raise_error(Discriminant::Failure, payload)
    }

    pub fn is_success(&self) -> bool {
        self.discriminant == Discriminant::Success
    }

    /// The payload read as text.
    pub fn message(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// The native code for an `ErrorCode` value.
    pub fn error_code(&self) -> Option<i32> {
        if self.discriminant != Discriminant::ErrorCode {
            return None;
        }
        let bytes: [u8; 4] = self.payload.as_slice().try_into().ok()?;
        Some(i32::from_le_bytes(bytes))
    }

    /// Split into the success payload or the failure.
    pub fn into_result(self) -> ChannelResult<Vec<u8>> {
        if self.is_success() {
            Ok(self.payload)
        } else {
            Err(self)
        }
    }

    /// Wire form: discriminant byte, little-endian u32 length, payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5 + self.payload.len());
        out.push(self.discriminant.code());
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let (&code, rest) = bytes.split_first()?;
        let discriminant = Discriminant::from_code(code)?;
        let len: [u8; 4] = rest.get(..4)?.try_into().ok()?;
        let len = u32::from_le_bytes(len) as usize;
        let payload = rest.get(4..)?;
        if payload.len() != len {
            return None;
        }
        Some(Self {
            discriminant,
            payload: payload.to_vec(),
        })
    }
}

impl fmt::Display for ErrorChannelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.error_code() {
            Some(code) => write!(f, "{}: {code}", self.discriminant),
            None => write!(f, "{}: {}", self.discriminant, self.message()),
        }
    }
}

/// C layout of a channel value crossing the ABI. The payload is owned by
/// the runtime until reclaimed with [`RawChannel::into_value`].
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawChannel {
    pub discriminant: u8,
    pub payload: *mut u8,
    pub payload_len: usize,
}

impl RawChannel {
    pub const EMPTY: RawChannel = RawChannel {
        discriminant: 0,
        payload: std::ptr::null_mut(),
        payload_len: 0,
    };

    /// Reclaim the value.
    ///
    /// # Safety
    ///
    /// `self` must come from [`ErrorChannelValue::into_raw`] and must not
    /// have been reclaimed before.
    pub unsafe fn into_value(self) -> Option<ErrorChannelValue> {
        let discriminant = Discriminant::from_code(self.discriminant)?;
        let payload = if self.payload.is_null() {
            Vec::new()
        } else {
            let slice = std::ptr::slice_from_raw_parts_mut(self.payload, self.payload_len);
            Box::from_raw(slice).into_vec()
        };
        Some(ErrorChannelValue {
            discriminant,
            payload,
        })
    }
}

impl ErrorChannelValue {
    /// Hand the value to C. The payload must come back through
    /// [`RawChannel::into_value`] to be freed.
    pub fn into_raw(self) -> RawChannel {
        let payload_len = self.payload.len();
        let payload = if payload_len == 0 {
            std::ptr::null_mut()
        } else {
            Box::into_raw(self.payload.into_boxed_slice()) as *mut u8
        };
        RawChannel {
            discriminant: self.discriminant.code(),
            payload,
            payload_len,
        }
    }
}

impl From<RuntimeError> for ErrorChannelValue {
    fn from(err: RuntimeError) -> Self {
        raise_error(Discriminant::Hazard, format!("{}: {err}", err.code()))
    }
}

pub fn raise_error(discriminant: Discriminant, payload: impl Into<Vec<u8>>) -> ErrorChannelValue {
    ErrorChannelValue {
        discriminant,
        payload: payload.into(),
    }
}

/// Translate a C-style status code; zero is success.
pub fn from_error_code(code: i32) -> ErrorChannelValue {
    if code == 0 {
        ErrorChannelValue::success(Vec::new())
    } else {
        raise_error(Discriminant::ErrorCode, code.to_le_bytes().to_vec())
    }
}

/// Turn a glue status and its error slot back into a result.
///
/// # Safety
///
/// `err` must have been filled, if at all, by glue through
/// [`ErrorChannelValue::into_raw`].
pub unsafe fn settle(status: u8, err: RawChannel) -> ChannelResult<()> {
    let recorded = err.into_value().filter(|v| !v.is_success());
    if status == Discriminant::Success.code() {
        return Ok(());
    }
    Err(recorded.unwrap_or_else(|| {
        let discriminant = Discriminant::from_code(status).unwrap_or(Discriminant::Hazard);
        raise_error(discriminant, format!("glue returned status {status} without a payload"))
    }))
}

/// Hand a failure to a C caller and return its discriminant code.
///
/// # Safety
///
/// `err` must be null or valid for a write of one [`RawChannel`].
pub unsafe fn deliver(value: ErrorChannelValue, err: *mut RawChannel) -> u8 {
    let code = value.discriminant.code();
    if !err.is_null() {
        err.write(value.into_raw());
    }
    code
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run a callee at the boundary. A panic unwinding out of `f` becomes a
/// `Panic` channel value instead of crossing into the other side.
pub fn catch_boundary<T>(f: impl FnOnce() -> ChannelResult<T>) -> ChannelResult<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(message = %message, "panic caught at boundary");
            Err(raise_error(Discriminant::Panic, message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::Handle;

    #[test]
    fn panic_becomes_channel_value() {
        let result: ChannelResult<i32> = catch_boundary(|| panic!("divide by zero"));
        let err = result.unwrap_err();
        assert_eq!(err.discriminant, Discriminant::Panic);
        assert_eq!(err.message(), "divide by zero");

        let formatted: ChannelResult<()> = catch_boundary(|| panic!("bad index {}", 7));
        assert_eq!(formatted.unwrap_err().message(), "bad index 7");
    }

    #[test]
    fn success_and_typed_failure_pass_through() {
        assert_eq!(catch_boundary(|| Ok(5)).unwrap(), 5);
        let err = catch_boundary::<()>(|| Err(ErrorChannelValue::failure("parse error")))
            .unwrap_err();
        assert_eq!(err.discriminant, Discriminant::Failure);
        assert_eq!(err.to_string(), "failure: parse error");
    }

    #[test]
    fn error_codes() {
        assert!(from_error_code(0).is_success());
        let err = from_error_code(-22);
        assert_eq!(err.discriminant, Discriminant::ErrorCode);
        assert_eq!(err.error_code(), Some(-22));
        assert_eq!(err.to_string(), "error-code: -22");
        assert!(err.into_result().is_err());
    }

    #[test]
    fn hazards_map_to_hazard() {
        let value: ErrorChannelValue = RuntimeError::StaleHandle {
            handle: Handle::from_raw(3),
        }
        .into();
        assert_eq!(value.discriminant, Discriminant::Hazard);
        assert!(value.message().starts_with("stale-handle: "));
    }

    #[test]
    fn raw_form_reclaims_payload() {
        let raw = ErrorChannelValue::failure("disk full").into_raw();
        assert_eq!(raw.discriminant, 1);
        assert_eq!(raw.payload_len, 9);
        let back = unsafe { raw.into_value() }.unwrap();
        assert_eq!(back.message(), "disk full");

        let empty = ErrorChannelValue::success(Vec::new()).into_raw();
        assert!(empty.payload.is_null());
        assert!(unsafe { empty.into_value() }.unwrap().is_success());
    }

    #[test]
    fn settle_and_deliver() {
        assert!(unsafe { settle(0, RawChannel::EMPTY) }.is_ok());

        let mut slot = RawChannel::EMPTY;
        let code = unsafe { deliver(ErrorChannelValue::failure("no route"), &mut slot) };
        assert_eq!(code, 1);
        let err = unsafe { settle(code, slot) }.unwrap_err();
        assert_eq!(err.to_string(), "failure: no route");

        let bare = unsafe { settle(3, RawChannel::EMPTY) }.unwrap_err();
        assert_eq!(bare.discriminant, Discriminant::ErrorCode);
        assert_eq!(unsafe { deliver(bare, std::ptr::null_mut()) }, 3);
    }

    #[test]
    fn wire_form() {
        let value = raise_error(Discriminant::Failure, b"oops".to_vec());
        let bytes = value.encode();
        assert_eq!(bytes[0], 1);
        assert_eq!(ErrorChannelValue::decode(&bytes), Some(value));
        assert_eq!(ErrorChannelValue::decode(&bytes[..3]), None);
        assert_eq!(ErrorChannelValue::decode(&[9, 0, 0, 0, 0]), None);
        for code in 0..=4 {
            let d = Discriminant::from_code(code).unwrap();
            assert_eq!(d.code(), code);
        }
    }
}
