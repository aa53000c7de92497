//! Byte views of `repr(C)` values for glue that moves them through lent
//! regions.

use std::mem::size_of;

use crate::channel::{raise_error, ChannelResult, Discriminant};

/// Copy the bytes of a plain value.
pub fn value_bytes<T: Copy>(value: &T) -> Vec<u8> {
    let ptr = (value as *const T).cast::<u8>();
    unsafe { std::slice::from_raw_parts(ptr, size_of::<T>()) }.to_vec()
}

/// Copy the bytes of a slice of plain values.
pub fn slice_bytes<T: Copy>(values: &[T]) -> Vec<u8> {
    let ptr = values.as_ptr().cast::<u8>();
    unsafe { std::slice::from_raw_parts(ptr, std::mem::size_of_val(values)) }.to_vec()
}

fn short(len: usize, want: usize) -> crate::channel::ErrorChannelValue {
    raise_error(
        Discriminant::Hazard,
        format!("bounds-violation: {len} bytes cannot hold {want}"),
    )
}

/// Read a value back out of region bytes.
///
/// # Safety
///
/// Every bit pattern the other side may write must be a valid `T`.
pub unsafe fn read_value<T: Copy>(bytes: &[u8]) -> ChannelResult<T> {
    if bytes.len() < size_of::<T>() {
        return Err(short(bytes.len(), size_of::<T>()));
    }
    Ok(std::ptr::read_unaligned(bytes.as_ptr().cast::<T>()))
}

/// Read whole elements back out of region bytes.
///
/// # Safety
///
/// As for [`read_value`].
pub unsafe fn read_slice<T: Copy>(bytes: &[u8]) -> ChannelResult<Vec<T>> {
    let stride = size_of::<T>();
    if stride == 0 {
        return Ok(Vec::new());
    }
    if bytes.len() % stride != 0 {
        return Err(short(bytes.len(), stride));
    }
    Ok(bytes
        .chunks_exact(stride)
        .map(|chunk| std::ptr::read_unaligned(chunk.as_ptr().cast::<T>()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Point {
        x: f64,
        y: f64,
    }

    #[test]
    fn values_through_bytes() {
        let p = Point { x: 1.5, y: -2.0 };
        let bytes = value_bytes(&p);
        assert_eq!(bytes.len(), 16);
        assert_eq!(unsafe { read_value::<Point>(&bytes) }.unwrap(), p);
        let err = unsafe { read_value::<Point>(&bytes[..8]) }.unwrap_err();
        assert!(err.message().starts_with("bounds-violation"));
    }

    #[test]
    fn slices_through_bytes() {
        let values = [1_i32, -2, 3];
        let bytes = slice_bytes(&values);
        assert_eq!(bytes.len(), 12);
        assert_eq!(unsafe { read_slice::<i32>(&bytes) }.unwrap(), values);
        assert!(unsafe { read_slice::<i32>(&bytes[..7]) }.is_err());
    }
}
