//! Typed payload elements.
//!
//! Numeric payloads are sequences of little-endian elements whose width is
//! given by the frame's [`DataType`].

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};

use crate::codec::{Packet, MAX_PAYLOAD};
use crate::error::{FrameError, Result};
use crate::types::DataType;

mod sealed {
    pub trait Sealed {}
}

/// A Rust scalar that maps onto a frame data type.
pub trait Element: sealed::Sealed + Copy {
    const DATA_TYPE: DataType;

    fn put(self, dst: &mut BytesMut);

    fn get(src: &mut &[u8]) -> Self;
}

macro_rules! element {
    ($ty:ty, $data_type:ident, $put:ident, $get:ident) => {
        impl sealed::Sealed for $ty {}

        impl Element for $ty {
            const DATA_TYPE: DataType = DataType::$data_type;

            fn put(self, dst: &mut BytesMut) {
                dst.$put(self);
            }

            fn get(src: &mut &[u8]) -> Self {
                src.$get()
            }
        }
    };
}

element!(u8, U8, put_u8, get_u8);
element!(u16, U16, put_u16_le, get_u16_le);
element!(u32, U32, put_u32_le, get_u32_le);
element!(u64, U64, put_u64_le, get_u64_le);
element!(i8, I8, put_i8, get_i8);
element!(i16, I16, put_i16_le, get_i16_le);
element!(i32, I32, put_i32_le, get_i32_le);
element!(i64, I64, put_i64_le, get_i64_le);
element!(f32, F32, put_f32_le, get_f32_le);
element!(f64, F64, put_f64_le, get_f64_le);

/// One decoded payload element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    /// Half-precision value, kept as its raw bits.
    F16(u16),
    F32(f32),
    F64(f64),
    /// One byte of a raw command channel payload.
    Raw(u8),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::U8(_) => DataType::U8,
            Value::U16(_) => DataType::U16,
            Value::U32(_) => DataType::U32,
            Value::U64(_) => DataType::U64,
            Value::I8(_) => DataType::I8,
            Value::I16(_) => DataType::I16,
            Value::I32(_) => DataType::I32,
            Value::I64(_) => DataType::I64,
            Value::F16(_) => DataType::F16,
            Value::F32(_) => DataType::F32,
            Value::F64(_) => DataType::F64,
            Value::Raw(_) => DataType::R0,
        }
    }

    /// Lossy conversion for plotting or JSON output. `None` for F16 and raw bytes.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::U8(v) => Some(f64::from(v)),
            Value::U16(v) => Some(f64::from(v)),
            Value::U32(v) => Some(f64::from(v)),
            Value::U64(v) => Some(v as f64),
            Value::I8(v) => Some(f64::from(v)),
            Value::I16(v) => Some(f64::from(v)),
            Value::I32(v) => Some(f64::from(v)),
            Value::I64(v) => Some(v as f64),
            Value::F32(v) => Some(f64::from(v)),
            Value::F64(v) => Some(v),
            Value::F16(_) | Value::Raw(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.data_type().display_width();
        match self {
            Value::U8(v) => write!(f, "{v:>width$}"),
            Value::U16(v) => write!(f, "{v:>width$}"),
            Value::U32(v) => write!(f, "{v:>width$}"),
            Value::U64(v) => write!(f, "{v:>width$}"),
            Value::I8(v) => write!(f, "{v:>width$}"),
            Value::I16(v) => write!(f, "{v:>width$}"),
            Value::I32(v) => write!(f, "{v:>width$}"),
            Value::I64(v) => write!(f, "{v:>width$}"),
            Value::F16(bits) => write!(f, "0x{bits:04X}"),
            Value::F32(v) => write!(f, "{v:.6}"),
            Value::F64(v) => write!(f, "{v:.6}"),
            Value::Raw(b) => write!(f, "{b:02X}"),
        }
    }
}

impl Packet {
    /// Build a packet from typed elements.
    pub fn from_elements<T: Element>(param: [u8; 2], elements: &[T]) -> Result<Self> {
        let size = elements.len() * T::DATA_TYPE.width();
        if size > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge {
                size,
                max: MAX_PAYLOAD,
            });
        }
        let mut buf = BytesMut::with_capacity(size);
        for &element in elements {
            element.put(&mut buf);
        }
        Ok(Packet::new(param, T::DATA_TYPE, buf.freeze()))
    }

    /// Interpret the payload as elements of `T`.
    ///
    /// Fails if the packet's data type is not `T`'s or the payload is not a
    /// whole number of elements.
    pub fn elements<T: Element>(&self) -> Result<Vec<T>> {
        if self.data_type != T::DATA_TYPE {
            return Err(FrameError::TypeMismatch {
                expected: T::DATA_TYPE,
                found: self.data_type,
            });
        }
        let width = T::DATA_TYPE.width();
        self.check_aligned(width)?;

        let mut src: &[u8] = &self.payload;
        let mut out = Vec::with_capacity(self.payload.len() / width);
        while !src.is_empty() {
            out.push(T::get(&mut src));
        }
        Ok(out)
    }

    /// Decode the payload according to the packet's data type.
    pub fn values(&self) -> Result<Vec<Value>> {
        let width = self.data_type.width();
        if width == 0 {
            return Ok(self.payload.iter().copied().map(Value::Raw).collect());
        }
        self.check_aligned(width)?;

        let mut src: &[u8] = &self.payload;
        let mut out = Vec::with_capacity(self.payload.len() / width);
        while !src.is_empty() {
            let value = match self.data_type {
                DataType::U8 => Value::U8(src.get_u8()),
                DataType::U16 => Value::U16(src.get_u16_le()),
                DataType::U32 => Value::U32(src.get_u32_le()),
                DataType::U64 => Value::U64(src.get_u64_le()),
                DataType::I8 => Value::I8(src.get_i8()),
                DataType::I16 => Value::I16(src.get_i16_le()),
                DataType::I32 => Value::I32(src.get_i32_le()),
                DataType::I64 => Value::I64(src.get_i64_le()),
                DataType::F16 => Value::F16(src.get_u16_le()),
                DataType::F32 => Value::F32(src.get_f32_le()),
                DataType::F64 => Value::F64(src.get_f64_le()),
                DataType::R0 | DataType::R1 | DataType::R2 | DataType::R3 | DataType::R4 => {
                    Value::Raw(src.get_u8())
                }
            };
            out.push(value);
        }
        Ok(out)
    }

    fn check_aligned(&self, width: usize) -> Result<()> {
        if self.payload.len() % width != 0 {
            return Err(FrameError::UnalignedPayload {
                bytes: self.payload.len(),
                width,
            });
        }
        Ok(())
    }
}
