// src/handle.rs

//! # 네이티브 핸들
//!
//! 네이티브 라이브러리 쪽 리소스(텐서, 모듈)를 가리키는 주소 크기의 불투명 식별자.
//! 0 값은 절대로 유효한 리소스가 아니며 실패 sentinel로 사용됩니다.

use std::fmt;

/// 네이티브 리소스에 대한 소유권 없는 참조. C의 포인터, .NET의 `IntPtr`과 ABI가 같습니다.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RawHandle(usize);

impl RawHandle {
    pub const NULL: RawHandle = RawHandle(0);

    pub const fn from_addr(addr: usize) -> Self {
        RawHandle(addr)
    }

    pub const fn addr(self) -> usize {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "RawHandle(NULL)")
        } else {
            write!(f, "RawHandle({:#x})", self.0)
        }
    }
}

/// 선택 인자를 네이티브 호출 경계에서만 sentinel로 바꿉니다.
pub(crate) fn raw_or_null<T: AsRawHandle>(value: Option<&T>) -> RawHandle {
    value.map_or(RawHandle::NULL, AsRawHandle::as_raw)
}

pub trait AsRawHandle {
    fn as_raw(&self) -> RawHandle;
}

impl AsRawHandle for RawHandle {
    fn as_raw(&self) -> RawHandle {
        *self
    }
}
