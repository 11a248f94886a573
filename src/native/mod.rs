// src/native/mod.rs

//! # 네이티브 호출 경계
//!
//! `sys`는 빌드 시점에 고정된 진입점 집합입니다.
//! - `libtorch` 기능: 외부 `LibTorchSharp` 라이브러리 (`ffi`)
//! - 기본값: 같은 시그니처의 레퍼런스 구현 (`reference`)
//!
//! 모든 핸들 반환 호출 뒤에는 [`check`]가, 그 외 호출 뒤에는 [`check_pending`]이 옵니다.

#[cfg(feature = "libtorch")]
mod ffi;

#[cfg(not(feature = "libtorch"))]
pub mod reference;

pub(crate) mod sys {
    #[cfg(feature = "libtorch")]
    pub use super::ffi::*;

    #[cfg(not(feature = "libtorch"))]
    pub use super::reference::{
        THSNN_AnyModule_dispose, THSNN_Hardshrink_ctor, THSNN_Hardshrink_forward, THSNN_Module_dispose,
        THSNN_batch_norm, THSNN_group_norm, THSNN_instance_norm, THSNN_layer_norm,
        THSNN_local_response_norm, THSTensor_data, THSTensor_dispose, THSTensor_ndimension,
        THSTensor_size, THSTensor_zeros, THSTorch_get_and_reset_last_err,
    };
}

use std::ffi::CStr;

use crate::error::NativeOperationError;
use crate::handle::RawHandle;

pub(crate) const SCALAR_TYPE_FLOAT32: i8 = 6;
pub(crate) const DEVICE_CPU: libc::c_int = 0;

/// 네이티브 쪽 보류 오류를 읽고 비웁니다.
pub(crate) fn take_pending_error() -> Option<String> {
    let ptr = unsafe { sys::THSTorch_get_and_reset_last_err() };
    if ptr.is_null() {
        return None;
    }
    // 포인터는 다음 네이티브 호출 전까지만 유효하므로 즉시 복사
    let message = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
    Some(message)
}

/// 오류 sentinel 검사: 0 핸들이면 보류 오류(없으면 "unknown native failure")로 실패합니다.
pub(crate) fn check(raw: RawHandle) -> Result<RawHandle, NativeOperationError> {
    if !raw.is_null() {
        return Ok(raw);
    }
    Err(take_pending_error()
        .map(NativeOperationError::new)
        .unwrap_or_else(NativeOperationError::unknown))
}

/// 핸들을 반환하지 않는 호출(형상 조회 등) 뒤의 보류 오류 확인.
pub(crate) fn check_pending() -> Result<(), NativeOperationError> {
    match take_pending_error() {
        Some(message) => Err(NativeOperationError::new(message)),
        None => Ok(()),
    }
}
