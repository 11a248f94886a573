// src/native/reference/mod.rs
#![allow(non_snake_case)]

//! # 레퍼런스 네이티브 라이브러리
//!
//! 외부 `LibTorchSharp`와 같은 시그니처의 진입점을 CPU(`ndarray` + `rayon`)로 구현합니다.
//! 호출 규약도 동일합니다: 실패하면 0 핸들을 반환하고 스레드 로컬 오류 메시지를 남깁니다.
//!
//! 테스트용 계측(`live_tensors`, `live_modules`, `invalid_releases`, `last_call`)은
//! 스레드 로컬이라 병렬 테스트끼리 간섭하지 않습니다.

mod kernels;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::CString;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use libc::{c_char, c_int, c_void};
use ndarray::{ArrayD, IxDyn};
use once_cell::sync::Lazy;

use super::{DEVICE_CPU, SCALAR_TYPE_FLOAT32};
use crate::handle::RawHandle;

#[derive(Debug, Clone, Copy)]
enum ModuleEntry {
    Hardshrink { lambda: f64 },
    Boxed { module: RawHandle },
}

/// 마지막 연산자 진입점에 실제로 전달된 인자.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub entry: &'static str,
    pub handles: Vec<RawHandle>,
    pub normalized_shape: Option<Vec<i64>>,
}

static NEXT_HANDLE: AtomicUsize = AtomicUsize::new(1);

static TENSORS: Lazy<Mutex<HashMap<RawHandle, ArrayD<f32>>>> = Lazy::new(|| Mutex::new(HashMap::new()));

static MODULES: Lazy<Mutex<HashMap<RawHandle, ModuleEntry>>> = Lazy::new(|| Mutex::new(HashMap::new()));

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
    static RETURNED_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
    static LAST_CALL: RefCell<Option<CallRecord>> = const { RefCell::new(None) };
    static LIVE_TENSORS: Cell<i64> = const { Cell::new(0) };
    static LIVE_MODULES: Cell<i64> = const { Cell::new(0) };
    static INVALID_RELEASES: Cell<i64> = const { Cell::new(0) };
}

/// 현재 스레드가 만들고 아직 해제하지 않은 텐서 수.
pub fn live_tensors() -> i64 {
    LIVE_TENSORS.with(Cell::get)
}

/// 현재 스레드가 만들고 아직 해제하지 않은 모듈(boxed 포함) 수.
pub fn live_modules() -> i64 {
    LIVE_MODULES.with(Cell::get)
}

/// 존재하지 않는 핸들에 대한 해제 시도 횟수 (이중 해제 감지용).
pub fn invalid_releases() -> i64 {
    INVALID_RELEASES.with(Cell::get)
}

pub fn last_call() -> Option<CallRecord> {
    LAST_CALL.with(|cell| cell.borrow().clone())
}

fn record_call(entry: &'static str, handles: &[RawHandle], normalized_shape: Option<&[i64]>) {
    let record = CallRecord {
        entry,
        handles: handles.to_vec(),
        normalized_shape: normalized_shape.map(<[i64]>::to_vec),
    };
    LAST_CALL.with(|cell| *cell.borrow_mut() = Some(record));
}

fn bump(counter: &'static std::thread::LocalKey<Cell<i64>>, delta: i64) {
    counter.with(|c| c.set(c.get() + delta));
}

fn set_error(message: impl Into<String>) {
    let msg = message.into();
    let cstr = CString::new(msg.replace('\0', " ")).unwrap_or_default();
    LAST_ERROR.with(|cell| {
        *cell.borrow_mut() = Some(cstr);
    });
}

fn clear_error() {
    LAST_ERROR.with(|cell| {
        *cell.borrow_mut() = None;
    });
}

fn ffi_guard<T, F>(default: T, f: F) -> T
where
    F: FnOnce() -> T,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(v) => v,
        Err(payload) => {
            let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                *s
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.as_str()
            } else {
                "panic across FFI boundary"
            };
            set_error(format!("panic: {}", msg));
            default
        }
    }
}

/// 핸들을 반환하는 진입점 공통 래퍼: `Err`는 오류 메시지 + 0 핸들로 바뀝니다.
fn ffi_entry<F>(f: F) -> RawHandle
where
    F: FnOnce() -> Result<RawHandle, String>,
{
    ffi_guard(RawHandle::NULL, || {
        clear_error();
        match f() {
            Ok(handle) => handle,
            Err(err) => {
                set_error(err);
                RawHandle::NULL
            }
        }
    })
}

fn next_handle() -> RawHandle {
    RawHandle::from_addr(NEXT_HANDLE.fetch_add(1, Ordering::SeqCst))
}

fn register_tensor(t: ArrayD<f32>) -> Result<RawHandle, String> {
    let mut guard = TENSORS.lock().map_err(|_| "tensor registry poisoned".to_string())?;
    let id = next_handle();
    guard.insert(id, t);
    bump(&LIVE_TENSORS, 1);
    Ok(id)
}

fn register_module(entry: ModuleEntry) -> Result<RawHandle, String> {
    let mut guard = MODULES.lock().map_err(|_| "module registry poisoned".to_string())?;
    let id = next_handle();
    guard.insert(id, entry);
    bump(&LIVE_MODULES, 1);
    Ok(id)
}

fn get_tensor(handle: RawHandle) -> Result<ArrayD<f32>, String> {
    if handle.is_null() {
        return Err("Null tensor handle".to_string());
    }
    let guard = TENSORS.lock().map_err(|_| "tensor registry poisoned".to_string())?;
    guard
        .get(&handle)
        .cloned()
        .ok_or_else(|| format!("Invalid tensor handle {:?}", handle))
}

fn get_optional_tensor(handle: RawHandle) -> Result<Option<ArrayD<f32>>, String> {
    if handle.is_null() {
        Ok(None)
    } else {
        get_tensor(handle).map(Some)
    }
}

/// 러닝 통계를 원래 버퍼에 그대로 덮어씁니다.
fn write_back(handle: RawHandle, value: &ArrayD<f32>) -> Result<(), String> {
    let mut guard = TENSORS.lock().map_err(|_| "tensor registry poisoned".to_string())?;
    let entry = guard
        .get_mut(&handle)
        .ok_or_else(|| format!("Invalid tensor handle {:?}", handle))?;
    entry.assign(value);
    Ok(())
}

fn get_module(handle: RawHandle) -> Result<ModuleEntry, String> {
    let guard = MODULES.lock().map_err(|_| "module registry poisoned".to_string())?;
    guard
        .get(&handle)
        .copied()
        .ok_or_else(|| format!("Invalid module handle {:?}", handle))
}

unsafe fn read_dims(ptr: *const i64, len: i64) -> Result<Vec<i64>, String> {
    if len < 0 {
        return Err(format!("negative dimension count {}", len));
    }
    if len == 0 {
        return Ok(Vec::new());
    }
    if ptr.is_null() {
        return Err("Null dimension pointer".to_string());
    }
    Ok(slice::from_raw_parts(ptr, len as usize).to_vec())
}

fn to_ixdyn(dims: &[i64]) -> Result<IxDyn, String> {
    if let Some(d) = dims.iter().find(|&&d| d < 0) {
        return Err(format!("negative dimension {} in shape {:?}", d, dims));
    }
    Ok(IxDyn(&dims.iter().map(|&d| d as usize).collect::<Vec<_>>()))
}

/// # Safety
/// 반환된 포인터는 다음 호출 전까지만 유효합니다.
pub unsafe extern "C" fn THSTorch_get_and_reset_last_err() -> *const c_char {
    let taken = LAST_ERROR.with(|cell| cell.borrow_mut().take());
    RETURNED_ERROR.with(|cell| {
        let mut slot = cell.borrow_mut();
        *slot = taken;
        slot.as_ref().map_or(ptr::null(), |msg| msg.as_ptr())
    })
}

/// # Safety
/// `sizes`는 `length`개의 i64를 읽을 수 있어야 합니다.
pub unsafe extern "C" fn THSTensor_zeros(
    sizes: *const i64,
    length: c_int,
    scalar_type: i8,
    device_type: c_int,
    device_index: c_int,
    _requires_grad: bool,
) -> RawHandle {
    ffi_entry(|| {
        if scalar_type != SCALAR_TYPE_FLOAT32 {
            return Err(format!("unsupported scalar type {}", scalar_type));
        }
        if device_type != DEVICE_CPU || device_index > 0 {
            return Err(format!("unsupported device {}:{}", device_type, device_index));
        }
        let dims = read_dims(sizes, length as i64)?;
        register_tensor(ArrayD::zeros(to_ixdyn(&dims)?))
    })
}

/// # Safety
/// 반환된 포인터는 텐서가 해제될 때까지 유효합니다.
pub unsafe extern "C" fn THSTensor_data(tensor: RawHandle) -> *mut c_void {
    ffi_guard(ptr::null_mut(), || {
        clear_error();
        let mut guard = match TENSORS.lock() {
            Ok(guard) => guard,
            Err(_) => {
                set_error("tensor registry poisoned");
                return ptr::null_mut();
            }
        };
        match guard.get_mut(&tensor) {
            Some(entry) => entry.as_mut_ptr() as *mut c_void,
            None => {
                set_error(format!("Invalid tensor handle {:?}", tensor));
                ptr::null_mut()
            }
        }
    })
}

/// # Safety
/// 핸들 이외의 인자는 없습니다.
pub unsafe extern "C" fn THSTensor_ndimension(tensor: RawHandle) -> i64 {
    ffi_guard(-1, || {
        clear_error();
        match TENSORS.lock() {
            Ok(guard) => match guard.get(&tensor) {
                Some(entry) => entry.ndim() as i64,
                None => {
                    set_error(format!("Invalid tensor handle {:?}", tensor));
                    -1
                }
            },
            Err(_) => {
                set_error("tensor registry poisoned");
                -1
            }
        }
    })
}

/// # Safety
/// 핸들 이외의 인자는 없습니다.
pub unsafe extern "C" fn THSTensor_size(tensor: RawHandle, dim: i64) -> i64 {
    ffi_guard(-1, || {
        clear_error();
        let guard = match TENSORS.lock() {
            Ok(guard) => guard,
            Err(_) => {
                set_error("tensor registry poisoned");
                return -1;
            }
        };
        let entry = match guard.get(&tensor) {
            Some(entry) => entry,
            None => {
                set_error(format!("Invalid tensor handle {:?}", tensor));
                return -1;
            }
        };
        let rank = entry.ndim() as i64;
        let axis = if dim < 0 { dim + rank } else { dim };
        if axis < 0 || axis >= rank {
            set_error(format!(
                "Dimension out of range (expected to be in range of [{}, {}], but got {})",
                -rank,
                rank - 1,
                dim
            ));
            return -1;
        }
        entry.shape()[axis as usize] as i64
    })
}

/// # Safety
/// 같은 핸들로 두 번 호출하면 안 됩니다 (두 번째 호출은 무시되고 계측 카운터만 증가).
pub unsafe extern "C" fn THSTensor_dispose(tensor: RawHandle) {
    ffi_guard((), || {
        let removed = TENSORS.lock().map(|mut guard| guard.remove(&tensor)).ok().flatten();
        match removed {
            Some(_) => bump(&LIVE_TENSORS, -1),
            None => bump(&INVALID_RELEASES, 1),
        }
    })
}

fn dispose_module(handle: RawHandle, boxed: bool) {
    let removed = MODULES.lock().ok().and_then(|mut guard| {
        let matches = matches!(
            (guard.get(&handle), boxed),
            (Some(ModuleEntry::Boxed { .. }), true) | (Some(ModuleEntry::Hardshrink { .. }), false)
        );
        if matches {
            guard.remove(&handle)
        } else {
            None
        }
    });
    match removed {
        Some(_) => bump(&LIVE_MODULES, -1),
        None => bump(&INVALID_RELEASES, 1),
    }
}

/// # Safety
/// 같은 핸들로 두 번 호출하면 안 됩니다.
pub unsafe extern "C" fn THSNN_Module_dispose(module: RawHandle) {
    ffi_guard((), || dispose_module(module, false))
}

/// # Safety
/// 같은 핸들로 두 번 호출하면 안 됩니다.
pub unsafe extern "C" fn THSNN_AnyModule_dispose(boxed: RawHandle) {
    ffi_guard((), || dispose_module(boxed, true))
}

/// # Safety
/// `boxed`가 null이 아니면 쓰기 가능한 포인터여야 합니다.
pub unsafe extern "C" fn THSNN_Hardshrink_ctor(lambd: f64, boxed: *mut RawHandle) -> RawHandle {
    ffi_entry(|| {
        record_call("THSNN_Hardshrink_ctor", &[], None);
        if lambd.is_nan() {
            return Err("Hardshrink: lambda must not be NaN".to_string());
        }
        let module = register_module(ModuleEntry::Hardshrink { lambda: lambd })?;
        let boxed_module = register_module(ModuleEntry::Boxed { module })?;
        if !boxed.is_null() {
            *boxed = boxed_module;
        }
        Ok(module)
    })
}

/// # Safety
/// 핸들 이외의 인자는 없습니다.
pub unsafe extern "C" fn THSNN_Hardshrink_forward(module: RawHandle, tensor: RawHandle) -> RawHandle {
    ffi_entry(|| {
        record_call("THSNN_Hardshrink_forward", &[module, tensor], None);
        let lambda = match get_module(module)? {
            ModuleEntry::Hardshrink { lambda } => lambda,
            ModuleEntry::Boxed { .. } => return Err("module handle is not a Hardshrink module".to_string()),
        };
        let x = get_tensor(tensor)?;
        register_tensor(kernels::hardshrink(&x, lambda))
    })
}

/// # Safety
/// 핸들 이외의 인자는 스칼라입니다.
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn THSNN_batch_norm(
    input: RawHandle,
    running_mean: RawHandle,
    running_var: RawHandle,
    weight: RawHandle,
    bias: RawHandle,
    training: bool,
    momentum: f64,
    eps: f64,
) -> RawHandle {
    ffi_entry(|| {
        record_call(
            "THSNN_batch_norm",
            &[input, running_mean, running_var, weight, bias],
            None,
        );
        let x = get_tensor(input)?;
        let mut rm = get_optional_tensor(running_mean)?;
        let mut rv = get_optional_tensor(running_var)?;
        let w = get_optional_tensor(weight)?;
        let b = get_optional_tensor(bias)?;
        let y = kernels::batch_norm(
            &x,
            rm.as_mut(),
            rv.as_mut(),
            w.as_ref(),
            b.as_ref(),
            training,
            momentum,
            eps,
        )?;
        if training {
            if let Some(rm) = &rm {
                write_back(running_mean, rm)?;
            }
            if let Some(rv) = &rv {
                write_back(running_var, rv)?;
            }
        }
        register_tensor(y)
    })
}

/// # Safety
/// 핸들 이외의 인자는 스칼라입니다.
pub unsafe extern "C" fn THSNN_group_norm(
    input: RawHandle,
    num_groups: i64,
    weight: RawHandle,
    bias: RawHandle,
    eps: f64,
) -> RawHandle {
    ffi_entry(|| {
        record_call("THSNN_group_norm", &[input, weight, bias], None);
        let x = get_tensor(input)?;
        let w = get_optional_tensor(weight)?;
        let b = get_optional_tensor(bias)?;
        register_tensor(kernels::group_norm(&x, num_groups, w.as_ref(), b.as_ref(), eps)?)
    })
}

/// # Safety
/// 핸들 이외의 인자는 스칼라입니다.
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn THSNN_instance_norm(
    input: RawHandle,
    running_mean: RawHandle,
    running_var: RawHandle,
    weight: RawHandle,
    bias: RawHandle,
    use_input_stats: bool,
    momentum: f64,
    eps: f64,
) -> RawHandle {
    ffi_entry(|| {
        record_call(
            "THSNN_instance_norm",
            &[input, running_mean, running_var, weight, bias],
            None,
        );
        let x = get_tensor(input)?;
        let mut rm = get_optional_tensor(running_mean)?;
        let mut rv = get_optional_tensor(running_var)?;
        let w = get_optional_tensor(weight)?;
        let b = get_optional_tensor(bias)?;
        let y = kernels::instance_norm(
            &x,
            rm.as_mut(),
            rv.as_mut(),
            w.as_ref(),
            b.as_ref(),
            use_input_stats,
            momentum,
            eps,
        )?;
        if use_input_stats {
            if let Some(rm) = &rm {
                write_back(running_mean, rm)?;
            }
            if let Some(rv) = &rv {
                write_back(running_var, rv)?;
            }
        }
        register_tensor(y)
    })
}

/// # Safety
/// `normalized_shape`는 `normalized_shape_len`개의 i64를 읽을 수 있어야 합니다.
pub unsafe extern "C" fn THSNN_layer_norm(
    input: RawHandle,
    normalized_shape: *const i64,
    normalized_shape_len: i64,
    weight: RawHandle,
    bias: RawHandle,
    eps: f64,
) -> RawHandle {
    ffi_entry(|| {
        let shape = read_dims(normalized_shape, normalized_shape_len)?;
        record_call("THSNN_layer_norm", &[input, weight, bias], Some(shape.as_slice()));
        let x = get_tensor(input)?;
        let w = get_optional_tensor(weight)?;
        let b = get_optional_tensor(bias)?;
        register_tensor(kernels::layer_norm(&x, &shape, w.as_ref(), b.as_ref(), eps)?)
    })
}

/// # Safety
/// 핸들 이외의 인자는 스칼라입니다.
pub unsafe extern "C" fn THSNN_local_response_norm(
    input: RawHandle,
    size: i64,
    alpha: f64,
    beta: f64,
    k: f64,
) -> RawHandle {
    ffi_entry(|| {
        record_call("THSNN_local_response_norm", &[input], None);
        let x = get_tensor(input)?;
        register_tensor(kernels::local_response_norm(&x, size, alpha, beta, k)?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    fn take_error() -> Option<String> {
        let ptr = unsafe { THSTorch_get_and_reset_last_err() };
        if ptr.is_null() {
            None
        } else {
            Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
        }
    }

    #[test]
    fn test_zeros_registers_and_dispose_releases() {
        let before = live_tensors();
        let dims = [2i64, 3];
        let h = unsafe { THSTensor_zeros(dims.as_ptr(), 2, SCALAR_TYPE_FLOAT32, DEVICE_CPU, -1, false) };
        assert!(!h.is_null());
        assert_eq!(live_tensors(), before + 1);
        assert_eq!(unsafe { THSTensor_ndimension(h) }, 2);
        assert_eq!(unsafe { THSTensor_size(h, -1) }, 3);
        unsafe { THSTensor_dispose(h) };
        assert_eq!(live_tensors(), before);
    }

    #[test]
    fn test_error_is_read_once() {
        let h = unsafe { THSNN_local_response_norm(RawHandle::from_addr(usize::MAX), 2, 1e-4, 0.75, 1.0) };
        assert!(h.is_null());
        let msg = take_error().expect("pending error");
        assert!(msg.contains("Invalid tensor handle"));
        assert_eq!(take_error(), None);
    }

    #[test]
    fn test_unsupported_scalar_type_fails() {
        let dims = [1i64];
        let h = unsafe { THSTensor_zeros(dims.as_ptr(), 1, 3, DEVICE_CPU, -1, false) };
        assert!(h.is_null());
        assert!(take_error().unwrap().contains("scalar type"));
    }

    #[test]
    fn test_double_dispose_is_counted() {
        let before = invalid_releases();
        let dims = [1i64];
        let h = unsafe { THSTensor_zeros(dims.as_ptr(), 1, SCALAR_TYPE_FLOAT32, DEVICE_CPU, -1, false) };
        unsafe {
            THSTensor_dispose(h);
            THSTensor_dispose(h);
        }
        assert_eq!(invalid_releases(), before + 1);
    }

    #[test]
    fn test_hardshrink_ctor_writes_boxed_handle() {
        let before = live_modules();
        let mut boxed = RawHandle::NULL;
        let module = unsafe { THSNN_Hardshrink_ctor(0.5, &mut boxed) };
        assert!(!module.is_null());
        assert!(!boxed.is_null());
        assert_ne!(module, boxed);
        assert_eq!(live_modules(), before + 2);
        // boxed 핸들은 Hardshrink로 forward 할 수 없음
        let dims = [1i64];
        let t = unsafe { THSTensor_zeros(dims.as_ptr(), 1, SCALAR_TYPE_FLOAT32, DEVICE_CPU, -1, false) };
        assert!(unsafe { THSNN_Hardshrink_forward(boxed, t) }.is_null());
        assert!(take_error().is_some());
        unsafe {
            THSTensor_dispose(t);
            THSNN_AnyModule_dispose(boxed);
            THSNN_Module_dispose(module);
        }
        assert_eq!(live_modules(), before);
    }
}
