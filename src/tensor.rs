// src/tensor.rs

//! # 관리 텐서
//!
//! 네이티브 텐서 핸들을 소유하는 래퍼. `Drop`에서 `THSTensor_dispose`를 정확히 한 번 호출합니다.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ptr;

use ndarray::{ArrayBase, ArrayD, Data, Dimension, IxDyn};
use tracing::trace;

use crate::error::{Error, NativeOperationError, Result};
use crate::handle::{AsRawHandle, RawHandle};
use crate::native::{self, sys, DEVICE_CPU, SCALAR_TYPE_FLOAT32};

/// 형상의 원소 수. 음수 차원이나 `usize` 오버플로는 `InvalidShape`입니다.
fn volume(shape: &[i64]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |acc, &d| usize::try_from(d).ok().and_then(|d| acc.checked_mul(d)))
        .ok_or_else(|| Error::InvalidShape(shape.to_vec()))
}

pub struct Tensor {
    handle: RawHandle,
    // Send 이지만 Sync 아님: 동시 사용은 외부에서 동기화해야 함
    _not_sync: PhantomData<Cell<()>>,
}

impl Tensor {
    /// 검사를 통과한 핸들만 감쌉니다.
    ///
    /// # Safety
    /// `handle`은 0이 아니고, 살아 있는 네이티브 텐서이며, 다른 곳에서 해제되지 않아야 합니다.
    pub unsafe fn from_raw(handle: RawHandle) -> Self {
        Tensor {
            handle,
            _not_sync: PhantomData,
        }
    }

    /// 소유권을 포기하고 핸들을 돌려줍니다. 해제 책임은 호출자에게 넘어갑니다.
    pub fn into_raw(self) -> RawHandle {
        ManuallyDrop::new(self).handle
    }

    pub fn handle(&self) -> RawHandle {
        self.handle
    }

    pub fn zeros(shape: &[i64]) -> Result<Self> {
        volume(shape)?;
        let raw = unsafe {
            sys::THSTensor_zeros(
                shape.as_ptr(),
                shape.len() as libc::c_int,
                SCALAR_TYPE_FLOAT32,
                DEVICE_CPU,
                -1,
                false,
            )
        };
        let handle = native::check(raw)?;
        trace!(?handle, ?shape, "allocated tensor");
        Ok(unsafe { Tensor::from_raw(handle) })
    }

    pub fn from_slice(data: &[f32], shape: &[i64]) -> Result<Self> {
        let expected = volume(shape)?;
        if data.len() != expected {
            return Err(Error::DataLength {
                expected,
                actual: data.len(),
            });
        }
        let tensor = Tensor::zeros(shape)?;
        if !data.is_empty() {
            let dst = tensor.data_ptr()?;
            unsafe { ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len()) };
        }
        Ok(tensor)
    }

    pub fn from_array<S, D>(array: &ArrayBase<S, D>) -> Result<Self>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        let shape: Vec<i64> = array.shape().iter().map(|&d| d as i64).collect();
        match array.as_slice() {
            Some(data) => Tensor::from_slice(data, &shape),
            None => Tensor::from_slice(&array.iter().copied().collect::<Vec<_>>(), &shape),
        }
    }

    pub fn shape(&self) -> Result<Vec<i64>> {
        let rank = unsafe { sys::THSTensor_ndimension(self.handle) };
        native::check_pending()?;
        (0..rank)
            .map(|dim| {
                let size = unsafe { sys::THSTensor_size(self.handle, dim) };
                native::check_pending()?;
                Ok(size)
            })
            .collect()
    }

    pub fn numel(&self) -> Result<usize> {
        volume(&self.shape()?)
    }

    pub fn to_vec(&self) -> Result<Vec<f32>> {
        let len = self.numel()?;
        if len == 0 {
            return Ok(Vec::new());
        }
        let src = self.data_ptr()?;
        let mut out = vec![0.0f32; len];
        unsafe { ptr::copy_nonoverlapping(src as *const f32, out.as_mut_ptr(), len) };
        Ok(out)
    }

    pub fn to_array(&self) -> Result<ArrayD<f32>> {
        let dims = self.shape()?;
        let shape: Vec<usize> = dims.iter().map(|&d| d as usize).collect();
        let data = self.to_vec()?;
        ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(|_| Error::InvalidShape(dims))
    }

    fn data_ptr(&self) -> Result<*mut f32> {
        let ptr = unsafe { sys::THSTensor_data(self.handle) };
        if ptr.is_null() {
            native::check_pending()?;
            return Err(NativeOperationError::unknown().into());
        }
        Ok(ptr as *mut f32)
    }
}

impl AsRawHandle for Tensor {
    fn as_raw(&self) -> RawHandle {
        self.handle
    }
}

impl Drop for Tensor {
    fn drop(&mut self) {
        unsafe { sys::THSTensor_dispose(self.handle) };
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_struct("Tensor");
        dbg.field("handle", &self.handle);
        if let Ok(shape) = self.shape() {
            dbg.field("shape", &shape);
        }
        dbg.finish()
    }
}

#[cfg(all(test, not(feature = "libtorch")))]
mod tests {
    use super::*;
    use crate::native::reference;
    use ndarray::{arr2, Array3};

    #[test]
    fn test_from_array_round_trips_shape_and_data() {
        let a = arr2(&[[1.0f32, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let t = Tensor::from_array(&a).unwrap();
        assert_eq!(t.shape().unwrap(), vec![2, 3]);
        assert_eq!(t.to_array().unwrap(), a.into_dyn());
    }

    #[test]
    fn test_non_standard_layout_is_copied_in_logical_order() {
        let a = arr2(&[[1.0f32, 2.0], [3.0, 4.0]]);
        let t = Tensor::from_array(&a.t()).unwrap();
        assert_eq!(t.to_vec().unwrap(), vec![1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_data_length_mismatch_is_rejected_before_native_call() {
        let before = reference::live_tensors();
        let err = Tensor::from_slice(&[1.0, 2.0, 3.0], &[2, 2]).unwrap_err();
        assert!(matches!(err, Error::DataLength { expected: 4, actual: 3 }));
        assert_eq!(reference::live_tensors(), before);
    }

    #[test]
    fn test_negative_dimension_is_invalid_shape() {
        assert!(matches!(Tensor::zeros(&[2, -1]), Err(Error::InvalidShape(_))));
    }

    #[test]
    fn test_overflowing_volume_is_invalid_shape() {
        let before = reference::live_tensors();
        let huge = [1i64 << 32, 1i64 << 32];
        assert!(matches!(
            Tensor::from_slice(&[], &huge),
            Err(Error::InvalidShape(dims)) if dims == huge
        ));
        assert!(matches!(Tensor::zeros(&huge), Err(Error::InvalidShape(_))));
        assert_eq!(volume(&[i64::MAX, 3]).ok(), None);
        assert_eq!(volume(&[2, 0, i64::MAX]).ok(), Some(0));
        assert_eq!(reference::live_tensors(), before);
    }

    #[test]
    fn test_empty_tensor() {
        let t = Tensor::from_array(&Array3::<f32>::zeros((0, 2, 3))).unwrap();
        assert_eq!(t.numel().unwrap(), 0);
        assert!(t.to_vec().unwrap().is_empty());
    }

    #[test]
    fn test_drop_disposes_once() {
        let before = reference::live_tensors();
        let invalid_before = reference::invalid_releases();
        {
            let _a = Tensor::zeros(&[3]).unwrap();
            let _b = Tensor::zeros(&[2, 2]).unwrap();
            assert_eq!(reference::live_tensors(), before + 2);
        }
        assert_eq!(reference::live_tensors(), before);
        assert_eq!(reference::invalid_releases(), invalid_before);
    }

    #[test]
    fn test_into_raw_then_from_raw_keeps_single_owner() {
        let before = reference::live_tensors();
        let t = Tensor::from_slice(&[1.0, 2.0], &[2]).unwrap();
        let raw = t.into_raw();
        assert_eq!(reference::live_tensors(), before + 1);
        let t = unsafe { Tensor::from_raw(raw) };
        assert_eq!(t.to_vec().unwrap(), vec![1.0, 2.0]);
        drop(t);
        assert_eq!(reference::live_tensors(), before);
    }
}
