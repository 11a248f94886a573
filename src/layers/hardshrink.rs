// src/layers/hardshrink.rs

use std::cell::Cell;
use std::marker::PhantomData;

use tracing::instrument;

use super::Module;
use crate::error::Result;
use crate::handle::RawHandle;
use crate::native::sys;
use crate::ops::{Constructor, Operation, DEFAULT_LAMBDA};
use crate::tensor::Tensor;

/// Hardshrink 모듈: `|x| > λ` 이면 `x`, 아니면 0.
///
/// 생성 → 여러 번 사용 → 해제. 해제는 `Drop` 또는 `close`로 정확히 한 번 일어납니다.
#[derive(Debug)]
pub struct Hardshrink {
    handle: RawHandle,
    boxed: RawHandle,
    lambda: f64,
    _not_sync: PhantomData<Cell<()>>,
}

impl Hardshrink {
    #[instrument(level = "trace")]
    pub fn new(lambda: f64) -> Result<Self> {
        let out = Constructor::Hardshrink { lambda }.invoke()?;
        Ok(Hardshrink {
            handle: out.handle,
            boxed: out.boxed,
            lambda,
            _not_sync: PhantomData,
        })
    }

    /// 기본 임계값 `λ = 0.5`로 생성합니다.
    pub fn with_default() -> Result<Self> {
        Hardshrink::new(DEFAULT_LAMBDA)
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn handle(&self) -> RawHandle {
        self.handle
    }

    /// 명시적 해제. 값을 소비하므로 해제 후 사용은 컴파일되지 않습니다.
    pub fn close(self) {
        drop(self);
    }
}

impl Module for Hardshrink {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        Ok(Operation::HardshrinkForward {
            module: self,
            input,
        }
        .invoke_tensor()?)
    }

    fn name(&self) -> &'static str {
        "Hardshrink"
    }
}

impl Drop for Hardshrink {
    fn drop(&mut self) {
        unsafe {
            if !self.boxed.is_null() {
                sys::THSNN_AnyModule_dispose(self.boxed);
            }
            sys::THSNN_Module_dispose(self.handle);
        }
    }
}
