// src/ops/descriptor.rs

//! # 연산 기술자와 네이티브 호출 어댑터
//!
//! `Operation`은 텐서 하나를 돌려주는 네이티브 호출 한 번을 나타냅니다. 각 variant는 고정된
//! 진입점 하나에 대응하며(`match`로 정적 결정), 선택 피연산자는 여기서만 0 핸들로 바뀝니다.
//! 모듈 생성 호출은 `Constructor`로 분리되어 있어 모듈 핸들이 `Tensor`로 감싸질 수 없습니다.
//!
//! 두 타입 모두 crate 내부 전용입니다. 모든 피연산자는 살아 있는 소유 래퍼의 빌림입니다.

use tracing::{debug, trace};

use crate::error::NativeOperationError;
use crate::handle::{raw_or_null, RawHandle};
use crate::layers::Hardshrink;
use crate::native::{self, sys};
use crate::tensor::Tensor;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Operation<'a> {
    HardshrinkForward {
        module: &'a Hardshrink,
        input: &'a Tensor,
    },
    BatchNorm {
        input: &'a Tensor,
        running_mean: &'a Tensor,
        running_var: &'a Tensor,
        weight: Option<&'a Tensor>,
        bias: Option<&'a Tensor>,
        training: bool,
        momentum: f64,
        eps: f64,
    },
    GroupNorm {
        input: &'a Tensor,
        num_groups: i64,
        weight: Option<&'a Tensor>,
        bias: Option<&'a Tensor>,
        eps: f64,
    },
    InstanceNorm {
        input: &'a Tensor,
        running_mean: Option<&'a Tensor>,
        running_var: Option<&'a Tensor>,
        weight: Option<&'a Tensor>,
        bias: Option<&'a Tensor>,
        use_input_stats: bool,
        momentum: f64,
        eps: f64,
    },
    LayerNorm {
        input: &'a Tensor,
        normalized_shape: &'a [i64],
        weight: Option<&'a Tensor>,
        bias: Option<&'a Tensor>,
        eps: f64,
    },
    LocalResponseNorm {
        input: &'a Tensor,
        size: i64,
        alpha: f64,
        beta: f64,
        k: f64,
    },
}

/// 모듈 생성 호출.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Constructor {
    Hardshrink { lambda: f64 },
}

/// 생성 호출 결과: 모듈 핸들과 boxed 핸들. 둘 다 모듈 래퍼가 소유합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ModuleHandles {
    pub handle: RawHandle,
    pub boxed: RawHandle,
}

// 호출 결과에 sentinel 검사를 적용하고, 실패는 debug 로그로 남깁니다.
fn checked(op: &'static str, raw: RawHandle) -> Result<RawHandle, NativeOperationError> {
    native::check(raw).map_err(|err| {
        debug!(op, error = %err.message, "native call failed");
        err
    })
}

impl Constructor {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Constructor::Hardshrink { .. } => "THSNN_Hardshrink_ctor",
        }
    }

    pub(crate) fn invoke(&self) -> Result<ModuleHandles, NativeOperationError> {
        trace!(op = self.name(), "invoking native constructor");
        let mut boxed = RawHandle::NULL;
        let raw = match *self {
            Constructor::Hardshrink { lambda } => unsafe { sys::THSNN_Hardshrink_ctor(lambda, &mut boxed) },
        };
        let handle = checked(self.name(), raw)?;
        Ok(ModuleHandles { handle, boxed })
    }
}

impl<'a> Operation<'a> {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Operation::HardshrinkForward { .. } => "THSNN_Hardshrink_forward",
            Operation::BatchNorm { .. } => "THSNN_batch_norm",
            Operation::GroupNorm { .. } => "THSNN_group_norm",
            Operation::InstanceNorm { .. } => "THSNN_instance_norm",
            Operation::LayerNorm { .. } => "THSNN_layer_norm",
            Operation::LocalResponseNorm { .. } => "THSNN_local_response_norm",
        }
    }

    // 모든 핸들 인자는 빌린 소유 래퍼에서 오므로 호출 동안 살아 있습니다.
    unsafe fn call(&self) -> RawHandle {
        match *self {
            Operation::HardshrinkForward { module, input } => {
                sys::THSNN_Hardshrink_forward(module.handle(), input.handle())
            }
            Operation::BatchNorm {
                input,
                running_mean,
                running_var,
                weight,
                bias,
                training,
                momentum,
                eps,
            } => sys::THSNN_batch_norm(
                input.handle(),
                running_mean.handle(),
                running_var.handle(),
                raw_or_null(weight),
                raw_or_null(bias),
                training,
                momentum,
                eps,
            ),
            Operation::GroupNorm {
                input,
                num_groups,
                weight,
                bias,
                eps,
            } => sys::THSNN_group_norm(input.handle(), num_groups, raw_or_null(weight), raw_or_null(bias), eps),
            Operation::InstanceNorm {
                input,
                running_mean,
                running_var,
                weight,
                bias,
                use_input_stats,
                momentum,
                eps,
            } => sys::THSNN_instance_norm(
                input.handle(),
                raw_or_null(running_mean),
                raw_or_null(running_var),
                raw_or_null(weight),
                raw_or_null(bias),
                use_input_stats,
                momentum,
                eps,
            ),
            // 포인터 + 길이 두 인자로 전달
            Operation::LayerNorm {
                input,
                normalized_shape,
                weight,
                bias,
                eps,
            } => sys::THSNN_layer_norm(
                input.handle(),
                normalized_shape.as_ptr(),
                normalized_shape.len() as i64,
                raw_or_null(weight),
                raw_or_null(bias),
                eps,
            ),
            Operation::LocalResponseNorm {
                input,
                size,
                alpha,
                beta,
                k,
            } => sys::THSNN_local_response_norm(input.handle(), size, alpha, beta, k),
        }
    }

    /// 호출 → 검사 → 래핑. 반환 핸들은 새 텐서이며 소유권이 `Tensor`로 넘어갑니다.
    pub(crate) fn invoke_tensor(&self) -> Result<Tensor, NativeOperationError> {
        trace!(op = self.name(), "invoking native entry point");
        let raw = unsafe { self.call() };
        let handle = checked(self.name(), raw)?;
        Ok(unsafe { Tensor::from_raw(handle) })
    }
}

#[cfg(all(test, not(feature = "libtorch")))]
mod tests {
    use super::*;
    use crate::native::reference;

    #[test]
    fn test_names_follow_entry_points() {
        let x = Tensor::zeros(&[1, 2, 3]).unwrap();
        let op = Operation::LocalResponseNorm {
            input: &x,
            size: 2,
            alpha: 1e-4,
            beta: 0.75,
            k: 1.0,
        };
        assert_eq!(op.name(), "THSNN_local_response_norm");
        let y = op.invoke_tensor().unwrap();
        assert_eq!(reference::last_call().unwrap().entry, op.name());
        assert_eq!(y.shape().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_ctor_returns_module_and_boxed_handles() {
        let modules = reference::live_modules();
        let ctor = Constructor::Hardshrink { lambda: 0.5 };
        let out = ctor.invoke().unwrap();
        assert_eq!(reference::last_call().unwrap().entry, ctor.name());
        assert!(!out.handle.is_null());
        assert!(!out.boxed.is_null());
        assert_ne!(out.handle, out.boxed);
        assert_eq!(reference::live_modules(), modules + 2);
        unsafe {
            sys::THSNN_AnyModule_dispose(out.boxed);
            sys::THSNN_Module_dispose(out.handle);
        }
        assert_eq!(reference::live_modules(), modules);
    }

    #[test]
    fn test_forward_passes_borrowed_module_handle() {
        let module = Hardshrink::new(0.5).unwrap();
        let x = Tensor::from_slice(&[1.0, 0.1], &[2]).unwrap();
        let invalid = reference::invalid_releases();
        let y = Operation::HardshrinkForward {
            module: &module,
            input: &x,
        }
        .invoke_tensor()
        .unwrap();
        let call = reference::last_call().unwrap();
        assert_eq!(call.handles, vec![module.handle(), x.handle()]);
        assert_eq!(y.to_vec().unwrap(), vec![1.0, 0.0]);
        drop((y, module));
        assert_eq!(reference::invalid_releases(), invalid);
    }

    #[test]
    fn test_failed_call_never_wraps_handle() {
        let before = reference::live_tensors();
        let x = Tensor::zeros(&[1, 3, 2]).unwrap();
        let op = Operation::GroupNorm {
            input: &x,
            num_groups: 2,
            weight: None,
            bias: None,
            eps: 1e-5,
        };
        let err = op.invoke_tensor().unwrap_err();
        assert!(err.message.contains("divisible"));
        drop(x);
        assert_eq!(reference::live_tensors(), before);
    }
}
