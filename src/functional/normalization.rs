// src/functional/normalization.rs

//! # 정규화 연산자
//!
//! 필수 피연산자는 위치 인자, 선택 피연산자와 하이퍼파라미터는 `*Options` 구조체입니다.
//! `Default`가 문서화된 기본값(eps=1e-5, momentum=0.1, ...)을 채웁니다.

use tracing::instrument;

use crate::error::Result;
use crate::ops::{Operation, DEFAULT_EPS, DEFAULT_LRN_ALPHA, DEFAULT_LRN_BETA, DEFAULT_LRN_K, DEFAULT_MOMENTUM};
use crate::tensor::Tensor;

#[derive(Debug, Clone, Copy)]
pub struct BatchNormOptions<'a> {
    pub weight: Option<&'a Tensor>,
    pub bias: Option<&'a Tensor>,
    pub training: bool,
    pub momentum: f64,
    pub eps: f64,
}

impl Default for BatchNormOptions<'_> {
    fn default() -> Self {
        Self {
            weight: None,
            bias: None,
            training: false,
            momentum: DEFAULT_MOMENTUM,
            eps: DEFAULT_EPS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GroupNormOptions<'a> {
    pub weight: Option<&'a Tensor>,
    pub bias: Option<&'a Tensor>,
    pub eps: f64,
}

impl Default for GroupNormOptions<'_> {
    fn default() -> Self {
        Self {
            weight: None,
            bias: None,
            eps: DEFAULT_EPS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct InstanceNormOptions<'a> {
    pub running_mean: Option<&'a Tensor>,
    pub running_var: Option<&'a Tensor>,
    pub weight: Option<&'a Tensor>,
    pub bias: Option<&'a Tensor>,
    pub use_input_stats: bool,
    pub momentum: f64,
    pub eps: f64,
}

impl Default for InstanceNormOptions<'_> {
    fn default() -> Self {
        Self {
            running_mean: None,
            running_var: None,
            weight: None,
            bias: None,
            use_input_stats: true,
            momentum: DEFAULT_MOMENTUM,
            eps: DEFAULT_EPS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LayerNormOptions<'a> {
    pub weight: Option<&'a Tensor>,
    pub bias: Option<&'a Tensor>,
    pub eps: f64,
}

impl Default for LayerNormOptions<'_> {
    fn default() -> Self {
        Self {
            weight: None,
            bias: None,
            eps: DEFAULT_EPS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalResponseNormOptions {
    pub alpha: f64,
    pub beta: f64,
    pub k: f64,
}

impl Default for LocalResponseNormOptions {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_LRN_ALPHA,
            beta: DEFAULT_LRN_BETA,
            k: DEFAULT_LRN_K,
        }
    }
}

/// 배치의 각 채널에 Batch Normalization을 적용합니다.
///
/// `training`이면 배치 통계로 정규화하고 `running_mean`/`running_var`를 제자리에서 갱신합니다.
#[instrument(level = "trace", skip_all)]
pub fn batch_norm(
    input: &Tensor,
    running_mean: &Tensor,
    running_var: &Tensor,
    options: BatchNormOptions<'_>,
) -> Result<Tensor> {
    Ok(Operation::BatchNorm {
        input,
        running_mean,
        running_var,
        weight: options.weight,
        bias: options.bias,
        training: options.training,
        momentum: options.momentum,
        eps: options.eps,
    }
    .invoke_tensor()?)
}

/// 채널을 `num_groups`개 그룹으로 나누어 Group Normalization을 적용합니다.
#[instrument(level = "trace", skip(input, options))]
pub fn group_norm(input: &Tensor, num_groups: i64, options: GroupNormOptions<'_>) -> Result<Tensor> {
    Ok(Operation::GroupNorm {
        input,
        num_groups,
        weight: options.weight,
        bias: options.bias,
        eps: options.eps,
    }
    .invoke_tensor()?)
}

/// 배치의 각 샘플, 각 채널에 Instance Normalization을 적용합니다.
#[instrument(level = "trace", skip_all)]
pub fn instance_norm(input: &Tensor, options: InstanceNormOptions<'_>) -> Result<Tensor> {
    Ok(Operation::InstanceNorm {
        input,
        running_mean: options.running_mean,
        running_var: options.running_var,
        weight: options.weight,
        bias: options.bias,
        use_input_stats: options.use_input_stats,
        momentum: options.momentum,
        eps: options.eps,
    }
    .invoke_tensor()?)
}

/// 마지막 `normalized_shape.len()`개 차원에 Layer Normalization을 적용합니다.
#[instrument(level = "trace", skip(input, options))]
pub fn layer_norm(input: &Tensor, normalized_shape: &[i64], options: LayerNormOptions<'_>) -> Result<Tensor> {
    Ok(Operation::LayerNorm {
        input,
        normalized_shape,
        weight: options.weight,
        bias: options.bias,
        eps: options.eps,
    }
    .invoke_tensor()?)
}

/// 인접 채널 `size`개에 걸쳐 Local Response Normalization을 적용합니다.
#[instrument(level = "trace", skip(input))]
pub fn local_response_norm(input: &Tensor, size: i64, options: LocalResponseNormOptions) -> Result<Tensor> {
    Ok(Operation::LocalResponseNorm {
        input,
        size,
        alpha: options.alpha,
        beta: options.beta,
        k: options.k,
    }
    .invoke_tensor()?)
}
