// src/functional/activation.rs

use tracing::instrument;

use crate::error::Result;
use crate::layers::{Hardshrink, Module};
use crate::tensor::Tensor;

/// 임시 `Hardshrink` 모듈을 만들어 한 번 적용하고, 반환 전에 해제합니다.
#[instrument(level = "trace", skip(x))]
pub fn hardshrink(x: &Tensor, lambda: f64) -> Result<Tensor> {
    let module = Hardshrink::new(lambda)?;
    module.forward(x)
}
