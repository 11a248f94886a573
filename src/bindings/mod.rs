// src/bindings/mod.rs

//! # Python 바인딩
//!
//! `pyo3` + `numpy`로 연산자들을 `numpy.float32` n차원 배열 API로 노출합니다.
//! 오류는 모두 `RuntimeError`로 올라갑니다.

mod activation;
mod normalization;

use numpy::PyReadonlyArrayDyn;
use pyo3::prelude::*;
use pyo3::types::PyModule;

use crate::error::Result;
use crate::tensor::Tensor;

fn to_tensor(array: &PyReadonlyArrayDyn<'_, f32>) -> Result<Tensor> {
    Tensor::from_array(&array.as_array())
}

fn to_optional_tensor(array: Option<&PyReadonlyArrayDyn<'_, f32>>) -> Result<Option<Tensor>> {
    array.map(to_tensor).transpose()
}

#[pymodule]
pub fn nnshim(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    // Activation
    activation::register(m)?;
    // Normalization
    normalization::register(m)?;
    Ok(())
}
