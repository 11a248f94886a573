use numpy::{IntoPyArray, PyArrayDyn, PyReadonlyArrayDyn, PyReadwriteArrayDyn};
use pyo3::prelude::*;

use super::{to_optional_tensor, to_tensor};
use crate::error::Result;
use crate::functional::{
    self, BatchNormOptions, GroupNormOptions, InstanceNormOptions, LayerNormOptions,
    LocalResponseNormOptions,
};
use crate::ops::{DEFAULT_EPS, DEFAULT_LRN_ALPHA, DEFAULT_LRN_BETA, DEFAULT_LRN_K, DEFAULT_MOMENTUM};
use crate::tensor::Tensor;

// 네이티브 쪽에서 갱신된 러닝 통계를 numpy 배열로 되돌려 씁니다.
fn copy_back(tensor: &Tensor, target: &mut PyReadwriteArrayDyn<'_, f32>) -> Result<()> {
    let updated = tensor.to_array()?;
    target.as_array_mut().assign(&updated);
    Ok(())
}

#[pyfunction]
#[pyo3(signature = (input, running_mean, running_var, weight=None, bias=None, training=false, momentum=DEFAULT_MOMENTUM, eps=DEFAULT_EPS))]
#[allow(clippy::too_many_arguments)]
fn batch_norm<'py>(
    py: Python<'py>,
    input: PyReadonlyArrayDyn<'py, f32>,
    mut running_mean: PyReadwriteArrayDyn<'py, f32>,
    mut running_var: PyReadwriteArrayDyn<'py, f32>,
    weight: Option<PyReadonlyArrayDyn<'py, f32>>,
    bias: Option<PyReadonlyArrayDyn<'py, f32>>,
    training: bool,
    momentum: f64,
    eps: f64,
) -> PyResult<&'py PyArrayDyn<f32>> {
    let input = to_tensor(&input)?;
    let rm = Tensor::from_array(&running_mean.as_array())?;
    let rv = Tensor::from_array(&running_var.as_array())?;
    let weight = to_optional_tensor(weight.as_ref())?;
    let bias = to_optional_tensor(bias.as_ref())?;
    let options = BatchNormOptions {
        weight: weight.as_ref(),
        bias: bias.as_ref(),
        training,
        momentum,
        eps,
    };
    let y = functional::batch_norm(&input, &rm, &rv, options)?;
    if training {
        copy_back(&rm, &mut running_mean)?;
        copy_back(&rv, &mut running_var)?;
    }
    Ok(y.to_array()?.into_pyarray(py))
}

#[pyfunction]
#[pyo3(signature = (input, num_groups, weight=None, bias=None, eps=DEFAULT_EPS))]
fn group_norm<'py>(
    py: Python<'py>,
    input: PyReadonlyArrayDyn<'py, f32>,
    num_groups: i64,
    weight: Option<PyReadonlyArrayDyn<'py, f32>>,
    bias: Option<PyReadonlyArrayDyn<'py, f32>>,
    eps: f64,
) -> PyResult<&'py PyArrayDyn<f32>> {
    let input = to_tensor(&input)?;
    let weight = to_optional_tensor(weight.as_ref())?;
    let bias = to_optional_tensor(bias.as_ref())?;
    let options = GroupNormOptions {
        weight: weight.as_ref(),
        bias: bias.as_ref(),
        eps,
    };
    let y = functional::group_norm(&input, num_groups, options)?;
    Ok(y.to_array()?.into_pyarray(py))
}

#[pyfunction]
#[pyo3(signature = (input, running_mean=None, running_var=None, weight=None, bias=None, use_input_stats=true, momentum=DEFAULT_MOMENTUM, eps=DEFAULT_EPS))]
#[allow(clippy::too_many_arguments)]
fn instance_norm<'py>(
    py: Python<'py>,
    input: PyReadonlyArrayDyn<'py, f32>,
    running_mean: Option<PyReadwriteArrayDyn<'py, f32>>,
    running_var: Option<PyReadwriteArrayDyn<'py, f32>>,
    weight: Option<PyReadonlyArrayDyn<'py, f32>>,
    bias: Option<PyReadonlyArrayDyn<'py, f32>>,
    use_input_stats: bool,
    momentum: f64,
    eps: f64,
) -> PyResult<&'py PyArrayDyn<f32>> {
    let input = to_tensor(&input)?;
    let rm = running_mean
        .as_ref()
        .map(|a| Tensor::from_array(&a.as_array()))
        .transpose()?;
    let rv = running_var
        .as_ref()
        .map(|a| Tensor::from_array(&a.as_array()))
        .transpose()?;
    let weight = to_optional_tensor(weight.as_ref())?;
    let bias = to_optional_tensor(bias.as_ref())?;
    let options = InstanceNormOptions {
        running_mean: rm.as_ref(),
        running_var: rv.as_ref(),
        weight: weight.as_ref(),
        bias: bias.as_ref(),
        use_input_stats,
        momentum,
        eps,
    };
    let y = functional::instance_norm(&input, options)?;
    if use_input_stats {
        if let (Some(t), Some(target)) = (&rm, running_mean.as_mut()) {
            copy_back(t, target)?;
        }
        if let (Some(t), Some(target)) = (&rv, running_var.as_mut()) {
            copy_back(t, target)?;
        }
    }
    Ok(y.to_array()?.into_pyarray(py))
}

#[pyfunction]
#[pyo3(signature = (input, normalized_shape, weight=None, bias=None, eps=DEFAULT_EPS))]
fn layer_norm<'py>(
    py: Python<'py>,
    input: PyReadonlyArrayDyn<'py, f32>,
    normalized_shape: Vec<i64>,
    weight: Option<PyReadonlyArrayDyn<'py, f32>>,
    bias: Option<PyReadonlyArrayDyn<'py, f32>>,
    eps: f64,
) -> PyResult<&'py PyArrayDyn<f32>> {
    let input = to_tensor(&input)?;
    let weight = to_optional_tensor(weight.as_ref())?;
    let bias = to_optional_tensor(bias.as_ref())?;
    let options = LayerNormOptions {
        weight: weight.as_ref(),
        bias: bias.as_ref(),
        eps,
    };
    let y = functional::layer_norm(&input, &normalized_shape, options)?;
    Ok(y.to_array()?.into_pyarray(py))
}

#[pyfunction]
#[pyo3(signature = (input, size, alpha=DEFAULT_LRN_ALPHA, beta=DEFAULT_LRN_BETA, k=DEFAULT_LRN_K))]
fn local_response_norm<'py>(
    py: Python<'py>,
    input: PyReadonlyArrayDyn<'py, f32>,
    size: i64,
    alpha: f64,
    beta: f64,
    k: f64,
) -> PyResult<&'py PyArrayDyn<f32>> {
    let input = to_tensor(&input)?;
    let y = functional::local_response_norm(&input, size, LocalResponseNormOptions { alpha, beta, k })?;
    Ok(y.to_array()?.into_pyarray(py))
}

pub fn register(m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(batch_norm, m)?)?;
    m.add_function(wrap_pyfunction!(group_norm, m)?)?;
    m.add_function(wrap_pyfunction!(instance_norm, m)?)?;
    m.add_function(wrap_pyfunction!(layer_norm, m)?)?;
    m.add_function(wrap_pyfunction!(local_response_norm, m)?)?;
    Ok(())
}
