use numpy::{IntoPyArray, PyArrayDyn, PyReadonlyArrayDyn};
use pyo3::prelude::*;

use super::to_tensor;
use crate::functional;
use crate::layers::{Hardshrink, Module};
use crate::ops::DEFAULT_LAMBDA;

#[pyclass(name = "Hardshrink", module = "nnshim")]
pub struct PyHardshrink {
    inner: Hardshrink,
}

#[pymethods]
impl PyHardshrink {
    #[new]
    #[pyo3(signature = (lambd=DEFAULT_LAMBDA))]
    fn new(lambd: f64) -> PyResult<Self> {
        Ok(PyHardshrink {
            inner: Hardshrink::new(lambd)?,
        })
    }

    fn forward<'py>(&self, py: Python<'py>, x: PyReadonlyArrayDyn<'py, f32>) -> PyResult<&'py PyArrayDyn<f32>> {
        let x = to_tensor(&x)?;
        let y = self.inner.forward(&x)?;
        Ok(y.to_array()?.into_pyarray(py))
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    #[getter]
    fn lambd(&self) -> f64 {
        self.inner.lambda()
    }
}

#[pyfunction]
#[pyo3(signature = (x, lambd=DEFAULT_LAMBDA))]
fn hardshrink<'py>(py: Python<'py>, x: PyReadonlyArrayDyn<'py, f32>, lambd: f64) -> PyResult<&'py PyArrayDyn<f32>> {
    let x = to_tensor(&x)?;
    let y = functional::hardshrink(&x, lambd)?;
    Ok(y.to_array()?.into_pyarray(py))
}

pub fn register(m: &PyModule) -> PyResult<()> {
    m.add_class::<PyHardshrink>()?;
    m.add_function(wrap_pyfunction!(hardshrink, m)?)?;
    Ok(())
}
