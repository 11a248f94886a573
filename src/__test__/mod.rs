//! 연산자 경계 통합 테스트 (레퍼런스 백엔드)

use std::sync::Once;

use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

use crate::tensor::Tensor;

pub mod activation_test;
pub mod boundary_test;

static TRACING: Once = Once::new();

/// `RUST_LOG=nnshim=trace cargo test` 로 호출 추적을 볼 수 있습니다.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn random_array(shape: &[usize], seed: u64) -> ArrayD<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    ArrayD::from_shape_fn(IxDyn(shape), |_| rng.gen_range(-2.0f32..2.0))
}

pub fn positive_array(shape: &[usize], seed: u64) -> ArrayD<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    ArrayD::from_shape_fn(IxDyn(shape), |_| rng.gen_range(0.5f32..2.0))
}

pub fn random_tensor(shape: &[usize], seed: u64) -> (Tensor, ArrayD<f32>) {
    let array = random_array(shape, seed);
    let tensor = Tensor::from_array(&array).expect("tensor creation");
    (tensor, array)
}

/// 마지막 축 묶음별 평균과 편향 분산.
pub fn mean_var(values: &[f32]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = values.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
    (mean, var)
}
