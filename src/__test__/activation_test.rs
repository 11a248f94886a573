//! Hardshrink 모듈과 함수형 API 테스트

use approx::assert_relative_eq;

use super::{init_tracing, random_tensor};
use crate::functional;
use crate::handle::RawHandle;
use crate::layers::{Hardshrink, Module};
use crate::native::reference;
use crate::tensor::Tensor;

#[test]
fn test_hardshrink_threshold() {
    init_tracing();
    let x = Tensor::from_slice(&[-1.0, -0.5, -0.2, 0.0, 0.3, 0.5, 0.7], &[7]).unwrap();
    let y = functional::hardshrink(&x, 0.5).unwrap();
    assert_eq!(y.to_vec().unwrap(), vec![-1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.7]);
    assert_eq!(y.shape().unwrap(), vec![7]);
}

#[test]
fn test_hardshrink_passes_nan_through() {
    let x = Tensor::from_slice(&[f32::NAN, 1.0, -0.3], &[3]).unwrap();
    let y = functional::hardshrink(&x, 0.5).unwrap().to_vec().unwrap();
    assert!(y[0].is_nan());
    assert_eq!(&y[1..], &[1.0, 0.0]);
}

#[test]
fn test_with_default_uses_half_threshold() {
    let module = Hardshrink::with_default().unwrap();
    assert_eq!(module.lambda(), 0.5);
    let x = Tensor::from_slice(&[0.5, 0.500_1, -0.6], &[3]).unwrap();
    assert_eq!(module.forward(&x).unwrap().to_vec().unwrap(), vec![0.0, 0.500_1, -0.6]);
}

#[test]
fn test_functional_matches_module() {
    init_tracing();
    let (x, _) = random_tensor(&[4, 5], 7);
    let module = Hardshrink::new(0.8).unwrap();
    let expected = module.forward(&x).unwrap().to_vec().unwrap();
    let actual = functional::hardshrink(&x, 0.8).unwrap().to_vec().unwrap();
    for (a, e) in actual.iter().zip(&expected) {
        assert_relative_eq!(a, e);
    }
}

#[test]
fn test_module_reused_across_calls() {
    let module = Hardshrink::new(0.5).unwrap();
    assert_eq!(module.name(), "Hardshrink");
    assert_eq!(module.lambda(), 0.5);
    for seed in 0..3 {
        let (x, input) = random_tensor(&[2, 3], seed);
        let y = module.forward(&x).unwrap().to_array().unwrap();
        for (o, &v) in y.iter().zip(input.iter()) {
            let expected = if v.abs() > 0.5 { v } else { 0.0 };
            assert_eq!(*o, expected);
        }
        let call = reference::last_call().unwrap();
        assert_eq!(call.entry, "THSNN_Hardshrink_forward");
        assert_eq!(call.handles, vec![module.handle(), x.handle()]);
    }
}

#[test]
fn test_module_released_exactly_once_on_drop() {
    let modules = reference::live_modules();
    let invalid = reference::invalid_releases();
    {
        let module = Hardshrink::new(0.5).unwrap();
        assert!(!module.handle().is_null());
        // 모듈 핸들 + boxed 핸들
        assert_eq!(reference::live_modules(), modules + 2);
    }
    assert_eq!(reference::live_modules(), modules);
    assert_eq!(reference::invalid_releases(), invalid);
}

#[test]
fn test_close_releases_module() {
    let modules = reference::live_modules();
    let invalid = reference::invalid_releases();
    let module = Hardshrink::new(1.0).unwrap();
    module.close();
    assert_eq!(reference::live_modules(), modules);
    assert_eq!(reference::invalid_releases(), invalid);
}

#[test]
fn test_functional_hardshrink_leaves_no_module_behind() {
    let modules = reference::live_modules();
    let tensors = reference::live_tensors();
    let (x, _) = random_tensor(&[3, 3], 11);
    let y = functional::hardshrink(&x, 0.25).unwrap();
    assert_eq!(reference::live_modules(), modules);
    assert_eq!(reference::live_tensors(), tensors + 2);
    drop((x, y));
    assert_eq!(reference::live_tensors(), tensors);
}

#[test]
fn test_ctor_failure_creates_nothing() {
    let modules = reference::live_modules();
    let err = Hardshrink::new(f64::NAN).unwrap_err();
    assert!(err.is_native());
    assert!(err.to_string().contains("NaN"));
    assert_eq!(reference::live_modules(), modules);
}

#[test]
fn test_forward_on_unknown_tensor_fails() {
    let module = Hardshrink::new(0.5).unwrap();
    let tensors = reference::live_tensors();
    // 레지스트리에 없는 핸들. 해제되지 않도록 into_raw 로 회수
    let bogus = unsafe { Tensor::from_raw(RawHandle::from_addr(usize::MAX - 1)) };
    let err = module.forward(&bogus).unwrap_err();
    let _ = bogus.into_raw();
    assert!(err.to_string().contains("Invalid tensor handle"));
    assert_eq!(reference::live_tensors(), tensors);
}
