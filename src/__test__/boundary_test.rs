//! 호출 경계 공통 동작: 오류 sentinel, 보류 오류 소비, 텐서 수명

use anyhow::Result;

use super::{init_tracing, random_tensor};
use crate::error::Error;
use crate::functional::{self, GroupNormOptions, LayerNormOptions};
use crate::layers::{Hardshrink, Module};
use crate::native::reference;
use crate::tensor::Tensor;

#[test]
fn test_success_after_failure_is_clean() -> Result<()> {
    init_tracing();
    let (x, _) = random_tensor(&[2, 4, 3], 100);
    let err = functional::group_norm(&x, 3, GroupNormOptions::default()).unwrap_err();
    assert!(err.is_native());

    // 이전 실패의 메시지가 다음 성공 호출에 섞이지 않아야 함
    let y = functional::group_norm(&x, 2, GroupNormOptions::default())?;
    assert_eq!(y.shape()?, vec![2, 4, 3]);
    Ok(())
}

#[test]
fn test_each_failure_reports_its_own_message() {
    let (x, _) = random_tensor(&[2, 3], 101);
    let first = functional::layer_norm(&x, &[7], LayerNormOptions::default()).unwrap_err();
    let second = functional::group_norm(&x, 0, GroupNormOptions::default()).unwrap_err();
    assert!(first.to_string().contains("normalized_shape=[7]"));
    assert!(second.to_string().contains("num_groups must be positive"));
    assert!(!second.to_string().contains("normalized_shape"));
}

#[test]
fn test_native_error_display() {
    let (x, _) = random_tensor(&[2, 3], 102);
    match functional::group_norm(&x, 0, GroupNormOptions::default()) {
        Err(Error::NativeOperation(e)) => {
            assert_eq!(e.to_string(), format!("native operation failed: {}", e.message));
        }
        other => panic!("expected native failure, got {:?}", other.map(|t| t.handle())),
    }
}

#[test]
fn test_invalid_shape_is_not_a_native_error() {
    let tensors = reference::live_tensors();
    let err = Tensor::from_slice(&[], &[-1]).unwrap_err();
    assert!(matches!(err, Error::InvalidShape(_)));
    assert!(!err.is_native());
    assert_eq!(reference::live_tensors(), tensors);
}

#[test]
fn test_results_are_owned_and_released() -> Result<()> {
    let tensors = reference::live_tensors();
    let invalid = reference::invalid_releases();
    {
        let (x, _) = random_tensor(&[4, 4], 103);
        let module = Hardshrink::new(0.1)?;
        let outputs = (0..3).map(|_| module.forward(&x)).collect::<crate::Result<Vec<_>>>()?;
        assert_eq!(reference::live_tensors(), tensors + 4);
        drop(outputs);
        assert_eq!(reference::live_tensors(), tensors + 1);
    }
    assert_eq!(reference::live_tensors(), tensors);
    assert_eq!(reference::invalid_releases(), invalid);
    Ok(())
}

#[test]
fn test_tensor_and_module_move_across_threads() -> Result<()> {
    let module = Hardshrink::new(0.5)?;
    let x = Tensor::from_slice(&[0.2, 0.9, -0.7, 0.4], &[2, 2])?;
    let handle = std::thread::spawn(move || -> crate::Result<Vec<f32>> {
        let y = module.forward(&x)?;
        y.to_vec()
    });
    let values = handle.join().expect("worker thread panicked")?;
    assert_eq!(values, vec![0.0, 0.9, -0.7, 0.0]);
    Ok(())
}
