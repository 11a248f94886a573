//! # nnshim
//!
//! `LibTorchSharp`의 NN 연산자(Hardshrink, batch/group/instance/layer norm,
//! local response norm)를 안전한 Rust API로 감싸는 마샬링 계층입니다.
//!
//! 모든 연산은 같은 규약을 따릅니다: 텐서 핸들과 스칼라를 고정된 네이티브 진입점에 넘기고,
//! 0 핸들이 돌아오면 스레드의 대기 중인 네이티브 오류를 읽어 `NativeOperationError`로 올립니다.
//!
//! 기본 빌드는 같은 시그니처의 레퍼런스 백엔드(`ndarray` + `rayon`)에 링크되고,
//! `libtorch` 기능을 켜면 외부 `LibTorchSharp`에 링크됩니다.

pub mod error;
pub mod functional;
pub mod handle;
pub mod layers;
pub mod native;
pub mod ops;
pub mod tensor;

#[cfg(feature = "python")]
mod bindings;

pub use error::{Error, NativeOperationError, Result};
pub use handle::{AsRawHandle, RawHandle};
pub use layers::{Hardshrink, Module};
pub use tensor::Tensor;

#[cfg(all(test, not(feature = "libtorch")))]
mod __test__;
