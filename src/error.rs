// src/error.rs

use thiserror::Error;

/// 네이티브 루틴이 실패(0 핸들)를 보고했을 때의 오류.
///
/// 인자 오류, 메모리 부족, 형상 불일치 등을 이 계층에서는 구분하지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("native operation failed: {message}")]
pub struct NativeOperationError {
    pub message: String,
}

impl NativeOperationError {
    pub(crate) const UNKNOWN: &'static str = "unknown native failure";

    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub(crate) fn unknown() -> Self {
        Self::new(Self::UNKNOWN)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    NativeOperation(#[from] NativeOperationError),

    #[error("data length {actual} does not match shape volume {expected}")]
    DataLength { expected: usize, actual: usize },

    #[error("invalid shape {0:?}")]
    InvalidShape(Vec<i64>),
}

impl Error {
    pub fn is_native(&self) -> bool {
        matches!(self, Error::NativeOperation(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(feature = "python")]
impl From<Error> for pyo3::PyErr {
    fn from(err: Error) -> Self {
        pyo3::exceptions::PyRuntimeError::new_err(err.to_string())
    }
}
