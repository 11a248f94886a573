pub mod hardshrink;

pub use self::hardshrink::Hardshrink;

use crate::error::Result;
use crate::tensor::Tensor;

/// 재사용 가능한 네이티브 연산자 객체.
pub trait Module {
    fn forward(&self, input: &Tensor) -> Result<Tensor>;

    fn name(&self) -> &'static str;
}
