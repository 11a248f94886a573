pub mod activation;
pub mod normalization;

pub use self::activation::hardshrink;
pub use self::normalization::{
    batch_norm, group_norm, instance_norm, layer_norm, local_response_norm, BatchNormOptions,
    GroupNormOptions, InstanceNormOptions, LayerNormOptions, LocalResponseNormOptions,
};
