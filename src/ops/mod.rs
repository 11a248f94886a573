pub(crate) mod descriptor;

pub(crate) use self::descriptor::{Constructor, Operation};

pub const DEFAULT_EPS: f64 = 1e-5;
pub const DEFAULT_MOMENTUM: f64 = 0.1;
pub const DEFAULT_LAMBDA: f64 = 0.5;
pub const DEFAULT_LRN_ALPHA: f64 = 1e-4;
pub const DEFAULT_LRN_BETA: f64 = 0.75;
pub const DEFAULT_LRN_K: f64 = 1.0;
