// src/native/ffi.rs
#![allow(non_snake_case)]

use libc::{c_char, c_int, c_void};

use crate::handle::RawHandle;

#[link(name = "LibTorchSharp")]
extern "C" {
    pub fn THSTorch_get_and_reset_last_err() -> *const c_char;

    // Tensor
    pub fn THSTensor_zeros(
        sizes: *const i64,
        length: c_int,
        scalar_type: i8,
        device_type: c_int,
        device_index: c_int,
        requires_grad: bool,
    ) -> RawHandle;
    pub fn THSTensor_data(tensor: RawHandle) -> *mut c_void;
    pub fn THSTensor_ndimension(tensor: RawHandle) -> i64;
    pub fn THSTensor_size(tensor: RawHandle, dim: i64) -> i64;
    pub fn THSTensor_dispose(tensor: RawHandle);

    // Module
    pub fn THSNN_Module_dispose(module: RawHandle);
    pub fn THSNN_AnyModule_dispose(boxed: RawHandle);

    // Hardshrink
    pub fn THSNN_Hardshrink_ctor(lambd: f64, boxed: *mut RawHandle) -> RawHandle;
    pub fn THSNN_Hardshrink_forward(module: RawHandle, tensor: RawHandle) -> RawHandle;

    // Normalization
    pub fn THSNN_batch_norm(
        input: RawHandle,
        running_mean: RawHandle,
        running_var: RawHandle,
        weight: RawHandle,
        bias: RawHandle,
        training: bool,
        momentum: f64,
        eps: f64,
    ) -> RawHandle;
    pub fn THSNN_group_norm(
        input: RawHandle,
        num_groups: i64,
        weight: RawHandle,
        bias: RawHandle,
        eps: f64,
    ) -> RawHandle;
    pub fn THSNN_instance_norm(
        input: RawHandle,
        running_mean: RawHandle,
        running_var: RawHandle,
        weight: RawHandle,
        bias: RawHandle,
        use_input_stats: bool,
        momentum: f64,
        eps: f64,
    ) -> RawHandle;
    pub fn THSNN_layer_norm(
        input: RawHandle,
        normalized_shape: *const i64,
        normalized_shape_len: i64,
        weight: RawHandle,
        bias: RawHandle,
        eps: f64,
    ) -> RawHandle;
    pub fn THSNN_local_response_norm(
        input: RawHandle,
        size: i64,
        alpha: f64,
        beta: f64,
        k: f64,
    ) -> RawHandle;
}
