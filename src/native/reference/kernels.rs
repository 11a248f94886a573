// src/native/reference/kernels.rs

//! # 레퍼런스 커널
//!
//! `(N, C, *)` 입력을 `(N, C, S)`로 펼친 뒤 채널/그룹/인스턴스 단위 통계를 계산합니다.
//! 통계는 f64로 누적하고 결과는 f32로 저장합니다.

use ndarray::{s, Array2, Array3, ArrayD, ArrayView3, Axis};
use rayon::prelude::*;

pub type KernelResult<T> = Result<T, String>;

/// 단일 패스(Welford) 평균/편향 분산.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Moments {
    pub mean: f64,
    pub var: f64,
    pub count: usize,
}

impl Moments {
    pub fn of<'a>(values: impl IntoIterator<Item = &'a f32>) -> Self {
        let mut count = 0usize;
        let mut mean = 0.0f64;
        let mut m2 = 0.0f64;
        for &v in values {
            count += 1;
            let v = v as f64;
            let delta = v - mean;
            mean += delta / count as f64;
            m2 += delta * (v - mean);
        }
        let var = if count > 0 { m2 / count as f64 } else { 0.0 };
        Moments { mean, var, count }
    }

    pub fn unbiased_var(&self) -> f64 {
        if self.count > 1 {
            self.var * self.count as f64 / (self.count - 1) as f64
        } else {
            self.var
        }
    }

    fn inv_std(&self, eps: f64) -> f64 {
        1.0 / (self.var + eps).sqrt()
    }
}

/// `[-λ, λ]` 구간만 0으로 만듭니다. NaN은 어느 비교에도 걸리지 않아 그대로 통과합니다.
pub fn hardshrink(x: &ArrayD<f32>, lambda: f64) -> ArrayD<f32> {
    x.mapv(|v| {
        let v64 = v as f64;
        if v64 >= -lambda && v64 <= lambda {
            0.0
        } else {
            v
        }
    })
}

/// `(N, C, *)` → `(N, C, S)` 뷰.
fn as_ncs<'a>(input: &'a ArrayD<f32>, op: &str, min_rank: usize) -> KernelResult<ArrayView3<'a, f32>> {
    let shape = input.shape();
    if shape.len() < min_rank {
        return Err(format!(
            "{}: expected {}D or higher dimensionality input (got {} dimensions)",
            op,
            min_rank,
            shape.len()
        ));
    }
    let n = shape[0];
    let c = shape[1];
    let s = shape[2..].iter().product::<usize>();
    input
        .view()
        .into_shape((n, c, s))
        .map_err(|e| format!("{}: {}", op, e))
}

fn channel_param(param: Option<&ArrayD<f32>>, channels: usize, what: &str) -> KernelResult<Option<Vec<f32>>> {
    match param {
        None => Ok(None),
        Some(p) if p.ndim() == 1 && p.len() == channels => Ok(Some(p.iter().copied().collect())),
        Some(p) => Err(format!(
            "{} should contain {} elements, got shape {:?}",
            what,
            channels,
            p.shape()
        )),
    }
}

fn into_input_shape(out: Array3<f32>, shape: &[usize]) -> KernelResult<ArrayD<f32>> {
    out.into_shape(shape).map_err(|e| e.to_string())
}

/// (n, c) → (mean, inv_std) 통계로 정규화하고 채널 affine을 적용합니다.
fn normalize_ncs<F>(x: &ArrayView3<f32>, stats: F, weight: Option<&[f32]>, bias: Option<&[f32]>) -> Array3<f32>
where
    F: Fn(usize, usize) -> (f64, f64) + Sync,
{
    let (n, c, s) = x.dim();
    let mut out = Array3::<f32>::zeros((n, c, s));
    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(i, mut sample)| {
            for ch in 0..c {
                let (mean, inv_std) = stats(i, ch);
                let w = weight.map_or(1.0, |w| w[ch] as f64);
                let b = bias.map_or(0.0, |b| b[ch] as f64);
                let src = x.slice(s![i, ch, ..]);
                for (o, &v) in sample.row_mut(ch).iter_mut().zip(src.iter()) {
                    *o = ((v as f64 - mean) * inv_std * w + b) as f32;
                }
            }
        });
    out
}

fn update_running(running: &mut ArrayD<f32>, stats: &[f64], momentum: f64) {
    for (r, &s) in running.iter_mut().zip(stats) {
        *r = ((1.0 - momentum) * (*r as f64) + momentum * s) as f32;
    }
}

#[allow(clippy::too_many_arguments)]
pub fn batch_norm(
    input: &ArrayD<f32>,
    running_mean: Option<&mut ArrayD<f32>>,
    running_var: Option<&mut ArrayD<f32>>,
    weight: Option<&ArrayD<f32>>,
    bias: Option<&ArrayD<f32>>,
    training: bool,
    momentum: f64,
    eps: f64,
) -> KernelResult<ArrayD<f32>> {
    let x = as_ncs(input, "batch_norm", 2)?;
    let (_, c, _) = x.dim();
    let weight = channel_param(weight, c, "weight")?;
    let bias = channel_param(bias, c, "bias")?;
    if let Some(rm) = running_mean.as_deref() {
        channel_param(Some(rm), c, "running_mean")?;
    }
    if let Some(rv) = running_var.as_deref() {
        channel_param(Some(rv), c, "running_var")?;
    }

    let stats: Vec<(f64, f64)> = if training {
        let moments: Vec<Moments> = (0..c)
            .into_par_iter()
            .map(|ch| Moments::of(x.index_axis(Axis(1), ch).iter()))
            .collect();
        if moments.first().map_or(false, |m| m.count <= 1) {
            return Err(format!(
                "Expected more than 1 value per channel when training, got input size {:?}",
                input.shape()
            ));
        }
        if let Some(rm) = running_mean {
            let means: Vec<f64> = moments.iter().map(|m| m.mean).collect();
            update_running(rm, &means, momentum);
        }
        if let Some(rv) = running_var {
            let vars: Vec<f64> = moments.iter().map(Moments::unbiased_var).collect();
            update_running(rv, &vars, momentum);
        }
        moments.iter().map(|m| (m.mean, m.inv_std(eps))).collect()
    } else {
        let (rm, rv) = match (running_mean, running_var) {
            (Some(rm), Some(rv)) => (rm, rv),
            _ => return Err("running_mean and running_var must be defined in evaluation mode".to_string()),
        };
        rm.iter()
            .zip(rv.iter())
            .map(|(&m, &v)| (m as f64, 1.0 / (v as f64 + eps).sqrt()))
            .collect()
    };

    let out = normalize_ncs(&x, |_, ch| stats[ch], weight.as_deref(), bias.as_deref());
    into_input_shape(out, input.shape())
}

pub fn group_norm(
    input: &ArrayD<f32>,
    num_groups: i64,
    weight: Option<&ArrayD<f32>>,
    bias: Option<&ArrayD<f32>>,
    eps: f64,
) -> KernelResult<ArrayD<f32>> {
    let x = as_ncs(input, "group_norm", 2)?;
    let (n, c, _) = x.dim();
    if num_groups <= 0 {
        return Err(format!("num_groups must be positive, got {}", num_groups));
    }
    let groups = usize::try_from(num_groups).map_err(|e| format!("group_norm: {}", e))?;
    if c % groups != 0 {
        return Err(format!(
            "Expected number of channels in input to be divisible by num_groups, but got input of shape {:?} and num_groups={}",
            input.shape(),
            num_groups
        ));
    }
    let weight = channel_param(weight, c, "weight")?;
    let bias = channel_param(bias, c, "bias")?;
    // 채널이 없으면 어떤 num_groups 든 나누어떨어지지만 정규화할 값도 없음
    if c == 0 {
        return Ok(input.clone());
    }
    let per_group = c / groups;
    let total = n
        .checked_mul(groups)
        .ok_or_else(|| format!("group_norm: {} groups over {} samples overflows", groups, n))?;

    let moments: Vec<Moments> = (0..total)
        .into_par_iter()
        .map(|idx| {
            let (i, g) = (idx / groups, idx % groups);
            let lanes = x.slice(s![i, g * per_group..(g + 1) * per_group, ..]);
            Moments::of(lanes.iter())
        })
        .collect();

    let out = normalize_ncs(
        &x,
        |i, ch| {
            let m = &moments[i * groups + ch / per_group];
            (m.mean, m.inv_std(eps))
        },
        weight.as_deref(),
        bias.as_deref(),
    );
    into_input_shape(out, input.shape())
}

#[allow(clippy::too_many_arguments)]
pub fn instance_norm(
    input: &ArrayD<f32>,
    running_mean: Option<&mut ArrayD<f32>>,
    running_var: Option<&mut ArrayD<f32>>,
    weight: Option<&ArrayD<f32>>,
    bias: Option<&ArrayD<f32>>,
    use_input_stats: bool,
    momentum: f64,
    eps: f64,
) -> KernelResult<ArrayD<f32>> {
    let x = as_ncs(input, "instance_norm", 2)?;
    let (n, c, s) = x.dim();
    let weight = channel_param(weight, c, "weight")?;
    let bias = channel_param(bias, c, "bias")?;
    if let Some(rm) = running_mean.as_deref() {
        channel_param(Some(rm), c, "running_mean")?;
    }
    if let Some(rv) = running_var.as_deref() {
        channel_param(Some(rv), c, "running_var")?;
    }

    if !use_input_stats {
        let (rm, rv) = match (running_mean, running_var) {
            (Some(rm), Some(rv)) => (rm, rv),
            _ => {
                return Err(
                    "Expected running_mean and running_var to be defined when use_input_stats is false"
                        .to_string(),
                )
            }
        };
        let stats: Vec<(f64, f64)> = rm
            .iter()
            .zip(rv.iter())
            .map(|(&m, &v)| (m as f64, 1.0 / (v as f64 + eps).sqrt()))
            .collect();
        let out = normalize_ncs(&x, |_, ch| stats[ch], weight.as_deref(), bias.as_deref());
        return into_input_shape(out, input.shape());
    }

    if s <= 1 {
        return Err(format!(
            "Expected more than 1 spatial element when training, got input size {:?}",
            input.shape()
        ));
    }

    let moments: Vec<Moments> = (0..n * c)
        .into_par_iter()
        .map(|idx| Moments::of(x.slice(s![idx / c, idx % c, ..]).iter()))
        .collect();

    // 러닝 통계는 배치에 대한 인스턴스 통계의 평균으로 갱신
    if let Some(rm) = running_mean {
        let means: Vec<f64> = (0..c)
            .map(|ch| (0..n).map(|i| moments[i * c + ch].mean).sum::<f64>() / n as f64)
            .collect();
        update_running(rm, &means, momentum);
    }
    if let Some(rv) = running_var {
        let vars: Vec<f64> = (0..c)
            .map(|ch| (0..n).map(|i| moments[i * c + ch].unbiased_var()).sum::<f64>() / n as f64)
            .collect();
        update_running(rv, &vars, momentum);
    }

    let out = normalize_ncs(
        &x,
        |i, ch| {
            let m = &moments[i * c + ch];
            (m.mean, m.inv_std(eps))
        },
        weight.as_deref(),
        bias.as_deref(),
    );
    into_input_shape(out, input.shape())
}

pub fn layer_norm(
    input: &ArrayD<f32>,
    normalized_shape: &[i64],
    weight: Option<&ArrayD<f32>>,
    bias: Option<&ArrayD<f32>>,
    eps: f64,
) -> KernelResult<ArrayD<f32>> {
    let shape = input.shape();
    let k = normalized_shape.len();
    let trailing_matches = k >= 1
        && k <= shape.len()
        && shape[shape.len() - k..]
            .iter()
            .zip(normalized_shape)
            .all(|(&d, &n)| n >= 0 && d == n as usize);
    if !trailing_matches {
        return Err(format!(
            "Given normalized_shape={:?}, expected input with shape [*, {}], but got input of size {:?}",
            normalized_shape,
            normalized_shape
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            shape
        ));
    }
    let trailing = &shape[shape.len() - k..];
    for (param, what) in [(weight, "weight"), (bias, "bias")] {
        if let Some(p) = param {
            if p.shape() != trailing {
                return Err(format!(
                    "Expected {} to be of same shape as normalized_shape, but got {} of shape {:?} and normalized_shape = {:?}",
                    what,
                    what,
                    p.shape(),
                    normalized_shape
                ));
            }
        }
    }

    let inner = trailing.iter().product::<usize>();
    let outer = shape[..shape.len() - k].iter().product::<usize>();
    let x = input
        .view()
        .into_shape((outer, inner))
        .map_err(|e| format!("layer_norm: {}", e))?;
    let flat = |p: Option<&ArrayD<f32>>| p.map(|p| p.iter().copied().collect::<Vec<f32>>());
    let weight = flat(weight);
    let bias = flat(bias);

    let mut out = Array2::<f32>::zeros((outer, inner));
    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(row, mut dst)| {
            let src = x.row(row);
            let m = Moments::of(src.iter());
            let inv_std = m.inv_std(eps);
            for (j, (o, &v)) in dst.iter_mut().zip(src.iter()).enumerate() {
                let w = weight.as_ref().map_or(1.0, |w| w[j] as f64);
                let b = bias.as_ref().map_or(0.0, |b| b[j] as f64);
                *o = ((v as f64 - m.mean) * inv_std * w + b) as f32;
            }
        });
    out.into_shape(shape).map_err(|e| e.to_string())
}

pub fn local_response_norm(input: &ArrayD<f32>, size: i64, alpha: f64, beta: f64, k: f64) -> KernelResult<ArrayD<f32>> {
    let x = as_ncs(input, "local_response_norm", 3)?;
    if size <= 0 {
        return Err(format!("local_response_norm: size must be positive, got {}", size));
    }
    let size = size as usize;
    let (n, c, s) = x.dim();
    let sq = x.mapv(|v| (v as f64) * (v as f64));
    let before = size / 2;
    let after = (size - 1) / 2;

    let mut out = Array3::<f32>::zeros((n, c, s));
    out.axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(i, mut sample)| {
            for ch in 0..c {
                let lo = ch.saturating_sub(before);
                let hi = (ch + after).min(c - 1);
                let window = sq.slice(s![i, lo..=hi, ..]).sum_axis(Axis(0));
                let src = x.slice(s![i, ch, ..]);
                for ((o, &v), &acc) in sample.row_mut(ch).iter_mut().zip(src.iter()).zip(window.iter()) {
                    let div = (k + alpha * acc / size as f64).powf(beta);
                    *o = (v as f64 / div) as f32;
                }
            }
        });
    into_input_shape(out, input.shape())
}
