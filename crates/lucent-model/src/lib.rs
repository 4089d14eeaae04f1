//! Lucent Model
//!
//! A minimal trainable restoration collaborator for the training loop.
//!
//! `AffineRestorer` applies a learned per-channel gain and bias to the
//! input and emits an n-level output pyramid by repeated 2x average
//! pooling, with analytic gradients. It exists so the `lucent` binary is
//! runnable end to end and the loop is testable against a concrete
//! `Model`; real encoder-decoder architectures implement the same trait.

use lucent_training::model::{ImageBatch, Model, OutputPyramid};
use lucent_training::tensor::ImageTensor;

const CHANNELS: usize = ImageTensor::CHANNELS;

/// Per-channel affine restorer: `y_c = gain_c * x_c + bias_c`.
///
/// Parameter layout: `[gain_r, gain_g, gain_b, bias_r, bias_g, bias_b]`.
/// Initialized to the identity mapping (gain 1, bias 0).
pub struct AffineRestorer {
    n_levels: usize,
    params: Vec<f32>,
}

impl AffineRestorer {
    pub fn new(n_levels: usize) -> Self {
        let mut params = vec![0.0f32; 2 * CHANNELS];
        for gain in params.iter_mut().take(CHANNELS) {
            *gain = 1.0;
        }
        Self { n_levels, params }
    }

    fn apply_affine(&self, input: &ImageTensor) -> ImageTensor {
        let mut out = ImageTensor::zeros(input.height, input.width);
        for i in 0..input.data.len() {
            let c = i % CHANNELS;
            out.data[i] = self.params[c] * input.data[i] + self.params[CHANNELS + c];
        }
        out
    }
}

/// 2x average pooling; odd edges pool their remaining valid window.
fn avg_pool2(input: &ImageTensor) -> ImageTensor {
    let out_h = input.height.div_ceil(2);
    let out_w = input.width.div_ceil(2);
    let mut out = ImageTensor::zeros(out_h, out_w);
    for y in 0..out_h {
        let y_end = (y * 2 + 2).min(input.height);
        for x in 0..out_w {
            let x_end = (x * 2 + 2).min(input.width);
            let count = ((y_end - y * 2) * (x_end - x * 2)) as f32;
            for c in 0..CHANNELS {
                let mut sum = 0.0;
                for yy in y * 2..y_end {
                    for xx in x * 2..x_end {
                        sum += input.get(yy, xx, c);
                    }
                }
                out.set(y, x, c, sum / count);
            }
        }
    }
    out
}

/// Adjoint of `avg_pool2`: distribute each pooled gradient evenly over its
/// source window.
fn avg_unpool2(grad: &ImageTensor, target_h: usize, target_w: usize) -> ImageTensor {
    let mut out = ImageTensor::zeros(target_h, target_w);
    for y in 0..grad.height {
        let y_end = (y * 2 + 2).min(target_h);
        for x in 0..grad.width {
            let x_end = (x * 2 + 2).min(target_w);
            let count = ((y_end - y * 2) * (x_end - x * 2)) as f32;
            for c in 0..CHANNELS {
                let share = grad.get(y, x, c) / count;
                for yy in y * 2..y_end {
                    for xx in x * 2..x_end {
                        let v = out.get(yy, xx, c) + share;
                        out.set(yy, xx, c, v);
                    }
                }
            }
        }
    }
    out
}

impl Model for AffineRestorer {
    fn n_levels(&self) -> usize {
        self.n_levels
    }

    fn forward(&mut self, input: &ImageBatch) -> OutputPyramid {
        let mut levels: OutputPyramid = Vec::with_capacity(self.n_levels);
        let full: ImageBatch = input.iter().map(|img| self.apply_affine(img)).collect();
        levels.push(full);
        for level in 1..self.n_levels {
            let prev = &levels[level - 1];
            levels.push(prev.iter().map(avg_pool2).collect());
        }
        levels
    }

    fn backward(&mut self, input: &ImageBatch, grad_output: &OutputPyramid) -> Vec<f32> {
        let mut grads = vec![0.0f32; self.params.len()];
        for (element, img_in) in input.iter().enumerate() {
            // Pull every level's gradient back to the full-resolution
            // affine output.
            let mut grad_y = ImageTensor::zeros(img_in.height, img_in.width);
            for level_grads in grad_output {
                let mut g = level_grads[element].clone();
                while g.height < grad_y.height || g.width < grad_y.width {
                    let (th, tw) = unpool_target(g.height, g.width, grad_y.height, grad_y.width);
                    g = avg_unpool2(&g, th, tw);
                }
                for i in 0..grad_y.data.len() {
                    grad_y.data[i] += g.data[i];
                }
            }
            for i in 0..grad_y.data.len() {
                let c = i % CHANNELS;
                grads[c] += grad_y.data[i] * img_in.data[i];
                grads[CHANNELS + c] += grad_y.data[i];
            }
        }
        grads
    }

    fn params(&self) -> &[f32] {
        &self.params
    }

    fn params_mut(&mut self) -> &mut [f32] {
        &mut self.params
    }
}

/// Dimensions one unpool hop up from `(h, w)`, capped at the full
/// resolution.
fn unpool_target(h: usize, w: usize, full_h: usize, full_w: usize) -> (usize, usize) {
    ((h * 2).min(full_h), (w * 2).min(full_w))
}
