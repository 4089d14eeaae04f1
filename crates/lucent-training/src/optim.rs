use serde::{Deserialize, Serialize};

/// Adam moment estimates, persisted inside checkpoints so a resumed run
/// continues from the exact optimizer state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdamState {
    pub t: u64,
    pub m: Vec<f32>,
    pub v: Vec<f32>,
}

/// Adam over a flat parameter vector.
pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub eps: f32,
    pub state: AdamState,
}

impl Adam {
    pub fn new() -> Self {
        Self { beta1: 0.9, beta2: 0.999, eps: 1e-8, state: AdamState::default() }
    }

    fn ensure_len(&mut self, len: usize) {
        if self.state.m.len() != len {
            self.state.m.resize(len, 0.0);
            self.state.v.resize(len, 0.0);
        }
    }

    pub fn step(&mut self, lr: f32, params: &mut [f32], grads: &[f32]) {
        debug_assert_eq!(params.len(), grads.len());
        self.ensure_len(params.len());

        self.state.t += 1;
        let t = self.state.t as f32;
        let bias1 = 1.0 - self.beta1.powf(t);
        let bias2 = 1.0 - self.beta2.powf(t);

        for i in 0..params.len() {
            let g = grads[i];
            self.state.m[i] = self.state.m[i] * self.beta1 + g * (1.0 - self.beta1);
            self.state.v[i] = self.state.v[i] * self.beta2 + g * g * (1.0 - self.beta2);

            let m_hat = self.state.m[i] / bias1;
            let v_hat = self.state.v[i] / bias2;

            params[i] -= lr * m_hat / (v_hat.sqrt() + self.eps);
        }
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonically non-increasing power-law decay from `initial` to `end`
/// over `max_steps`, evaluated at `step`.
///
/// Pure in `step`, so a resumed run continues the same decay curve the
/// uninterrupted run would have followed.
pub fn polynomial_decay(initial: f32, step: u64, max_steps: u64, end: f32, power: f32) -> f32 {
    if max_steps == 0 {
        return end;
    }
    let step = step.min(max_steps);
    let remaining = 1.0 - step as f32 / max_steps as f32;
    end + (initial - end) * remaining.powf(power)
}
