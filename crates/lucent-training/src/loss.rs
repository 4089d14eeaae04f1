use crate::error::TrainingResult;
use crate::model::{ImageBatch, OutputPyramid};
use crate::summary::SummarySink;
use crate::tensor::ImageTensor;

/// Scalar loss plus its gradient with respect to each pyramid level's
/// outputs, produced in one pass.
pub struct LossOutput {
    pub total: f32,
    pub grad: OutputPyramid,
}

/// Multi-scale reconstruction loss.
///
/// For each pyramid level in emission order, the ground truth is resized
/// to the level's exact resolution and compared by mean squared error;
/// per-level errors are summed with no weighting. Each level's first
/// output image and the total loss are recorded to the sink.
pub fn evaluate(
    outputs: &OutputPyramid,
    ground_truth: &ImageBatch,
    step: u64,
    sink: &mut dyn SummarySink,
) -> TrainingResult<LossOutput> {
    let mut total = 0.0f32;
    let mut grad: OutputPyramid = Vec::with_capacity(outputs.len());

    for (level, batch_out) in outputs.iter().enumerate() {
        let n = level_element_count(batch_out);
        let mut level_grad: ImageBatch = Vec::with_capacity(batch_out.len());
        let mut level_sum = 0.0f64;

        for (out, gt) in batch_out.iter().zip(ground_truth) {
            let gt_resized = gt.resize_bilinear(out.height, out.width);
            let mut g = ImageTensor::zeros(out.height, out.width);
            for i in 0..out.data.len() {
                let diff = out.data[i] - gt_resized.data[i];
                level_sum += f64::from(diff) * f64::from(diff);
                g.data[i] = 2.0 * diff / n;
            }
            level_grad.push(g);
        }

        let level_loss = (level_sum / f64::from(n)) as f32;
        total += level_loss;
        grad.push(level_grad);

        if let Some(first) = batch_out.first() {
            sink.image(step, &format!("out_{level}"), first)?;
        }
    }

    sink.scalar(step, "loss_total", total)?;
    Ok(LossOutput { total, grad })
}

fn level_element_count(batch: &ImageBatch) -> f32 {
    let n: usize = batch.iter().map(ImageTensor::len).sum();
    n.max(1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::NullSink;

    fn constant_image(height: usize, width: usize, value: f32) -> ImageTensor {
        let mut img = ImageTensor::zeros(height, width);
        for v in &mut img.data {
            *v = value;
        }
        img
    }

    fn pyramid_matching(gt: &ImageTensor, levels: usize) -> OutputPyramid {
        (0..levels)
            .map(|i| {
                let size = gt.height >> i;
                vec![gt.resize_bilinear(size, size)]
            })
            .collect()
    }

    #[test]
    fn test_exact_match_gives_zero_loss() {
        let gt = constant_image(16, 16, 0.5);
        let outputs = pyramid_matching(&gt, 3);
        let result = evaluate(&outputs, &vec![gt], 0, &mut NullSink).unwrap();
        assert!(result.total.abs() < 1e-6);
    }

    #[test]
    fn test_constant_offset_sums_per_level_mse() {
        let c = 0.1f32;
        let gt = constant_image(16, 16, 0.5);
        let outputs: OutputPyramid = (0..3)
            .map(|i| {
                let size = 16usize >> i;
                vec![constant_image(size, size, 0.5 + c)]
            })
            .collect();

        let result = evaluate(&outputs, &vec![gt], 0, &mut NullSink).unwrap();
        // MSE is c^2 per level, summed over 3 levels.
        assert!((result.total - 3.0 * c * c).abs() < 1e-5, "got {}", result.total);
    }

    #[test]
    fn test_gradient_matches_mse_derivative() {
        let gt = constant_image(4, 4, 0.0);
        let out = constant_image(4, 4, 1.0);
        let n = out.data.len() as f32;
        let result = evaluate(&vec![vec![out]], &vec![gt], 0, &mut NullSink).unwrap();
        for &g in &result.grad[0][0].data {
            assert!((g - 2.0 / n).abs() < 1e-6);
        }
    }

    #[test]
    fn test_uneven_downscale_is_not_an_error() {
        // 15x15 ground truth against a 7x7 level output.
        let gt = constant_image(15, 15, 0.3);
        let outputs = vec![vec![constant_image(7, 7, 0.3)]];
        let result = evaluate(&outputs, &vec![gt], 0, &mut NullSink).unwrap();
        assert!(result.total.abs() < 1e-6);
    }
}
