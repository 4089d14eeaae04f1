use crate::tensor::ImageTensor;

/// One decoded image per batch element.
pub type ImageBatch = Vec<ImageTensor>;

/// Ordered model outputs, one batch per pyramid level, in the order the
/// model emits them.
pub type OutputPyramid = Vec<ImageBatch>;

/// The opaque network collaborator.
///
/// The training loop depends only on this capability interface, so
/// architecture variants can be swapped without touching the loop. The
/// parameter slice is the flat state the optimizer updates and the
/// checkpoint manager snapshots.
pub trait Model: Send {
    /// Number of pyramid levels `forward` emits.
    fn n_levels(&self) -> usize;

    /// Map an input batch to an ordered list of output batches at
    /// decreasing resolutions.
    fn forward(&mut self, input: &ImageBatch) -> OutputPyramid;

    /// Gradients of the loss with respect to `params`, given the loss
    /// gradient with respect to each pyramid level's outputs.
    fn backward(&mut self, input: &ImageBatch, grad_output: &OutputPyramid) -> Vec<f32>;

    fn params(&self) -> &[f32];

    fn params_mut(&mut self) -> &mut [f32];
}
