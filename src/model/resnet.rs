//! Residual Network Architecture for Tomato Leaf Disease Classification
//!
//! A ResNet-34 layout built with the Burn framework. Every block is a plain
//! module struct with a fixed `forward`; the network is the composition of
//! a stem, four residual stages and a softmax head.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    tensor::{
        activation::softmax,
        backend::Backend,
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
        Tensor,
    },
};

use crate::utils::error::TomatoError;

/// Pixel scale applied inside the graph before the stem
const PIXEL_SCALE: f32 = 1.0 / 255.0;

/// Configuration for the ResNet classifier
#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// Number of output classes
    #[config(default = "10")]
    pub num_classes: usize,

    /// Input image size (square). Inputs of any other size are resized.
    #[config(default = "256")]
    pub input_size: usize,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Filters of the 7x7 stem convolution
    #[config(default = "64")]
    pub stem_filters: usize,

    /// Channel width of each residual stage
    #[config(default = "vec![64, 128, 256, 512]")]
    pub stage_widths: Vec<usize>,

    /// Number of residual blocks in each stage
    #[config(default = "vec![3, 4, 6, 3]")]
    pub stage_depths: Vec<usize>,
}

impl ResNetConfig {
    /// Validate the configuration
    pub fn validate(&self) -> crate::utils::error::Result<()> {
        if self.num_classes == 0 {
            return Err(TomatoError::Config(
                "num_classes must be greater than 0".to_string(),
            ));
        }

        // The stem halves the input and the 3x3 max pool needs at least 3 pixels
        if self.input_size < 8 {
            return Err(TomatoError::Config(format!(
                "input_size must be at least 8, got {}",
                self.input_size
            )));
        }

        if self.in_channels == 0 || self.stem_filters == 0 {
            return Err(TomatoError::Config(
                "in_channels and stem_filters must be greater than 0".to_string(),
            ));
        }

        if self.stage_widths.is_empty() {
            return Err(TomatoError::Config(
                "at least one residual stage is required".to_string(),
            ));
        }

        if self.stage_widths.len() != self.stage_depths.len() {
            return Err(TomatoError::Config(format!(
                "stage_widths ({}) and stage_depths ({}) must have the same length",
                self.stage_widths.len(),
                self.stage_depths.len()
            )));
        }

        if self.stage_widths.contains(&0) || self.stage_depths.contains(&0) {
            return Err(TomatoError::Config(
                "stage widths and depths must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Build the network on the given device
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet<B> {
        ResNet::new(self, device)
    }

    /// Spatial size of the feature map entering the global pool
    pub fn feature_map_size(&self) -> usize {
        // Stem: 7x7, stride 2, padding 3
        let mut size = conv_output_size(self.input_size, 7, 2, 3);
        // Max pool: 3x3, stride 2, no padding
        size = conv_output_size(size, 3, 2, 0);

        // Every stage but the first opens with a stride-2 block
        for _ in 1..self.stage_widths.len() {
            size = conv_output_size(size, 3, 2, 1);
        }

        size
    }
}

/// Output size of a convolution or pooling window along one axis
pub fn conv_output_size(input: usize, kernel: usize, stride: usize, padding: usize) -> usize {
    (input + 2 * padding).saturating_sub(kernel) / stride + 1
}

/// Convolution -> BatchNorm -> ReLU
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
}

impl<B: Backend> ConvBlock<B> {
    /// Create a new convolutional block with "same"-style padding
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        let padding = kernel_size / 2;
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(padding, padding))
            .init(device);

        let bn = BatchNormConfig::new(out_channels).init(device);

        Self {
            conv,
            bn,
            relu: Relu::new(),
        }
    }

    /// Forward pass through the block
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        self.relu.forward(x)
    }
}

/// 1x1 convolution + BatchNorm that reshapes the input of a "dotted" block
#[derive(Module, Debug)]
pub struct Projection<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
}

impl<B: Backend> Projection<B> {
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [1, 1])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Valid)
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);

        Self { conv, bn }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Residual block: `relu(conv2(conv1(x)) + shortcut(x))`
///
/// The shortcut is the identity unless the block changes resolution or
/// channel count, in which case a [`Projection`] is used.
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    pub conv1: ConvBlock<B>,
    pub conv2: ConvBlock<B>,
    pub shortcut: Option<Projection<B>>,
    pub relu: Relu,
}

impl<B: Backend> ResidualBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let conv1 = ConvBlock::new(in_channels, out_channels, 3, stride, device);
        let conv2 = ConvBlock::new(out_channels, out_channels, 3, 1, device);

        let shortcut = if stride != 1 || in_channels != out_channels {
            Some(Projection::new(in_channels, out_channels, stride, device))
        } else {
            None
        };

        Self {
            conv1,
            conv2,
            shortcut,
            relu: Relu::new(),
        }
    }

    /// Whether the block projects its input before the addition
    pub fn is_dotted(&self) -> bool {
        self.shortcut.is_some()
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let residual = match &self.shortcut {
            Some(projection) => projection.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.conv1.forward(input);
        let x = self.conv2.forward(x);

        self.relu.forward(x + residual)
    }
}

/// A sequence of residual blocks sharing one channel width
#[derive(Module, Debug)]
pub struct ResidualStage<B: Backend> {
    pub blocks: Vec<ResidualBlock<B>>,
}

impl<B: Backend> ResidualStage<B> {
    /// The first block carries the stride and the channel change
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        depth: usize,
        stride: usize,
        device: &B::Device,
    ) -> Self {
        let blocks = (0..depth)
            .map(|i| {
                if i == 0 {
                    ResidualBlock::new(in_channels, out_channels, stride, device)
                } else {
                    ResidualBlock::new(out_channels, out_channels, 1, device)
                }
            })
            .collect();

        Self { blocks }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks.iter().fold(x, |x, block| block.forward(x))
    }
}

/// Tomato leaf disease classifier
///
/// Architecture:
/// - Input normalization (resize to `input_size`, rescale to [0, 1])
/// - Stem: 7x7/2 conv + BatchNorm + ReLU, 3x3/2 max pool
/// - Residual stages, stride 2 at the start of every stage but the first
/// - Global average pooling
/// - Fully connected softmax head
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    pub stem: ConvBlock<B>,
    pub max_pool: MaxPool2d,
    pub stages: Vec<ResidualStage<B>>,
    pub global_pool: AdaptiveAvgPool2d,
    pub fc: Linear<B>,

    input_size: usize,
    num_classes: usize,
}

impl<B: Backend> ResNet<B> {
    /// Create a new ResNet from configuration
    pub fn new(config: &ResNetConfig, device: &B::Device) -> Self {
        let stem = ConvBlock::new(config.in_channels, config.stem_filters, 7, 2, device);
        let max_pool = MaxPool2dConfig::new([3, 3]).with_strides([2, 2]).init();

        let mut in_channels = config.stem_filters;
        let stages = config
            .stage_widths
            .iter()
            .zip(&config.stage_depths)
            .enumerate()
            .map(|(i, (&width, &depth))| {
                let stride = if i == 0 { 1 } else { 2 };
                let stage = ResidualStage::new(in_channels, width, depth, stride, device);
                in_channels = width;
                stage
            })
            .collect();

        let global_pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let fc = LinearConfig::new(in_channels, config.num_classes).init(device);

        Self {
            stem,
            max_pool,
            stages,
            global_pool,
            fc,
            input_size: config.input_size,
            num_classes: config.num_classes,
        }
    }

    /// Resize to the configured resolution and rescale pixels to [0, 1]
    fn normalize_input(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = x.dims();

        let x = if height != self.input_size || width != self.input_size {
            interpolate(
                x,
                [self.input_size, self.input_size],
                InterpolateOptions::new(InterpolateMode::Bilinear),
            )
        } else {
            x
        };

        x.mul_scalar(PIXEL_SCALE)
    }

    /// Stem and residual stages: [B, 3, H, W] -> [B, C, h, w]
    pub fn forward_features(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.normalize_input(x);
        let x = self.stem.forward(x);
        let x = self.max_pool.forward(x);

        self.stages.iter().fold(x, |x, stage| stage.forward(x))
    }

    /// Forward pass returning raw class scores
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape [batch_size, 3, height, width], pixels in [0, 255]
    ///
    /// # Returns
    /// * Logits tensor of shape [batch_size, num_classes]
    pub fn forward_logits(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.forward_features(x);

        // Global pooling: [B, C, H, W] -> [B, C, 1, 1]
        let x = self.global_pool.forward(x);

        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        self.fc.forward(x)
    }

    /// Forward pass returning a probability distribution per image
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward_logits(x), 1)
    }

    /// Output shape after the stem and after each residual stage
    pub fn stage_shapes(&self, x: Tensor<B, 4>) -> Vec<[usize; 4]> {
        let x = self.normalize_input(x);
        let mut x = self.max_pool.forward(self.stem.forward(x));

        let mut shapes = vec![x.dims()];
        for stage in &self.stages {
            x = stage.forward(x);
            shapes.push(x.dims());
        }

        shapes
    }

    /// Get the number of output classes
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Get the expected input resolution
    pub fn input_size(&self) -> usize {
        self.input_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn tiny_config() -> ResNetConfig {
        ResNetConfig::new()
            .with_input_size(32)
            .with_stem_filters(4)
            .with_stage_widths(vec![4, 8, 8, 16])
            .with_stage_depths(vec![1, 2, 1, 1])
    }

    #[test]
    fn test_default_config_is_resnet34() {
        let config = ResNetConfig::new();
        assert_eq!(config.num_classes, 10);
        assert_eq!(config.input_size, 256);
        assert_eq!(config.stage_widths, vec![64, 128, 256, 512]);
        assert_eq!(config.stage_depths, vec![3, 4, 6, 3]);
        assert!(config.validate().is_ok());
        // 256 -> 128 (stem) -> 63 (pool) -> 63 -> 32 -> 16 -> 8
        assert_eq!(config.feature_map_size(), 8);
    }

    #[test]
    fn test_config_validation() {
        assert!(ResNetConfig::new().with_num_classes(0).validate().is_err());
        assert!(ResNetConfig::new().with_input_size(4).validate().is_err());
        assert!(ResNetConfig::new()
            .with_stage_depths(vec![3, 4])
            .validate()
            .is_err());
        assert!(ResNetConfig::new()
            .with_stage_widths(vec![])
            .with_stage_depths(vec![])
            .validate()
            .is_err());
    }

    #[test]
    fn test_identity_block_keeps_shape() {
        let device = Default::default();
        let block = ResidualBlock::<TestBackend>::new(8, 8, 1, &device);
        assert!(!block.is_dotted());

        let input = Tensor::<TestBackend, 4>::random([2, 8, 16, 16], Distribution::Default, &device);
        assert_eq!(block.forward(input).dims(), [2, 8, 16, 16]);
    }

    #[test]
    fn test_strided_block_halves_resolution() {
        let device = Default::default();
        let block = ResidualBlock::<TestBackend>::new(8, 16, 2, &device);
        assert!(block.is_dotted());

        let input = Tensor::<TestBackend, 4>::random([1, 8, 16, 16], Distribution::Default, &device);
        assert_eq!(block.forward(input).dims(), [1, 16, 8, 8]);
    }

    #[test]
    fn test_channel_change_uses_projection() {
        let device = Default::default();
        let block = ResidualBlock::<TestBackend>::new(4, 12, 1, &device);
        assert!(block.is_dotted());

        let input = Tensor::<TestBackend, 4>::random([1, 4, 10, 10], Distribution::Default, &device);
        assert_eq!(block.forward(input).dims(), [1, 12, 10, 10]);
    }

    #[test]
    fn test_stage_only_projects_first_block() {
        let device = Default::default();
        let stage = ResidualStage::<TestBackend>::new(8, 16, 3, 2, &device);
        let dotted: Vec<bool> = stage.blocks.iter().map(|b| b.is_dotted()).collect();
        assert_eq!(dotted, vec![true, false, false]);
    }

    #[test]
    fn test_output_is_probability_distribution() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::random(
            [3, 3, 32, 32],
            Distribution::Uniform(0.0, 255.0),
            &device,
        );
        let output = model.forward(input);
        assert_eq!(output.dims(), [3, 10]);

        let probs: Vec<f32> = output.into_data().to_vec().unwrap();
        for row in probs.chunks(10) {
            let sum: f32 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-4, "row sums to {}", sum);
            assert!(row.iter().all(|p| (0.0..=1.0).contains(p)));
        }
    }

    #[test]
    fn test_input_is_resized() {
        let device = Default::default();
        let config = tiny_config();
        let model = config.init::<TestBackend>(&device);

        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 50, 40], &device);
        let shapes = model.stage_shapes(input);

        // 32 -> 16 (stem) -> 7 (pool) -> 7 -> 4 -> 2 -> 1
        assert_eq!(shapes[0], [1, 4, 7, 7]);
        assert_eq!(shapes.last().copied(), Some([1, 16, 1, 1]));
        assert_eq!(config.feature_map_size(), 1);
    }

    #[test]
    fn test_config_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resnet.json");

        let config = tiny_config().with_num_classes(4);
        config.save(&path).unwrap();
        let loaded = ResNetConfig::load(&path).unwrap();

        assert_eq!(loaded.num_classes, 4);
        assert_eq!(loaded.input_size, 32);
        assert_eq!(loaded.stage_widths, config.stage_widths);
        assert_eq!(loaded.stage_depths, config.stage_depths);
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn test_conv_block_batch_norm_over_channels() {
        let device = Default::default();
        let block = ConvBlock::<TestBackend>::new(3, 6, 3, 2, &device);

        let input = Tensor::<TestBackend, 4>::random([2, 3, 9, 9], Distribution::Default, &device);
        let output = block.forward(input);
        assert_eq!(output.dims(), [2, 6, 5, 5]);

        let values: Vec<f32> = output.into_data().to_vec().unwrap();
        assert!(values.iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_conv_output_size() {
        assert_eq!(conv_output_size(256, 7, 2, 3), 128);
        assert_eq!(conv_output_size(128, 3, 2, 0), 63);
        assert_eq!(conv_output_size(63, 3, 2, 1), 32);
        assert_eq!(conv_output_size(63, 1, 2, 0), 32);
    }
}
