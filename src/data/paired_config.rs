//! Keyword configuration of the paired-image pipeline and its resolution
//! into named transformation nodes.
//!
//! Every keyword is optional except `image_size`. [`PairedTransformKwargs::resolve`]
//! materializes the defaults in dependency order (`crop_size` defaults to
//! `image_size`, the downsample augmentation targets `crop_size`, ...) and
//! rewrites every augmentation whose settings make it a no-op into an
//! `Identity` node, so the node set and order never depend on which
//! features are enabled.

use crate::error::{DataWarning, PipelineError, PipelineResult};
use crate::transforms::{HsvJittering, NodeSpec, TransformConfig, TransformParams};
use serde::{Deserialize, Serialize};

/// Node names in application order.
pub const NODE_NAMES: &[&str] = &[
    "decode_A",
    "decode_B",
    "center_crop",
    "resize",
    "random_region_brightness",
    "random_affine",
    "random_crop",
    "random_flip",
    "random_hsv",
    "random_hsv_B",
    "random_blur_sharpen",
    "random_compress",
    "random_downsample",
    "normalize",
];

type Range = (f32, f32);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairedTransformKwargs {
    // basic
    pub image_size: Option<usize>,
    #[serde(rename = "image_channels_A")]
    pub image_channels_a: Option<usize>,
    #[serde(rename = "image_channels_B")]
    pub image_channels_b: Option<usize>,
    pub pre_crop_size: Option<usize>,

    // region brightness
    pub rb_prob: Option<f32>,
    pub rb_brightness_change: Option<f32>,
    pub rb_center_x_range: Option<Range>,
    pub rb_center_y_range: Option<Range>,
    pub rb_num_vertices: Option<usize>,
    pub rb_radius_range: Option<Range>,
    pub rb_spikyness_range: Option<Range>,
    pub rb_irregularity_range: Option<Range>,
    pub rb_max_blur_kernel_ratio: Option<f32>,
    pub rb_min_blur_kernel_size: Option<usize>,
    pub rb_blur_x_std: Option<f32>,
    pub rb_blur_y_std: Option<f32>,
    pub rb_prefetch_queue_depth: Option<usize>,

    // affine
    pub ra_prob: Option<f32>,
    pub ra_rotation_range: Option<Range>,
    pub ra_scale_range: Option<Range>,
    pub ra_tx_range: Option<Range>,
    pub ra_ty_range: Option<Range>,
    pub ra_prefetch_queue_depth: Option<usize>,

    // crop and flip
    pub crop_size: Option<usize>,
    pub hflip_prob: Option<f32>,
    pub vflip_prob: Option<f32>,

    // HSV
    pub hsv_param: Option<[f32; 6]>,
    #[serde(rename = "hsv_param_B")]
    pub hsv_param_b: Option<[f32; 6]>,
    #[serde(rename = "hsv_aug_B")]
    pub hsv_aug_b: Option<bool>,
    pub separate_hsv_aug: Option<bool>,

    // image A only
    pub blur_prob: Option<f32>,
    pub sharpen_prob: Option<f32>,
    pub rbs_kernel_range: Option<Range>,
    pub rbs_sharpen_range: Option<Range>,
    pub rc_prob: Option<f32>,
    pub rc_quality_range: Option<Range>,
    pub rd_prob: Option<f32>,
    pub rd_down_range: Option<Range>,

    // output range
    pub min_val: Option<f32>,
    pub max_val: Option<f32>,
}

/// Effective keyword values after defaults are filled in and checked.
///
/// Serializes with the same key names as [`PairedTransformKwargs`], so it can
/// be reported next to (or fed back as) the original keywords.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairedTransformSettings {
    pub image_size: usize,
    #[serde(rename = "image_channels_A")]
    pub image_channels_a: usize,
    #[serde(rename = "image_channels_B")]
    pub image_channels_b: usize,
    pub pre_crop_size: Option<usize>,

    /// Zeroed by [`PairedTransformKwargs::resolve`] when the channel counts differ.
    pub rb_prob: f32,
    pub rb_brightness_change: f32,
    pub rb_center_x_range: Range,
    pub rb_center_y_range: Range,
    pub rb_num_vertices: usize,
    pub rb_radius_range: Range,
    pub rb_spikyness_range: Range,
    pub rb_irregularity_range: Range,
    pub rb_max_blur_kernel_ratio: f32,
    pub rb_min_blur_kernel_size: usize,
    pub rb_blur_x_std: f32,
    pub rb_blur_y_std: Option<f32>,
    pub rb_prefetch_queue_depth: usize,

    pub ra_prob: f32,
    pub ra_rotation_range: Range,
    pub ra_scale_range: Range,
    pub ra_tx_range: Range,
    pub ra_ty_range: Range,
    pub ra_prefetch_queue_depth: usize,

    pub crop_size: usize,
    pub hflip_prob: f32,
    pub vflip_prob: f32,

    pub hsv_param: [f32; 6],
    #[serde(rename = "hsv_param_B")]
    pub hsv_param_b: [f32; 6],
    #[serde(rename = "hsv_aug_B")]
    pub hsv_aug_b: bool,
    pub separate_hsv_aug: bool,

    pub blur_prob: f32,
    pub sharpen_prob: f32,
    pub rbs_kernel_range: Range,
    pub rbs_sharpen_range: Range,
    pub rc_prob: f32,
    pub rc_quality_range: Range,
    pub rd_prob: f32,
    pub rd_down_range: Range,

    pub min_val: f32,
    pub max_val: f32,
}

/// Output of [`PairedTransformKwargs::resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPairedConfig {
    pub settings: PairedTransformSettings,
    pub transform_config: TransformConfig,
    pub warnings: Vec<DataWarning>,
}

fn spec(transform_type: &str, params: TransformParams) -> NodeSpec {
    NodeSpec::new(transform_type, params)
}

fn spec_unless(disabled: bool, transform_type: &str, params: TransformParams) -> NodeSpec {
    if disabled {
        NodeSpec::identity()
    } else {
        spec(transform_type, params)
    }
}

fn split_hsv(param: [f32; 6]) -> TransformParams {
    TransformParams::new()
        .with("h_range", (param[0], param[1]))
        .with("s_range", (param[2], param[3]))
        .with("v_range", (param[4], param[5]))
}

fn finite(key: &str, value: f32) -> PipelineResult<f32> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(PipelineError::invalid_param("PairedDataset", key, format!("must be finite, got {value}")))
    }
}

fn finite_range(key: &str, range: Range) -> PipelineResult<Range> {
    finite(key, range.0)?;
    finite(key, range.1)?;
    Ok(range)
}

fn finite_hsv(key: &str, param: [f32; 6]) -> PipelineResult<[f32; 6]> {
    for value in param {
        finite(key, value)?;
    }
    Ok(param)
}

impl PairedTransformKwargs {
    pub fn new(image_size: usize) -> Self {
        Self {
            image_size: Some(image_size),
            ..Self::default()
        }
    }

    /// Fills in every default and checks the values that do not depend on
    /// other keywords' node parameters. The channel guard is applied by
    /// [`resolve`](Self::resolve), not here.
    pub fn settings(&self) -> PipelineResult<PairedTransformSettings> {
        let image_size = self.image_size.ok_or_else(|| PipelineError::MissingParameter {
            transform: "PairedDataset".to_string(),
            param: "image_size".to_string(),
        })?;
        if image_size == 0 {
            return Err(PipelineError::invalid_param("PairedDataset", "image_size", "must be positive"));
        }
        let crop_size = self.crop_size.unwrap_or(image_size);
        if crop_size == 0 || crop_size > image_size {
            return Err(PipelineError::invalid_param(
                "PairedDataset",
                "crop_size",
                format!("must be in 1..={image_size} (image_size), got {crop_size}"),
            ));
        }

        Ok(PairedTransformSettings {
            image_size,
            image_channels_a: self.image_channels_a.unwrap_or(3),
            image_channels_b: self.image_channels_b.unwrap_or(3),
            pre_crop_size: self.pre_crop_size,

            rb_prob: finite("rb_prob", self.rb_prob.unwrap_or(0.0))?,
            rb_brightness_change: finite("rb_brightness_change", self.rb_brightness_change.unwrap_or(0.6))?,
            rb_center_x_range: finite_range("rb_center_x_range", self.rb_center_x_range.unwrap_or((0.2, 0.8)))?,
            rb_center_y_range: finite_range("rb_center_y_range", self.rb_center_y_range.unwrap_or((0.25, 0.75)))?,
            rb_num_vertices: self.rb_num_vertices.unwrap_or(40),
            rb_radius_range: finite_range("rb_radius_range", self.rb_radius_range.unwrap_or((0.0, 0.25)))?,
            rb_spikyness_range: finite_range("rb_spikyness_range", self.rb_spikyness_range.unwrap_or((0.1, 0.1)))?,
            rb_irregularity_range: finite_range(
                "rb_irregularity_range",
                self.rb_irregularity_range.unwrap_or((0.0, 1.0)),
            )?,
            rb_max_blur_kernel_ratio: finite(
                "rb_max_blur_kernel_ratio",
                self.rb_max_blur_kernel_ratio.unwrap_or(0.025),
            )?,
            rb_min_blur_kernel_size: self.rb_min_blur_kernel_size.unwrap_or(3),
            rb_blur_x_std: finite("rb_blur_x_std", self.rb_blur_x_std.unwrap_or(3.0))?,
            rb_blur_y_std: self.rb_blur_y_std.map(|std| finite("rb_blur_y_std", std)).transpose()?,
            rb_prefetch_queue_depth: self.rb_prefetch_queue_depth.unwrap_or(32),

            ra_prob: finite("ra_prob", self.ra_prob.unwrap_or(0.0))?,
            ra_rotation_range: finite_range("ra_rotation_range", self.ra_rotation_range.unwrap_or((-15.0, 15.0)))?,
            ra_scale_range: finite_range("ra_scale_range", self.ra_scale_range.unwrap_or((0.95, 1.05)))?,
            ra_tx_range: finite_range("ra_tx_range", self.ra_tx_range.unwrap_or((-0.02, 0.02)))?,
            ra_ty_range: finite_range("ra_ty_range", self.ra_ty_range.unwrap_or((-0.02, 0.02)))?,
            ra_prefetch_queue_depth: self.ra_prefetch_queue_depth.unwrap_or(32),

            crop_size,
            hflip_prob: finite("hflip_prob", self.hflip_prob.unwrap_or(0.0))?,
            vflip_prob: finite("vflip_prob", self.vflip_prob.unwrap_or(0.0))?,

            hsv_param: finite_hsv("hsv_param", self.hsv_param.unwrap_or(HsvJittering::NEUTRAL))?,
            hsv_param_b: finite_hsv("hsv_param_B", self.hsv_param_b.unwrap_or(HsvJittering::NEUTRAL))?,
            hsv_aug_b: self.hsv_aug_b.unwrap_or(false),
            separate_hsv_aug: self.separate_hsv_aug.unwrap_or(false),

            blur_prob: finite("blur_prob", self.blur_prob.unwrap_or(0.0))?,
            sharpen_prob: finite("sharpen_prob", self.sharpen_prob.unwrap_or(0.0))?,
            rbs_kernel_range: finite_range("rbs_kernel_range", self.rbs_kernel_range.unwrap_or((3.0, 7.0)))?,
            rbs_sharpen_range: finite_range("rbs_sharpen_range", self.rbs_sharpen_range.unwrap_or((1.5, 2.0)))?,
            rc_prob: finite("rc_prob", self.rc_prob.unwrap_or(0.0))?,
            rc_quality_range: finite_range("rc_quality_range", self.rc_quality_range.unwrap_or((40.0, 60.0)))?,
            rd_prob: finite("rd_prob", self.rd_prob.unwrap_or(0.0))?,
            rd_down_range: finite_range("rd_down_range", self.rd_down_range.unwrap_or((1.0, 2.5)))?,

            min_val: finite("min_val", self.min_val.unwrap_or(-1.0))?,
            max_val: finite("max_val", self.max_val.unwrap_or(1.0))?,
        })
    }

    /// Single resolution pass into named node specs, in [`NODE_NAMES`] order.
    pub fn resolve(&self) -> PipelineResult<ResolvedPairedConfig> {
        let mut s = self.settings()?;
        let mut config = TransformConfig::new();
        let mut warnings = Vec::new();

        // decode
        for (name, channels) in [("decode_A", s.image_channels_a), ("decode_B", s.image_channels_b)] {
            let params = TransformParams::new()
                .with("image_channels", channels)
                .with("return_square", false)
                .with("center_crop", false);
            config.set(name, spec("Decode", params));
        }

        // pre-crop and resize
        config.set(
            "center_crop",
            match s.pre_crop_size {
                Some(size) => spec("CenterCrop", TransformParams::new().with("crop_size", size)),
                None => NodeSpec::identity(),
            },
        );
        config.set("resize", spec("Resize", TransformParams::new().with("image_size", s.image_size)));

        // region brightness
        if s.rb_prob != 0.0 && s.image_channels_a != s.image_channels_b {
            warnings.push(DataWarning::new(
                "rb_channel_mismatch",
                format!(
                    "random region brightness is disabled: image A has {} channels \
                     but image B has {}, and one mask cannot serve both",
                    s.image_channels_a, s.image_channels_b
                ),
            ));
            s.rb_prob = 0.0;
        }
        let rb_params = TransformParams::new()
            .with("image_size", s.image_size)
            .with("image_channels", s.image_channels_a)
            .with("prob", s.rb_prob)
            .with("brightness_change", s.rb_brightness_change)
            .with("center_x_range", s.rb_center_x_range)
            .with("center_y_range", s.rb_center_y_range)
            .with("num_vertices", s.rb_num_vertices)
            .with("radius_range", s.rb_radius_range)
            .with("spikyness_range", s.rb_spikyness_range)
            .with("irregularity_range", s.rb_irregularity_range)
            .with("max_blur_kernel_ratio", s.rb_max_blur_kernel_ratio)
            .with("min_blur_kernel_size", s.rb_min_blur_kernel_size)
            .with("blur_x_std", s.rb_blur_x_std)
            .with("blur_y_std", s.rb_blur_y_std)
            .with("prefetch_queue_depth", s.rb_prefetch_queue_depth);
        config.set("random_region_brightness", spec_unless(s.rb_prob == 0.0, "RegionBrightness", rb_params));

        // affine
        let ra_params = TransformParams::new()
            .with("image_size", s.image_size)
            .with("prob", s.ra_prob)
            .with("rotation_range", s.ra_rotation_range)
            .with("scale_range", s.ra_scale_range)
            .with("tx_range", s.ra_tx_range)
            .with("ty_range", s.ra_ty_range)
            .with("prefetch_queue_depth", s.ra_prefetch_queue_depth);
        config.set("random_affine", spec_unless(s.ra_prob == 0.0, "AffineTransform", ra_params));

        // random crop
        config.set(
            "random_crop",
            spec_unless(
                s.crop_size == s.image_size,
                "RandomCrop",
                TransformParams::new().with("crop_size", s.crop_size),
            ),
        );

        // flip
        config.set(
            "random_flip",
            spec_unless(
                s.hflip_prob == 0.0 && s.vflip_prob == 0.0,
                "Flip",
                TransformParams::new()
                    .with("horizontal_prob", s.hflip_prob)
                    .with("vertical_prob", s.vflip_prob),
            ),
        );

        // HSV
        config.set(
            "random_hsv",
            spec_unless(s.hsv_param == HsvJittering::NEUTRAL, "HSVJittering", split_hsv(s.hsv_param)),
        );
        match (s.hsv_aug_b, s.separate_hsv_aug) {
            (false, _) => config.set("random_hsv_B", NodeSpec::identity()),
            // B goes through `random_hsv` together with A
            (true, false) => {}
            (true, true) => config.set(
                "random_hsv_B",
                spec_unless(s.hsv_param_b == HsvJittering::NEUTRAL, "HSVJittering", split_hsv(s.hsv_param_b)),
            ),
        }

        // image A only
        config.set(
            "random_blur_sharpen",
            spec_unless(
                s.blur_prob == 0.0 && s.sharpen_prob == 0.0,
                "BlurAndSharpen",
                TransformParams::new()
                    .with("blur_prob", s.blur_prob)
                    .with("sharpen_prob", s.sharpen_prob)
                    .with("kernel_range", s.rbs_kernel_range)
                    .with("sharpen_range", s.rbs_sharpen_range),
            ),
        );
        config.set(
            "random_compress",
            spec_unless(
                s.rc_prob == 0.0,
                "JpegCompress",
                TransformParams::new()
                    .with("prob", s.rc_prob)
                    .with("quality_range", s.rc_quality_range),
            ),
        );
        config.set(
            "random_downsample",
            spec_unless(
                s.rd_prob == 0.0,
                "ResizeAug",
                TransformParams::new()
                    .with("image_size", s.crop_size)
                    .with("prob", s.rd_prob)
                    .with("down_range", s.rd_down_range),
            ),
        );

        // output range
        config.set(
            "normalize",
            spec(
                "Normalize",
                TransformParams::new()
                    .with("min_val", s.min_val)
                    .with("max_val", s.max_val),
            ),
        );

        Ok(ResolvedPairedConfig {
            settings: s,
            transform_config: config,
            warnings,
        })
    }
}
