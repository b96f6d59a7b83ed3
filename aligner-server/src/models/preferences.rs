//! Edge-detection parameters
//!
//! Ranges follow what the external edge detector accepts: Gaussian and
//! morphological kernels are positive (the blur kernel must also be odd),
//! Canny thresholds are 8-bit gradient magnitudes with low <= high.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ValidationError;

pub const DEFAULT_GAUSSIAN_BLUR: i32 = 5;
pub const DEFAULT_CANNY_THRESHOLD_1: i32 = 30;
pub const DEFAULT_CANNY_THRESHOLD_2: i32 = 130;
pub const DEFAULT_MORPH_KERNEL_SIZE: i32 = 5;

const MAX_KERNEL_SIZE: i32 = 99;
const MAX_THRESHOLD: i32 = 255;

pub(crate) fn check_gaussian_blur(value: i32) -> Result<i32, ValidationError> {
    if value < 1 || value > MAX_KERNEL_SIZE || value % 2 == 0 {
        return Err(ValidationError::OutOfRange {
            field: "gaussianBlur",
            value: value.to_string(),
            expected: "an odd number between 1 and 99",
        });
    }
    Ok(value)
}

pub(crate) fn check_threshold(field: &'static str, value: i32) -> Result<i32, ValidationError> {
    if !(0..=MAX_THRESHOLD).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field,
            value: value.to_string(),
            expected: "0..=255",
        });
    }
    Ok(value)
}

pub(crate) fn check_threshold_order(low: i32, high: i32) -> Result<(), ValidationError> {
    if low > high {
        return Err(ValidationError::InvalidFormat {
            field: "cannyThreshold1",
            reason: "must not exceed cannyThreshold2",
        });
    }
    Ok(())
}

pub(crate) fn check_morph_kernel(value: i32) -> Result<i32, ValidationError> {
    if value < 1 || value > MAX_KERNEL_SIZE {
        return Err(ValidationError::OutOfRange {
            field: "morphKernelSize",
            value: value.to_string(),
            expected: "1..=99",
        });
    }
    Ok(value)
}

/// Validated edge-detection settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EdgeDetectionSettings {
    #[serde(rename = "gaussianBlur")]
    pub gaussian_blur: i32,
    #[serde(rename = "cannyThreshold1")]
    pub canny_threshold_1: i32,
    #[serde(rename = "cannyThreshold2")]
    pub canny_threshold_2: i32,
    #[serde(rename = "morphKernelSize")]
    pub morph_kernel_size: i32,
}

impl EdgeDetectionSettings {
    /// Build settings, rejecting values the edge detector cannot use.
    ///
    /// ```
    /// use aligner_server::models::EdgeDetectionSettings;
    ///
    /// assert!(EdgeDetectionSettings::new(5, 30, 130, 5).is_ok());
    /// assert!(EdgeDetectionSettings::new(4, 30, 130, 5).is_err()); // even blur
    /// assert!(EdgeDetectionSettings::new(5, 140, 130, 5).is_err()); // low > high
    /// ```
    pub fn new(
        gaussian_blur: i32,
        canny_threshold_1: i32,
        canny_threshold_2: i32,
        morph_kernel_size: i32,
    ) -> Result<Self, ValidationError> {
        let gaussian_blur = check_gaussian_blur(gaussian_blur)?;
        let canny_threshold_1 = check_threshold("cannyThreshold1", canny_threshold_1)?;
        let canny_threshold_2 = check_threshold("cannyThreshold2", canny_threshold_2)?;
        check_threshold_order(canny_threshold_1, canny_threshold_2)?;
        let morph_kernel_size = check_morph_kernel(morph_kernel_size)?;

        Ok(Self {
            gaussian_blur,
            canny_threshold_1,
            canny_threshold_2,
            morph_kernel_size,
        })
    }
}

impl Default for EdgeDetectionSettings {
    fn default() -> Self {
        Self {
            gaussian_blur: DEFAULT_GAUSSIAN_BLUR,
            canny_threshold_1: DEFAULT_CANNY_THRESHOLD_1,
            canny_threshold_2: DEFAULT_CANNY_THRESHOLD_2,
            morph_kernel_size: DEFAULT_MORPH_KERNEL_SIZE,
        }
    }
}

/// Unvalidated settings as sent by clients; missing or null fields take the
/// defaults, numeric strings are accepted
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDetectionParams {
    #[serde(default, deserialize_with = "super::lenient::opt_i32")]
    pub gaussian_blur: Option<i32>,
    #[serde(
        default,
        rename = "cannyThreshold1",
        deserialize_with = "super::lenient::opt_i32"
    )]
    pub canny_threshold_1: Option<i32>,
    #[serde(
        default,
        rename = "cannyThreshold2",
        deserialize_with = "super::lenient::opt_i32"
    )]
    pub canny_threshold_2: Option<i32>,
    #[serde(default, deserialize_with = "super::lenient::opt_i32")]
    pub morph_kernel_size: Option<i32>,
}

impl TryFrom<EdgeDetectionParams> for EdgeDetectionSettings {
    type Error = ValidationError;

    fn try_from(p: EdgeDetectionParams) -> Result<Self, Self::Error> {
        Self::new(
            p.gaussian_blur.unwrap_or(DEFAULT_GAUSSIAN_BLUR),
            p.canny_threshold_1.unwrap_or(DEFAULT_CANNY_THRESHOLD_1),
            p.canny_threshold_2.unwrap_or(DEFAULT_CANNY_THRESHOLD_2),
            p.morph_kernel_size.unwrap_or(DEFAULT_MORPH_KERNEL_SIZE),
        )
    }
}

/// Stored per-user preferences row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPreferences {
    pub preset_id: i64,
    pub user_id: i64,
    #[serde(flatten)]
    pub settings: EdgeDetectionSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
