//! Image records and the typed JSON columns stored with them

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::preferences::{
    check_gaussian_blur, check_morph_kernel, check_threshold, check_threshold_order,
};
use super::ValidationError;

/// Number of corners in a perspective selection
pub const CORNER_COUNT: usize = 4;

const MAX_FILENAME_LEN: usize = 255;

/// `type/subtype`, lowercase, as produced by browsers and multipart parsers
static MIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9!#$&^_.+-]*/[a-z0-9][a-z0-9!#$&^_.+-]*$")
        .expect("invalid mime regex")
});

/// A pixel-space point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// The four corners of a perspective selection, in the order they were picked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Point>", into = "Vec<Point>")]
pub struct CornerCoordinates([Point; CORNER_COUNT]);

impl CornerCoordinates {
    pub fn points(&self) -> &[Point; CORNER_COUNT] {
        &self.0
    }
}

impl TryFrom<Vec<Point>> for CornerCoordinates {
    type Error = ValidationError;

    fn try_from(points: Vec<Point>) -> Result<Self, Self::Error> {
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(ValidationError::InvalidFormat {
                field: "cornerCoordinates",
                reason: "coordinates must be finite numbers",
            });
        }

        let corners: [Point; CORNER_COUNT] =
            points
                .try_into()
                .map_err(|_| ValidationError::InvalidFormat {
                    field: "cornerCoordinates",
                    reason: "exactly 4 {x, y} points are required",
                })?;

        Ok(Self(corners))
    }
}

impl From<CornerCoordinates> for Vec<Point> {
    fn from(c: CornerCoordinates) -> Self {
        c.0.to_vec()
    }
}

/// Rotation and mirroring applied before perspective correction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "TransformationFields")]
pub struct Transformations {
    /// Degrees, in quarter turns
    pub rotation: i32,
    pub mirrored: bool,
}

impl Transformations {
    pub fn new(rotation: i32, mirrored: bool) -> Result<Self, ValidationError> {
        if rotation % 90 != 0 || !(-360..=360).contains(&rotation) {
            return Err(ValidationError::OutOfRange {
                field: "transformations.rotation",
                value: rotation.to_string(),
                expected: "a multiple of 90 between -360 and 360",
            });
        }
        Ok(Self { rotation, mirrored })
    }
}

impl TryFrom<TransformationFields> for Transformations {
    type Error = ValidationError;

    fn try_from(raw: TransformationFields) -> Result<Self, Self::Error> {
        Self::new(raw.rotation, raw.mirrored)
    }
}

/// Validated MIME type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeType(String);

impl MimeType {
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        let normalized = s.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(ValidationError::Empty { field: "mimeType" });
        }
        if !MIME_RE.is_match(&normalized) {
            return Err(ValidationError::InvalidFormat {
                field: "mimeType",
                reason: "must look like type/subtype",
            });
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Base64 pixel payload with its MIME type (`images_data` row)
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    pub base64_data: String,
    pub mime_type: MimeType,
    /// Decoded size in bytes
    pub file_size: i64,
}

impl ImagePayload {
    /// Accept base64 text, optionally wrapped in a `data:<mime>;base64,` URL.
    pub fn from_base64(data: &str, mime_type: MimeType) -> Result<Self, ValidationError> {
        let encoded = match data.strip_prefix("data:") {
            Some(rest) => rest
                .split_once(',')
                .map(|(_, body)| body)
                .ok_or(ValidationError::InvalidFormat {
                    field: "base64Data",
                    reason: "data URL has no payload",
                })?,
            None => data,
        }
        .trim();

        if encoded.is_empty() {
            return Err(ValidationError::Empty { field: "base64Data" });
        }

        let decoded = STANDARD
            .decode(encoded)
            .map_err(|_| ValidationError::InvalidFormat {
                field: "base64Data",
                reason: "not valid base64",
            })?;

        Ok(Self {
            base64_data: encoded.to_owned(),
            mime_type,
            file_size: decoded.len() as i64,
        })
    }

    /// Encode raw bytes from an upload.
    pub fn from_bytes(bytes: &[u8], mime_type: MimeType) -> Result<Self, ValidationError> {
        if bytes.is_empty() {
            return Err(ValidationError::Empty { field: "image" });
        }
        Ok(Self {
            base64_data: STANDARD.encode(bytes),
            mime_type,
            file_size: bytes.len() as i64,
        })
    }
}

/// Real-world size, corner selection, transformation and scale of an image.
/// Every stage is optional so a row can be filled in over several edits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageGeometry {
    pub real_width_mm: Option<f64>,
    pub real_height_mm: Option<f64>,
    pub corner_coordinates: Option<CornerCoordinates>,
    pub transformations: Option<Transformations>,
    pub x_ratio: Option<f64>,
    pub y_ratio: Option<f64>,
}

fn check_positive(field: &'static str, value: Option<f64>) -> Result<Option<f64>, ValidationError> {
    match value {
        Some(v) if !v.is_finite() || v <= 0.0 => Err(ValidationError::OutOfRange {
            field,
            value: v.to_string(),
            expected: "a positive number",
        }),
        other => Ok(other),
    }
}

/// Edge-detection parameters an image was exported with; each may be absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageEdgeParams {
    pub gaussian_blur: Option<i32>,
    pub canny_threshold_1: Option<i32>,
    pub canny_threshold_2: Option<i32>,
    pub morph_kernel_size: Option<i32>,
}

impl ImageEdgeParams {
    pub fn new(
        gaussian_blur: Option<i32>,
        canny_threshold_1: Option<i32>,
        canny_threshold_2: Option<i32>,
        morph_kernel_size: Option<i32>,
    ) -> Result<Self, ValidationError> {
        let gaussian_blur = gaussian_blur.map(check_gaussian_blur).transpose()?;
        let canny_threshold_1 = canny_threshold_1
            .map(|v| check_threshold("cannyThreshold1", v))
            .transpose()?;
        let canny_threshold_2 = canny_threshold_2
            .map(|v| check_threshold("cannyThreshold2", v))
            .transpose()?;
        if let (Some(low), Some(high)) = (canny_threshold_1, canny_threshold_2) {
            check_threshold_order(low, high)?;
        }
        let morph_kernel_size = morph_kernel_size.map(check_morph_kernel).transpose()?;

        Ok(Self {
            gaussian_blur,
            canny_threshold_1,
            canny_threshold_2,
            morph_kernel_size,
        })
    }
}

/// Everything needed to insert an image and its payload
#[derive(Debug, Clone, PartialEq)]
pub struct NewImage {
    pub user_id: i64,
    pub project_id: Option<i64>,
    pub filename: Option<String>,
    pub payload: ImagePayload,
    pub geometry: ImageGeometry,
    pub edge: ImageEdgeParams,
}

/// Replacement values for an existing image; absent fields are cleared
#[derive(Debug, Clone, PartialEq)]
pub struct ImageUpdate {
    pub user_id: i64,
    pub payload: ImagePayload,
    pub geometry: ImageGeometry,
    pub edge: ImageEdgeParams,
}

/// Ids generated by an insert, echoed with the submitted metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedImage {
    pub image_id: i64,
    pub image_data_id: i64,
    pub user_id: i64,
    pub project_id: Option<i64>,
    pub filename: Option<String>,
    pub mime_type: String,
    pub file_size: i64,
    pub real_width_mm: Option<f64>,
    pub real_height_mm: Option<f64>,
    pub corner_coordinates: Option<CornerCoordinates>,
    pub transformations: Option<Transformations>,
    pub x_ratio: Option<f64>,
    pub y_ratio: Option<f64>,
    pub gaussian_blur: Option<i32>,
    #[serde(rename = "cannyThreshold1")]
    pub canny_threshold_1: Option<i32>,
    #[serde(rename = "cannyThreshold2")]
    pub canny_threshold_2: Option<i32>,
    pub morph_kernel_size: Option<i32>,
}

impl CreatedImage {
    pub fn new(image_id: i64, image_data_id: i64, image: &NewImage) -> Self {
        Self {
            image_id,
            image_data_id,
            user_id: image.user_id,
            project_id: image.project_id,
            filename: image.filename.clone(),
            mime_type: image.payload.mime_type.as_str().to_owned(),
            file_size: image.payload.file_size,
            real_width_mm: image.geometry.real_width_mm,
            real_height_mm: image.geometry.real_height_mm,
            corner_coordinates: image.geometry.corner_coordinates.clone(),
            transformations: image.geometry.transformations,
            x_ratio: image.geometry.x_ratio,
            y_ratio: image.geometry.y_ratio,
            gaussian_blur: image.edge.gaussian_blur,
            canny_threshold_1: image.edge.canny_threshold_1,
            canny_threshold_2: image.edge.canny_threshold_2,
            morph_kernel_size: image.edge.morph_kernel_size,
        }
    }
}

/// Joined `images` + `images_data` row.
///
/// `base64_data` is only loaded for single-image reads; listings leave it out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Image {
    pub image_id: i64,
    pub id_user: i64,
    pub project_id: Option<i64>,
    pub id_image_data: i64,
    pub filename: Option<String>,
    pub real_width_mm: Option<f64>,
    pub real_height_mm: Option<f64>,
    pub corner_coordinates: Option<CornerCoordinates>,
    pub transformations: Option<Transformations>,
    pub x_ratio: Option<f64>,
    pub y_ratio: Option<f64>,
    pub gaussian_blur: Option<i32>,
    pub canny_threshold_1: Option<i32>,
    pub canny_threshold_2: Option<i32>,
    pub morph_kernel_size: Option<i32>,
    pub mime_type: String,
    pub file_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base64_data: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Image fields as sent by clients (JSON body or assembled from a multipart form)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFields {
    #[serde(default, deserialize_with = "super::lenient::opt_i64")]
    pub user_id: Option<i64>,
    #[serde(default, deserialize_with = "super::lenient::opt_i64")]
    pub project_id: Option<i64>,
    pub filename: Option<String>,
    pub base64_data: Option<String>,
    pub mime_type: Option<String>,
    #[serde(default, alias = "realWidth", deserialize_with = "super::lenient::opt_f64")]
    pub real_width_mm: Option<f64>,
    #[serde(default, alias = "realHeight", deserialize_with = "super::lenient::opt_f64")]
    pub real_height_mm: Option<f64>,
    pub corner_coordinates: Option<Vec<Point>>,
    pub transformations: Option<TransformationFields>,
    #[serde(default, deserialize_with = "super::lenient::opt_f64")]
    pub x_ratio: Option<f64>,
    #[serde(default, deserialize_with = "super::lenient::opt_f64")]
    pub y_ratio: Option<f64>,
    #[serde(default, deserialize_with = "super::lenient::opt_i32")]
    pub gaussian_blur: Option<i32>,
    #[serde(default, rename = "cannyThreshold1", deserialize_with = "super::lenient::opt_i32")]
    pub canny_threshold_1: Option<i32>,
    #[serde(default, rename = "cannyThreshold2", deserialize_with = "super::lenient::opt_i32")]
    pub canny_threshold_2: Option<i32>,
    #[serde(default, deserialize_with = "super::lenient::opt_i32")]
    pub morph_kernel_size: Option<i32>,
}

/// Unvalidated transformation record
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TransformationFields {
    #[serde(default)]
    pub rotation: i32,
    #[serde(default)]
    pub mirrored: bool,
}

impl ImageFields {
    fn require_user_id(&self) -> Result<i64, ValidationError> {
        match self.user_id {
            Some(id) if id > 0 => Ok(id),
            Some(id) => Err(ValidationError::OutOfRange {
                field: "userId",
                value: id.to_string(),
                expected: "a positive integer",
            }),
            None => Err(ValidationError::Missing { field: "userId" }),
        }
    }

    fn geometry(&self) -> Result<ImageGeometry, ValidationError> {
        Ok(ImageGeometry {
            real_width_mm: check_positive("realWidthMm", self.real_width_mm)?,
            real_height_mm: check_positive("realHeightMm", self.real_height_mm)?,
            corner_coordinates: self
                .corner_coordinates
                .clone()
                .map(CornerCoordinates::try_from)
                .transpose()?,
            transformations: self
                .transformations
                .map(Transformations::try_from)
                .transpose()?,
            x_ratio: check_positive("xRatio", self.x_ratio)?,
            y_ratio: check_positive("yRatio", self.y_ratio)?,
        })
    }

    fn edge(&self) -> Result<ImageEdgeParams, ValidationError> {
        ImageEdgeParams::new(
            self.gaussian_blur,
            self.canny_threshold_1,
            self.canny_threshold_2,
            self.morph_kernel_size,
        )
    }

    fn payload(&self) -> Result<ImagePayload, ValidationError> {
        let data = self
            .base64_data
            .as_deref()
            .ok_or(ValidationError::Missing { field: "base64Data" })?;
        let mime = self
            .mime_type
            .as_deref()
            .ok_or(ValidationError::Missing { field: "mimeType" })?;
        ImagePayload::from_base64(data, MimeType::new(mime)?)
    }

    fn filename(&self) -> Result<Option<String>, ValidationError> {
        match self.filename.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(name) if name.len() > MAX_FILENAME_LEN => Err(ValidationError::TooLong {
                field: "filename",
                max: MAX_FILENAME_LEN,
            }),
            Some(name) => Ok(Some(name.to_owned())),
        }
    }

    /// Validate into an insertable image.
    pub fn into_new_image(self) -> Result<NewImage, ValidationError> {
        self.require_user_id()?;
        let payload = self.payload()?;
        self.with_payload(payload)
    }

    /// Validate the metadata and attach a payload decoded elsewhere
    /// (multipart uploads carry raw bytes instead of `base64Data`).
    pub fn with_payload(self, payload: ImagePayload) -> Result<NewImage, ValidationError> {
        Ok(NewImage {
            user_id: self.require_user_id()?,
            project_id: self.project_id,
            filename: self.filename()?,
            payload,
            geometry: self.geometry()?,
            edge: self.edge()?,
        })
    }

    /// Validate into a full replacement of an existing image.
    pub fn into_update(self) -> Result<ImageUpdate, ValidationError> {
        Ok(ImageUpdate {
            user_id: self.require_user_id()?,
            payload: self.payload()?,
            geometry: self.geometry()?,
            edge: self.edge()?,
        })
    }
}
