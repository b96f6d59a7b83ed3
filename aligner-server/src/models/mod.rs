//! Domain models with validation at construction
//!
//! All client input is validated when creating these types.
//! Invalid input returns ValidationError, not panic.

pub mod image;
pub mod lenient;
pub mod preferences;
pub mod user;
pub mod validation;

pub use image::{
    CornerCoordinates, CreatedImage, Image, ImageEdgeParams, ImageFields, ImageGeometry,
    ImagePayload, ImageUpdate, MimeType, NewImage, Point, TransformationFields, Transformations,
};
pub use preferences::{EdgeDetectionParams, EdgeDetectionSettings, SavedPreferences};
pub use user::{ExternalId, RegisteredUser, User};
pub use validation::ValidationError;
