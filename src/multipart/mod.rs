//! Multipart bodies: the firmware upload encoder and the live-preview
//! reader.

mod encoder;
mod reader;

pub use encoder::{MultipartEncoder, ProgressTracker, UPLOAD_BOUNDARY, UPLOAD_CHUNK, UploadPart};
pub use reader::{FramePart, MultipartReader, boundary_from_content_type};
