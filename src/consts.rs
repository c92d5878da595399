//! Project-wide constants.

/// Default Gemini model when none is specified.
pub const DEFAULT_MODEL: &str = "gemini-1.5-pro";

/// Public Gemini REST host.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5000;

/// Body of `GET /`.
pub const STATUS_TEXT: &str = "🌾 Gemini 1.5 Farmer Chatbot is running!";

/// Error payload for a missing or empty query.
pub const NO_QUERY_MESSAGE: &str = "No query provided";

// Classifier defaults. The class id is the model's index for cotton.
pub const DEFAULT_DETECTOR_MODEL: &str = "best.onnx";
pub const DEFAULT_IMAGE: &str = "banana.png";
pub const DEFAULT_TARGET_CLASS: u32 = 10;

pub const DEFAULT_CONF_THRESHOLD: f32 = 0.25;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
pub const DEFAULT_AGNOSTIC_NMS: bool = false;
pub const DEFAULT_MAX_DETECTIONS: usize = 1000;
pub const DEFAULT_INPUT_SIZE: u32 = 640;
