use serde::{Serialize, Deserialize};
use serde_with::skip_serializing_none;

pub const ASPECT_RATIOS: &[&str] = &[
    "Cinematic (16:9)",
    "Portrait (9:16)",
    "Square (1:1)",
    "Widescreen (21:9)",
    "Standard (4:3)",
];

pub const CAMERA_ANGLES: &[&str] = &[
    "Eye-level shot",
    "Low-angle shot",
    "High-angle shot",
    "Bird's-eye view",
    "Dutch angle",
    "Close-up shot",
    "Medium shot",
    "Long shot",
];

pub const STYLES: &[&str] = &[
    "Photorealistic",
    "Anime",
    "Vaporwave",
    "Oil painting",
    "Watercolor",
    "Steampunk",
    "Cyberpunk",
    "Minimalist",
    "Concept art",
    "Low poly",
];

pub const THUMBNAIL_STYLES: &[&str] = &[
    "Bold & Punchy",
    "Minimalist & Clean",
    "Gaming Style",
    "Vlog / Lifestyle",
    "Tech Review",
    "Educational",
    "News / Documentary",
];

/// Base64 image payload plus its media type, as sent inline to the model.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub data: String,
    pub mime_type: String,
}

impl ReferenceImage {
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self { data: data.into(), mime_type: mime_type.into() }
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    /// Inverse of [`ReferenceImage::to_data_uri`]. Only base64 data URIs are accepted.
    pub fn from_data_uri(uri: &str) -> Option<Self> {
        let rest = uri.strip_prefix("data:")?;
        let (mime_type, data) = rest.split_once(";base64,")?;
        if mime_type.is_empty() || data.is_empty() {
            return None;
        }
        Some(Self::new(data, mime_type))
    }
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GenerationParams {
    pub aspect_ratio: String,
    pub camera_angle: String,
    pub primary_character: String,
    pub location: String,
    pub style: String,
    pub upscale: bool,
    #[serde(default)]
    pub style_reference_image: Option<ReferenceImage>,
    #[serde(default)]
    pub character_reference_image: Option<ReferenceImage>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            aspect_ratio: ASPECT_RATIOS[0].to_string(),
            camera_angle: CAMERA_ANGLES[0].to_string(),
            primary_character: "A majestic glowing stag".to_string(),
            location: "in an enchanted forest at night".to_string(),
            style: STYLES[0].to_string(),
            upscale: true,
            style_reference_image: None,
            character_reference_image: None,
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ThumbnailParams {
    pub title: String,
    pub style: String,
    #[serde(default)]
    pub reference_image: Option<ReferenceImage>,
}

impl Default for ThumbnailParams {
    fn default() -> Self {
        Self {
            title: "My Awesome New Video".to_string(),
            style: THUMBNAIL_STYLES[0].to_string(),
            reference_image: None,
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EditParams {
    #[serde(default)]
    pub source_image: Option<ReferenceImage>,
    pub prompt: String,
}

impl Default for EditParams {
    fn default() -> Self {
        Self { source_image: None, prompt: "Add a retro cinematic filter".to_string() }
    }
}

/// One unit of a request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestPart {
    Text(String),
    InlineImage(ReferenceImage),
}

impl RequestPart {
    pub fn text(text: impl Into<String>) -> Self { RequestPart::Text(text.into()) }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Generate,
    Edit,
    Thumbnail,
}

/// What the display surface shows. The variants are mutually exclusive, so a
/// session can never report an image and an error at the same time.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Display {
    #[default]
    Empty,
    Loading,
    Image(String),
    Error(String),
}

/// Upload targets, addressed by kebab-case path segment.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ImageSlot {
    Source,
    StyleReference,
    CharacterReference,
    ThumbnailReference,
}

#[derive(Debug, Serialize, Clone)]
pub struct Options {
    pub aspect_ratios: &'static [&'static str],
    pub camera_angles: &'static [&'static str],
    pub styles: &'static [&'static str],
    pub thumbnail_styles: &'static [&'static str],
}

impl Options {
    pub fn catalogue() -> Self {
        Self {
            aspect_ratios: ASPECT_RATIOS,
            camera_angles: CAMERA_ANGLES,
            styles: STYLES,
            thumbnail_styles: THUMBNAIL_STYLES,
        }
    }
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct GenerationUpdate {
    pub aspect_ratio: Option<String>,
    pub camera_angle: Option<String>,
    pub primary_character: Option<String>,
    pub location: Option<String>,
    pub style: Option<String>,
    pub upscale: Option<bool>,
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ThumbnailUpdate {
    pub title: Option<String>,
    pub style: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModeRequest {
    pub mode: Mode,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EditPromptRequest {
    pub prompt: String,
}
