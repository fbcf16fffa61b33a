//! Per-session form state. Every transition consumes the old state and returns
//! the next one, so handlers never see a half-applied update.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::gemini::DispatchError;
use crate::models::{
    Display, EditParams, GenerationParams, GenerationUpdate, ImageSlot, Mode, ReferenceImage,
    ThumbnailParams, ThumbnailUpdate, ASPECT_RATIOS, CAMERA_ANGLES, STYLES, THUMBNAIL_STYLES,
};

/// Owned snapshot of whatever the active mode needs; later form edits can't reach it.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Generate(GenerationParams),
    Edit { source: ReferenceImage, instruction: String },
    Thumbnail(ThumbnailParams),
}

impl Submission {
    pub fn mode(&self) -> Mode {
        match self {
            Submission::Generate(_) => Mode::Generate,
            Submission::Edit { .. } => Mode::Edit,
            Submission::Thumbnail(_) => Mode::Thumbnail,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SubmitError {
    #[error("Another request is already in progress.")]
    Busy,
    #[error("Please upload an image and provide an edit prompt.")]
    MissingEditInput,
}

#[derive(Debug, Error, PartialEq)]
#[error("Unknown {field}: {value}")]
pub struct ChoiceError {
    pub field: &'static str,
    pub value: String,
}

fn check_choice(field: &'static str, value: &Option<String>, allowed: &[&str]) -> Result<(), ChoiceError> {
    match value {
        Some(v) if !allowed.contains(&v.as_str()) => Err(ChoiceError { field, value: v.clone() }),
        _ => Ok(()),
    }
}

impl GenerationUpdate {
    pub fn validate(&self) -> Result<(), ChoiceError> {
        check_choice("aspect_ratio", &self.aspect_ratio, ASPECT_RATIOS)?;
        check_choice("camera_angle", &self.camera_angle, CAMERA_ANGLES)?;
        check_choice("style", &self.style, STYLES)
    }
}

impl ThumbnailUpdate {
    pub fn validate(&self) -> Result<(), ChoiceError> {
        check_choice("style", &self.style, THUMBNAIL_STYLES)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StudioState {
    pub id: Uuid,
    pub mode: Mode,
    pub generation: GenerationParams,
    pub thumbnail: ThumbnailParams,
    pub edit: EditParams,
    pub display: Display,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudioState {
    pub fn new(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            mode: Mode::default(),
            generation: GenerationParams::default(),
            thumbnail: ThumbnailParams::default(),
            edit: EditParams::default(),
            display: Display::Empty,
            created_at: now,
            updated_at: now,
        }
    }

    /// The busy flag: a request is in flight exactly while the display is loading.
    pub fn is_busy(&self) -> bool {
        matches!(self.display, Display::Loading)
    }

    fn touched(mut self) -> Self {
        self.updated_at = Utc::now();
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self.touched()
    }

    /// Callers validate first; unknown choices are applied as given.
    pub fn with_generation_update(mut self, update: GenerationUpdate) -> Self {
        let g = &mut self.generation;
        if let Some(v) = update.aspect_ratio { g.aspect_ratio = v; }
        if let Some(v) = update.camera_angle { g.camera_angle = v; }
        if let Some(v) = update.primary_character { g.primary_character = v; }
        if let Some(v) = update.location { g.location = v; }
        if let Some(v) = update.style { g.style = v; }
        if let Some(v) = update.upscale { g.upscale = v; }
        self.touched()
    }

    pub fn with_thumbnail_update(mut self, update: ThumbnailUpdate) -> Self {
        if let Some(v) = update.title { self.thumbnail.title = v; }
        if let Some(v) = update.style { self.thumbnail.style = v; }
        self.touched()
    }

    pub fn with_edit_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.edit.prompt = prompt.into();
        self.touched()
    }

    /// Sets or clears an image slot. A new source image is shown right away
    /// and switches the session to edit mode.
    pub fn with_image(mut self, slot: ImageSlot, image: Option<ReferenceImage>) -> Self {
        match slot {
            ImageSlot::Source => {
                if let Some(img) = &image {
                    if !self.is_busy() {
                        self.display = Display::Image(img.to_data_uri());
                    }
                    self.mode = Mode::Edit;
                }
                self.edit.source_image = image;
            }
            ImageSlot::StyleReference => self.generation.style_reference_image = image,
            ImageSlot::CharacterReference => self.generation.character_reference_image = image,
            ImageSlot::ThumbnailReference => self.thumbnail.reference_image = image,
        }
        self.touched()
    }

    /// Shows an error unless a request is in flight, which owns the display until it settles.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        if !self.is_busy() {
            self.display = Display::Error(message.into());
        }
        self.touched()
    }

    /// Validates the active mode and marks the session busy. Validation
    /// failures are shown on the display; a busy session is left untouched.
    pub fn begin_submit(self) -> (Self, Result<Submission, SubmitError>) {
        if self.is_busy() {
            return (self, Err(SubmitError::Busy));
        }
        let submission = match self.mode {
            Mode::Generate => Ok(Submission::Generate(self.generation.clone())),
            Mode::Thumbnail => Ok(Submission::Thumbnail(self.thumbnail.clone())),
            Mode::Edit => match &self.edit.source_image {
                Some(source) if !self.edit.prompt.trim().is_empty() => Ok(Submission::Edit {
                    source: source.clone(),
                    instruction: self.edit.prompt.clone(),
                }),
                _ => Err(SubmitError::MissingEditInput),
            },
        };
        let mut next = self;
        next.display = match &submission {
            Ok(_) => Display::Loading,
            Err(e) => Display::Error(e.to_string()),
        };
        (next.touched(), submission)
    }

    /// Records the outcome of a dispatched submission and clears the busy flag.
    pub fn settle(mut self, submission: &Submission, outcome: Result<String, DispatchError>) -> Self {
        self.display = match outcome {
            Ok(uri) => {
                if let Submission::Edit { .. } = submission {
                    // Chained edits start from the latest result.
                    if let Some(edited) = ReferenceImage::from_data_uri(&uri) {
                        self.edit.source_image = Some(edited);
                    }
                }
                Display::Image(uri)
            }
            Err(e) => Display::Error(e.to_string()),
        };
        self.touched()
    }
}
