//! Turns form parameters into the ordered part list sent to the image model.

use crate::models::{GenerationParams, ReferenceImage, RequestPart, ThumbnailParams};

pub const DEFAULT_ASPECT_RATIO: &str = "16:9";

const UPSCALE_KEYWORDS: &str = "ultra realistic, 4k, high detail, sharp focus, professional photography, ";
const STYLE_REFERENCE_FRAMING: &str = "Use the following image for artistic style reference.";
const CHARACTER_REFERENCE_FRAMING: &str = "Use the following image for character reference.";

pub const THUMBNAIL_GENERATE_BACKGROUND: &str = "Generate an interesting and relevant background for the title.";
pub const THUMBNAIL_INTEGRATE_REFERENCE: &str =
    "Use the provided image as the background or main subject, integrating the text and style seamlessly onto it.";

/// Pulls the ratio token out of a label such as `Cinematic (16:9)`.
pub fn aspect_ratio_token(label: &str) -> &str {
    label
        .split_once('(')
        .and_then(|(_, rest)| rest.split_once(')'))
        .map(|(token, _)| token)
        .filter(|token| !token.is_empty())
        .unwrap_or(DEFAULT_ASPECT_RATIO)
}

/// The ratio directive leads the prompt; the model follows it far more reliably there.
pub fn generation_prompt(params: &GenerationParams) -> String {
    let upscale = if params.upscale { UPSCALE_KEYWORDS } else { "" };
    format!(
        "Aspect Ratio: {}. A {} style image of {}{} {}. The camera shot is a {}.",
        aspect_ratio_token(&params.aspect_ratio),
        params.style,
        upscale,
        params.primary_character,
        params.location,
        params.camera_angle,
    )
}

pub fn generation_parts(params: &GenerationParams) -> Vec<RequestPart> {
    let mut parts = Vec::with_capacity(5);
    if let Some(style) = &params.style_reference_image {
        parts.push(RequestPart::text(STYLE_REFERENCE_FRAMING));
        parts.push(RequestPart::InlineImage(style.clone()));
    }
    if let Some(character) = &params.character_reference_image {
        parts.push(RequestPart::text(CHARACTER_REFERENCE_FRAMING));
        parts.push(RequestPart::InlineImage(character.clone()));
    }
    parts.push(RequestPart::Text(generation_prompt(params)));
    parts
}

pub fn thumbnail_prompt(params: &ThumbnailParams) -> String {
    let background = if params.reference_image.is_some() {
        THUMBNAIL_INTEGRATE_REFERENCE
    } else {
        THUMBNAIL_GENERATE_BACKGROUND
    };
    [
        "Create a compelling, eye-catching YouTube thumbnail with a 16:9 aspect ratio.".to_string(),
        format!("The style should be '{}'.", params.style),
        format!(
            "It must feature the following text prominently, with high contrast and readability: \"{}\"",
            params.title
        ),
        background.to_string(),
    ]
    .join(" ")
}

pub fn thumbnail_parts(params: &ThumbnailParams) -> Vec<RequestPart> {
    let mut parts = Vec::with_capacity(2);
    if let Some(reference) = &params.reference_image {
        parts.push(RequestPart::InlineImage(reference.clone()));
    }
    parts.push(RequestPart::Text(thumbnail_prompt(params)));
    parts
}

pub fn edit_parts(source: &ReferenceImage, instruction: &str) -> Vec<RequestPart> {
    vec![
        RequestPart::InlineImage(source.clone()),
        RequestPart::text(instruction),
    ]
}
