//! Vision augmentation for slide summaries: rendering backends and LLM clients.

pub mod client;
pub mod render;

pub use client::{
    OllamaVisionClient, OpenAiVisionClient, VisionClient, VisionError, build_slide_prompt,
    build_vision_client,
};
pub use render::{
    OfficeRenderer, OverlayRenderer, RenderError, RenderSession, SlideRenderer, select_renderer,
};
