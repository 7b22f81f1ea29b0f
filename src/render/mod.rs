//! Tile renderer.
//!
//! Frame planning ([`plan`]) is pure and decides which tile ranges of which
//! buffers are drawn; [`gl`] executes a plan with glow on the render thread
//! and owns every GPU handle.

pub mod gl;
pub mod plan;

pub use gl::{FrameStats, TileRenderer};
pub use plan::{plan_frame, BufferDraw, DrawRange, FramePlan};

use thiserror::Error;

/// `GL_CONTEXT_LOST`, reported by `glGetError` once the context is gone.
pub const GL_CONTEXT_LOST: u32 = 0x0507;
/// WebGL's `CONTEXT_LOST_WEBGL`.
pub const WEBGL_CONTEXT_LOST: u32 = 0x9242;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    /// Transient; the frame is skipped.
    #[error("GPU resources exhausted: {0}")]
    ResourceExhausted(String),

    /// The GPU context is gone and every resource must be rebuilt.
    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    #[error("shader compilation failed: {0}")]
    ShaderCompile(String),

    #[error("graphics backend error: {0}")]
    Backend(String),
}

impl RenderError {
    /// Whether the render session must be torn down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RenderError::DeviceLost(_))
    }
}

/// Maps a `glGetError` code to a render error. `NO_ERROR` maps to `None`.
pub fn classify_gl_error(code: u32, context: &str) -> Option<RenderError> {
    match code {
        glow::NO_ERROR => None,
        glow::OUT_OF_MEMORY => Some(RenderError::ResourceExhausted(format!(
            "out of memory during {}",
            context
        ))),
        GL_CONTEXT_LOST | WEBGL_CONTEXT_LOST => Some(RenderError::DeviceLost(format!(
            "context lost during {}",
            context
        ))),
        other => Some(RenderError::Backend(format!(
            "GL error 0x{:04X} during {}",
            other, context
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_gl_error() {
        assert_eq!(classify_gl_error(glow::NO_ERROR, "upload"), None);
        assert!(matches!(
            classify_gl_error(glow::OUT_OF_MEMORY, "upload"),
            Some(RenderError::ResourceExhausted(_))
        ));
        let lost = classify_gl_error(GL_CONTEXT_LOST, "draw").unwrap();
        assert!(lost.is_fatal());
        let other = classify_gl_error(glow::INVALID_ENUM, "draw").unwrap();
        assert!(!other.is_fatal());
        assert!(other.to_string().contains("0x0500"));
    }

    #[test]
    fn test_only_device_loss_is_fatal() {
        assert!(!RenderError::ResourceExhausted("vbo".into()).is_fatal());
        assert!(!RenderError::ShaderCompile("vs".into()).is_fatal());
        assert!(!RenderError::Backend("x".into()).is_fatal());
        assert!(RenderError::DeviceLost("x".into()).is_fatal());
    }
}
