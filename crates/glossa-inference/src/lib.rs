//! # glossa-inference
//!
//! Collaborator adapters for the glossa pipeline: source extraction through
//! `yt-dlp` and language scoring through a Whisper detection service.
//!
//! Both implement the traits defined in `glossa-core`, so workers never
//! depend on a concrete tool.

pub mod whisper;
pub mod ytdlp;

// Mock collaborators for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use glossa_core::*;

pub use whisper::WhisperLanguageScorer;
pub use ytdlp::YtDlpExtractor;
