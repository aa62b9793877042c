//! Medley - multimodal chat session management.
//!
//! One [`session::SessionManager`] per user session owns the conversation
//! handles, one per modality, and routes turns through the provider client.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod pdf;
pub mod session;

pub use session::{ConversationHandle, MediaAttachment, Modality, SessionManager, Speaker, Turn};
