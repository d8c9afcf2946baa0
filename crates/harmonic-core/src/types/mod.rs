//! Core data model
//!
//! Concrete types for envelopes, messages, scripts, sessions, artifacts,
//! and execution records.

mod artifact;
mod casemap;
mod message;
mod record;
mod script;
mod session;

pub use artifact::{Artifact, ArtifactKind};
pub use casemap::CiMap;
pub use message::{Channel, ContentType, Envelope, Message, Termination, ENVELOPE_VERSION};
pub use record::{MessageExecutionRecord, RecordStatus};
pub use script::{Script, Step};
pub use session::{ChatEntry, Session, SessionStatus};
