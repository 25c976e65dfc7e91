//! The two pipeline stages. Each resolves its input, does its one transformation, persists
//! the primary artifact, then attempts previews and the status record as best-effort steps.

pub mod error;
pub mod preprocess;
pub mod request;
pub mod response;
pub mod status;
pub mod synthesis;
pub mod twin;

pub use error::{StageError, StageErrorKind};
pub use preprocess::{PreprocessOutcome, PreprocessStage};
pub use request::{PreprocessRequest, SynthesisRequest};
pub use response::StageResponse;
pub use synthesis::{SynthesisOutcome, SynthesisStage};
