//! Public types for the Kiln API.

mod candidate;
mod request;
mod score;

pub use candidate::{Candidate, CandidateMetadata};
pub use request::{GenerationRequest, OutputSchema, SamplingParams};
pub use score::{Criterion, ScoreBreakdown, ScoredCandidate};
