pub mod generator;
pub mod throttle;

pub use generator::{GenerationRequest, OpenAiGenerator, QuestionGenerator};
pub use throttle::GenerationThrottle;
