pub mod batch_ctx;
pub mod batch_validator;
pub mod generation_flow;
pub mod prompt;
pub mod retry_state;

pub use batch_ctx::BatchCtx;
pub use batch_validator::{BatchValidation, BatchValidator};
pub use generation_flow::{FlowOutput, GenerationFlow};
pub use retry_state::RetryState;
