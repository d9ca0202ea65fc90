pub mod issue;
pub mod loaders;
pub mod question;
pub mod raw_record;
pub mod topic;

pub use issue::{IssueCode, ValidationIssue, ValidationOutcome};
pub use loaders::{load_all_topic_jobs, load_topic_job};
pub use question::{CandidateItem, Difficulty, OptionLetter};
pub use raw_record::{decode_batch, decode_record, BatchShape, DecodeError, DecodedBatch};
pub use topic::{GenerationMode, TopicJob};
