pub mod accepted_sink;
pub mod citation_validator;
pub mod corpus;
pub mod deduplicator;
pub mod distribution_rebalancer;
pub mod failure_writer;
pub mod normalizer;
pub mod quote_grounding;
pub mod structure_validator;
pub mod validation_report;

pub use accepted_sink::{AcceptedSink, JsonFileSink};
pub use citation_validator::CitationValidator;
pub use corpus::{CorpusSource, FileCorpus};
pub use deduplicator::{DedupOutcome, Deduplicator};
pub use distribution_rebalancer::{DistributionRebalancer, RebalanceReport};
pub use failure_writer::FailureWriter;
pub use quote_grounding::{select_mandatory_quotes, QuoteGrounding};
pub use validation_report::{BatchReport, ScoreBucket};
