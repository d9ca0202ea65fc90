pub mod toml_loader;

pub use toml_loader::{load_all_topic_jobs, load_topic_job};
