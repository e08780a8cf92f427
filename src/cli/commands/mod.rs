mod config;
mod jobs;
mod query;
mod run;
mod status;

pub use config::{ConfigCommand, handle_config};
pub use jobs::{JobsCommand, handle_jobs};
pub use query::{QueryArgs, handle_query};
pub use run::{RunArgs, handle_run};
pub use status::handle_status;
