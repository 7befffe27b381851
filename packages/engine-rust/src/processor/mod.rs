//! Pipeline steps and the executor that runs them.

pub mod pipeline;
pub mod recipient_list;
pub mod steps;

pub use pipeline::{run_steps, Pipeline, PipelineOutcome};
pub use recipient_list::RecipientList;
pub use steps::{RemoveHeader, SendTo, SetBody, SetHeader, SetProperty};
