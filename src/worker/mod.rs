mod poller;
mod runner;

pub use poller::{JobPoller, TokioSleeper};
pub use runner::TaskRunner;
