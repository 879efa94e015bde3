mod run;
pub use run::{RunShape, RunSpec};

mod daemon;
pub use daemon::DaemonSpec;

mod lambda;
pub use lambda::LambdaSpec;
