//! Docker Engine backend for berth.

mod convert;

mod runtime;
pub use runtime::DockerRuntime;
