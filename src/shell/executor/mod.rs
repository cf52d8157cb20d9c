mod builtin;
#[allow(clippy::module_inception)]
mod executor;
mod fd;
mod stage;

pub use executor::Executor;
