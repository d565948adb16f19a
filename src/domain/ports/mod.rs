pub mod worker;

pub use worker::{Termination, WorkerExit, WorkerLauncher, WorkerProcess};
