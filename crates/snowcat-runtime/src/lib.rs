//! C5 Stage Runner, C6 Ingress Dispatcher, and the C7 task-dispatcher
//! contract (spec.md §4.5–§4.7).

pub mod cursor;
pub mod dispatcher;
pub mod ingress;
pub mod runner;
pub mod wake;

pub use cursor::Cursor;
pub use dispatcher::{ActivationHandler, LocalDispatcher, TaskDispatcher};
pub use ingress::IngressDispatcher;
pub use runner::{RunnerConfig, StageRunner};
