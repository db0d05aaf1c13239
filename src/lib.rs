pub mod engine;
pub mod error;
pub mod expm;
pub mod io;
pub mod observation;
pub mod onenormest;
pub mod operator;
pub mod process;
pub mod progress;
pub mod request;
pub mod scene;
pub mod sparse;
pub mod tree;
pub mod utils;

pub use engine::Engine;
pub use error::{CtmcError, CtmcResult};
pub use expm::ExpmStrategy;
pub use request::{EvaluateOptions, Evaluation, PropertyRequest, Response, evaluate};
pub use scene::Scene;
