pub mod registry;

pub use registry::{DocumentRegistry, PutOutcome, Records};
