mod backend;
mod backends;

pub use backend::ObstacleClassifier;
pub use backends::StubClassifier;

#[cfg(feature = "backend-tract")]
pub use backends::TractClassifier;
