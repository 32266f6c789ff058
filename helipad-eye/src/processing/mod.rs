//! Detection building blocks

pub mod circles;
pub mod matcher;
pub mod preprocess;
pub mod ring;
pub mod stabilizer;

pub use circles::CircleDetector;
pub use matcher::{MatchOutcome, ShapeMatcher};
pub use preprocess::FramePreprocessor;
pub use ring::{RingFit, RingFitter};
pub use stabilizer::TemporalStabilizer;
