mod error;
pub mod metrics;
pub mod naive_bayes;

pub use error::{Error, Result};
pub use metrics::{Averages, ClassMetrics, ClassificationReport, ConfusionMatrix};
pub use naive_bayes::{FittedGaussianNb, GaussianNb};
