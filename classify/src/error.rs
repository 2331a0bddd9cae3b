use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot fit on an empty training set")]
    EmptyTrainingSet,

    #[error("{rows} feature rows but {labels} labels")]
    LabelCount { rows: usize, labels: usize },

    #[error("model was fitted on {expected} features, got {got}")]
    FeatureCount { expected: usize, got: usize },

    #[error("non-finite feature value at row {row}, column {column}")]
    NonFinite { row: usize, column: usize },

    #[error("{names} class names for {labels} labels")]
    NameCount { names: usize, labels: usize },

    #[error("{truth} true labels but {predicted} predictions")]
    PredictionCount { truth: usize, predicted: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
