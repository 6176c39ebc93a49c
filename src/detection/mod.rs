mod pipeline;
mod preprocess;
mod scorer;
mod suppression;
#[cfg(test)]
mod tests;

pub use pipeline::{map_to_squares, DetectionPipeline, PieceObservation};
pub use preprocess::{letterbox, Letterbox};
pub use scorer::{InputTensor, RawBox, RawPrediction, Scorer};
pub use suppression::{decode_boxes, non_max_suppression, Detection};
