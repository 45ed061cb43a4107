//! Trainable classifier model.
//!
//! The frozen embedding network supplies the input features; everything
//! here is the trainable part: a trunk adapter over the embeddings and a
//! small classification head whose output width equals the class count and
//! can be grown in place.

mod checkpoint;
mod classifier;
mod layers;

pub use checkpoint::{load_checkpoint, save_checkpoint, TrainingHistory};
pub use classifier::{Gradients, SpeciesClassifier};
pub use layers::{relu, relu_backward, softmax, Adam, Dense};
