//! Softmax regression on MNIST.
//!
//! A single linear layer maps the 784 pixels of an image to 10 class logits and is
//! trained with plain gradient descent on the cross-entropy for a fixed number of
//! steps. The trained parameters are written to disk as a checkpoint.

pub mod checkpoint;
pub mod cli;
pub mod data;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod model;
pub mod training;

pub use error::{DatasetError, Error};
