pub mod accumulator;

pub use accumulator::{FlushOutcome, Operation, WriteAccumulator};
