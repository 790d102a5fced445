// Consensus and validation logic

pub mod pow;
pub mod validation;

pub use pow::{DIFFICULTY, DIFFICULTY_RANGE, ProofOfWork, Target};
pub use validation::{BlockValidator, ValidationError};
