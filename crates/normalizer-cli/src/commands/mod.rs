pub mod invoke;
pub mod lambda;
