pub mod field;
pub mod tractor;
