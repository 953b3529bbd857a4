pub mod assembler;
pub mod filtering;
pub mod grid;
