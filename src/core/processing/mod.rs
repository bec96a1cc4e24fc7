pub mod align;
pub mod assemble;
pub mod extract;
pub mod flatten;
pub mod grid;
pub mod labels;
pub mod translate;
