pub mod contract;
pub mod document;
pub mod recommendation;
