pub mod description;
pub mod dimensions;
pub mod images;
pub mod pricing;
pub mod vocab;
