pub mod material;
pub mod quotation;
