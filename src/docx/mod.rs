pub mod document;
pub mod escape;
pub mod image;
pub mod package;
pub mod parts;
pub mod relations;
pub mod repair;
pub mod table;
pub mod xml;
