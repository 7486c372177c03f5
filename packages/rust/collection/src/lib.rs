//! Postman collection output: document types and atomic file writing.

mod postman;
mod writer;

pub use postman::{
    Body, BodyOptions, Collection, Folder, Header, Info, Item, QueryParam, RawOptions, Request,
    RequestUrl, SCHEMA_URL, Variable, placeholders,
};
pub use writer::{WrittenCollection, read_collection, validate_collection, write_collection};
