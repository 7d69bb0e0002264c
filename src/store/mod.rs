pub mod postgres;
pub mod references;
pub mod table;

pub use references::{ConnectionHandle, ReferenceStore, PARTITION};
