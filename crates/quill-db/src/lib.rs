mod core;
mod cursor;
mod datastore;
mod error;
mod executor;
mod index;
mod options;
mod persistence;
mod primary;
mod sweep;
mod uid;

pub use quill_model::{array, doc, now_millis, Document, Value};
pub use quill_store::{FileStorage, MemoryStorage, Storage};

pub use cursor::{Cursor, SortDirection};
pub use datastore::Datastore;
pub use error::DbError;
pub use executor::Ticket;
pub use options::{
    IndexOptions, Options, RemoveOptions, SerializationHook, UpdateOptions, UpdateResult,
};
