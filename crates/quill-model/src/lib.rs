mod compare;
mod error;
mod matcher;
mod modify;
mod path;
mod serialize;
mod validate;
mod value;

pub use compare::{are_comparable, compare_things, compare_things_with, things_equal, StringComparator};
pub use error::ModelError;
pub use matcher::match_query;
pub use modify::modify;
pub use path::get_dot_value;
pub use serialize::{deserialize_doc, serialize_doc};
pub use validate::check_document;
pub use value::{doc_id, now_millis, Document, Value};
