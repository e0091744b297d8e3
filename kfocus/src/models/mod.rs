mod document;
mod provider;
mod rules;
mod screening;
mod session;
mod tag;
mod task;

pub use document::*;
pub use provider::*;
pub use rules::*;
pub use screening::*;
pub use session::*;
pub use tag::*;
pub use task::*;

use std::collections::HashMap;

pub type Metadata = HashMap<String, serde_json::Value>;
