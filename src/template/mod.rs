//! Template model, scope resolution, merging, validation, and storage.

pub mod expiry;
pub mod merge;
pub mod model;
pub mod scope;
pub mod store;
pub mod validator;

pub use merge::merge_template;
pub use model::{ResourceKind, Template};
pub use scope::DesiredAspects;
pub use store::{FsTemplateStore, TemplateStore};
pub use validator::TemplateValidator;
