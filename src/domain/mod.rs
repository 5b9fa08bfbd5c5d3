//! Domain layer types and invariants.

pub mod documents;
pub mod field;
pub mod notification;

pub use documents::{
    ApiSpec, AsyncApiSpec, AsyncApiSpecData, Content, ContentData, Document, ODataSpec,
    OpenApiSpec, RawObject,
};
pub use field::{CacheKey, Field};
pub use notification::{EventType, Notification};
