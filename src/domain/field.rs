//! Logical sub-resources and the cache keys derived from them.

use std::fmt;

pub const API_SPEC_FILENAME: &str = "apiSpec.json";
pub const ASYNC_API_SPEC_FILENAME: &str = "asyncApiSpec.json";
pub const CONTENT_FILENAME: &str = "content.json";

/// One decoded view of a stored object.
///
/// Several fields may share a filename: `apiSpec.json` is decoded three ways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    ApiSpec,
    OpenApiSpec,
    ODataSpec,
    AsyncApiSpec,
    Content,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::ApiSpec,
        Field::OpenApiSpec,
        Field::ODataSpec,
        Field::AsyncApiSpec,
        Field::Content,
    ];

    const API_SPEC_FIELDS: [Field; 3] = [Field::ApiSpec, Field::OpenApiSpec, Field::ODataSpec];
    const ASYNC_API_SPEC_FIELDS: [Field; 1] = [Field::AsyncApiSpec];
    const CONTENT_FIELDS: [Field; 1] = [Field::Content];

    /// Name of the stored object backing this field.
    pub fn filename(self) -> &'static str {
        match self {
            Field::ApiSpec | Field::OpenApiSpec | Field::ODataSpec => API_SPEC_FILENAME,
            Field::AsyncApiSpec => ASYNC_API_SPEC_FILENAME,
            Field::Content => CONTENT_FILENAME,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Field::ApiSpec => "apiSpec",
            Field::OpenApiSpec => "openApiSpec",
            Field::ODataSpec => "odataSpec",
            Field::AsyncApiSpec => "asyncApiSpec",
            Field::Content => "content",
        }
    }

    /// Every field decoded from `filename`; empty when nothing is backed by it.
    pub fn for_filename(filename: &str) -> &'static [Field] {
        match filename {
            API_SPEC_FILENAME => &Self::API_SPEC_FIELDS,
            ASYNC_API_SPEC_FILENAME => &Self::ASYNC_API_SPEC_FIELDS,
            CONTENT_FILENAME => &Self::CONTENT_FIELDS,
            _ => &[],
        }
    }

    /// Parse a field from its name (`apiSpec`, `content`, ...).
    pub fn from_name(name: &str) -> Option<Field> {
        Self::ALL.into_iter().find(|field| field.name() == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Physical cache slot: `{entityID}/{filename}/{fieldName}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    id: String,
    field: Field,
}

impl CacheKey {
    pub fn new(id: impl Into<String>, field: Field) -> Self {
        Self {
            id: id.into(),
            field,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn field(&self) -> Field {
        self.field
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.id,
            self.field.filename(),
            self.field.name()
        )
    }
}
