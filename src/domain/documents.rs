//! Typed documents decoded from the bucket.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub type RawObject = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiSpec {
    pub raw: RawObject,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenApiSpec {
    pub raw: RawObject,
}

/// OData metadata kept verbatim, either as the JSON CSDL text or the EDMX XML text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ODataSpec {
    pub raw: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AsyncApiSpec {
    pub raw: RawObject,
    pub data: AsyncApiSpecData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AsyncApiSpecData {
    #[serde(alias = "AsyncAPI", deserialize_with = "null_as_default")]
    pub asyncapi: String,
    #[serde(alias = "Topics", deserialize_with = "null_as_default")]
    pub topics: RawObject,
}

/// Documentation bundle. `raw` carries rewritten asset links, `data` the stored values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub raw: RawObject,
    pub data: ContentData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContentData {
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub display_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub docs: Vec<Document>,
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Document {
    #[serde(deserialize_with = "null_as_default")]
    pub order: String,
    #[serde(deserialize_with = "null_as_default")]
    pub source: String,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(deserialize_with = "null_as_default")]
    pub internal: bool,
}

/// Stored documents may carry explicit `null`s; they read as the empty value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
