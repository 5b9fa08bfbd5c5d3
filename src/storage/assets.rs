//! Asset link rewriting for documentation sources.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::domain::RawObject;

pub(crate) const PLACEHOLDER: &str = "{PLACEHOLDER_APP_RESOURCES_BASE_URI}";

// `assets/` or `./assets/` not preceded by a path or word character, so links
// that are already absolute stay untouched.
static RELATIVE_ASSETS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<lead>^|[^\w/.\-])(?:\./)?assets/")
        .expect("relative asset pattern must be valid")
});

/// Rewrites asset references for one entity.
#[derive(Debug, Clone)]
pub(crate) struct AssetRewriter<'a> {
    external_address: &'a str,
    asset_base: String,
}

impl<'a> AssetRewriter<'a> {
    pub(crate) fn new(external_address: &'a str, bucket: &str, id: &str, asset_folder: &str) -> Self {
        Self {
            external_address,
            asset_base: format!("{external_address}/{bucket}/{id}/{asset_folder}/"),
        }
    }

    pub(crate) fn rewrite(&self, source: &str) -> String {
        let resolved = source.replace(PLACEHOLDER, self.external_address);
        RELATIVE_ASSETS
            .replace_all(&resolved, |caps: &Captures<'_>| {
                format!("{}{}", &caps["lead"], self.asset_base)
            })
            .into_owned()
    }

    /// Rewrite `docs[].source` in place. Payloads without a `docs` array are left alone.
    pub(crate) fn rewrite_docs(&self, raw: &mut RawObject) {
        let Some(Value::Array(docs)) = raw.get_mut("docs") else {
            return;
        };

        for doc in docs.iter_mut() {
            if let Some(Value::String(source)) = doc.get_mut("source") {
                *source = self.rewrite(source);
            }
        }
    }
}
