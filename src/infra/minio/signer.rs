//! AWS Signature Version 4 for S3-compatible requests.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

use crate::storage::ObjectError;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub(crate) const SERVICE: &str = "s3";
pub(crate) const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

const AMZ_DATE: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day]T[hour][minute][second]Z");
const SCOPE_DATE: &[BorrowedFormatItem<'static>] = format_description!("[year][month][day]");

#[derive(Clone)]
pub(crate) struct Credentials {
    pub(crate) access_key: String,
    pub(crate) secret_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .finish_non_exhaustive()
    }
}

/// Request parts covered by the signature. Path and query must already be
/// URI-encoded the way they are sent.
pub(crate) struct CanonicalRequest<'a> {
    pub(crate) method: &'a str,
    pub(crate) path: &'a str,
    pub(crate) query: &'a str,
    /// Lowercase names; values as sent.
    pub(crate) headers: Vec<(&'static str, String)>,
    pub(crate) payload_hash: &'a str,
}

impl CanonicalRequest<'_> {
    fn signed_headers(&self) -> String {
        let mut names: Vec<&str> = self.headers.iter().map(|(name, _)| *name).collect();
        names.sort_unstable();
        names.join(";")
    }

    fn render(&self) -> String {
        let mut headers: Vec<&(&'static str, String)> = self.headers.iter().collect();
        headers.sort_unstable_by_key(|(name, _)| *name);
        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{name}:{}\n", value.trim()))
            .collect();

        format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            self.method,
            self.path,
            self.query,
            canonical_headers,
            self.signed_headers(),
            self.payload_hash
        )
    }
}

pub(crate) fn amz_date(at: OffsetDateTime) -> Result<String, ObjectError> {
    at.format(AMZ_DATE)
        .map_err(|err| ObjectError::request(format!("failed to format request date: {err}")))
}

/// Build the `Authorization` header value for `request` signed at `at`.
pub(crate) fn authorization(
    credentials: &Credentials,
    region: &str,
    service: &str,
    request: &CanonicalRequest<'_>,
    at: OffsetDateTime,
) -> Result<String, ObjectError> {
    let timestamp = amz_date(at)?;
    let date = at
        .format(SCOPE_DATE)
        .map_err(|err| ObjectError::request(format!("failed to format scope date: {err}")))?;
    let scope = format!("{date}/{region}/{service}/aws4_request");

    let canonical_hash = hex::encode(Sha256::digest(request.render().as_bytes()));
    let string_to_sign = format!("{ALGORITHM}\n{timestamp}\n{scope}\n{canonical_hash}");

    let date_key = hmac(format!("AWS4{}", credentials.secret_key).as_bytes(), &date)?;
    let region_key = hmac(&date_key, region)?;
    let service_key = hmac(&region_key, service)?;
    let signing_key = hmac(&service_key, "aws4_request")?;
    let signature = hex::encode(hmac(&signing_key, &string_to_sign)?);

    Ok(format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={}, Signature={signature}",
        credentials.access_key,
        request.signed_headers()
    ))
}

fn hmac(key: &[u8], data: &str) -> Result<Vec<u8>, ObjectError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|err| ObjectError::request(format!("invalid signing key: {err}")))?;
    mac.update(data.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Percent-encode everything but RFC 3986 unreserved characters.
pub(crate) fn uri_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}
