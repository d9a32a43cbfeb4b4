//! Validator generation and conditional-request evaluation.
//!
//! Strong ETags hash the canonical serialization of a single resource;
//! collection ETags are weak when configured. `Last-Modified` comes from
//! the metadata-exposed timestamp property, maxed over collections.
//! Comparison semantics follow RFC 7232: weak comparison for cache
//! validation on reads, strong comparison for `If-Match` on writes.

use chrono::{DateTime, SecondsFormat, Utc};
use jsonapi_core::ResourceObject;
use serde_json::Value;

use crate::canonical::content_hash;
use crate::error::Error;
use crate::property;
use crate::registry::ResourceMetadata;
use crate::request::RequestContext;

/// Strong ETag for a single serialized resource, quoted per RFC 7232.
pub fn strong_etag(resource: &ResourceObject) -> String {
    let value = serde_json::to_value(resource).unwrap_or(Value::Null);
    format!("\"{}\"", content_hash(&value))
}

/// ETag for a collection response; weak when `weak` is set.
pub fn collection_etag(resources: &[ResourceObject], weak: bool) -> String {
    let value = serde_json::to_value(resources).unwrap_or(Value::Null);
    let quoted = format!("\"{}\"", content_hash(&value));
    if weak {
        format!("W/{quoted}")
    } else {
        quoted
    }
}

/// Last-modified timestamp of one entity, if the type exposes one.
pub fn last_modified(meta: &ResourceMetadata, entity: &Value) -> Option<DateTime<Utc>> {
    let path = meta.updated_at_path.as_deref()?;
    let raw = property::string_at(entity, path)?;
    DateTime::parse_from_rfc3339(&raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Max last-modified across a collection.
pub fn max_last_modified(meta: &ResourceMetadata, entities: &[Value]) -> Option<DateTime<Utc>> {
    entities
        .iter()
        .filter_map(|e| last_modified(meta, e))
        .max()
}

/// Formats an HTTP-date (IMF-fixdate) for the `Last-Modified` header.
pub fn http_date(dt: DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parses an HTTP-date from a conditional header.
pub fn parse_http_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn opaque_tag(tag: &str) -> &str {
    let tag = tag.trim();
    tag.strip_prefix("W/").unwrap_or(tag)
}

/// Weak comparison: opaque tags equal, weakness ignored.
fn weak_match(candidate: &str, current: &str) -> bool {
    candidate.trim() == "*" || opaque_tag(candidate) == opaque_tag(current)
}

/// Strong comparison: both tags must be strong and byte-equal.
fn strong_match(candidate: &str, current: &str) -> bool {
    let candidate = candidate.trim();
    if candidate == "*" {
        return true;
    }
    !candidate.starts_with("W/") && !current.starts_with("W/") && candidate == current
}

/// Conditional GET: `304 Not Modified`?
///
/// `If-None-Match` takes precedence over `If-Modified-Since` when present.
pub fn not_modified(
    ctx: &RequestContext,
    etag: &str,
    last_modified: Option<DateTime<Utc>>,
) -> bool {
    if let Some(raw) = ctx.header("if-none-match") {
        return raw.split(',').any(|tag| weak_match(tag, etag));
    }
    if let (Some(raw), Some(lm)) = (ctx.header("if-modified-since"), last_modified) {
        if let Some(since) = parse_http_date(raw) {
            // HTTP dates carry second precision.
            return lm.timestamp() <= since.timestamp();
        }
    }
    false
}

/// Conditional write (PATCH/DELETE): enforces `If-Match` and
/// `If-Unmodified-Since`, and the optional 428 policy when neither is
/// present.
pub fn check_write(
    ctx: &RequestContext,
    etag: &str,
    last_modified: Option<DateTime<Utc>>,
    require: bool,
) -> Result<(), Error> {
    let if_match = ctx.header("if-match");
    let if_unmodified = ctx.header("if-unmodified-since");

    if let Some(raw) = if_match {
        if !raw.split(',').any(|tag| strong_match(tag, etag)) {
            return Err(Error::PreconditionFailed {
                header: "If-Match".to_string(),
            });
        }
        return Ok(());
    }

    if let Some(raw) = if_unmodified {
        let Some(since) = parse_http_date(raw) else {
            return Err(Error::PreconditionFailed {
                header: "If-Unmodified-Since".to_string(),
            });
        };
        if let Some(lm) = last_modified {
            if lm.timestamp() > since.timestamp() {
                return Err(Error::PreconditionFailed {
                    header: "If-Unmodified-Since".to_string(),
                });
            }
        }
        return Ok(());
    }

    if require {
        return Err(Error::PreconditionRequired {
            header: "If-Match".to_string(),
        });
    }
    Ok(())
}

/// RFC 3339 with second precision, the normalized timestamp form used in
/// serialized attributes.
pub fn rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}
