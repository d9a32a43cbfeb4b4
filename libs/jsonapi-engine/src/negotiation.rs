//! Media-type negotiation for `application/vnd.api+json`.
//!
//! Write requests must carry the base media type with no parameters other
//! than `ext` and `profile`; `Accept` must hold at least one acceptable
//! entry. The atomic endpoint additionally requires the atomic extension
//! token on both headers. Configured channels replace the strict rules for
//! matching URL scopes.

use std::collections::BTreeSet;

use jsonapi_core::MEDIA_TYPE;

use crate::config::{ChannelConfig, EngineConfig};
use crate::error::Error;
use crate::request::RequestContext;

/// The atomic-operations extension URI.
pub const ATOMIC_EXT: &str = "https://jsonapi.org/ext/atomic";

/// Profiles active for the current request.
#[derive(Debug, Clone, Default)]
pub struct ProfileContext {
    active: BTreeSet<String>,
}

impl ProfileContext {
    pub fn activate(&mut self, uri: impl Into<String>) {
        self.active.insert(uri.into());
    }

    pub fn is_active(&self, uri: &str) -> bool {
        self.active.contains(uri)
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.active.iter().map(String::as_str)
    }
}

/// Outcome of negotiation: the response content type and the profiles the
/// request asked for via the media-type `profile` parameter.
#[derive(Debug, Clone)]
pub struct Negotiation {
    pub content_type: String,
    pub profiles: ProfileContext,
}

/// A parsed media type with its parameters in order.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaType {
    pub essence: String,
    pub params: Vec<(String, String)>,
}

impl MediaType {
    /// Parses `type/subtype; key=value; key="quoted value"`. Returns `None`
    /// on malformed input.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = split_params(raw).into_iter();
        let essence = parts.next()?.trim().to_ascii_lowercase();
        if !essence.contains('/') {
            return None;
        }
        let mut params = Vec::new();
        for part in parts {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = part.split_once('=')?;
            params.push((key.trim().to_ascii_lowercase(), unquote(value.trim())));
        }
        Some(Self { essence, params })
    }

    pub fn is_base(&self) -> bool {
        self.essence == MEDIA_TYPE
    }

    pub fn is_wildcard(&self) -> bool {
        self.essence == "*/*" || self.essence == "application/*"
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Space-separated URI list of a parameter (`ext`, `profile`).
    pub fn uri_list(&self, key: &str) -> Vec<String> {
        self.param(key)
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Media-type parameters, with `q` and everything after it stripped
    /// (those are Accept extension parameters, not media-type parameters).
    fn media_params(&self) -> &[(String, String)] {
        let cut = self
            .params
            .iter()
            .position(|(k, _)| k == "q")
            .unwrap_or(self.params.len());
        &self.params[..cut]
    }
}

/// Splits on `;` outside double quotes.
fn split_params(raw: &str) -> Vec<String> {
    split_outside_quotes(raw, ';')
}

/// Splits an `Accept` header on `,` outside double quotes.
fn split_accept(raw: &str) -> Vec<String> {
    split_outside_quotes(raw, ',')
}

fn split_outside_quotes(raw: &str, sep: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in raw.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            c if c == sep && !quoted => {
                out.push(std::mem::take(&mut current));
            }
            c => current.push(c),
        }
    }
    out.push(current);
    out
}

fn unquote(value: &str) -> String {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}

/// Decides whether a request is acceptable and what the response media
/// type is.
pub struct Negotiator<'a> {
    config: &'a EngineConfig,
    known_profiles: &'a BTreeSet<String>,
}

impl<'a> Negotiator<'a> {
    pub fn new(config: &'a EngineConfig, known_profiles: &'a BTreeSet<String>) -> Self {
        Self {
            config,
            known_profiles,
        }
    }

    /// Negotiates the request. `atomic` marks the atomic-operations
    /// endpoint; `route_name` feeds channel matching.
    pub fn negotiate(
        &self,
        ctx: &RequestContext,
        atomic: bool,
        route_name: &str,
    ) -> Result<Negotiation, Error> {
        if let Some(channel) = self.match_channel(ctx.path(), route_name) {
            return self.negotiate_channel(ctx, channel);
        }

        let mut requested: Vec<String> = Vec::new();

        if ctx.has_body() {
            let raw = ctx.header("content-type").ok_or_else(|| {
                Error::UnsupportedMediaType {
                    detail: "request body without a Content-Type header".to_string(),
                }
            })?;
            let mt = MediaType::parse(raw).ok_or_else(|| Error::UnsupportedMediaType {
                detail: format!("unparsable media type '{raw}'"),
            })?;
            if !mt.is_base() {
                return Err(Error::UnsupportedMediaType {
                    detail: format!("'{}' is not the JSON:API media type", mt.essence),
                });
            }
            self.check_params(&mt, atomic).map_err(|detail| {
                Error::UnsupportedMediaType { detail }
            })?;
            requested.extend(mt.uri_list("profile"));
        }

        if let Some(raw) = ctx.header("accept") {
            let mut acceptable = false;
            for entry in split_accept(raw) {
                let Some(mt) = MediaType::parse(&entry) else {
                    continue;
                };
                if mt.is_wildcard() {
                    acceptable = true;
                    continue;
                }
                if !mt.is_base() {
                    continue;
                }
                if self.check_accept_params(&mt, atomic).is_ok() {
                    acceptable = true;
                    requested.extend(mt.uri_list("profile"));
                }
            }
            if !acceptable {
                return Err(Error::NotAcceptable {
                    detail: format!(
                        "no acceptable instance of '{MEDIA_TYPE}' in the Accept header"
                    ),
                });
            }
        }

        let profiles = self.resolve_profiles(requested)?;
        Ok(Negotiation {
            content_type: self.response_content_type(atomic, &profiles),
            profiles,
        })
    }

    /// Parameter rules for `Content-Type`: only `ext` and `profile`, and the
    /// `ext` list must be exactly what the endpoint supports.
    fn check_params(&self, mt: &MediaType, atomic: bool) -> Result<(), String> {
        for (key, _) in mt.media_params() {
            if key != "ext" && key != "profile" {
                return Err(format!("media type parameter '{key}' is not allowed"));
            }
        }
        let exts = mt.uri_list("ext");
        for ext in &exts {
            if ext != ATOMIC_EXT {
                return Err(format!("extension '{ext}' is not supported"));
            }
            if !atomic {
                return Err(format!(
                    "extension '{ext}' is not supported on this endpoint"
                ));
            }
        }
        if atomic && !exts.iter().any(|e| e == ATOMIC_EXT) {
            return Err(format!(
                "the atomic operations endpoint requires ext=\"{ATOMIC_EXT}\""
            ));
        }
        Ok(())
    }

    fn check_accept_params(&self, mt: &MediaType, atomic: bool) -> Result<(), String> {
        self.check_params(mt, atomic)
    }

    fn resolve_profiles(&self, requested: Vec<String>) -> Result<ProfileContext, Error> {
        let mut profiles = ProfileContext::default();
        for uri in requested {
            if self.known_profiles.contains(&uri) {
                profiles.activate(uri);
            } else if self.config.profiles.strict {
                return Err(Error::UnsupportedProfile { uri });
            }
            // Unknown profiles are ignored outside strict mode.
        }
        Ok(profiles)
    }

    fn response_content_type(&self, atomic: bool, profiles: &ProfileContext) -> String {
        let mut ct = MEDIA_TYPE.to_string();
        if atomic {
            ct.push_str(&format!("; ext=\"{ATOMIC_EXT}\""));
        }
        if !profiles.is_empty() {
            let list: Vec<&str> = profiles.iter().collect();
            ct.push_str(&format!("; profile=\"{}\"", list.join(" ")));
        }
        ct
    }

    fn match_channel(&self, path: &str, route_name: &str) -> Option<&'a ChannelConfig> {
        self.config.channels.iter().find(|c| {
            c.path_prefix
                .as_deref()
                .is_some_and(|p| path.starts_with(p))
                || c.route_name.as_deref() == Some(route_name)
        })
    }

    /// Channel-scoped negotiation: the channel's allowed-media-type list
    /// replaces the strict rules entirely.
    fn negotiate_channel(
        &self,
        ctx: &RequestContext,
        channel: &ChannelConfig,
    ) -> Result<Negotiation, Error> {
        let allows = |essence: &str| {
            channel
                .media_types
                .iter()
                .any(|m| m == "*/*" || m.eq_ignore_ascii_case(essence))
        };

        if ctx.has_body() {
            let essence = ctx
                .header("content-type")
                .and_then(MediaType::parse)
                .map(|mt| mt.essence)
                .unwrap_or_default();
            if !allows(&essence) {
                return Err(Error::UnsupportedMediaType {
                    detail: format!("'{essence}' is not allowed on channel '{}'", channel.name),
                });
            }
        }

        if let Some(raw) = ctx.header("accept") {
            let ok = split_accept(raw).iter().any(|entry| {
                MediaType::parse(entry)
                    .map(|mt| mt.is_wildcard() || allows(&mt.essence))
                    .unwrap_or(false)
            });
            if !ok {
                return Err(Error::NotAcceptable {
                    detail: format!("no acceptable media type for channel '{}'", channel.name),
                });
            }
        }

        Ok(Negotiation {
            content_type: MEDIA_TYPE.to_string(),
            profiles: ProfileContext::default(),
        })
    }
}
