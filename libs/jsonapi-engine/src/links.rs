//! Absolute link generation.
//!
//! Pagination links preserve every non-page query parameter of the
//! original request; `prev` is omitted on page 1 and `next` on the last
//! page. A per-resource route prefix overrides the engine-wide one.

use jsonapi_core::{Link, Links, Slice};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::registry::ResourceMetadata;

pub struct LinkBuilder<'a> {
    config: &'a EngineConfig,
}

impl<'a> LinkBuilder<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    fn prefix_for<'b>(&self, meta: &'b ResourceMetadata) -> &'b str
    where
        'a: 'b,
    {
        meta.route_prefix
            .as_deref()
            .unwrap_or(&self.config.url.prefix)
    }

    pub fn collection(&self, meta: &ResourceMetadata) -> String {
        format!(
            "{}{}/{}",
            self.config.url.base.trim_end_matches('/'),
            self.prefix_for(meta),
            meta.type_name
        )
    }

    pub fn resource(&self, meta: &ResourceMetadata, id: &str) -> String {
        format!("{}/{}", self.collection(meta), urlencoding::encode(id))
    }

    pub fn relationship_self(&self, meta: &ResourceMetadata, id: &str, rel: &str) -> String {
        format!("{}/relationships/{rel}", self.resource(meta, id))
    }

    pub fn relationship_related(&self, meta: &ResourceMetadata, id: &str, rel: &str) -> String {
        format!("{}/{rel}", self.resource(meta, id))
    }

    /// The collection `self` link with the request's query string attached.
    pub fn collection_with_query(&self, meta: &ResourceMetadata, raw_query: &str) -> String {
        let base = self.collection(meta);
        if raw_query.is_empty() {
            base
        } else {
            format!("{base}?{raw_query}")
        }
    }

    /// `first`/`last`/`prev`/`next` for a collection page, preserving the
    /// original `include`/`fields`/`sort`/`filter` parameters.
    pub fn pagination(
        &self,
        meta: &ResourceMetadata,
        raw_query: &str,
        slice: &Slice<Value>,
    ) -> Links {
        let preserved: Vec<(String, String)> = url::form_urlencoded::parse(raw_query.as_bytes())
            .filter(|(k, _)| k != "page[number]" && k != "page[size]")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let base = self.collection(meta);
        let page_url = |number: u64| -> Link {
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            for (k, v) in &preserved {
                serializer.append_pair(k, v);
            }
            serializer.append_pair("page[number]", &number.to_string());
            serializer.append_pair("page[size]", &slice.page_size.to_string());
            Link::Href(format!("{base}?{}", serializer.finish()))
        };

        let last = slice.last_page();
        let mut links = Links::new();
        links.insert("first".to_string(), page_url(1));
        links.insert("last".to_string(), page_url(last));
        if slice.has_prev() {
            links.insert("prev".to_string(), page_url(slice.page_number - 1));
        }
        if slice.has_next() {
            links.insert("next".to_string(), page_url(slice.page_number + 1));
        }
        links
    }
}
