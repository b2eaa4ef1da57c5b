//! Assembly of HAL documents from resources.

use std::sync::Arc;

use futures::StreamExt;

use super::{Relation, RelationItem, Resource, current_etag};
use crate::error::ResourceError;
use crate::etag::ETag;
use crate::json::{Value, ValueStream};

const LINKS: &str = "_links";
const EMBEDDED: &str = "_embedded";
const ETAG: &str = "_etag";
const RESERVED_ATTRIBUTES: &[&str] = &[LINKS, EMBEDDED, ETAG];

/// Renders `resource` as a HAL document:
///
/// ```text
/// { <attributes>, "_etag": ..., "_links": {...}, "_embedded": {...} }
/// ```
///
/// `_etag` is present only for a concrete tag, `_embedded` only if at least
/// one relation was asked to be embedded. A `self` link is synthesized from
/// the canonical URL if the resource doesn't provide one.
///
/// Everything that can fail here fails before a single byte of the document
/// is encoded. Embedded resources and streamed relations are only resolved
/// by the encoder.
pub async fn to_document(resource: &dyn Resource) -> Result<Value, ResourceError> {
    let view = resource.view();
    let embed = view.embed()?.clone();
    let attributes = resource.attributes().await?;
    let etag = current_etag(resource).await?;
    let relations = resource.link_relations().await?;

    let mut links: Vec<(String, Value)> = Vec::new();
    let mut embedded: Vec<(String, Value)> = Vec::new();
    for (name, relation) in relations {
        let embedding = embed.contains(&name);
        match relation {
            Relation::Resource(target) => {
                if embedding {
                    embedded.push((name, Value::Resource(target)));
                } else {
                    links.push((name, target.to_link().into()));
                }
            }
            Relation::Link(link) => {
                if embedding {
                    log::info!(
                        "Client asked to embed unembeddable link {} ({name})",
                        link.href
                    );
                }
                links.push((name, link.into()));
            }
            Relation::Items(items) => {
                let mut item_links: Vec<Value> = Vec::new();
                let mut item_resources: Vec<Value> = Vec::new();
                for item in items {
                    match item {
                        RelationItem::Resource(target) if embedding => {
                            item_resources.push(Value::Resource(target));
                        }
                        RelationItem::Resource(target) => item_links.push(target.to_link().into()),
                        RelationItem::Link(link) => {
                            if embedding {
                                log::info!(
                                    "Client asked to embed unembeddable link {} ({name})",
                                    link.href
                                );
                            }
                            item_links.push(link.into());
                        }
                    }
                }
                let item_links_empty = item_links.is_empty();
                if !embedding || !item_links_empty {
                    links.push((name.clone(), Value::array(item_links)));
                }
                // A list of plain links alone stays in `_links`.
                if embedding && (!item_resources.is_empty() || item_links_empty) {
                    embedded.push((name, Value::array(item_resources)));
                }
            }
            Relation::Stream(targets) => {
                let relation = name.clone();
                let values = targets.map(move |target| match target {
                    Ok(target) if embedding => Value::Resource(target),
                    Ok(target) => target.to_link().into(),
                    Err(e) => {
                        log::warn!("Failed to produce an item of relation {relation}: {e}");
                        error_document(None, &e)
                    }
                });
                let value = Value::Stream(ValueStream::new(values));
                if embedding {
                    embedded.push((name, value));
                } else {
                    links.push((name, value));
                }
            }
        }
    }
    if !links.iter().any(|(name, _)| name == "self") {
        links.push(("self".to_string(), resource.to_link().into()));
    }

    let mut document: Vec<(String, Value)> = Vec::with_capacity(attributes.len() + 3);
    for (key, value) in attributes {
        if RESERVED_ATTRIBUTES.contains(&key.as_str()) {
            log::warn!(
                "Attribute {key} of {} clashes with a HAL key; dropped",
                view.canonical_url()
            );
            continue;
        }
        document.push((key, value.into()));
    }
    if let ETag::Tag(tag) = etag {
        document.push((ETAG.to_string(), Value::String(tag)));
    }
    document.push((LINKS.to_string(), Value::Object(links.into())));
    if !embedded.is_empty() {
        document.push((EMBEDDED.to_string(), Value::Object(embedded.into())));
    }
    Ok(Value::Object(Arc::from(document)))
}

/// Stand-in for a sub-document that failed after the response was committed.
pub fn error_document(href: Option<String>, error: &ResourceError) -> Value {
    let mut entries = Vec::with_capacity(3);
    if let Some(href) = href {
        let self_link = Value::object([("href", Value::String(href))]);
        entries.push((LINKS.to_string(), Value::object([("self", self_link)])));
    }
    entries.push((
        "_status".to_string(),
        Value::UInt(error.status_code().as_u16().into()),
    ));
    entries.push(("description".to_string(), Value::String(error.to_string())));
    Value::Object(entries.into())
}
