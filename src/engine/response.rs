//! Response processing: decoding, response transforms and split

use crate::context::{ResponseSnapshot, TransformContext};
use crate::decode::DecodeAs;
use crate::error::{Error, Result};
use crate::http::HttpResponse;
use crate::loader::ResponseDefinition;
use crate::pagination::Pagination;
use crate::split::Split;
use crate::transform::{run_all, Namespace, Transform, TransformRegistry, Transformable};
use crate::types::JsonValue;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

/// Turns the responses of one step into events
#[derive(Debug, Clone, Default)]
pub struct ResponseProcessor {
    decode_as: Option<DecodeAs>,
    transforms: Vec<Transform>,
    split: Option<Split>,
    pagination: Pagination,
    save_first_response: bool,
}

impl ResponseProcessor {
    /// Compile a `response` block
    pub fn new(def: &ResponseDefinition, registry: &TransformRegistry) -> Result<Self> {
        Ok(Self {
            decode_as: def.decode_as,
            transforms: registry.build(Namespace::Response, &def.transforms)?,
            split: def
                .split
                .as_ref()
                .map(|s| Split::new(s, registry))
                .transpose()?,
            pagination: Pagination::new(def.pagination.as_ref(), registry)?,
            save_first_response: def.save_first_response,
        })
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    pub fn save_first_response(&self) -> bool {
        self.save_first_response
    }

    /// Decode a body with `decode_as`, else the response `Content-Type`
    pub fn decode(&self, resp: &HttpResponse) -> Result<JsonValue> {
        let decoder = self.decode_as.unwrap_or_else(|| {
            DecodeAs::from_content_type(resp.header.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()))
        });
        decoder.decode(&resp.body)
    }

    /// Snapshot of a decoded response for templates
    pub fn snapshot(resp: &HttpResponse, body: JsonValue, page: u64) -> ResponseSnapshot {
        ResponseSnapshot::new(resp.status, resp.header.clone(), resp.url.clone(), body, page)
    }

    /// Documents a page body holds: every object of a top-level array, or
    /// the body itself when it is an object
    pub fn documents(body: &JsonValue) -> Vec<JsonValue> {
        match body {
            JsonValue::Array(items) => items
                .iter()
                .filter(|item| {
                    let keep = item.is_object();
                    if !keep {
                        debug!("events must be JSON objects, skipping array element");
                    }
                    keep
                })
                .cloned()
                .collect(),
            JsonValue::Object(_) => vec![body.clone()],
            JsonValue::Null => Vec::new(),
            other => {
                warn!(kind = json_kind(other), "response body is not an object or array, skipping");
                Vec::new()
            }
        }
    }

    /// Run transforms and split over the documents of one page.
    ///
    /// Events produced before a failure are returned together with the error
    /// so they can still be published.
    pub fn events(&self, ctx: &TransformContext, documents: Vec<JsonValue>) -> (Vec<JsonValue>, Result<()>) {
        let mut events = Vec::new();
        for doc in documents {
            let mut tr = Transformable::from_body(doc);
            if let Err(e) = run_all(&self.transforms, ctx, &mut tr) {
                return (events, Err(e));
            }

            let Some(split) = &self.split else {
                events.push(tr.body);
                continue;
            };
            if let Err(e) = split.run(ctx, tr.body, &mut |event| events.push(event)) {
                match e {
                    Error::EmptyField => debug!("split operation finished"),
                    Error::EmptyRootField => debug!("{e}"),
                    other => {
                        debug!("split operation failed");
                        return (events, Err(other));
                    }
                }
            }
        }
        (events, Ok(()))
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
