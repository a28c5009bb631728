//! Request body encoders

use super::types::EncodeAs;
use crate::error::{Error, Result};
use crate::transform::Transformable;
use reqwest::header::{HeaderValue, CONTENT_TYPE};

impl EncodeAs {
    /// Encode the request body and set its `Content-Type`.
    ///
    /// JSON serialises the body and yields nothing for an empty one. Form
    /// moves the URL query into the body.
    pub fn encode(&self, tr: &mut Transformable) -> Result<Option<Vec<u8>>> {
        match self {
            Self::Json => {
                if !tr.has_body() {
                    return Ok(None);
                }
                let body = serde_json::to_vec(&tr.body).map_err(|e| Error::Encode {
                    message: format!("Failed to encode JSON body: {e}"),
                })?;
                tr.header
                    .insert(CONTENT_TYPE, HeaderValue::from_static(self.mime()));
                Ok(Some(body))
            }
            Self::Form => {
                let query = match tr.url.as_mut() {
                    Some(url) => {
                        let query = url.query().unwrap_or_default().to_string();
                        url.set_query(None);
                        query
                    }
                    None => String::new(),
                };
                tr.header
                    .insert(CONTENT_TYPE, HeaderValue::from_static(self.mime()));
                Ok(Some(query.into_bytes()))
            }
        }
    }
}
