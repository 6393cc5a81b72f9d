//! Request body encoding and content negotiation

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Result;

/// Wire format for request bodies and the `Accept` header
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Json,
    Xml,
}

impl ContentType {
    /// Media type sent in `Accept` and `Content-Type`
    pub fn mime(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Xml => "application/xml",
        }
    }

    /// Serialize a request body in this format
    pub fn encode<B: Serialize + ?Sized>(self, body: &B) -> Result<Bytes> {
        let encoded = match self {
            Self::Json => serde_json::to_vec(body)?,
            Self::Xml => quick_xml::se::to_string(body)?.into_bytes(),
        };
        Ok(Bytes::from(encoded))
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("json"),
            Self::Xml => f.write_str("xml"),
        }
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "application/json" => Ok(Self::Json),
            "xml" | "application/xml" => Ok(Self::Xml),
            other => Err(format!("unknown content type: {other}")),
        }
    }
}
