//! Content records: imported pages and posts and their block bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentType {
    Page,
    Post,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Page => "PAGE",
            ContentType::Post => "POST",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PAGE" => Some(ContentType::Page),
            "POST" => Some(ContentType::Post),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentStatus {
    Draft,
    Published,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "DRAFT",
            ContentStatus::Published => "PUBLISHED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(ContentStatus::Draft),
            "PUBLISHED" => Some(ContentStatus::Published),
            _ => None,
        }
    }
}

/// One unit of a page body: a raw HTML fragment or an image reference.
///
/// Serialized with an explicit `tag` discriminant. Older payloads predate
/// the tag, so decoding infers the variant from field presence when the tag
/// is absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "tag", rename_all = "lowercase")]
pub enum ContentBlock {
    Html {
        html: String,
    },
    Image {
        src: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        alt: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },
}

#[derive(Deserialize)]
struct RawBlock {
    tag: Option<String>,
    html: Option<String>,
    src: Option<String>,
    alt: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawBlock::deserialize(deserializer)?;
        let tag = match raw.tag.as_deref() {
            Some(t) => t.to_string(),
            // Legacy payloads carry no tag; infer from fields.
            None if raw.html.is_some() => "html".to_string(),
            None if raw.src.is_some() => "image".to_string(),
            None => {
                return Err(serde::de::Error::custom(
                    "content block has neither tag, html nor src",
                ))
            }
        };
        match tag.as_str() {
            "html" => Ok(ContentBlock::Html {
                html: raw.html.unwrap_or_default(),
            }),
            "image" => Ok(ContentBlock::Image {
                src: raw
                    .src
                    .ok_or_else(|| serde::de::Error::custom("image block missing src"))?,
                alt: raw.alt,
                width: raw.width,
                height: raw.height,
            }),
            other => Err(serde::de::Error::custom(format!(
                "unknown content block tag: {other}"
            ))),
        }
    }
}

/// One imported page or post, keyed by path.
///
/// `path` is normalized with no leading or trailing slash; the empty string
/// is the site home.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: i64,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub path: String,
    pub title: String,
    pub status: ContentStatus,
    pub blocks: Vec<ContentBlock>,
    pub legacy_wp_id: Option<i64>,
    pub legacy_body_class: Option<String>,
    pub seo_title: Option<String>,
    pub seo_desc: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_roundtrip() {
        let block = ContentBlock::Image {
            src: "/media/photo.jpg".into(),
            alt: Some("a photo".into()),
            width: Some(800),
            height: None,
        };
        let json = serde_json::to_string(&block).unwrap();
        let back: ContentBlock = serde_json::from_str(&json).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn test_block_decode_infers_html_variant() {
        let back: ContentBlock = serde_json::from_str(r#"{"html":"<p>hi</p>"}"#).unwrap();
        assert_eq!(
            back,
            ContentBlock::Html {
                html: "<p>hi</p>".into()
            }
        );
    }

    #[test]
    fn test_block_decode_infers_image_variant() {
        let back: ContentBlock = serde_json::from_str(r#"{"src":"/media/a.png"}"#).unwrap();
        assert_eq!(
            back,
            ContentBlock::Image {
                src: "/media/a.png".into(),
                alt: None,
                width: None,
                height: None
            }
        );
    }

    #[test]
    fn test_block_decode_rejects_empty_object() {
        assert!(serde_json::from_str::<ContentBlock>("{}").is_err());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ContentStatus::from_str("PUBLISHED"), Some(ContentStatus::Published));
        assert_eq!(ContentStatus::from_str("published"), None);
    }
}
