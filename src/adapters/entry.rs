//! Raw timeline entry validation.
//!
//! Feed pages mix post entries with cursors, promoted modules and tombstones.
//! Only entries that resolve to a post with an identifier become records.

use serde_json::Value;

use crate::domain::{Record, MAX_MEDIA_PER_RECORD};

/// Turn a raw feed entry into a record, or `None` if it is not a usable post
pub fn parse_entry(entry: &Value) -> Option<Record> {
    let result = post_result(entry)?;
    let legacy = result.get("legacy");

    let id = str_at(result, "/rest_id")
        .or_else(|| legacy.and_then(|l| str_at(l, "/id_str")))
        .filter(|id| !id.is_empty())?;

    let mut record = Record::new(id);

    if let Some(legacy) = legacy {
        record.content = str_at(legacy, "/full_text").unwrap_or_default();
        record.possibly_sensitive = legacy
            .get("possibly_sensitive")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        record.media_urls = media_urls(legacy);
    }

    if let Some(user) = result.pointer("/core/user_results/result") {
        record.author_name = str_at(user, "/legacy/name")
            .or_else(|| str_at(user, "/core/name"))
            .unwrap_or_default();
        record.author_handle = str_at(user, "/legacy/screen_name")
            .or_else(|| str_at(user, "/core/screen_name"))
            .unwrap_or_default();
        record.avatar_url = str_at(user, "/legacy/profile_image_url_https")
            .or_else(|| str_at(user, "/avatar/image_url"))
            .unwrap_or_default();
    }

    Some(record)
}

/// Locate the post object inside an entry, unwrapping visibility wrappers
fn post_result(entry: &Value) -> Option<&Value> {
    let result = entry.pointer("/content/itemContent/tweet_results/result")?;
    match result.get("__typename").and_then(Value::as_str) {
        Some("TweetWithVisibilityResults") => result.get("tweet"),
        Some("TweetTombstone") | Some("TweetUnavailable") => None,
        _ => Some(result),
    }
}

fn media_urls(legacy: &Value) -> Vec<String> {
    legacy
        .pointer("/extended_entities/media")
        .and_then(Value::as_array)
        .map(|media| {
            media
                .iter()
                .filter_map(|m| m.get("media_url_https").and_then(Value::as_str))
                .filter(|url| !url.is_empty())
                .take(MAX_MEDIA_PER_RECORD)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn str_at(value: &Value, pointer: &str) -> Option<String> {
    value.pointer(pointer)?.as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post_entry(id: &str) -> Value {
        json!({
            "entryId": format!("tweet-{}", id),
            "content": {
                "itemContent": {
                    "tweet_results": {
                        "result": {
                            "__typename": "Tweet",
                            "rest_id": id,
                            "core": {
                                "user_results": {
                                    "result": {
                                        "legacy": {
                                            "name": "Ada",
                                            "screen_name": "ada",
                                            "profile_image_url_https": "https://pbs.example/profile_images/1/a_normal.jpg"
                                        }
                                    }
                                }
                            },
                            "legacy": {
                                "full_text": "hello",
                                "possibly_sensitive": true,
                                "extended_entities": {
                                    "media": [
                                        {"media_url_https": "https://pbs.example/media/1.jpg"},
                                        {"media_url_https": "https://pbs.example/media/2.png"},
                                        {"media_url_https": "https://pbs.example/media/3.jpg"},
                                        {"media_url_https": "https://pbs.example/media/4.jpg"},
                                        {"media_url_https": "https://pbs.example/media/5.jpg"}
                                    ]
                                }
                            }
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn test_parse_full_entry() {
        let record = parse_entry(&post_entry("100")).unwrap();
        assert_eq!(record.id, "100");
        assert_eq!(record.content, "hello");
        assert!(record.possibly_sensitive);
        assert_eq!(record.author_name, "Ada");
        assert_eq!(record.author_handle, "ada");
        assert!(record.avatar_url.ends_with("a_normal.jpg"));
        assert_eq!(record.media_urls.len(), MAX_MEDIA_PER_RECORD);
        assert_eq!(record.media_urls[1], "https://pbs.example/media/2.png");
    }

    #[test]
    fn test_visibility_wrapper_unwrapped() {
        let entry = json!({
            "content": {"itemContent": {"tweet_results": {"result": {
                "__typename": "TweetWithVisibilityResults",
                "tweet": {"rest_id": "7", "legacy": {"full_text": "wrapped"}}
            }}}}
        });
        let record = parse_entry(&entry).unwrap();
        assert_eq!(record.id, "7");
        assert_eq!(record.content, "wrapped");
    }

    #[test]
    fn test_cursor_entry_is_not_a_record() {
        let entry = json!({"entryId": "cursor-bottom-1", "content": {"value": "abc"}});
        assert!(parse_entry(&entry).is_none());
    }

    #[test]
    fn test_entry_without_identifier_is_rejected() {
        let entry = json!({
            "content": {"itemContent": {"tweet_results": {"result": {
                "legacy": {"full_text": "no id"}
            }}}}
        });
        assert!(parse_entry(&entry).is_none());
    }

    #[test]
    fn test_tombstone_is_rejected() {
        let entry = json!({
            "content": {"itemContent": {"tweet_results": {"result": {
                "__typename": "TweetTombstone", "rest_id": "9"
            }}}}
        });
        assert!(parse_entry(&entry).is_none());
    }

    #[test]
    fn test_id_str_fallback() {
        let entry = json!({
            "content": {"itemContent": {"tweet_results": {"result": {
                "legacy": {"id_str": "55", "full_text": "legacy id"}
            }}}}
        });
        assert_eq!(parse_entry(&entry).unwrap().id, "55");
    }
}
