//! Content extraction: pure transformations from raw post payloads to
//! analysis-ready records.
//!
//! Hashtags, mentions and URLs are extracted from the original text so that
//! casing and order of appearance are preserved; `clean_text` produces a
//! separate field with URLs and mention tokens stripped.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{ArchivedPost, MediaRefs, RawPost};

static RE_URL_LIKE: Lazy<Regex> = Lazy::new(|| Regex::new(r"http\S+|www\.\S+").unwrap());
static RE_MENTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(\w+)").unwrap());
static RE_HASHTAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"#(\w+)").unwrap());
static RE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[\w$\-@.&+!*(),%/:=?#~]+").unwrap());
static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").unwrap());

/// Remove URL-like substrings and @-mention tokens, collapse whitespace.
pub fn clean_text(text: &str) -> String {
    let no_urls = RE_URL_LIKE.replace_all(text, "");
    let no_mentions = RE_MENTION.replace_all(&no_urls, "");
    no_mentions.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Every maximal run of word characters immediately preceded by `#`,
/// in order of appearance, duplicates preserved.
pub fn extract_hashtags(text: &str) -> Vec<String> {
    RE_HASHTAG
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

/// Every maximal run of word characters immediately preceded by `@`.
pub fn extract_mentions(text: &str) -> Vec<String> {
    RE_MENTION
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

/// Scheme-prefixed URL tokens, tolerant of common URL-safe punctuation.
pub fn extract_urls(text: &str) -> Vec<String> {
    RE_URL
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Strip HTML tags, leaving the anchor text (used for the declared client
/// field, which arrives as an `<a href=...>` fragment).
pub fn html_to_text(html: &str) -> String {
    RE_TAGS.replace_all(html, "").trim().to_string()
}

/// Resolve the text and media the record should be built from.
///
/// A pure repost contributes the reposted post's media instead of the
/// wrapper's own. A quote appends a rendered "Quote: @handle: text" suffix.
/// The declared client, when present, is always appended in plain text.
pub fn effective_content(post: &RawPost) -> (String, MediaRefs) {
    let mut text = post.text.clone();

    let media = if let Some(reposted) = &post.reposted {
        reposted.media.clone()
    } else {
        if let Some(quoted) = &post.quoted {
            text.push_str(&format!(
                "\n\nQuote: @{}: {}",
                quoted.author_handle, quoted.text
            ));
        }
        post.media.clone()
    };

    if let Some(source_html) = &post.source_html {
        text.push_str(&format!("\n\nSource: {}", html_to_text(source_html)));
    }

    (text, media)
}

/// Build the normalized record for one admitted post.
///
/// `text` and `media` are the effective content from [`effective_content`];
/// extraction fields come from that text, not the cleaned form.
pub fn normalize(account: &str, text: &str, media: MediaRefs, post: &RawPost) -> ArchivedPost {
    ArchivedPost {
        post_id: post.id,
        account: account.to_string(),
        created_at: post.created_at,
        clean_text: clean_text(text),
        hashtags: extract_hashtags(text),
        mentions: extract_mentions(text),
        urls: extract_urls(text),
        media: media.into(),
        engagement: post.engagement,
        is_repost: post.reposted.is_some(),
        is_reply: post.in_reply_to_id.is_some(),
        is_quote: post.quoted.is_some(),
        conversation_id: post.conversation_id,
        language: post.language.clone(),
    }
}
