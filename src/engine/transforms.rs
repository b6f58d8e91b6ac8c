//! Transforms used by the demo pipeline. Plain functions; the pipeline treats them as opaque.

use anyhow::{Result, bail};

use crate::utils::config::MAX_POST_CHARS;
use crate::{Post, Tagged};

/// Collapse runs of whitespace and trim. Fails on posts that end up empty or too long.
pub fn normalize(post: Post) -> Result<Post> {
    let text = post.text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        bail!("post #{} is empty", post.id);
    }
    let chars = text.chars().count();
    if chars > MAX_POST_CHARS {
        bail!(
            "post #{} is {} chars long (max {})",
            post.id,
            chars,
            MAX_POST_CHARS
        );
    }
    Ok(Post { id: post.id, text })
}

/// Pull `#hashtags` and `@mentions` out of the text: lowercased, sigil stripped, deduplicated
/// in order of first appearance.
pub fn tag(post: Post) -> Result<Tagged> {
    let hashtags = collect_marked(&post.text, '#');
    let mentions = collect_marked(&post.text, '@');
    Ok(Tagged {
        id: post.id,
        text: post.text,
        hashtags,
        mentions,
    })
}

fn collect_marked(text: &str, sigil: char) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for word in text.split_whitespace() {
        let Some(rest) = word.strip_prefix(sigil) else {
            continue;
        };
        let name: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || *c == '_')
            .flat_map(char::to_lowercase)
            .collect();
        if !name.is_empty() && !found.contains(&name) {
            found.push(name);
        }
    }
    found
}
