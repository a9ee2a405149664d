//! Finds playable media URLs in a page.
//!
//! Three strategies are tried in order and the first one that yields anything
//! wins; results are never merged across strategies.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::domain::SourceDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    VideoElement,
    SourceTag,
    ScriptText,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discovery {
    pub strategy: Strategy,
    pub sources: Vec<SourceDescriptor>,
}

pub fn discover(html: &str, page_url: &str) -> Option<Discovery> {
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();
    let base = base.as_ref();

    let found = from_video_element(&document, base)
        .map(|sources| (Strategy::VideoElement, sources))
        .or_else(|| from_source_tags(&document, base).map(|sources| (Strategy::SourceTag, sources)))
        .or_else(|| from_script_text(&document).map(|sources| (Strategy::ScriptText, sources)));

    found.map(|(strategy, sources)| Discovery { strategy, sources })
}

/// Resolves an attribute value the way `element.src` does; empty means absent.
fn resolved_src(element: ElementRef<'_>, base: Option<&Url>) -> Option<String> {
    let raw = element.value().attr("src")?.trim();
    if raw.is_empty() {
        return None;
    }
    let resolved = base
        .and_then(|base| base.join(raw).ok())
        .map(|url| url.to_string())
        .unwrap_or_else(|| raw.to_string());
    Some(resolved)
}

fn from_video_element(document: &Html, base: Option<&Url>) -> Option<Vec<SourceDescriptor>> {
    let video_selector = Selector::parse("video").ok()?;
    let source_selector = Selector::parse("source").ok()?;

    let video = document.select(&video_selector).next()?;
    let src = resolved_src(video, base).or_else(|| {
        video
            .select(&source_selector)
            .next()
            .and_then(|source| resolved_src(source, base))
    })?;

    Some(vec![SourceDescriptor::mp4(src)])
}

fn from_source_tags(document: &Html, base: Option<&Url>) -> Option<Vec<SourceDescriptor>> {
    let selector = Selector::parse("source").ok()?;
    let mp4 = Regex::new(r"(?i)\.mp4(\?|$)").ok()?;

    document.select(&selector).find_map(|source| {
        let src = resolved_src(source, base)?;
        if !mp4.is_match(&src) {
            return None;
        }
        let mime_type = source
            .value()
            .attr("type")
            .filter(|t| !t.is_empty())
            .unwrap_or("video/mp4")
            .to_string();
        Some(vec![SourceDescriptor { src, mime_type }])
    })
}

fn from_script_text(document: &Html) -> Option<Vec<SourceDescriptor>> {
    let selector = Selector::parse("script").ok()?;
    let mp4_url = Regex::new(r#"(?i)https?://[^"'\s]+\.mp4(?:\?[^"'\s]*)?"#).ok()?;
    let video_path_url = Regex::new(r#"(?i)https?://[^"'\s]+/video/[^"'\s]+"#).ok()?;

    document.select(&selector).find_map(|script| {
        let content: String = script.text().collect();
        let found = mp4_url
            .find(&content)
            .or_else(|| video_path_url.find(&content))?;
        Some(vec![SourceDescriptor::mp4(found.as_str())])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "https://www.tokyomotion.net/video/42/clip";

    fn srcs(discovery: &Discovery) -> Vec<&str> {
        discovery.sources.iter().map(|s| s.src.as_str()).collect()
    }

    #[test]
    fn test_video_element_wins_over_everything() {
        let html = r#"
            <video src="https://www.tokyomotion.net/vsrc/hd/42"></video>
            <source src="https://cdn.example/other.mp4">
            <script>var u = "https://cdn.example/script.mp4";</script>
        "#;
        let discovery = discover(html, PAGE).unwrap();
        assert_eq!(discovery.strategy, Strategy::VideoElement);
        assert_eq!(srcs(&discovery), vec!["https://www.tokyomotion.net/vsrc/hd/42"]);
    }

    #[test]
    fn test_video_element_nested_source() {
        let html = r#"<video controls><source src="/vsrc/sd/42" type="video/mp4"></video>"#;
        let discovery = discover(html, PAGE).unwrap();
        assert_eq!(discovery.strategy, Strategy::VideoElement);
        assert_eq!(srcs(&discovery), vec!["https://www.tokyomotion.net/vsrc/sd/42"]);
        assert_eq!(discovery.sources[0].mime_type, "video/mp4");
    }

    #[test]
    fn test_source_tag_needs_mp4_extension() {
        let html = r#"
            <audio><source src="https://cdn.example/track.ogg"></audio>
            <picture><source src="https://cdn.example/a.MP4?token=1" type="video/webm"></picture>
            <source src="https://cdn.example/b.mp4">
        "#;
        let discovery = discover(html, PAGE).unwrap();
        assert_eq!(discovery.strategy, Strategy::SourceTag);
        // Only the first match, with its declared type.
        assert_eq!(srcs(&discovery), vec!["https://cdn.example/a.MP4?token=1"]);
        assert_eq!(discovery.sources[0].mime_type, "video/webm");
    }

    #[test]
    fn test_video_without_any_src_falls_through() {
        let html = r#"
            <video></video>
            <script>player.setup({file: 'https://www47.tokyomotion.net/hd/42.mp4?e=1'});</script>
        "#;
        let discovery = discover(html, PAGE).unwrap();
        assert_eq!(discovery.strategy, Strategy::ScriptText);
        assert_eq!(srcs(&discovery), vec!["https://www47.tokyomotion.net/hd/42.mp4?e=1"]);
    }

    #[test]
    fn test_script_mp4_preferred_over_video_path_within_script() {
        let html = r#"<script>
            var page = "https://www.tokyomotion.net/video/42";
            var file = "https://cdn.example/42.mp4";
        </script>"#;
        let discovery = discover(html, PAGE).unwrap();
        assert_eq!(srcs(&discovery), vec!["https://cdn.example/42.mp4"]);
    }

    #[test]
    fn test_script_video_path_fallback() {
        let html = r#"
            <script>var nothing = 1;</script>
            <script>load("https://www.tokyomotion.net/video/42/clip");</script>
        "#;
        let discovery = discover(html, PAGE).unwrap();
        assert_eq!(discovery.strategy, Strategy::ScriptText);
        assert_eq!(srcs(&discovery), vec!["https://www.tokyomotion.net/video/42/clip"]);
    }

    #[test]
    fn test_nothing_found() {
        let html = r#"<html><body><p>loading…</p><script>var x = "/relative.mp4";</script></body></html>"#;
        assert_eq!(discover(html, PAGE), None);
    }
}
