use regex::Regex;
use scraper::{Html, Selector};

pub const FILENAME_PREFIX: &str = "tokyomotion";

const HEADING_SELECTORS: [&str; 2] = [".hidden-xs.big-title-truncate.m-t-0", "h1"];

/// Text of the page's title heading, trimmed.
pub fn page_heading(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let element = HEADING_SELECTORS.iter().find_map(|raw| {
        let selector = Selector::parse(raw).ok()?;
        document.select(&selector).next()
    })?;

    let text: String = element.text().collect();
    Some(text.trim().to_string())
}

fn numeric_id(page_url: &str) -> Option<String> {
    let mp4_id = Regex::new(r"/(\d+)\.mp4$").ok()?;
    let page_id = Regex::new(r"/video/(\d+)").ok()?;

    mp4_id
        .captures(page_url)
        .or_else(|| page_id.captures(page_url))
        .map(|caps| caps[1].to_string())
}

/// Filename stem for the video on `page_url`.
pub fn derive_title(page_url: &str, heading: Option<&str>) -> String {
    let mut filename = numeric_id(page_url)
        .map(|id| format!("{}_{}", FILENAME_PREFIX, id))
        .unwrap_or_default();

    if let Some(title) = heading.map(str::trim).filter(|t| !t.is_empty() && *t != "video") {
        filename = if filename.is_empty() {
            title.to_string()
        } else {
            format!("{}_{}", filename, title)
        };
    }

    if filename.is_empty() {
        filename = format!("{}_video", FILENAME_PREFIX);
    }
    filename
}
