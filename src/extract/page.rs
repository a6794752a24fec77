use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;

use crate::error::PageError;
use crate::language::detect_language_from_shape;
use crate::validate::{is_plausible_code, is_plausible_language_label};

/// One-shot settle delay before scanning, so client-side rendering on the
/// submission page has finished painting. No polling.
const SETTLE_DELAY_MS: u64 = 400;

/// Candidate locators per field, most specific first. Code and language
/// candidates must additionally pass validation before they are accepted.
const TITLE_SELECTORS: &[&str] = &[
    "[data-cy='question-title']",
    "div.question-title h3",
    "h4[data-title]",
    ".question-title",
    "h1",
];

const CODE_SELECTORS: &[&str] = &[
    ".view-lines .view-line",
    ".ace_content .ace_line",
    "pre code",
    ".CodeMirror-code",
    "pre",
];

const LANG_SELECTORS: &[&str] = &[
    "[data-cy='lang-select']",
    "#result_language",
    ".ant-select-selection-selected-value",
    "[id^='headlessui-listbox-button'] div",
];

/// Rendered submission page, however it was obtained.
#[async_trait]
pub trait PageSource {
    async fn html(&self) -> Result<String, PageError>;
}

/// Fetch the page over HTTP, one attempt.
pub struct HttpPage {
    pub url: String,
}

#[async_trait]
impl PageSource for HttpPage {
    async fn html(&self) -> Result<String, PageError> {
        let response = reqwest::get(&self.url)
            .await
            .map_err(|e| PageError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PageError::Unavailable(format!(
                "status {} fetching {}",
                response.status(),
                self.url
            )));
        }
        response
            .text()
            .await
            .map_err(|e| PageError::Unavailable(e.to_string()))
    }
}

/// An already-rendered snapshot (CLI `--page-file`, tests).
pub struct StaticPage(pub String);

#[async_trait]
impl PageSource for StaticPage {
    async fn html(&self) -> Result<String, PageError> {
        Ok(self.0.clone())
    }
}

#[derive(Debug)]
pub struct PageFields {
    pub title: String,
    pub code: String,
    pub language: String,
}

/// Scan the rendered page for title, code, and language. Title accepts
/// the first non-empty candidate; code and language must also survive
/// validation. A page without a validated language falls back to shape
/// detection instead of failing.
pub async fn scrape_submission(page: &(impl PageSource + ?Sized)) -> Result<PageFields, PageError> {
    tokio::time::sleep(Duration::from_millis(SETTLE_DELAY_MS)).await;
    let html = page.html().await?;
    extract_fields(&html)
}

fn extract_fields(html: &str) -> Result<PageFields, PageError> {
    let doc = Html::parse_document(html);

    let title = first_text(&doc, TITLE_SELECTORS)
        .ok_or(PageError::StructureMissing("title"))?;

    let code = first_accepted(&doc, CODE_SELECTORS, is_plausible_code)
        .ok_or(PageError::StructureMissing("code"))?;

    let language = match first_accepted(&doc, LANG_SELECTORS, is_plausible_language_label) {
        Some(label) => label.trim().to_string(),
        None => {
            let guessed = detect_language_from_shape(&code);
            debug!("no language locator matched, shape detection gave {}", guessed);
            guessed.to_string()
        }
    };

    Ok(PageFields { title, code, language })
}

/// First locator whose first element yields non-empty text.
fn first_text(doc: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|s| {
        let sel = Selector::parse(s).ok()?;
        let text = element_text(doc.select(&sel).next()?).trim().to_string();
        (!text.is_empty()).then_some(text)
    })
}

/// First locator whose joined text passes `accept`. Line-oriented editor
/// DOMs match many elements per locator, so all hits are joined
/// line-wise before validation. Leading whitespace stays: it is
/// significant in indentation-sensitive code.
fn first_accepted(doc: &Html, selectors: &[&str], accept: fn(&str) -> bool) -> Option<String> {
    selectors.iter().find_map(|s| {
        let sel = Selector::parse(s).ok()?;
        let text = doc
            .select(&sel)
            .map(|el| element_text(el).trim_end().to_string())
            .filter(|t| !t.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        (!text.trim().is_empty() && accept(&text)).then_some(text)
    })
}

fn element_text(el: scraper::ElementRef) -> String {
    el.text().collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn full_submission_page() {
        let fields = extract_fields(&fixture("submission_page")).unwrap();
        assert_eq!(fields.title, "14. Longest Common Prefix");
        assert!(fields.code.contains("longestCommonPrefix"));
        assert_eq!(fields.language, "Python3");
    }

    #[test]
    fn monaco_lines_joined() {
        let fields = extract_fields(&fixture("submission_page")).unwrap();
        // One .view-line per source line, joined line-wise
        assert!(fields.code.lines().count() >= 3);
    }

    #[test]
    fn language_falls_back_to_shape_detection() {
        let fields = extract_fields(&fixture("submission_page_no_lang")).unwrap();
        assert_eq!(fields.language, "Python");
    }

    #[test]
    fn missing_title_reported() {
        let html = "<html><body><pre>function foo() { return 1; }</pre></body></html>";
        assert!(matches!(
            extract_fields(html),
            Err(PageError::StructureMissing("title"))
        ));
    }

    #[test]
    fn missing_code_reported() {
        let html = "<html><body><h1>Two Sum</h1><p>no code here</p></body></html>";
        assert!(matches!(
            extract_fields(html),
            Err(PageError::StructureMissing("code"))
        ));
    }

    #[test]
    fn implausible_code_candidate_skipped() {
        // First locator hit is garbage; the plain <pre> further down wins
        let html = concat!(
            "<html><body><h1>Two Sum</h1>",
            "<div class='view-lines'><div class='view-line'>+--+--+--+--+</div>",
            "<div class='view-line'>|##|##|##|##|</div></div>",
            "<pre>def two_sum(nums):\n    return []</pre>",
            "</body></html>",
        );
        let fields = extract_fields(html).unwrap();
        assert!(fields.code.contains("two_sum"));
    }
}
