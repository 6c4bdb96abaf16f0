//! MediaWiki content source client.
//!
//! Talks to a MediaWiki installation's `api.php`: legacy single-step login,
//! full page enumeration (skipping redirects), revision content fetch, and
//! wikitext-to-plaintext cleaning. The cleaning pass converts template field
//! separators into line breaks, which is what turns `solution = ...` template
//! fields into the label lines the answer synthesizer extracts from.

use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::models::WikiPage;

pub struct MediaWikiClient {
    base_url: String,
    api_url: String,
    client: reqwest::Client,
}

impl MediaWikiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let api_url = format!("{}/api.php", base_url);

        // Cookie store: the legacy login flow authenticates the session,
        // not individual requests.
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            base_url,
            api_url,
            client,
        })
    }

    /// Legacy single-step `action=login` (old MediaWiki versions). Returns
    /// `Ok(false)` when the wiki refuses the credentials; `Err` only for
    /// transport-level failures.
    pub async fn login(&self, username: &str, password: &str) -> Result<bool> {
        let resp = self
            .client
            .post(&self.api_url)
            .form(&[
                ("action", "login"),
                ("lgname", username),
                ("lgpassword", password),
                ("format", "json"),
            ])
            .send()
            .await
            .context("wiki login request failed")?
            .error_for_status()?;

        let data: Value = resp.json().await?;
        let result = data
            .pointer("/login/result")
            .and_then(|v| v.as_str())
            .unwrap_or("");

        if result == "Success" {
            info!("wiki login succeeded");
            Ok(true)
        } else {
            warn!(result, "wiki login refused");
            Ok(false)
        }
    }

    /// Enumerate every page title, following `apcontinue` pagination and
    /// skipping redirects.
    pub async fn list_all_pages(&self) -> Result<Vec<String>> {
        let mut titles = Vec::new();
        let mut apcontinue: Option<String> = None;

        loop {
            let mut params: Vec<(&str, String)> = vec![
                ("action", "query".to_string()),
                ("list", "allpages".to_string()),
                ("aplimit", "500".to_string()),
                ("apfilterredir", "nonredirects".to_string()),
                ("format", "json".to_string()),
            ];
            if let Some(ref cont) = apcontinue {
                params.push(("apcontinue", cont.clone()));
            }

            let resp = self
                .client
                .get(&self.api_url)
                .query(&params)
                .send()
                .await
                .context("wiki page listing request failed")?
                .error_for_status()?;

            let data: Value = resp.json().await?;

            if let Some(pages) = data.pointer("/query/allpages").and_then(|v| v.as_array()) {
                for page in pages {
                    if let Some(title) = page.get("title").and_then(|t| t.as_str()) {
                        titles.push(title.to_string());
                    }
                }
            }

            match data.pointer("/continue/apcontinue").and_then(|v| v.as_str()) {
                Some(cont) => apcontinue = Some(cont.to_string()),
                None => break,
            }
        }

        Ok(titles)
    }

    /// Fetch a page's latest revision and clean it to plaintext. `None` when
    /// the page does not exist or carries no revision.
    pub async fn page_content(&self, title: &str) -> Result<Option<WikiPage>> {
        let params: Vec<(&str, String)> = vec![
            ("action", "query".to_string()),
            ("titles", title.to_string()),
            ("prop", "revisions".to_string()),
            ("rvprop", "content".to_string()),
            ("format", "json".to_string()),
        ];

        let resp = self
            .client
            .get(&self.api_url)
            .query(&params)
            .send()
            .await
            .with_context(|| format!("failed to fetch wiki page '{}'", title))?
            .error_for_status()?;

        let data: Value = resp.json().await?;

        let Some(pages) = data.pointer("/query/pages").and_then(|v| v.as_object()) else {
            return Ok(None);
        };

        for (page_id, page) in pages {
            if page_id == "-1" {
                continue;
            }
            let Some(wikitext) = page.pointer("/revisions/0/*").and_then(|v| v.as_str()) else {
                continue;
            };
            let page_title = page
                .get("title")
                .and_then(|t| t.as_str())
                .unwrap_or(title)
                .to_string();

            return Ok(Some(WikiPage {
                url: format!(
                    "{}/index.php?title={}",
                    self.base_url,
                    title.replace(' ', "_")
                ),
                title: page_title,
                content: clean_wikitext(wikitext),
            }));
        }

        Ok(None)
    }

    /// Enumerate and fetch everything, skipping pages whose cleaned content
    /// is empty. A failing page is logged and skipped, never fatal.
    pub async fn extract_all(&self) -> Result<Vec<WikiPage>> {
        let titles = self.list_all_pages().await?;
        info!(pages = titles.len(), "enumerated wiki pages");

        let mut pages = Vec::new();
        for title in &titles {
            match self.page_content(title).await {
                Ok(Some(page)) if !page.content.trim().is_empty() => pages.push(page),
                Ok(Some(_)) => debug!(title = %title, "skipped: empty after cleaning"),
                Ok(None) => debug!(title = %title, "skipped: no content returned"),
                Err(e) => warn!(title = %title, error = %e, "failed to fetch page"),
            }
        }

        info!(
            listed = titles.len(),
            extracted = pages.len(),
            "wiki extraction finished"
        );
        Ok(pages)
    }
}

/// Reduce wikitext to plaintext, optimized for template pages with
/// `label = value` fields.
pub fn clean_wikitext(wikitext: &str) -> String {
    struct Cleaners {
        br: Regex,
        template_open: Regex,
        internal_link: Regex,
        external_link: Regex,
        header: Regex,
        html_tag: Regex,
        category_link: Regex,
        category_line: Regex,
        spaces: Regex,
        blank_lines: Regex,
    }

    static CLEANERS: OnceLock<Cleaners> = OnceLock::new();
    let c = CLEANERS.get_or_init(|| Cleaners {
        br: Regex::new(r"(?i)<br\s*/?>").expect("valid regex"),
        template_open: Regex::new(r"\{\{[^|{}\n]*").expect("valid regex"),
        internal_link: Regex::new(r"\[\[(?:[^|\]]*\|)?([^\]]+)\]\]").expect("valid regex"),
        external_link: Regex::new(r"\[http[^\s\]]*\s*([^\]]*)\]").expect("valid regex"),
        header: Regex::new(r"(?m)^\s*=+\s*(.*?)\s*=+\s*$").expect("valid regex"),
        html_tag: Regex::new(r"<[^>]*>").expect("valid regex"),
        category_link: Regex::new(r"(?i)\[\[Category:[^\]]*\]\]").expect("valid regex"),
        category_line: Regex::new(r"(?i)Category:[^\n\r]*").expect("valid regex"),
        spaces: Regex::new(r"[ \t]+").expect("valid regex"),
        blank_lines: Regex::new(r"\n\s*\n+").expect("valid regex"),
    });

    let text = c.br.replace_all(wikitext, "\n");
    // Drop template definitions but keep their field content; the pipe
    // separators become line breaks so each field sits on its own line.
    let text = c.template_open.replace_all(&text, "");
    let text = text.replace("}}", "");
    let text = text.replace('|', "\n");
    let text = c.internal_link.replace_all(&text, "$1");
    let text = c.external_link.replace_all(&text, "$1");
    let text = text.replace("'''", "").replace("''", "");
    let text = c.header.replace_all(&text, "$1");
    let text = c.html_tag.replace_all(&text, "");
    let text = c.category_link.replace_all(&text, "");
    let text = c.category_line.replace_all(&text, "");
    let text = c.spaces.replace_all(&text, " ");
    let text = c.blank_lines.replace_all(&text, "\n\n");

    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_br_tags() {
        assert_eq!(clean_wikitext("one<br>two<BR />three"), "one\ntwo\nthree");
    }

    #[test]
    fn test_clean_template_fields_become_lines() {
        let wikitext = "{{FAQ errors\n| error = 528\n| solution = resubmit the batch\n}}";
        let cleaned = clean_wikitext(wikitext);
        assert!(cleaned.contains("error = 528"));
        assert!(cleaned.contains("solution = resubmit the batch"));
        assert!(!cleaned.contains("{{"));
        assert!(!cleaned.contains("}}"));
        assert!(!cleaned.contains('|'));
    }

    #[test]
    fn test_clean_links_keep_text() {
        assert_eq!(clean_wikitext("see [[Setup Guide]] here"), "see Setup Guide here");
        assert_eq!(
            clean_wikitext("see [http://example.com the site] here"),
            "see the site here"
        );
    }

    #[test]
    fn test_clean_formatting_and_headers() {
        assert_eq!(clean_wikitext("'''bold''' and ''italic''"), "bold and italic");
        assert_eq!(clean_wikitext("== Overview ==\nbody text"), "Overview\nbody text");
    }

    #[test]
    fn test_clean_html_and_categories() {
        assert_eq!(clean_wikitext("text <span>inline</span> end"), "text inline end");
        let cleaned = clean_wikitext("body\n[[Category:Errors]]\nmore");
        assert!(!cleaned.to_lowercase().contains("category"));
        assert!(cleaned.contains("body"));
        assert!(cleaned.contains("more"));
    }

    #[test]
    fn test_clean_collapses_whitespace() {
        let cleaned = clean_wikitext("a    b\n\n\n\nc\t\td");
        assert_eq!(cleaned, "a b\n\nc d");
    }

    #[test]
    fn test_clean_empty_input() {
        assert_eq!(clean_wikitext("   \n  "), "");
    }
}
