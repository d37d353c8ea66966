//! HTML parser for extracting links and forms
//!
//! Parsing is done eagerly into plain owned structures so that no DOM handle
//! outlives the call.

use crate::browser::{FormControl, FormSummary};
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Button labels that mark a `<button>` as a submit control
const SUBMIT_LABELS: [&str; 3] = ["login", "sign in", "submit"];

/// Links and forms extracted from one page
#[derive(Debug, Clone, Default)]
pub(crate) struct ParsedPage {
    pub links: Vec<Url>,
    pub forms: Vec<ParsedForm>,
}

#[derive(Debug, Clone)]
pub(crate) struct ParsedForm {
    pub method: String,
    pub action: Url,
    pub controls: Vec<ParsedControl>,
}

#[derive(Debug, Clone)]
pub(crate) struct ParsedControl {
    pub summary: FormControl,
    pub value: String,
    pub disabled: bool,
    pub checked: bool,
}

impl ParsedForm {
    pub fn summary(&self, index: usize) -> FormSummary {
        FormSummary {
            index,
            method: self.method.clone(),
            action: self.action.to_string(),
            controls: self.controls.iter().map(|c| c.summary.clone()).collect(),
        }
    }

    /// Name/value pairs a browser would submit when `clicked` is activated
    pub fn submission(&self, clicked: usize) -> Vec<(String, String)> {
        self.controls
            .iter()
            .filter(|control| !control.disabled)
            .filter_map(|control| {
                let name = control.summary.name.clone()?;
                let include = match control.summary.input_type.as_deref() {
                    Some("checkbox") | Some("radio") => control.checked,
                    Some("file") => false,
                    _ if control.is_button() => control.summary.index == clicked,
                    _ => true,
                };
                include.then(|| (name, control.value.clone()))
            })
            .collect()
    }
}

impl ParsedControl {
    pub fn is_button(&self) -> bool {
        self.summary.tag == "button"
            || matches!(
                self.summary.input_type.as_deref(),
                Some("submit") | Some("button") | Some("reset") | Some("image")
            )
    }

    /// Whether the control can take a typed value
    pub fn is_fillable(&self) -> bool {
        match self.summary.tag.as_str() {
            "textarea" => true,
            "input" => !self.is_button()
                && !matches!(
                    self.summary.input_type.as_deref(),
                    Some("checkbox") | Some("radio") | Some("file")
                ),
            _ => false,
        }
    }
}

/// Parses an HTML document
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `base_url` - The URL the document was served from
pub(crate) fn parse_page(html: &str, base_url: &Url) -> ParsedPage {
    let document = Html::parse_document(html);
    ParsedPage {
        links: extract_links(&document, base_url),
        forms: extract_forms(&document, base_url),
    }
}

/// Extracts absolute http(s) links from `<a href>` elements
fn extract_links(document: &Html, base_url: &Url) -> Vec<Url> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| resolve_link(href, base_url))
        .collect()
}

/// Resolves a link href to an absolute URL
///
/// Returns None for `javascript:`, `mailto:`, `tel:` and `data:` links,
/// fragment-only links and anything that is not http(s) after resolution.
pub(crate) fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    matches!(absolute.scheme(), "http" | "https").then_some(absolute)
}

fn extract_forms(document: &Html, base_url: &Url) -> Vec<ParsedForm> {
    let (Ok(form_selector), Ok(control_selector)) = (
        Selector::parse("form"),
        Selector::parse("input, textarea, select, button"),
    ) else {
        return Vec::new();
    };

    document
        .select(&form_selector)
        .map(|form| {
            let method = form_method(form.value().attr("method"));
            let action = form_action(form.value().attr("action"), base_url);

            let controls = form
                .select(&control_selector)
                .enumerate()
                .map(|(index, element)| parse_control(index, element))
                .collect();

            ParsedForm {
                method,
                action,
                controls,
            }
        })
        .collect()
}

fn parse_control(index: usize, element: ElementRef<'_>) -> ParsedControl {
    let attrs = element.value();
    let tag = attrs.name().to_ascii_lowercase();
    let input_type = attrs.attr("type").map(|t| t.trim().to_ascii_lowercase());

    let visible = input_type.as_deref() != Some("hidden")
        && attrs.attr("hidden").is_none()
        && !hidden_by_style(attrs.attr("style").unwrap_or_default());

    let label = element.text().collect::<String>();
    let submit_like = is_submit_like(&tag, input_type.as_deref(), &label);

    let value = match tag.as_str() {
        "textarea" => element.text().collect(),
        "select" => selected_option(element),
        _ => attrs.attr("value").unwrap_or_default().to_string(),
    };

    ParsedControl {
        summary: FormControl {
            index,
            tag,
            input_type,
            name: attrs
                .attr("name")
                .map(str::to_string)
                .filter(|n| !n.is_empty()),
            visible,
            submit_like,
        },
        value,
        disabled: attrs.attr("disabled").is_some(),
        checked: attrs.attr("checked").is_some(),
    }
}

/// Uppercased submission method; anything but POST submits as GET
pub(crate) fn form_method(attr: Option<&str>) -> String {
    match attr.map(str::to_ascii_uppercase) {
        Some(m) if m == "POST" => m,
        _ => "GET".to_string(),
    }
}

/// Absolute submission URL; a missing or blank action targets the page itself
pub(crate) fn form_action(attr: Option<&str>, base_url: &Url) -> Url {
    attr.map(str::trim)
        .filter(|a| !a.is_empty())
        .and_then(|a| base_url.join(a).ok())
        .unwrap_or_else(|| base_url.clone())
}

/// Submit inputs, submit buttons and buttons labelled like a login or submit
pub(crate) fn is_submit_like(tag: &str, input_type: Option<&str>, label: &str) -> bool {
    let label = label.to_lowercase();
    match tag {
        "input" => input_type == Some("submit"),
        "button" => {
            input_type == Some("submit") || SUBMIT_LABELS.iter().any(|l| label.contains(l))
        }
        _ => false,
    }
}

/// Inline `display:none` or `visibility:hidden`
fn hidden_by_style(style: &str) -> bool {
    let compact: String = style
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    compact.contains("display:none") || compact.contains("visibility:hidden")
}

/// Value of the selected option, or of the first option when none is marked
fn selected_option(select: ElementRef<'_>) -> String {
    let Ok(selector) = Selector::parse("option") else {
        return String::new();
    };

    let options: Vec<ElementRef<'_>> = select.select(&selector).collect();
    options
        .iter()
        .find(|o| o.value().attr("selected").is_some())
        .or_else(|| options.first())
        .map(|o| match o.value().attr("value") {
            Some(value) => value.to_string(),
            None => o.text().collect::<String>().trim().to_string(),
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    #[test]
    fn test_extract_relative_and_absolute_links() {
        let html = r#"<html><body>
            <a href="/other">Link</a>
            <a href="sub">Link</a>
            <a href="https://other.com/page">Link</a>
        </body></html>"#;
        let page = parse_page(html, &base_url());
        let links: Vec<&str> = page.links.iter().map(Url::as_str).collect();
        assert_eq!(
            links,
            vec![
                "https://example.com/other",
                "https://example.com/sub",
                "https://other.com/page"
            ]
        );
    }

    #[test]
    fn test_skip_non_navigable_links() {
        let html = r##"<html><body>
            <a href="javascript:void(0)">js</a>
            <a href="JavaScript:alert(1)">js</a>
            <a href="mailto:test@example.com">mail</a>
            <a href="tel:+1234567890">tel</a>
            <a href="data:text/html,hi">data</a>
            <a href="#section">jump</a>
            <a href="ftp://example.com/file">ftp</a>
            <a href="">empty</a>
        </body></html>"##;
        assert!(parse_page(html, &base_url()).links.is_empty());
    }

    #[test]
    fn test_form_method_and_action() {
        let html = r#"<form method="post" action="/login"></form><form></form>"#;
        let page = parse_page(html, &base_url());
        assert_eq!(page.forms.len(), 2);
        assert_eq!(page.forms[0].method, "POST");
        assert_eq!(page.forms[0].action.as_str(), "https://example.com/login");
        assert_eq!(page.forms[1].method, "GET");
        assert_eq!(page.forms[1].action.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_control_visibility() {
        let html = r#"<form>
            <input name="a" type="text">
            <input name="b" type="hidden" value="csrf">
            <input name="c" hidden>
            <input name="d" style="display: none">
            <textarea name="e" style="Visibility:Hidden"></textarea>
        </form>"#;
        let page = parse_page(html, &base_url());
        let visible: Vec<bool> = page.forms[0]
            .controls
            .iter()
            .map(|c| c.summary.visible)
            .collect();
        assert_eq!(visible, vec![true, false, false, false, false]);
    }

    #[test]
    fn test_submit_like_controls() {
        let html = r#"<form>
            <input type="submit" value="Go">
            <button type="submit">Send</button>
            <button type="button">Sign In</button>
            <button type="button">Cancel</button>
            <input type="button" value="Submit">
        </form>"#;
        let page = parse_page(html, &base_url());
        let submit: Vec<bool> = page.forms[0]
            .controls
            .iter()
            .map(|c| c.summary.submit_like)
            .collect();
        assert_eq!(submit, vec![true, true, true, false, false]);
    }

    #[test]
    fn test_submission_fields() {
        let html = r#"<form method="post">
            <input type="hidden" name="csrf" value="tok">
            <input type="text" name="user">
            <input type="checkbox" name="remember" value="yes">
            <input type="checkbox" name="terms" value="ok" checked>
            <input type="text" name="locked" value="x" disabled>
            <select name="role"><option value="a">A</option><option value="b" selected>B</option></select>
            <button type="submit" name="action" value="login">Login</button>
            <button type="submit" name="other" value="nope">Other</button>
        </form>"#;
        let page = parse_page(html, &base_url());
        let form = &page.forms[0];
        let clicked = form
            .controls
            .iter()
            .find(|c| c.summary.name.as_deref() == Some("action"))
            .unwrap()
            .summary
            .index;

        let fields = form.submission(clicked);
        let names: Vec<&str> = fields.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["csrf", "user", "terms", "role", "action"]);
        assert_eq!(fields[3].1, "b");
        assert_eq!(fields[4].1, "login");
    }

    #[test]
    fn test_fillable_controls() {
        let html = r#"<form>
            <input type="email" name="e">
            <input name="untyped">
            <textarea name="t"></textarea>
            <input type="checkbox" name="c">
            <input type="submit">
            <select name="s"></select>
        </form>"#;
        let page = parse_page(html, &base_url());
        let fillable: Vec<bool> = page.forms[0].controls.iter().map(|c| c.is_fillable()).collect();
        assert_eq!(fillable, vec![true, true, true, false, false, false]);
    }
}
