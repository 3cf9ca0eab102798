//! Human-readable descriptors for page elements

use serde::{Deserialize, Serialize};

/// Longest text excerpt kept for buttons and links
const MAX_TEXT_EXCERPT: usize = 30;

/// The parts of a DOM element the page reports with each event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementRef {
    pub tag_name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub text_content: Option<String>,
}

/// Describe an element as `tag[#id][.class1.class2] ["text"]`
///
/// The quoted text excerpt is only added for buttons and anchors.
pub fn describe(element: &ElementRef) -> String {
    let mut description = element.tag_name.to_lowercase();

    if let Some(id) = element.id.as_deref().filter(|id| !id.is_empty()) {
        description.push('#');
        description.push_str(id);
    }

    if let Some(class_name) = element.class_name.as_deref() {
        for class in class_name.split_whitespace() {
            description.push('.');
            description.push_str(class);
        }
    }

    let is_clickable = element.tag_name.eq_ignore_ascii_case("button")
        || element.tag_name.eq_ignore_ascii_case("a");
    if is_clickable {
        let text = element.text_content.as_deref().unwrap_or("").trim();
        if !text.is_empty() {
            let excerpt: String = text.chars().take(MAX_TEXT_EXCERPT).collect();
            let ellipsis = if text.chars().count() > MAX_TEXT_EXCERPT {
                "..."
            } else {
                ""
            };
            description.push_str(&format!(" \"{}{}\"", excerpt, ellipsis));
        }
    }

    description
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(tag: &str, id: Option<&str>, class: Option<&str>, text: Option<&str>) -> ElementRef {
        ElementRef {
            tag_name: tag.to_string(),
            id: id.map(String::from),
            class_name: class.map(String::from),
            text_content: text.map(String::from),
        }
    }

    #[test]
    fn test_tag_id_and_classes() {
        let el = element("DIV", Some("main"), Some("card  wide "), Some("ignored"));
        assert_eq!(describe(&el), "div#main.card.wide");
    }

    #[test]
    fn test_button_text_excerpt() {
        let el = element("BUTTON", None, Some("primary"), Some("  Save changes \n"));
        assert_eq!(describe(&el), "button.primary \"Save changes\"");
    }

    #[test]
    fn test_long_link_text_is_truncated() {
        let el = element("A", Some("more"), None, Some("Read the complete guide to configuring everything"));
        assert_eq!(
            describe(&el),
            "a#more \"Read the complete guide to con...\""
        );
    }

    #[test]
    fn test_empty_parts_are_skipped() {
        let el = element("INPUT", Some(""), Some("   "), None);
        assert_eq!(describe(&el), "input");

        let el = element("A", None, None, Some("   "));
        assert_eq!(describe(&el), "a");
    }
}
