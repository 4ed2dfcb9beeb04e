use regex::{Captures, Regex};

/// Tags allowed through sanitization; everything else is stripped, keeping
/// its inner text
const ALLOWED_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "ul", "ol", "li", "strong", "em", "blockquote", "code", "pre",
    "span",
];

/// Allow-list sanitizer for rendered model output.
///
/// Model text is untrusted even after linkification. Only the tags above
/// survive, and all attributes are stripped except the narrowly-validated
/// seek attributes on `span`: `class` naming one of the two timestamp
/// classes, a numeric `data-time`, and a comma-separated numeric
/// `data-timestamps`. Running the sanitizer twice yields identical output.
pub fn sanitize(markup: &str) -> String {
    let tag_re = Regex::new(r"<(/?)([a-zA-Z][a-zA-Z0-9]*)([^>]*)>").expect("valid tag pattern");
    let attr_re =
        Regex::new(r#"([a-zA-Z][a-zA-Z0-9-]*)\s*=\s*"([^"]*)""#).expect("valid attr pattern");

    tag_re
        .replace_all(markup, |caps: &Captures| {
            let closing = &caps[1] == "/";
            let tag = caps[2].to_lowercase();

            if !ALLOWED_TAGS.contains(&tag.as_str()) {
                return String::new();
            }
            if closing {
                return format!("</{}>", tag);
            }

            let mut kept_attrs = Vec::new();
            for attr in attr_re.captures_iter(&caps[3]) {
                let name = attr[1].to_lowercase();
                let value = &attr[2];
                if is_allowed_attribute(&tag, &name, value) {
                    kept_attrs.push(format!(r#"{}="{}""#, name, value));
                }
            }

            if kept_attrs.is_empty() {
                format!("<{}>", tag)
            } else {
                format!("<{} {}>", tag, kept_attrs.join(" "))
            }
        })
        .to_string()
}

fn is_allowed_attribute(tag: &str, name: &str, value: &str) -> bool {
    if tag != "span" {
        return false;
    }
    match name {
        "class" => value == "clickable-timestamp" || value == "multiple-timestamps-wrapper",
        "data-time" => !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()),
        "data-timestamps" => {
            !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit() || b == b',')
        }
        _ => false,
    }
}
