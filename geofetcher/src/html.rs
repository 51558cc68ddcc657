//! Low-level HTML string helpers for the portal login pages.
//! Deliberately naive and tailored to the two forms the portal serves;
//! the exact markup is an external collaborator we only need a few
//! attribute values from.

/// Value of the `<input name="..." value="...">` element with the given
/// name, searched anywhere in the document.
pub fn input_value(html: &str, name: &str) -> Option<String> {
    let marker = format!("name=\"{name}\"");
    let at = html.find(&marker)?;
    let tag_start = html[..at].rfind('<')?;
    let tag_end = html[at..].find('>')? + at;
    attribute(&html[tag_start..tag_end], "value")
}

/// Action attribute of the form with the given id.
pub fn form_action(html: &str, form_id: &str) -> Option<String> {
    let marker = format!("id=\"{form_id}\"");
    let at = html.find(&marker)?;
    let tag_start = html[..at].rfind('<')?;
    let tag_end = html[at..].find('>')? + at;
    attribute(&html[tag_start..tag_end], "action")
}

/// Action attribute of the first `<form>` in the document.
pub fn first_form_action(html: &str) -> Option<String> {
    let at = html.find("<form")?;
    let tag_end = html[at..].find('>')? + at;
    attribute(&html[at..tag_end], "action")
}

/// Extracts the JSON object literal assigned right after `marker` inside
/// an inline script, e.g. `var oAuthInfo = {...}`. Balances braces, so the
/// object may span lines and nest.
pub fn script_object(html: &str, marker: &str) -> Option<String> {
    let at = html.find(marker)? + marker.len();
    let rest = &html[at..];
    let open = rest.find('{')?;
    let mut depth = 0usize;
    for (offset, ch) in rest[open..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(rest[open..open + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

fn attribute(tag: &str, name: &str) -> Option<String> {
    let marker = format!("{name}=\"");
    let at = tag.find(&marker)? + marker.len();
    let end = tag[at..].find('"')? + at;
    Some(tag[at..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_PAGE: &str = r#"
        <html><body>
        <form id="Form1" action="login.aspx" method="post">
            <input type="hidden" name="__VIEWSTATE" value="vs123" />
            <input type="hidden" name="__VIEWSTATEGENERATOR" value="gen456" />
            <input type="hidden" name="__EVENTVALIDATION" value="ev789" />
        </form>
        </body></html>"#;

    #[test]
    fn extracts_hidden_inputs() {
        assert_eq!(input_value(LOGIN_PAGE, "__VIEWSTATE").as_deref(), Some("vs123"));
        assert_eq!(
            input_value(LOGIN_PAGE, "__VIEWSTATEGENERATOR").as_deref(),
            Some("gen456")
        );
        assert_eq!(input_value(LOGIN_PAGE, "__EVENTVALIDATION").as_deref(), Some("ev789"));
        assert_eq!(input_value(LOGIN_PAGE, "missing"), None);
    }

    #[test]
    fn extracts_form_actions() {
        assert_eq!(form_action(LOGIN_PAGE, "Form1").as_deref(), Some("login.aspx"));
        assert_eq!(first_form_action(LOGIN_PAGE).as_deref(), Some("login.aspx"));
        assert_eq!(form_action(LOGIN_PAGE, "Form2"), None);
    }

    #[test]
    fn extracts_inline_script_object() {
        let page = "<script>var oAuthInfo = {\"oauth_state\": \"abc\", \"inner\": {\"x\": 1}};\r\n</script>";
        let object = script_object(page, "var oAuthInfo = ").unwrap();
        let value: serde_json::Value = serde_json::from_str(&object).unwrap();
        assert_eq!(value["oauth_state"], "abc");
        assert_eq!(value["inner"]["x"], 1);
    }
}
