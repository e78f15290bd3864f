use super::*;
use pretty_assertions::assert_eq;

fn ids(dom: &Dom, selector: &str) -> Result<Vec<String>> {
    Ok(dom
        .query_selector_all(selector)?
        .into_iter()
        .filter_map(|node| dom.element(node)?.attrs.get("id").cloned())
        .collect())
}

fn diff(old: &str, new: &str) -> Result<Vec<MarkupChange>> {
    let old = parse_html(old)?;
    let new = parse_html(new)?;
    markup_diff::MarkupDiffer::new("rh:").diff(&old, &new)
}

const LIST: &str = r#"
<ul id="list">
  <li id="one" class="a">one</li>
  <li id="two" class="b" disabled>two</li>
  <li id="three" class="a b">three</li>
</ul>
<button id="go" disabled>go</button>
<input id="name" type="text">
"#;

#[test]
fn void_tags_do_not_swallow_siblings() -> Result<()> {
    let dom = parse_html(r#"<p>a<br>b<img src="x.png"></p><span>after</span>"#)?;
    let p = dom.query_selector_all("p")?;
    assert_eq!(p.len(), 1);
    assert_eq!(dom.text_content(p[0]), "ab");
    assert_eq!(ids(&dom, "p > span")?, Vec::<String>::new());
    assert_eq!(dom.query_selector_all("p + span")?.len(), 1);
    Ok(())
}

#[test]
fn entities_and_comments_are_handled() -> Result<()> {
    let dom = parse_html("<p>a &amp; b&#33; &#x41;<!-- hidden --> &unknown; &lt;tag&gt;</p>")?;
    let p = dom.query_selector_all("p")?[0];
    assert_eq!(dom.text_content(p), "a & b! A &unknown; <tag>");
    Ok(())
}

#[test]
fn script_body_is_raw_text() -> Result<()> {
    let dom = parse_html("<script>if (a < b && c > d) {}</script><p>x</p>")?;
    let script = dom.query_selector_all("script")?[0];
    assert_eq!(dom.text_content(script), "if (a < b && c > d) {}");
    assert_eq!(dom.dump_node(script), "<script>if (a < b && c > d) {}</script>");
    assert_eq!(dom.query_selector_all("p")?.len(), 1);
    Ok(())
}

#[test]
fn valueless_attribute_dumps_as_bare_name() -> Result<()> {
    let dom = parse_html(r#"<input type="checkbox" checked id="c">"#)?;
    let input = dom.query_selector_all("input")?[0];
    assert_eq!(dom.element(input).map(|e| e.attrs.get("checked").cloned()), Some(Some(String::new())));
    assert_eq!(dom.dump_node(input), r#"<input checked id="c" type="checkbox">"#);
    Ok(())
}

#[test]
fn stray_end_tag_closes_to_matching_open_element() -> Result<()> {
    let dom = parse_html("<div><p><span>x</p><em>y</em></div>")?;
    assert_eq!(dom.query_selector_all("p > em")?.len(), 0);
    assert_eq!(dom.query_selector_all("div > em")?.len(), 1);
    Ok(())
}

#[test]
fn unclosed_comment_is_an_error() {
    assert!(matches!(parse_html("<p><!-- nope"), Err(Error::HtmlParse(_))));
}

#[test]
fn selector_forms_match_expected_elements() -> Result<()> {
    let dom = parse_html(LIST)?;
    assert_eq!(ids(&dom, "li.a")?, vec!["one", "three"]);
    assert_eq!(ids(&dom, "li.a.b")?, vec!["three"]);
    assert_eq!(ids(&dom, "ul > li + li")?, vec!["two", "three"]);
    assert_eq!(ids(&dom, "#one ~ li")?, vec!["two", "three"]);
    assert_eq!(ids(&dom, "li:not(.a)")?, vec!["two"]);
    assert_eq!(ids(&dom, "[id^=tw]")?, vec!["two"]);
    assert_eq!(ids(&dom, r#"[class~="b"]"#)?, vec!["two", "three"]);
    assert_eq!(ids(&dom, "li[id$=e]")?, vec!["one", "three"]);
    assert_eq!(ids(&dom, "li:first-child, li:last-child")?, vec!["one", "three"]);
    assert_eq!(ids(&dom, "UL LI#two")?, vec!["two"]);
    assert_eq!(ids(&dom, "*[type]")?, vec!["name"]);
    Ok(())
}

#[test]
fn disabled_pseudo_class_only_applies_to_controls() -> Result<()> {
    let dom = parse_html(LIST)?;
    assert_eq!(ids(&dom, ":disabled")?, vec!["go"]);
    assert_eq!(ids(&dom, "input:enabled")?, vec!["name"]);
    Ok(())
}

#[test]
fn unsupported_selectors_are_rejected() -> Result<()> {
    let dom = parse_html(LIST)?;
    for selector in ["li::before", "a,,b", "", "ul >", "> li", "li[id", "li:hover"] {
        assert!(
            matches!(dom.query_selector_all(selector), Err(Error::UnsupportedSelector(_))),
            "{selector:?} should be rejected"
        );
    }
    Ok(())
}

#[test]
fn attribute_changes_are_reported_by_name() -> Result<()> {
    let changes = diff(
        r#"<div id="a" class="x"></div>"#,
        r#"<div id="b" title="t"></div>"#,
    )?;
    assert_eq!(
        changes,
        vec![
            MarkupChange::AttributeChanged {
                path: "div(0)".to_string(),
                name: "class".to_string(),
                old: Some("x".to_string()),
                new: None,
            },
            MarkupChange::AttributeChanged {
                path: "div(0)".to_string(),
                name: "id".to_string(),
                old: Some("a".to_string()),
                new: Some("b".to_string()),
            },
            MarkupChange::AttributeChanged {
                path: "div(0)".to_string(),
                name: "title".to_string(),
                old: None,
                new: Some("t".to_string()),
            },
        ]
    );
    Ok(())
}

#[test]
fn removed_and_replaced_nodes_carry_markup() -> Result<()> {
    let changes = diff("<ul><li>a</li><li>b</li></ul>", "<ul><p>a</p></ul>")?;
    assert_eq!(
        changes,
        vec![
            MarkupChange::NodeRemoved {
                path: "ul(0) > li(0)".to_string(),
                markup: "<li>a</li>".to_string(),
            },
            MarkupChange::NodeAdded {
                path: "ul(0) > p(0)".to_string(),
                markup: "<p>a</p>".to_string(),
            },
            MarkupChange::NodeRemoved {
                path: "ul(0) > li(1)".to_string(),
                markup: "<li>b</li>".to_string(),
            },
        ]
    );
    assert_eq!(
        changes[2].to_string(),
        "removed ul(0) > li(1): <li>b</li>"
    );
    Ok(())
}

#[test]
fn whitespace_and_handler_attributes_are_not_differences() -> Result<()> {
    let changes = diff(
        r#"<div rh:onclick="1"><p>text</p></div>"#,
        "<div rh:onclick=\"9\" rh:onclick:stoppropagation>\n  <p>  text\n</p>\n</div>",
    )?;
    assert_eq!(changes, Vec::new());
    Ok(())
}

#[test]
fn text_is_compared_after_unicode_normalization() -> Result<()> {
    // "e" + combining acute accent vs. precomposed "é".
    let changes = diff("<p>caf\u{65}\u{301}</p>", "<p>caf\u{e9}</p>")?;
    assert_eq!(changes, Vec::new());

    let changes = diff("<p>cafe</p>", "<p>caf\u{e9}</p>")?;
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].path(), "p(0) > #text(0)");
    Ok(())
}
