use super::*;
use pretty_assertions::assert_eq;

fn parse(markup: &str) -> Result<Nodes> {
    Nodes::parse(markup, 1, Arc::from("rh:"))
}

fn node(nodes: &Nodes, selector: &str) -> Result<NodeId> {
    nodes
        .query(selector)?
        .map(|element| element.node())
        .ok_or_else(|| Error::SelectorNotFound(selector.to_string()))
}

fn handler_ids(plan: &event_dispatch::DispatchPlan) -> Vec<u64> {
    plan.handlers.iter().map(|id| id.get()).collect()
}

#[test]
fn button_handler_is_dispatched_once() -> Result<()> {
    let nodes = parse(r#"<button rh:onclick="7">Go</button>"#)?;
    let plan = event_dispatch::plan_dispatch(&nodes, node(&nodes, "button")?, "onclick")?;
    assert_eq!(handler_ids(&plan), vec![7]);
    assert!(plan.bubbles);
    Ok(())
}

#[test]
fn disabled_button_swallows_click() -> Result<()> {
    let nodes = parse(r#"<button rh:onclick="7" disabled>Go</button>"#)?;
    let err = event_dispatch::plan_dispatch(&nodes, node(&nodes, "button")?, "onclick")
        .expect_err("disabled button must not dispatch");
    match err {
        Error::MissingHandler {
            event,
            element,
            available,
        } => {
            assert_eq!(event, "onclick");
            assert_eq!(element, "<button>");
            assert_eq!(available, vec!["onclick".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[test]
fn click_on_child_reaches_parent_handler() -> Result<()> {
    let nodes = parse(r#"<div rh:onclick="3"><span>label</span></div>"#)?;
    let plan = event_dispatch::plan_dispatch(&nodes, node(&nodes, "span")?, "click")?;
    assert_eq!(handler_ids(&plan), vec![3]);
    Ok(())
}

#[test]
fn stop_propagation_keeps_own_handler_and_stops_above() -> Result<()> {
    let nodes = parse(
        r#"<section rh:onclick="9"><div rh:onclick="3" rh:onclick:stoppropagation><span>x</span></div></section>"#,
    )?;
    let plan = event_dispatch::plan_dispatch(&nodes, node(&nodes, "span")?, "onclick")?;
    assert_eq!(handler_ids(&plan), vec![3]);
    Ok(())
}

#[test]
fn non_bubbling_event_checks_only_the_target() -> Result<()> {
    let nodes = parse(r#"<div rh:onblur="4"><p><input id="field"></p></div>"#)?;
    let err = event_dispatch::plan_dispatch(&nodes, node(&nodes, "#field")?, "onblur")
        .expect_err("blur does not bubble");
    assert!(matches!(err, Error::MissingHandler { ref event, .. } if event == "onblur"));

    let plan = event_dispatch::plan_dispatch(&nodes, node(&nodes, "div")?, "blur")?;
    assert_eq!(handler_ids(&plan), vec![4]);
    assert!(!plan.bubbles);
    Ok(())
}

#[test]
fn handlers_are_collected_closest_first() -> Result<()> {
    let nodes = parse(
        r#"<div rh:onclick="1"><p rh:onclick="2"><button rh:onclick="3">b</button></p></div>"#,
    )?;
    let plan = event_dispatch::plan_dispatch(&nodes, node(&nodes, "button")?, "onclick")?;
    assert_eq!(handler_ids(&plan), vec![3, 2, 1]);
    Ok(())
}

#[test]
fn disabled_ancestor_control_stops_mouse_events() -> Result<()> {
    let nodes = parse(
        r#"<div rh:onclick="5" rh:onkeydown="6"><button disabled><span>x</span></button></div>"#,
    )?;
    let span = node(&nodes, "span")?;
    assert!(matches!(
        event_dispatch::plan_dispatch(&nodes, span, "onclick"),
        Err(Error::MissingHandler { .. })
    ));
    // Keyboard events are not suppressed by the disabled control.
    let plan = event_dispatch::plan_dispatch(&nodes, span, "onkeydown")?;
    assert_eq!(handler_ids(&plan), vec![6]);
    Ok(())
}

#[test]
fn disabled_attribute_on_non_control_is_ignored() -> Result<()> {
    let nodes = parse(r#"<div disabled rh:onclick="2">x</div>"#)?;
    let plan = event_dispatch::plan_dispatch(&nodes, node(&nodes, "div")?, "onclick")?;
    assert_eq!(handler_ids(&plan), vec![2]);
    Ok(())
}

#[test]
fn non_numeric_handler_id_is_reported() -> Result<()> {
    let nodes = parse(r#"<button rh:onclick="abc">x</button>"#)?;
    let err = event_dispatch::plan_dispatch(&nodes, node(&nodes, "button")?, "onclick")
        .expect_err("handler id must be numeric");
    match err {
        Error::InvalidHandlerId { attribute, value } => {
            assert_eq!(attribute, "rh:onclick");
            assert_eq!(value, "abc");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[test]
fn classification_tables_accept_both_name_forms() {
    for name in ["blur", "onfocus", "change", "submit", "toggle", "DOMNodeRemovedFromDocument"] {
        assert!(!event_bubbles(name), "{name} should not bubble");
    }
    for name in ["click", "onkeydown", "input", "mouseover"] {
        assert!(event_bubbles(name), "{name} should bubble");
    }
    for name in ["click", "ondblclick", "mousedown", "mousemove", "mouseup"] {
        assert!(is_disabled_suppressed(name), "{name} should be suppressed");
    }
    for name in ["keydown", "onfocus", "mouseover"] {
        assert!(!is_disabled_suppressed(name), "{name} should not be suppressed");
    }
}

#[test]
fn toolbar_click_bubbles_through_every_handler() -> Result<()> {
    let renderer = quiet_renderer();
    let toolbar = renderer.render(Toolbar::default())?;
    toolbar.click("#label")?;
    assert_eq!(toolbar.instance(|t| t.log.clone())?, vec!["save", "panel", "outer"]);
    // One batch per handler.
    assert_eq!(toolbar.render_count()?, 3);
    Ok(())
}

#[test]
fn toolbar_stop_propagation_on_panel() -> Result<()> {
    let renderer = quiet_renderer();
    let toolbar = renderer.render(Toolbar {
        stop_at_panel: true,
        ..Toolbar::default()
    })?;
    assert!(toolbar.markup()?.contains("rh:onclick:stoppropagation"));
    toolbar.click("#hint")?;
    assert_eq!(toolbar.instance(|t| t.log.clone())?, vec!["panel"]);
    Ok(())
}

#[test]
fn toolbar_disabled_save_button_yields_missing_handler() -> Result<()> {
    let renderer = quiet_renderer();
    let toolbar = renderer.render(Toolbar {
        save_disabled: true,
        ..Toolbar::default()
    })?;
    let err = toolbar
        .click("#label")
        .expect_err("disabled control stops the walk");
    assert!(matches!(err, Error::MissingHandler { .. }));
    assert!(toolbar.instance(|t| t.log.is_empty())?);
    assert_eq!(toolbar.render_count()?, 0);

    toolbar.click("#hint")?;
    assert_eq!(toolbar.instance(|t| t.log.clone())?, vec!["panel", "outer"]);
    Ok(())
}

#[test]
fn event_without_any_handler_reports_target_description() -> Result<()> {
    let renderer = quiet_renderer();
    let toolbar = renderer.render(Toolbar::default())?;
    let err = toolbar.focus("#save").expect_err("no focus handler");
    match err {
        Error::MissingHandler {
            event,
            element,
            available,
        } => {
            assert_eq!(event, "onfocus");
            assert_eq!(element, "<button#save>");
            assert_eq!(available, vec!["onclick".to_string()]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Connectivity {
    online: u32,
}

impl Component for Connectivity {
    fn render(&self, out: &mut FrameBuilder<Self>) {
        out.element("div", |div| {
            div.on("online", |me: &mut Connectivity, _| {
                me.online += 1;
                Ok(())
            });
            div.element("span", |s| {
                s.text(format!("online={}", self.online));
            });
        });
    }
}

#[test]
fn event_names_that_start_with_on_keep_their_prefix() -> Result<()> {
    assert_eq!(frames::normalize_event_attribute("online"), "ononline");
    assert_eq!(frames::normalize_event_attribute("ononline"), "ononline");
    assert_eq!(frames::normalize_event_attribute(" Click "), "onclick");
    assert_eq!(frames::normalize_event_attribute("onclick"), "onclick");
    assert!(event_bubbles("online"));
    assert!(event_bubbles("ononline"));
    assert!(!event_bubbles("onfocus"));
    assert!(!is_disabled_suppressed("online"));

    let renderer = quiet_renderer();
    let connectivity = renderer.render(Connectivity::default())?;
    assert_eq!(
        connectivity.markup()?,
        r#"<div rh:ononline="1"><span>online=0</span></div>"#
    );
    let span = connectivity.find("span")?;
    connectivity.trigger_event(&span, "online", EventArgs::Empty)?;
    connectivity.trigger_event(&connectivity.find("span")?, "ononline", EventArgs::Empty)?;
    assert_eq!(connectivity.find("span")?.text_content(), "online=2");
    Ok(())
}
