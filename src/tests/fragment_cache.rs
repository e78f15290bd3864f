use super::*;
use pretty_assertions::assert_eq;
use std::sync::mpsc;
use std::time::Duration;

#[test]
fn markup_is_cached_until_a_relevant_batch() -> Result<()> {
    let renderer = quiet_renderer();
    let counter = renderer.render(Counter::default())?;
    let first = counter.nodes()?;
    let again = counter.nodes()?;
    assert!(first.same_snapshot(&again));
    assert_eq!(counter.markup()?, counter.markup()?);

    // A batch for an unrelated root leaves this cache alone.
    let other = renderer.render(Counter::default())?;
    other.click("#inc")?;
    assert!(counter.nodes()?.same_snapshot(&first));
    assert_eq!(counter.render_count()?, 0);

    counter.click("#inc")?;
    assert!(!counter.nodes()?.same_snapshot(&first));
    assert_eq!(counter.render_count()?, 1);
    Ok(())
}

#[test]
fn no_changes_right_after_first_render() -> Result<()> {
    let renderer = quiet_renderer();
    let counter = renderer.render(Counter::default())?;
    assert_eq!(counter.changes_since_first_render()?, Vec::new());
    Ok(())
}

#[test]
fn changes_since_first_render_ignore_handler_ids() -> Result<()> {
    let renderer = quiet_renderer();
    let counter = renderer.render(Counter::default())?;
    counter.click("#inc")?;
    assert_eq!(
        counter.changes_since_first_render()?,
        vec![MarkupChange::TextChanged {
            path: "div(0) > p(0) > #text(0)".to_string(),
            old: "count: 0".to_string(),
            new: "count: 1".to_string(),
        }]
    );
    Ok(())
}

#[test]
fn snapshot_diff_requires_a_saved_snapshot() -> Result<()> {
    let renderer = quiet_renderer();
    let counter = renderer.render(Counter::default())?;
    assert!(matches!(
        counter.changes_since_snapshot(),
        Err(Error::NoSnapshot)
    ));

    counter.click("#inc")?;
    counter.save_snapshot()?;
    assert_eq!(counter.changes_since_snapshot()?, Vec::new());

    counter.click("#inc")?;
    let changes = counter.changes_since_snapshot()?;
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].path(), "div(0) > p(0) > #text(0)");
    Ok(())
}

#[test]
fn list_growth_is_reported_as_added_nodes() -> Result<()> {
    let renderer = quiet_renderer();
    let list = renderer.render(TodoList {
        items: vec!["a".into()],
    })?;
    list.click("#add")?;
    assert_eq!(
        list.changes_since_first_render()?,
        vec![MarkupChange::NodeAdded {
            path: "ul(0) > li(1)".to_string(),
            markup: r#"<li class="item" rh:onclick="5">item1:0</li>"#.to_string(),
        }]
    );
    Ok(())
}

#[test]
fn child_render_invalidates_the_parent_fragment() -> Result<()> {
    let renderer = quiet_renderer();
    let list = renderer.render(TodoList {
        items: vec!["a".into(), "b".into()],
    })?;
    let items = list.find_components::<TodoItem>()?;
    assert_eq!(items.len(), 2);

    items[1].click("li")?;
    assert_eq!(items[1].render_count()?, 1);
    assert_eq!(items[0].render_count()?, 0);
    assert_eq!(list.render_count()?, 1);
    let texts = list
        .find_all("li.item")?
        .iter()
        .map(ElementRef::text_content)
        .collect::<Vec<_>>();
    assert_eq!(texts, vec!["a:0", "b:1"]);
    Ok(())
}

#[test]
fn removed_root_disposes_every_accessor() -> Result<()> {
    let renderer = quiet_renderer();
    let counter = renderer.render(Counter::default())?;
    let root = counter.root_id();
    renderer.remove_root(root)?;

    assert!(counter.is_disposed());
    assert!(matches!(counter.markup(), Err(Error::Disposed(id)) if id == root));
    assert!(matches!(counter.nodes(), Err(Error::Disposed(_))));
    assert!(matches!(counter.find("p"), Err(Error::Disposed(_))));
    assert!(matches!(counter.click("#inc"), Err(Error::Disposed(_))));
    assert!(matches!(counter.save_snapshot(), Err(Error::Disposed(_))));
    assert!(matches!(counter.instance(|c| c.count), Err(Error::Disposed(_))));
    assert!(matches!(
        counter.find_component::<Counter>(),
        Err(Error::Disposed(_))
    ));
    assert!(matches!(
        renderer.remove_root(root),
        Err(Error::UnknownComponentId(_))
    ));
    Ok(())
}

#[test]
fn child_fragment_is_disposed_when_parent_drops_the_child() -> Result<()> {
    let renderer = quiet_renderer();
    let list = renderer.render(TodoList {
        items: vec!["a".into(), "b".into()],
    })?;
    let second = list
        .find_components::<TodoItem>()?
        .pop()
        .ok_or(Error::ComponentNotFound("TodoItem"))?;
    list.invoke(|l| {
        l.items.pop();
    })?;
    assert!(matches!(second.markup(), Err(Error::Disposed(_))));
    assert_eq!(list.find_components::<TodoItem>()?.len(), 1);
    Ok(())
}

#[test]
fn element_from_older_parse_is_resolved_by_path() -> Result<()> {
    let renderer = quiet_renderer();
    let counter = renderer.render(Counter::default())?;
    let button = counter.find("#inc")?;
    counter.trigger_event(&button, "onclick", EventArgs::click())?;
    // `button` still points into the first parse.
    counter.trigger_event(&button, "onclick", EventArgs::click())?;
    assert_eq!(counter.instance(|c| c.count)?, 2);
    Ok(())
}

#[test]
fn element_that_disappeared_is_stale() -> Result<()> {
    let renderer = quiet_renderer();
    let list = renderer.render(TodoList {
        items: vec!["a".into(), "b".into()],
    })?;
    let last = list.find("li:last-child")?;
    list.invoke(|l| l.items.clear())?;
    let err = list
        .trigger_event(&last, "onclick", EventArgs::click())
        .expect_err("the item is gone");
    match err {
        Error::StaleElement(path) => assert_eq!(path, "ul(0) > li(1)"),
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[test]
fn markup_matches_ignores_whitespace_and_handler_ids() -> Result<()> {
    let renderer = quiet_renderer();
    let counter = renderer.render(Counter::default())?;
    counter.markup_matches(
        r#"
        <div id="counter">
            <p id="count">count: 0</p>
            <button id="inc">+1</button>
        </div>
        "#,
    )?;
    Ok(())
}

#[test]
fn markup_matches_supports_regex_attributes() -> Result<()> {
    let renderer = quiet_renderer();
    let counter = renderer.render(Counter::default())?;
    counter.markup_matches(
        r#"<div id:regex="count\w+"><p id="count">count: 0</p><button id:regex="i.c">+1</button></div>"#,
    )?;

    let err = counter
        .markup_matches(r#"<div id:regex="count"><p id="count">count: 1</p><button id="inc">+1</button></div>"#)
        .expect_err("regex must match the whole value and text differs");
    match err {
        Error::AssertionFailed { changes, .. } => {
            assert_eq!(changes.len(), 2);
            assert_eq!(
                changes[0],
                MarkupChange::AttributeChanged {
                    path: "div(0)".to_string(),
                    name: "id".to_string(),
                    old: Some("/count/".to_string()),
                    new: Some("counter".to_string()),
                }
            );
            assert!(matches!(changes[1], MarkupChange::TextChanged { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[test]
fn invalid_regex_is_reported() -> Result<()> {
    let renderer = quiet_renderer();
    let counter = renderer.render(Counter::default())?;
    let err = counter
        .markup_matches(r#"<div id:regex="(unclosed"></div>"#)
        .expect_err("pattern does not compile");
    assert!(matches!(err, Error::InvalidRegex { ref pattern, .. } if pattern == "(unclosed"));
    Ok(())
}

#[test]
fn find_reports_missing_selector() -> Result<()> {
    let renderer = quiet_renderer();
    let counter = renderer.render(Counter::default())?;
    assert!(matches!(
        counter.find("#nope"),
        Err(Error::SelectorNotFound(selector)) if selector == "#nope"
    ));
    assert!(counter.find_all("section")?.is_empty());
    Ok(())
}

type Gate = (mpsc::Sender<()>, mpsc::Receiver<()>);

/// Armed by a test to hold the next `Badge` render until released.
static BADGE_GATE: Mutex<Option<Gate>> = Mutex::new(None);

#[derive(Debug)]
struct Badge {
    version: u32,
}

impl Component for Badge {
    fn render(&self, out: &mut FrameBuilder<Self>) {
        let gate = lock(&BADGE_GATE).take();
        if let Some((entered, release)) = gate {
            let _ = entered.send(());
            let _ = release.recv();
        }
        out.element("i", |i| {
            i.text(format!("child v{}", self.version));
        });
    }
}

#[derive(Debug)]
struct Card {
    version: u32,
}

impl Component for Card {
    fn render(&self, out: &mut FrameBuilder<Self>) {
        out.element("div", |div| {
            div.element("b", |b| {
                b.text(format!("parent v{}", self.version));
            });
            div.component(Badge {
                version: self.version,
            });
        });
    }
}

#[test]
fn reads_during_a_batch_see_the_previous_batch() -> Result<()> {
    let renderer = quiet_renderer();
    let card = renderer.render(Card { version: 1 })?;
    let root = card.root_id();
    assert_eq!(
        card.markup()?,
        "<div><b>parent v1</b><i>child v1</i></div>"
    );
    // Leave the cache stale so the next read rebuilds it.
    card.invoke(|c| c.version = 2)?;

    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    *lock(&BADGE_GATE) = Some((entered_tx, release_rx));

    let during = std::thread::scope(|scope| {
        let worker = scope.spawn(|| renderer.invoke(root, |c: &mut Card| c.version = 3));
        entered_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("child render started");
        // The parent of batch 3 is committed, its child is still rendering.
        let during = (card.markup(), card.render_count(), renderer.frames(root).len());
        release_tx.send(()).expect("worker is waiting");
        worker.join().expect("worker finished")?;
        Ok::<_, Error>(during)
    })?;

    let (markup, render_count, root_frames) = during;
    assert_eq!(markup?, "<div><b>parent v2</b><i>child v2</i></div>");
    assert_eq!(render_count?, 1);
    assert_eq!(root_frames, 1);

    assert_eq!(
        card.markup()?,
        "<div><b>parent v3</b><i>child v3</i></div>"
    );
    assert_eq!(card.render_count()?, 2);
    Ok(())
}
