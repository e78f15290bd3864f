use super::*;
use pretty_assertions::assert_eq;

mod event_dispatch_scenarios;
mod fragment_cache;
mod markup_parsing;

#[derive(Debug, Default)]
pub(crate) struct Counter {
    pub(crate) count: u32,
}

impl Component for Counter {
    fn render(&self, out: &mut FrameBuilder<Self>) {
        out.element("div", |div| {
            div.attr("id", "counter");
            div.element("p", |p| {
                p.attr("id", "count");
                p.text(format!("count: {}", self.count));
            });
            div.element("button", |b| {
                b.attr("id", "inc");
                b.on("onclick", |me: &mut Counter, _| {
                    me.count += 1;
                    Ok(())
                });
                b.text("+1");
            });
        });
    }
}

/// Nested clickable layout used by the bubbling tests.
#[derive(Debug, Default)]
pub(crate) struct Toolbar {
    pub(crate) log: Vec<&'static str>,
    pub(crate) stop_at_panel: bool,
    pub(crate) save_disabled: bool,
}

impl Component for Toolbar {
    fn render(&self, out: &mut FrameBuilder<Self>) {
        out.element("div", |outer| {
            outer.attr("id", "outer");
            outer.on("click", |me: &mut Toolbar, _| {
                me.log.push("outer");
                Ok(())
            });
            outer.element("div", |panel| {
                panel.attr("id", "panel");
                panel.on("click", |me: &mut Toolbar, _| {
                    me.log.push("panel");
                    Ok(())
                });
                panel.stop_propagation_if("click", self.stop_at_panel);
                panel.element("button", |b| {
                    b.attr("id", "save");
                    b.flag("disabled", self.save_disabled);
                    b.on("click", |me: &mut Toolbar, _| {
                        me.log.push("save");
                        Ok(())
                    });
                    b.element("span", |s| {
                        s.attr("id", "label");
                        s.text("Save");
                    });
                });
                panel.element("span", |s| {
                    s.attr("id", "hint");
                    s.text("hint");
                });
            });
        });
    }
}

#[derive(Debug, Default)]
pub(crate) struct TodoList {
    pub(crate) items: Vec<String>,
}

impl Component for TodoList {
    fn render(&self, out: &mut FrameBuilder<Self>) {
        out.element("ul", |ul| {
            for item in &self.items {
                ul.component(TodoItem {
                    label: item.clone(),
                    clicks: 0,
                });
            }
        });
        out.element("button", |b| {
            b.attr("id", "add");
            b.on("click", |me: &mut TodoList, _| {
                let next = format!("item{}", me.items.len());
                me.items.push(next);
                Ok(())
            });
        });
    }
}

#[derive(Debug)]
pub(crate) struct TodoItem {
    pub(crate) label: String,
    pub(crate) clicks: u32,
}

impl Component for TodoItem {
    fn render(&self, out: &mut FrameBuilder<Self>) {
        out.element("li", |li| {
            li.attr("class", "item");
            li.on("click", |me: &mut TodoItem, _| {
                me.clicks += 1;
                Ok(())
            });
            li.text(format!("{}:{}", self.label, self.clicks));
        });
    }

    fn set_parameters(&mut self, next: Self) {
        self.label = next.label;
    }
}

pub(crate) fn quiet_renderer() -> Renderer {
    Renderer::with_options(RendererOptions::new().with_trace_stderr(false))
}

#[test]
fn counter_markup_carries_prefixed_handler_ids() -> Result<()> {
    let renderer = quiet_renderer();
    let counter = renderer.render(Counter::default())?;
    assert_eq!(
        counter.markup()?,
        r#"<div id="counter"><p id="count">count: 0</p><button id="inc" rh:onclick="1">+1</button></div>"#
    );
    Ok(())
}

#[test]
fn click_rerenders_with_fresh_handler_id() -> Result<()> {
    let renderer = quiet_renderer();
    let counter = renderer.render(Counter::default())?;
    counter.click("#inc")?;
    assert_eq!(
        counter.markup()?,
        r#"<div id="counter"><p id="count">count: 1</p><button id="inc" rh:onclick="2">+1</button></div>"#
    );
    assert_eq!(counter.instance(|c| c.count)?, 1);
    assert_eq!(renderer.handler_count(), 1);
    Ok(())
}

#[test]
fn retired_handler_id_is_rejected() -> Result<()> {
    let renderer = quiet_renderer();
    let counter = renderer.render(Counter::default())?;
    counter.click("#inc")?;
    let err = renderer
        .dispatch_event(HandlerId::new(1), EventArgs::click())
        .expect_err("id 1 was retired by the re-render");
    assert!(matches!(err, Error::UnknownHandler(id) if id.get() == 1));
    assert_eq!(counter.instance(|c| c.count)?, 1);
    Ok(())
}

#[test]
fn custom_attribute_prefix_is_used_in_markup_and_dispatch() -> Result<()> {
    let options = RendererOptions::new()
        .with_attribute_prefix("Data-H-")?
        .with_trace_stderr(false);
    let renderer = Renderer::with_options(options);
    let counter = renderer.render(Counter::default())?;
    assert!(counter.markup()?.contains(r#"data-h-onclick="1""#));
    counter.click("button")?;
    assert_eq!(counter.find("#count")?.text_content(), "count: 1");
    Ok(())
}
