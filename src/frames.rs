use super::*;
use std::any::Any;
use std::marker::PhantomData;

/// Structural record of one rendered node, as committed by the renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Element(ElementFrame),
    Text(String),
    /// Raw markup inserted verbatim.
    Markup(String),
    Component(ComponentId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElementFrame {
    pub name: String,
    pub attributes: Vec<FrameAttribute>,
    pub children: Vec<Frame>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameAttribute {
    Value { name: String, value: String },
    /// Boolean attribute that is present (false flags are never committed).
    Flag { name: String },
    Handler { event: String, id: HandlerId },
    StopPropagation { event: String },
}

impl ElementFrame {
    pub fn handler_for(&self, event: &str) -> Option<HandlerId> {
        let event = normalize_event_attribute(event);
        self.attributes.iter().find_map(|attr| match attr {
            FrameAttribute::Handler { event: name, id } if *name == event => Some(*id),
            _ => None,
        })
    }
}

pub(crate) enum PendingFrame {
    Element {
        name: String,
        attributes: Vec<PendingAttribute>,
        children: Vec<PendingFrame>,
    },
    Text(String),
    Markup(String),
    Component(Box<dyn AnyComponent>),
}

pub(crate) enum PendingAttribute {
    Value { name: String, value: String },
    Flag { name: String, on: bool },
    Handler { event: String, callback: EventCallback },
    StopPropagation { event: String, on: bool },
}

struct OpenElement {
    name: String,
    attributes: Vec<PendingAttribute>,
    children: Vec<PendingFrame>,
}

/// Collects the output of one [`Component::render`] call.
///
/// Elements are opened with [`element`](Self::element); attribute calls made
/// inside its closure apply to that element.
pub struct FrameBuilder<C> {
    roots: Vec<PendingFrame>,
    open: Vec<OpenElement>,
    _component: PhantomData<fn(&mut C)>,
}

impl<C: Component> FrameBuilder<C> {
    pub(crate) fn new() -> Self {
        Self {
            roots: Vec::new(),
            open: Vec::new(),
            _component: PhantomData,
        }
    }

    pub fn element(&mut self, name: &str, build: impl FnOnce(&mut Self)) -> &mut Self {
        self.open.push(OpenElement {
            name: name.to_ascii_lowercase(),
            attributes: Vec::new(),
            children: Vec::new(),
        });
        build(self);
        if let Some(done) = self.open.pop() {
            self.push_frame(PendingFrame::Element {
                name: done.name,
                attributes: done.attributes,
                children: done.children,
            });
        }
        self
    }

    pub fn attr(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.push_attribute(PendingAttribute::Value {
            name: name.to_ascii_lowercase(),
            value: value.into(),
        })
    }

    /// Boolean attribute such as `disabled`; omitted from markup when `on` is false.
    pub fn flag(&mut self, name: &str, on: bool) -> &mut Self {
        self.push_attribute(PendingAttribute::Flag {
            name: name.to_ascii_lowercase(),
            on,
        })
    }

    /// Registers `callback` for `event` (`click` or `onclick`) on the open element.
    pub fn on<F>(&mut self, event: &str, callback: F) -> &mut Self
    where
        F: Fn(&mut C, &EventArgs) -> HandlerResult + Send + Sync + 'static,
    {
        let callback: EventCallback = Arc::new(move |instance: &mut dyn Any, args: &EventArgs| {
            match instance.downcast_mut::<C>() {
                Some(component) => callback(component, args),
                None => Err(format!(
                    "handler owner is not a {}",
                    std::any::type_name::<C>()
                )
                .into()),
            }
        });
        self.push_attribute(PendingAttribute::Handler {
            event: normalize_event_attribute(event),
            callback,
        })
    }

    pub fn stop_propagation(&mut self, event: &str) -> &mut Self {
        self.stop_propagation_if(event, true)
    }

    pub fn stop_propagation_if(&mut self, event: &str, on: bool) -> &mut Self {
        self.push_attribute(PendingAttribute::StopPropagation {
            event: normalize_event_attribute(event),
            on,
        })
    }

    pub fn text(&mut self, text: impl Into<String>) -> &mut Self {
        self.push_frame(PendingFrame::Text(text.into()));
        self
    }

    pub fn markup(&mut self, markup: impl Into<String>) -> &mut Self {
        self.push_frame(PendingFrame::Markup(markup.into()));
        self
    }

    pub fn component<Child: Component>(&mut self, child: Child) -> &mut Self {
        self.push_frame(PendingFrame::Component(Box::new(child)));
        self
    }

    fn push_frame(&mut self, frame: PendingFrame) {
        match self.open.last_mut() {
            Some(parent) => parent.children.push(frame),
            None => self.roots.push(frame),
        }
    }

    fn push_attribute(&mut self, attribute: PendingAttribute) -> &mut Self {
        match self.open.last_mut() {
            Some(element) => element.attributes.push(attribute),
            None => tracing::warn!(
                "attribute emitted outside of an element by {} was dropped",
                std::any::type_name::<C>()
            ),
        }
        self
    }

    pub(crate) fn finish(mut self) -> Vec<PendingFrame> {
        while let Some(done) = self.open.pop() {
            self.push_frame(PendingFrame::Element {
                name: done.name,
                attributes: done.attributes,
                children: done.children,
            });
        }
        self.roots
    }
}

/// DOM events whose bare name itself starts with `on`.
const EVENTS_NAMED_ON: &[&str] = &["online"];

/// Whether a lower-cased `event` is already spelled as its handler
/// attribute. `online` is bare, `ononline` is its attribute form.
pub(crate) fn is_event_attribute(event: &str) -> bool {
    event.starts_with("on") && !EVENTS_NAMED_ON.contains(&event)
}

/// `click` and `onclick` both become `onclick`.
pub(crate) fn normalize_event_attribute(event: &str) -> String {
    let event = event.trim().to_ascii_lowercase();
    if is_event_attribute(&event) {
        event
    } else {
        format!("on{event}")
    }
}
