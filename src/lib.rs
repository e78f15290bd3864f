//! Off-screen component renderer with DOM-accurate event simulation for tests.
//!
//! A [`Renderer`] owns the component tree and serializes every mutation. Each
//! completed update is published as a [`RenderEvent`] on the renderer's
//! [`RenderEventBus`]; [`RenderedFragment`]s subscribe to it and keep a lazily
//! recomputed markup cache that tests assert against. Triggering an event on an
//! element walks the rendered markup the way a browser would (bubbling,
//! `stoppropagation` markers, disabled controls) and routes the collected
//! handler ids back through the renderer.
//!
//! ```
//! use render_harness::{Component, FrameBuilder, Renderer};
//!
//! struct Counter {
//!     count: u32,
//! }
//!
//! impl Component for Counter {
//!     fn render(&self, out: &mut FrameBuilder<Self>) {
//!         out.element("p", |p| {
//!             p.text(format!("count: {}", self.count));
//!         });
//!         out.element("button", |b| {
//!             b.on("onclick", |me: &mut Counter, _| {
//!                 me.count += 1;
//!                 Ok(())
//!             });
//!             b.text("+1");
//!         });
//!     }
//! }
//!
//! # fn main() -> render_harness::Result<()> {
//! let renderer = Renderer::new();
//! let counter = renderer.render(Counter { count: 0 })?;
//! counter.click("button")?;
//! assert_eq!(counter.find("p")?.text_content(), "count: 1");
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

mod component;
mod dispatcher;
mod dom;
mod event_args;
mod event_bus;
mod event_dispatch;
mod fragment;
mod frames;
mod html;
mod markup_diff;
mod options;
mod render_event;
mod selector;
mod trace;

pub use component::{Component, ComponentId, HandlerError, HandlerId, HandlerResult};
pub use dispatcher::Renderer;
pub use dom::{ElementRef, Nodes};
pub use event_args::{ChangeEventArgs, EventArgs, KeyboardEventArgs, MouseEventArgs};
pub use event_bus::{
    FilteredRenderEvents, RenderEventBus, RenderEventObserver, RenderEventSource, Subscription,
};
pub use event_dispatch::{event_bubbles, is_disabled_suppressed};
pub use fragment::{RenderedComponent, RenderedFragment};
pub use frames::{ElementFrame, Frame, FrameAttribute, FrameBuilder};
pub use markup_diff::MarkupChange;
pub use options::RendererOptions;
pub use render_event::RenderEvent;

use component::*;
use dom::*;
use frames::*;
use html::*;
use render_event::*;
use selector::*;
use trace::*;

/// Recursion over nested markup grows the stack on demand instead of
/// overflowing on deeply nested component trees.
pub(crate) const STACK_RED_ZONE: usize = 64 * 1024;
pub(crate) const STACK_GROW: usize = 4 * 1024 * 1024;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("html parse error: {0}")]
    HtmlParse(String),
    #[error("selector not found: {0}")]
    SelectorNotFound(String),
    #[error("unsupported selector: {0}")]
    UnsupportedSelector(String),
    #[error(
        "no handler for {event} found on {element} or its ancestors (handlers on target: [{}])",
        .available.join(", ")
    )]
    MissingHandler {
        event: String,
        element: String,
        available: Vec<String>,
    },
    #[error("fragment rooted at component {0} has been disposed")]
    Disposed(ComponentId),
    #[error("unknown component id: {0}")]
    UnknownComponentId(ComponentId),
    #[error("unknown event handler id: {0}")]
    UnknownHandler(HandlerId),
    #[error("invalid handler id {value:?} in attribute {attribute}")]
    InvalidHandlerId { attribute: String, value: String },
    #[error("event handler {handler_id} failed: {source}")]
    Handler {
        handler_id: HandlerId,
        #[source]
        source: HandlerError,
    },
    #[error("event handler {handler_id} panicked: {message}")]
    HandlerPanicked {
        handler_id: HandlerId,
        message: String,
    },
    #[error("render of component {component} panicked: {message}")]
    RenderPanicked {
        component: ComponentId,
        message: String,
    },
    #[error("the render event bus has completed; no further rendering is possible")]
    PostCompletionUsage,
    #[error("the dispatcher was re-entered from the thread that is currently dispatching")]
    ReentrantDispatch,
    #[error("{count} render event subscriber(s) failed: {message}")]
    SubscriberFailed { count: usize, message: String },
    #[error("element at {0} is no longer present in the rendered markup")]
    StaleElement(String),
    #[error("no component of type {0} found")]
    ComponentNotFound(&'static str),
    #[error("type mismatch for component {component}: expected {expected}, actual {actual}")]
    TypeMismatch {
        component: ComponentId,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("no snapshot has been saved")]
    NoSnapshot,
    #[error(
        "markup mismatch: {} difference(s)\nexpected: {expected}\nactual: {actual}",
        .changes.len()
    )]
    AssertionFailed {
        expected: String,
        actual: String,
        changes: Vec<MarkupChange>,
    },
    #[error("invalid option: {0}")]
    InvalidOption(String),
    #[error("invalid regex {pattern:?}: {message}")]
    InvalidRegex { pattern: String, message: String },
}

/// Locks `mutex`, recovering the data if a previous holder panicked. State
/// guarded here is only mutated outside of application callbacks.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests;
